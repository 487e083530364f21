pub mod cluster;
pub mod serial;

pub use cluster::ClusterMaster;
pub use serial::SerialMaster;

use crate::{
    config::{EngineConfig, WorkerVariant},
    context::RunContext,
    error::EngineError,
    pool::WorkerPool,
    task::{Task, TaskResult},
    worker::Worker,
};
use std::time::Duration;

/// All master variants behind one dispatch surface.
///
/// Controllers only ever talk to this; whether tasks run on an in-process
/// pool or across compute ranks is selected by configuration and invisible
/// above this line.
#[derive(Debug)]
pub enum Masters {
    Serial(SerialMaster),
    Cluster(ClusterMaster),
}

impl Masters {
    pub fn load(config: &EngineConfig, ctx: &RunContext) -> Result<Self, EngineError> {
        let options = config.launch_options(ctx);
        let grace = Duration::from_secs(config.pool.shutdown_grace_secs);
        let simulator = config.algorithm.simulator();
        let size = config.pool.size.max(1);

        let workers: Vec<Worker> = (0..size)
            .map(|_| match config.pool.worker {
                WorkerVariant::Forked | WorkerVariant::Cluster => {
                    Worker::ephemeral(options.clone())
                }
                WorkerVariant::PersistentForked | WorkerVariant::PersistentCluster => {
                    Worker::persistent(simulator.clone(), options.clone(), grace)
                }
            })
            .collect();

        match config.pool.worker {
            WorkerVariant::Forked | WorkerVariant::PersistentForked => Ok(Masters::Serial(
                SerialMaster::new(WorkerPool::new(workers), ctx.clone())?,
            )),
            WorkerVariant::Cluster | WorkerVariant::PersistentCluster => {
                Ok(Masters::Cluster(ClusterMaster::new(workers, ctx.clone())?))
            }
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            Masters::Serial(master) => master.capacity(),
            Masters::Cluster(master) => master.capacity(),
        }
    }

    /// Run a batch of tasks, blocking until every task has a result, in
    /// dispatch order.
    pub fn dispatch(&mut self, tasks: Vec<Task>) -> Result<Vec<TaskResult>, EngineError> {
        match self {
            Masters::Serial(master) => master.dispatch(tasks),
            Masters::Cluster(master) => master.dispatch(tasks),
        }
    }

    /// Shut down every worker and, for cluster placement, the compute ranks.
    pub fn shutdown_all(&mut self) -> Result<(), EngineError> {
        match self {
            Masters::Serial(master) => master.shutdown_all(),
            Masters::Cluster(master) => master.shutdown_all(),
        }
    }
}
