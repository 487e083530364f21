use crate::{
    context::RunContext,
    error::EngineError,
    task::{Task, TaskResult},
    transport::{rank_fabric, RankEndpoint, RankReply, ToRank},
    worker::Worker,
};
use crossbeam_channel::{Receiver, Sender};
use std::{
    collections::{HashMap, VecDeque},
    thread::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, instrument, trace};

/// Distributed master: one coordinating side plus N compute ranks.
///
/// The coordinator never runs a task itself.  It hands task descriptors to
/// idle ranks over the rank-addressed transport and blocks on "any rank
/// responded", so completion order across ranks is arbitrary; replies are
/// tagged with their task id and re-sorted into dispatch order.  Each rank
/// owns exactly one worker and no other state.
#[derive(Debug)]
pub struct ClusterMaster {
    task_lanes: Vec<Sender<ToRank>>,
    reply_rx: Receiver<RankReply>,
    handles: Vec<JoinHandle<()>>,
    ctx: RunContext,
}

impl ClusterMaster {
    pub fn new(workers: Vec<Worker>, ctx: RunContext) -> Result<Self, EngineError> {
        let (fabric, endpoints) = rank_fabric(workers.len());
        let mut handles = Vec::with_capacity(workers.len());

        for (endpoint, worker) in endpoints.into_iter().zip(workers) {
            let ctx = ctx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("rank-{}", endpoint.rank))
                .spawn(move || rank_loop(endpoint, worker, ctx))
                .map_err(|e| EngineError::Transport(format!("failed to start rank: {e}")))?;
            handles.push(handle);
        }

        debug!(ranks = handles.len(), "cluster master started");

        Ok(Self {
            task_lanes: fabric.task_lanes,
            reply_rx: fabric.reply_rx,
            handles,
            ctx,
        })
    }

    pub fn capacity(&self) -> usize {
        self.task_lanes.len()
    }

    /// Run a batch of tasks across the ranks, blocking until every task has
    /// a result; results come back in dispatch order.
    ///
    /// Once the termination flag is set, no further task is assigned;
    /// in-flight tasks are drained and the batch resolves to
    /// [`EngineError::Terminated`].
    #[instrument(skip_all, fields(batch = tasks.len()), level = "debug")]
    pub fn dispatch(&mut self, tasks: Vec<Task>) -> Result<Vec<TaskResult>, EngineError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let positions: HashMap<u64, usize> = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (task.id, index))
            .collect();
        let mut slots: Vec<Option<TaskResult>> = (0..tasks.len()).map(|_| None).collect();
        let mut queue: VecDeque<Task> = tasks.into();
        let mut idle: VecDeque<usize> = (0..self.task_lanes.len()).collect();
        let mut in_flight = 0usize;
        let mut fatal: Option<EngineError> = None;

        loop {
            while fatal.is_none()
                && !self.ctx.is_terminated()
                && !queue.is_empty()
                && !idle.is_empty()
            {
                let rank = idle.pop_front().expect("checked non-empty");
                let task = queue.pop_front().expect("checked non-empty");

                trace!(rank, id = task.id, "assigning task");
                if self.task_lanes[rank].send(ToRank::Run(task)).is_err() {
                    fatal = Some(EngineError::Transport(format!("rank {rank} is gone")));
                    break;
                }
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            match self.reply_rx.recv() {
                Ok(reply) => {
                    in_flight -= 1;
                    idle.push_back(reply.rank);

                    match reply.outcome {
                        Ok(result) => {
                            if let Some(&slot) = positions.get(&reply.id) {
                                slots[slot] = Some(result);
                            }
                        }
                        Err(e) => {
                            if fatal.is_none() {
                                fatal = Some(e);
                            }
                        }
                    }
                }
                Err(_) => {
                    fatal = Some(EngineError::Transport("reply channel closed".to_string()));
                    break;
                }
            }
        }

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch finished"
        );

        if let Some(e) = fatal {
            return Err(e);
        }

        if self.ctx.is_terminated() && !queue.is_empty() {
            return Err(EngineError::Terminated);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| EngineError::Transport("replies missing for dispatched tasks".to_string()))
    }

    /// Signal every rank to stop, then join their threads.  Each rank shuts
    /// down its own worker on the way out.
    pub fn shutdown_all(&mut self) -> Result<(), EngineError> {
        for lane in &self.task_lanes {
            let _ = lane.send(ToRank::Shutdown);
        }

        let mut panicked = false;
        for handle in self.handles.drain(..) {
            panicked |= handle.join().is_err();
        }

        if panicked {
            return Err(EngineError::Transport("a rank thread panicked".to_string()));
        }

        debug!("cluster master shut down");

        Ok(())
    }
}

fn rank_loop(endpoint: RankEndpoint, mut worker: Worker, ctx: RunContext) {
    while let Ok(message) = endpoint.tasks.recv() {
        match message {
            ToRank::Run(task) => {
                let id = task.id;
                let outcome = worker.submit(&task, &ctx);
                let reply = RankReply {
                    rank: endpoint.rank,
                    id,
                    outcome,
                };

                if endpoint.replies.send(reply).is_err() {
                    break;
                }
            }
            ToRank::Shutdown => break,
        }
    }

    if let Err(e) = worker.shutdown() {
        error!(rank = endpoint.rank, error = %e, "rank worker failed to shut down");
    }
}
