use crate::{
    error::EngineError,
    task::{Task, TaskResult},
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

/// Message from the coordinator to one compute rank.
#[derive(Debug)]
pub enum ToRank {
    Run(Task),
    Shutdown,
}

/// Message from a compute rank back to the coordinator.  Carries the task id
/// so the coordinator can restore dispatch order over any-order completion.
#[derive(Debug)]
pub struct RankReply {
    pub rank: usize,
    pub id: u64,
    pub outcome: Result<TaskResult, EngineError>,
}

/// Coordinator-side handle of the rank-addressed channel fabric: one task
/// lane per rank, one shared reply lane for "any rank responded" receives.
#[derive(Debug)]
pub struct RankFabric {
    pub task_lanes: Vec<Sender<ToRank>>,
    pub reply_rx: Receiver<RankReply>,
}

/// Rank-side endpoint.  Compute ranks hold no shared state; everything moves
/// through these channels.
#[derive(Debug)]
pub struct RankEndpoint {
    pub rank: usize,
    pub tasks: Receiver<ToRank>,
    pub replies: Sender<RankReply>,
}

/// Build the channel fabric for `ranks` compute ranks.
///
/// Task lanes hold a single message; the coordinator only ever sends to idle
/// ranks, so sends never block.
pub fn rank_fabric(ranks: usize) -> (RankFabric, Vec<RankEndpoint>) {
    let (reply_tx, reply_rx) = unbounded();
    let mut task_lanes = Vec::with_capacity(ranks);
    let mut endpoints = Vec::with_capacity(ranks);

    for rank in 0..ranks {
        let (task_tx, task_rx) = bounded(1);
        task_lanes.push(task_tx);
        endpoints.push(RankEndpoint {
            rank,
            tasks: task_rx,
            replies: reply_tx.clone(),
        });
    }

    (
        RankFabric {
            task_lanes,
            reply_rx,
        },
        endpoints,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::Command, task::TaskStatus};
    use std::time::Duration;

    #[test]
    fn replies_flow_back_from_any_rank() {
        let (fabric, endpoints) = rank_fabric(2);

        for endpoint in &endpoints {
            let task = Task::new(
                endpoint.rank as u64,
                Command::new("echo 0").unwrap(),
                String::new(),
            );
            fabric.task_lanes[endpoint.rank]
                .send(ToRank::Run(task))
                .unwrap();
        }

        for endpoint in endpoints.into_iter().rev() {
            match endpoint.tasks.recv().unwrap() {
                ToRank::Run(task) => endpoint
                    .replies
                    .send(RankReply {
                        rank: endpoint.rank,
                        id: task.id,
                        outcome: Ok(TaskResult {
                            id: task.id,
                            stdout: String::new(),
                            stderr: String::new(),
                            status: TaskStatus::Ok,
                            runtime: Duration::ZERO,
                        }),
                    })
                    .unwrap(),
                ToRank::Shutdown => panic!("unexpected shutdown"),
            }
        }

        let first = fabric.reply_rx.recv().unwrap();
        let second = fabric.reply_rx.recv().unwrap();
        assert_ne!(first.rank, second.rank);
    }
}
