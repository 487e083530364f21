//! Parallel engine for approximate Bayesian computation.
//!
//! Drives black-box simulator, sampler and density commands through
//! repeated independent runs, accepting or weighting parameter candidates
//! against a distance threshold.  Controllers own the algorithms (sweep,
//! rejection sampling, sequential population refinement), masters schedule
//! their task batches over a worker pool, workers wrap one external command
//! each, either one process per task or one long-lived process per worker,
//! in-process or across compute ranks.

pub mod command;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod master;
pub mod pool;
pub mod population;
pub mod process;
pub mod protocol;
pub mod task;
pub mod transport;
pub mod worker;
