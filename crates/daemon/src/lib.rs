// git-glacier daemon library: config, git plumbing, mirror engine, scheduling, metrics.

pub mod config;
pub mod git;
pub mod metrics;
pub mod mirror;
pub mod runtime;
pub mod scheduler;
pub mod server;
