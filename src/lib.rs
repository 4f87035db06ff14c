pub mod agent;
pub mod artifacts;
pub mod config;
pub mod graph;
pub mod lock;
pub mod log;
pub mod preflight;
pub mod prompt;
pub mod render;
pub mod resolver;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod tw_error;
pub mod types;
pub mod workflow;
pub mod worklog;
