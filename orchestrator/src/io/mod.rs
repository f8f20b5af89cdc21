//! Side-effecting adapters: processes, the issue tracker, the filesystem.

pub mod agents;
pub mod config;
pub mod labels;
pub mod lock;
pub mod process;
pub mod quality;
pub mod report_store;
pub mod tracker;
