//! I/O adapters for podrunner commands.

pub mod config;
pub mod dashboard;
pub mod definition;
pub mod pool;
pub mod process;
pub mod remote;
pub mod sink;
