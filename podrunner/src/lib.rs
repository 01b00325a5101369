//! Scripted multi-node integration test driver.
//!
//! A test definition lists shell commands ("steps") that are fanned out to
//! an inclusive range of cluster nodes in parallel. Selected output lines are
//! captured into variables visible to later steps, assertions compare captured
//! lines against literals or earlier captures, and the run passes when the
//! accumulated success/failure/timeout counters equal the declared ones.
//!
//! - **[`core`]**: Pure, deterministic logic (definition model, environment,
//!   assertion resolution, counters). No I/O.
//! - **[`io`]**: Side-effecting adapters (child processes, `kubectl`, files,
//!   configuration).
//!
//! Orchestration modules ([`step`], [`run`]) coordinate core logic with the
//! [`io::remote::RemoteExec`] and [`io::pool::NodePool`] seams.

pub mod console;
pub mod core;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
