//! Progress events emitted by the runner and step executor.
//!
//! Orchestration code reports through an `FnMut(&Event)` callback so the CLI
//! can render to the console while tests collect events.

use std::path::PathBuf;

use crate::io::pool::NodeHandle;

/// Which rule referenced a line the output did not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePurpose {
    Output,
    Assertion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RepetitionStarted {
        test: String,
        repetition: u32,
        times: u32,
    },
    ScalingUp {
        ready: usize,
        target: usize,
    },
    NodesSelected {
        count: usize,
    },
    StepStarted {
        step: String,
        on_node: usize,
        end_node: usize,
        command: String,
        inputs: Vec<String>,
    },
    NodeTimedOut {
        node: NodeHandle,
        timeout_secs: u64,
    },
    NodeStderr {
        node: NodeHandle,
        stderr: String,
    },
    TransportFailed {
        node: NodeHandle,
        error: String,
    },
    OutputWriteFailed {
        path: PathBuf,
        error: String,
    },
    VariableBound {
        node: NodeHandle,
        line: usize,
        name: String,
        value: String,
    },
    LineMissing {
        node: NodeHandle,
        purpose: LinePurpose,
        line: usize,
        available: usize,
    },
    AssertionPassed {
        node: NodeHandle,
        line: usize,
        expected: String,
    },
    AssertionFailed {
        node: NodeHandle,
        line: usize,
        actual: String,
        expected: String,
    },
    GraceWait {
        seconds: u64,
    },
}
