//! Execution of a single step across its node range.
//!
//! Every targeted node gets its own worker thread; workers only run the
//! command and send one [`InvocationOutcome`] back over a channel. The calling
//! thread is the single consumer: it applies timeouts, output bindings and
//! assertions in arrival order and is the only writer of the [`Environment`]
//! and [`Summary`]. The step returns once every node has reported.

use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use anyhow::{Result, bail};
use tracing::{debug, instrument, warn};

use crate::core::definition::Step;
use crate::core::env::{Binding, Environment};
use crate::core::resolve::resolve_expected;
use crate::core::summary::Summary;
use crate::events::{Event, LinePurpose};
use crate::io::pool::NodeHandle;
use crate::io::remote::{Invocation, InvocationOutcome, RemoteExec};
use crate::io::sink::append_lines;

/// Execution knobs shared by all steps of a run.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    /// Maximum concurrent node invocations; zero is one worker per node.
    pub max_parallel_nodes: usize,
}

/// Run `step` on nodes `on_node..=end_node` of `nodes` and return `env`
/// extended with every binding the step captured.
///
/// Assertions of one node result see the environment as it was when the step
/// started plus that same result's bindings, never a sibling node's.
#[instrument(skip_all, fields(step = %step.name))]
pub fn execute_step<E: RemoteExec, F: FnMut(&Event)>(
    step: &Step,
    nodes: &[NodeHandle],
    env: Environment,
    summary: &mut Summary,
    exec: &E,
    options: &StepOptions,
    on_event: &mut F,
) -> Result<Environment> {
    let targets = target_nodes(step, nodes)?;
    on_event(&Event::StepStarted {
        step: step.name.clone(),
        on_node: step.on_node,
        end_node: step.last_node(),
        command: step.cmd.clone(),
        inputs: step.inputs.clone(),
    });

    let invocation = Invocation {
        command: step.cmd.clone(),
        env_prefix: env.shell_prefix(),
        timeout: step.timeout(),
    };

    let mut next = env.clone();
    let mut received = 0usize;
    fan_out(
        exec,
        targets,
        &invocation,
        options.max_parallel_nodes,
        |node, result| {
            received += 1;
            let bindings = apply_result(step, &env, node, result, summary, on_event);
            for binding in &bindings {
                if next.contains(&binding.name) {
                    warn!(
                        name = %binding.name,
                        node = %node,
                        "variable bound again; lookups keep the first value"
                    );
                }
            }
            next.extend_from(&bindings);
        },
    );

    if received != targets.len() {
        bail!(
            "step {} received {received} of {} node results",
            step.name,
            targets.len()
        );
    }
    debug!(nodes = received, bindings = next.len(), "step complete");
    Ok(next)
}

/// Slice of `nodes` addressed by the step's 1-based inclusive range.
fn target_nodes<'a>(step: &Step, nodes: &'a [NodeHandle]) -> Result<&'a [NodeHandle]> {
    let (first, last) = (step.on_node, step.last_node());
    if first == 0 || first > last || last > nodes.len() {
        bail!(
            "step {} targets nodes {first}..={last} but {} are available",
            step.name,
            nodes.len()
        );
    }
    Ok(&nodes[first - 1..last])
}

/// Run `invocation` on every target concurrently and hand each result to
/// `handle` on the calling thread, in completion order.
fn fan_out<E: RemoteExec, H: FnMut(&NodeHandle, Result<InvocationOutcome>)>(
    exec: &E,
    targets: &[NodeHandle],
    invocation: &Invocation,
    max_parallel: usize,
    mut handle: H,
) {
    let workers = if max_parallel == 0 {
        targets.len()
    } else {
        max_parallel.min(targets.len())
    };
    let cursor = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let cursor = &cursor;
            scope.spawn(move || {
                loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(node) = targets.get(index) else {
                        break;
                    };
                    let result = exec.run(node, invocation);
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        for (index, result) in rx {
            handle(&targets[index], result);
        }
    });
}

/// Apply one node's result to the summary and return the bindings it made.
fn apply_result<F: FnMut(&Event)>(
    step: &Step,
    base: &Environment,
    node: &NodeHandle,
    result: Result<InvocationOutcome>,
    summary: &mut Summary,
    on_event: &mut F,
) -> Vec<Binding> {
    let (lines, stderr) = match result {
        Err(err) => {
            warn!(node = %node, err = %format!("{err:#}"), "transport failed");
            on_event(&Event::TransportFailed {
                node: node.clone(),
                error: format!("{err:#}"),
            });
            return Vec::new();
        }
        Ok(InvocationOutcome::TimedOut) => {
            summary.record_timeout();
            on_event(&Event::NodeTimedOut {
                node: node.clone(),
                timeout_secs: step.timeout,
            });
            return Vec::new();
        }
        Ok(InvocationOutcome::Completed {
            lines,
            stderr,
            exit_code,
        }) => {
            debug!(node = %node, lines = lines.len(), exit_code = ?exit_code, "node result");
            (lines, stderr)
        }
    };

    if !stderr.trim().is_empty() {
        on_event(&Event::NodeStderr {
            node: node.clone(),
            stderr,
        });
    }

    if let Some(path) = &step.write_to_file
        && let Err(err) = append_lines(path, &lines)
    {
        on_event(&Event::OutputWriteFailed {
            path: path.clone(),
            error: format!("{err:#}"),
        });
    }

    let mut scoped = base.clone();
    let mark = scoped.len();
    for output in &step.outputs {
        let Some(value) = lines.get(output.line) else {
            on_event(&Event::LineMissing {
                node: node.clone(),
                purpose: LinePurpose::Output,
                line: output.line,
                available: lines.len(),
            });
            break;
        };
        scoped.bind(output.save_to.as_str(), value.as_str());
        on_event(&Event::VariableBound {
            node: node.clone(),
            line: output.line,
            name: output.save_to.clone(),
            value: value.clone(),
        });
        if let Some(path) = &output.save_to_file
            && let Err(err) = append_lines(path, slice::from_ref(value))
        {
            on_event(&Event::OutputWriteFailed {
                path: path.clone(),
                error: format!("{err:#}"),
            });
        }
    }

    for assertion in &step.assertions {
        let Some(actual) = lines.get(assertion.line) else {
            on_event(&Event::LineMissing {
                node: node.clone(),
                purpose: LinePurpose::Assertion,
                line: assertion.line,
                available: lines.len(),
            });
            break;
        };
        let expected = resolve_expected(&assertion.should_be_equal_to, &scoped);
        if actual == expected {
            summary.record_success();
            on_event(&Event::AssertionPassed {
                node: node.clone(),
                line: assertion.line,
                expected: expected.to_string(),
            });
        } else {
            summary.record_failure();
            on_event(&Event::AssertionFailed {
                node: node.clone(),
                line: assertion.line,
                actual: actual.clone(),
                expected: expected.to_string(),
            });
        }
    }

    scoped.bindings_since(mark).to_vec()
}
