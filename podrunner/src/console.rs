//! Console rendering of runner events and the final summary.

use colored::Colorize;

use crate::core::definition::TestDefinition;
use crate::core::summary::{Summary, Verdict};
use crate::events::{Event, LinePurpose};

/// Print one event to stdout (diagnostics about a single node go to stderr).
pub fn render(event: &Event) {
    match event {
        Event::RepetitionStarted {
            test,
            repetition,
            times,
        } => {
            println!(
                "{}",
                format!("## Running test '{test}' ({repetition}/{times})").cyan()
            );
        }
        Event::ScalingUp { ready, target } => {
            println!("Not enough nodes running ({ready}/{target}). Scaling up...");
        }
        Event::NodesSelected { count } => {
            println!("{}", format!("## Using {count} nodes for this test").cyan());
        }
        Event::StepStarted {
            step,
            on_node,
            end_node,
            command,
            inputs,
        } => {
            println!(
                "{}",
                format!("### Running step {step} on nodes {on_node} to {end_node}").yellow()
            );
            for input in inputs {
                println!("{}", format!("### Getting variable {input}").yellow());
            }
            println!("{}", format!("$ {command}").magenta());
            println!(
                "{}",
                format!("Running parallel on {} nodes.", end_node - on_node + 1).magenta()
            );
        }
        Event::NodeTimedOut { node, timeout_secs } => {
            println!(
                "{}",
                format!("Command timed out on {node} after {timeout_secs} seconds").red()
            );
        }
        Event::NodeStderr { node, stderr } => {
            eprintln!("[{node}] {}", stderr.trim_end());
        }
        Event::TransportFailed { node, error } => {
            println!("{}", format!("Could not run command on {node}: {error}").red());
        }
        Event::OutputWriteFailed { path, error } => {
            println!(
                "{}",
                format!("Failed to write output file {}: {error}", path.display()).red()
            );
        }
        Event::VariableBound {
            line, name, value, ..
        } => {
            println!(
                "{}",
                format!("### Saving output from line {line} to variable {name}: {value}").magenta()
            );
        }
        Event::LineMissing {
            node,
            purpose,
            line,
            available,
        } => {
            let skipped = match purpose {
                LinePurpose::Output => "outputs",
                LinePurpose::Assertion => "assertions",
            };
            println!(
                "{}",
                format!(
                    "Not enough lines in output of {node} (line {line}, got {available}). Skipping {skipped}"
                )
                .red()
            );
        }
        Event::AssertionPassed { .. } => {
            println!("{}", "Assertion Passed".green());
        }
        Event::AssertionFailed {
            node,
            line,
            actual,
            expected,
        } => {
            println!("{}", format!("Assertion failed on {node} (line {line})!").red());
            println!("{}", format!("Actual value={actual}").red());
            println!("{}", format!("Expected value={expected}\n").red());
        }
        Event::GraceWait { seconds } => {
            println!("Now waiting for {seconds} seconds before shutdown...");
        }
    }
}

/// Print the counter breakdown and timestamps of a finished run.
pub fn print_summary(summary: &Summary, dashboard_link: Option<&str>) {
    let counts = summary.counts;
    println!("============================");
    println!("== Test Summary");
    println!("===============");
    println!("==");
    println!("== Started: {}", summary.started_at);
    if let Some(ended_at) = summary.ended_at {
        println!("== Ended: {ended_at}");
    }
    println!(
        "== Repetitions: {}/{}",
        summary.repetitions_completed, summary.repetitions_planned
    );
    println!("==");
    println!(
        "== Successes: {}/{} (success/failure)",
        counts.successes, counts.failures
    );
    println!("== Timeouts: {}", counts.timeouts);
    if let Some(link) = dashboard_link {
        println!("==");
        println!("== Metrics: {link}");
    }
}

pub fn print_verdict(verdict: &Verdict) {
    match verdict {
        Verdict::Met => println!("{}", "Expectations were met".green()),
        Verdict::NotMet { observed, expected } => {
            println!("{}", "Expectations were not met".red());
            println!(
                "{}",
                format!(
                    "   successes: {} (expected {})",
                    observed.successes, expected.successes
                )
                .red()
            );
            println!(
                "{}",
                format!(
                    "   failures:  {} (expected {})",
                    observed.failures, expected.failures
                )
                .red()
            );
            println!(
                "{}",
                format!(
                    "   timeouts:  {} (expected {})",
                    observed.timeouts, expected.timeouts
                )
                .red()
            );
        }
    }
}

/// Print the step plan of a validated definition (`podrunner validate`).
pub fn print_plan(definition: &TestDefinition) {
    let config = &definition.config;
    println!("test: {}", definition.name);
    println!(
        "config: nodes={} selector={:?} times={} grace_shutdown={}s",
        config.nodes, config.selector, config.times, config.grace_shutdown
    );
    println!(
        "expected: successes={} failures={} timeouts={}",
        config.expected.successes, config.expected.failures, config.expected.timeouts
    );
    for (index, step) in definition.steps.iter().enumerate() {
        let timeout = match step.timeout() {
            Some(timeout) => format!("{}s", timeout.as_secs()),
            None => "none".to_string(),
        };
        println!(
            "step {}: {} nodes={}..={} timeout={} outputs={} assertions={}",
            index + 1,
            step.name,
            step.on_node,
            step.last_node(),
            timeout,
            step.outputs.len(),
            step.assertions.len()
        );
    }
    println!(
        "invocations per repetition: {}",
        definition.invocations_per_repetition()
    );
}
