//! The repetition loop for `podrunner run`.

use std::thread;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::core::definition::TestDefinition;
use crate::core::env::Environment;
use crate::core::summary::{Summary, Verdict, evaluate};
use crate::error::ProvisioningError;
use crate::events::Event;
use crate::io::pool::{NodeHandle, NodePool};
use crate::io::remote::RemoteExec;
use crate::step::{StepOptions, execute_step};

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub summary: Summary,
    pub verdict: Verdict,
}

/// Run every step of `definition` `config.times` times, then wait out the
/// grace period and compare the counters with the expectation.
///
/// Each repetition starts with an empty environment and a fresh snapshot of
/// node handles. Provisioning failures abort the run with a
/// [`ProvisioningError`]; everything that happens on a node only shows up in
/// the counters.
#[instrument(skip_all, fields(test = %definition.name))]
pub fn run_test<E: RemoteExec, P: NodePool, F: FnMut(&Event)>(
    definition: &TestDefinition,
    exec: &E,
    pool: &P,
    options: &StepOptions,
    mut on_event: F,
) -> Result<RunOutcome> {
    let config = &definition.config;
    let mut summary = Summary::start(config.times);
    info!(times = config.times, nodes = config.nodes, "run started");

    for repetition in 1..=config.times {
        on_event(&Event::RepetitionStarted {
            test: definition.name.clone(),
            repetition,
            times: config.times,
        });
        let nodes = provision(pool, config.nodes, &mut on_event)
            .map_err(|err| anyhow::Error::new(ProvisioningError::from_anyhow(&err)))?;
        on_event(&Event::NodesSelected { count: nodes.len() });

        let mut env = Environment::new();
        for step in &definition.steps {
            env = execute_step(step, &nodes, env, &mut summary, exec, options, &mut on_event)
                .with_context(|| format!("repetition {repetition}, step {}", step.name))?;
        }
        summary.repetitions_completed += 1;
        debug!(repetition, counts = ?summary.counts, "repetition complete");
    }

    let grace = config.grace_period();
    if !grace.is_zero() {
        on_event(&Event::GraceWait {
            seconds: config.grace_shutdown,
        });
        thread::sleep(grace);
    }
    summary.finish();

    let verdict = evaluate(&summary, &config.expected);
    info!(counts = ?summary.counts, met = verdict.is_met(), "run finished");
    Ok(RunOutcome { summary, verdict })
}

/// Make sure `required` nodes are ready (scaling up, never down) and return
/// the first `required` handles.
fn provision<P: NodePool, F: FnMut(&Event)>(
    pool: &P,
    required: usize,
    on_event: &mut F,
) -> Result<Vec<NodeHandle>> {
    let ready = pool.ready_count().context("count ready nodes")?;
    if ready < required {
        on_event(&Event::ScalingUp {
            ready,
            target: required,
        });
        pool.scale_to(required).context("scale node pool")?;
    }
    let mut handles = pool.list_handles().context("list nodes")?;
    if handles.len() < required {
        bail!("{} nodes ready, {required} required", handles.len());
    }
    handles.truncate(required);
    Ok(handles)
}
