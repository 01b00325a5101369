//! Grafana link covering the time window of a run.
//!
//! The address is the first cluster node's `InternalIP` and the port is the
//! Grafana service's `nodePort`, so the link works for minikube as well as
//! real clusters.

use std::process::Command;

use anyhow::{Context, Result, bail};
use minijinja::{Environment, context};

use crate::core::summary::Summary;
use crate::io::config::{DashboardConfig, KubectlConfig};
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_checked};

/// Render the dashboard URL template.
pub fn render_link(
    template: &str,
    address: &str,
    port: &str,
    path: &str,
    from_ms: i64,
    to_ms: i64,
) -> Result<String> {
    let env = Environment::new();
    let link = env
        .render_str(
            template,
            context! {
                address => address,
                port => port,
                path => path,
                from_ms => from_ms,
                to_ms => to_ms,
            },
        )
        .context("render dashboard url template")?;
    Ok(link)
}

/// Look up Grafana's node address and port, then render the link for `summary`.
pub fn dashboard_link(
    dashboard: &DashboardConfig,
    kubectl: &KubectlConfig,
    summary: &Summary,
) -> Result<String> {
    let mut port_cmd = Command::new(&kubectl.binary);
    port_cmd
        .arg("get")
        .arg("service")
        .arg(&dashboard.service)
        .arg(format!("--namespace={}", dashboard.namespace))
        .arg("-o")
        .arg("jsonpath={.spec.ports[0].nodePort}");
    let port = run_checked(port_cmd, DEFAULT_OUTPUT_LIMIT_BYTES).context("look up grafana port")?;

    let mut address_cmd = Command::new(&kubectl.binary);
    address_cmd
        .arg("get")
        .arg("nodes")
        .arg("-o")
        .arg(r#"jsonpath={.items[0].status.addresses[?(@.type=="InternalIP")].address}"#);
    let address = run_checked(address_cmd, DEFAULT_OUTPUT_LIMIT_BYTES)
        .context("look up cluster node address")?;

    let (port, address) = (clean(&port), clean(&address));
    if port.is_empty() || address.is_empty() {
        bail!("grafana service {} has no node address/port", dashboard.service);
    }
    let to = summary.ended_at.unwrap_or(summary.started_at);
    render_link(
        &dashboard.url_template,
        &address,
        &port,
        &dashboard.path,
        summary.started_at.timestamp_millis(),
        to.timestamp_millis(),
    )
}

fn clean(raw: &str) -> String {
    raw.trim().trim_matches('\'').to_string()
}
