//! Node pool: discover, count and scale the nodes a test runs against.

use std::fmt;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::io::config::KubectlConfig;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_checked};

/// Opaque, immutable address of one node (a pod name, or `local-N`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(String);

impl NodeHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Abstraction over the set of nodes backing the service under test.
pub trait NodePool {
    /// Number of nodes currently ready to accept commands.
    fn ready_count(&self) -> Result<usize>;

    /// Scale to `target` nodes and block until at least that many are ready.
    fn scale_to(&self, target: usize) -> Result<()>;

    /// Ready node handles, in the order 1-based step indices refer to.
    fn list_handles(&self) -> Result<Vec<NodeHandle>>;
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: String,
}

/// Names of pods in phase `Running` from `kubectl get pods --output=json`, sorted.
pub fn running_pod_names(json: &str) -> Result<Vec<String>> {
    let pods: PodList = serde_json::from_str(json).context("parse kubectl pod list")?;
    let mut names: Vec<String> = pods
        .items
        .into_iter()
        .filter(|pod| pod.status.phase == "Running")
        .map(|pod| pod.metadata.name)
        .collect();
    names.sort();
    Ok(names)
}

/// Pods of a Kubernetes deployment, selected by label.
pub struct KubectlPool {
    config: KubectlConfig,
    selector: String,
}

impl KubectlPool {
    pub fn new(config: KubectlConfig, selector: impl Into<String>) -> Self {
        Self {
            config,
            selector: selector.into(),
        }
    }

    fn kubectl(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        if let Some(namespace) = &self.config.namespace {
            cmd.arg("--namespace").arg(namespace);
        }
        cmd
    }

    fn running_pods(&self) -> Result<Vec<String>> {
        let mut cmd = self.kubectl();
        cmd.arg("get").arg("pods").arg("--output=json");
        if !self.selector.is_empty() {
            cmd.arg(format!("--selector={}", self.selector));
        }
        let json = run_checked(cmd, DEFAULT_OUTPUT_LIMIT_BYTES).context("kubectl get pods")?;
        running_pod_names(&json)
    }
}

impl NodePool for KubectlPool {
    fn ready_count(&self) -> Result<usize> {
        Ok(self.running_pods()?.len())
    }

    #[instrument(skip_all, fields(replicas = target, deployment = %self.config.deployment))]
    fn scale_to(&self, target: usize) -> Result<()> {
        let mut cmd = self.kubectl();
        cmd.arg("scale")
            .arg(format!("--replicas={target}"))
            .arg(format!("deployment/{}", self.config.deployment));
        run_checked(cmd, DEFAULT_OUTPUT_LIMIT_BYTES).context("kubectl scale")?;

        let poll = Duration::from_secs(self.config.poll_interval_secs);
        let deadline = (self.config.scale_timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(self.config.scale_timeout_secs));
        loop {
            let running = self.ready_count()?;
            info!(running, replicas = target, "waiting for pods");
            if running >= target {
                return Ok(());
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                bail!(
                    "only {running}/{target} pods running after {}s",
                    self.config.scale_timeout_secs
                );
            }
            thread::sleep(poll);
        }
    }

    fn list_handles(&self) -> Result<Vec<NodeHandle>> {
        let names = self.running_pods()?;
        debug!(count = names.len(), "listed pods");
        Ok(names.into_iter().map(NodeHandle::new).collect())
    }
}

/// Fixed pseudo-nodes `local-1..=local-N`, always ready.
pub struct StaticPool {
    handles: Vec<NodeHandle>,
}

impl StaticPool {
    pub fn new(count: usize) -> Self {
        Self {
            handles: (1..=count)
                .map(|index| NodeHandle::new(format!("local-{index}")))
                .collect(),
        }
    }
}

impl NodePool for StaticPool {
    fn ready_count(&self) -> Result<usize> {
        Ok(self.handles.len())
    }

    fn scale_to(&self, target: usize) -> Result<()> {
        if target > self.handles.len() {
            bail!(
                "static pool has {} nodes, cannot scale to {target}",
                self.handles.len()
            );
        }
        Ok(())
    }

    fn list_handles(&self) -> Result<Vec<NodeHandle>> {
        Ok(self.handles.clone())
    }
}
