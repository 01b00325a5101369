//! Runner configuration stored in `podrunner.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;

pub const DEFAULT_CONFIG_FILE: &str = "podrunner.toml";

/// Runner configuration (TOML).
///
/// Everything that describes *where* a test runs (cluster access, transport,
/// parallelism) lives here; *what* runs lives in the test definition. Missing
/// fields default to values suitable for a local minikube cluster.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    pub transport: Transport,
    pub kubectl: KubectlConfig,
    pub local: LocalConfig,
    pub execution: ExecutionConfig,
    pub dashboard: DashboardConfig,
}

/// How commands reach the nodes.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Pods of a Kubernetes deployment, via `kubectl exec`.
    #[default]
    Kubectl,
    /// Local shell processes standing in for nodes.
    Local,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KubectlConfig {
    pub binary: String,
    pub namespace: Option<String>,
    /// Container to exec into for multi-container pods.
    pub container: Option<String>,
    /// Deployment scaled up when too few pods are running.
    pub deployment: String,
    /// Shell used inside the pod (`<shell> -c <cmd>`).
    pub shell: String,
    /// Seconds between readiness polls while scaling.
    pub poll_interval_secs: u64,
    /// Give up scaling after this many seconds; zero waits forever.
    pub scale_timeout_secs: u64,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            namespace: None,
            container: None,
            deployment: "go-ipfs-stress".to_string(),
            shell: "bash".to_string(),
            poll_interval_secs: 3,
            scale_timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalConfig {
    pub shell: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on concurrent node invocations per step; zero is unbounded.
    pub max_parallel_nodes: usize,
    /// Truncate captured stdout/stderr beyond this many bytes per invocation.
    pub output_limit_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 0,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

/// Grafana dashboard link printed with the summary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub service: String,
    pub namespace: String,
    pub path: String,
    /// Rendered with `address`, `port`, `path`, `from_ms` and `to_ms`.
    pub url_template: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service: "grafana".to_string(),
            namespace: "monitoring".to_string(),
            path: "/dashboard/db/kubernetes-pod-resources".to_string(),
            url_template: "http://{{ address }}:{{ port }}{{ path }}?from={{ from_ms }}&to={{ to_ms }}"
                .to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kubectl.binary.trim().is_empty() {
            return Err(anyhow!("kubectl.binary must be non-empty"));
        }
        if self.kubectl.deployment.trim().is_empty() {
            return Err(anyhow!("kubectl.deployment must be non-empty"));
        }
        if self.kubectl.shell.trim().is_empty() {
            return Err(anyhow!("kubectl.shell must be non-empty"));
        }
        if self.kubectl.poll_interval_secs == 0 {
            return Err(anyhow!("kubectl.poll_interval_secs must be > 0"));
        }
        if self.local.shell.trim().is_empty() {
            return Err(anyhow!("local.shell must be non-empty"));
        }
        if self.execution.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        if self.dashboard.enabled && self.dashboard.url_template.trim().is_empty() {
            return Err(anyhow!("dashboard.url_template must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`. Only the implicit
/// `podrunner.toml` goes through here; see [`load_config_file`].
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    load_config_file(path)
}

/// Load config from a TOML file that must exist (`--config PATH`).
pub fn load_config_file(path: &Path) -> Result<RunnerConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
        assert_eq!(cfg.transport, Transport::Kubectl);
        assert_eq!(cfg.kubectl.deployment, "go-ipfs-stress");
    }

    #[test]
    fn explicit_file_must_exist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_config_file(&temp.path().join("missing.toml")).expect_err("missing");
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
transport = "local"

[kubectl]
namespace = "ipfs"
deployment = "cluster"

[execution]
max_parallel_nodes = 8
"#,
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.transport, Transport::Local);
        assert_eq!(cfg.kubectl.namespace.as_deref(), Some("ipfs"));
        assert_eq!(cfg.kubectl.deployment, "cluster");
        assert_eq!(cfg.kubectl.poll_interval_secs, 3);
        assert_eq!(cfg.execution.max_parallel_nodes, 8);
        assert_eq!(cfg.execution.output_limit_bytes, DEFAULT_OUTPUT_LIMIT_BYTES);
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[kubectl]\npoll_interval_secs = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("poll_interval_secs"));
    }
}
