use std::path::PathBuf;
use std::time::Duration;

use crate::types::ResourceLimits;

/// Retry schedule for image pulls. Code execution itself is never retried.
#[derive(Debug, Clone, PartialEq)]
pub struct PullPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Deadline for a single attempt; expiry counts as a transient failure
    pub attempt_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl PullPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for PullPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(300),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub limits: ResourceLimits,
    /// Wall-clock budget for build and run together
    pub timeout: Duration,
    /// Size of the admission gate
    pub max_concurrent: usize,
    pub pull_policy: PullPolicy,
    /// Per-stream capture cap in bytes
    pub output_limit: usize,
    pub max_code_bytes: usize,
    pub max_input_bytes: usize,
    /// `docker` executable, resolved through `PATH` when relative
    pub docker_bin: PathBuf,
    /// Parent directory for per-job workspaces; the system temp dir when unset
    pub workspace_root: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            timeout: Duration::from_secs(10),
            max_concurrent: 10,
            pull_policy: PullPolicy::default(),
            output_limit: 1024 * 1024,
            max_code_bytes: 64 * 1024,
            max_input_bytes: 1024 * 1024,
            docker_bin: PathBuf::from("docker"),
            workspace_root: None,
        }
    }
}

impl SandboxConfig {
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_pull_policy(mut self, pull_policy: PullPolicy) -> Self {
        self.pull_policy = pull_policy;
        self
    }

    pub fn with_output_limit(mut self, output_limit: usize) -> Self {
        self.output_limit = output_limit;
        self
    }

    pub fn with_docker_bin(mut self, docker_bin: impl Into<PathBuf>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }
}
