use dashmap::DashMap;
use std::{fmt, path::PathBuf, sync::Arc};
use tempfile::TempDir;
use tokio::{fs, sync::OnceCell, time};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    command::SandboxJob,
    config::{PullPolicy, SandboxConfig},
    engine::{ContainerEngine, ContainerSpec, RunExit},
    error::{Error, PullError},
    types::{ExecutionResult, ExecutionStatus},
};

/// Lifecycle of one [`SandboxJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    ImageVerifying,
    Running,
    Completed,
    TimedOut,
    Killed,
    ImageUnavailable,
    LaunchFailed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobState::Pending | JobState::ImageVerifying | JobState::Running
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::ImageVerifying => "image_verifying",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::TimedOut => "timed_out",
            JobState::Killed => "killed",
            JobState::ImageUnavailable => "image_unavailable",
            JobState::LaunchFailed => "launch_failed",
        };
        f.write_str(name)
    }
}

struct Transitions {
    job_id: Uuid,
    state: JobState,
}

impl Transitions {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            state: JobState::Pending,
        }
    }

    fn enter(&mut self, next: JobState) {
        debug_assert!(!self.state.is_terminal(), "job left a terminal state");
        debug!(job_id = %self.job_id, from = %self.state, to = %next, "job state");
        self.state = next;
    }
}

/// Images verified (or known to be unpullable) during this process lifetime.
#[derive(Default)]
struct ImageCache {
    verified: DashMap<String, Arc<OnceCell<()>>>,
    unavailable: DashMap<String, String>,
}

/// Runs [`SandboxJob`]s on a container engine.
pub struct SandboxRuntime {
    engine: Arc<dyn ContainerEngine>,
    images: ImageCache,
    pull_policy: PullPolicy,
    output_limit: usize,
    workspace_root: Option<PathBuf>,
}

impl SandboxRuntime {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: &SandboxConfig) -> Self {
        Self {
            engine,
            images: ImageCache::default(),
            pull_policy: config.pull_policy.clone(),
            output_limit: config.output_limit,
            workspace_root: config.workspace_root.clone(),
        }
    }

    /// Run one job to a terminal state.
    ///
    /// Program failures, timeouts and kills are `Ok`; only image and launch
    /// problems are errors. The sandbox and its workspace are gone when this
    /// returns, and also when the returned future is dropped early.
    pub async fn run(&self, job: SandboxJob) -> Result<ExecutionResult, Error> {
        let mut transitions = Transitions::new(job.id);

        transitions.enter(JobState::ImageVerifying);
        if let Err(e) = self.ensure_image(&job.image).await {
            transitions.enter(JobState::ImageUnavailable);
            return Err(e);
        }

        transitions.enter(JobState::Running);
        let scratch = match self.prepare_workspace(&job).await {
            Ok(scratch) => scratch,
            Err(e) => {
                transitions.enter(JobState::LaunchFailed);
                error!(job_id = %job.id, "failed to prepare workspace: {}", e);
                return Err(Error::LaunchFailed(format!("workspace: {}", e)));
            }
        };

        let name = format!("playground-{}", job.id);
        let workspace = scratch.path().join("workspace");
        let spec = ContainerSpec {
            name: &name,
            image: &job.image,
            argv: &job.argv,
            env: &job.env,
            stdin: job.stdin.as_deref(),
            limits: &job.limits,
            timeout: job.timeout,
            workspace: &workspace,
            state_dir: scratch.path(),
            output_limit: self.output_limit,
        };

        let output = match self.engine.run(spec).await {
            Ok(output) => output,
            Err(e) => {
                transitions.enter(JobState::LaunchFailed);
                error!(job_id = %job.id, image = %job.image, "sandbox launch failed: {}", e);
                return Err(e.into());
            }
        };

        let status = match output.exit {
            RunExit::Exited(exit_code) => ExecutionStatus::Completed { exit_code },
            RunExit::Killed | RunExit::Signaled => ExecutionStatus::Killed,
            RunExit::TimedOut => ExecutionStatus::TimedOut,
        };
        transitions.enter(match status {
            ExecutionStatus::Completed { .. } => JobState::Completed,
            ExecutionStatus::TimedOut => JobState::TimedOut,
            ExecutionStatus::Killed => JobState::Killed,
        });

        Ok(ExecutionResult {
            status,
            truncated: output.stdout.truncated || output.stderr.truncated,
            stdout: output.stdout.bytes,
            stderr: output.stderr.bytes,
            duration: output.duration,
        })
    }

    /// Whether `image` was pulled successfully during this process lifetime.
    pub fn is_verified(&self, image: &str) -> bool {
        self.images
            .verified
            .get(image)
            .is_some_and(|cell| cell.initialized())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), Error> {
        if let Some(reason) = self.images.unavailable.get(image) {
            return Err(Error::ImageUnavailable {
                image: image.to_string(),
                reason: reason.value().clone(),
            });
        }

        // One shared cell per image, so concurrent first requests share one pull.
        let cell = self
            .images
            .verified
            .entry(image.to_string())
            .or_default()
            .value()
            .clone();
        cell.get_or_try_init(|| self.pull_with_retry(image))
            .await
            .map(|_| ())
    }

    async fn pull_with_retry(&self, image: &str) -> Result<(), Error> {
        let mut attempt = 1;
        loop {
            // A concurrent waiter may have hit a permanent failure first.
            if let Some(reason) = self.images.unavailable.get(image) {
                return Err(Error::ImageUnavailable {
                    image: image.to_string(),
                    reason: reason.value().clone(),
                });
            }

            let pulled = time::timeout(self.pull_policy.attempt_timeout, self.engine.pull(image))
                .await
                .unwrap_or_else(|_| {
                    Err(PullError::Transient(format!(
                        "no response within {:?}",
                        self.pull_policy.attempt_timeout
                    )))
                });

            match pulled {
                Ok(()) => {
                    info!(image, attempt, "image verified");
                    return Ok(());
                }
                Err(PullError::NotFound(reason)) => {
                    error!(image, %reason, "image cannot be pulled");
                    self.images
                        .unavailable
                        .insert(image.to_string(), reason.clone());
                    return Err(Error::ImageUnavailable {
                        image: image.to_string(),
                        reason,
                    });
                }
                Err(PullError::Transient(reason)) if attempt < self.pull_policy.max_attempts => {
                    let delay = self.pull_policy.backoff(attempt);
                    warn!(image, attempt, ?delay, %reason, "image pull failed, retrying");
                    time::sleep(delay).await;
                    attempt += 1;
                }
                Err(PullError::Transient(reason)) => {
                    error!(image, attempt, %reason, "image pull failed, giving up");
                    return Err(Error::ImageUnavailable {
                        image: image.to_string(),
                        reason,
                    });
                }
            }
        }
    }

    async fn prepare_workspace(&self, job: &SandboxJob) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("playground-");
        let scratch = match &self.workspace_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let workspace = scratch.path().join("workspace");
        fs::create_dir(&workspace).await?;

        // The sandbox user is not necessarily the host user.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&workspace, std::fs::Permissions::from_mode(0o777)).await?;
        }

        for file in &job.files {
            fs::write(workspace.join(&file.name), &file.contents).await?;
        }

        Ok(scratch)
    }
}
