use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::{
    io::AsyncWriteExt,
    process::Command,
    runtime::Handle,
    task::JoinHandle,
    time::{self, Duration},
};
use tracing::{debug, error, warn};

use super::{
    capture, Captured, ContainerEngine, ContainerSpec, RunExit, RunOutput, WORKSPACE_MOUNT,
};
use crate::error::{EngineError, PullError};

/// `docker run` exits with this code when the daemon could not run the container.
const DOCKER_RUN_FAILURE: i32 = 125;

/// Upper bound for the bookkeeping commands (`kill`, `rm`, `inspect`) themselves.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// `docker inspect` template read once the sandboxed command has exited.
const INSPECT_FORMAT: &str = "{{.State.OOMKilled}}|{{.State.StartedAt}}|{{.State.Error}}";

/// What the daemon recorded about a finished container.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContainerState {
    started: bool,
    oom_killed: bool,
    error: String,
}

/// Drives the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: PathBuf,
}

impl DockerCli {
    /// Resolve the client binary, searching `PATH` for bare names.
    pub fn new(bin: impl AsRef<Path>) -> Result<Self, EngineError> {
        let bin = which::which(bin.as_ref()).map_err(|e| {
            EngineError::Launch(format!(
                "container engine {} not found: {}",
                bin.as_ref().display(),
                e
            ))
        })?;
        Ok(Self { bin })
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// `docker --version`, used as a startup reachability check.
    pub async fn version(&self) -> Result<String, EngineError> {
        let output = Command::new(&self.bin).arg("--version").output().await?;
        if !output.status.success() {
            return Err(EngineError::Launch(format!(
                "{} --version failed: {}",
                self.bin.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn control(&self, args: &[&str]) {
        let status = time::timeout(
            CONTROL_TIMEOUT,
            Command::new(&self.bin)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status(),
        )
        .await;

        match status {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => debug!("docker {} exited with {}", args.join(" "), status),
            Ok(Err(e)) => error!("docker {} failed: {}", args.join(" "), e),
            Err(_) => error!("docker {} did not finish in time", args.join(" ")),
        }
    }

    async fn inspect(&self, name: &str) -> Option<ContainerState> {
        let output = time::timeout(
            CONTROL_TIMEOUT,
            Command::new(&self.bin)
                .args(["inspect", "--format", INSPECT_FORMAT, name])
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(output)) if output.status.success() => {
                parse_state(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(Ok(output)) => {
                warn!(
                    container = name,
                    "docker inspect failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Ok(Err(e)) => {
                error!(container = name, "docker inspect failed: {}", e);
                None
            }
            Err(_) => {
                error!(container = name, "docker inspect did not finish in time");
                None
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn pull(&self, image: &str) -> Result<(), PullError> {
        debug!(image, "pulling image");

        let output = Command::new(&self.bin)
            .args(["pull", "--quiet", image])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PullError::Transient(format!("failed to run docker pull: {}", e)))?;

        if output.status.success() {
            return Ok(());
        }
        Err(classify_pull_failure(&String::from_utf8_lossy(
            &output.stderr,
        )))
    }

    async fn run(&self, spec: ContainerSpec<'_>) -> Result<RunOutput, EngineError> {
        let cidfile = spec.state_dir.join("container.id");
        let args = run_args(&spec, &cidfile);
        debug!(container = spec.name, "docker {:?}", args);

        // Armed before the container exists so a cancelled future still cleans up.
        let guard = ContainerGuard::new(self.clone(), spec.name.to_string());
        let started = Instant::now();

        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Launch(format!("failed to spawn {}: {}", self.bin.display(), e))
            })?;

        let stdout = spawn_capture(child.stdout.take(), spec.output_limit);
        let stderr = spawn_capture(child.stderr.take(), spec.output_limit);

        if let (Some(input), Some(mut stdin)) = (spec.stdin, child.stdin.take()) {
            let input = input.to_vec();
            tokio::spawn(async move {
                // The program may exit without reading; a broken pipe is not our failure.
                if let Err(e) = stdin.write_all(&input).await {
                    debug!("stdin closed early: {}", e);
                }
                // Dropping `stdin` delivers EOF.
            });
        }

        let exit = match time::timeout(spec.timeout, child.wait()).await {
            Ok(Ok(status)) => match status.code() {
                Some(code) => RunExit::Exited(code),
                None => RunExit::Signaled,
            },
            Ok(Err(e)) => {
                guard.teardown().await;
                return Err(EngineError::Io(e));
            }
            Err(_) => {
                warn!(
                    container = spec.name,
                    "deadline of {:?} exceeded, killing sandbox", spec.timeout
                );
                self.control(&["kill", spec.name]).await;
                let _ = child.start_kill();
                let _ = child.wait().await;
                RunExit::TimedOut
            }
        };
        let duration = started.elapsed();

        let stdout = join_capture(stdout).await?;
        let stderr = join_capture(stderr).await?;
        let created = tokio::fs::try_exists(&cidfile).await.unwrap_or(false);
        let state = match exit {
            RunExit::Exited(_) if created => self.inspect(spec.name).await,
            _ => None,
        };
        guard.teardown().await;

        if let Some(reason) = launch_failure(exit, state.as_ref(), &stderr.bytes) {
            return Err(EngineError::Launch(reason));
        }
        let exit = match (exit, state) {
            (RunExit::Exited(_), Some(state)) if state.oom_killed => RunExit::Killed,
            (exit, _) => exit,
        };

        Ok(RunOutput {
            exit,
            stdout,
            stderr,
            duration,
        })
    }
}

fn run_args(spec: &ContainerSpec<'_>, cidfile: &Path) -> Vec<OsString> {
    let memory = spec.limits.memory;
    let mut args: Vec<OsString> = vec![
        // No `--rm`: the state is inspected after exit, then the guard removes it.
        "run".into(),
        format!("--name={}", spec.name).into(),
        "--network=none".into(),
        format!("--memory={}b", memory).into(),
        format!("--memory-swap={}b", memory).into(),
        format!("--cpus={}", spec.limits.cpus).into(),
        format!("--pids-limit={}", spec.limits.pids).into(),
        "--security-opt=no-new-privileges".into(),
        format!("--workdir={}", WORKSPACE_MOUNT).into(),
    ];

    let mut cid = OsString::from("--cidfile=");
    cid.push(cidfile);
    args.push(cid);

    let mut mount = OsString::from("--mount=type=bind,source=");
    mount.push(spec.workspace);
    mount.push(format!(",target={}", WORKSPACE_MOUNT));
    args.push(mount);

    if spec.stdin.is_some() {
        args.push("--interactive".into());
    }
    for (key, value) in spec.env {
        args.push("--env".into());
        args.push(format!("{}={}", key, value).into());
    }

    args.push(spec.image.into());
    args.extend(spec.argv.iter().map(OsString::from));
    args
}

fn classify_pull_failure(stderr: &str) -> PullError {
    let message = stderr.trim().to_string();
    let lower = message.to_ascii_lowercase();
    let deterministic = [
        "manifest unknown",
        "not found",
        "pull access denied",
        "repository does not exist",
        "invalid reference format",
        "no matching manifest",
    ];

    if deterministic.iter().any(|needle| lower.contains(needle)) {
        PullError::NotFound(message)
    } else {
        PullError::Transient(message)
    }
}

fn parse_state(line: &str) -> Option<ContainerState> {
    let mut fields = line.trim().splitn(3, '|');
    let oom_killed = fields.next()? == "true";
    let started_at = fields.next()?;
    let error = fields.next().unwrap_or_default().trim().to_string();
    Some(ContainerState {
        // Never-started containers report the zero time.
        started: !started_at.is_empty() && !started_at.starts_with("0001-01-01"),
        oom_killed,
        error,
    })
}

/// The reason the sandbox never ran the program, if it did not.
fn launch_failure(exit: RunExit, state: Option<&ContainerState>, stderr: &[u8]) -> Option<String> {
    let RunExit::Exited(code) = exit else {
        return None;
    };
    let client_error = || {
        let message = String::from_utf8_lossy(stderr).trim().to_string();
        if message.is_empty() {
            format!("docker run exited with {}", code)
        } else {
            message
        }
    };

    match state {
        Some(state) if !state.error.is_empty() => Some(state.error.clone()),
        Some(state) if !state.started => Some(client_error()),
        Some(_) => None,
        // Nothing to inspect, so the client's own failure code is all there is.
        None if code == DOCKER_RUN_FAILURE => Some(client_error()),
        None => None,
    }
}

type CaptureTask = JoinHandle<std::io::Result<Captured>>;

fn spawn_capture<R>(reader: Option<R>, limit: usize) -> Option<CaptureTask>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    reader.map(|reader| tokio::spawn(capture(reader, limit)))
}

async fn join_capture(handle: Option<CaptureTask>) -> Result<Captured, EngineError> {
    match handle {
        Some(handle) => handle
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
            .map_err(EngineError::Io),
        None => Ok(Captured::default()),
    }
}

/// Force-removes the named container unless [`teardown`](Self::teardown) ran.
struct ContainerGuard {
    docker: DockerCli,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: DockerCli, name: String) -> Self {
        Self {
            docker,
            name,
            armed: true,
        }
    }

    async fn teardown(mut self) {
        self.armed = false;
        self.docker.control(&["rm", "--force", self.name.as_str()]).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(container = %self.name, "sandbox abandoned before completion, removing");

        let docker = self.docker.clone();
        let name = std::mem::take(&mut self.name);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    docker.control(&["rm", "--force", name.as_str()]).await
                });
            }
            Err(_) => {
                let _ = std::process::Command::new(docker.bin())
                    .args(["rm", "--force", name.as_str()])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
            }
        }
    }
}
