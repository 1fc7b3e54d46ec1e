//! The narrow container-engine contract the runtime adapter depends on

mod docker;

pub use docker::DockerCli;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    error::{EngineError, PullError},
    types::ResourceLimits,
};

/// Everything needed to start one sandbox.
#[derive(Debug, Clone)]
pub struct ContainerSpec<'a> {
    /// Unique container name, used to kill and remove it
    pub name: &'a str,
    pub image: &'a str,
    pub argv: &'a [String],
    pub env: &'a [(String, String)],
    /// `None` leaves stdin unattached
    pub stdin: Option<&'a [u8]>,
    pub limits: &'a ResourceLimits,
    pub timeout: Duration,
    /// Host directory mounted at [`WORKSPACE_MOUNT`] and used as working directory
    pub workspace: &'a Path,
    /// Host directory for engine bookkeeping, never visible inside the sandbox
    pub state_dir: &'a Path,
    /// Per-stream capture cap in bytes
    pub output_limit: usize,
}

pub const WORKSPACE_MOUNT: &str = "/workspace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The sandboxed command exited with this code
    Exited(i32),
    /// The engine client died from a signal before reporting a code
    Signaled,
    /// The kernel OOM killer ended the sandbox
    Killed,
    /// The deadline expired and the sandbox was killed
    TimedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit: RunExit,
    pub stdout: Captured,
    pub stderr: Captured,
    pub duration: Duration,
}

/// A container engine able to fetch images and run one-shot sandboxes.
///
/// `run` owns the sandbox for its whole lifetime: it must enforce
/// `spec.timeout`, and the sandbox must be gone once the call returns or the
/// future is dropped.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn pull(&self, image: &str) -> Result<(), PullError>;

    async fn run(&self, spec: ContainerSpec<'_>) -> Result<RunOutput, EngineError>;
}

/// Read a stream to EOF, keeping at most `limit` bytes.
///
/// Reading continues past the limit so the writer never blocks on a full pipe.
pub(crate) async fn capture<R>(mut reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(captured)
}
