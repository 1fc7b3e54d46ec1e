//! # Playground Execution Engine
//!
//! Runs untrusted code snippets in network-isolated, resource-capped
//! containers and returns their captured output.
//!
//! A request flows through four parts: the [`LanguageRegistry`] resolves a
//! profile, the [`CommandBuilder`] turns it into a [`SandboxJob`] without ever
//! interpolating user content into a shell, the [`SandboxRuntime`] verifies
//! the image and runs the job on a [`ContainerEngine`], and the
//! [`CodeExecutionService`] ties them together behind an admission gate.

mod command;
mod config;
mod engine;
mod error;
mod languages;
mod sandbox;
mod service;
mod types;

#[cfg(test)]
mod tests;

pub use command::{CommandBuilder, SandboxJob, WorkspaceFile};
pub use config::{PullPolicy, SandboxConfig};
pub use engine::{
    Captured, ContainerEngine, ContainerSpec, DockerCli, RunExit, RunOutput, WORKSPACE_MOUNT,
};
pub use error::{EngineError, Error, ErrorKind, PullError, ValidationError};
pub use languages::{LanguageProfile, LanguageRegistry, SourceDelivery, FILE_TOKEN, SOURCE_TOKEN};
pub use sandbox::{JobState, SandboxRuntime};
pub use service::CodeExecutionService;
pub use types::{ExecutionRequest, ExecutionResult, ExecutionStatus, Language, ResourceLimits};

/// Result type for code execution operations
pub type Result<T> = std::result::Result<T, Error>;
