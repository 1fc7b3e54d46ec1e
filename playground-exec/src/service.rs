use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::{
    command::CommandBuilder,
    config::SandboxConfig,
    engine::{ContainerEngine, DockerCli},
    error::{Error, ValidationError},
    languages::{LanguageProfile, LanguageRegistry},
    sandbox::SandboxRuntime,
    types::{ExecutionRequest, ExecutionResult},
};

/// Entry point for the request layer: validate, build, admit, run.
#[derive(Clone)]
pub struct CodeExecutionService {
    registry: Arc<LanguageRegistry>,
    builder: CommandBuilder,
    runtime: Arc<SandboxRuntime>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    max_code_bytes: usize,
    max_input_bytes: usize,
}

impl CodeExecutionService {
    /// Service backed by the `docker` CLI named in `config`.
    pub fn new(config: SandboxConfig, registry: LanguageRegistry) -> Result<Self, Error> {
        let engine = DockerCli::new(&config.docker_bin)?;
        Ok(Self::with_engine(config, registry, Arc::new(engine)))
    }

    pub fn with_engine(
        config: SandboxConfig,
        registry: LanguageRegistry,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            registry: Arc::new(registry),
            builder: CommandBuilder::new(config.limits.clone(), config.timeout),
            runtime: Arc::new(SandboxRuntime::new(engine, &config)),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            max_code_bytes: config.max_code_bytes,
            max_input_bytes: config.max_input_bytes,
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn runtime(&self) -> &SandboxRuntime {
        &self.runtime
    }

    /// Execute one request. Invalid requests fail before any image or
    /// sandbox work and without waiting for an execution slot.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, Error> {
        let profile = self.validate(&request)?;
        let job = self
            .builder
            .build(profile, &request.code, request.input.as_deref());
        let job_id = job.id;

        // Acquire execution permit
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::LaunchFailed(format!("admission gate closed: {}", e)))?;

        debug!(%job_id, language = %request.language, "starting code execution");

        let result = self.runtime.run(job).await;

        match &result {
            Ok(result) => info!(
                %job_id,
                language = %request.language,
                status = %result.status,
                duration_ms = result.duration.as_millis() as u64,
                truncated = result.truncated,
                "code execution finished"
            ),
            Err(e) => error!(
                %job_id,
                language = %request.language,
                kind = %e.kind(),
                "code execution failed: {}",
                e
            ),
        }

        result
    }

    pub fn get_available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    fn validate(&self, request: &ExecutionRequest) -> Result<&LanguageProfile, ValidationError> {
        let profile = self.registry.resolve(request.language)?;

        if request.code.trim().is_empty() {
            return Err(ValidationError::EmptyCode);
        }
        if request.code.len() > self.max_code_bytes {
            return Err(ValidationError::CodeTooLarge {
                size: request.code.len(),
                limit: self.max_code_bytes,
            });
        }
        let input_len = request.input.as_ref().map_or(0, String::len);
        if input_len > self.max_input_bytes {
            return Err(ValidationError::InputTooLarge {
                size: input_len,
                limit: self.max_input_bytes,
            });
        }

        Ok(profile)
    }
}
