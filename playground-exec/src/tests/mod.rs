use std::sync::Arc;
use tokio::time::Duration;

use crate::{
    CodeExecutionService, Error, ExecutionRequest, ExecutionStatus, Language, LanguageRegistry,
    PullError, Result, ValidationError,
};
use fixtures::{code_samples::*, test_scenarios::*};
use utils::defaults::{short_timeout, test_config};
use utils::engine::{RecordingEngine, RunBehavior};


fn service_with(engine: Arc<RecordingEngine>) -> CodeExecutionService {
    CodeExecutionService::with_engine(test_config(), LanguageRegistry::builtin(), engine)
}

#[tokio::test]
async fn test_python_hello_passes_code_as_one_argument() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    let service = service_with(engine.clone());

    let result = service
        .execute(ExecutionRequest::new(Language::Python, PYTHON_HELLO))
        .await?;

    assert_eq!(result.status, ExecutionStatus::Completed { exit_code: 0 });
    assert!(result.stderr.is_empty());

    let runs = engine.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].image, "python:3.9-slim");
    assert_eq!(runs[0].argv, vec!["python", "-c", PYTHON_HELLO]);
    assert!(runs[0].stdin.is_none());
    Ok(())
}

#[tokio::test]
async fn test_input_reaches_stdin_unchanged() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    let service = service_with(engine.clone());

    let request = ExecutionRequest::new(Language::Python, PYTHON_CAT).with_input(HOSTILE_INPUT);
    let result = service.execute(request).await?;

    assert_eq!(result.stdout, HOSTILE_INPUT.as_bytes());
    assert_eq!(
        engine.runs()[0].stdin.as_deref(),
        Some(HOSTILE_INPUT.as_bytes())
    );
    assert!(engine.runs()[0]
        .argv
        .iter()
        .all(|arg| !arg.contains("pwned")));
    Ok(())
}

#[tokio::test]
async fn test_empty_input_binds_no_stdin() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    let service = service_with(engine.clone());

    let request = ExecutionRequest::new(Language::JavaScript, JS_HELLO).with_input("");
    let result = service.execute(request).await?;

    assert!(result.stdout.is_empty());
    assert!(engine.runs()[0].stdin.is_none());
    Ok(())
}

#[tokio::test]
async fn test_compiled_source_is_materialized_verbatim() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    let service = service_with(engine.clone());

    service
        .execute(ExecutionRequest::new(Language::Java, JAVA_HELLO))
        .await?;

    let runs = engine.runs();
    let run = &runs[0];
    assert_eq!(
        run.files,
        vec![("Main.java".to_string(), JAVA_HELLO.as_bytes().to_vec())]
    );
    assert!(run.argv.iter().all(|arg| !arg.contains("System.out")));
    assert_eq!(run.argv.last().map(String::as_str), Some("Main.java"));
    // Workspace is removed with the job.
    assert!(!run.workspace.exists());
    Ok(())
}

#[tokio::test]
async fn test_unregistered_language_never_touches_engine() {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    let service = CodeExecutionService::with_engine(
        test_config(),
        LanguageRegistry::builtin().restrict(&[Language::Python]),
        engine.clone(),
    );

    let result = service
        .execute(ExecutionRequest::new(Language::Go, GO_HELLO))
        .await;

    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::UnsupportedLanguage(ref name))) if name == "go"
    ));
    assert!(engine.pulls().is_empty());
    assert!(engine.runs().is_empty());
}

#[tokio::test]
async fn test_empty_and_oversized_code_rejected() {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    let service = service_with(engine.clone());

    for code in ["", "   \n\t"] {
        let result = service
            .execute(ExecutionRequest::new(Language::Python, code))
            .await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::EmptyCode))
        ));
    }

    let huge = "#".repeat(test_config().max_code_bytes + 1);
    let result = service
        .execute(ExecutionRequest::new(Language::Python, huge))
        .await;
    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::CodeTooLarge { .. }))
    ));

    let request = ExecutionRequest::new(Language::Python, PYTHON_CAT)
        .with_input("x".repeat(test_config().max_input_bytes + 1));
    assert!(matches!(
        service.execute(request).await,
        Err(Error::Validation(ValidationError::InputTooLarge { .. }))
    ));

    assert!(engine.pulls().is_empty());
    assert!(engine.runs().is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_is_a_normal_result() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Exit {
        code: 3,
        stderr: "bad things\n",
    });
    let service = service_with(engine);

    let result = service
        .execute(ExecutionRequest::new(Language::Python, PYTHON_STDERR_EXIT))
        .await?;

    assert_eq!(result.status, ExecutionStatus::Completed { exit_code: 3 });
    assert_eq!(result.status.to_string(), "error");
    assert_eq!(result.stderr_lossy(), "bad things\n");
    Ok(())
}

#[tokio::test]
async fn test_timeout_reports_partial_output() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Hang {
        partial: "started\n",
    });
    let service = CodeExecutionService::with_engine(
        test_config().with_timeout(short_timeout()),
        LanguageRegistry::builtin(),
        engine.clone(),
    );

    let result = service
        .execute(ExecutionRequest::new(Language::Python, PYTHON_LOOP))
        .await?;

    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert_eq!(result.stdout_lossy(), "started\n");
    assert_eq!(engine.runs()[0].timeout, short_timeout());
    assert_eq!(engine.running(), 0);
    Ok(())
}

#[tokio::test]
async fn test_oom_kill_reports_killed() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::OomKilled);
    let service = service_with(engine);

    let result = service
        .execute(ExecutionRequest::new(Language::Cpp, CPP_HELLO))
        .await?;
    assert_eq!(result.status, ExecutionStatus::Killed);
    assert_eq!(result.status.exit_code(), None);
    Ok(())
}

#[tokio::test]
async fn test_program_exit_137_is_a_normal_result() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Exit {
        code: 137,
        stderr: "",
    });
    let service = service_with(engine);

    let result = service
        .execute(ExecutionRequest::new(Language::Python, "import sys; sys.exit(137)"))
        .await?;
    assert_eq!(result.status, ExecutionStatus::Completed { exit_code: 137 });
    Ok(())
}

#[tokio::test]
async fn test_hung_registry_gives_up_and_frees_the_slot() {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    engine.set_pull_delay(Duration::from_secs(3600));
    let service = CodeExecutionService::with_engine(
        test_config().with_timeout(short_timeout()),
        LanguageRegistry::builtin(),
        engine.clone(),
    );

    let result = tokio::time::timeout(
        Duration::from_secs(3),
        service.execute(ExecutionRequest::new(Language::Python, PYTHON_HELLO)),
    )
    .await
    .expect("a hung pull must not hold the request");

    assert!(matches!(result, Err(Error::ImageUnavailable { .. })));
    assert_eq!(
        engine.pulls().len() as u32,
        test_config().pull_policy.max_attempts
    );
    assert!(engine.runs().is_empty());
    assert_eq!(service.get_available_slots(), service.max_concurrent());
}

#[tokio::test]
async fn test_launch_failure_does_not_poison_later_requests() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::LaunchFailure);
    let service = service_with(engine.clone());

    let result = service
        .execute(ExecutionRequest::new(Language::Python, PYTHON_HELLO))
        .await;
    match result {
        Err(e @ Error::LaunchFailed(_)) => assert!(e.is_service_fault()),
        other => panic!("expected launch failure, got {:?}", other),
    }
    assert_eq!(service.get_available_slots(), service.max_concurrent());

    engine.set_behavior(RunBehavior::Echo);
    let result = service
        .execute(ExecutionRequest::new(Language::Python, PYTHON_HELLO))
        .await?;
    assert!(result.status.is_success());
    Ok(())
}

#[tokio::test]
async fn test_unavailable_image_is_a_service_error() {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    engine.script_pulls([Err(PullError::NotFound("manifest unknown".into()))]);
    let service = service_with(engine.clone());

    let result = service
        .execute(ExecutionRequest::new(Language::Go, GO_HELLO))
        .await;

    match result {
        Err(Error::ImageUnavailable { image, reason }) => {
            assert_eq!(image, "golang:1.22-alpine");
            assert_eq!(reason, "manifest unknown");
        }
        other => panic!("expected image error, got {:?}", other),
    }
    assert!(engine.runs().is_empty());
}

#[tokio::test]
async fn test_admission_gate_bounds_concurrency() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Sleep(Duration::from_millis(50)));
    let service = service_with(engine.clone());
    let bound = service.max_concurrent();
    assert_eq!(bound, 2);

    let mut handles = vec![];
    for i in 0..8 {
        let service = service.clone();
        let request = ExecutionRequest::new(Language::Python, format!("print({})", i));
        handles.push(tokio::spawn(async move { service.execute(request).await }));
    }

    for handle in handles {
        let result = handle.await.unwrap()?;
        assert!(result.status.is_success());
    }

    assert_eq!(engine.runs().len(), 8);
    assert_eq!(engine.peak(), bound);
    assert_eq!(service.get_available_slots(), bound);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_request_releases_its_slot() {
    let engine = RecordingEngine::new(RunBehavior::Sleep(Duration::from_secs(30)));
    let service = service_with(engine.clone());

    let cancelled = tokio::time::timeout(
        Duration::from_millis(100),
        service.execute(ExecutionRequest::new(Language::Python, PYTHON_LOOP)),
    )
    .await;

    assert!(cancelled.is_err());
    assert_eq!(engine.running(), 0);
    assert_eq!(service.get_available_slots(), service.max_concurrent());
}

#[tokio::test]
async fn test_each_request_gets_its_own_sandbox() -> Result<()> {
    let engine = RecordingEngine::new(RunBehavior::Echo);
    let service = service_with(engine.clone());

    for _ in 0..3 {
        service
            .execute(ExecutionRequest::new(Language::Python, PYTHON_HELLO))
            .await?;
    }

    let runs = engine.runs();
    assert_eq!(runs.len(), 3);
    assert_ne!(runs[0].name, runs[1].name);
    assert_ne!(runs[1].name, runs[2].name);
    assert!(runs.iter().all(|run| run.name.starts_with("playground-")));
    assert!(runs
        .iter()
        .all(|run| run.limits == test_config().limits));
    Ok(())
}
