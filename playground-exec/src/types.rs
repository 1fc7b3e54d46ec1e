use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ValidationError;

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Cpp,
    Go,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::JavaScript,
        Language::Java,
        Language::Cpp,
        Language::Go,
    ];

    /// Canonical identifier used on the wire and in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::Go => "go",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            "go" | "golang" => Ok(Language::Go),
            _ => Err(ValidationError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Code execution request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Programming language
    pub language: Language,
    /// Source code to execute
    pub code: String,
    /// Bytes for the program's stdin. `None` and `Some("")` both mean no stdin.
    #[serde(default)]
    pub input: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self {
            language,
            code: code.into(),
            input: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Input bytes to bind to stdin, if there are any.
    pub fn stdin(&self) -> Option<&[u8]> {
        self.input
            .as_deref()
            .filter(|input| !input.is_empty())
            .map(str::as_bytes)
    }
}

/// How a finished job ended, from the caller's point of view.
///
/// All three variants are ordinary results: the user's program ran and the
/// outcome belongs to the program, not to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The program exited on its own. A non-zero code is the program's failure.
    Completed { exit_code: i32 },
    /// The wall-clock deadline expired and the sandbox was killed.
    TimedOut,
    /// The sandbox was killed outside the timeout path, usually by the OOM killer.
    Killed,
}

impl ExecutionStatus {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionStatus::Completed { exit_code } => Some(*exit_code),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Completed { exit_code: 0 })
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Completed { exit_code: 0 } => f.write_str("success"),
            ExecutionStatus::Completed { .. } => f.write_str("error"),
            ExecutionStatus::TimedOut => f.write_str("timeout"),
            ExecutionStatus::Killed => f.write_str("killed"),
        }
    }
}

/// Execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Program output (stdout), never merged with stderr
    pub stdout: Vec<u8>,
    /// Program diagnostics (stderr)
    pub stderr: Vec<u8>,
    /// Set when either stream exceeded the capture limit
    pub truncated: bool,
    /// Wall-clock time spent in the sandbox
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Resource limits for one sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes; swap is capped at the same value
    pub memory: u64,
    /// CPU share, in CPUs
    pub cpus: f64,
    /// Maximum number of processes inside the sandbox
    pub pids: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory: 512 * 1024 * 1024, // 512MB
            cpus: 1.0,
            pids: 64,
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
