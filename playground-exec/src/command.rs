//! Turns a language profile and a request into a [`SandboxJob`].
//!
//! User content never reaches a shell. Inline code is substituted for a whole
//! argv element, file-delivered code is written as raw bytes, and input is
//! bound to stdin. When a profile needs a compile step, both phases run in
//! one sandbox through a `sh -c` script assembled only from the profile's
//! constant tokens, with the source file name passed as `$1`.

use std::time::Duration;
use uuid::Uuid;

use crate::{
    languages::{LanguageProfile, SourceDelivery, FILE_TOKEN, SOURCE_TOKEN},
    types::{Language, ResourceLimits},
};

/// A file materialized in the sandbox workspace before the job starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// One execution attempt. Owned by a single request and dropped afterwards.
#[derive(Debug, Clone)]
pub struct SandboxJob {
    pub id: Uuid,
    pub language: Language,
    pub image: String,
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub files: Vec<WorkspaceFile>,
    pub stdin: Option<Vec<u8>>,
    pub limits: ResourceLimits,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    limits: ResourceLimits,
    timeout: Duration,
}

impl CommandBuilder {
    pub fn new(limits: ResourceLimits, timeout: Duration) -> Self {
        Self { limits, timeout }
    }

    pub fn build(&self, profile: &LanguageProfile, code: &str, input: Option<&str>) -> SandboxJob {
        let (argv, files) = match profile.source {
            SourceDelivery::Inline => (substitute(profile.run, code, ""), Vec::new()),
            SourceDelivery::File(name) => {
                let argv = match profile.build {
                    Some(build) => phased_argv(build, profile.run, name),
                    None => substitute(profile.run, "", name),
                };
                let file = WorkspaceFile {
                    name: name.to_string(),
                    contents: code.as_bytes().to_vec(),
                };
                (argv, vec![file])
            }
        };

        SandboxJob {
            id: Uuid::new_v4(),
            language: profile.language,
            image: profile.image.clone(),
            argv,
            env: profile
                .env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files,
            stdin: input
                .filter(|input| !input.is_empty())
                .map(|input| input.as_bytes().to_vec()),
            limits: self.limits.clone(),
            timeout: match profile.build {
                Some(_) => self.timeout + profile.build_allowance,
                None => self.timeout,
            },
        }
    }
}

fn substitute(template: &[&str], code: &str, file: &str) -> Vec<String> {
    template
        .iter()
        .map(|token| match *token {
            SOURCE_TOKEN => code.to_string(),
            FILE_TOKEN => file.to_string(),
            literal => literal.to_string(),
        })
        .collect()
}

fn phased_argv(build: &[&str], run: &[&str], file: &str) -> Vec<String> {
    let script = format!("{} && exec {}", script_words(build), script_words(run));
    vec![
        "sh".to_string(),
        "-c".to_string(),
        script,
        // $0, then $1
        "sh".to_string(),
        file.to_string(),
    ]
}

fn script_words(template: &[&str]) -> String {
    template
        .iter()
        .map(|token| match *token {
            FILE_TOKEN => "\"$1\"".to_string(),
            literal => quote(literal),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}
