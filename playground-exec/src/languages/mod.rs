//! Language profiles: one fixed execution recipe per supported language

mod cpp;
mod go;
mod java;
mod javascript;
mod python;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::{error::ValidationError, types::Language};

/// Replaced by the user's code as a single argv element.
pub const SOURCE_TOKEN: &str = "{source}";
/// Replaced by the profile's source file name.
pub const FILE_TOKEN: &str = "{file}";

/// Where the user's code goes when the job is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDelivery {
    /// Passed as one discrete argument in place of [`SOURCE_TOKEN`].
    Inline,
    /// Written verbatim to this file inside the sandbox workspace.
    File(&'static str),
}

/// Execution recipe for one language.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageProfile {
    pub language: Language,
    pub image: String,
    pub source: SourceDelivery,
    /// Compile step, run in the same sandbox before `run`
    pub build: Option<&'static [&'static str]>,
    /// Added to the job deadline when `build` is set
    pub build_allowance: Duration,
    pub run: &'static [&'static str],
    pub env: &'static [(&'static str, &'static str)],
}

impl LanguageProfile {
    pub fn file_name(&self) -> Option<&'static str> {
        match self.source {
            SourceDelivery::File(name) => Some(name),
            SourceDelivery::Inline => None,
        }
    }
}

/// Read-only table of language profiles.
///
/// Built once at startup; afterwards it is only ever shared behind an `Arc`
/// and looked up without locking.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: BTreeMap<Language, LanguageProfile>,
}

impl LanguageRegistry {
    /// Every language this crate knows how to run.
    pub fn builtin() -> Self {
        let profiles = [
            python::profile(),
            javascript::profile(),
            java::profile(),
            cpp::profile(),
            go::profile(),
        ]
        .into_iter()
        .map(|profile| (profile.language, profile))
        .collect();

        Self { profiles }
    }

    /// Keep only `languages`; anything else resolves as unsupported.
    pub fn restrict(mut self, languages: &[Language]) -> Self {
        self.profiles.retain(|language, _| languages.contains(language));
        self
    }

    /// Swap the image of one profile, e.g. to pin a digest or use a mirror.
    pub fn with_image(mut self, language: Language, image: impl Into<String>) -> Self {
        if let Some(profile) = self.profiles.get_mut(&language) {
            profile.image = image.into();
        }
        self
    }

    pub fn resolve(&self, language: Language) -> Result<&LanguageProfile, ValidationError> {
        self.profiles
            .get(&language)
            .ok_or_else(|| ValidationError::UnsupportedLanguage(language.to_string()))
    }

    pub fn resolve_id(&self, id: &str) -> Result<&LanguageProfile, ValidationError> {
        self.resolve(id.parse()?)
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.profiles.keys().copied()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
