use super::{LanguageProfile, SourceDelivery, SOURCE_TOKEN};
use crate::types::Language;
use std::time::Duration;

pub const IMAGE: &str = "node:16-slim";

pub(crate) fn profile() -> LanguageProfile {
    LanguageProfile {
        language: Language::JavaScript,
        image: IMAGE.to_string(),
        source: SourceDelivery::Inline,
        build: None,
        build_allowance: Duration::ZERO,
        run: &["node", "-e", SOURCE_TOKEN],
        env: &[],
    }
}
