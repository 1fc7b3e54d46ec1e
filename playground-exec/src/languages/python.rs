use super::{LanguageProfile, SourceDelivery, SOURCE_TOKEN};
use crate::types::Language;
use std::time::Duration;

pub const IMAGE: &str = "python:3.9-slim";

pub(crate) fn profile() -> LanguageProfile {
    LanguageProfile {
        language: Language::Python,
        image: IMAGE.to_string(),
        source: SourceDelivery::Inline,
        build: None,
        build_allowance: Duration::ZERO,
        run: &["python", "-c", SOURCE_TOKEN],
        env: &[("PYTHONUNBUFFERED", "1"), ("PYTHONDONTWRITEBYTECODE", "1")],
    }
}
