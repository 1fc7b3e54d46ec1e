use super::{LanguageProfile, SourceDelivery, FILE_TOKEN};
use crate::types::Language;
use std::time::Duration;

pub const IMAGE: &str = "gcc:13";

pub(crate) fn profile() -> LanguageProfile {
    LanguageProfile {
        language: Language::Cpp,
        image: IMAGE.to_string(),
        source: SourceDelivery::File("main.cpp"),
        build: Some(&["g++", "-O2", "-std=c++17", "-o", "main", FILE_TOKEN]),
        build_allowance: Duration::from_secs(5),
        run: &["./main"],
        env: &[],
    }
}
