use super::{LanguageProfile, SourceDelivery, FILE_TOKEN};
use crate::types::Language;
use std::time::Duration;

pub const IMAGE: &str = "openjdk:17-jdk-slim";

/// javac insists the file name matches the public class.
const SOURCE_FILE: &str = "Main.java";

pub(crate) fn profile() -> LanguageProfile {
    LanguageProfile {
        language: Language::Java,
        image: IMAGE.to_string(),
        source: SourceDelivery::File(SOURCE_FILE),
        build: Some(&["javac", "-encoding", "UTF-8", FILE_TOKEN]),
        build_allowance: Duration::from_secs(5),
        run: &["java", "-cp", ".", "Main"],
        env: &[],
    }
}
