use super::{LanguageProfile, SourceDelivery, FILE_TOKEN};
use crate::types::Language;
use std::time::Duration;

pub const IMAGE: &str = "golang:1.22-alpine";

pub(crate) fn profile() -> LanguageProfile {
    LanguageProfile {
        language: Language::Go,
        image: IMAGE.to_string(),
        source: SourceDelivery::File("main.go"),
        build: Some(&["go", "build", "-o", "main", FILE_TOKEN]),
        // The build cache starts empty, so the standard library is compiled every time.
        build_allowance: Duration::from_secs(20),
        run: &["./main"],
        // No network in the sandbox, so the toolchain must not try to fetch anything.
        env: &[
            ("CGO_ENABLED", "0"),
            ("GOCACHE", "/tmp/go-cache"),
            ("GOTOOLCHAIN", "local"),
            ("GOPROXY", "off"),
        ],
    }
}
