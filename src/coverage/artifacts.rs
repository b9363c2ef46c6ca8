//! Test binaries discovered across unit targets.

use camino::Utf8PathBuf;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ArtifactMessage {
    #[serde(default)]
    profile: Option<ArtifactProfile>,
    #[serde(default)]
    filenames: Vec<Utf8PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ArtifactProfile {
    #[serde(default)]
    test: bool,
}

/// Extracts test binaries from cargo's `--message-format=json` output.
///
/// Only `compiler-artifact` messages built with the test profile count;
/// macOS debug-symbol bundles are skipped. Lines that are not JSON objects
/// or do not describe an artifact are ignored.
#[must_use]
pub fn parse_test_objects(messages: &str) -> Vec<Utf8PathBuf> {
    messages
        .lines()
        .filter(|line| line.trim_start().starts_with('{'))
        .filter_map(|line| serde_json::from_str::<ArtifactMessage>(line).ok())
        .filter(|message| message.profile.as_ref().is_some_and(|profile| profile.test))
        .flat_map(|message| message.filenames)
        .filter(|path| path.extension() != Some("dSYM"))
        .collect()
}

/// Ordered, duplicate-free set of test binaries handed to the exporter.
///
/// The orchestrator owns one accumulator per run and passes it to
/// [`super::CoverageCollector::discover`] after each unit target.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CoverageArtifacts {
    objects: Vec<Utf8PathBuf>,
}

impl CoverageArtifacts {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds binaries not seen before, keeping first-seen order.
    pub fn record(&mut self, objects: impl IntoIterator<Item = Utf8PathBuf>) {
        for object in objects {
            if !self.objects.contains(&object) {
                self.objects.push(object);
            }
        }
    }

    /// Binaries recorded so far.
    #[must_use]
    pub fn objects(&self) -> &[Utf8PathBuf] {
        &self.objects
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(super) fn object_args(&self) -> impl Iterator<Item = String> + '_ {
        self.objects
            .iter()
            .map(|object| format!("--object={object}"))
    }
}
