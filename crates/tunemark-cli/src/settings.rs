//! File-backed settings for the CLI

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tunemark_frequency::{FingerprintConfig, IdentifyPolicy, StreamConfig};

/// All tunable knobs, grouped by stage. Missing sections use defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fingerprint: FingerprintConfig,
    pub stream: StreamConfig,
    pub identify: IdentifyPolicy,
}

impl Settings {
    /// Read settings from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading settings {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing settings {}", path.display()))?
            }
            None => Settings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.fingerprint.validate()?;
        self.stream.validate()?;
        self.identify.validate()?;
        Ok(())
    }

    /// Identification policy with command-line overrides applied
    pub fn identify_policy(
        &self,
        min_score: Option<f64>,
        no_threshold: bool,
        top: Option<usize>,
    ) -> IdentifyPolicy {
        let mut policy = self.identify.clone();
        if no_threshold {
            policy.min_score = None;
        } else if let Some(score) = min_score {
            policy.min_score = Some(score);
        }
        if let Some(top) = top {
            policy.max_candidates = top;
        }
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.identify.min_score, Some(20.0));
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"stream": {{"preview_every": 4}}, "identify": {{"max_candidates": 5}}}}"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.stream.preview_every, 4);
        assert_eq!(settings.stream.chunk_secs, 5);
        assert_eq!(settings.identify.max_candidates, 5);
        assert_eq!(settings.fingerprint, FingerprintConfig::default());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"stream": {{"preview_every": 0}}}}"#).unwrap();
        assert!(Settings::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_policy_overrides() {
        let settings = Settings::default();

        let policy = settings.identify_policy(None, true, Some(3));
        assert_eq!(policy.min_score, None);
        assert_eq!(policy.max_candidates, 3);

        let policy = settings.identify_policy(Some(40.0), false, None);
        assert_eq!(policy.min_score, Some(40.0));
    }
}
