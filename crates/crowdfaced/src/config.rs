use std::path::{Path, PathBuf};
use std::str::FromStr;

use crowdface_core::{SnapshotSettings, Thresholds};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What `Register` does with a captured face that already strictly matches
/// a stored identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnrollPolicy {
    /// Always create a new record per captured face.
    AlwaysCreate,
    /// Append the face as a new angle of the strict match and rename it.
    MergeStrictMatch,
}

impl FromStr for EnrollPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always-create" => Ok(EnrollPolicy::AlwaysCreate),
            "merge-strict-match" => Ok(EnrollPolicy::MergeStrictMatch),
            other => Err(format!("unknown enroll policy {other:?}")),
        }
    }
}

/// Which D-Bus bus the daemon claims its name on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(BusKind::Session),
            "system" => Ok(BusKind::System),
            other => Err(format!("unknown bus {other:?}")),
        }
    }
}

/// Daemon configuration: defaults, then an optional TOML file named by
/// `CROWDFACE_CONFIG`, then `CROWDFACE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Distance below which a probe is confidently the same person.
    pub strict_threshold: f32,
    /// Distance below which a probe is close enough not to become a new identity.
    pub loose_threshold: f32,
    /// Distance below which two captures in one enrollment are the same person.
    pub capture_threshold: f32,
    /// Whether a loose match adds the probe as a new angle of the matched identity.
    pub append_angle_on_loose_match: bool,
    pub enroll_policy: EnrollPolicy,
    /// Length of the recent-sightings list.
    pub max_recent: usize,
    /// Pixels of context kept around a face in its snapshot.
    pub snapshot_margin: u32,
    /// JPEG quality of snapshots.
    pub snapshot_quality: u8,
    pub bus: BusKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("faces.db"),
            strict_threshold: 0.45,
            loose_threshold: 0.55,
            capture_threshold: 0.6,
            append_angle_on_loose_match: false,
            enroll_policy: EnrollPolicy::AlwaysCreate,
            max_recent: 20,
            snapshot_margin: 20,
            snapshot_quality: 80,
            bus: BusKind::Session,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("CROWDFACE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `CROWDFACE_*` overrides obtained through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("CROWDFACE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        override_with(&lookup, "CROWDFACE_STRICT_THRESHOLD", &mut self.strict_threshold);
        override_with(&lookup, "CROWDFACE_LOOSE_THRESHOLD", &mut self.loose_threshold);
        override_with(&lookup, "CROWDFACE_CAPTURE_THRESHOLD", &mut self.capture_threshold);
        override_with(&lookup, "CROWDFACE_ENROLL_POLICY", &mut self.enroll_policy);
        override_with(&lookup, "CROWDFACE_MAX_RECENT", &mut self.max_recent);
        override_with(&lookup, "CROWDFACE_SNAPSHOT_MARGIN", &mut self.snapshot_margin);
        override_with(&lookup, "CROWDFACE_SNAPSHOT_QUALITY", &mut self.snapshot_quality);
        override_with(&lookup, "CROWDFACE_BUS", &mut self.bus);
        if let Some(v) = lookup("CROWDFACE_APPEND_ANGLE_ON_LOOSE_MATCH") {
            self.append_angle_on_loose_match = matches!(v.as_str(), "1" | "true");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !(self.capture_threshold > 0.0) {
            return Err(ConfigError::Invalid("capture_threshold must be positive".into()));
        }
        if self.max_recent == 0 {
            return Err(ConfigError::Invalid("max_recent must be at least 1".into()));
        }
        if !(1..=100).contains(&self.snapshot_quality) {
            return Err(ConfigError::Invalid("snapshot_quality must be within 1..=100".into()));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            strict: self.strict_threshold,
            loose: self.loose_threshold,
        }
    }

    pub fn snapshot(&self) -> SnapshotSettings {
        SnapshotSettings {
            margin: self.snapshot_margin,
            quality: self.snapshot_quality,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("crowdface")
}

fn override_with<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
    }
}
