//! Meter configuration loading.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::{error::ConfigError, report::ConsumerNames, sampledir::DEFAULT_SAMPLE_GLOB};

/// Role of a meter in the allocation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum LocationTag {
    /// The local generator.
    Generator,
    /// The on-site consumer.
    Here,
    /// The neighbouring consumer.
    Neighbour,
    /// Sentinel for an unrecognized tag; never valid in a report.
    Unknown,
}

impl LocationTag {
    /// The three locations a report allocates between.
    pub const REPORTABLE: [LocationTag; 3] = [
        LocationTag::Generator,
        LocationTag::Here,
        LocationTag::Neighbour,
    ];

    /// Parses a tag name, yielding [`LocationTag::Unknown`] for anything
    /// unrecognized.
    pub fn from_tag(tag: &str) -> LocationTag {
        tag.parse().unwrap_or(LocationTag::Unknown)
    }
}

/// Meter configuration: which directories feed each location, how the
/// consumers are labelled, and the report timezone and quantum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Root directory containing the per-meter sample directories.
    pub root: PathBuf,

    /// IANA timezone name for report rows and month boundaries.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Display name of the local consumer in report headers.
    #[serde(default = "default_here_name")]
    pub here_name: String,

    /// Display name of the neighbouring consumer in report headers.
    #[serde(default = "default_neighbour_name")]
    pub neighbour_name: String,

    /// Usage quantum in minutes.
    #[serde(default = "default_quantum_minutes")]
    pub quantum_minutes: u32,

    /// Glob selecting sample files within each meter directory.
    #[serde(default = "default_sample_glob")]
    pub sample_glob: String,

    /// Meter directory names per location, relative to `root`.
    pub locations: BTreeMap<LocationTag, Vec<String>>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_here_name() -> String {
    "here".to_string()
}

fn default_neighbour_name() -> String {
    "neighbour".to_string()
}

fn default_quantum_minutes() -> u32 {
    1
}

fn default_sample_glob() -> String {
    DEFAULT_SAMPLE_GLOB.to_string()
}

impl MeterConfig {
    /// Loads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<MeterConfig, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: MeterConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded meter configuration");
        Ok(config)
    }

    /// Checks the invariants the catalog and report engine rely on: every
    /// reportable location has at least one meter directory, the timezone
    /// resolves, and the quantum tiles an hour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for tag in LocationTag::REPORTABLE {
            if self
                .locations
                .get(&tag)
                .is_none_or(|dirs| dirs.is_empty())
            {
                return Err(ConfigError::MissingLocation(tag));
            }
        }
        if self.quantum_minutes == 0 || 60 % self.quantum_minutes != 0 {
            return Err(ConfigError::Quantum(self.quantum_minutes));
        }
        self.tz()?;
        Ok(())
    }

    /// The configured report timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    /// The configured usage quantum.
    pub fn quantum(&self) -> Duration {
        Duration::minutes(i64::from(self.quantum_minutes))
    }

    /// The configured consumer labels.
    pub fn names(&self) -> ConsumerNames {
        ConsumerNames {
            here: self.here_name.clone(),
            neighbour: self.neighbour_name.clone(),
        }
    }
}
