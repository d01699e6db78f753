//! flowsim runner
//!
//! Loads a configuration file, applies command-line overrides, and hands the
//! result to [`SimulationEngine`].
//!
//! # Example
//!
//! ```ignore
//! use flowsim_simulator::{load_config, run_config, RunOverrides};
//!
//! let config = load_config("line.toml")?;
//! let config = RunOverrides::default().with_seed(7).apply(config);
//! let result = run_config(config)?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! ```
//!
//! [`SimulationEngine`]: flowsim_simulation::SimulationEngine

mod overrides;

pub use overrides::RunOverrides;

use flowsim_simulation::{SimulationEngine, SimulationError, SimulationResult};
use flowsim_types::SimulationConfig;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// On-disk configuration format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick a format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            other => Err(LoadError::UnsupportedFormat(
                other.unwrap_or_default().to_owned(),
            )),
        }
    }
}

/// Errors reading a configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Unsupported configuration format '{0}': expected .toml or .json")]
    UnsupportedFormat(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse configuration text in the given format. Does not validate.
pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<SimulationConfig, LoadError> {
    let config = match format {
        ConfigFormat::Toml => toml::from_str(contents)?,
        ConfigFormat::Json => serde_json::from_str(contents)?,
    };
    Ok(config)
}

/// Read and parse a configuration file. Does not validate.
pub fn load_config(path: impl AsRef<Path>) -> Result<SimulationConfig, LoadError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let contents = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), ?format, bytes = contents.len(), "Configuration loaded");
    parse_config(&contents, format)
}

/// Validate, build and run.
pub fn run_config(config: SimulationConfig) -> Result<SimulationResult, SimulationError> {
    SimulationEngine::new(config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsim_simulation::RunStatus;
    use flowsim_types::{OffsetMode, OffsetType};

    const LINE_TOML: &str = r#"
[simulation]
duration = 1000
random_seed = 42

[[devices]]
id = "A"
capacity = 1

[[devices]]
id = "B"

[[flows]]
flow_id = "F1"
from_device = "A"
to_device = "B"
process_time_range = [10, 10]
offset_mode = "sequence"

[[flows]]
flow_id = "F2"
from_device = "B"
to_device = "A"
process_time_range = [15, 15]
dependencies = ["F1"]
offset_type = "finish-to-start"
"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/b.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("run.JSON")).unwrap(),
            ConfigFormat::Json
        );
        assert!(matches!(
            ConfigFormat::from_path(Path::new("run.yaml")),
            Err(LoadError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
        assert!(ConfigFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_parse_toml_and_run() {
        let config = parse_config(LINE_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.flows[0].offset_mode, OffsetMode::Sequence);
        assert_eq!(config.flows[1].offset_type, OffsetType::FinishToStart);

        let result = run_config(config).unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.flow("F2").unwrap().completed_at, Some(25.0));
    }

    #[test]
    fn test_json_round_trip_of_fixture() {
        let fixture = flowsim_test_helpers::circular_wait();
        let json = serde_json::to_string(&fixture).unwrap();
        let parsed = parse_config(&json, ConfigFormat::Json).unwrap();
        assert_eq!(parsed, fixture);
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            parse_config("{", ConfigFormat::Json),
            Err(LoadError::Json(_))
        ));
        assert!(matches!(
            parse_config("simulation = 3", ConfigFormat::Toml),
            Err(LoadError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/flowsim.toml"),
            Err(LoadError::Io(_))
        ));
    }
}
