use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sequence::AcquisitionPlan;
use crate::session::SessionConfig;
use crate::types::{ChannelConfig, TriggerConfig, WaveformFormat};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub instrument: InstrumentConfig,
    pub acquisition: AcquisitionConfig,
    pub channel: ChannelConfig,
    pub trigger: TriggerConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InstrumentConfig {
    /// VISA-style resource string, e.g. `TCPIP::192.168.1.100::INSTR`
    pub address: String,
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub opc_timeout_ms: u64,
    /// Must exceed the acquisition window plus trigger wait
    pub acquisition_timeout_ms: u64,
    /// Clear and reset the instrument before configuring it
    pub reset: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    /// Acquisition window in seconds
    pub duration_s: f64,
    /// Fixed record length in points; 0 leaves it to the instrument
    pub record_length: u32,
    pub format: WaveformFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    pub csv_path: String,
    /// Append a UTC timestamp to the CSV file name
    pub timestamped: bool,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            address: "TCPIP::192.168.1.100::INSTR".to_string(),
            connect_timeout_ms: 5_000,
            command_timeout_ms: 10_000,
            opc_timeout_ms: 20_000,
            acquisition_timeout_ms: 20_000,
            reset: true,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            duration_s: 0.05,
            record_length: 1_000_000,
            format: WaveformFormat::Real32,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: "./measurements/measurement_results.csv".to_string(),
            timestamped: false,
            plot: true,
            plot_width: 140,
            plot_height: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrument.address.trim().is_empty() {
            return Err(ConfigError::Message(
                "instrument.address must not be empty".to_string(),
            ));
        }

        let timeouts = [
            ("connect_timeout_ms", self.instrument.connect_timeout_ms),
            ("command_timeout_ms", self.instrument.command_timeout_ms),
            ("opc_timeout_ms", self.instrument.opc_timeout_ms),
            ("acquisition_timeout_ms", self.instrument.acquisition_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "instrument.{name} must be greater than zero"
                )));
            }
        }

        let duration = self.acquisition.duration_s;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ConfigError::Message(format!(
                "acquisition.duration_s must be positive, got {duration}"
            )));
        }
        if Duration::from_millis(self.instrument.acquisition_timeout_ms).as_secs_f64() <= duration {
            return Err(ConfigError::Message(
                "instrument.acquisition_timeout_ms must exceed the acquisition window".to_string(),
            ));
        }
        if self.channel.range_v <= 0.0 {
            return Err(ConfigError::Message(format!(
                "channel.range_v must be positive, got {}",
                self.channel.range_v
            )));
        }
        if self.output.csv_path.trim().is_empty() {
            return Err(ConfigError::Message(
                "output.csv_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(self.instrument.connect_timeout_ms),
            command_timeout: Duration::from_millis(self.instrument.command_timeout_ms),
            opc_timeout: Duration::from_millis(self.instrument.opc_timeout_ms),
            acquisition_timeout: Duration::from_millis(self.instrument.acquisition_timeout_ms),
            ..SessionConfig::default()
        }
    }

    pub fn plan(&self) -> AcquisitionPlan {
        AcquisitionPlan {
            reset: self.instrument.reset,
            channel: self.channel.clone(),
            trigger: self.trigger.clone(),
            duration_s: self.acquisition.duration_s,
            record_length: (self.acquisition.record_length > 0)
                .then_some(self.acquisition.record_length),
            format: self.acquisition.format,
        }
    }

    pub fn csv_path(&self) -> PathBuf {
        PathBuf::from(&self.output.csv_path)
    }
}

/// File picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "scope-acq.toml";

/// Load configuration from file with layered fallbacks.
///
/// Without an explicit path, `scope-acq.toml` in the working directory is used
/// when present. Any invalid value, in the file or the environment, is an error.
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_layered(config_path, Path::new(DEFAULT_CONFIG_FILE))
}

fn load_layered(config_path: Option<&Path>, fallback: &Path) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else if fallback.exists() {
        builder = builder.add_source(File::from(fallback));
    }

    // Environment variable overrides, e.g. SCOPE_ACQ__INSTRUMENT__ADDRESS
    builder = builder.add_source(
        Environment::with_prefix("SCOPE_ACQ")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Coupling, TriggerSlope};
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.instrument.address, "TCPIP::192.168.1.100::INSTR");
        assert_eq!(config.acquisition.duration_s, 0.05);
        assert_eq!(config.channel.coupling, Coupling::Ac);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[instrument]
address = "TCPIP0::10.0.0.7::INSTR"
acquisition_timeout_ms = 30000

[acquisition]
duration_s = 0.1
format = "ascii"

[channel]
channel = 2
coupling = "50OHM"
range_v = 1.0
offset_v = 0.1
enabled = true

[trigger]
source = 2
mode = "AUTO"
slope = "FALLING"
level_v = -0.2
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.instrument.address, "TCPIP0::10.0.0.7::INSTR");
        assert_eq!(config.instrument.command_timeout_ms, 10_000);
        assert_eq!(config.acquisition.format, WaveformFormat::Ascii);
        assert_eq!(config.channel.channel.get(), 2);
        assert_eq!(config.channel.coupling, Coupling::Dc50Ohm);
        assert_eq!(config.trigger.slope, TriggerSlope::Falling);
        assert_eq!(config.plan().duration_s, 0.1);
    }

    #[test]
    fn test_invalid_coupling_in_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[channel]\ncoupling = \"XYZ\"").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_invalid_file_in_working_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&fallback, "[trigger]\nslope = \"UP\"\n").unwrap();
        assert!(load_layered(None, &fallback).is_err());

        std::fs::write(&fallback, "[channel]\ncoupling = \"XYZ\"\n").unwrap();
        assert!(load_layered(None, &fallback).is_err());
    }

    #[test]
    fn test_absent_working_dir_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_layered(None, &dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.channel.coupling, Coupling::Ac);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/scope-acq.toml"))).is_err());
    }

    #[test]
    fn test_validate_rejects_short_acquisition_timeout() {
        let mut config = AppConfig::default();
        config.acquisition.duration_s = 30.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.acquisition.duration_s = -1.0;
        assert!(config.validate().is_err());
    }
}
