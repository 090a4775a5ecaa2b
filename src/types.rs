use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScopeError;

/// Oscilloscope input channel, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    pub fn new(index: u8) -> Result<Self, ScopeError> {
        if index == 0 {
            return Err(ScopeError::InvalidValue(
                "Channel index must be a positive integer".to_string(),
            ));
        }
        Ok(Self(index))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ChannelIndex {
    type Error = ScopeError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        ChannelIndex::new(index)
    }
}

impl From<ChannelIndex> for u8 {
    fn from(idx: ChannelIndex) -> u8 {
        idx.0
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CHAN{}", self.0)
    }
}

/// Input coupling of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Coupling {
    /// DC, 50 Ω termination
    Dc50Ohm,
    /// DC, 1 MΩ input impedance
    Dc1MOhm,
    /// AC, 1 MΩ input impedance
    Ac,
}

impl Coupling {
    /// Token understood by the instrument's `CHANn:COUP` command
    pub fn scpi_token(&self) -> &'static str {
        match self {
            Coupling::Dc50Ohm => "DC",
            Coupling::Dc1MOhm => "DCLimit",
            Coupling::Ac => "AC",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Coupling::Dc50Ohm => "50OHM",
            Coupling::Dc1MOhm => "1MOHM",
            Coupling::Ac => "AC",
        }
    }
}

impl FromStr for Coupling {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "50OHM" => Ok(Coupling::Dc50Ohm),
            "1MOHM" => Ok(Coupling::Dc1MOhm),
            "AC" => Ok(Coupling::Ac),
            _ => Err(ScopeError::InvalidValue(format!(
                "Invalid coupling type '{s}'. Choose from '50OHM', '1MOHM', 'AC'"
            ))),
        }
    }
}

impl TryFrom<String> for Coupling {
    type Error = ScopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Coupling> for String {
    fn from(coupling: Coupling) -> Self {
        coupling.name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TriggerSlope {
    Rising,
    Falling,
}

impl TriggerSlope {
    pub fn scpi_token(&self) -> &'static str {
        match self {
            TriggerSlope::Rising => "POS",
            TriggerSlope::Falling => "NEG",
        }
    }
}

impl FromStr for TriggerSlope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RISING" => Ok(TriggerSlope::Rising),
            "FALLING" => Ok(TriggerSlope::Falling),
            _ => Err(ScopeError::InvalidValue(format!(
                "Invalid slope '{s}'. Choose from 'RISING' or 'FALLING'"
            ))),
        }
    }
}

impl TryFrom<String> for TriggerSlope {
    type Error = ScopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TriggerSlope> for String {
    fn from(slope: TriggerSlope) -> Self {
        match slope {
            TriggerSlope::Rising => "RISING".to_string(),
            TriggerSlope::Falling => "FALLING".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TriggerMode {
    /// Only acquire when the trigger condition is met
    Normal,
    /// Free-run when no trigger occurs
    Auto,
}

impl TriggerMode {
    pub fn scpi_token(&self) -> &'static str {
        match self {
            TriggerMode::Normal => "NORM",
            TriggerMode::Auto => "AUTO",
        }
    }
}

impl FromStr for TriggerMode {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" | "NORM" => Ok(TriggerMode::Normal),
            "AUTO" => Ok(TriggerMode::Auto),
            _ => Err(ScopeError::InvalidValue(format!(
                "Invalid trigger mode '{s}'. Choose from 'NORMAL' or 'AUTO'"
            ))),
        }
    }
}

impl TryFrom<String> for TriggerMode {
    type Error = ScopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TriggerMode> for String {
    fn from(mode: TriggerMode) -> Self {
        match mode {
            TriggerMode::Normal => "NORMAL".to_string(),
            TriggerMode::Auto => "AUTO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    #[default]
    Edge,
}

impl TriggerType {
    pub fn scpi_token(&self) -> &'static str {
        match self {
            TriggerType::Edge => "EDGE",
        }
    }
}

/// Transfer encoding for `CHANn:DATA?`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformFormat {
    /// Comma separated ASCII floats
    Ascii,
    /// IEEE 488.2 block of little-endian 32-bit floats
    #[default]
    Real32,
}

impl WaveformFormat {
    /// Format selection prefixed to the data query
    pub fn scpi_prefix(&self) -> &'static str {
        match self {
            WaveformFormat::Ascii => "FORM ASC",
            WaveformFormat::Real32 => "FORM REAL,32;:FORM:BORD LSBF",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel: ChannelIndex,
    pub coupling: Coupling,
    /// Full vertical range in volts
    pub range_v: f64,
    /// Vertical offset in volts
    pub offset_v: f64,
    pub enabled: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: ChannelIndex(1),
            coupling: Coupling::Ac,
            range_v: 2.0,
            offset_v: 0.0,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub source: ChannelIndex,
    pub mode: TriggerMode,
    #[serde(default)]
    pub trigger_type: TriggerType,
    pub slope: TriggerSlope,
    /// Trigger level in volts
    pub level_v: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            source: ChannelIndex(1),
            mode: TriggerMode::Normal,
            trigger_type: TriggerType::Edge,
            slope: TriggerSlope::Rising,
            level_v: 0.04,
        }
    }
}

/// One waveform record with its synthesized time axis
#[derive(Debug, Clone)]
pub struct AcquisitionResult {
    pub channel: ChannelIndex,
    pub acquired_at: DateTime<Utc>,
    time_s: Vec<f64>,
    voltage_v: Vec<f64>,
}

impl AcquisitionResult {
    /// Pair raw samples with a linearly spaced time axis covering `duration_s`
    pub fn from_samples(channel: ChannelIndex, samples: Vec<f32>, duration_s: f64) -> Self {
        let time_s = linspace(0.0, duration_s, samples.len());
        let voltage_v = samples.into_iter().map(f64::from).collect();
        Self {
            channel,
            acquired_at: Utc::now(),
            time_s,
            voltage_v,
        }
    }

    pub fn time(&self) -> &[f64] {
        &self.time_s
    }

    pub fn voltage(&self) -> &[f64] {
        &self.voltage_v
    }

    pub fn len(&self) -> usize {
        self.voltage_v.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage_v.is_empty()
    }
}

/// `n` evenly spaced points from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = (n - 1) as f64;
            (0..n)
                .map(|i| start + (end - start) * (i as f64 / last))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_couplings_parse() {
        assert_eq!("50OHM".parse::<Coupling>().unwrap(), Coupling::Dc50Ohm);
        assert_eq!("1MOHM".parse::<Coupling>().unwrap(), Coupling::Dc1MOhm);
        assert_eq!("AC".parse::<Coupling>().unwrap(), Coupling::Ac);
        assert_eq!("ac".parse::<Coupling>().unwrap(), Coupling::Ac);
    }

    #[test]
    fn test_unknown_coupling_rejected() {
        for bad in ["XYZ", "", "DC", "75OHM"] {
            assert!(matches!(
                bad.parse::<Coupling>(),
                Err(ScopeError::InvalidValue(_))
            ));
        }
    }

    #[test]
    fn test_slope_tokens() {
        let rising: TriggerSlope = "RISING".parse().unwrap();
        let falling: TriggerSlope = "falling".parse().unwrap();
        assert_eq!(rising.scpi_token(), "POS");
        assert_eq!(falling.scpi_token(), "NEG");
        assert!(matches!(
            "UP".parse::<TriggerSlope>(),
            Err(ScopeError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_channel_index_rejects_zero() {
        assert!(ChannelIndex::new(0).is_err());
        assert_eq!(ChannelIndex::new(3).unwrap().to_string(), "CHAN3");
    }

    #[test]
    fn test_time_axis_spans_duration() {
        let n = 1001;
        let duration = 0.05;
        let result = AcquisitionResult::from_samples(
            ChannelIndex::new(1).unwrap(),
            vec![0.0; n],
            duration,
        );

        let time = result.time();
        assert_eq!(time.len(), n);
        assert_eq!(result.voltage().len(), n);
        assert_eq!(time[0], 0.0);
        assert!((time[n - 1] - duration).abs() < 1e-12);
        assert!(time.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_linspace_degenerate_lengths() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(0.0, 1.0, 1), vec![0.0]);
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
    }
}
