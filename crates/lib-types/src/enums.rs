//! Enumerated device settings.
//!
//! The native API passes these as C enums, which we treat as `u32` on the
//! wire. Each type converts to and from its raw value and to a lowercase
//! name for display and configuration files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A raw value or name that does not correspond to any known variant.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UnknownEnumValue {
    #[error("Unknown {kind} value {value}")]
    Raw { kind: &'static str, value: u32 },

    #[error("Unknown {kind} '{name}'")]
    Name { kind: &'static str, name: String },
}

/// Clock reference source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum ReferenceSource {
    #[default]
    External = 0,
    Internal = 1,
}

impl ReferenceSource {
    pub fn from_raw(value: u32) -> Result<Self, UnknownEnumValue> {
        match value {
            0 => Ok(Self::External),
            1 => Ok(Self::Internal),
            _ => Err(UnknownEnumValue::Raw { kind: "reference source", value }),
        }
    }

    #[inline]
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ReferenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceSource {
    type Err = UnknownEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" | "ext" => Ok(Self::External),
            "internal" | "int" => Ok(Self::Internal),
            _ => Err(UnknownEnumValue::Name { kind: "reference source", name: s.to_string() }),
        }
    }
}

/// Acquisition mode of the digitizer firmware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum DigitizerMode {
    /// Every record is streamed back individually.
    #[default]
    Digitizer = 0,
    /// Records are accumulated on the card across round robins.
    Averager = 1,
}

impl DigitizerMode {
    pub fn from_raw(value: u32) -> Result<Self, UnknownEnumValue> {
        match value {
            0 => Ok(Self::Digitizer),
            1 => Ok(Self::Averager),
            _ => Err(UnknownEnumValue::Raw { kind: "digitizer mode", value }),
        }
    }

    #[inline]
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Digitizer => "digitizer",
            Self::Averager => "averager",
        }
    }
}

impl fmt::Display for DigitizerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigitizerMode {
    type Err = UnknownEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digitizer" => Ok(Self::Digitizer),
            "averager" => Ok(Self::Averager),
            _ => Err(UnknownEnumValue::Name { kind: "digitizer mode", name: s.to_string() }),
        }
    }
}

/// Trigger source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum TriggerSource {
    Software = 0,
    #[default]
    External = 1,
}

impl TriggerSource {
    pub fn from_raw(value: u32) -> Result<Self, UnknownEnumValue> {
        match value {
            0 => Ok(Self::Software),
            1 => Ok(Self::External),
            _ => Err(UnknownEnumValue::Raw { kind: "trigger source", value }),
        }
    }

    #[inline]
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::External => "external",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSource {
    type Err = UnknownEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "software" | "sw" => Ok(Self::Software),
            "external" | "ext" => Ok(Self::External),
            _ => Err(UnknownEnumValue::Name { kind: "trigger source", name: s.to_string() }),
        }
    }
}

/// Reporting level of the native library's own file log.
///
/// Higher values are more verbose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum NativeLogLevel {
    Error = 0,
    Warning = 1,
    #[default]
    Info = 2,
    Debug = 3,
    Debug1 = 4,
    Debug2 = 5,
    Debug3 = 6,
    Debug4 = 7,
}

impl NativeLogLevel {
    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl From<tracing::Level> for NativeLogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warning,
            tracing::Level::INFO => Self::Info,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::TRACE => Self::Debug4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_source_mapping() {
        assert_eq!(ReferenceSource::from_raw(0), Ok(ReferenceSource::External));
        assert_eq!(ReferenceSource::from_raw(1).map(|r| r.to_string()), Ok("internal".into()));
        assert!(ReferenceSource::from_raw(2).is_err());
    }

    #[test]
    fn test_digitizer_mode_strings() {
        assert_eq!(DigitizerMode::Averager.to_string(), "averager");
        assert_eq!("Digitizer".parse::<DigitizerMode>(), Ok(DigitizerMode::Digitizer));
        assert!("scope".parse::<DigitizerMode>().is_err());
    }

    #[test]
    fn test_trigger_source_raw() {
        assert_eq!(TriggerSource::External.as_raw(), 1);
        assert_eq!(TriggerSource::from_raw(0), Ok(TriggerSource::Software));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ReferenceSource::Internal).unwrap();
        assert_eq!(json, "\"internal\"");
        let mode: DigitizerMode = serde_json::from_str("\"averager\"").unwrap();
        assert_eq!(mode, DigitizerMode::Averager);
    }

    #[test]
    fn test_log_level_from_tracing() {
        assert_eq!(NativeLogLevel::from(tracing::Level::WARN), NativeLogLevel::Warning);
        assert_eq!(NativeLogLevel::from(tracing::Level::TRACE).as_raw(), 7);
    }
}
