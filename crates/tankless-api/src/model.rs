// Wire-level types shared by the cloud and local transports.
//
// Both transports ultimately describe the heater as a flat bag of named
// properties (`domestic_temperature`, `m02_outlet_temperature`, ...). The
// cloud nests them under `shadow`/`info` and sometimes stringifies values;
// the local port prints them as `key: value` lines. Everything is
// normalised into a `PropertyMap` so a single conversion in
// `tankless-core` can build the canonical state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single heater property value as reported by either transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Property name -> value, ordered for stable diagnostics output.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    /// Classify a bare token the way the heater firmware prints it.
    pub fn parse_token(raw: &str) -> Self {
        let lowered = raw.to_ascii_lowercase();
        match lowered.as_str() {
            "" | "null" => return Self::Null,
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<i64>() {
                return Self::Int(n);
            }
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        Self::Text(raw.to_owned())
    }

    /// Convert a JSON value from the cloud API.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::parse_token(s.trim()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Numeric view. Integers widen, numeric strings parse, everything else is `None`.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null | Self::Bool(_) => None,
        }
    }

    /// Boolean view following the usual truthy spellings (`on`, `yes`, `1`, ...).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(n) => Some(*n != 0),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" | "t" | "true" | "on" | "1" => Some(true),
                "n" | "no" | "f" | "false" | "off" | "0" => Some(false),
                _ => None,
            },
            Self::Null | Self::Float(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }
}

/// How the heater recirculates hot water, if at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecirculationCapability {
    #[default]
    None,
    ExternalPump,
    BuiltIn,
}

/// A device entry from the cloud account's device list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudDevice {
    pub id: String,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub firmware: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub recirculation: Option<RecirculationCapability>,
}

/// Identity reported by the local control port's `sysinfo` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SysInfo {
    pub serial: String,
    pub firmware: Option<String>,
}
