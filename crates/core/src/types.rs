//! Wire payload types — the JSON body POSTed to the collection endpoint.
//! Field names are single letters on the wire to keep request bodies small.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Custom property map attached to an event. Values are scalars only;
/// nested structures are rejected during conversion.
pub type PropMap = HashMap<String, PropValue>;

/// A scalar custom-property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PropValue {
    /// Convert a loose JSON value into a scalar property. Objects, arrays
    /// and nulls are rejected (`None`), matching the coerced-scalars
    /// invariant of the wire format.
    pub fn from_json(value: &serde_json::Value) -> Option<PropValue> {
        match value {
            serde_json::Value::Bool(b) => Some(PropValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(PropValue::Int(i))
                } else {
                    n.as_f64().map(PropValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(PropValue::String(s.clone())),
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::String(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::String(s)
    }
}

impl From<i64> for PropValue {
    fn from(i: i64) -> Self {
        PropValue::Int(i)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

/// Revenue attached to a goal event. The amount stays a string end to end
/// so the collector can parse it with full decimal precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revenue {
    pub currency: String,
    pub amount: String,
}

/// The JSON body sent to `POST <endpoint>`. Expected success status: 2xx
/// (the reference collector answers 202).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    /// Event name, e.g. `pageview`, `engagement`, or a custom goal name.
    #[serde(rename = "n")]
    pub name: String,
    /// Canonical URL of the page the event belongs to.
    #[serde(rename = "u")]
    pub url: String,
    #[serde(rename = "d")]
    pub domain: String,
    #[serde(rename = "r", skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub props: Option<PropMap>,
    #[serde(rename = "$", skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Revenue>,
    #[serde(rename = "i")]
    pub interactive: bool,
    /// `1` when the page uses hash-based routing, omitted otherwise.
    #[serde(rename = "h", skip_serializing_if = "Option::is_none")]
    pub hash_mode: Option<u8>,
    /// Engagement duration in milliseconds. Engagement events only.
    #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
    pub engagement_ms: Option<u64>,
    /// Maximum scroll depth percent (0–100). Engagement events only.
    #[serde(rename = "sd", skip_serializing_if = "Option::is_none")]
    pub scroll_depth: Option<u8>,
    #[serde(rename = "v")]
    pub script_version: String,
}
