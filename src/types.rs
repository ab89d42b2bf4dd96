//! Core types shared by the state manager and the event bridge.

use crate::error::{Result, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// A component's state: a mapping from string keys to arbitrary JSON values.
///
/// Backed by a sorted map, so serialization is independent of insertion order.
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// Microseconds since Unix epoch. Serialized as an ISO-8601 string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    /// `0000-01-01T00:00:00Z`, the earliest instant RFC 3339 can express.
    pub const MIN_RFC3339: Timestamp = Timestamp(-62_167_219_200_000_000);

    /// `9999-12-31T23:59:59.999999Z`, the latest instant RFC 3339 can express.
    pub const MAX_RFC3339: Timestamp = Timestamp(253_402_300_799_999_999);

    /// Render as RFC 3339 / ISO-8601 with microsecond precision.
    ///
    /// Instants outside four-digit years are clamped to the nearest
    /// representable one, so the output always parses back.
    pub fn to_rfc3339(&self) -> String {
        let micros = self.0.clamp(Self::MIN_RFC3339.0, Self::MAX_RFC3339.0);
        DateTime::<Utc>::from_timestamp_micros(micros)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Parse an RFC 3339 / ISO-8601 string.
    pub fn parse_rfc3339(s: &str) -> Result<Self> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| SyncError::Deserialization(format!("bad timestamp {s:?}: {e}")))?;
        Ok(Timestamp(dt.timestamp_micros()))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse_rfc3339(&s).map_err(serde::de::Error::custom)
    }
}

/// Position of a snapshot in a named state's history. Starts at 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Version(pub u64);

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Version {
    pub const FIRST: Version = Version(1);

    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }

    /// Version `steps` before this one, if it would still be >= 1.
    pub fn back(self, steps: u64) -> Option<Self> {
        match self.0.checked_sub(steps) {
            Some(v) if v >= 1 => Some(Version(v)),
            _ => None,
        }
    }
}

/// Which side of the channel produced a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    /// The hosting process.
    #[default]
    Internal,
    /// The embedded script context.
    External,
}

/// How a partial update combines with the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Overwrite the given top-level keys, keep the rest. Never deletes.
    #[default]
    Merge,
    /// The given mapping becomes the whole state.
    Replace,
}

impl UpdateMode {
    /// Compute the next state from `current` (empty if none) and `partial`.
    pub fn apply(self, current: Option<&StateMap>, partial: StateMap) -> StateMap {
        match self {
            UpdateMode::Replace => partial,
            UpdateMode::Merge => {
                let mut next = current.cloned().unwrap_or_default();
                for (key, value) in partial {
                    next.insert(key, value);
                }
                next
            }
        }
    }
}

/// An immutable recorded value of a named state at a specific version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: StateMap,
    pub version: Version,
    pub source: StateSource,
    pub timestamp: Timestamp,
}

impl StateSnapshot {
    pub fn new(state: StateMap, version: Version, source: StateSource) -> Self {
        Self {
            state,
            version,
            source,
            timestamp: Timestamp::now(),
        }
    }

    /// Hash of the state mapping only (version and time excluded).
    pub fn content_hash(&self) -> Result<ContentHash> {
        ContentHash::of_json(&self.state)
    }
}

/// An event received from the embedded script context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "component")]
    pub component_name: String,
    #[serde(rename = "event")]
    pub event_type: String,
    pub data: StateMap,
    pub timestamp: Timestamp,
}

impl Event {
    pub fn new(component_name: impl Into<String>, event_type: impl Into<String>, data: StateMap) -> Self {
        Self {
            component_name: component_name.into(),
            event_type: event_type.into(),
            data,
            timestamp: Timestamp::now(),
        }
    }
}

/// Serialize any value to JSON with object keys sorted at every level.
///
/// Two values that are equal regardless of key order produce the same string.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(value.to_string())
}

/// Content hash (SHA-256) over canonical JSON.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Compute hash from bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hasher.finalize().into())
    }

    /// Hash the canonical JSON form of a value.
    pub fn of_json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::from_bytes(canonical_json(value)?.as_bytes()))
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(ContentHash(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Cache key for a rendered component.
///
/// Combines the component name, its props and the hashes of its template,
/// style and script sources. Props are serialized canonically, so key order
/// in `props` does not affect the result.
pub fn render_cache_key(
    component: &str,
    props: &StateMap,
    template_hash: &str,
    style_hash: &str,
    script_hash: &str,
) -> ContentHash {
    let props = serde_json::Value::Object(props.clone());
    let key_data = format!("{component}:{props}:{template_hash}:{style_hash}:{script_hash}");
    ContentHash::from_bytes(key_data.as_bytes())
}
