// Domain models: observation packets and the tag sets that partition them.
// An aggregated record has the same shape as a packet; only its timestamp
// convention differs (end of the window it summarizes).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag key/value pairs identifying one series within a measurement
/// (e.g. `{platform: "foo", stream: "bar"}`). BTreeMap so the canonical
/// encoding is order-independent.
pub type TagSet = BTreeMap<String, String>;

/// Canonical string form of a tag set: sorted-key JSON. Used as the SQLite
/// tags column value and as the per-series key in run reports.
pub fn canonical_tags(tags: &TagSet) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "{}".into())
}

/// One observation packet. Fields that were null or absent at ingest are
/// omitted from the map, never stored as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,
}

impl Packet {
    pub fn new(timestamp: i64, tags: TagSet) -> Self {
        Self {
            timestamp,
            tags,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}

/// Ingest-side packet: field values may be null on the wire; `strip` drops
/// them so nulls are never stored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPacket {
    pub timestamp: i64,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub fields: BTreeMap<String, Option<f64>>,
}

impl RawPacket {
    pub fn strip(self) -> Packet {
        Packet {
            timestamp: self.timestamp,
            tags: self.tags,
            fields: self
                .fields
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
        }
    }
}

/// A new aggregated record together with the measurement it was written to.
/// This is what the notifier broadcasts to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEvent {
    pub record: Packet,
    pub destination: String,
}

/// Aggregation window, half-open on the left: `(start, stop]`, in ms.
/// The record summarizing it is stamped with `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub stop: i64,
}

impl Window {
    pub fn len_ms(&self) -> i64 {
        self.stop - self.start
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}]", self.start, self.stop)
    }
}
