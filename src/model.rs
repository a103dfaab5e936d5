use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counter value assigned by the ingestion loop. Starts at 1.
pub type SampleId = u64;

/// One synthetic measurement as it is persisted and read back.
///
/// The JSON shape is `{"id", "created", "creator", "randomNumber"}`; the
/// value keeps its historical wire name so existing dashboards still match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    /// Generation time, RFC 3339 on the wire.
    pub created: DateTime<Utc>,
    /// Producer name, always a member of the configured roster.
    pub creator: String,
    /// Draw from N(0, 1).
    #[serde(rename = "randomNumber")]
    pub value: f64,
}

impl Sample {
    pub fn to_document(&self) -> serde_json::Value {
        // Infallible for this shape.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
