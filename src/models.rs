use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents the result of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Sequence number of the probe within its run, starting at 1
    pub id: u32,
    /// HTTP status code, or 0 when no response was received
    pub status: u16,
    /// How long the probe took, in seconds
    pub time: f64,
    /// Type tag of the run the probe belongs to
    #[serde(rename = "type")]
    pub kind: String,
    /// Error message if the request failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    /// Whether the probe counts as a success
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Aggregated outcome of one load run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub total_requests: usize,
    pub success_count: usize,
    pub rejected_count: usize,
    /// Rounded percentage, e.g. "60%"
    pub success_rate: String,
    /// Mean probe time in seconds
    pub avg_time: f64,
    /// Probe times in seconds, ordered by probe id
    pub response_times: Vec<f64>,
    /// Status code (as a string) to number of probes
    pub status_codes: BTreeMap<String, usize>,
    /// Individual probes, ordered by id
    pub requests: Vec<ProbeResult>,
}

/// A stored load run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunRecord {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub protected_url: Option<String>,
    pub unprotected_url: Option<String>,
    pub num_requests: usize,
    pub result: RunSummary,
}

/// One probe of a stored run, flattened for per-request views
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub id: u64,
    pub test_run_id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub status: u16,
    pub time_in_seconds: String,
    pub request_id: u32,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/test/run`
///
/// Every field is optional on the wire so that missing values surface as a
/// 400 with a readable message instead of a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTestRequest {
    pub url: Option<String>,
    pub num_requests: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// A single actuator metric reduced to its first measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub name: String,
    pub value: Option<serde_json::Value>,
}

/// Actuator response for a single metric
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorMetric {
    pub name: String,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    /// Tags the metric can be filtered by, with their values
    #[serde(default)]
    pub available_tags: Vec<AvailableTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableTag {
    pub tag: String,
    pub values: Vec<String>,
}

/// One measurement of an actuator metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub statistic: String,
    pub value: serde_json::Value,
}

/// Actuator response listing metric names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricNames {
    pub names: Vec<String>,
}
