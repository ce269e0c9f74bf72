//! Relay for actuator-style metrics endpoints.

use anyhow::Context;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::models::MetricValue;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Actuator request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Actuator at {url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// Forwards metric lookups to an actuator and normalises the answers
#[derive(Debug, Clone)]
pub struct MetricsRelay {
    client: Client,
}

impl MetricsRelay {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build actuator client")?;
        Ok(Self { client })
    }

    /// Fetch the metric-name listing, returned as the actuator sent it
    pub async fn list(&self, url: &str) -> Result<Value, RelayError> {
        self.fetch(url, None).await
    }

    /// Fetch one metric and reduce it to its first measurement value
    ///
    /// `tag` is forwarded as the actuator's `key:value` filter.
    pub async fn metric(
        &self,
        name: &str,
        base_url: &str,
        tag: Option<&str>,
    ) -> Result<MetricValue, RelayError> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), name);
        let body = self.fetch(&url, tag).await?;

        Ok(MetricValue {
            name: name.to_string(),
            value: first_measurement(&body),
        })
    }

    async fn fetch(&self, url: &str, tag: Option<&str>) -> Result<Value, RelayError> {
        let request_error = |source: reqwest::Error| RelayError::Request {
            url: url.to_string(),
            source,
        };

        let mut request = self.client.get(url);
        if let Some(tag) = tag {
            request = request.query(&[("tag", tag)]);
        }

        let response = request.send().await.map_err(|e| {
            warn!(event = "actuator_unreachable", url = url, error = %e, "Actuator request failed");
            request_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(event = "actuator_status", url = url, status = status.as_u16(), "Actuator returned an error status");
            return Err(RelayError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(request_error)
    }
}

/// `measurements[0].value`, if present and not null
fn first_measurement(body: &Value) -> Option<Value> {
    body.get("measurements")?
        .get(0)?
        .get("value")
        .filter(|v| !v.is_null())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_measurement() {
        let body = json!({
            "name": "bulkhead.available",
            "measurements": [{"statistic": "VALUE", "value": 7.0}, {"statistic": "COUNT", "value": 1.0}]
        });
        assert_eq!(first_measurement(&body), Some(json!(7.0)));
    }

    #[test]
    fn test_first_measurement_missing() {
        assert_eq!(first_measurement(&json!({"name": "x"})), None);
        assert_eq!(first_measurement(&json!({"measurements": []})), None);
        assert_eq!(first_measurement(&json!({"measurements": [{"value": null}]})), None);
    }
}
