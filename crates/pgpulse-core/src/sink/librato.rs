//! Librato metrics API sink.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::debug;

use super::{MetricSink, SinkError};
use crate::sample::MetricSample;

/// Default Librato metrics endpoint.
pub const DEFAULT_LIBRATO_URL: &str = "https://metrics-api.librato.com/v1/metrics";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct Payload<'a> {
    gauges: Vec<Gauge<'a>>,
}

#[derive(Serialize)]
struct Gauge<'a> {
    name: &'a str,
    value: f64,
    measure_time: i64,
    source: &'a str,
}

impl<'a> Payload<'a> {
    fn new(samples: &'a [MetricSample]) -> Self {
        Self {
            gauges: samples
                .iter()
                .map(|s| Gauge {
                    name: &s.name,
                    value: s.value,
                    measure_time: s.timestamp,
                    source: &s.source,
                })
                .collect(),
        }
    }
}

/// Posts batches to the Librato metrics API with HTTP basic auth.
///
/// Blocking I/O.
pub struct LibratoSink {
    agent: ureq::Agent,
    url: String,
    authorization: String,
}

impl LibratoSink {
    pub fn with_url(url: impl Into<String>, user: &str, token: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            url: url.into(),
            authorization: basic_auth(user, token),
        }
    }
}

impl std::fmt::Debug for LibratoSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibratoSink").field("url", &self.url).finish()
    }
}

impl MetricSink for LibratoSink {
    fn submit(&mut self, samples: &[MetricSample]) -> Result<(), SinkError> {
        let body = encode_payload(samples)?;
        debug!(url = %self.url, gauges = samples.len(), "posting batch");

        match self
            .agent
            .post(&self.url)
            .set("Authorization", &self.authorization)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, response)) => Err(SinkError::Rejected {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(t)) => Err(SinkError::Transport(t.to_string())),
        }
    }
}

fn basic_auth(user: &str, token: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, token)))
}

fn encode_payload(samples: &[MetricSample]) -> Result<String, SinkError> {
    serde_json::to_string(&Payload::new(samples)).map_err(|e| SinkError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFormatter;

    #[test]
    fn payload_lists_gauges() {
        let fmt = SampleFormatter::default();
        let samples = vec![
            fmt.format("inserts", 50.0, 900, "app"),
            fmt.format("cache_hit_rate", 0.99, 900, "app"),
        ];

        let json: serde_json::Value =
            serde_json::from_str(&encode_payload(&samples).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "gauges": [
                    {"name": "postgres.inserts", "value": 50.0, "measure_time": 900, "source": "app"},
                    {"name": "postgres.cache_hit_rate", "value": 0.99, "measure_time": 900, "source": "app"},
                ]
            })
        );
    }

    #[test]
    fn basic_auth_header() {
        assert_eq!(basic_auth("user", "token"), "Basic dXNlcjp0b2tlbg==");
    }
}
