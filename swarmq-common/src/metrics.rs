//! Metrics collection and reporting

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BaseConfig;
use crate::errors::{Result, SwarmError};

/// Metrics collector. Counters and gauges are kept in memory and mirrored
/// to statsd when an address is configured.
pub struct Metrics {
    counters: Arc<DashMap<String, u64>>,
    gauges: Arc<DashMap<String, f64>>,
    statsd_client: Option<statsd::Client>,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new(config: &BaseConfig) -> Result<Self> {
        let statsd_client = match &config.statsd_address {
            Some(addr) => Some(
                statsd::Client::new(addr, &config.statsd_prefix)
                    .map_err(|e| SwarmError::Metrics(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            counters: Arc::new(DashMap::new()),
            gauges: Arc::new(DashMap::new()),
            statsd_client,
        })
    }

    /// Increment a counter
    pub fn incr(&self, name: &str, value: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += value;

        if let Some(ref client) = self.statsd_client {
            let _ = client.count(name, value as f64);
        }
    }

    /// Set a gauge value
    pub fn gauge(&self, name: &str, value: f64) {
        self.gauges.insert(name.to_string(), value);

        if let Some(ref client) = self.statsd_client {
            let _ = client.gauge(name, value);
        }
    }

    /// Get counter value
    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|v| *v).unwrap_or(0)
    }

    /// Get gauge value
    pub fn get_gauge(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).map(|v| *v)
    }
}

impl Clone for Metrics {
    fn clone(&self) -> Self {
        Self {
            counters: self.counters.clone(),
            gauges: self.gauges.clone(),
            statsd_client: None, // statsd client cannot be cloned
        }
    }
}
