//! Metric definitions for the HF engine.
//!
//! Metrics are declared as [`Metric`] constants so names are not repeated
//! as string literals. Call [`describe_metrics`] once at startup to
//! register their descriptions with the installed recorder.
//!
//! ```rust
//! use hfp_hf::telemetry::metric_defs;
//!
//! metrics::counter!(metric_defs::AT_COMMANDS_SENT.name).increment(1);
//! ```

use metrics::{describe_counter, describe_gauge, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
}

/// A metric name with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Unit,
}

impl Metric {
    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: Unit::Count,
        }
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: Unit::Count,
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Register the description with the global recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.description),
        }
    }
}

pub mod metric_defs {
    use super::Metric;

    // ========================================================================
    // AT command channel
    // ========================================================================

    pub const AT_COMMANDS_SENT: Metric = Metric::counter("hfp.at.commands_sent")
        .with_description("AT commands written to the transport");

    pub const AT_COMMAND_ERRORS: Metric = Metric::counter("hfp.at.command_errors")
        .with_description("AT commands closed with an error result code");

    pub const AT_RESPONSE_TIMEOUTS: Metric = Metric::counter("hfp.at.response_timeouts")
        .with_description("AT commands the AG never answered");

    pub const AT_FRAMES_DROPPED: Metric = Metric::counter("hfp.at.frames_dropped")
        .with_description("Reply frames dropped as malformed");

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    pub const SLC_ESTABLISHED: Metric = Metric::counter("hfp.slc.established")
        .with_description("Service level connections established");

    pub const EVENTS_DEFERRED: Metric = Metric::counter("hfp.events.deferred")
        .with_description("Events deferred by a transient state");

    pub const DEVICES_CONNECTED: Metric = Metric::gauge("hfp.devices.connected")
        .with_description("Devices with an established service level connection");

    /// Every metric defined by the engine.
    pub const ALL: &[Metric] = &[
        AT_COMMANDS_SENT,
        AT_COMMAND_ERRORS,
        AT_RESPONSE_TIMEOUTS,
        AT_FRAMES_DROPPED,
        SLC_ESTABLISHED,
        EVENTS_DEFERRED,
        DEVICES_CONNECTED,
    ];
}

/// Register descriptions for every engine metric.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_unique() {
        let names: HashSet<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), metric_defs::ALL.len());
        assert!(metric_defs::ALL.iter().all(|m| m.name.starts_with("hfp.")));
        assert!(metric_defs::ALL.iter().all(|m| !m.description.is_empty()));
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
