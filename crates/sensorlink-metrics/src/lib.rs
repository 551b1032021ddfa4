//! Metric declarations for sensorlink.
//!
//! Every metric the command bridge records is declared here as a structured
//! [`Metric`] constant, so names cannot drift between the code that records a
//! metric and the code that describes it. The `metrics` crate is re-exported.
//!
//! Recording is a no-op until the host installs a recorder.
//!
//! # Example
//!
//! ```rust
//! use sensorlink_metrics::{metric_defs, metrics, InterfaceLabels};
//!
//! let labels = InterfaceLabels::new("USB");
//! metrics::counter!(metric_defs::BRIDGE_LINES.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, Unit};

/// A counter declaration with its metadata.
///
/// ```rust
/// use sensorlink_metrics::metrics::Unit;
/// use sensorlink_metrics::Metric;
///
/// const FRAMES: Metric = Metric::counter("bridge.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count)
///     .with_labels(&["interface"]);
///
/// assert_eq!(FRAMES.unit, Some(Unit::Count));
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name, e.g. `bridge.lines`.
    pub name: &'static str,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a counter metric.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match self.unit {
            Some(unit) => describe_counter!(self.name, unit, self.description),
            None => describe_counter!(self.name, self.description),
        }
    }
}

/// All metric definitions for the command bridge.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on every bridge metric.
    pub const INTERFACE_LABELS: &[&str] = &["interface"];

    /// Complete request lines received.
    pub const BRIDGE_LINES: Metric = Metric::counter("bridge.lines")
        .with_description("Complete request lines received")
        .with_unit(Unit::Count)
        .with_labels(INTERFACE_LABELS);

    /// Receive buffer overruns. Each overlong line counts once.
    pub const BRIDGE_OVERRUNS: Metric = Metric::counter("bridge.overruns")
        .with_description("Receive buffer overruns")
        .with_unit(Unit::Count)
        .with_labels(INTERFACE_LABELS);

    /// Lines dropped because they were not a single-pair JSON object.
    pub const BRIDGE_ERRORS: Metric = Metric::counter("bridge.errors")
        .with_description("Malformed request lines")
        .with_unit(Unit::Count)
        .with_labels(INTERFACE_LABELS);

    /// Response lines written.
    pub const BRIDGE_RESPONSES: Metric = Metric::counter("bridge.responses")
        .with_description("Response lines written")
        .with_unit(Unit::Count)
        .with_labels(INTERFACE_LABELS);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[&BRIDGE_LINES, &BRIDGE_OVERRUNS, &BRIDGE_ERRORS, &BRIDGE_RESPONSES];
}

/// Labels identifying the interface a metric was recorded on.
#[derive(Debug, Clone)]
pub struct InterfaceLabels {
    pub interface: String,
}

impl InterfaceLabels {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("interface", self.interface.clone())]
    }
}

/// Describes all bridge metrics. Call once at startup, after installing a
/// recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_labels() {
        let labels = InterfaceLabels::new("TCP");
        assert_eq!(labels.to_labels(), vec![("interface", "TCP".to_string())]);
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::BRIDGE_LINES.name, "bridge.lines");
        assert_eq!(metric_defs::BRIDGE_OVERRUNS.name, "bridge.overruns");
        assert_eq!(metric_defs::BRIDGE_ERRORS.name, "bridge.errors");
        assert_eq!(metric_defs::BRIDGE_RESPONSES.name, "bridge.responses");
        for metric in metric_defs::ALL {
            assert_eq!(metric.unit, Some(Unit::Count));
            assert_eq!(metric.labels, metric_defs::INTERFACE_LABELS);
            assert!(!metric.description.is_empty());
        }
    }

    #[test]
    fn test_all_metrics_count() {
        assert_eq!(metric_defs::ALL.len(), 4);
    }

    #[test]
    fn test_metric_builder_defaults() {
        let metric = Metric::counter("c");
        assert_eq!(metric.unit, None);
        assert!(metric.labels.is_empty());
        assert!(metric.description.is_empty());
    }

    #[test]
    fn test_describe_without_recorder_is_noop() {
        describe_metrics();
    }
}
