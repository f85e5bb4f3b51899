//! Metrics collection and registry.

use crate::source::{DeviceState, SourceStats};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric creation or registration failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of source state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether a device handle is currently open.
    pub device_open: bool,
    /// Frames successfully captured.
    pub frames_captured: u64,
    /// Device handles opened.
    pub device_opens: u64,
    /// Device handles released.
    pub device_releases: u64,
    /// Captures that failed because the device was unavailable.
    pub device_unavailable: u64,
    /// Captures that failed because no frame could be read.
    pub frame_read_errors: u64,
    /// Frames returned at a size other than the one requested.
    pub resolution_mismatches: u64,
    /// Controls rejected by the device.
    pub rejected_controls: u64,
    /// Width of the last frame.
    pub frame_width: Option<u32>,
    /// Height of the last frame.
    pub frame_height: Option<u32>,
}

impl MetricsSnapshot {
    /// Creates a snapshot from a frame source's state and counters.
    pub fn from_source(state: DeviceState, stats: &SourceStats) -> Self {
        Self {
            device_open: matches!(state, DeviceState::Open { .. }),
            frames_captured: stats.frames_captured,
            device_opens: stats.device_opens,
            device_releases: stats.device_releases,
            device_unavailable: stats.device_unavailable,
            frame_read_errors: stats.frame_read_errors,
            resolution_mismatches: stats.resolution_mismatches,
            rejected_controls: stats.rejected_controls,
            frame_width: stats.last_resolution.map(|(w, _)| w),
            frame_height: stats.last_resolution.map(|(_, h)| h),
        }
    }
}

/// Prometheus metrics registry for webcam capture.
pub struct MetricsRegistry {
    registry: Registry,

    // Device metrics
    device_open: IntGauge,
    device_opens_total: IntCounter,
    device_releases_total: IntCounter,

    // Capture metrics
    frames_total: IntCounter,
    device_unavailable_total: IntCounter,
    frame_read_errors_total: IntCounter,
    resolution_mismatch_total: IntCounter,
    rejected_controls_total: IntCounter,
    frame_width: IntGauge,
    frame_height: IntGauge,
}

/// Advances `counter` to `target`; counters never move backwards.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let device_open = IntGauge::new(
            "webcam_capture_device_open",
            "Whether a camera handle is open (1=open, 0=closed)",
        )?;
        let device_opens_total = IntCounter::new(
            "webcam_capture_device_opens_total",
            "Total number of camera handles opened",
        )?;
        let device_releases_total = IntCounter::new(
            "webcam_capture_device_releases_total",
            "Total number of camera handles released",
        )?;

        let frames_total = IntCounter::new(
            "webcam_capture_frames_total",
            "Total number of frames returned",
        )?;
        let device_unavailable_total = IntCounter::new(
            "webcam_capture_device_unavailable_total",
            "Captures that failed because the camera was unavailable",
        )?;
        let frame_read_errors_total = IntCounter::new(
            "webcam_capture_frame_read_errors_total",
            "Captures that failed because no frame could be read",
        )?;
        let resolution_mismatch_total = IntCounter::new(
            "webcam_capture_resolution_mismatch_total",
            "Frames returned at a size other than the requested one",
        )?;
        let rejected_controls_total = IntCounter::new(
            "webcam_capture_rejected_controls_total",
            "Capture controls the camera did not accept",
        )?;
        let frame_width = IntGauge::new(
            "webcam_capture_frame_width",
            "Width of the last returned frame in pixels",
        )?;
        let frame_height = IntGauge::new(
            "webcam_capture_frame_height",
            "Height of the last returned frame in pixels",
        )?;

        registry.register(Box::new(device_open.clone()))?;
        registry.register(Box::new(device_opens_total.clone()))?;
        registry.register(Box::new(device_releases_total.clone()))?;
        registry.register(Box::new(frames_total.clone()))?;
        registry.register(Box::new(device_unavailable_total.clone()))?;
        registry.register(Box::new(frame_read_errors_total.clone()))?;
        registry.register(Box::new(resolution_mismatch_total.clone()))?;
        registry.register(Box::new(rejected_controls_total.clone()))?;
        registry.register(Box::new(frame_width.clone()))?;
        registry.register(Box::new(frame_height.clone()))?;

        Ok(Self {
            registry,
            device_open,
            device_opens_total,
            device_releases_total,
            frames_total,
            device_unavailable_total,
            frame_read_errors_total,
            resolution_mismatch_total,
            rejected_controls_total,
            frame_width,
            frame_height,
        })
    }

    /// Updates all metrics from a snapshot of source state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.device_open.set(i64::from(snapshot.device_open));
        advance(&self.device_opens_total, snapshot.device_opens);
        advance(&self.device_releases_total, snapshot.device_releases);

        advance(&self.frames_total, snapshot.frames_captured);
        advance(&self.device_unavailable_total, snapshot.device_unavailable);
        advance(&self.frame_read_errors_total, snapshot.frame_read_errors);
        advance(&self.resolution_mismatch_total, snapshot.resolution_mismatches);
        advance(&self.rejected_controls_total, snapshot.rejected_controls);

        if let Some(width) = snapshot.frame_width {
            self.frame_width.set(i64::from(width));
        }
        if let Some(height) = snapshot.frame_height {
            self.frame_height.set(i64::from(height));
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let stats = SourceStats {
            frames_captured: 4,
            device_opens: 2,
            device_releases: 1,
            resolution_mismatches: 1,
            last_resolution: Some((640, 480)),
            ..Default::default()
        };
        let snapshot = MetricsSnapshot::from_source(DeviceState::Open { device_id: 1 }, &stats);

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("webcam_capture_device_open 1"));
        assert!(output.contains("webcam_capture_frames_total 4"));
        assert!(output.contains("webcam_capture_device_opens_total 2"));
        assert!(output.contains("webcam_capture_frame_width 640"));
        assert!(output.contains("webcam_capture_frame_height 480"));
    }

    #[test]
    fn test_counters_do_not_regress() {
        let registry = MetricsRegistry::new().unwrap();

        registry.update(&MetricsSnapshot {
            frames_captured: 10,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            frames_captured: 3,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("webcam_capture_frames_total 10"));
        assert!(output.contains("webcam_capture_device_open 0"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        // Should contain metric names
        assert!(output.contains("webcam_capture_device_open"));
        assert!(output.contains("webcam_capture_frame_read_errors_total"));
        assert!(output.contains("webcam_capture_rejected_controls_total"));
    }
}
