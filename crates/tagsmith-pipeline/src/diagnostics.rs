//! Pipeline diagnostics: timing and per-stage metrics.
//!
//! Time is read through the [`Clock`] trait so this crate stays free of
//! platform time sources; the bench CLI supplies a `std::time::Instant`
//! clock and tests can supply a fixed one.
//!
//! Durations are serialized as fractional seconds (`f64`) since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::isolate::BackgroundModel;
use crate::pipeline::Pipeline;
use crate::types::{BoundingBox, CanonicalImage, PipelineConfig, PipelineError};

/// A monotonic time source.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration must be finite, non-negative seconds")
        })
    }
}

/// Diagnostics collected from one successful pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Upload validation and decoding.
    pub decode: StageDiagnostics,
    /// Working-resolution reduction.
    pub downsample: StageDiagnostics,
    /// Background isolation.
    pub isolate: StageDiagnostics,
    /// Canonical centering and crop.
    pub center: StageDiagnostics,
    /// Wall-clock duration of the whole run.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of the stage.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Decoder metrics.
    Decode {
        /// Upload size in bytes.
        input_bytes: usize,
        /// Decoded width.
        width: u32,
        /// Decoded height.
        height: u32,
    },
    /// Downsampler metrics.
    Downsample {
        /// Whether the image was resampled.
        applied: bool,
        /// Working width.
        width: u32,
        /// Working height.
        height: u32,
    },
    /// Isolator metrics.
    Isolate {
        /// Estimated background.
        background: BackgroundModel,
        /// Foreground pixels after cleanup.
        foreground_pixels: u64,
        /// Foreground share of the working image.
        coverage: f64,
        /// Components kept.
        components_kept: usize,
        /// Components dropped as noise.
        components_dropped: usize,
    },
    /// Centering metrics.
    Center {
        /// Content box in working-resolution coordinates.
        content: BoundingBox,
        /// Margin in working-resolution pixels.
        margin: u32,
        /// Canvas side length.
        canvas_size: u32,
        /// Content center offset from the canvas center, in pixels.
        center_offset: (f64, f64),
    },
}

/// Run the whole pipeline, collecting per-stage diagnostics.
///
/// # Errors
///
/// Propagates the first stage error; no diagnostics are returned for a
/// failed run.
pub fn prepare_with_diagnostics<C: Clock>(
    image_bytes: Vec<u8>,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(CanonicalImage, PipelineDiagnostics), PipelineError> {
    let input_bytes = image_bytes.len();
    let total_start = clock.now();

    let start = clock.now();
    let decoded = Pipeline::new(image_bytes, config.clone()).decode()?;
    let (width, height) = decoded.image().dimensions();
    let decode = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Decode {
            input_bytes,
            width,
            height,
        },
    };

    let start = clock.now();
    let downsampled = decoded.downsample();
    let (width, height) = downsampled.image().dimensions();
    let downsample = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Downsample {
            applied: downsampled.applied(),
            width,
            height,
        },
    };

    let start = clock.now();
    let isolated = downsampled.isolate()?;
    let iso = isolated.isolation();
    #[allow(clippy::cast_precision_loss)]
    let coverage = iso.foreground_pixels as f64 / (f64::from(width) * f64::from(height));
    let isolate = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Isolate {
            background: iso.background,
            foreground_pixels: iso.foreground_pixels,
            coverage,
            components_kept: iso.components_kept,
            components_dropped: iso.components_dropped,
        },
    };

    let start = clock.now();
    let centered = isolated.center()?;
    let center = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Center {
            content: centered.geometry().content,
            margin: centered.geometry().margin,
            canvas_size: centered.canonical().size(),
            center_offset: centered.canonical().center_offset(),
        },
    };

    let diagnostics = PipelineDiagnostics {
        decode,
        downsample,
        isolate,
        center,
        total_duration: clock.elapsed(&total_start),
    };
    Ok((centered.into_canonical(), diagnostics))
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration)
        ));
        lines.push(String::new());
        lines.push(format!(
            "{:<12} {:>10} {:>9}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in [
            ("Decode", &self.decode),
            ("Downsample", &self.downsample),
            ("Isolate", &self.isolate),
            ("Center", &self.center),
        ] {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{name:<12} {ms:>8.3}ms {pct:>8.1}%  {}",
                format_metrics(&diag.metrics)
            ));
        }
        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Downsample {
            applied,
            width,
            height,
        } => {
            if *applied {
                format!("resampled to {width}x{height}")
            } else {
                format!("unchanged at {width}x{height}")
            }
        }
        StageMetrics::Isolate {
            background,
            foreground_pixels,
            coverage,
            components_kept,
            components_dropped,
        } => {
            let bg = match background {
                BackgroundModel::Transparent => "transparent".to_string(),
                BackgroundModel::Color { rgb, spread } => {
                    format!("#{:02x}{:02x}{:02x} (spread {spread:.1})", rgb[0], rgb[1], rgb[2])
                }
            };
            format!(
                "bg {bg}, {foreground_pixels} px ({:.1}%), components {components_kept} kept / {components_dropped} dropped",
                coverage * 100.0,
            )
        }
        StageMetrics::Center {
            content,
            margin,
            canvas_size,
            center_offset,
        } => format!(
            "box ({},{})-({},{}), margin {margin}px, canvas {canvas_size}px, offset ({:.1}, {:.1})",
            content.min_x,
            content.min_y,
            content.max_x,
            content.max_y,
            center_offset.0,
            center_offset.1,
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use image::{ImageEncoder, Rgba, RgbaImage};

    use super::*;

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn square_png() -> Vec<u8> {
        let img = RgbaImage::from_fn(100, 100, |x, y| {
            if (30..70).contains(&x) && (30..70).contains(&y) {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let mut buf = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(img.as_raw(), 100, 100, image::ExtendedColorType::Rgba8)
            .unwrap();
        buf
    }

    #[test]
    fn collects_metrics_for_every_stage() {
        let clock = TickClock(Cell::new(0));
        let (canonical, diag) =
            prepare_with_diagnostics(square_png(), &PipelineConfig::default(), &clock).unwrap();
        assert_eq!(canonical.size(), 512);
        assert!(matches!(
            diag.decode.metrics,
            StageMetrics::Decode {
                width: 100,
                height: 100,
                ..
            }
        ));
        assert!(matches!(
            diag.isolate.metrics,
            StageMetrics::Isolate {
                background: BackgroundModel::Transparent,
                foreground_pixels: 1600,
                ..
            }
        ));
        assert!(diag.total_duration >= diag.center.duration);
    }

    #[test]
    fn report_names_every_stage() {
        let clock = TickClock(Cell::new(0));
        let (_, diag) =
            prepare_with_diagnostics(square_png(), &PipelineConfig::default(), &clock).unwrap();
        let report = diag.report();
        for stage in ["Decode", "Downsample", "Isolate", "Center"] {
            assert!(report.contains(stage), "report missing {stage}:\n{report}");
        }
        assert!(report.contains("box (30,30)-(70,70)"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let clock = TickClock(Cell::new(0));
        let (_, diag) =
            prepare_with_diagnostics(square_png(), &PipelineConfig::default(), &clock).unwrap();
        let json = serde_json::to_value(&diag).unwrap();
        assert!(json["decode"]["duration"].as_f64().unwrap() > 0.0);
        let back: PipelineDiagnostics = serde_json::from_value(json).unwrap();
        let drift = back.decode.duration.as_secs_f64() - diag.decode.duration.as_secs_f64();
        assert!(drift.abs() < 1e-9, "duration drifted by {drift}s");
    }

    #[test]
    fn failed_run_returns_error() {
        let clock = TickClock(Cell::new(0));
        let result = prepare_with_diagnostics(Vec::new(), &PipelineConfig::default(), &clock);
        assert!(matches!(result, Err(PipelineError::Input(_))));
    }
}
