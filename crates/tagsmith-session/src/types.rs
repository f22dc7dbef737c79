//! Session configuration, outcomes, and errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagsmith_pipeline::{CanonicalImage, PipelineConfig, PipelineError};
use tagsmith_placement::{ManufacturabilityVerdict, PlacementError, PlacementTransform, PrintBounds};

use crate::collaborators::{CheckoutError, PersistenceError};
use crate::gate::GateError;

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("timeout must be finite, non-negative seconds")
        })
    }
}

/// Configuration for one design session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Preparation pipeline parameters.
    pub pipeline: PipelineConfig,
    /// How long to wait for the manufacturability gate, in seconds when
    /// serialized.
    #[serde(with = "duration_secs")]
    pub gate_timeout: Duration,
    /// Printable envelope enforced by the placement engine.
    pub bounds: PrintBounds,
    /// How many gate verdicts to remember by image fingerprint.
    pub verdict_cache_capacity: usize,
}

impl SessionConfig {
    /// Default gate timeout.
    pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default verdict cache capacity.
    pub const DEFAULT_VERDICT_CACHE_CAPACITY: usize = 64;
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            gate_timeout: Self::DEFAULT_GATE_TIMEOUT,
            bounds: PrintBounds::default(),
            verdict_cache_capacity: Self::DEFAULT_VERDICT_CACHE_CAPACITY,
        }
    }
}

/// A background task finished. Every outcome carries the generation it
/// was started under.
#[derive(Debug)]
pub enum RunOutcome {
    /// The preparation pipeline finished.
    Prepared {
        /// Run tag.
        generation: u64,
        /// Canonical image or the reason there is none.
        result: Result<CanonicalImage, PipelineError>,
    },
    /// The gate answered, failed, or timed out.
    Analyzed {
        /// Run tag.
        generation: u64,
        /// Gate dispatch this answers; a retry starts a new attempt.
        attempt: u64,
        /// Fingerprint of the image that was judged.
        fingerprint: u64,
        /// The verdict or the failure.
        result: Result<ManufacturabilityVerdict, GateError>,
    },
    /// A background task panicked or was cancelled.
    TaskFailed {
        /// Run tag.
        generation: u64,
        /// Join error description.
        message: String,
    },
}

impl RunOutcome {
    /// The generation this outcome belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        match self {
            Self::Prepared { generation, .. }
            | Self::Analyzed { generation, .. }
            | Self::TaskFailed { generation, .. } => *generation,
        }
    }
}

/// What applying an outcome did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// The outcome belonged to a superseded upload and was discarded.
    Stale,
    /// The canonical image is ready and the gate has been asked.
    AwaitingAnalysis,
    /// The design was placed at its default transform.
    Placed(PlacementTransform),
    /// The gate refused the design. Upload a different image.
    NotPrintable {
        /// The gate's explanation, verbatim.
        reasoning: String,
    },
}

/// Errors surfaced by a design session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The upload could not be prepared.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The gate failed or timed out. Retry with
    /// [`DesignSession::retry_analysis`](crate::DesignSession::retry_analysis).
    #[error("manufacturability analysis unavailable: {0}")]
    AnalysisUnavailable(#[source] GateError),

    /// The placement engine refused an operation.
    #[error(transparent)]
    Placement(#[from] PlacementError),

    /// Saving the finalized design failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The checkout handoff failed.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// The operation needs a canonical image and there is none.
    #[error("no canonical image is available; upload an image first")]
    NoCanonicalImage,

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// The session was created outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl SessionError {
    /// Whether retrying the same step can succeed without a new upload.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AnalysisUnavailable(_) | Self::Persistence(_) | Self::Checkout(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tagsmith_pipeline::SegmentationError;

    use super::*;

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.gate_timeout, Duration::from_secs(30));
        assert!((config.bounds.max_scale_mm - 39.0).abs() < f64::EPSILON);
        assert_eq!(config.verdict_cache_capacity, 64);
    }

    #[test]
    fn config_timeout_is_seconds_in_json() {
        let config: SessionConfig = serde_json::from_str(r#"{"gate_timeout": 2.5}"#).unwrap();
        assert_eq!(config.gate_timeout, Duration::from_millis(2500));
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(
            config.verdict_cache_capacity,
            SessionConfig::DEFAULT_VERDICT_CACHE_CAPACITY
        );
    }

    #[test]
    fn config_rejects_negative_timeout() {
        let result: Result<SessionConfig, _> = serde_json::from_str(r#"{"gate_timeout": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn recoverable_errors() {
        assert!(SessionError::AnalysisUnavailable(GateError::TimedOut(Duration::from_secs(1)))
            .is_recoverable());
        assert!(!SessionError::from(PipelineError::from(SegmentationError::NoSubjectDetected))
            .is_recoverable());
        assert!(!SessionError::NoCanonicalImage.is_recoverable());
    }

    #[test]
    fn outcome_reports_generation() {
        let outcome = RunOutcome::TaskFailed {
            generation: 7,
            message: "cancelled".into(),
        };
        assert_eq!(outcome.generation(), 7);
    }
}
