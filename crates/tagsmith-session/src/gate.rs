//! Manufacturability gate: the external service judging printability,
//! scale, and price.

use std::future::Future;
use std::time::Duration;

use tagsmith_pipeline::{CanonicalImage, Dimensions, PipelineError};
use tagsmith_placement::ManufacturabilityVerdict;

/// Payload sent to the gate for one canonical image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// PNG-encoded canonical image.
    pub png: Vec<u8>,
    /// Canvas dimensions.
    pub dimensions: Dimensions,
    /// Content fingerprint of the canonical image.
    pub fingerprint: u64,
}

impl AnalysisRequest {
    /// Build the request for `canonical`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Encode`] if PNG encoding fails.
    pub fn for_canonical(canonical: &CanonicalImage) -> Result<Self, PipelineError> {
        Ok(Self {
            png: canonical.encode_png()?,
            dimensions: Dimensions::of(canonical.image()),
            fingerprint: canonical.fingerprint(),
        })
    }
}

/// The gate could not produce a verdict. Always recoverable by retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Network or service failure.
    #[error("gate unavailable: {0}")]
    Unavailable(String),

    /// The service answered with something that is not a verdict.
    #[error("gate returned an invalid response: {0}")]
    InvalidResponse(String),

    /// No answer within the configured timeout.
    #[error("gate did not answer within {0:?}")]
    TimedOut(Duration),
}

/// External judgment of whether a canonical image can be printed.
///
/// Implementations are untrusted and may fail or stall; the session
/// applies its own timeout and treats every failure as recoverable.
pub trait ManufacturabilityGate: Send + Sync + 'static {
    /// Judge one canonical image.
    fn analyze(
        &self,
        request: AnalysisRequest,
    ) -> impl Future<Output = Result<ManufacturabilityVerdict, GateError>> + Send;
}
