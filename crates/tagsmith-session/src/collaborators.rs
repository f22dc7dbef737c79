//! Persistence and checkout collaborators.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tagsmith_placement::FinalizedDesign;

/// Opaque identifier assigned to a saved design.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignId(String);

impl DesignId {
    /// Wrap an identifier issued by the persistence service.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DesignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display attributes passed along with the checkout redirect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckoutAttributes {
    /// Printed scale in millimetres.
    pub scale_mm: f64,
    /// Number of suggested colors.
    pub color_count: usize,
}

impl CheckoutAttributes {
    /// Attributes describing `design`.
    #[must_use]
    pub fn of(design: &FinalizedDesign) -> Self {
        Self {
            scale_mm: design.transform().scale,
            color_count: design.verdict().suggested_colors.len(),
        }
    }
}

/// Saving a finalized design failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Storage could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Storage refused the design.
    #[error("storage rejected the design: {0}")]
    Rejected(String),
}

/// The checkout handoff failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutError {
    /// The checkout service could not be reached.
    #[error("checkout unavailable: {0}")]
    Unavailable(String),

    /// The checkout service refused the design.
    #[error("checkout rejected design {id}: {reason}")]
    Rejected {
        /// The design that was refused.
        id: DesignId,
        /// Why.
        reason: String,
    },
}

/// Write-once storage of finalized designs.
pub trait PersistenceService: Send + Sync {
    /// Store `design` and return its identifier.
    fn save(
        &self,
        design: &FinalizedDesign,
    ) -> impl Future<Output = Result<DesignId, PersistenceError>> + Send;
}

/// Out-of-process handoff to checkout.
pub trait CheckoutRedirect: Send + Sync {
    /// Hand the saved design to checkout.
    fn redirect(
        &self,
        id: &DesignId,
        attributes: CheckoutAttributes,
    ) -> impl Future<Output = Result<(), CheckoutError>> + Send;
}
