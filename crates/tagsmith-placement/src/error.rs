//! Placement engine errors.

use crate::engine::PlacementState;

/// A placement operation was refused.
///
/// State errors leave the engine unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// No canonical image is loaded, or nothing has been placed yet.
    #[error("placement is not ready: no printable design has been placed")]
    NotReady,

    /// The operation is not valid in the current state.
    #[error("cannot {operation} while {from}")]
    InvalidTransition {
        /// State the engine was in.
        from: PlacementState,
        /// Operation that was attempted.
        operation: Operation,
    },

    /// The gate judged the current canonical image not printable; a new
    /// image must be loaded first.
    #[error("the current design was judged not printable; upload a new image")]
    Rejected,
}

/// Engine operations, named in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `apply_verdict`.
    ApplyVerdict,
    /// `set_offset`.
    SetOffset,
    /// `set_scale`.
    SetScale,
    /// `set_rotation`.
    SetRotation,
    /// `finalize`.
    Finalize,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ApplyVerdict => "apply a verdict",
            Self::SetOffset => "set the offset",
            Self::SetScale => "set the scale",
            Self::SetRotation => "set the rotation",
            Self::Finalize => "finalize",
        })
    }
}
