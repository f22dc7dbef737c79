//! Placement state machine.
//!
//! ```text
//! Uninitialized ──apply_verdict(printable)──▶ DefaultPlaced ──set_*──▶ UserEdited
//!       ▲                                          │                      │
//!       │                                          └──────finalize────────┴──▶ Finalized
//!       └───────────────── reset / load_canonical (from any state) ─────────────┘
//! ```
//!
//! The engine owns the authoritative [`PlacementTransform`] and never
//! renders. Every successful transition is reported to subscribed
//! observers so a renderer can redraw from [`PlacementEngine::view`].

use std::fmt;
use std::sync::Arc;

use tagsmith_pipeline::CanonicalImage;

use crate::bounds::{OffsetRange, PrintBounds};
use crate::error::{Operation, PlacementError};
use crate::transform::{Footprint, PlacementTransform};
use crate::verdict::ManufacturabilityVerdict;

/// Lifecycle state of a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementState {
    /// Nothing placed yet.
    Uninitialized,
    /// Placed at the default transform after a printable verdict.
    DefaultPlaced,
    /// At least one manual edit has been applied.
    UserEdited,
    /// Checkout started; the transform is read-only.
    Finalized,
}

impl fmt::Display for PlacementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::DefaultPlaced => "placed at defaults",
            Self::UserEdited => "edited",
            Self::Finalized => "finalized",
        })
    }
}

/// Notification sent to observers after a successful transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementEvent {
    /// A printable verdict placed the design at its default transform.
    Placed(PlacementTransform),
    /// A manual edit changed the transform.
    Edited(PlacementTransform),
    /// The transform was frozen for checkout.
    Finalized(PlacementTransform),
    /// The engine returned to `Uninitialized`.
    Reset,
}

/// Result of applying a verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum VerdictOutcome {
    /// The design was placed at this transform.
    Placed(PlacementTransform),
    /// The gate refused the design; its reasoning is passed through
    /// verbatim.
    NotPrintable {
        /// The gate's explanation.
        reasoning: String,
    },
}

/// Handle returned by [`PlacementEngine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&PlacementEvent) + Send>;

/// Immutable snapshot handed to persistence and checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedDesign {
    canonical: Arc<CanonicalImage>,
    transform: PlacementTransform,
    verdict: Arc<ManufacturabilityVerdict>,
}

impl FinalizedDesign {
    /// The canonical image that was placed.
    #[must_use]
    pub const fn canonical(&self) -> &Arc<CanonicalImage> {
        &self.canonical
    }

    /// The frozen transform.
    #[must_use]
    pub const fn transform(&self) -> PlacementTransform {
        self.transform
    }

    /// The verdict the placement was based on.
    #[must_use]
    pub const fn verdict(&self) -> &Arc<ManufacturabilityVerdict> {
        &self.verdict
    }
}

/// Everything a renderer needs to draw the current placement.
#[derive(Debug, Clone, Copy)]
pub struct RenderView<'a> {
    /// The canonical image to draw.
    pub canonical: &'a CanonicalImage,
    /// Where to draw it.
    pub transform: PlacementTransform,
    /// Suggested colors, most dominant first.
    pub suggested_colors: &'a [String],
    /// Content extent on the blank, offsets included.
    pub footprint: Footprint,
    /// Current state.
    pub state: PlacementState,
}

/// Authoritative placement state for one design.
pub struct PlacementEngine {
    bounds: PrintBounds,
    state: PlacementState,
    canonical: Option<Arc<CanonicalImage>>,
    verdict: Option<Arc<ManufacturabilityVerdict>>,
    transform: Option<PlacementTransform>,
    rejected: bool,
    observers: Vec<(ObserverId, Observer)>,
    next_observer_id: u64,
}

impl PlacementEngine {
    /// An empty engine enforcing `bounds`.
    #[must_use]
    pub fn new(bounds: PrintBounds) -> Self {
        Self {
            bounds,
            state: PlacementState::Uninitialized,
            canonical: None,
            verdict: None,
            transform: None,
            rejected: false,
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }

    /// The enforced bounds.
    #[must_use]
    pub const fn bounds(&self) -> &PrintBounds {
        &self.bounds
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PlacementState {
        self.state
    }

    /// Current transform, once placed.
    #[must_use]
    pub const fn transform(&self) -> Option<PlacementTransform> {
        self.transform
    }

    /// The applied verdict, printable or not.
    #[must_use]
    pub fn verdict(&self) -> Option<&ManufacturabilityVerdict> {
        self.verdict.as_deref()
    }

    /// The loaded canonical image.
    #[must_use]
    pub const fn canonical(&self) -> Option<&Arc<CanonicalImage>> {
        self.canonical.as_ref()
    }

    /// Whether the gate refused the loaded canonical image.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Content extent on the blank under the current transform, offsets
    /// included.
    #[must_use]
    pub fn footprint(&self) -> Option<Footprint> {
        let (canonical, t) = self.canonical.as_deref().zip(self.transform)?;
        Some(Footprint::for_canonical(canonical, &t).translated(t.offset_x, t.offset_y))
    }

    /// Offsets currently allowed by the scale and rotation.
    #[must_use]
    pub fn offset_range(&self) -> Option<OffsetRange> {
        let (canonical, t) = self.canonical.as_deref().zip(self.transform)?;
        Some(self.bounds.offset_range(&Footprint::for_canonical(canonical, &t)))
    }

    /// Read-only view for the rendering collaborator.
    #[must_use]
    pub fn view(&self) -> Option<RenderView<'_>> {
        let canonical = self.canonical.as_deref()?;
        let transform = self.transform?;
        Some(RenderView {
            canonical,
            transform,
            suggested_colors: self
                .verdict
                .as_deref()
                .map_or(&[][..], |v| v.suggested_colors.as_slice()),
            footprint: Footprint::for_canonical(canonical, &transform)
                .translated(transform.offset_x, transform.offset_y),
            state: self.state,
        })
    }

    /// Register an observer called after every successful transition.
    pub fn subscribe(&mut self, observer: impl FnMut(&PlacementEvent) + Send + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Supply a new canonical image, discarding any previous placement,
    /// verdict, or rejection.
    pub fn load_canonical(&mut self, canonical: Arc<CanonicalImage>) {
        let was_placed = self.state != PlacementState::Uninitialized;
        log::info!(
            "placement: loaded canonical image {:016x}",
            canonical.fingerprint()
        );
        self.clear();
        self.canonical = Some(canonical);
        if was_placed {
            self.notify(PlacementEvent::Reset);
        }
    }

    /// Apply the gate's verdict for the loaded canonical image.
    ///
    /// # Errors
    ///
    /// - [`PlacementError::NotReady`] if no canonical image is loaded.
    /// - [`PlacementError::Rejected`] if a verdict already refused it.
    /// - [`PlacementError::InvalidTransition`] outside `Uninitialized`.
    pub fn apply_verdict(
        &mut self,
        verdict: impl Into<Arc<ManufacturabilityVerdict>>,
    ) -> Result<VerdictOutcome, PlacementError> {
        if self.state != PlacementState::Uninitialized {
            return Err(self.invalid(Operation::ApplyVerdict));
        }
        if self.rejected {
            return Err(PlacementError::Rejected);
        }
        let canonical = self.canonical.clone().ok_or(PlacementError::NotReady)?;
        let verdict = verdict.into();

        if !verdict.is_printable {
            log::info!("placement: design judged not printable: {}", verdict.reasoning);
            let reasoning = verdict.reasoning.clone();
            self.verdict = Some(verdict);
            self.rejected = true;
            return Ok(VerdictOutcome::NotPrintable { reasoning });
        }

        let scale = self.bounds.initial_scale(verdict.recommended_scale);
        let transform = self.constrain(&canonical, PlacementTransform::centered(scale));
        log::info!(
            "placement: placed at {scale:.1}mm (recommended {:?})",
            verdict.recommended_scale
        );
        self.verdict = Some(verdict);
        self.transform = Some(transform);
        self.state = PlacementState::DefaultPlaced;
        self.notify(PlacementEvent::Placed(transform));
        Ok(VerdictOutcome::Placed(transform))
    }

    /// Move the design. Each offset is clamped to the range that keeps
    /// the footprint on the blank; NaN keeps that component.
    ///
    /// # Errors
    ///
    /// [`PlacementError::InvalidTransition`] unless placed and not
    /// finalized, [`PlacementError::Rejected`] after a refusal.
    pub fn set_offset(&mut self, x: f64, y: f64) -> Result<PlacementTransform, PlacementError> {
        let (canonical, mut t) = self.editable(Operation::SetOffset)?;
        let range = self.bounds.offset_range(&Footprint::for_canonical(&canonical, &t));
        t.offset_x = range.x.clamp(x, t.offset_x);
        t.offset_y = range.y.clamp(y, t.offset_y);
        Ok(self.commit_edit(t))
    }

    /// Resize the design, clamped to the scale bounds. Offsets are
    /// re-clamped for the new footprint.
    ///
    /// # Errors
    ///
    /// As for [`Self::set_offset`].
    pub fn set_scale(&mut self, scale: f64) -> Result<PlacementTransform, PlacementError> {
        let (canonical, mut t) = self.editable(Operation::SetScale)?;
        t.scale = self.bounds.clamp_scale(scale, t.scale);
        let t = self.constrain(&canonical, t);
        Ok(self.commit_edit(t))
    }

    /// Rotate the design, wrapping into `[0, 2π)`. Offsets are re-clamped
    /// for the new footprint.
    ///
    /// # Errors
    ///
    /// As for [`Self::set_offset`].
    pub fn set_rotation(&mut self, radians: f64) -> Result<PlacementTransform, PlacementError> {
        let (canonical, mut t) = self.editable(Operation::SetRotation)?;
        t.rotation = PrintBounds::wrap_rotation(radians, t.rotation);
        let t = self.constrain(&canonical, t);
        Ok(self.commit_edit(t))
    }

    /// Freeze the placement for checkout.
    ///
    /// # Errors
    ///
    /// [`PlacementError::NotReady`] if nothing is placed,
    /// [`PlacementError::InvalidTransition`] if already finalized.
    pub fn finalize(&mut self) -> Result<FinalizedDesign, PlacementError> {
        match self.state {
            PlacementState::Uninitialized => return Err(PlacementError::NotReady),
            PlacementState::Finalized => return Err(self.invalid(Operation::Finalize)),
            PlacementState::DefaultPlaced | PlacementState::UserEdited => {}
        }
        let (Some(canonical), Some(transform), Some(verdict)) =
            (self.canonical.clone(), self.transform, self.verdict.clone())
        else {
            return Err(PlacementError::NotReady);
        };
        log::info!("placement: finalized {transform:?}");
        self.state = PlacementState::Finalized;
        self.notify(PlacementEvent::Finalized(transform));
        Ok(FinalizedDesign {
            canonical,
            transform,
            verdict,
        })
    }

    /// Return to `Uninitialized`, discarding the canonical image and
    /// verdict. Valid from any state.
    pub fn reset(&mut self) {
        log::info!("placement: reset from {}", self.state);
        self.clear();
        self.notify(PlacementEvent::Reset);
    }

    fn clear(&mut self) {
        self.state = PlacementState::Uninitialized;
        self.canonical = None;
        self.verdict = None;
        self.transform = None;
        self.rejected = false;
    }

    fn editable(
        &self,
        operation: Operation,
    ) -> Result<(Arc<CanonicalImage>, PlacementTransform), PlacementError> {
        match self.state {
            PlacementState::DefaultPlaced | PlacementState::UserEdited => {}
            PlacementState::Uninitialized if self.rejected => return Err(PlacementError::Rejected),
            PlacementState::Uninitialized | PlacementState::Finalized => {
                return Err(self.invalid(operation));
            }
        }
        self.canonical
            .clone()
            .zip(self.transform)
            .ok_or(PlacementError::NotReady)
    }

    /// Pull the offsets into the range allowed by the transform's
    /// footprint.
    fn constrain(&self, canonical: &CanonicalImage, mut t: PlacementTransform) -> PlacementTransform {
        let range = self.bounds.offset_range(&Footprint::for_canonical(canonical, &t));
        t.offset_x = range.x.clamp(t.offset_x, 0.0);
        t.offset_y = range.y.clamp(t.offset_y, 0.0);
        t
    }

    fn commit_edit(&mut self, t: PlacementTransform) -> PlacementTransform {
        log::debug!("placement: edited to {t:?}");
        self.transform = Some(t);
        self.state = PlacementState::UserEdited;
        self.notify(PlacementEvent::Edited(t));
        t
    }

    const fn invalid(&self, operation: Operation) -> PlacementError {
        PlacementError::InvalidTransition {
            from: self.state,
            operation,
        }
    }

    fn notify(&mut self, event: PlacementEvent) {
        for (_, observer) in &mut self.observers {
            observer(&event);
        }
    }
}

impl Default for PlacementEngine {
    fn default() -> Self {
        Self::new(PrintBounds::default())
    }
}

impl fmt::Debug for PlacementEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlacementEngine")
            .field("bounds", &self.bounds)
            .field("state", &self.state)
            .field("transform", &self.transform)
            .field("rejected", &self.rejected)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
