//! One user's design session.
//!
//! The session owns the placement engine and drives two kinds of
//! background work on tokio: the preparation pipeline (on the blocking
//! pool) and the manufacturability gate call. Each run is tagged with a
//! generation; a new upload advances the generation and aborts whatever
//! is in flight, so results of a superseded upload are never applied.
//!
//! ```text
//! submit_upload ──▶ [pipeline task] ──Prepared──▶ apply_outcome ──cache hit──▶ Placed / NotPrintable
//!                                                       │
//!                                                       └─miss─▶ [gate task] ──Analyzed──▶ apply_outcome
//! ```
//!
//! Cancelling a pipeline run drops its result and raises a flag the
//! blocking work checks between stages, so it stops at the next stage
//! boundary. Gate calls are tagged with an attempt number as well; only
//! the answer to the latest dispatch is applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tagsmith_pipeline::CanonicalImage;
use tagsmith_placement::{
    FinalizedDesign, ManufacturabilityVerdict, Operation, PlacementEngine, PlacementError,
    VerdictOutcome,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::cache::VerdictCache;
use crate::collaborators::{CheckoutAttributes, CheckoutRedirect, DesignId, PersistenceService};
use crate::gate::{AnalysisRequest, GateError, ManufacturabilityGate};
use crate::generation::Generation;
use crate::types::{Progress, RunOutcome, SessionConfig, SessionError};

/// Design session over injected collaborators.
///
/// Single writer: every mutation goes through `&mut self`, so the
/// engine needs no locking.
pub struct DesignSession<G, P, C> {
    config: SessionConfig,
    runtime: Handle,
    gate: Arc<G>,
    persistence: P,
    checkout: C,
    engine: PlacementEngine,
    generation: Generation,
    pipeline_task: Option<JoinHandle<()>>,
    pipeline_cancel: Option<Arc<AtomicBool>>,
    analysis_task: Option<JoinHandle<()>>,
    analysis_attempt: u64,
    canonical: Option<Arc<CanonicalImage>>,
    verdicts: VerdictCache,
    finalized: Option<FinalizedDesign>,
    /// Id of the saved `finalized` design, so a retried redirect does not
    /// save it again.
    saved: Option<DesignId>,
    outcomes_tx: mpsc::UnboundedSender<RunOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<RunOutcome>,
}

impl<G, P, C> DesignSession<G, P, C>
where
    G: ManufacturabilityGate,
    P: PersistenceService,
    C: CheckoutRedirect,
{
    /// Create a session on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoRuntime`] when called outside a tokio
    /// runtime.
    pub fn new(
        config: SessionConfig,
        gate: G,
        persistence: P,
        checkout: C,
    ) -> Result<Self, SessionError> {
        let runtime = Handle::try_current().map_err(|e| SessionError::NoRuntime(e.to_string()))?;
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let verdicts = VerdictCache::new(config.verdict_cache_capacity);
        Ok(Self {
            engine: PlacementEngine::new(config.bounds),
            config,
            runtime,
            gate: Arc::new(gate),
            persistence,
            checkout,
            generation: Generation::default(),
            pipeline_task: None,
            pipeline_cancel: None,
            analysis_task: None,
            analysis_attempt: 0,
            canonical: None,
            verdicts,
            finalized: None,
            saved: None,
            outcomes_tx,
            outcomes_rx,
        })
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Tag of the most recent upload.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// The placement engine, for rendering.
    #[must_use]
    pub const fn placement(&self) -> &PlacementEngine {
        &self.engine
    }

    /// The placement engine, for edits.
    pub const fn placement_mut(&mut self) -> &mut PlacementEngine {
        &mut self.engine
    }

    /// Canonical image of the current upload, once prepared.
    #[must_use]
    pub const fn canonical(&self) -> Option<&Arc<CanonicalImage>> {
        self.canonical.as_ref()
    }

    /// Cached verdict for a canonical image fingerprint.
    #[must_use]
    pub fn cached_verdict(&self, fingerprint: u64) -> Option<&ManufacturabilityVerdict> {
        self.verdicts.peek(fingerprint).map(Arc::as_ref)
    }

    /// Whether a pipeline run or gate call is still outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        [&self.pipeline_task, &self.analysis_task]
            .into_iter()
            .flatten()
            .any(|task| !task.is_finished())
    }

    /// Start preparing a new upload, superseding any previous one.
    ///
    /// Returns the new generation. The engine is reset immediately; the
    /// outcome arrives through [`Self::next_outcome`].
    pub fn submit_upload(&mut self, bytes: Vec<u8>) -> u64 {
        let generation = self.generation.advance();
        self.cancel();
        self.engine.reset();
        self.canonical = None;
        self.finalized = None;
        self.saved = None;
        log::info!(
            "session: upload {generation} submitted ({} bytes)",
            bytes.len()
        );

        let config = self.config.pipeline.clone();
        let tx = self.outcomes_tx.clone();
        let runtime = self.runtime.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        self.pipeline_cancel = Some(Arc::clone(&cancelled));
        self.pipeline_task = Some(self.runtime.spawn(async move {
            let joined = runtime
                .spawn_blocking(move || {
                    tagsmith_pipeline::prepare_cancellable(bytes, &config, || {
                        cancelled.load(Ordering::Relaxed)
                    })
                })
                .await;
            let outcome = match joined {
                Ok(Ok(Some(canonical))) => RunOutcome::Prepared {
                    generation,
                    result: Ok(canonical),
                },
                Ok(Ok(None)) => {
                    log::debug!("session: upload {generation} cancelled mid-pipeline");
                    return;
                }
                Ok(Err(e)) => RunOutcome::Prepared {
                    generation,
                    result: Err(e),
                },
                Err(e) => RunOutcome::TaskFailed {
                    generation,
                    message: e.to_string(),
                },
            };
            // The receiver lives as long as the session.
            let _ = tx.send(outcome);
        }));
        generation
    }

    /// Abort any in-flight pipeline run or gate call.
    ///
    /// A pipeline run already on the blocking pool stops at its next
    /// stage boundary.
    pub fn cancel(&mut self) {
        if let Some(flag) = self.pipeline_cancel.take() {
            flag.store(true, Ordering::Relaxed);
        }
        for task in [self.pipeline_task.take(), self.analysis_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }

    /// Wait for the next background outcome and apply it.
    ///
    /// Returns `None` when nothing is in flight and no outcome is
    /// queued.
    pub async fn next_outcome(&mut self) -> Option<Result<Progress, SessionError>> {
        let outcome = match self.outcomes_rx.try_recv() {
            Ok(outcome) => outcome,
            Err(_) if self.is_busy() => self.outcomes_rx.recv().await?,
            // A task may have sent and finished since the first check.
            Err(_) => self.outcomes_rx.try_recv().ok()?,
        };
        Some(self.apply_outcome(outcome))
    }

    /// Apply one background outcome.
    ///
    /// Outcomes from superseded generations, and gate answers to an
    /// attempt that has since been retried, are discarded as
    /// [`Progress::Stale`] without touching the engine.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Pipeline`] if the upload could not be prepared.
    /// - [`SessionError::AnalysisUnavailable`] if the gate failed or
    ///   timed out; see [`Self::retry_analysis`].
    /// - [`SessionError::TaskFailed`] if a background task died.
    pub fn apply_outcome(&mut self, outcome: RunOutcome) -> Result<Progress, SessionError> {
        let generation = outcome.generation();
        if !self.generation.is_current(generation) {
            log::warn!(
                "session: discarding outcome of superseded upload {generation} (current {})",
                self.generation.current()
            );
            return Ok(Progress::Stale);
        }

        match outcome {
            RunOutcome::Prepared { result, .. } => {
                self.pipeline_task = None;
                self.pipeline_cancel = None;
                let canonical = Arc::new(result?);
                self.canonical = Some(Arc::clone(&canonical));
                self.engine.load_canonical(Arc::clone(&canonical));

                if let Some(verdict) = self.verdicts.get(canonical.fingerprint()) {
                    log::debug!(
                        "session: verdict cache hit for {:016x}",
                        canonical.fingerprint()
                    );
                    return self.place(verdict);
                }
                self.dispatch_analysis(&canonical)?;
                Ok(Progress::AwaitingAnalysis)
            }
            RunOutcome::Analyzed {
                attempt,
                fingerprint,
                result,
                ..
            } => {
                if attempt != self.analysis_attempt {
                    log::warn!(
                        "session: discarding answer to analysis attempt {attempt} (current {})",
                        self.analysis_attempt
                    );
                    return Ok(Progress::Stale);
                }
                self.analysis_task = None;
                if self.canonical.as_ref().map(|c| c.fingerprint()) != Some(fingerprint) {
                    log::warn!("session: discarding verdict for replaced image {fingerprint:016x}");
                    return Ok(Progress::Stale);
                }
                let verdict = result.map_err(|e| {
                    log::warn!("session: manufacturability analysis failed: {e}");
                    SessionError::AnalysisUnavailable(e)
                })?;
                let verdict = Arc::new(verdict);
                self.verdicts.insert(fingerprint, Arc::clone(&verdict));
                self.place(verdict)
            }
            RunOutcome::TaskFailed { message, .. } => {
                log::warn!("session: background task failed: {message}");
                Err(SessionError::TaskFailed(message))
            }
        }
    }

    /// Ask the gate again about the current canonical image without
    /// redoing segmentation.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NoCanonicalImage`] if nothing has been prepared.
    /// - [`SessionError::Placement`] if a verdict was already applied.
    pub fn retry_analysis(&mut self) -> Result<(), SessionError> {
        let canonical = self.canonical.clone().ok_or(SessionError::NoCanonicalImage)?;
        if self.engine.verdict().is_some() {
            return Err(PlacementError::InvalidTransition {
                from: self.engine.state(),
                operation: Operation::ApplyVerdict,
            }
            .into());
        }
        if let Some(task) = self.analysis_task.take() {
            task.abort();
        }
        log::info!(
            "session: retrying analysis for upload {}",
            self.generation.current()
        );
        self.dispatch_analysis(&canonical)
    }

    /// Finalize the placement, save it, and hand it to checkout.
    ///
    /// A failed save or redirect can be retried. The finalized snapshot
    /// and, once saved, its id are kept until the next upload, so a
    /// retried redirect reuses the saved design.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Placement`] if nothing is placed.
    /// - [`SessionError::Persistence`] or [`SessionError::Checkout`] if a
    ///   collaborator fails.
    pub async fn checkout(&mut self) -> Result<DesignId, SessionError> {
        let design = match &self.finalized {
            Some(design) => design.clone(),
            None => {
                let design = self.engine.finalize()?;
                self.finalized = Some(design.clone());
                design
            }
        };
        let id = match &self.saved {
            Some(id) => id.clone(),
            None => {
                let id = self.persistence.save(&design).await?;
                log::info!("session: saved design {id}");
                self.saved = Some(id.clone());
                id
            }
        };
        self.checkout
            .redirect(&id, CheckoutAttributes::of(&design))
            .await?;
        log::info!("session: redirected design {id} to checkout");
        Ok(id)
    }

    fn place(&mut self, verdict: Arc<ManufacturabilityVerdict>) -> Result<Progress, SessionError> {
        Ok(match self.engine.apply_verdict(verdict)? {
            VerdictOutcome::Placed(transform) => Progress::Placed(transform),
            VerdictOutcome::NotPrintable { reasoning } => Progress::NotPrintable { reasoning },
        })
    }

    fn dispatch_analysis(&mut self, canonical: &CanonicalImage) -> Result<(), SessionError> {
        let request = AnalysisRequest::for_canonical(canonical)?;
        self.analysis_attempt = self.analysis_attempt.wrapping_add(1);
        let attempt = self.analysis_attempt;
        let generation = self.generation.current();
        let fingerprint = request.fingerprint;
        let timeout = self.config.gate_timeout;
        let gate = Arc::clone(&self.gate);
        let tx = self.outcomes_tx.clone();
        let runtime = self.runtime.clone();

        self.analysis_task = Some(self.runtime.spawn(async move {
            // Nested task so a panicking gate surfaces as a join error.
            let call = runtime.spawn(async move { gate.analyze(request).await });
            let _guard = AbortOnDrop(call.abort_handle());
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(result)) => RunOutcome::Analyzed {
                    generation,
                    attempt,
                    fingerprint,
                    result,
                },
                Ok(Err(e)) => RunOutcome::Analyzed {
                    generation,
                    attempt,
                    fingerprint,
                    result: Err(GateError::Unavailable(e.to_string())),
                },
                Err(_) => RunOutcome::Analyzed {
                    generation,
                    attempt,
                    fingerprint,
                    result: Err(GateError::TimedOut(timeout)),
                },
            };
            let _ = tx.send(outcome);
        }));
        Ok(())
    }
}

/// Aborts the gate call when the task awaiting it is aborted or gives up.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<G, P, C> Drop for DesignSession<G, P, C> {
    fn drop(&mut self) {
        if let Some(flag) = self.pipeline_cancel.take() {
            flag.store(true, Ordering::Relaxed);
        }
        for task in [self.pipeline_task.take(), self.analysis_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}
