//! tagsmith-session: async orchestration of one design session.
//!
//! Runs the preparation pipeline off the caller's task, asks the
//! manufacturability gate about the result, feeds the verdict into the
//! placement engine, and hands finalized designs to persistence and
//! checkout. All external services are injected through the traits in
//! [`gate`] and [`collaborators`].

pub mod cache;
pub mod collaborators;
pub mod gate;
pub mod generation;
pub mod session;
pub mod types;

pub use collaborators::{
    CheckoutAttributes, CheckoutError, CheckoutRedirect, DesignId, PersistenceError,
    PersistenceService,
};
pub use gate::{AnalysisRequest, GateError, ManufacturabilityGate};
pub use session::DesignSession;
pub use types::{Progress, RunOutcome, SessionConfig, SessionError};
