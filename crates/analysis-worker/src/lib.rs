//! analysis-worker: the per-event analysis path.
//!
//! Triggered once per bus delivery: assemble a bounded context snapshot from
//! the fact store, invoke synthesis, persist the report idempotently.
//! Concurrent invocations for the same source URL are safe; the store's
//! uniqueness constraint picks the winner.

pub mod context;
pub mod synthesis;
pub mod worker;

pub use context::{ContextAssembler, NO_PRICE_DATA};
pub use synthesis::{SynthesisInvoker, SYNTHESIS_FAILED};
pub use worker::{AnalysisWorker, DeliveryOutcome};
