//! Bridge transaction lifecycle
//!
//! A lifecycle sequences one bridge operation:
//! 1. Allowance check against the bridge contract
//! 2. Approval build, submission and confirmation (only if needed)
//! 3. Route selection
//! 4. Bridge build, submission and confirmation
//!
//! Each instance is single-use. A failed or cancelled lifecycle is never
//! resumed; callers start a new one.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{BridgeOrchestrator, BridgeRequest, Lifecycle, LifecycleSnapshot};
pub use state::{LifecycleState, Phase, StateKind};
