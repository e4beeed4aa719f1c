//! Hydra Bridge - transaction lifecycle orchestration for cross-chain token bridging
//!
//! Sequences allowance checks, approvals, route selection and bridge
//! submission against a bridge backend, with confirmation tracking through
//! an injected signer.

pub mod allowance;
pub mod api;
pub mod backend;
pub mod builder;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod quote;
pub mod registry;
pub mod state;
pub mod tx;
pub mod types;
pub mod units;

pub use error::{BridgeError, BridgeResult};
pub use lifecycle::{BridgeOrchestrator, BridgeRequest, Lifecycle, LifecycleState, StateKind};
