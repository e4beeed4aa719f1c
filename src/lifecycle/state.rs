//! Lifecycle state machine types

use crate::error::BridgeError;
use crate::types::Route;

use ethers::types::U256;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Discriminant of `LifecycleState`, used for events, metrics and stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Idle,
    CheckingAllowance,
    AwaitingApproval,
    SubmittingApproval,
    ConfirmingApproval,
    ReadyToBridge,
    SubmittingBridge,
    ConfirmingBridge,
    Completed,
    NoRoute,
    Cancelled,
    Failed,
}

impl StateKind {
    pub const ALL: [StateKind; 12] = [
        StateKind::Idle,
        StateKind::CheckingAllowance,
        StateKind::AwaitingApproval,
        StateKind::SubmittingApproval,
        StateKind::ConfirmingApproval,
        StateKind::ReadyToBridge,
        StateKind::SubmittingBridge,
        StateKind::ConfirmingBridge,
        StateKind::Completed,
        StateKind::NoRoute,
        StateKind::Cancelled,
        StateKind::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Idle => "idle",
            StateKind::CheckingAllowance => "checking_allowance",
            StateKind::AwaitingApproval => "awaiting_approval",
            StateKind::SubmittingApproval => "submitting_approval",
            StateKind::ConfirmingApproval => "confirming_approval",
            StateKind::ReadyToBridge => "ready_to_bridge",
            StateKind::SubmittingBridge => "submitting_bridge",
            StateKind::ConfirmingBridge => "confirming_bridge",
            StateKind::Completed => "completed",
            StateKind::NoRoute => "no_route",
            StateKind::Cancelled => "cancelled",
            StateKind::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StateKind::Completed | StateKind::NoRoute | StateKind::Cancelled | StateKind::Failed
        )
    }

    /// A transaction has been handed to the signer; it cannot be recalled
    pub fn is_submitted(&self) -> bool {
        matches!(
            self,
            StateKind::SubmittingApproval
                | StateKind::ConfirmingApproval
                | StateKind::SubmittingBridge
                | StateKind::ConfirmingBridge
        )
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step of the lifecycle a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Allowance,
    Approval,
    Quote,
    Bridge,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Allowance => "allowance",
            Phase::Approval => "approval",
            Phase::Quote => "quote",
            Phase::Bridge => "bridge",
        };
        f.write_str(name)
    }
}

/// The single source of truth for one bridge operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    CheckingAllowance,
    AwaitingApproval {
        #[serde(serialize_with = "decimal")]
        allowed: U256,
        #[serde(serialize_with = "decimal")]
        required: U256,
    },
    SubmittingApproval,
    ConfirmingApproval {
        tx_hash: String,
    },
    /// `route` is filled in once a quote has been selected
    ReadyToBridge {
        route: Option<Route>,
    },
    SubmittingBridge {
        route: Route,
    },
    ConfirmingBridge {
        tx_hash: String,
        route: Route,
    },
    Completed {
        tx_hash: String,
        route: Route,
    },
    /// The quote service answered with no viable route
    NoRoute,
    Cancelled {
        from: StateKind,
    },
    Failed {
        phase: Phase,
        cause: BridgeError,
    },
}

impl LifecycleState {
    pub fn kind(&self) -> StateKind {
        match self {
            LifecycleState::Idle => StateKind::Idle,
            LifecycleState::CheckingAllowance => StateKind::CheckingAllowance,
            LifecycleState::AwaitingApproval { .. } => StateKind::AwaitingApproval,
            LifecycleState::SubmittingApproval => StateKind::SubmittingApproval,
            LifecycleState::ConfirmingApproval { .. } => StateKind::ConfirmingApproval,
            LifecycleState::ReadyToBridge { .. } => StateKind::ReadyToBridge,
            LifecycleState::SubmittingBridge { .. } => StateKind::SubmittingBridge,
            LifecycleState::ConfirmingBridge { .. } => StateKind::ConfirmingBridge,
            LifecycleState::Completed { .. } => StateKind::Completed,
            LifecycleState::NoRoute => StateKind::NoRoute,
            LifecycleState::Cancelled { .. } => StateKind::Cancelled,
            LifecycleState::Failed { .. } => StateKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Hash of the transaction this state refers to, including the one
    /// carried by a timeout or revert failure
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            LifecycleState::ConfirmingApproval { tx_hash }
            | LifecycleState::ConfirmingBridge { tx_hash, .. }
            | LifecycleState::Completed { tx_hash, .. } => Some(tx_hash.as_str()),
            LifecycleState::Failed {
                cause:
                    BridgeError::ConfirmationTimeout { tx_hash }
                    | BridgeError::TransactionReverted { tx_hash },
                ..
            } => Some(tx_hash.as_str()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&BridgeError> {
        match self {
            LifecycleState::Failed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

fn decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}
