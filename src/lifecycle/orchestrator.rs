//! Lifecycle orchestration: allowance, approval, quote, bridge, confirmation

use super::state::{LifecycleState, Phase, StateKind};
use crate::allowance::AllowanceOracle;
use crate::builder::TransactionBuilder;
use crate::config::LifecycleConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{LifecycleEvent, NotificationSink};
use crate::quote::QuoteRouter;
use crate::registry::ChainAssetRegistry;
use crate::tx::ExternalSigner;
use crate::types::{
    AllowanceQuery, AllowanceResult, QuoteRequest, ReceiptVerdict, Route, Token, TxReceipt,
    TxRequest,
};

use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the caller wants bridged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub chain_from: u64,
    pub chain_to: u64,
    /// Token address on `chain_from`
    pub token: String,
    /// Human-unit decimal string
    pub amount: String,
    /// Destination address, defaults to the signer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// Point-in-time view of a lifecycle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSnapshot {
    pub id: Uuid,
    pub request: BridgeRequest,
    pub state: LifecycleState,
    /// True once a `Submitting*` state was entered, whether or not the
    /// signer accepted the transaction. Never reset.
    pub submitted: bool,
    pub approval_tx: Option<String>,
    pub bridge_tx: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct Collaborators {
    registry: Arc<ChainAssetRegistry>,
    oracle: Arc<AllowanceOracle>,
    builder: Arc<TransactionBuilder>,
    router: Arc<QuoteRouter>,
    signer: Arc<dyn ExternalSigner>,
    sink: Arc<dyn NotificationSink>,
    config: LifecycleConfig,
}

impl Collaborators {
    /// Wait for a receipt, bounded by the confirmation timeout
    async fn wait_for_receipt(&self, chain_id: u64, tx_hash: &str) -> BridgeResult<TxReceipt> {
        let wait = self.signer.wait_for_receipt(chain_id, tx_hash);
        match timeout(self.config.confirmation_timeout(), wait).await {
            Ok(receipt) => Ok(receipt?),
            Err(_) => Err(BridgeError::ConfirmationTimeout {
                tx_hash: tx_hash.to_string(),
            }),
        }
    }
}

/// Creates lifecycles wired to a shared set of collaborators
pub struct BridgeOrchestrator {
    collaborators: Arc<Collaborators>,
}

impl BridgeOrchestrator {
    pub fn new(
        registry: Arc<ChainAssetRegistry>,
        oracle: Arc<AllowanceOracle>,
        builder: Arc<TransactionBuilder>,
        router: Arc<QuoteRouter>,
        signer: Arc<dyn ExternalSigner>,
        sink: Arc<dyn NotificationSink>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            collaborators: Arc::new(Collaborators {
                registry,
                oracle,
                builder,
                router,
                signer,
                sink,
                config,
            }),
        }
    }

    /// Create a new lifecycle in `Idle`
    pub fn start(&self, request: BridgeRequest) -> Arc<Lifecycle> {
        let lifecycle = Lifecycle::new(self.collaborators.clone(), request);
        info!(
            lifecycle = %lifecycle.id,
            chain_from = lifecycle.request.chain_from,
            chain_to = lifecycle.request.chain_to,
            token = %lifecycle.request.token,
            amount = %lifecycle.request.amount,
            "Lifecycle created"
        );
        Arc::new(lifecycle)
    }

    /// Re-poll a transaction after a `ConfirmationTimeout`. Does not touch
    /// any lifecycle: a failed lifecycle stays failed.
    pub async fn await_receipt(&self, chain_id: u64, tx_hash: &str) -> BridgeResult<TxReceipt> {
        self.collaborators.wait_for_receipt(chain_id, tx_hash).await
    }

    pub fn signer_address(&self) -> String {
        self.collaborators.signer.address()
    }

    /// Contract that receives the token allowance
    pub fn spender(&self) -> &str {
        &self.collaborators.config.bridge_contract
    }
}

struct Progress {
    state: LifecycleState,
    submitted: bool,
    /// Resolved during the allowance check; decimals come from here
    token: Option<Token>,
    approval_tx: Option<String>,
    bridge_tx: Option<String>,
    updated_at: DateTime<Utc>,
}

/// One end-to-end bridge attempt.
///
/// Every step starts with a guarded transition taken under the state lock,
/// so a second concurrent call for the same step sees the in-flight state
/// and is rejected. The lock is never held across a network call.
pub struct Lifecycle {
    id: Uuid,
    request: BridgeRequest,
    created_at: DateTime<Utc>,
    collaborators: Arc<Collaborators>,
    progress: RwLock<Progress>,
}

impl Lifecycle {
    fn new(collaborators: Arc<Collaborators>, request: BridgeRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request,
            created_at: now,
            collaborators,
            progress: RwLock::new(Progress {
                state: LifecycleState::Idle,
                submitted: false,
                token: None,
                approval_tx: None,
                bridge_tx: None,
                updated_at: now,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &BridgeRequest {
        &self.request
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn state(&self) -> LifecycleState {
        self.progress.read().await.state.clone()
    }

    pub async fn snapshot(&self) -> LifecycleSnapshot {
        let progress = self.progress.read().await;
        LifecycleSnapshot {
            id: self.id,
            request: self.request.clone(),
            state: progress.state.clone(),
            submitted: progress.submitted,
            approval_tx: progress.approval_tx.clone(),
            bridge_tx: progress.bridge_tx.clone(),
            created_at: self.created_at,
            updated_at: progress.updated_at,
        }
    }

    /// Check the allowance against the requested amount
    pub async fn check_allowance(self: &Arc<Self>) -> BridgeResult<LifecycleState> {
        self.detached(|lifecycle| async move { lifecycle.check_allowance_step().await })
            .await
    }

    /// Build, submit and confirm the approval
    pub async fn approve(self: &Arc<Self>) -> BridgeResult<LifecycleState> {
        self.detached(|lifecycle| async move { lifecycle.approve_step().await })
            .await
    }

    pub async fn confirm_approval(self: &Arc<Self>) -> BridgeResult<LifecycleState> {
        self.detached(|lifecycle| async move { lifecycle.confirm_approval_step().await })
            .await
    }

    /// Quote if needed, then build, submit and confirm the bridge transaction
    pub async fn bridge(self: &Arc<Self>) -> BridgeResult<LifecycleState> {
        self.detached(|lifecycle| async move { lifecycle.bridge_step().await })
            .await
    }

    pub async fn confirm_bridge(self: &Arc<Self>) -> BridgeResult<LifecycleState> {
        self.detached(|lifecycle| async move { lifecycle.confirm_bridge_step().await })
            .await
    }

    /// Steps that take a guarded transition run on their own task. Dropping
    /// the caller's future does not stop them, so a lifecycle never stays in
    /// an in-flight state nobody is driving.
    async fn detached<F, Fut>(self: &Arc<Self>, step: F) -> BridgeResult<LifecycleState>
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = BridgeResult<LifecycleState>> + Send + 'static,
    {
        tokio::spawn(step(self.clone()))
            .await
            .map_err(|e| BridgeError::Internal(format!("lifecycle step aborted: {}", e)))?
    }

    /// `Idle → CheckingAllowance → ReadyToBridge | AwaitingApproval | Failed`
    async fn check_allowance_step(&self) -> BridgeResult<LifecycleState> {
        self.begin(StateKind::CheckingAllowance, |state| match state {
            LifecycleState::Idle => Some((LifecycleState::CheckingAllowance, ())),
            _ => None,
        })
        .await?;

        let next = match self.evaluate_allowance().await {
            Ok((result, required)) if AllowanceOracle::covers(&result, required) => {
                LifecycleState::ReadyToBridge { route: None }
            }
            Ok((result, required)) => LifecycleState::AwaitingApproval {
                allowed: result.allowed_amount,
                required,
            },
            Err(cause) => LifecycleState::Failed {
                phase: Phase::Allowance,
                cause,
            },
        };

        Ok(self.complete(StateKind::CheckingAllowance, next).await)
    }

    async fn evaluate_allowance(&self) -> BridgeResult<(AllowanceResult, U256)> {
        let collaborators = &self.collaborators;
        let token = collaborators
            .registry
            .token(self.request.chain_from, &self.request.token)
            .await?;

        let required = AllowanceOracle::requirement(&token, &self.request.amount)?;
        if required.is_zero() {
            return Err(BridgeError::InvalidAmount {
                amount: self.request.amount.clone(),
                reason: "amount must be positive".to_string(),
            });
        }

        let query = AllowanceQuery {
            chain_id: token.chain_id,
            owner_address: collaborators.signer.address(),
            spender_address: collaborators.config.bridge_contract.clone(),
            token_address: token.address.clone(),
        };
        let result = collaborators.oracle.check_allowance(&query).await?;

        debug!(
            lifecycle = %self.id,
            token = %token.symbol,
            decimals = token.decimals,
            allowed = %result.allowed_amount,
            required = %required,
            "Allowance evaluated"
        );

        self.progress.write().await.token = Some(token);
        Ok((result, required))
    }

    /// `AwaitingApproval → SubmittingApproval → ConfirmingApproval →
    /// ReadyToBridge | Failed`. Stays in `ConfirmingApproval` when the
    /// receipt is indeterminate.
    async fn approve_step(&self) -> BridgeResult<LifecycleState> {
        self.begin(StateKind::SubmittingApproval, |state| match state {
            LifecycleState::AwaitingApproval { .. } => {
                Some((LifecycleState::SubmittingApproval, ()))
            }
            _ => None,
        })
        .await?;

        let tx_hash = match self.submit_approval().await {
            Ok(tx_hash) => tx_hash,
            Err(cause) => {
                let failed = LifecycleState::Failed {
                    phase: Phase::Approval,
                    cause,
                };
                return Ok(self.complete(StateKind::SubmittingApproval, failed).await);
            }
        };

        let confirming = LifecycleState::ConfirmingApproval {
            tx_hash: tx_hash.clone(),
        };
        self.complete(StateKind::SubmittingApproval, confirming).await;

        Ok(self
            .settle(
                StateKind::ConfirmingApproval,
                Phase::Approval,
                tx_hash,
                LifecycleState::ReadyToBridge { route: None },
            )
            .await)
    }

    async fn submit_approval(&self) -> BridgeResult<String> {
        let collaborators = &self.collaborators;
        let token = self.resolved_token().await?;

        let tx = collaborators
            .builder
            .build_approval(
                self.request.chain_from,
                &collaborators.signer.address(),
                &collaborators.config.bridge_contract,
                &token,
                &self.request.amount,
            )
            .await?;

        let tx_hash = collaborators
            .signer
            .send_transaction(self.request.chain_from, tx)
            .await?;

        info!(lifecycle = %self.id, %tx_hash, "Approval submitted");
        Ok(tx_hash)
    }

    /// Re-poll the approval receipt of a lifecycle left in `ConfirmingApproval`
    async fn confirm_approval_step(&self) -> BridgeResult<LifecycleState> {
        match self.state().await {
            LifecycleState::ConfirmingApproval { tx_hash } => Ok(self
                .settle(
                    StateKind::ConfirmingApproval,
                    Phase::Approval,
                    tx_hash,
                    LifecycleState::ReadyToBridge { route: None },
                )
                .await),
            other => Err(invalid_transition(other.kind(), StateKind::ReadyToBridge)),
        }
    }

    /// Select the best route. No route is the terminal `NoRoute`, not a failure.
    pub async fn quote(&self) -> BridgeResult<LifecycleState> {
        let current = self.state().await.kind();
        if current != StateKind::ReadyToBridge {
            return Err(invalid_transition(current, StateKind::ReadyToBridge));
        }

        let request = QuoteRequest {
            chain_from: self.request.chain_from,
            chain_to: self.request.chain_to,
            token: self.request.token.clone(),
            amount: self.request.amount.clone(),
        };

        let next = match self.collaborators.router.best_route(&request).await {
            Ok(Some(route)) => {
                info!(
                    lifecycle = %self.id,
                    route = %route.id,
                    output = %route.estimated_output,
                    fee = %route.fee,
                    hops = route.path.len(),
                    "Route selected"
                );
                LifecycleState::ReadyToBridge { route: Some(route) }
            }
            Ok(None) => {
                info!(lifecycle = %self.id, "No route available");
                LifecycleState::NoRoute
            }
            Err(cause) => LifecycleState::Failed {
                phase: Phase::Quote,
                cause,
            },
        };

        Ok(self.complete(StateKind::ReadyToBridge, next).await)
    }

    /// `ReadyToBridge → SubmittingBridge → ConfirmingBridge → Completed |
    /// Failed`, quoting first when no route was selected yet
    async fn bridge_step(&self) -> BridgeResult<LifecycleState> {
        if matches!(self.state().await, LifecycleState::ReadyToBridge { route: None }) {
            let quoted = self.quote().await?;
            if !matches!(quoted, LifecycleState::ReadyToBridge { route: Some(_) }) {
                return Ok(quoted);
            }
        }

        let route = self
            .begin(StateKind::SubmittingBridge, |state| match state {
                LifecycleState::ReadyToBridge { route: Some(route) } => Some((
                    LifecycleState::SubmittingBridge {
                        route: route.clone(),
                    },
                    route.clone(),
                )),
                _ => None,
            })
            .await?;

        let tx_hash = match self.submit_bridge(&route).await {
            Ok(tx_hash) => tx_hash,
            Err(cause) => {
                let failed = LifecycleState::Failed {
                    phase: Phase::Bridge,
                    cause,
                };
                return Ok(self.complete(StateKind::SubmittingBridge, failed).await);
            }
        };

        let confirming = LifecycleState::ConfirmingBridge {
            tx_hash: tx_hash.clone(),
            route: route.clone(),
        };
        self.complete(StateKind::SubmittingBridge, confirming).await;

        let completed = LifecycleState::Completed {
            tx_hash: tx_hash.clone(),
            route,
        };
        Ok(self
            .settle(StateKind::ConfirmingBridge, Phase::Bridge, tx_hash, completed)
            .await)
    }

    async fn submit_bridge(&self, route: &Route) -> BridgeResult<String> {
        let collaborators = &self.collaborators;
        let token = self.resolved_token().await?;
        let sender = collaborators.signer.address();

        let request = TxRequest {
            chain_id: self.request.chain_from,
            from_address: sender.clone(),
            to_address: self.request.recipient.clone().unwrap_or(sender),
            token_address: token.address.clone(),
            amount: self.request.amount.clone(),
            data: None,
            route_id: Some(route.id.clone()),
        };

        let tx = collaborators.builder.build_bridge(&request, &token).await?;
        let tx_hash = collaborators
            .signer
            .send_transaction(self.request.chain_from, tx)
            .await?;

        info!(lifecycle = %self.id, %tx_hash, route = %route.id, "Bridge submitted");
        Ok(tx_hash)
    }

    /// Re-poll the bridge receipt of a lifecycle left in `ConfirmingBridge`
    async fn confirm_bridge_step(&self) -> BridgeResult<LifecycleState> {
        match self.state().await {
            LifecycleState::ConfirmingBridge { tx_hash, route } => {
                let completed = LifecycleState::Completed {
                    tx_hash: tx_hash.clone(),
                    route,
                };
                Ok(self
                    .settle(StateKind::ConfirmingBridge, Phase::Bridge, tx_hash, completed)
                    .await)
            }
            other => Err(invalid_transition(other.kind(), StateKind::Completed)),
        }
    }

    /// Only allowed before anything was submitted
    pub async fn cancel(&self) -> BridgeResult<LifecycleState> {
        let mut progress = self.progress.write().await;
        let from = progress.state.kind();

        match from {
            StateKind::AwaitingApproval | StateKind::ReadyToBridge => {
                self.apply(&mut progress, LifecycleState::Cancelled { from });
                Ok(progress.state.clone())
            }
            kind if kind.is_submitted() => Err(BridgeError::CancellationRejected {
                state: kind.to_string(),
            }),
            kind => Err(invalid_transition(kind, StateKind::Cancelled)),
        }
    }

    /// Drive check, approval, quote and bridge until a terminal state, an
    /// indeterminate confirmation, or a concurrent change stops progress
    pub async fn run(self: &Arc<Self>) -> LifecycleState {
        loop {
            let current = self.state().await;
            let step = match &current {
                LifecycleState::Idle => self.check_allowance().await,
                LifecycleState::AwaitingApproval { .. } => self.approve().await,
                LifecycleState::ReadyToBridge { .. } => self.bridge().await,
                _ => return current,
            };

            match step {
                Ok(next) if next.kind() != current.kind() => continue,
                Ok(next) => return next,
                Err(e) => {
                    debug!(lifecycle = %self.id, "Run stopped: {}", e);
                    return self.state().await;
                }
            }
        }
    }

    async fn resolved_token(&self) -> BridgeResult<Token> {
        self.progress
            .read()
            .await
            .token
            .clone()
            .ok_or_else(|| BridgeError::Internal("token not resolved".to_string()))
    }

    /// Wait for the receipt of `tx_hash` and leave the `from` state
    async fn settle(
        &self,
        from: StateKind,
        phase: Phase,
        tx_hash: String,
        success: LifecycleState,
    ) -> LifecycleState {
        let chain_id = self.request.chain_from;

        let next = match self.collaborators.wait_for_receipt(chain_id, &tx_hash).await {
            Ok(receipt) => match receipt.verdict() {
                ReceiptVerdict::Succeeded => success,
                ReceiptVerdict::Reverted => LifecycleState::Failed {
                    phase,
                    cause: BridgeError::TransactionReverted { tx_hash },
                },
                ReceiptVerdict::Indeterminate => {
                    warn!(
                        lifecycle = %self.id,
                        %tx_hash,
                        status = ?receipt.status,
                        logs = receipt.logs.len(),
                        "Receipt is indeterminate, staying in {}",
                        from
                    );
                    return self.state().await;
                }
            },
            Err(cause) => LifecycleState::Failed { phase, cause },
        };

        self.complete(from, next).await
    }

    /// Take a guarded transition: `step` inspects the current state and
    /// returns the next one, or `None` to reject
    async fn begin<T>(
        &self,
        to: StateKind,
        step: impl FnOnce(&LifecycleState) -> Option<(LifecycleState, T)>,
    ) -> BridgeResult<T> {
        let mut progress = self.progress.write().await;
        let from = progress.state.kind();

        match step(&progress.state) {
            Some((next, value)) => {
                self.apply(&mut progress, next);
                Ok(value)
            }
            None => Err(invalid_transition(from, to)),
        }
    }

    /// Finish a step started from `from`. A no-op returning the current
    /// state if the lifecycle moved on in the meantime (e.g. cancelled
    /// while quoting).
    async fn complete(&self, from: StateKind, next: LifecycleState) -> LifecycleState {
        let mut progress = self.progress.write().await;
        let current = progress.state.kind();

        if current != from {
            debug!(
                lifecycle = %self.id,
                expected = %from,
                actual = %current,
                discarded = %next.kind(),
                "Discarding stale step result"
            );
            return progress.state.clone();
        }

        self.apply(&mut progress, next);
        progress.state.clone()
    }

    fn apply(&self, progress: &mut Progress, next: LifecycleState) {
        debug_assert!(!progress.state.is_terminal());

        let previous = progress.state.kind();
        match &next {
            LifecycleState::ConfirmingApproval { tx_hash } => {
                progress.approval_tx = Some(tx_hash.clone())
            }
            LifecycleState::ConfirmingBridge { tx_hash, .. } => {
                progress.bridge_tx = Some(tx_hash.clone())
            }
            _ => {}
        }
        if next.kind().is_submitted() {
            progress.submitted = true;
        }
        progress.updated_at = Utc::now();

        let event = LifecycleEvent {
            lifecycle_id: self.id,
            previous,
            state: next.kind(),
            timestamp: progress.updated_at,
            tx_hash: next.tx_hash().map(str::to_string),
            error: next.error().cloned(),
        };
        progress.state = next;

        if progress.state.is_terminal() {
            let elapsed = (progress.updated_at - self.created_at)
                .to_std()
                .unwrap_or_default();
            crate::metrics::record_lifecycle_duration(event.state, elapsed.as_secs_f64());
        }

        self.collaborators.sink.notify(&event);
    }
}

fn invalid_transition(from: StateKind, to: StateKind) -> BridgeError {
    BridgeError::InvalidStateTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AllowanceService, AllowanceValue, ApprovalRequest, BuildService, CatalogService,
        QuoteResult, QuoteService,
    };
    use crate::tx::SignerError;
    use crate::types::{Chain, Hop, LogEntry, ReceiptStatus, UnsignedTx};

    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    const USDC: &str = "0x07865c6e87b9f70255377e024ace6630c1eaa37f";
    const BRIDGE: &str = "0x1111111111111111111111111111111111111111";
    const WALLET: &str = "0x2222222222222222222222222222222222222222";

    /// In-memory backend answering every service
    struct FakeBackend {
        allowance: String,
        routes: Vec<Route>,
        quote_error: Option<BridgeError>,
        approvals: Mutex<Vec<ApprovalRequest>>,
        bridges: Mutex<Vec<TxRequest>>,
    }

    impl FakeBackend {
        fn new(allowance: &str) -> Self {
            Self {
                allowance: allowance.to_string(),
                routes: vec![route("route-a", "99500000", "500000")],
                quote_error: None,
                approvals: Mutex::new(Vec::new()),
                bridges: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CatalogService for FakeBackend {
        async fn chains(&self) -> BridgeResult<Vec<Chain>> {
            Ok(vec![Chain {
                id: 5,
                name: "Goerli".into(),
                rpc_url: "http://127.0.0.1:8545".into(),
            }])
        }

        async fn tokens(&self, chain_id: u64) -> BridgeResult<Vec<Token>> {
            Ok(vec![Token {
                address: USDC.into(),
                chain_id,
                symbol: "USDC".into(),
                decimals: 6,
            }])
        }
    }

    #[async_trait]
    impl AllowanceService for FakeBackend {
        async fn allowance(&self, _query: &AllowanceQuery) -> BridgeResult<AllowanceValue> {
            Ok(AllowanceValue {
                value: self.allowance.clone(),
            })
        }
    }

    #[async_trait]
    impl BuildService for FakeBackend {
        async fn build_approval(&self, request: &ApprovalRequest) -> BridgeResult<UnsignedTx> {
            self.approvals.lock().unwrap().push(request.clone());
            Ok(UnsignedTx {
                to: request.token.clone(),
                data: "0x095ea7b3".into(),
                value: "0".into(),
                gas_limit: None,
            })
        }

        async fn build_bridge(&self, request: &TxRequest) -> BridgeResult<UnsignedTx> {
            self.bridges.lock().unwrap().push(request.clone());
            Ok(UnsignedTx {
                to: BRIDGE.into(),
                data: "0xb1d9e5a3".into(),
                value: "0".into(),
                gas_limit: Some("250000".into()),
            })
        }
    }

    #[async_trait]
    impl QuoteService for FakeBackend {
        async fn quote(&self, _request: &QuoteRequest) -> BridgeResult<QuoteResult> {
            match &self.quote_error {
                Some(e) => Err(e.clone()),
                None => Ok(QuoteResult {
                    routes: self.routes.clone(),
                }),
            }
        }
    }

    enum ReceiptMode {
        WithLogs,
        NoLogs,
        Reverted,
        Never,
    }

    struct FakeSigner {
        receipts: ReceiptMode,
        reject: bool,
        sent: Mutex<Vec<String>>,
        /// When set, `send_transaction` signals `entered` and waits for `release`
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl FakeSigner {
        fn new(receipts: ReceiptMode) -> Self {
            Self {
                receipts,
                reject: false,
                sent: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        /// Hash handed out for the n-th sent transaction
        fn sent_hash(&self, n: usize) -> String {
            format!("0x{:064x}", n)
        }
    }

    #[async_trait]
    impl ExternalSigner for FakeSigner {
        fn address(&self) -> String {
            WALLET.to_string()
        }

        async fn send_transaction(
            &self,
            _chain_id: u64,
            tx: UnsignedTx,
        ) -> Result<String, SignerError> {
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            if self.reject {
                return Err(SignerError::Rejected("user denied transaction".into()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(tx.to);
            Ok(format!("0x{:064x}", sent.len()))
        }

        async fn wait_for_receipt(
            &self,
            _chain_id: u64,
            tx_hash: &str,
        ) -> Result<TxReceipt, SignerError> {
            let log = LogEntry {
                address: USDC.into(),
                topics: vec!["0x8c5be1e5".into()],
                data: "0x".into(),
            };
            let (status, logs, success) = match self.receipts {
                ReceiptMode::WithLogs => (ReceiptStatus::Confirmed, vec![log], None),
                ReceiptMode::NoLogs => (ReceiptStatus::Confirmed, vec![], None),
                ReceiptMode::Reverted => (ReceiptStatus::Failed, vec![], Some(false)),
                ReceiptMode::Never => std::future::pending().await,
            };
            Ok(TxReceipt {
                hash: tx_hash.to_string(),
                status,
                logs,
                success,
                block_number: Some(1),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    impl RecordingSink {
        fn kinds(&self) -> Vec<StateKind> {
            self.events.lock().unwrap().iter().map(|e| e.state).collect()
        }
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, event: &LifecycleEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn route(id: &str, output: &str, fee: &str) -> Route {
        Route {
            id: id.into(),
            chain_from: 5,
            chain_to: 80001,
            estimated_output: output.into(),
            fee: fee.into(),
            path: vec![Hop {
                protocol: "cctp".into(),
                chain_id: 5,
                token_in: USDC.into(),
                token_out: USDC.into(),
            }],
        }
    }

    fn config(timeout_secs: u64) -> LifecycleConfig {
        LifecycleConfig {
            bridge_contract: BRIDGE.into(),
            confirmation_timeout_secs: timeout_secs,
            receipt_poll_interval_ms: 10,
            lifecycle_retention_secs: 60,
        }
    }

    struct Harness {
        orchestrator: BridgeOrchestrator,
        backend: Arc<FakeBackend>,
        signer: Arc<FakeSigner>,
        sink: Arc<RecordingSink>,
    }

    fn harness(backend: FakeBackend, signer: FakeSigner) -> Harness {
        harness_with_timeout(backend, signer, 5)
    }

    fn harness_with_timeout(backend: FakeBackend, signer: FakeSigner, timeout_secs: u64) -> Harness {
        let backend = Arc::new(backend);
        let signer = Arc::new(signer);
        let sink = Arc::new(RecordingSink::default());

        let orchestrator = BridgeOrchestrator::new(
            Arc::new(ChainAssetRegistry::new(backend.clone())),
            Arc::new(AllowanceOracle::new(backend.clone())),
            Arc::new(TransactionBuilder::new(backend.clone())),
            Arc::new(QuoteRouter::new(backend.clone())),
            signer.clone(),
            sink.clone(),
            config(timeout_secs),
        );

        Harness {
            orchestrator,
            backend,
            signer,
            sink,
        }
    }

    fn request(amount: &str) -> BridgeRequest {
        BridgeRequest {
            chain_from: 5,
            chain_to: 80001,
            token: USDC.to_uppercase().replace("0X", "0x"),
            amount: amount.into(),
            recipient: None,
        }
    }

    #[tokio::test]
    async fn test_zero_allowance_requires_exact_approval() {
        let h = harness(FakeBackend::new("0"), FakeSigner::new(ReceiptMode::WithLogs));
        let lifecycle = h.orchestrator.start(request("100"));

        let state = lifecycle.check_allowance().await.unwrap();
        assert_eq!(
            state,
            LifecycleState::AwaitingApproval {
                allowed: U256::zero(),
                required: U256::from(100_000_000u64),
            }
        );

        let state = lifecycle.approve().await.unwrap();
        assert_eq!(state, LifecycleState::ReadyToBridge { route: None });

        let approvals = h.backend.approvals.lock().unwrap().clone();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].amount, "100");
        assert_eq!(approvals[0].spender, BRIDGE);
        assert_eq!(approvals[0].owner, WALLET);
        assert_eq!(h.signer.sent(), vec![USDC.to_string()]);

        assert_eq!(
            h.sink.kinds(),
            vec![
                StateKind::CheckingAllowance,
                StateKind::AwaitingApproval,
                StateKind::SubmittingApproval,
                StateKind::ConfirmingApproval,
                StateKind::ReadyToBridge,
            ]
        );

        let snapshot = lifecycle.snapshot().await;
        assert!(snapshot.submitted);
        assert_eq!(snapshot.approval_tx.as_deref(), Some(h.signer.sent_hash(1).as_str()));
    }

    #[tokio::test]
    async fn test_sufficient_allowance_skips_approval() {
        let h = harness(
            FakeBackend::new("100000000"),
            FakeSigner::new(ReceiptMode::WithLogs),
        );
        let lifecycle = h.orchestrator.start(request("100"));

        let state = lifecycle.check_allowance().await.unwrap();
        assert_eq!(state, LifecycleState::ReadyToBridge { route: None });

        // One base unit short is not enough
        let h = harness(
            FakeBackend::new("99999999"),
            FakeSigner::new(ReceiptMode::WithLogs),
        );
        let lifecycle = h.orchestrator.start(request("100"));
        let state = lifecycle.check_allowance().await.unwrap();
        assert_eq!(state.kind(), StateKind::AwaitingApproval);
    }

    #[tokio::test]
    async fn test_run_completes_full_lifecycle() {
        let h = harness(FakeBackend::new("0"), FakeSigner::new(ReceiptMode::WithLogs));
        let lifecycle = h.orchestrator.start(BridgeRequest {
            recipient: Some("0x3333333333333333333333333333333333333333".into()),
            ..request("100")
        });

        let state = lifecycle.run().await;
        match &state {
            LifecycleState::Completed { route, .. } => assert_eq!(route.id, "route-a"),
            other => panic!("unexpected state {:?}", other),
        }

        let bridges = h.backend.bridges.lock().unwrap().clone();
        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[0].route_id.as_deref(), Some("route-a"));
        assert_eq!(bridges[0].to_address, "0x3333333333333333333333333333333333333333");
        assert_eq!(h.signer.sent().len(), 2);

        let snapshot = lifecycle.snapshot().await;
        assert!(snapshot.approval_tx.is_some());
        assert_eq!(snapshot.bridge_tx.as_deref(), state.tx_hash());
        assert_eq!(h.sink.kinds().last(), Some(&StateKind::Completed));
    }

    #[tokio::test]
    async fn test_empty_route_set_is_no_route() {
        let mut backend = FakeBackend::new("100000000");
        backend.routes = vec![];
        let h = harness(backend, FakeSigner::new(ReceiptMode::WithLogs));
        let lifecycle = h.orchestrator.start(request("100"));

        let state = lifecycle.run().await;
        assert_eq!(state, LifecycleState::NoRoute);
        assert!(state.error().is_none());
        assert!(h.signer.sent().is_empty());
        assert!(h.backend.bridges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quote_transport_failure_is_quote_error() {
        let mut backend = FakeBackend::new("100000000");
        backend.quote_error = Some(BridgeError::QuoteServiceError("connection reset".into()));
        let h = harness(backend, FakeSigner::new(ReceiptMode::WithLogs));
        let lifecycle = h.orchestrator.start(request("100"));

        lifecycle.check_allowance().await.unwrap();
        let state = lifecycle.quote().await.unwrap();
        assert_eq!(
            state,
            LifecycleState::Failed {
                phase: Phase::Quote,
                cause: BridgeError::QuoteServiceError("connection reset".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_zero_log_receipt_never_approves() {
        let h = harness(FakeBackend::new("0"), FakeSigner::new(ReceiptMode::NoLogs));
        let lifecycle = h.orchestrator.start(request("100"));

        lifecycle.check_allowance().await.unwrap();
        let state = lifecycle.approve().await.unwrap();
        assert_eq!(state.kind(), StateKind::ConfirmingApproval);

        // Re-polling gives the same answer; run() does not push past it
        let state = lifecycle.confirm_approval().await.unwrap();
        assert_eq!(state.kind(), StateKind::ConfirmingApproval);
        assert_eq!(lifecycle.run().await.kind(), StateKind::ConfirmingApproval);
        assert!(!h.sink.kinds().contains(&StateKind::ReadyToBridge));
    }

    #[tokio::test]
    async fn test_reverted_approval_fails() {
        let h = harness(FakeBackend::new("0"), FakeSigner::new(ReceiptMode::Reverted));
        let lifecycle = h.orchestrator.start(request("100"));

        let state = lifecycle.run().await;
        match state {
            LifecycleState::Failed {
                phase: Phase::Approval,
                cause: BridgeError::TransactionReverted { tx_hash },
            } => assert_eq!(tx_hash, h.signer.sent_hash(1)),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signer_rejection_fails_lifecycle() {
        let mut signer = FakeSigner::new(ReceiptMode::WithLogs);
        signer.reject = true;
        let h = harness(FakeBackend::new("0"), signer);
        let lifecycle = h.orchestrator.start(request("100"));

        lifecycle.check_allowance().await.unwrap();
        let state = lifecycle.approve().await.unwrap();
        assert_eq!(
            state,
            LifecycleState::Failed {
                phase: Phase::Approval,
                cause: BridgeError::SignerRejected("user denied transaction".into()),
            }
        );
        // Submitted is sticky even though the signer refused
        assert!(lifecycle.snapshot().await.submitted);
    }

    #[tokio::test]
    async fn test_failed_is_terminal() {
        let h = harness(FakeBackend::new("0"), FakeSigner::new(ReceiptMode::Reverted));
        let lifecycle = h.orchestrator.start(request("100"));
        lifecycle.run().await;
        let events_before = h.sink.kinds().len();

        assert!(matches!(
            lifecycle.check_allowance().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            lifecycle.approve().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            lifecycle.bridge().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            lifecycle.cancel().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));
        assert_eq!(lifecycle.state().await.kind(), StateKind::Failed);
        assert_eq!(h.sink.kinds().len(), events_before);
    }

    #[tokio::test]
    async fn test_unknown_token_and_bad_amount_fail_allowance() {
        let h = harness(FakeBackend::new("0"), FakeSigner::new(ReceiptMode::WithLogs));

        let lifecycle = h.orchestrator.start(BridgeRequest {
            token: "0x4444444444444444444444444444444444444444".into(),
            ..request("100")
        });
        let state = lifecycle.check_allowance().await.unwrap();
        assert!(matches!(
            state,
            LifecycleState::Failed {
                phase: Phase::Allowance,
                cause: BridgeError::TokenNotFound { chain_id: 5, .. },
            }
        ));

        for amount in ["0", "1.0000001", "abc"] {
            let lifecycle = h.orchestrator.start(request(amount));
            let state = lifecycle.check_allowance().await.unwrap();
            assert!(
                matches!(
                    state.error(),
                    Some(BridgeError::InvalidAmount { .. })
                ),
                "amount {} gave {:?}",
                amount,
                state
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let h = harness(FakeBackend::new("0"), FakeSigner::new(ReceiptMode::WithLogs));

        let lifecycle = h.orchestrator.start(request("100"));
        assert!(matches!(
            lifecycle.cancel().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));

        lifecycle.check_allowance().await.unwrap();
        let state = lifecycle.cancel().await.unwrap();
        assert_eq!(
            state,
            LifecycleState::Cancelled {
                from: StateKind::AwaitingApproval
            }
        );
        assert!(matches!(
            lifecycle.approve().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));
        assert!(h.signer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_single_flight_while_submitting() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut signer = FakeSigner::new(ReceiptMode::WithLogs);
        signer.gate = Some((entered.clone(), release.clone()));

        let h = harness(FakeBackend::new("0"), signer);
        let lifecycle = h.orchestrator.start(request("100"));
        lifecycle.check_allowance().await.unwrap();

        let task = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.approve().await }
        });
        entered.notified().await;

        assert_eq!(lifecycle.state().await, LifecycleState::SubmittingApproval);
        assert!(matches!(
            lifecycle.approve().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));
        assert_eq!(
            lifecycle.cancel().await,
            Err(BridgeError::CancellationRejected {
                state: "submitting_approval".into()
            })
        );

        release.notify_one();
        let state = task.await.unwrap().unwrap();
        assert_eq!(state, LifecycleState::ReadyToBridge { route: None });
        assert_eq!(h.signer.sent().len(), 1);
        assert_eq!(
            h.sink
                .kinds()
                .iter()
                .filter(|k| **k == StateKind::SubmittingApproval)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_strand_step() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut signer = FakeSigner::new(ReceiptMode::WithLogs);
        signer.gate = Some((entered.clone(), release.clone()));

        let h = harness(FakeBackend::new("0"), signer);
        let lifecycle = h.orchestrator.start(request("100"));
        lifecycle.check_allowance().await.unwrap();

        // The caller gives up while the signer is still busy
        let abandoned = timeout(Duration::from_millis(50), lifecycle.approve()).await;
        assert!(abandoned.is_err());
        entered.notified().await;
        assert_eq!(lifecycle.state().await, LifecycleState::SubmittingApproval);

        release.notify_one();
        let mut state = lifecycle.state().await;
        for _ in 0..200 {
            if state.kind() != StateKind::SubmittingApproval
                && state.kind() != StateKind::ConfirmingApproval
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            state = lifecycle.state().await;
        }

        assert_eq!(state, LifecycleState::ReadyToBridge { route: None });
        assert_eq!(
            lifecycle.snapshot().await.approval_tx.as_deref(),
            Some(h.signer.sent_hash(1).as_str())
        );
    }

    #[tokio::test]
    async fn test_single_flight_while_bridging() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut signer = FakeSigner::new(ReceiptMode::WithLogs);
        signer.gate = Some((entered.clone(), release.clone()));

        let h = harness(FakeBackend::new("100000000"), signer);
        let lifecycle = h.orchestrator.start(request("100"));
        lifecycle.check_allowance().await.unwrap();

        let task = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.bridge().await }
        });
        entered.notified().await;

        assert_eq!(lifecycle.state().await.kind(), StateKind::SubmittingBridge);
        assert!(matches!(
            lifecycle.bridge().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));
        assert_eq!(
            lifecycle.cancel().await,
            Err(BridgeError::CancellationRejected {
                state: "submitting_bridge".into()
            })
        );

        release.notify_one();
        let state = task.await.unwrap().unwrap();
        assert_eq!(state.kind(), StateKind::Completed);
        assert_eq!(h.signer.sent().len(), 1);
        assert_eq!(h.backend.bridges.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_on_bridge_path() {
        let h = harness(
            FakeBackend::new("100000000"),
            FakeSigner::new(ReceiptMode::NoLogs),
        );

        // Before submission the operation can still be abandoned
        let lifecycle = h.orchestrator.start(request("100"));
        lifecycle.check_allowance().await.unwrap();
        assert_eq!(
            lifecycle.cancel().await.unwrap(),
            LifecycleState::Cancelled {
                from: StateKind::ReadyToBridge
            }
        );
        assert!(matches!(
            lifecycle.bridge().await,
            Err(BridgeError::InvalidStateTransition { .. })
        ));
        assert!(h.signer.sent().is_empty());

        // Once broadcast it cannot
        let lifecycle = h.orchestrator.start(request("100"));
        let state = lifecycle.run().await;
        assert_eq!(state.kind(), StateKind::ConfirmingBridge);
        assert_eq!(
            lifecycle.cancel().await,
            Err(BridgeError::CancellationRejected {
                state: "confirming_bridge".into()
            })
        );
        assert_eq!(lifecycle.state().await.kind(), StateKind::ConfirmingBridge);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_keeps_hash() {
        let h = harness_with_timeout(
            FakeBackend::new("100000000"),
            FakeSigner::new(ReceiptMode::Never),
            1,
        );
        let lifecycle = h.orchestrator.start(request("100"));

        let state = lifecycle.run().await;
        let expected_hash = h.signer.sent_hash(1);
        assert_eq!(
            state,
            LifecycleState::Failed {
                phase: Phase::Bridge,
                cause: BridgeError::ConfirmationTimeout {
                    tx_hash: expected_hash.clone()
                },
            }
        );
        assert_eq!(state.tx_hash(), Some(expected_hash.as_str()));
        assert_eq!(lifecycle.snapshot().await.bridge_tx, Some(expected_hash.clone()));

        // The caller can keep polling outside the lifecycle
        assert!(matches!(
            h.orchestrator.await_receipt(5, &expected_hash).await,
            Err(BridgeError::ConfirmationTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_independent_lifecycles() {
        let h = harness(FakeBackend::new("0"), FakeSigner::new(ReceiptMode::WithLogs));
        let first = h.orchestrator.start(request("100"));
        let second = h.orchestrator.start(request("5.5"));
        assert_ne!(first.id(), second.id());

        let (a, b) = tokio::join!(first.run(), second.run());
        assert_eq!(a.kind(), StateKind::Completed);
        assert_eq!(b.kind(), StateKind::Completed);
        assert_eq!(h.signer.sent().len(), 4);
    }
}
