//! Lifecycle registry and transition tracking

use crate::events::{LifecycleEvent, NotificationSink};
use crate::lifecycle::{Lifecycle, StateKind};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Last transition seen for a lifecycle
#[derive(Debug, Clone, Copy)]
struct Observed {
    state: StateKind,
    at: DateTime<Utc>,
}

/// State manager for lifecycles started by this process
#[derive(Default)]
pub struct StateManager {
    lifecycles: DashMap<Uuid, Arc<Lifecycle>>,
    latest: DashMap<Uuid, Observed>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a lifecycle addressable by id
    pub fn track(&self, lifecycle: Arc<Lifecycle>) {
        let id = lifecycle.id();
        self.latest.entry(id).or_insert(Observed {
            state: StateKind::Idle,
            at: lifecycle.created_at(),
        });
        self.lifecycles.insert(id, lifecycle);
        debug!("Tracking lifecycle {}", id);
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Lifecycle>> {
        self.lifecycles.get(id).map(|l| l.value().clone())
    }

    /// All tracked lifecycles, newest first
    pub fn list(&self) -> Vec<Arc<Lifecycle>> {
        let mut lifecycles: Vec<Arc<Lifecycle>> =
            self.lifecycles.iter().map(|e| e.value().clone()).collect();
        lifecycles.sort_by_key(|l| std::cmp::Reverse(l.created_at()));
        lifecycles
    }

    /// Counts per state from the last observed transitions
    pub fn get_stats(&self) -> LifecycleStats {
        let mut stats = LifecycleStats::default();

        for entry in self.latest.iter() {
            let state = entry.value().state;
            stats.total += 1;
            if state.is_terminal() {
                stats.terminal += 1;
            } else {
                stats.active += 1;
            }
            *stats.by_state.entry(state).or_insert(0) += 1;
        }

        stats
    }

    /// Forget terminal lifecycles whose last transition is older than `max_age`
    pub fn prune_terminal(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let expired: Vec<Uuid> = self
            .latest
            .iter()
            .filter(|entry| {
                let observed = entry.value();
                observed.state.is_terminal()
                    && (now - observed.at)
                        .to_std()
                        .map(|age| age > max_age)
                        .unwrap_or(false)
            })
            .map(|entry| *entry.key())
            .collect();

        for id in &expired {
            self.latest.remove(id);
            self.lifecycles.remove(id);
        }

        if !expired.is_empty() {
            info!("Pruned {} terminal lifecycles", expired.len());
        }
        expired.len()
    }
}

impl NotificationSink for StateManager {
    fn notify(&self, event: &LifecycleEvent) {
        self.latest.insert(
            event.lifecycle_id,
            Observed {
                state: event.state,
                at: event.timestamp,
            },
        );
    }
}

/// Lifecycle statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LifecycleStats {
    pub total: u64,
    pub active: u64,
    pub terminal: u64,
    pub by_state: BTreeMap<StateKind, u64>,
}
