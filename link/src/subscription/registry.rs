use std::collections::HashMap;

use crate::error::Result;
use crate::models::{BoundsKey, RegionBounds, SubscriptionInfo, SubscriptionOp};

#[derive(Debug, Clone)]
struct Entry {
    bounds: RegionBounds,
    active: bool,
    rejected: Option<String>,
    created_at_ms: u64,
    send_count: u32,
    /// Insertion order, so replay and snapshots are stable.
    seq: u64,
}

/// What the caller should put on the wire after a registry change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryAction {
    /// Send `subscribe_region` / `unsubscribe_region` if connected.
    Send,
    /// Nothing to send (already in the requested state, or purged locally).
    None,
}

/// Bounds-keyed set of region subscriptions that outlives any single session.
///
/// Owned by the connection task. Application code reaches it only through
/// `subscribe()` / `unsubscribe()` commands.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<BoundsKey, Entry>,
    next_seq: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `bounds` active. Re-subscribing an inactive or rejected entry
    /// reactivates it.
    pub fn subscribe(&mut self, bounds: RegionBounds) -> Result<RegistryAction> {
        bounds.validate()?;
        let key = bounds.key();
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.active {
                return Ok(RegistryAction::None);
            }
            entry.active = true;
            entry.rejected = None;
            entry.created_at_ms = now_ms();
            return Ok(RegistryAction::Send);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            key,
            Entry {
                bounds,
                active: true,
                rejected: None,
                created_at_ms: now_ms(),
                send_count: 0,
                seq,
            },
        );
        Ok(RegistryAction::Send)
    }

    /// Mark `bounds` inactive.
    ///
    /// While connected the entry stays until the server confirms the
    /// unsubscribe. Without a live session there is nothing to confirm, so the
    /// entry is dropped right away.
    pub fn unsubscribe(&mut self, bounds: RegionBounds, connected: bool) -> Result<RegistryAction> {
        bounds.validate()?;
        let key = bounds.key();
        let Some(entry) = self.entries.get_mut(&key) else {
            return Ok(RegistryAction::None);
        };
        if !connected {
            self.entries.remove(&key);
            return Ok(RegistryAction::None);
        }
        if !entry.active && entry.rejected.is_none() {
            return Ok(RegistryAction::None);
        }
        let was_rejected = entry.rejected.is_some();
        entry.active = false;
        if was_rejected {
            // The server never held it.
            self.entries.remove(&key);
            return Ok(RegistryAction::None);
        }
        Ok(RegistryAction::Send)
    }

    /// Record that a subscribe request for `bounds` went out.
    pub fn mark_sent(&mut self, bounds: &RegionBounds) {
        if let Some(entry) = self.entries.get_mut(&bounds.key()) {
            entry.send_count += 1;
        }
    }

    /// Apply a `subscription_ack`.
    pub fn confirm(&mut self, op: SubscriptionOp, bounds: &RegionBounds) {
        let key = bounds.key();
        match op {
            SubscriptionOp::Subscribe => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    entry.rejected = None;
                }
            },
            SubscriptionOp::Unsubscribe => {
                if self.entries.get(&key).is_some_and(|e| !e.active) {
                    self.entries.remove(&key);
                }
            },
        }
    }

    /// Apply a `subscription_nack`. A rejected subscribe leaves the entry
    /// inactive with the server's reason; it is not replayed.
    pub fn reject(&mut self, op: SubscriptionOp, bounds: &RegionBounds, reason: &str) {
        let Some(entry) = self.entries.get_mut(&bounds.key()) else {
            return;
        };
        match op {
            SubscriptionOp::Subscribe => {
                entry.active = false;
                entry.rejected = Some(reason.to_string());
            },
            SubscriptionOp::Unsubscribe => {
                log::warn!(
                    "[atlas-link] Server refused to unsubscribe {}: {}",
                    entry.bounds,
                    reason
                );
            },
        }
    }

    /// Drop every inactive entry. Called when a new session starts, since the
    /// server-side state they referred to died with the old session.
    pub fn purge_inactive(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.active);
        before - self.entries.len()
    }

    /// Active bounds in subscription order.
    pub fn active_bounds(&self) -> Vec<RegionBounds> {
        let mut active: Vec<&Entry> = self.entries.values().filter(|e| e.active).collect();
        active.sort_by_key(|e| e.seq);
        active.into_iter().map(|e| e.bounds).collect()
    }

    pub fn is_active(&self, bounds: &RegionBounds) -> bool {
        self.entries.get(&bounds.key()).is_some_and(|e| e.active)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
            .into_iter()
            .map(|e| SubscriptionInfo {
                bounds: e.bounds,
                active: e.active,
                rejected: e.rejected.clone(),
                created_at_ms: e.created_at_ms,
                send_count: e.send_count,
            })
            .collect()
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
