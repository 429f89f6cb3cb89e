//! Ordered owner stack with ticketed mutual exclusion.
//!
//! The stack tracks "which UI container is currently frontmost". Containers
//! are pushed as they come to the foreground and removed (or pruned lazily)
//! as they die. One published slot carries the current owner so waiters can
//! await the next push during a recreation gap.
//!
//! Access to "the current owner" is serialized by an async gate. Each gate
//! acquisition mints a monotonically-increasing [`Ticket`]; presenting the
//! currently-active ticket re-enters without queuing, so a single nested
//! interaction (a message box inside a file-picker flow) keeps using one
//! consistent owner while other tasks queue behind the gate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::owner::{OwnerBinding, OwnerId, OwnerRef, UiOwner};

/// Opaque token granting re-entrant access to the current owner.
///
/// Minted under the stack's gate; compare-by-value. A ticket is only
/// meaningful while its holder's interaction sequence still owns the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Ordered collection of owner bindings plus the published current owner.
pub struct OwnerStack {
    bindings: Mutex<Vec<OwnerBinding>>,
    current: watch::Sender<Option<OwnerRef>>,
    gate: tokio::sync::Mutex<()>,
    active_ticket: AtomicU64,
    next_owner_id: AtomicU64,
}

impl Default for OwnerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnerStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            bindings: Mutex::new(Vec::new()),
            current,
            gate: tokio::sync::Mutex::new(()),
            active_ticket: AtomicU64::new(0),
            next_owner_id: AtomicU64::new(0),
        }
    }

    /// Pushes a container as the new frontmost owner and publishes it.
    ///
    /// Pushing a container that is already on the stack moves its binding to
    /// the top and keeps its id, so re-registration on every foreground
    /// transition is cheap and idempotent.
    pub fn push(&self, owner: &Arc<dyn UiOwner>) -> OwnerId {
        let mut bindings = self.bindings.lock();
        let id = match bindings.iter().position(|b| b.points_to(owner)) {
            Some(index) => {
                let binding = bindings.remove(index);
                let id = binding.id();
                bindings.push(binding);
                id
            }
            None => {
                let id = OwnerId(self.next_owner_id.fetch_add(1, Ordering::Relaxed) + 1);
                bindings.push(OwnerBinding::new(id, owner));
                id
            }
        };
        debug!(%id, "owner pushed");
        self.current
            .send_replace(Some(OwnerRef::new(id, owner.clone())));
        id
    }

    /// Disposes the binding with the given id.
    ///
    /// If it was the published current owner, the next most recent live
    /// binding is published instead (or the slot is cleared, forcing the
    /// next waiter to await a fresh push).
    pub fn remove(&self, id: OwnerId) {
        let mut bindings = self.bindings.lock();
        let Some(index) = bindings.iter().position(|b| b.id() == id) else {
            return;
        };
        bindings.remove(index).dispose();
        debug!(%id, "owner removed");
        let was_current = self.current.borrow().as_ref().map(OwnerRef::id) == Some(id);
        if was_current {
            let next = Self::latest_live(&mut bindings);
            self.current.send_replace(next);
        }
    }

    /// Non-blocking peek at the most recent live owner, pruning trailing
    /// dead bindings on the way.
    pub fn current(&self) -> Option<OwnerRef> {
        Self::latest_live(&mut self.bindings.lock())
    }

    /// Number of bindings currently held (live or not yet pruned).
    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Returns `true` if no bindings are held.
    pub fn is_empty(&self) -> bool {
        self.bindings.lock().is_empty()
    }

    /// Scans from the top, disposing dead bindings until a live one is
    /// found.
    fn latest_live(bindings: &mut Vec<OwnerBinding>) -> Option<OwnerRef> {
        while let Some(top) = bindings.last() {
            if let Some(live) = top.live() {
                return Some(live);
            }
            if let Some(mut dead) = bindings.pop() {
                dead.dispose();
            }
        }
        None
    }

    /// Obtains the most recent live owner, awaiting the next push if none
    /// is currently live. Never times out.
    async fn acquire(&self) -> OwnerRef {
        let mut rx = self.current.subscribe();
        loop {
            if let Some(live) = self.current() {
                return live;
            }
            if rx.changed().await.is_err() {
                // The stack owns the sender, so this only happens while the
                // stack itself is being torn down; park forever, matching
                // the no-owner-ever-appears case.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Awaits a published current owner satisfying `matches`.
    ///
    /// Unlike [`acquire`](Self::acquire), this watches only the published
    /// slot: it resolves when a matching container becomes frontmost, not
    /// when one merely exists somewhere in the stack.
    async fn acquire_matching(&self, matches: &(dyn Fn(&OwnerRef) -> bool + Sync)) -> OwnerRef {
        let mut rx = self.current.subscribe();
        loop {
            {
                let published = rx.borrow_and_update();
                if let Some(owner) = published.as_ref() {
                    if owner.is_live() && matches(owner) {
                        return owner.clone();
                    }
                }
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Runs `f` with exclusive access to the current owner.
    ///
    /// With a `ticket` equal to the currently-active one, the gate is
    /// bypassed and the owner is handed over immediately -- the re-entry
    /// path for nested steps of one interaction. Otherwise the caller
    /// queues on the gate; once through, a fresh ticket is minted and the
    /// most recent live owner is obtained (awaiting a push if none is
    /// live). The gate stays held for as long as `f`'s future runs,
    /// including across any parks inside it.
    pub async fn with_owner<T, F, Fut>(&self, ticket: Option<Ticket>, f: F) -> T
    where
        F: FnOnce(Ticket, OwnerRef) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        if let Some(held) = ticket {
            if self.active_ticket.load(Ordering::SeqCst) == held.0 {
                let owner = self.acquire().await;
                return f(held, owner).await;
            }
        }
        let _gate = self.gate.lock().await;
        let minted = Ticket(self.active_ticket.fetch_add(1, Ordering::SeqCst) + 1);
        debug!(ticket = minted.0, "owner gate acquired");
        let owner = self.acquire().await;
        f(minted, owner).await
    }

    /// [`with_owner`](Self::with_owner), but waits for an owner satisfying
    /// `matches` to become frontmost (e.g. a particular screen type).
    pub async fn with_owner_where<T, F, Fut>(
        &self,
        ticket: Option<Ticket>,
        matches: impl Fn(&OwnerRef) -> bool + Sync,
        f: F,
    ) -> T
    where
        F: FnOnce(Ticket, OwnerRef) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        if let Some(held) = ticket {
            if self.active_ticket.load(Ordering::SeqCst) == held.0 {
                let owner = self.acquire_matching(&matches).await;
                return f(held, owner).await;
            }
        }
        let _gate = self.gate.lock().await;
        let minted = Ticket(self.active_ticket.fetch_add(1, Ordering::SeqCst) + 1);
        let owner = self.acquire_matching(&matches).await;
        f(minted, owner).await
    }
}
