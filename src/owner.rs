//! Owner contract and the weakly-held owner binding.
//!
//! An *owner* is any UI container able to host a modal presentation --
//! a window, screen, or view with a finite lifecycle. The core holds owners
//! weakly: an [`OwnerBinding`] pairs a stable arena id with a `Weak`
//! reference and a liveness query, so a container that dies without
//! notifying the stack is pruned lazily instead of dangling.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// Contract every UI container must satisfy to host modals.
///
/// The core needs exactly two things: a liveness query (is this container
/// still able to present UI, as opposed to being torn down?) and a downcast
/// hook so presenters can recover the embedder's concrete type.
///
/// Lifecycle *end* should additionally be signalled by calling
/// [`TaskManager::unregister_owner`](crate::TaskManager::unregister_owner);
/// the weak reference and `is_alive` are the safety net when that call
/// never comes.
pub trait UiOwner: Send + Sync {
    /// Returns `true` while the container can still host a modal.
    ///
    /// Backgrounded-but-restorable containers should report `true`; only a
    /// container past the point of no return (being destroyed) reports
    /// `false`.
    fn is_alive(&self) -> bool;

    /// Downcast hook for presenters that need the concrete container type.
    fn as_any(&self) -> &dyn Any;
}

/// Stable identity for a registered owner, minted by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub(crate) u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// A strong handle to a currently-live owner, as handed to presenters.
///
/// Holding an `OwnerRef` keeps the container's `Arc` alive for the duration
/// of a presentation call; it does not extend the container's logical
/// lifecycle.
#[derive(Clone)]
pub struct OwnerRef {
    id: OwnerId,
    owner: Arc<dyn UiOwner>,
}

impl OwnerRef {
    pub(crate) fn new(id: OwnerId, owner: Arc<dyn UiOwner>) -> Self {
        Self { id, owner }
    }

    /// The stack-minted identity of this owner.
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// The owner itself.
    pub fn owner(&self) -> &Arc<dyn UiOwner> {
        &self.owner
    }

    /// Downcasts to the embedder's concrete container type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.owner.as_any().downcast_ref::<T>()
    }

    /// Re-checks liveness at the time of the call.
    pub fn is_live(&self) -> bool {
        self.owner.is_alive()
    }
}

impl fmt::Debug for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRef")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Weakly-held association between an owner and its lifecycle.
///
/// Bindings live inside the stack's ordered list. A binding is *live* while
/// the weak upgrade succeeds and the owner reports alive; anything else is
/// prunable. Disposal is idempotent.
pub(crate) struct OwnerBinding {
    id: OwnerId,
    owner: Weak<dyn UiOwner>,
    disposed: bool,
}

impl OwnerBinding {
    pub(crate) fn new(id: OwnerId, owner: &Arc<dyn UiOwner>) -> Self {
        Self {
            id,
            owner: Arc::downgrade(owner),
            disposed: false,
        }
    }

    pub(crate) fn id(&self) -> OwnerId {
        self.id
    }

    /// Returns a strong ref if the owner is still live.
    pub(crate) fn live(&self) -> Option<OwnerRef> {
        if self.disposed {
            return None;
        }
        let owner = self.owner.upgrade()?;
        if owner.is_alive() {
            Some(OwnerRef::new(self.id, owner))
        } else {
            None
        }
    }

    /// Returns `true` if this binding wraps the given container instance.
    pub(crate) fn points_to(&self, owner: &Arc<dyn UiOwner>) -> bool {
        std::ptr::addr_eq(self.owner.as_ptr(), Arc::as_ptr(owner))
    }

    pub(crate) fn dispose(&mut self) {
        self.disposed = true;
        self.owner = Weak::<DeadOwner>::new();
    }
}

/// Zero-sized stand-in so a disposed binding can drop its weak reference.
struct DeadOwner;

impl UiOwner for DeadOwner {
    fn is_alive(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeOwner {
        alive: AtomicBool,
    }

    impl FakeOwner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                alive: AtomicBool::new(true),
            })
        }

        fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    impl UiOwner for FakeOwner {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn binding_is_live_while_owner_lives() {
        let owner = FakeOwner::new();
        let as_dyn: Arc<dyn UiOwner> = owner.clone();
        let binding = OwnerBinding::new(OwnerId(1), &as_dyn);
        assert!(binding.live().is_some());
    }

    #[test]
    fn binding_dies_with_dropped_owner() {
        let owner = FakeOwner::new();
        let as_dyn: Arc<dyn UiOwner> = owner.clone();
        let binding = OwnerBinding::new(OwnerId(1), &as_dyn);
        drop(as_dyn);
        drop(owner);
        assert!(binding.live().is_none());
    }

    #[test]
    fn binding_respects_liveness_query() {
        let owner = FakeOwner::new();
        let as_dyn: Arc<dyn UiOwner> = owner.clone();
        let binding = OwnerBinding::new(OwnerId(1), &as_dyn);
        owner.kill();
        assert!(binding.live().is_none());
    }

    #[test]
    fn dispose_is_final() {
        let owner = FakeOwner::new();
        let as_dyn: Arc<dyn UiOwner> = owner.clone();
        let mut binding = OwnerBinding::new(OwnerId(1), &as_dyn);
        binding.dispose();
        assert!(binding.live().is_none());
        assert!(!binding.points_to(&as_dyn));
    }

    #[test]
    fn points_to_matches_instance_identity() {
        let a = FakeOwner::new();
        let b = FakeOwner::new();
        let a_dyn: Arc<dyn UiOwner> = a;
        let b_dyn: Arc<dyn UiOwner> = b;
        let binding = OwnerBinding::new(OwnerId(1), &a_dyn);
        assert!(binding.points_to(&a_dyn));
        assert!(!binding.points_to(&b_dyn));
    }

    #[test]
    fn owner_ref_downcasts() {
        let owner = FakeOwner::new();
        let as_dyn: Arc<dyn UiOwner> = owner;
        let owner_ref = OwnerRef::new(OwnerId(3), as_dyn);
        assert!(owner_ref.downcast_ref::<FakeOwner>().is_some());
        assert!(owner_ref.downcast_ref::<String>().is_none());
        assert_eq!(owner_ref.id(), OwnerId(3));
    }
}
