//! Deferred listener registries
//!
//! Adding or removing a listener only queues the change. Queued changes are
//! applied when the owning spring flushes, at the start of its next advance,
//! so a listener registered from inside a notification never runs during
//! that same pass.

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::rc::Rc;

new_key_type! {
    /// Identity of a registered listener within one [`ListenerSet`]
    pub struct ListenerId;
}

/// Callback receiving the spring's (mapped) value
pub type ValueListener = Rc<dyn Fn(f64)>;

/// Callback fired once when a spring ends
pub type EndListener = Rc<dyn Fn()>;

/// The event a listener is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Update,
    AtRest,
    End,
}

#[derive(Clone, Copy, Debug)]
enum PendingOp {
    Arm(ListenerId),
    Disarm(ListenerId),
}

/// An ordered listener collection with deferred mutation
pub struct ListenerSet<L: Clone> {
    entries: SlotMap<ListenerId, L>,
    /// Armed listeners in notification order
    order: SmallVec<[ListenerId; 4]>,
    pending: SmallVec<[PendingOp; 2]>,
}

impl<L: Clone> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            order: SmallVec::new(),
            pending: SmallVec::new(),
        }
    }

    /// Queue a listener; it becomes active on the next [`flush`](Self::flush)
    pub fn add(&mut self, listener: L) -> ListenerId {
        let id = self.entries.insert(listener);
        self.pending.push(PendingOp::Arm(id));
        id
    }

    /// Queue removal. Removing an unknown or already removed id is a no-op.
    pub fn remove(&mut self, id: ListenerId) {
        if self.entries.contains_key(id) {
            self.pending.push(PendingOp::Disarm(id));
        }
    }

    /// Apply queued additions and removals in the order they were made
    pub fn flush(&mut self) {
        for op in self.pending.drain(..) {
            match op {
                PendingOp::Arm(id) => {
                    if self.entries.contains_key(id) && !self.order.contains(&id) {
                        self.order.push(id);
                    }
                }
                PendingOp::Disarm(id) => {
                    self.order.retain(|armed| *armed != id);
                    self.entries.remove(id);
                }
            }
        }
    }

    /// Armed listeners in registration order, cloned so the caller can invoke
    /// them without holding a borrow of the set
    pub fn snapshot(&self) -> SmallVec<[L; 4]> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(*id).cloned())
            .collect()
    }

    /// Drop every listener, armed or pending
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.pending.clear();
    }

    /// Number of armed listeners
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl<L: Clone> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three listener sets owned by a spring
#[derive(Default)]
pub struct SpringListeners {
    pub update: ListenerSet<ValueListener>,
    pub at_rest: ListenerSet<ValueListener>,
    pub end: ListenerSet<EndListener>,
}

impl SpringListeners {
    pub fn flush(&mut self) {
        self.update.flush();
        self.at_rest.flush();
        self.end.flush();
    }

    pub fn remove(&mut self, kind: ListenerKind, id: ListenerId) {
        match kind {
            ListenerKind::Update => self.update.remove(id),
            ListenerKind::AtRest => self.at_rest.remove(id),
            ListenerKind::End => self.end.remove(id),
        }
    }
}
