//! Synchronous event bus.
//!
//! Listeners subscribe to an [`EventId`] and are called, in subscription
//! order, every time an event with that id is sent. The payload is passed as
//! `&dyn Any`; a listener downcasts it to the type it expects. A mismatch
//! between what a sender sends and what a listener expects therefore shows up
//! as a failed downcast rather than a misread.
//!
//! ```
//! use std::any::Any;
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use lattice_ecs::event::{EventBus, EventId};
//!
//! struct Damage(u32);
//! const DAMAGE: EventId = EventId::from_name("damage");
//!
//! let total = Rc::new(Cell::new(0));
//! let mut bus = EventBus::new();
//! let sink = Rc::clone(&total);
//! bus.add_listener(DAMAGE, move |payload: &dyn Any| {
//!     if let Some(Damage(amount)) = payload.downcast_ref::<Damage>() {
//!         sink.set(sink.get() + amount);
//!     }
//! })
//! .unwrap();
//!
//! bus.send_event(DAMAGE, &Damage(7));
//! bus.send_event(DAMAGE, &Damage(5));
//! assert_eq!(total.get(), 12);
//! ```

use std::any::Any;
use std::fmt;

use lattice_collections::{AllocError, GrowableArray, HashTable, RawAllocator, SystemAllocator};
use serde::{Deserialize, Serialize};
use tracing::trace;

// ---------------------------------------------------------------------------
// EventId / ListenerId
// ---------------------------------------------------------------------------

/// Identifies a kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl EventId {
    /// Derive an id from a name with 32-bit FNV-1a. Stable across runs and
    /// usable in `const` items.
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash: u32 = 0x811c_9dc5;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(0x0100_0193);
            i += 1;
        }
        Self(hash)
    }
}

/// Identifies one subscription, as returned by [`EventBus::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A listener callback. State it captures takes the place of user data.
pub type Handler = Box<dyn FnMut(&dyn Any)>;

struct Listener {
    id: ListenerId,
    handler: Handler,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Per-event-id listener lists with synchronous, in-order dispatch.
pub struct EventBus<A: RawAllocator = SystemAllocator> {
    listeners: HashTable<EventId, GrowableArray<Listener, A>, A>,
    next_listener: u64,
    alloc: A,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::new_in(SystemAllocator)
    }
}

impl<A: RawAllocator + Clone> EventBus<A> {
    /// An empty bus whose listener lists grow through `alloc`.
    pub fn new_in(alloc: A) -> Self {
        Self {
            listeners: HashTable::with_buckets_in(64, alloc.clone()),
            next_listener: 0,
            alloc,
        }
    }

    /// Subscribe `handler` to `event`. It runs after every listener already
    /// subscribed to the same id.
    pub fn add_listener<F>(&mut self, event: EventId, handler: F) -> Result<ListenerId, AllocError>
    where
        F: FnMut(&dyn Any) + 'static,
    {
        let id = ListenerId(self.next_listener);
        let alloc = self.alloc.clone();
        let list = self
            .listeners
            .get_or_insert_with(event, || GrowableArray::new_in(alloc))?;
        list.push(Listener {
            id,
            handler: Box::new(handler),
        })?;
        self.next_listener += 1;
        trace!(?event, listener = id.0, "listener added");
        Ok(id)
    }

    /// Unsubscribe `listener` from `event`. Returns `false` if it was not
    /// subscribed there. Remaining listeners keep their order.
    pub fn remove_listener(&mut self, event: EventId, listener: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&event) else {
            return false;
        };
        let Some(pos) = list.iter().position(|l| l.id == listener) else {
            return false;
        };
        drop(list.erase(pos));
        trace!(?event, listener = listener.0, "listener removed");
        true
    }

    /// Call every listener subscribed to `event` with `payload`, in
    /// subscription order. Returns how many listeners ran.
    pub fn send_event(&mut self, event: EventId, payload: &dyn Any) -> usize {
        let Some(list) = self.listeners.get_mut(&event) else {
            return 0;
        };
        for listener in list.iter_mut() {
            (listener.handler)(payload);
        }
        trace!(?event, delivered = list.len(), "event sent");
        list.len()
    }

    /// Number of listeners subscribed to `event`.
    pub fn listener_count(&self, event: EventId) -> usize {
        self.listeners.get(&event).map_or(0, |list| list.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAllocator + Clone> fmt::Debug for EventBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (event, list) in self.listeners.iter() {
            map.entry(event, &list.len());
        }
        map.finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
