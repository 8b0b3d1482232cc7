//! Event and messaging system.
//!
//! A small typed event bus. Each event type has its own ordered list of
//! handlers; publishing an event calls that list in registration order and
//! nothing else. The bus is single-threaded: handlers run inline on the
//! publisher's tick.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    kind: TypeId,
    id: u64,
}

type Handler<E> = Box<dyn FnMut(&E)>;

trait HandlerList {
    fn remove(&mut self, id: u64) -> bool;
    fn len(&self) -> usize;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Handlers<E: 'static> {
    entries: Vec<(u64, Handler<E>)>,
}

impl<E: 'static> HandlerList for Handlers<E> {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(h, _)| *h != id);
        self.entries.len() != before
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Typed event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<TypeId, Box<dyn HandlerList>>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for events of type `E`.
    pub fn subscribe<E: 'static>(&mut self, handler: impl FnMut(&E) + 'static) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;

        let list = self
            .handlers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Handlers::<E> { entries: Vec::new() }));
        if let Some(list) = list.as_any_mut().downcast_mut::<Handlers<E>>() {
            list.entries.push((id, Box::new(handler)));
        }

        Subscription {
            kind: TypeId::of::<E>(),
            id,
        }
    }

    /// Removes a handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        match self.handlers.get_mut(&subscription.kind) {
            Some(list) => list.remove(subscription.id),
            None => false,
        }
    }

    /// Delivers an event to every handler registered for its type.
    pub fn publish<E: 'static>(&mut self, event: E) {
        let Some(list) = self.handlers.get_mut(&TypeId::of::<E>()) else {
            return;
        };
        if let Some(list) = list.as_any_mut().downcast_mut::<Handlers<E>>() {
            for (_, handler) in list.entries.iter_mut() {
                handler(&event);
            }
        }
    }

    /// Number of handlers registered for `E`.
    pub fn handler_count<E: 'static>(&self) -> usize {
        self.handlers
            .get(&TypeId::of::<E>())
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    struct Ping(u32);
    struct Pong;

    #[test]
    fn handlers_run_in_registration_order() {
        let mut bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        bus.subscribe(move |p: &Ping| l.borrow_mut().push(("first", p.0)));
        let l = Rc::clone(&log);
        bus.subscribe(move |p: &Ping| l.borrow_mut().push(("second", p.0)));

        bus.publish(Ping(7));
        assert_eq!(*log.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn events_only_reach_their_own_type() {
        let mut bus = EventBus::new();
        let pings = Rc::new(RefCell::new(0));

        let p = Rc::clone(&pings);
        bus.subscribe(move |_: &Ping| *p.borrow_mut() += 1);

        bus.publish(Pong);
        bus.publish(Ping(1));
        assert_eq!(*pings.borrow(), 1);
        assert_eq!(bus.handler_count::<Pong>(), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));

        let c = Rc::clone(&count);
        let sub = bus.subscribe(move |_: &Ping| *c.borrow_mut() += 1);
        bus.publish(Ping(1));

        assert!(bus.unsubscribe(sub));
        assert!(!bus.unsubscribe(sub));
        bus.publish(Ping(2));

        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.handler_count::<Ping>(), 0);
    }
}
