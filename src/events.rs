//! Events Module - Event types, queue, bus and subscriptions
//!
//! Messages are delivered across program units through an [`EventBus`]:
//! producers construct events on the bus, the bus queues them, and a call to
//! [`EventBus::process`] fans each queued event out to every matching
//! [`Subscription`]. A render loop is expected to call `process()` once per
//! update cycle; standalone consumers can instead iterate a pull-mode
//! subscription, which pumps the bus itself while idle.
//!
//! # API
//!
//! - `EventBus::emit(type, data)` - construct and queue an event
//! - `EventBus::event(type, data)` - construct without queuing (deferred)
//! - `EventBus::dispatch(event)` - queue an already-built event
//! - `EventBus::process()` - drain the queue to subscribers
//! - `EventBus::subscribe(types, callback)` - push-mode subscription
//! - `EventBus::listen(types)` - pull-mode subscription
//! - `Subscription::events()` - cooperative iteration over a pull queue
//! - `Subscription::kill()` - stop all future deliveries
//!
//! # Example
//!
//! ```ignore
//! use tesserae::{EventBus, EventData, EventType, Propagation};
//!
//! let bus = EventBus::new();
//! let _sub = bus.subscribe(EventType::TICK, |event| {
//!     println!("tick {}", event.tick);
//!     Propagation::Continue
//! });
//!
//! bus.emit(EventType::TICK, EventData::None);
//! bus.process(); // callback runs here
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, trace};
use spark_signals::{signal, Signal};

use crate::input::{InputPump, KeyboardEvent, MouseButton};
use crate::types::V2;

/// Idle re-check interval for pull-mode iteration.
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(5);

// =============================================================================
// TYPES
// =============================================================================

bitflags::bitflags! {
    /// Event kinds as a bitfield.
    ///
    /// Each named flag is an atomic event type; combine with bitwise OR to
    /// build a composite subscription filter: `KEY_PRESS | MOUSE_CLICK`.
    /// A queued event normally carries exactly one atomic flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventType: u16 {
        const TICK = 1;
        const KEY_PRESS = 2;
        /// Emitted on enter press by text-accepting widgets.
        const PHRASE = 4;
        const MOUSE_MOVE = 8;
        const MOUSE_PRESS = 16;
        const MOUSE_RELEASE = 32;
        const MOUSE_CLICK = 64;
        const TERMINAL_SIZE_CHANGE = 128;
        const CUSTOM = 256;
        const QUIT_LOOP = 512;
    }
}

impl EventType {
    /// All input-device flags - the kinds that terminal pumping can produce.
    pub const INPUT: Self = Self::KEY_PRESS
        .union(Self::MOUSE_MOVE)
        .union(Self::MOUSE_PRESS)
        .union(Self::MOUSE_RELEASE)
        .union(Self::MOUSE_CLICK);
}

/// Typed event payload.
///
/// The payload vocabulary matches what the built-in producers emit; anything
/// application-specific travels as [`EventData::Custom`].
#[derive(Clone)]
pub enum EventData {
    None,
    /// Key press payload.
    Key(KeyboardEvent),
    /// Mouse position and the button involved, if any.
    Mouse { pos: V2, button: MouseButton },
    /// New terminal size.
    Size(V2),
    /// Completed text (phrase) payload.
    Text(String),
    /// Application-defined payload.
    Custom(Rc<dyn Any>),
}

impl PartialEq for EventData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Key(a), Self::Key(b)) => a == b,
            (
                Self::Mouse { pos: ap, button: ab },
                Self::Mouse { pos: bp, button: bb },
            ) => ap == bp && ab == bb,
            (Self::Size(a), Self::Size(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            // Opaque payloads compare by identity.
            (Self::Custom(a), Self::Custom(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for EventData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Self::Mouse { pos, button } => f
                .debug_struct("Mouse")
                .field("pos", pos)
                .field("button", button)
                .finish(),
            Self::Size(size) => f.debug_tuple("Size").field(size).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// An event as delivered to subscribers. Read-only after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The event kind (normally a single atomic flag).
    pub event_type: EventType,
    /// Wall-clock time at construction, in seconds since the unix epoch.
    pub timestamp: f64,
    /// Logical frame counter at construction.
    pub tick: u64,
    /// Typed payload.
    pub data: EventData,
}

/// What a callback tells the dispatch loop to do with the current event.
///
/// [`Propagation::Stop`] suppresses delivery of this one event to any
/// later subscribers; remaining queued events are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

/// Errors from misusing the subscription API.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Push-mode subscriptions deliver through their callback and have no
    /// queue to iterate.
    #[error("subscriptions with a callback set can't be iterated")]
    NotIterable,
    /// The bus this subscription was registered on no longer exists.
    #[error("event bus has been dropped")]
    BusClosed,
}

/// Callback signature for push-mode subscriptions.
pub type EventCallback = Rc<dyn Fn(&Event) -> Propagation>;

// =============================================================================
// EVENT BUS
// =============================================================================

struct BusState {
    /// FIFO of events awaiting the next `process()` pass.
    queue: VecDeque<Event>,
    /// Live subscriptions, keyed per atomic flag, in delivery order.
    registry: HashMap<EventType, Vec<Subscription>>,
    /// Logical frame counter; reactive so render code can track it.
    tick: Signal<u64>,
    /// Most recently delivered event; reactive.
    last_event: Signal<Option<Event>>,
}

/// The event queue and subscription registry.
///
/// Cheap to clone - clones share state. The bus is single-threaded by
/// construction (interior `RefCell` state, like the rest of the crate);
/// hand one to every producer and consumer instead of reaching for a
/// process-wide singleton.
#[derive(Clone)]
pub struct EventBus {
    state: Rc<RefCell<BusState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus with no subscriptions and tick 0.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                queue: VecDeque::new(),
                registry: HashMap::new(),
                tick: signal(0u64),
                last_event: signal(None),
            })),
        }
    }

    // -------------------------------------------------------------------------
    // Event construction and queuing
    // -------------------------------------------------------------------------

    /// Construct an event (timestamp now, tick from the bus) and queue it.
    ///
    /// Returns a copy of the queued event.
    pub fn emit(&self, event_type: EventType, data: EventData) -> Event {
        let event = self.event(event_type, data);
        self.dispatch(event.clone());
        event
    }

    /// Construct an event without queuing it.
    ///
    /// Use when the event needs further inspection before becoming visible
    /// to subscribers; queue it afterwards with [`dispatch`](Self::dispatch).
    /// This avoids the race where a subscriber observes a half-built event.
    pub fn event(&self, event_type: EventType, data: EventData) -> Event {
        Event {
            event_type,
            timestamp: unix_now(),
            tick: self.tick(),
            data,
        }
    }

    /// Construct an event with an explicit tick, without queuing it.
    pub fn event_at_tick(&self, event_type: EventType, data: EventData, tick: u64) -> Event {
        Event {
            tick,
            ..self.event(event_type, data)
        }
    }

    /// Queue an already-built event for the next `process()` pass.
    ///
    /// Duplicates are legal and delivered independently.
    pub fn dispatch(&self, event: Event) {
        trace!("queueing {:?}", event.event_type);
        self.state.borrow_mut().queue.push_back(event);
    }

    /// Number of events currently queued.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Deliver every queued event to its matching subscriptions, then clear
    /// the queue.
    ///
    /// Operates on a snapshot of the queue taken at call time: events queued
    /// by a callback *during* the drain are deferred to the next call.
    ///
    /// Per event, subscribers are notified in registration order (priority
    /// subscriptions first), per atomic flag of the event's type. Callbacks
    /// run inline; a [`Propagation::Stop`] return suppresses the rest of
    /// that event's fan-out. A panicking callback unwinds to the caller.
    pub fn process(&self) {
        let drained: Vec<Event> = self.state.borrow_mut().queue.drain(..).collect();
        if drained.is_empty() {
            return;
        }
        trace!("processing {} event(s)", drained.len());

        let last_event = self.state.borrow().last_event.clone();
        for event in drained {
            last_event.set(Some(event.clone()));
            'fan_out: for flag in event.event_type.iter() {
                for subscription in self.subscriptions_for(flag) {
                    if subscription.deliver(&event) == Propagation::Stop {
                        trace!("propagation of {:?} stopped", event.event_type);
                        break 'fan_out;
                    }
                }
            }
        }
    }

    /// The most recently delivered event, if any.
    pub fn last_event(&self) -> Option<Event> {
        self.state.borrow().last_event.get()
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Register a push-mode subscription: `callback` runs inline during
    /// `process()` for every matching event.
    pub fn subscribe<F>(&self, types: EventType, callback: F) -> Subscription
    where
        F: Fn(&Event) -> Propagation + 'static,
    {
        self.register(types, Some(Rc::new(callback)))
    }

    /// Register a pull-mode subscription: matching events land in an
    /// internal FIFO, consumed through [`Subscription::events`].
    ///
    /// The queue is unbounded - a producer that outpaces the consumer grows
    /// it without limit.
    pub fn listen(&self, types: EventType) -> Subscription {
        self.register(types, None)
    }

    /// All live subscriptions registered for one atomic flag, in delivery
    /// order.
    pub fn subscriptions_for(&self, flag: EventType) -> Vec<Subscription> {
        self.state
            .borrow()
            .registry
            .get(&flag)
            .cloned()
            .unwrap_or_default()
    }

    fn register(&self, types: EventType, callback: Option<EventCallback>) -> Subscription {
        let subscription = Subscription {
            shared: Rc::new(RefCell::new(SubShared {
                bus: Rc::downgrade(&self.state),
                types,
                callback,
                queue: VecDeque::new(),
                terminated: false,
                resolution: DEFAULT_RESOLUTION,
            })),
        };
        debug!("subscribing to {:?}", types);
        let mut state = self.state.borrow_mut();
        for flag in types.iter() {
            state
                .registry
                .entry(flag)
                .or_default()
                .push(subscription.clone());
        }
        subscription
    }

    /// Subscribe a callback to key presses.
    pub fn on_key_press<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) -> Propagation + 'static,
    {
        self.subscribe(EventType::KEY_PRESS, callback)
    }

    /// Subscribe a callback to mouse clicks.
    pub fn on_mouse_click<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) -> Propagation + 'static,
    {
        self.subscribe(EventType::MOUSE_CLICK, callback)
    }

    /// Subscribe a callback to all mouse activity.
    pub fn on_mouse<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) -> Propagation + 'static,
    {
        self.subscribe(
            EventType::MOUSE_CLICK
                | EventType::MOUSE_MOVE
                | EventType::MOUSE_PRESS
                | EventType::MOUSE_RELEASE,
            callback,
        )
    }

    // -------------------------------------------------------------------------
    // Logical tick
    // -------------------------------------------------------------------------

    /// Current logical frame counter.
    pub fn tick(&self) -> u64 {
        self.state.borrow().tick.get()
    }

    /// Advance the logical frame counter by one. Called once per update
    /// cycle by whatever drives rendering.
    pub fn advance_tick(&self) -> u64 {
        let tick_signal = self.state.borrow().tick.clone();
        let next = tick_signal.get() + 1;
        tick_signal.set(next);
        next
    }

    /// Set the logical frame counter.
    pub fn set_tick(&self, tick: u64) {
        let tick_signal = self.state.borrow().tick.clone();
        tick_signal.set(tick);
    }

    /// The tick as a reactive signal, for deriveds and effects.
    pub fn tick_signal(&self) -> Signal<u64> {
        self.state.borrow().tick.clone()
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

struct SubShared {
    bus: Weak<RefCell<BusState>>,
    types: EventType,
    callback: Option<EventCallback>,
    queue: VecDeque<Event>,
    terminated: bool,
    resolution: Duration,
}

/// A standing registration for one or more event types.
///
/// Push mode (built with [`EventBus::subscribe`]) delivers through a
/// callback during `process()`. Pull mode (built with [`EventBus::listen`])
/// collects events in an internal FIFO for later iteration.
///
/// Cheap to clone - clones share state; the bus registry holds a clone, so
/// a subscription stays live until [`kill`](Self::kill) is called, no
/// matter what happens to the handle the caller keeps.
#[derive(Clone)]
pub struct Subscription {
    shared: Rc<RefCell<SubShared>>,
}

impl Subscription {
    /// The composite flag set this subscription was registered for.
    pub fn types(&self) -> EventType {
        self.shared.borrow().types
    }

    /// Whether this subscription can produce something right now: push mode
    /// is always ready, pull mode is ready when its queue holds items.
    pub fn is_ready(&self) -> bool {
        let shared = self.shared.borrow();
        shared.callback.is_some() || !shared.queue.is_empty()
    }

    /// Number of undelivered events in the pull queue.
    pub fn pending(&self) -> usize {
        self.shared.borrow().queue.len()
    }

    /// Whether `kill()` has been called.
    pub fn is_terminated(&self) -> bool {
        self.shared.borrow().terminated
    }

    /// Idle re-check interval for [`events`](Self::events) iteration.
    pub fn set_resolution(&self, resolution: Duration) {
        self.shared.borrow_mut().resolution = resolution;
    }

    /// Remove this subscription from every registry slot and stop any
    /// in-flight iteration at its next poll. Idempotent.
    ///
    /// Does not preempt a callback already running; it only stops future
    /// deliveries.
    pub fn kill(&self) {
        let (bus, types) = {
            let mut shared = self.shared.borrow_mut();
            if shared.terminated {
                return;
            }
            shared.terminated = true;
            (shared.bus.clone(), shared.types)
        };
        debug!("killing subscription for {:?}", types);
        if let Some(state) = bus.upgrade() {
            let mut state = state.borrow_mut();
            for flag in types.iter() {
                let now_empty = match state.registry.get_mut(&flag) {
                    Some(list) => {
                        list.retain(|other| !Rc::ptr_eq(&other.shared, &self.shared));
                        list.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    state.registry.remove(&flag);
                }
            }
        }
    }

    /// Move this subscription to the front of the delivery list for every
    /// flag it is registered under, so it is notified before subscriptions
    /// registered earlier.
    pub fn prioritize(&self) {
        let (bus, types) = {
            let shared = self.shared.borrow();
            (shared.bus.clone(), shared.types)
        };
        if let Some(state) = bus.upgrade() {
            let mut state = state.borrow_mut();
            for flag in types.iter() {
                if let Some(list) = state.registry.get_mut(&flag) {
                    if let Some(index) = list
                        .iter()
                        .position(|other| Rc::ptr_eq(&other.shared, &self.shared))
                    {
                        let this = list.remove(index);
                        list.insert(0, this);
                    }
                }
            }
        }
    }

    /// Cooperative iteration over the pull queue.
    ///
    /// Errors with [`EventError::NotIterable`] for push-mode subscriptions
    /// and [`EventError::BusClosed`] if the bus no longer exists.
    pub fn events(&self) -> Result<EventIter, EventError> {
        let shared = self.shared.borrow();
        if shared.callback.is_some() {
            return Err(EventError::NotIterable);
        }
        if shared.bus.upgrade().is_none() {
            return Err(EventError::BusClosed);
        }
        Ok(EventIter {
            subscription: self.clone(),
            pump_input: false,
            pump: None,
        })
    }

    /// Deliver one event: run the callback (push mode) or queue it (pull
    /// mode). Terminated subscriptions ignore delivery.
    fn deliver(&self, event: &Event) -> Propagation {
        let callback = {
            let shared = self.shared.borrow();
            if shared.terminated {
                return Propagation::Continue;
            }
            shared.callback.clone()
        };
        match callback {
            // No borrow is held here: the callback may freely subscribe,
            // kill, or dispatch.
            Some(callback) => callback(event),
            None => {
                self.shared.borrow_mut().queue.push_back(event.clone());
                Propagation::Continue
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        let mode = if shared.callback.is_some() { "push" } else { "pull" };
        f.debug_struct("Subscription")
            .field("types", &shared.types)
            .field("mode", &mode)
            .field("pending", &shared.queue.len())
            .field("terminated", &shared.terminated)
            .finish()
    }
}

// =============================================================================
// PULL-MODE ITERATION
// =============================================================================

/// Iterator over a pull-mode subscription's events.
///
/// Each `next()` pops the oldest queued event immediately when one is
/// available. When the queue is empty it sleeps for the subscription's
/// resolution (5 ms by default), optionally pumps terminal input, runs
/// `process()` on the bus, and re-checks - so a consumer not driven by a
/// render loop still sees live events. Iteration ends (`None`) once the
/// subscription is killed, even if undelivered events remain queued.
pub struct EventIter {
    subscription: Subscription,
    pump_input: bool,
    pump: Option<InputPump>,
}

impl EventIter {
    /// Opt in to polling the terminal for input while idle.
    ///
    /// Only effective when the subscription's types include input flags
    /// (key or mouse). Off by default: when a render loop is already
    /// pumping input, a second poller would steal its events.
    pub fn pump_input(mut self, enabled: bool) -> Self {
        self.pump_input = enabled;
        self
    }
}

impl Iterator for EventIter {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            let (bus_state, resolution) = {
                let mut shared = self.subscription.shared.borrow_mut();
                if shared.terminated {
                    return None;
                }
                if let Some(event) = shared.queue.pop_front() {
                    return Some(event);
                }
                (shared.bus.upgrade(), shared.resolution)
            };
            // A dead bus can never deliver again; treat it like a kill.
            let bus = EventBus { state: bus_state? };

            std::thread::sleep(resolution);
            if self.pump_input && self.subscription.types().intersects(EventType::INPUT) {
                let pump = self
                    .pump
                    .get_or_insert_with(|| InputPump::new(bus.clone()));
                if let Err(error) = pump.poll() {
                    debug!("input pump error: {error}");
                }
            }
            bus.process();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn counted_subscription(bus: &EventBus, types: EventType) -> (Subscription, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let sub = bus.subscribe(types, move |_event| {
            count_clone.set(count_clone.get() + 1);
            Propagation::Continue
        });
        (sub, count)
    }

    #[test]
    fn test_emit_then_process_delivers_once() {
        let bus = EventBus::new();
        let (_sub, count) = counted_subscription(&bus, EventType::TICK);

        bus.emit(EventType::TICK, EventData::None);
        bus.emit(EventType::TICK, EventData::None);
        assert_eq!(count.get(), 0); // Nothing until process()

        bus.process();
        assert_eq!(count.get(), 2);
        assert_eq!(bus.pending(), 0);

        bus.process(); // Queue is empty - no re-delivery
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_three_ticks_in_order_with_monotonic_timestamps() {
        let bus = EventBus::new();
        let seen: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = bus.subscribe(EventType::TICK, move |event| {
            seen_clone.borrow_mut().push(event.timestamp);
            Propagation::Continue
        });

        bus.emit(EventType::TICK, EventData::None);
        bus.emit(EventType::TICK, EventData::None);
        bus.emit(EventType::TICK, EventData::None);
        bus.process();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_composite_subscription_filters_types() {
        let bus = EventBus::new();
        let (_sub, count) =
            counted_subscription(&bus, EventType::KEY_PRESS | EventType::MOUSE_CLICK);

        bus.emit(EventType::KEY_PRESS, EventData::None);
        bus.emit(EventType::MOUSE_CLICK, EventData::None);
        bus.emit(EventType::TICK, EventData::None);
        bus.process();

        assert_eq!(count.get(), 2); // The TICK event never matched
    }

    #[test]
    fn test_duplicate_events_delivered_independently() {
        let bus = EventBus::new();
        let (_sub, count) = counted_subscription(&bus, EventType::CUSTOM);

        let event = bus.event(EventType::CUSTOM, EventData::None);
        bus.dispatch(event.clone());
        bus.dispatch(event);
        bus.process();

        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_deferred_dispatch() {
        let bus = EventBus::new();
        let (_sub, count) = counted_subscription(&bus, EventType::CUSTOM);

        let event = bus.event(EventType::CUSTOM, EventData::Text("late".into()));
        bus.process();
        assert_eq!(count.get(), 0); // Not queued yet

        bus.dispatch(event);
        bus.process();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_tick_defaults_from_bus() {
        let bus = EventBus::new();
        bus.set_tick(7);
        let event = bus.emit(EventType::TICK, EventData::None);
        assert_eq!(event.tick, 7);

        bus.advance_tick();
        let event = bus.event(EventType::TICK, EventData::None);
        assert_eq!(event.tick, 8);

        let event = bus.event_at_tick(EventType::TICK, EventData::None, 42);
        assert_eq!(event.tick, 42);
    }

    #[test]
    fn test_events_queued_during_drain_are_deferred() {
        let bus = EventBus::new();
        let bus_clone = bus.clone();
        let (_observer, count) = counted_subscription(&bus, EventType::CUSTOM);
        let _producer = bus.subscribe(EventType::TICK, move |_event| {
            bus_clone.emit(EventType::CUSTOM, EventData::None);
            Propagation::Continue
        });

        bus.emit(EventType::TICK, EventData::None);
        bus.process();
        assert_eq!(count.get(), 0); // Snapshot semantics: deferred
        assert_eq!(bus.pending(), 1);

        bus.process();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_stop_propagation_suppresses_later_subscribers_only() {
        let bus = EventBus::new();
        let first = Rc::new(Cell::new(0));
        let first_clone = first.clone();
        let _stopper = bus.subscribe(EventType::KEY_PRESS, move |_event| {
            first_clone.set(first_clone.get() + 1);
            Propagation::Stop
        });
        let (_second, second_count) = counted_subscription(&bus, EventType::KEY_PRESS);
        let (_other, tick_count) = counted_subscription(&bus, EventType::TICK);

        bus.emit(EventType::KEY_PRESS, EventData::None);
        bus.emit(EventType::KEY_PRESS, EventData::None);
        bus.emit(EventType::TICK, EventData::None);
        bus.process();

        assert_eq!(first.get(), 2); // Saw both key events
        assert_eq!(second_count.get(), 0); // Suppressed both times
        assert_eq!(tick_count.get(), 1); // Other events unaffected
    }

    #[test]
    fn test_prioritized_subscription_notified_first() {
        let bus = EventBus::new();
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let order_a = order.clone();
        let _a = bus.subscribe(EventType::TICK, move |_event| {
            order_a.borrow_mut().push("a");
            Propagation::Continue
        });
        let order_b = order.clone();
        let b = bus.subscribe(EventType::TICK, move |_event| {
            order_b.borrow_mut().push("b");
            Propagation::Continue
        });
        b.prioritize();

        bus.emit(EventType::TICK, EventData::None);
        bus.process();

        assert_eq!(*order.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn test_kill_removes_from_registry() {
        let bus = EventBus::new();
        let (sub, count) =
            counted_subscription(&bus, EventType::KEY_PRESS | EventType::MOUSE_CLICK);
        assert_eq!(bus.subscriptions_for(EventType::KEY_PRESS).len(), 1);

        sub.kill();
        sub.kill(); // Idempotent
        assert!(sub.is_terminated());
        assert!(bus.subscriptions_for(EventType::KEY_PRESS).is_empty());
        assert!(bus.subscriptions_for(EventType::MOUSE_CLICK).is_empty());

        bus.emit(EventType::KEY_PRESS, EventData::None);
        bus.process();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_pull_mode_queue_and_readiness() {
        let bus = EventBus::new();
        let sub = bus.listen(EventType::TICK);
        assert!(!sub.is_ready()); // Pull mode with nothing queued

        bus.emit(EventType::TICK, EventData::None);
        bus.emit(EventType::TICK, EventData::None);
        bus.process();

        assert!(sub.is_ready());
        assert_eq!(sub.pending(), 2);
    }

    #[test]
    fn test_push_mode_is_always_ready() {
        let bus = EventBus::new();
        let (sub, _count) = counted_subscription(&bus, EventType::TICK);
        assert!(sub.is_ready());
    }

    #[test]
    fn test_iteration_pops_in_fifo_order_without_waiting() {
        let bus = EventBus::new();
        let sub = bus.listen(EventType::CUSTOM);
        bus.emit(EventType::CUSTOM, EventData::Text("one".into()));
        bus.emit(EventType::CUSTOM, EventData::Text("two".into()));
        bus.process();

        let mut iter = sub.events().unwrap();
        assert_eq!(
            iter.next().map(|event| event.data),
            Some(EventData::Text("one".into()))
        );
        assert_eq!(
            iter.next().map(|event| event.data),
            Some(EventData::Text("two".into()))
        );
    }

    #[test]
    fn test_idle_iteration_processes_the_bus_itself() {
        let bus = EventBus::new();
        let sub = bus.listen(EventType::CUSTOM);
        bus.emit(EventType::CUSTOM, EventData::Text("undriven".into()));
        // No process() call: the event is still sitting in the bus queue.
        assert_eq!(sub.pending(), 0);

        let mut iter = sub.events().unwrap();
        let event = iter.next().unwrap(); // Idle wake runs process() for us
        assert_eq!(event.data, EventData::Text("undriven".into()));
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_kill_ends_iteration_despite_pending_items() {
        let bus = EventBus::new();
        let sub = bus.listen(EventType::CUSTOM);
        bus.emit(EventType::CUSTOM, EventData::None);
        bus.process();
        assert_eq!(sub.pending(), 1);

        let mut iter = sub.events().unwrap();
        sub.kill();
        assert_eq!(iter.next(), None); // Terminated beats non-empty queue
    }

    #[test]
    fn test_callback_subscription_is_not_iterable() {
        let bus = EventBus::new();
        let (sub, _count) = counted_subscription(&bus, EventType::TICK);
        assert!(matches!(sub.events(), Err(EventError::NotIterable)));
    }

    #[test]
    fn test_dropped_bus_closes_iteration() {
        let bus = EventBus::new();
        let sub = bus.listen(EventType::TICK);
        drop(bus);
        assert!(matches!(sub.events(), Err(EventError::BusClosed)));
        sub.kill(); // Must not panic with the bus gone
    }

    #[test]
    fn test_last_event_tracks_delivery() {
        let bus = EventBus::new();
        assert_eq!(bus.last_event(), None);

        bus.emit(EventType::PHRASE, EventData::Text("done".into()));
        assert_eq!(bus.last_event(), None); // Only set on delivery

        bus.process();
        let last = bus.last_event().unwrap();
        assert_eq!(last.event_type, EventType::PHRASE);
    }

    #[test]
    fn test_callback_may_kill_its_own_subscription() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let sub = bus.subscribe(EventType::TICK, move |_event| {
            count_clone.set(count_clone.get() + 1);
            if let Some(sub) = slot_clone.borrow().as_ref() {
                sub.kill();
            }
            Propagation::Continue
        });
        *slot.borrow_mut() = Some(sub);

        bus.emit(EventType::TICK, EventData::None);
        bus.emit(EventType::TICK, EventData::None);
        bus.process();
        assert_eq!(count.get(), 1); // Second delivery skipped after self-kill
    }

    #[test]
    fn test_event_data_equality() {
        let payload: Rc<dyn Any> = Rc::new(13u32);
        assert_eq!(
            EventData::Custom(payload.clone()),
            EventData::Custom(payload.clone())
        );
        assert_ne!(
            EventData::Custom(payload),
            EventData::Custom(Rc::new(13u32))
        );
        assert_eq!(
            EventData::Size(V2::new(80, 24)),
            EventData::Size(V2::new(80, 24))
        );
    }
}
