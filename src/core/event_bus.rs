//! Pub/Sub event bus between the session and its consumers.
//!
//! Architecture:
//! - Consumers subscribe to event types with callbacks (immediate invocation)
//! - emit() invokes callbacks immediately AND queues for deferred processing
//! - poll() returns queued events for batch processing in the session loop
//!
//! Two directions use the same bus:
//! - commands *into* the session (playback controls, drawing input from a UI
//!   or the stdin controller), drained by `Session::pump()`
//! - notifications *out of* the session (shape captured, job changed, segment
//!   changed), usually consumed through `subscribe()`
//!
//! Callback order: FIFO within same event type. Cross-type order undefined.

use log::warn;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<HashMap<TypeId, Vec<Callback>>>,
    queue: Mutex<Vec<BoxedEvent>>,
}

impl BusInner {
    fn publish(&self, type_id: TypeId, any: &dyn Any) {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cbs) = subscribers.get(&type_id) {
            for cb in cbs {
                cb(any);
            }
        }
    }

    fn enqueue(&self, event: BoxedEvent) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            warn!("Event queue full ({} events), evicting oldest {}", queue.len(), evict_count);
            queue.drain(0..evict_count);
        }
        queue.push(event);
    }

    fn emit<E: Event>(&self, event: E) {
        self.publish(TypeId::of::<E>(), &event);
        self.enqueue(Box::new(event));
    }
}

/// Pub/Sub event bus with deferred processing support.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type E. The callback runs inside `emit()`.
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke callbacks, then queue the event for `poll()`.
    pub fn emit<E: Event>(&self, event: E) {
        self.inner.emit(event);
    }

    /// Take every event queued since the last poll.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Emitter handle for threads and UI components.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Clear subscribers for type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Cloneable, emit-only handle to an [`EventBus`].
#[derive(Clone)]
pub struct EventEmitter {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("queue_len", &self.inner.queue.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

impl EventEmitter {
    pub fn emit<E: Event>(&self, event: E) {
        self.inner.emit(event);
    }
}

/// Downcast a queued event to its concrete type.
///
/// Must deref to `dyn Event` before `as_any()`: `Box<dyn Event>` itself
/// satisfies the blanket impl and would report its own TypeId.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::playback_events::{SeekEvent, StepEvent};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);

        bus.subscribe::<StepEvent, _>(move |e| {
            c.fetch_add(e.0, Ordering::SeqCst);
        });

        bus.emit(StepEvent(10));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        bus.emit(StepEvent(-3));
        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_emit_queues_for_poll() {
        let bus = EventBus::new();
        bus.emit(StepEvent(1));
        bus.emit(SeekEvent(4));

        let events = bus.poll();
        assert_eq!(events.len(), 2);
        assert_eq!(downcast_event::<StepEvent>(&events[0]).map(|e| e.0), Some(1));
        assert_eq!(downcast_event::<SeekEvent>(&events[1]).map(|e| e.0), Some(4));
        assert!(downcast_event::<SeekEvent>(&events[0]).is_none());
        assert_eq!(bus.poll().len(), 0);
    }

    #[test]
    fn test_emitter_from_other_thread() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe::<StepEvent, _>(move |e| {
            c.fetch_add(e.0, Ordering::SeqCst);
        });

        let emitter = bus.emitter();
        std::thread::spawn(move || emitter.emit(StepEvent(42)))
            .join()
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 42);
        assert_eq!(bus.queue_len(), 1);
    }

    #[test]
    fn test_unsubscribe_keeps_queueing() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe::<StepEvent, _>(move |e| {
            c.fetch_add(e.0, Ordering::SeqCst);
        });
        bus.unsubscribe_all::<StepEvent>();

        bus.emit(StepEvent(10));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(bus.poll().len(), 1);
    }

    #[test]
    fn test_queue_eviction() {
        let bus = EventBus::new();
        for i in 0..(MAX_QUEUE_SIZE + 1) {
            bus.emit(SeekEvent(i));
        }
        let events = bus.poll();
        assert_eq!(events.len(), MAX_QUEUE_SIZE / 2 + 1);
        assert_eq!(downcast_event::<SeekEvent>(&events[0]).map(|e| e.0), Some(MAX_QUEUE_SIZE / 2));
    }
}
