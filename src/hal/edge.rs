// src/hal/edge.rs
//! In-process edge dispatcher
//!
//! Stands in for the host GPIO interrupt subsystem: whoever observes a rising
//! data-ready edge calls [`SoftwareEdges::fire`], which runs the subscribed
//! handler synchronously on the caller's thread.

use crate::hal::traits::{EdgeError, EdgeHandler, EdgeSource};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Edge source driven from software
#[derive(Clone, Default)]
pub struct SoftwareEdges {
    handlers: Arc<RwLock<HashMap<u8, EdgeHandler>>>,
    available_pins: Option<Arc<Vec<u8>>>,
}

impl SoftwareEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict subscriptions to the given pins
    pub fn with_pins(pins: Vec<u8>) -> Self {
        Self {
            handlers: Arc::default(),
            available_pins: Some(Arc::new(pins)),
        }
    }

    /// Signal a rising edge on `pin`. Returns false if nothing is subscribed.
    pub fn fire(&self, pin: u8) -> bool {
        // Read guard held for the call so unsubscribe waits for in-flight handlers
        let handlers = self.handlers.read();
        match handlers.get(&pin) {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, pin: u8) -> bool {
        self.handlers.read().contains_key(&pin)
    }
}

impl EdgeSource for SoftwareEdges {
    fn subscribe(&self, pin: u8, handler: EdgeHandler) -> Result<(), EdgeError> {
        if let Some(pins) = &self.available_pins {
            if !pins.contains(&pin) {
                return Err(EdgeError::PinUnavailable(pin));
            }
        }
        self.handlers.write().insert(pin, handler);
        Ok(())
    }

    fn unsubscribe(&self, pin: u8) {
        self.handlers.write().remove(&pin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fire_reaches_subscriber() {
        let edges = SoftwareEdges::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        edges
            .subscribe(22, Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(edges.fire(22));
        assert!(edges.fire(22));
        assert!(!edges.fire(27));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        edges.unsubscribe(22);
        assert!(!edges.fire(22));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resubscribe_replaces_handler() {
        let edges = SoftwareEdges::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = count.clone();
            edges
                .subscribe(17, Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        edges.fire(17);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pin_budget() {
        let edges = SoftwareEdges::with_pins(vec![17, 22]);
        assert!(edges.subscribe(17, Arc::new(|| {})).is_ok());
        assert_eq!(
            edges.subscribe(5, Arc::new(|| {})),
            Err(EdgeError::PinUnavailable(5))
        );
    }
}
