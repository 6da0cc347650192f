// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic pub/sub decoupling execution from observers.
//!
//! Publish never blocks: each subscriber gets a `try_send`, and a full
//! buffer drops the event for that subscriber only. A stalled TUI can
//! lose events; it can never stall the runner.

use gf_core::Event;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct BusState {
    topics: HashMap<String, Vec<mpsc::Sender<Event>>>,
    all: Vec<mpsc::Sender<Event>>,
    closed: bool,
}

/// Non-blocking topic pub/sub. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<RwLock<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a single topic (an event type tag, e.g.
    /// `task:completed`).
    pub fn subscribe(&self, topic: &str, buffer: usize) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut state = self.state.write();
        if !state.closed {
            state.topics.entry(topic.to_string()).or_default().push(tx);
        }
        // After close, the sender is dropped and the receiver reads
        // an immediately-closed stream.
        rx
    }

    /// Subscribe to every topic through one channel.
    pub fn subscribe_all(&self, buffer: usize) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut state = self.state.write();
        if !state.closed {
            state.all.push(tx);
        }
        rx
    }

    /// Deliver to every interested subscriber without blocking; slow
    /// subscribers lose this event, publishers never wait.
    pub fn publish(&self, event: Event) {
        let state = self.state.read();
        if state.closed {
            return;
        }
        let topic_subs = state.topics.get(event.topic());
        for tx in topic_subs.into_iter().flatten().chain(state.all.iter()) {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                tracing::trace!(topic = event.topic(), "dropping event for slow subscriber");
            }
        }
    }

    /// Close every subscriber channel. Idempotent; later publishes are
    /// discarded silently.
    pub fn close(&self) {
        let mut state = self.state.write();
        state.closed = true;
        state.topics.clear();
        state.all.clear();
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
