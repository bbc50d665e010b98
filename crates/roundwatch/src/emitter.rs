// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small event emitter: a mapping from event name to listener list.
//! Listeners run inline in the polling task; a listener error aborts the
//! emit and surfaces to the caller.

use crate::config::{BeforePollMetadata, SubscriptionResult};
use crate::error::SubscriberError;
use roundwatch_core::transaction::SubscribedTransaction;
use std::collections::HashMap;

/// The payload dispatched to listeners, by event kind.
#[derive(Clone, Copy)]
pub enum Event<'a> {
    Transaction(&'a SubscribedTransaction),
    Batch(&'a [SubscribedTransaction]),
    BeforePoll(&'a BeforePollMetadata),
    Poll(&'a SubscriptionResult),
    Error(&'a SubscriberError),
}

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A listener receives the event payload and the event name it was
/// registered under.
pub type Listener = Box<dyn Fn(Event<'_>, &str) -> ListenerResult + Send + Sync>;

/// Handle for removing a previously registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
pub struct EventEmitter {
    listeners: HashMap<String, Vec<Registration>>,
    next_id: u64,
}

impl EventEmitter {
    pub fn new() -> Self {
        EventEmitter::default()
    }

    pub fn on(&mut self, event_name: &str, listener: Listener) -> ListenerId {
        self.register(event_name, listener, false)
    }

    /// Registers a listener that is removed after its first call.
    pub fn once(&mut self, event_name: &str, listener: Listener) -> ListenerId {
        self.register(event_name, listener, true)
    }

    fn register(&mut self, event_name: &str, listener: Listener, once: bool) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(event_name.to_string())
            .or_default()
            .push(Registration { id, once, listener });
        id
    }

    pub fn remove_listener(&mut self, event_name: &str, id: ListenerId) {
        if let Some(registrations) = self.listeners.get_mut(event_name) {
            registrations.retain(|registration| registration.id != id);
        }
    }

    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.listeners
            .get(event_name)
            .is_some_and(|registrations| !registrations.is_empty())
    }

    /// Emits an event to every listener registered for the name, in
    /// registration order. The first listener error stops the dispatch.
    pub fn emit(&mut self, event_name: &str, event: &Event<'_>) -> Result<(), SubscriberError> {
        let Some(registrations) = self.listeners.get(event_name) else {
            return Ok(());
        };

        let mut fired_once = Vec::new();
        let mut failure = None;
        for registration in registrations {
            if registration.once {
                fired_once.push(registration.id);
            }
            if let Err(source) = (registration.listener)(*event, event_name) {
                failure = Some(SubscriberError::Listener {
                    event: event_name.to_string(),
                    source,
                });
                break;
            }
        }

        for id in fired_once {
            self.remove_listener(event_name, id);
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_listener(counter: Arc<AtomicUsize>) -> Listener {
        Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn meta() -> BeforePollMetadata {
        BeforePollMetadata {
            watermark: 0,
            current_round: 1,
        }
    }

    #[test]
    fn dispatches_in_registration_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut emitter = EventEmitter::new();
        emitter.on("poll", counting_listener(calls.clone()));
        emitter.on("poll", counting_listener(calls.clone()));

        emitter.emit("poll", &Event::BeforePoll(&meta())).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        emitter.emit("other", &Event::BeforePoll(&meta())).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_listeners_fire_a_single_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut emitter = EventEmitter::new();
        emitter.once("poll", counting_listener(calls.clone()));

        emitter.emit("poll", &Event::BeforePoll(&meta())).unwrap();
        emitter.emit("poll", &Event::BeforePoll(&meta())).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_listeners_no_longer_fire() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut emitter = EventEmitter::new();
        let id = emitter.on("poll", counting_listener(calls.clone()));
        emitter.remove_listener("poll", id);

        emitter.emit("poll", &Event::BeforePoll(&meta())).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_errors_stop_the_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut emitter = EventEmitter::new();
        emitter.on("poll", Box::new(|_, _| Err("boom".into())));
        emitter.on("poll", counting_listener(calls.clone()));

        let error = emitter
            .emit("poll", &Event::BeforePoll(&meta()))
            .unwrap_err();
        assert!(matches!(error, SubscriberError::Listener { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
