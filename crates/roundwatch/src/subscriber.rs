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

//! The subscriber: a long-running poller around the sync orchestrator with
//! per-filter event dispatch and watermark persistence.

use crate::config::{BeforePollMetadata, SubscriberConfig, SubscriptionParams, SubscriptionResult};
use crate::emitter::{Event, EventEmitter, Listener, ListenerResult};
use crate::error::SubscriberError;
use crate::subscription::get_subscribed_transactions;
use log::info;
use roundwatch_client::{Algod, Indexer};
use roundwatch_core::transaction::SubscribedTransaction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const ERROR_EVENT: &str = "error";
const POLL_EVENT: &str = "poll";
const BEFORE_POLL_EVENT: &str = "before:poll";

/// A subscriber for Algorand transactions: polls the chain from the
/// persisted watermark and emits events for every filter match.
pub struct AlgorandSubscriber {
    config: SubscriberConfig,
    algod: Arc<dyn Algod>,
    indexer: Option<Arc<dyn Indexer>>,
    emitter: Mutex<EventEmitter>,
    started: AtomicBool,
    stop_requested: AtomicBool,
}

impl std::fmt::Debug for AlgorandSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorandSubscriber")
            .field("has_indexer", &self.indexer.is_some())
            .field("started", &self.started)
            .field("stop_requested", &self.stop_requested)
            .finish()
    }
}

impl AlgorandSubscriber {
    /// Creates a subscriber. Fails when `catchup-with-indexer` is requested
    /// without an indexer client, or when a filter uses the reserved name
    /// `error`.
    pub fn new(
        config: SubscriberConfig,
        algod: Arc<dyn Algod>,
        indexer: Option<Arc<dyn Indexer>>,
    ) -> Result<Self, SubscriberError> {
        config.validate(indexer.is_some())?;
        Ok(AlgorandSubscriber {
            config,
            algod,
            indexer,
            emitter: Mutex::new(EventEmitter::new()),
            started: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        })
    }

    /// Executes a single subscription poll: emits `before:poll`, runs the
    /// orchestrator, dispatches filter events in declaration order, emits
    /// `poll` and persists the new watermark.
    pub async fn poll_once(&self) -> Result<SubscriptionResult, SubscriberError> {
        let watermark = self
            .config
            .watermark
            .get()
            .map_err(SubscriberError::Watermark)?;
        let current_round = self.algod.status().await?.last_round;

        self.emit(
            BEFORE_POLL_EVENT,
            &Event::BeforePoll(&BeforePollMetadata {
                watermark,
                current_round,
            }),
        )?;

        let params = SubscriptionParams {
            filters: &self.config.filters,
            arc28_groups: &self.config.arc28_groups,
            max_rounds_to_sync: self.config.max_rounds_to_sync,
            max_indexer_rounds_to_sync: self.config.max_indexer_rounds_to_sync,
            sync_behaviour: self.config.sync_behaviour,
            watermark,
            current_round: Some(current_round),
        };
        let result =
            get_subscribed_transactions(&params, self.algod.as_ref(), self.indexer.as_deref())
                .await?;

        for filter in &self.config.filters {
            let matched: Vec<SubscribedTransaction> = result
                .subscribed_transactions
                .iter()
                .filter(|txn| txn.filters_matched.iter().any(|name| name == filter.name()))
                .cloned()
                .collect();
            let mapped = match &filter.mapper {
                Some(mapper) => mapper(matched),
                None => matched,
            };

            self.emit(&format!("batch:{}", filter.name()), &Event::Batch(&mapped))?;
            for txn in &mapped {
                self.emit(filter.name(), &Event::Transaction(txn))?;
            }
        }

        self.emit(POLL_EVENT, &Event::Poll(&result))?;

        self.config
            .watermark
            .set(result.new_watermark)
            .map_err(SubscriberError::Watermark)?;
        Ok(result)
    }

    /// Runs polls until stopped: sleeps `frequency` between polls, or
    /// long-polls the node once the tip is reached when
    /// `wait_for_block_when_at_tip` is set.
    ///
    /// Poll errors go to the `error` listeners; without any registered, the
    /// first error ends the loop.
    pub async fn start(
        &self,
        inspect: Option<&(dyn Fn(&SubscriptionResult) + Send + Sync)>,
    ) -> Result<(), SubscriberError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let outcome = loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break Ok(());
            }

            match self.poll_once().await {
                Ok(result) => {
                    info!(
                        "poll completed: rounds {}-{}, {} transactions, watermark {} -> {}",
                        result.synced_round_range.0,
                        result.synced_round_range.1,
                        result.subscribed_transactions.len(),
                        result.starting_watermark,
                        result.new_watermark
                    );
                    if let Some(inspect) = inspect {
                        inspect(&result);
                    }
                    // A listener or the inspect hook may have requested the
                    // stop.
                    if self.stop_requested.load(Ordering::SeqCst) {
                        break Ok(());
                    }

                    if result.current_round > result.new_watermark
                        || !self.config.wait_for_block_when_at_tip
                    {
                        tokio::time::sleep(self.config.frequency).await;
                    } else {
                        let next_round = result.current_round + 1;
                        info!("waiting for round {next_round}");
                        if let Err(error) =
                            self.algod.status_after_block(result.current_round).await
                        {
                            if let Err(fatal) = self.dispatch_error(error.into()) {
                                break Err(fatal);
                            }
                        }
                    }
                }
                Err(error) => {
                    if let Err(fatal) = self.dispatch_error(error) {
                        break Err(fatal);
                    }
                    tokio::time::sleep(self.config.frequency).await;
                }
            }
        };

        self.started.store(false, Ordering::SeqCst);
        outcome
    }

    /// Requests a cooperative stop; the loop exits at the next check point.
    pub fn stop(&self, reason: &str) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        info!("stopping subscriber: {reason}");
    }

    /// Routes a poll error to the `error` listeners. Without listeners the
    /// error is fatal for the loop, as is a failing listener.
    fn dispatch_error(&self, error: SubscriberError) -> Result<(), SubscriberError> {
        let mut emitter = self.emitter.lock().expect("emitter lock poisoned");
        if !emitter.has_listeners(ERROR_EVENT) {
            return Err(error);
        }
        emitter.emit(ERROR_EVENT, &Event::Error(&error))
    }

    fn emit(&self, event_name: &str, event: &Event<'_>) -> Result<(), SubscriberError> {
        self.emitter
            .lock()
            .expect("emitter lock poisoned")
            .emit(event_name, event)
    }

    /// Registers a listener for every subscribed transaction matching the
    /// given filter name.
    pub fn on(
        &self,
        filter_name: &str,
        listener: impl Fn(&SubscribedTransaction, &str) -> ListenerResult + Send + Sync + 'static,
    ) -> Result<&Self, SubscriberError> {
        if filter_name == ERROR_EVENT {
            return Err(SubscriberError::ReservedFilterName);
        }
        self.register(
            filter_name,
            Box::new(move |event, name| match event {
                Event::Transaction(txn) => listener(txn, name),
                _ => Ok(()),
            }),
        );
        Ok(self)
    }

    /// Registers a listener for the whole batch of matches of a filter,
    /// once per poll.
    pub fn on_batch(
        &self,
        filter_name: &str,
        listener: impl Fn(&[SubscribedTransaction], &str) -> ListenerResult + Send + Sync + 'static,
    ) -> Result<&Self, SubscriberError> {
        if filter_name == ERROR_EVENT {
            return Err(SubscriberError::ReservedFilterName);
        }
        self.register(
            &format!("batch:{filter_name}"),
            Box::new(move |event, name| match event {
                Event::Batch(batch) => listener(batch, name),
                _ => Ok(()),
            }),
        );
        Ok(self)
    }

    /// Registers a listener to run before each poll.
    pub fn on_before_poll(
        &self,
        listener: impl Fn(&BeforePollMetadata) -> ListenerResult + Send + Sync + 'static,
    ) -> &Self {
        self.register(
            BEFORE_POLL_EVENT,
            Box::new(move |event, _| match event {
                Event::BeforePoll(meta) => listener(meta),
                _ => Ok(()),
            }),
        );
        self
    }

    /// Registers a listener to run after each poll.
    pub fn on_poll(
        &self,
        listener: impl Fn(&SubscriptionResult) -> ListenerResult + Send + Sync + 'static,
    ) -> &Self {
        self.register(
            POLL_EVENT,
            Box::new(move |event, _| match event {
                Event::Poll(result) => listener(result),
                _ => Ok(()),
            }),
        );
        self
    }

    /// Registers an error handler for the polling loop. With at least one
    /// handler registered, poll errors no longer end the loop (unless the
    /// handler itself fails).
    pub fn on_error(
        &self,
        listener: impl Fn(&SubscriberError) -> ListenerResult + Send + Sync + 'static,
    ) -> &Self {
        self.register(
            ERROR_EVENT,
            Box::new(move |event, _| match event {
                Event::Error(error) => listener(error),
                _ => Ok(()),
            }),
        );
        self
    }

    fn register(&self, event_name: &str, listener: Listener) {
        self.emitter
            .lock()
            .expect("emitter lock poisoned")
            .on(event_name, listener);
    }
}
