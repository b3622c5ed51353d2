//! Event history: historical fetch plus live subscription
//!
//! Events are ordered by `(block_number, event_index)`. Fetch failures come
//! back as an empty history carrying the error, so a live subscription keeps
//! running past a failed fetch. Duplicate deliveries of the same position are
//! dropped; nothing beyond position identity is deduplicated. Delivered
//! positions are remembered for [`DEFAULT_DEDUP_WINDOW`] blocks behind the
//! highest block seen.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{
    StreamExt,
    future,
    stream::{self, BoxStream},
};
use serde::Serialize;
use serde_json::Value;
use starknet_core::types::Felt;
use tracing::{debug, warn};

use crate::network::{ChainAddress, TransactionId};
use crate::provider::EventLogSource;

/// Blocks behind the chain head within which re-announcements are dropped
pub const DEFAULT_DEDUP_WINDOW: u64 = 64;

/// What to fetch and which metadata to attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub address: ChainAddress,
    pub event_name: String,
    /// Inclusive
    pub from_block: u64,
    pub include_block: bool,
    pub include_transaction: bool,
}

impl EventFilter {
    pub fn new(address: ChainAddress, event_name: impl Into<String>, from_block: u64) -> Self {
        Self {
            address,
            event_name: event_name.into(),
            from_block,
            include_block: false,
            include_transaction: false,
        }
    }

    pub fn with_metadata(mut self, block: bool, transaction: bool) -> Self {
        self.include_block = block;
        self.include_transaction = transaction;
        self
    }
}

/// Identity of an event on chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventPosition {
    pub block_number: u64,
    /// Index of the event within its block
    pub event_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMeta {
    pub block_number: u64,
    pub block_hash: Felt,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionMeta {
    pub transaction_hash: TransactionId,
    pub sender_address: Option<ChainAddress>,
}

/// An event as delivered by the log source, with its members decoded to JSON
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub position: EventPosition,
    pub transaction_hash: Option<TransactionId>,
    pub block: Option<BlockMeta>,
    pub transaction: Option<TransactionMeta>,
    pub parsed_args: Value,
}

/// Result of a historical fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventHistory {
    pub events: Vec<RawEvent>,
    pub error: Option<String>,
}

/// One item of a live history stream
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryUpdate {
    Event(RawEvent),
    Error(String),
}

#[derive(Clone)]
pub struct EventHistoryService {
    source: Arc<dyn EventLogSource>,
    dedup_window: u64,
}

impl EventHistoryService {
    pub fn new(source: Arc<dyn EventLogSource>) -> Self {
        Self {
            source,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }

    /// Sets how many blocks behind the highest seen block duplicates are still caught
    pub fn with_dedup_window(mut self, blocks: u64) -> Self {
        self.dedup_window = blocks;
        self
    }

    /// Fetches matching events from `filter.from_block`, in chain order
    pub async fn fetch(&self, filter: &EventFilter) -> EventHistory {
        fetch_from(self.source.as_ref(), filter).await
    }

    /// Historical events followed by newly announced ones
    ///
    /// The subscription is opened before the historical fetch so no event
    /// falls between the two.
    pub fn watch(&self, filter: EventFilter) -> BoxStream<'static, HistoryUpdate> {
        let live = self.source.subscribe(&filter);
        let source = Arc::clone(&self.source);
        let from_block = filter.from_block;
        let live_filter = filter.clone();

        let history = stream::once(async move { fetch_from(source.as_ref(), &filter).await })
            .flat_map(|history| {
                let mut updates: Vec<HistoryUpdate> =
                    history.events.into_iter().map(HistoryUpdate::Event).collect();
                updates.extend(history.error.map(HistoryUpdate::Error));
                stream::iter(updates)
            });

        let live = live.filter_map(move |item| {
            let update = match item {
                Ok(event) if event.position.block_number < from_block => None,
                Ok(event) => Some(HistoryUpdate::Event(strip_metadata(event, &live_filter))),
                Err(err) => {
                    warn!(error = %err, "event subscription error");
                    Some(HistoryUpdate::Error(err.to_string()))
                }
            };
            future::ready(update)
        });

        history
            .chain(live)
            .scan(SeenPositions::new(self.dedup_window), |seen, update| {
                let update = match update {
                    HistoryUpdate::Event(event) if !seen.insert(event.position) => {
                        debug!(position = ?event.position, "dropping duplicate event");
                        None
                    }
                    other => Some(other),
                };
                future::ready(Some(update))
            })
            .filter_map(future::ready)
            .boxed()
    }
}

/// Positions already delivered, kept for a trailing window of blocks
#[derive(Debug)]
struct SeenPositions {
    window: u64,
    highest: u64,
    positions: HashSet<EventPosition>,
}

impl SeenPositions {
    fn new(window: u64) -> Self {
        Self {
            window,
            highest: 0,
            positions: HashSet::new(),
        }
    }

    /// False when `position` was already delivered
    fn insert(&mut self, position: EventPosition) -> bool {
        if !self.positions.insert(position) {
            return false;
        }
        if position.block_number > self.highest {
            self.highest = position.block_number;
            let floor = self.highest.saturating_sub(self.window);
            self.positions.retain(|seen| seen.block_number >= floor);
        }
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.positions.len()
    }
}

async fn fetch_from(source: &dyn EventLogSource, filter: &EventFilter) -> EventHistory {
    match source.query(filter).await {
        Ok(events) => EventHistory {
            events: order_events(events, filter),
            error: None,
        },
        Err(err) => {
            warn!(event = %filter.event_name, from_block = filter.from_block, error = %err, "failed to fetch events");
            EventHistory {
                events: Vec::new(),
                error: Some(err.to_string()),
            }
        }
    }
}

fn order_events(events: Vec<RawEvent>, filter: &EventFilter) -> Vec<RawEvent> {
    let mut events: Vec<RawEvent> = events
        .into_iter()
        .filter(|event| event.position.block_number >= filter.from_block)
        .map(|event| strip_metadata(event, filter))
        .collect();
    events.sort_by_key(|event| event.position);
    events.dedup_by_key(|event| event.position);
    events
}

fn strip_metadata(mut event: RawEvent, filter: &EventFilter) -> RawEvent {
    if !filter.include_block {
        event.block = None;
    }
    if !filter.include_transaction {
        event.transaction = None;
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedSource {
        history: Result<Vec<RawEvent>, ProviderError>,
        live: Mutex<Option<mpsc::UnboundedReceiver<Result<RawEvent, ProviderError>>>>,
    }

    #[async_trait]
    impl EventLogSource for ScriptedSource {
        async fn query(&self, _filter: &EventFilter) -> Result<Vec<RawEvent>, ProviderError> {
            self.history.clone()
        }

        fn subscribe(
            &self,
            _filter: &EventFilter,
        ) -> BoxStream<'static, Result<RawEvent, ProviderError>> {
            match self.live.lock().unwrap().take() {
                Some(receiver) => receiver.boxed(),
                None => stream::empty().boxed(),
            }
        }
    }

    fn event(block_number: u64, event_index: u64) -> RawEvent {
        RawEvent {
            position: EventPosition {
                block_number,
                event_index,
            },
            transaction_hash: Some(Felt::from(block_number)),
            block: Some(BlockMeta {
                block_number,
                block_hash: Felt::ONE,
                timestamp: 0,
            }),
            transaction: None,
            parsed_args: json!({}),
        }
    }

    fn filter(from_block: u64) -> EventFilter {
        EventFilter::new(Felt::ONE, "CounterChanged", from_block).with_metadata(true, true)
    }

    fn positions(events: &[RawEvent]) -> Vec<(u64, u64)> {
        events
            .iter()
            .map(|e| (e.position.block_number, e.position.event_index))
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_orders_by_block_then_index() {
        let source = ScriptedSource {
            history: Ok(vec![event(5, 1), event(2, 0), event(5, 0), event(2, 0)]),
            live: Mutex::new(None),
        };
        let service = EventHistoryService::new(Arc::new(source));
        let history = service.fetch(&filter(0)).await;
        assert_eq!(positions(&history.events), vec![(2, 0), (5, 0), (5, 1)]);
        assert_eq!(history.error, None);
    }

    #[tokio::test]
    async fn test_fetch_respects_from_block_and_metadata_flags() {
        let source = ScriptedSource {
            history: Ok(vec![event(1, 0), event(3, 0)]),
            live: Mutex::new(None),
        };
        let service = EventHistoryService::new(Arc::new(source));
        let history = service
            .fetch(&EventFilter::new(Felt::ONE, "CounterChanged", 2))
            .await;
        assert_eq!(positions(&history.events), vec![(3, 0)]);
        assert_eq!(history.events[0].block, None);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_empty_with_error() {
        let source = ScriptedSource {
            history: Err(ProviderError::Rpc("connection refused".to_string())),
            live: Mutex::new(None),
        };
        let service = EventHistoryService::new(Arc::new(source));
        let history = service.fetch(&filter(0)).await;
        assert!(history.events.is_empty());
        assert_eq!(history.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_watch_appends_live_events_and_drops_duplicates() {
        let (sender, receiver) = mpsc::unbounded();
        let source = ScriptedSource {
            history: Ok(vec![event(1, 0), event(2, 0)]),
            live: Mutex::new(Some(receiver)),
        };
        let service = EventHistoryService::new(Arc::new(source));
        let stream = service.watch(filter(0));

        sender.unbounded_send(Ok(event(2, 0))).unwrap();
        sender.unbounded_send(Ok(event(3, 0))).unwrap();
        sender.unbounded_send(Ok(event(3, 0))).unwrap();
        sender.unbounded_send(Ok(event(4, 2))).unwrap();
        drop(sender);

        let updates: Vec<HistoryUpdate> = stream.collect().await;
        let events: Vec<RawEvent> = updates
            .into_iter()
            .map(|update| match update {
                HistoryUpdate::Event(event) => event,
                HistoryUpdate::Error(err) => panic!("unexpected error {err}"),
            })
            .collect();
        assert_eq!(positions(&events), vec![(1, 0), (2, 0), (3, 0), (4, 2)]);
    }

    #[tokio::test]
    async fn test_watch_continues_after_fetch_failure() {
        let (sender, receiver) = mpsc::unbounded();
        let source = ScriptedSource {
            history: Err(ProviderError::Rpc("timeout".to_string())),
            live: Mutex::new(Some(receiver)),
        };
        let service = EventHistoryService::new(Arc::new(source));
        let stream = service.watch(filter(0));

        sender.unbounded_send(Ok(event(7, 0))).unwrap();
        drop(sender);

        let updates: Vec<HistoryUpdate> = stream.collect().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], HistoryUpdate::Error("timeout".to_string()));
        assert!(matches!(&updates[1], HistoryUpdate::Event(e) if e.position.block_number == 7));
    }

    #[tokio::test]
    async fn test_watch_skips_live_events_before_from_block() {
        let (sender, receiver) = mpsc::unbounded();
        let source = ScriptedSource {
            history: Ok(vec![]),
            live: Mutex::new(Some(receiver)),
        };
        let service = EventHistoryService::new(Arc::new(source));
        let stream = service.watch(filter(10));

        sender.unbounded_send(Ok(event(9, 0))).unwrap();
        sender.unbounded_send(Ok(event(10, 0))).unwrap();
        sender
            .unbounded_send(Err(ProviderError::SubscriptionClosed))
            .unwrap();
        drop(sender);

        let updates: Vec<HistoryUpdate> = stream.collect().await;
        assert_eq!(updates.len(), 2);
        assert!(matches!(&updates[0], HistoryUpdate::Event(e) if e.position.block_number == 10));
        assert_eq!(
            updates[1],
            HistoryUpdate::Error("Event subscription closed".to_string())
        );
    }

    fn position(block_number: u64, event_index: u64) -> EventPosition {
        EventPosition {
            block_number,
            event_index,
        }
    }

    #[test]
    fn test_seen_positions_stay_within_window() {
        let mut seen = SeenPositions::new(2);
        assert!(seen.insert(position(1, 0)));
        assert!(seen.insert(position(1, 1)));
        assert!(!seen.insert(position(1, 0)));

        for block in 2..100 {
            assert!(seen.insert(position(block, 0)));
        }
        // blocks 97, 98 and 99 remain
        assert_eq!(seen.len(), 3);
        assert!(!seen.insert(position(98, 0)));
        assert!(seen.insert(position(98, 1)));
    }

    #[tokio::test]
    async fn test_watch_drops_reannouncement_inside_window() {
        let (sender, receiver) = mpsc::unbounded();
        let source = ScriptedSource {
            history: Ok(vec![event(10, 0)]),
            live: Mutex::new(Some(receiver)),
        };
        let service = EventHistoryService::new(Arc::new(source)).with_dedup_window(4);
        let stream = service.watch(filter(0));

        sender.unbounded_send(Ok(event(12, 0))).unwrap();
        sender.unbounded_send(Ok(event(10, 0))).unwrap();
        sender.unbounded_send(Ok(event(13, 0))).unwrap();
        drop(sender);

        let updates: Vec<HistoryUpdate> = stream.collect().await;
        let blocks: Vec<u64> = updates
            .iter()
            .filter_map(|update| match update {
                HistoryUpdate::Event(event) => Some(event.position.block_number),
                HistoryUpdate::Error(_) => None,
            })
            .collect();
        assert_eq!(blocks, vec![10, 12, 13]);
    }
}
