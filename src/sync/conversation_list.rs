use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, watch};

use crate::domain::{conversation::Conversation, events::FeedEvent};

use super::{
    backoff::BackoffPolicy,
    contracts::{RemoteStore, RemoteStoreError, SubscribeScope, SyncSubscription},
    controller::{ScopePhase, StatusError, SyncStatus},
};

const FETCH_FAILED: &str = "CONVLIST_FETCH_FAILED";
const SUBSCRIBE_FAILED: &str = "CONVLIST_SUBSCRIBE_FAILED";
const CHANNEL_CLOSED: &str = "CONVLIST_CHANNEL_CLOSED";
const LIVE_UPDATES_UNAVAILABLE: &str = "CONVLIST_LIVE_UPDATES_UNAVAILABLE";

enum Command {
    Refresh,
    FetchResolved {
        result: Result<Vec<Conversation>, RemoteStoreError>,
    },
    SubscribeResolved {
        generation: u64,
        result: Result<(SyncSubscription, mpsc::Receiver<FeedEvent>), RemoteStoreError>,
    },
    Feed { generation: u64, event: FeedEvent },
    ResubscribeDue,
    Close,
}

/// Conversation-list scope: any change notification on the conversation
/// table re-runs the full list query. A deliberate simplification for small
/// lists; messages use the incremental merge path instead.
pub struct ConversationListController {
    command_tx: mpsc::UnboundedSender<Command>,
    conversations_rx: watch::Receiver<Vec<Conversation>>,
    status_rx: watch::Receiver<SyncStatus>,
    closed: Arc<AtomicBool>,
}

impl ConversationListController {
    pub fn open(store: Arc<dyn RemoteStore>, backoff: BackoffPolicy) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (conversations_tx, conversations_rx) = watch::channel(Vec::new());
        let (status_tx, status_rx) = watch::channel(SyncStatus {
            phase: ScopePhase::Subscribing,
            live_updates_available: true,
            last_error: None,
        });
        let closed = Arc::new(AtomicBool::new(false));

        let actor = ListActor {
            store,
            backoff,
            closed: closed.clone(),
            command_tx: command_tx.clone(),
            conversations_tx,
            status_tx,
            conversations: Vec::new(),
            status: SyncStatus {
                phase: ScopePhase::Subscribing,
                live_updates_available: true,
                last_error: None,
            },
            subscription: None,
            generation: 0,
            subscribe_in_flight: false,
            resubscribe_pending: false,
            resubscribe_attempt: 0,
            fetch_in_flight: false,
            refetch_queued: false,
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            command_tx,
            conversations_rx,
            status_rx,
            closed,
        }
    }

    /// Read-only reconciled list, descending by most recent activity.
    pub fn conversations(&self) -> watch::Receiver<Vec<Conversation>> {
        self.conversations_rx.clone()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    pub fn refresh(&self) {
        let _ = self.command_tx.send(Command::Refresh);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(Command::Close);
    }
}

impl Drop for ConversationListController {
    fn drop(&mut self) {
        self.close();
    }
}

struct ListActor {
    store: Arc<dyn RemoteStore>,
    backoff: BackoffPolicy,
    closed: Arc<AtomicBool>,
    command_tx: mpsc::UnboundedSender<Command>,
    conversations_tx: watch::Sender<Vec<Conversation>>,
    status_tx: watch::Sender<SyncStatus>,
    conversations: Vec<Conversation>,
    status: SyncStatus,
    subscription: Option<SyncSubscription>,
    generation: u64,
    subscribe_in_flight: bool,
    resubscribe_pending: bool,
    resubscribe_attempt: u32,
    fetch_in_flight: bool,
    /// A change notification arrived while a fetch was already running;
    /// fetch again once it resolves so the newest state is not missed.
    refetch_queued: bool,
}

impl ListActor {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        self.start_subscribe();
        self.start_fetch();

        while let Some(command) = command_rx.recv().await {
            if let Command::Close = command {
                self.shutdown().await;
                break;
            }
            if self.closed.load(Ordering::SeqCst) {
                continue;
            }
            self.handle(command);
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Refresh => self.request_fetch(),
            Command::FetchResolved { result } => self.handle_fetch_resolved(result),
            Command::SubscribeResolved { generation, result } => {
                self.handle_subscribe_resolved(generation, result)
            }
            Command::Feed { generation, event } => self.handle_feed(generation, event),
            Command::ResubscribeDue => {
                self.resubscribe_pending = false;
                self.start_subscribe();
            }
            Command::Close => unreachable!("close is handled by the run loop"),
        }
    }

    fn handle_fetch_resolved(&mut self, result: Result<Vec<Conversation>, RemoteStoreError>) {
        self.fetch_in_flight = false;
        match result {
            Ok(fetched) => {
                self.merge(fetched);
                self.status.last_error = None;
                let _ = self.conversations_tx.send(self.conversations.clone());
                self.publish_status();
            }
            Err(error) => {
                tracing::warn!(code = FETCH_FAILED, error = %error, "conversation list fetch failed");
                self.status.last_error = Some(StatusError::now(FETCH_FAILED));
                self.publish_status();
            }
        }

        if self.refetch_queued {
            self.refetch_queued = false;
            self.start_fetch();
        }
    }

    /// A refetch is authoritative for membership and ordering, but the
    /// denormalized last-message projection never moves backwards.
    fn merge(&mut self, fetched: Vec<Conversation>) {
        let mut next = Vec::with_capacity(fetched.len());
        for incoming in fetched {
            match self
                .conversations
                .iter()
                .find(|known| known.id == incoming.id)
            {
                Some(known) => {
                    let mut merged = known.clone();
                    merged.absorb_projection(incoming);
                    next.push(merged);
                }
                None => next.push(incoming),
            }
        }
        next.sort_by_key(|conversation| std::cmp::Reverse(conversation.activity_at_unix_ms()));
        self.conversations = next;
    }

    fn handle_subscribe_resolved(
        &mut self,
        generation: u64,
        result: Result<(SyncSubscription, mpsc::Receiver<FeedEvent>), RemoteStoreError>,
    ) {
        if generation != self.generation {
            return;
        }
        self.subscribe_in_flight = false;
        match result {
            Ok((handle, mut events)) => {
                self.subscription = Some(handle);
                self.resubscribe_attempt = 0;
                if !self.status.live_updates_available {
                    self.status.live_updates_available = true;
                    self.publish_status();
                }

                let command_tx = self.command_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        if command_tx
                            .send(Command::Feed { generation, event })
                            .is_err()
                        {
                            return;
                        }
                    }
                    let _ = command_tx.send(Command::Feed {
                        generation,
                        event: FeedEvent::Closed {
                            reason: "event channel ended".to_owned(),
                        },
                    });
                });
            }
            Err(error) => {
                tracing::warn!(
                    code = SUBSCRIBE_FAILED,
                    attempt = self.resubscribe_attempt,
                    error = %error,
                    "conversation list subscribe failed"
                );
                self.schedule_resubscribe();
            }
        }
    }

    fn handle_feed(&mut self, generation: u64, event: FeedEvent) {
        if generation != self.generation {
            return;
        }

        match event {
            FeedEvent::Closed { reason } => {
                tracing::warn!(
                    code = CHANNEL_CLOSED,
                    reason = %reason,
                    "conversation list channel closed"
                );
                self.subscription = None;
                if !self.subscribe_in_flight && !self.resubscribe_pending {
                    self.schedule_resubscribe();
                }
            }
            _ => {
                // Any table change invalidates the whole list.
                if self.status.phase == ScopePhase::Subscribing {
                    self.status.phase = ScopePhase::Live;
                    self.publish_status();
                }
                self.request_fetch();
            }
        }
    }

    fn request_fetch(&mut self) {
        if self.fetch_in_flight {
            self.refetch_queued = true;
            return;
        }
        self.start_fetch();
    }

    fn start_fetch(&mut self) {
        self.fetch_in_flight = true;
        let store = self.store.clone();
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = store.list_conversations().await;
            let _ = command_tx.send(Command::FetchResolved { result });
        });
    }

    fn start_subscribe(&mut self) {
        self.generation += 1;
        self.subscribe_in_flight = true;
        let generation = self.generation;
        let store = self.store.clone();
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = store.subscribe(SubscribeScope::Conversations).await;
            let _ = command_tx.send(Command::SubscribeResolved { generation, result });
        });
    }

    fn schedule_resubscribe(&mut self) {
        self.resubscribe_attempt += 1;
        if self.backoff.exhausted(self.resubscribe_attempt) {
            tracing::warn!(
                code = LIVE_UPDATES_UNAVAILABLE,
                attempts = self.resubscribe_attempt,
                "re-subscribe attempts exhausted; manual refresh only"
            );
            self.status.live_updates_available = false;
            self.publish_status();
            return;
        }

        self.resubscribe_pending = true;
        let delay = self.backoff.delay(self.resubscribe_attempt);
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = command_tx.send(Command::ResubscribeDue);
        });
    }

    async fn shutdown(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.store.unsubscribe(handle).await;
        }
        self.status.phase = ScopePhase::Closed;
        let _ = self.status_tx.send(self.status.clone());
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(self.status.clone());
    }
}
