use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::domain::{
    clock,
    events::{ChangeEvent, FeedEvent},
    message::{Message, MessageId},
};

use super::{
    backoff::BackoffPolicy,
    contracts::{
        normalized_page_size, AuthProvider, MessageDraft, Notifier, RemoteStore, RemoteStoreError,
        SubscribeScope, SyncSubscription,
    },
    outbox::{Outbox, SendError},
    reconciler::Reconciler,
};

const INITIAL_FETCH_FAILED: &str = "SYNC_INITIAL_FETCH_FAILED";
const REFRESH_FAILED: &str = "SYNC_REFRESH_FAILED";
const SUBSCRIBE_FAILED: &str = "SYNC_SUBSCRIBE_FAILED";
const CHANNEL_CLOSED: &str = "SYNC_CHANNEL_CLOSED";
const LIVE_UPDATES_UNAVAILABLE: &str = "SYNC_LIVE_UPDATES_UNAVAILABLE";
const INSERT_FAILED: &str = "SYNC_INSERT_FAILED";
const RETRY_REJECTED: &str = "SYNC_RETRY_REJECTED";
const NOTIFY_DISPATCH_FAILED: &str = "SYNC_NOTIFY_DISPATCH_FAILED";
const EVENT_BUFFER_OVERFLOW: &str = "SYNC_EVENT_BUFFER_OVERFLOW";

/// Events buffered while a fetch is in flight. Beyond this the oldest are
/// dropped; the next successful fetch restores consistency anyway.
const MAX_BUFFERED_EVENTS: usize = 256;

/// Lifecycle of one conversation scope. `Closed` is terminal; reopening
/// requires a new controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePhase {
    Idle,
    Subscribing,
    Live,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub code: String,
    pub at_unix_ms: i64,
}

impl StatusError {
    pub(crate) fn now(code: &str) -> Self {
        Self {
            code: code.to_owned(),
            at_unix_ms: clock::now_unix_ms(),
        }
    }
}

/// Non-fatal health snapshot exposed to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub phase: ScopePhase,
    /// False once re-subscribe attempts are exhausted; manual refresh still
    /// works.
    pub live_updates_available: bool,
    pub last_error: Option<StatusError>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: ScopePhase::Idle,
            live_updates_available: true,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScopeConfig {
    pub page_size: usize,
    pub backoff: BackoffPolicy,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            backoff: BackoffPolicy::default(),
        }
    }
}

enum Command {
    Send { temp_id: Uuid, draft: MessageDraft },
    Retry { temp_id: Uuid },
    Refresh,
    InsertResolved {
        temp_id: Uuid,
        result: Result<Message, RemoteStoreError>,
    },
    FetchResolved {
        result: Result<Vec<Message>, RemoteStoreError>,
    },
    SubscribeResolved {
        generation: u64,
        result: Result<(SyncSubscription, mpsc::Receiver<FeedEvent>), RemoteStoreError>,
    },
    Feed { generation: u64, event: FeedEvent },
    ResubscribeDue,
    Close,
}

/// Per-conversation sync scope: owns the subscription handle, serializes
/// every reconciler/outbox mutation on one actor task, and exposes the
/// reconciled sequence and a status snapshot as read-only watch channels.
pub struct SyncController {
    conversation_id: String,
    sender_id: Option<String>,
    command_tx: mpsc::UnboundedSender<Command>,
    messages_rx: watch::Receiver<Vec<Message>>,
    status_rx: watch::Receiver<SyncStatus>,
    closed: Arc<AtomicBool>,
}

impl SyncController {
    /// Opens a scope: resolves the sending identity once, then starts the
    /// actor which subscribes, fetches, and goes live. Backend failures
    /// during open are non-fatal and surface through the status channel.
    pub async fn open(
        store: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        notifier: Arc<dyn Notifier>,
        config: ScopeConfig,
        conversation_id: impl Into<String>,
    ) -> Self {
        let conversation_id = conversation_id.into();
        let sender_id = match auth.current_user().await {
            Ok(user) => user,
            Err(error) => {
                tracing::warn!(error = %error, "current user lookup failed; sends disabled");
                None
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = watch::channel(Vec::new());
        let (status_tx, status_rx) = watch::channel(SyncStatus {
            phase: ScopePhase::Subscribing,
            live_updates_available: true,
            last_error: None,
        });
        let closed = Arc::new(AtomicBool::new(false));

        let actor = ScopeActor {
            store,
            notifier,
            config,
            conversation_id: conversation_id.clone(),
            closed: closed.clone(),
            command_tx: command_tx.clone(),
            messages_tx,
            status_tx,
            reconciler: Reconciler::new(),
            outbox: Outbox::new(),
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
            synced_once: false,
            buffer: Vec::new(),
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            conversation_id,
            sender_id,
            command_tx,
            messages_rx,
            status_rx,
            closed,
        }
    }

    /// Read-only reconciled sequence.
    pub fn messages(&self) -> watch::Receiver<Vec<Message>> {
        self.messages_rx.clone()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    #[allow(dead_code)]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Optimistic send. Validation is synchronous; the provisional entry
    /// becomes visible through the message channel, then transitions to
    /// sent or failed as the remote insert resolves.
    pub fn send(
        &self,
        recipient_phone: Option<String>,
        content: &str,
    ) -> Result<MessageId, SendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SendError::ScopeClosed);
        }
        if content.trim().is_empty() {
            return Err(SendError::EmptyContent);
        }
        let Some(sender_id) = self.sender_id.clone() else {
            return Err(SendError::NotAuthenticated);
        };

        let temp_id = Uuid::new_v4();
        let draft = MessageDraft {
            conversation_id: self.conversation_id.clone(),
            sender_id,
            recipient_phone,
            content: content.to_owned(),
        };
        self.command_tx
            .send(Command::Send { temp_id, draft })
            .map_err(|_| SendError::ScopeClosed)?;
        Ok(MessageId::Provisional(temp_id))
    }

    /// Re-attempts a failed send with its original content.
    pub fn retry(&self, temp_id: Uuid) -> Result<(), SendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SendError::ScopeClosed);
        }
        self.command_tx
            .send(Command::Retry { temp_id })
            .map_err(|_| SendError::ScopeClosed)
    }

    /// Manual refetch; also the fallback once live updates are unavailable.
    pub fn refresh(&self) {
        let _ = self.command_tx.send(Command::Refresh);
    }

    /// Closes the scope. After this returns no delivered event mutates the
    /// observable sequence; the phase transition to `Closed` is the only
    /// remaining status update.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(Command::Close);
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.close();
    }
}

struct ScopeActor {
    store: Arc<dyn RemoteStore>,
    notifier: Arc<dyn Notifier>,
    config: ScopeConfig,
    conversation_id: String,
    closed: Arc<AtomicBool>,
    command_tx: mpsc::UnboundedSender<Command>,
    messages_tx: watch::Sender<Vec<Message>>,
    status_tx: watch::Sender<SyncStatus>,
    reconciler: Reconciler,
    outbox: Outbox,
    status: SyncStatus,
    subscription: Option<SyncSubscription>,
    /// Bumped per subscribe attempt; feed events from older generations are
    /// stale and dropped.
    generation: u64,
    subscribe_in_flight: bool,
    resubscribe_pending: bool,
    resubscribe_attempt: u32,
    fetch_in_flight: bool,
    /// Whether `replace_all` has completed at least once.
    synced_once: bool,
    /// Events held back while a fetch is in flight, applied after
    /// `replace_all` so a late fetch cannot overwrite them.
    buffer: Vec<ChangeEvent>,
}

impl ScopeActor {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        self.start_subscribe();
        self.start_fetch();

        while let Some(command) = command_rx.recv().await {
            if let Command::Close = command {
                self.shutdown().await;
                break;
            }
            if self.closed.load(Ordering::SeqCst) {
                // Scope is closing; delivered events must not mutate state.
                continue;
            }
            self.handle(command);
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Send { temp_id, draft } => self.handle_send(temp_id, draft),
            Command::Retry { temp_id } => self.handle_retry(temp_id),
            Command::Refresh => self.handle_refresh(),
            Command::InsertResolved { temp_id, result } => {
                self.handle_insert_resolved(temp_id, result)
            }
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

    fn handle_send(&mut self, temp_id: Uuid, draft: MessageDraft) {
        match self.outbox.begin(temp_id, draft, clock::now_unix_ms()) {
            Ok(provisional) => {
                // The outbox trimmed the content; insert what will be shown.
                let draft = MessageDraft {
                    conversation_id: provisional.conversation_id.clone(),
                    sender_id: provisional.sender_id.clone(),
                    recipient_phone: provisional.recipient_phone.clone(),
                    content: provisional.content.clone(),
                };
                self.reconciler
                    .apply_change(ChangeEvent::Inserted(provisional));
                self.publish_messages();
                self.start_insert(temp_id, draft);
            }
            Err(error) => {
                // The controller already validated; only a raced caller
                // bypassing it lands here.
                tracing::warn!(error = %error, "send command rejected by outbox");
            }
        }
    }

    fn handle_retry(&mut self, temp_id: Uuid) {
        match self.outbox.begin_retry(&temp_id) {
            Ok(draft) => {
                self.reconciler.mark_pending(&temp_id);
                self.publish_messages();
                self.start_insert(temp_id, draft);
            }
            Err(error) => {
                tracing::warn!(
                    code = RETRY_REJECTED,
                    temp_id = %temp_id,
                    error = %error,
                    "retry rejected"
                );
            }
        }
    }

    fn handle_refresh(&mut self) {
        if self.fetch_in_flight {
            tracing::debug!("refresh coalesced into in-flight fetch");
            return;
        }
        self.start_fetch();
    }

    fn handle_insert_resolved(&mut self, temp_id: Uuid, result: Result<Message, RemoteStoreError>) {
        match result {
            Ok(confirmed) => {
                self.outbox.complete(&temp_id);
                self.reconciler.confirm(&temp_id, confirmed.clone());
                self.publish_messages();
                self.dispatch_notification(confirmed);
            }
            Err(error) => {
                tracing::warn!(
                    code = INSERT_FAILED,
                    temp_id = %temp_id,
                    error = %error,
                    "remote insert failed; entry marked for retry"
                );
                self.outbox.mark_failed(&temp_id);
                self.reconciler.mark_failed(&temp_id);
                self.publish_messages();
            }
        }
    }

    fn handle_fetch_resolved(&mut self, result: Result<Vec<Message>, RemoteStoreError>) {
        self.fetch_in_flight = false;
        match result {
            Ok(messages) => {
                self.reconciler.replace_all(messages);
                let had_buffered = self.drain_buffer();
                self.synced_once = true;
                self.status.last_error = None;
                if had_buffered {
                    self.enter_live();
                }
                self.publish_messages();
                self.publish_status();
            }
            Err(error) => {
                let code = if self.synced_once {
                    REFRESH_FAILED
                } else {
                    INITIAL_FETCH_FAILED
                };
                tracing::warn!(code, error = %error, "message fetch failed");
                self.status.last_error = Some(StatusError::now(code));
                if self.synced_once {
                    // We still have a consistent base; replay what arrived
                    // while the failed fetch was in flight.
                    if self.drain_buffer() {
                        self.publish_messages();
                    }
                }
                self.publish_status();
            }
        }
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
                    "subscribe attempt failed"
                );
                self.schedule_resubscribe();
            }
        }
    }

    fn handle_feed(&mut self, generation: u64, event: FeedEvent) {
        if generation != self.generation {
            // Event from a superseded subscription handle.
            return;
        }

        match event {
            FeedEvent::Message(change) => {
                if self.fetch_in_flight || !self.synced_once {
                    tracing::debug!(change = change.kind(), "change buffered during fetch");
                    self.buffer_event(change);
                    return;
                }
                tracing::debug!(change = change.kind(), "live change applied");
                let changed = self.reconciler.apply_change(change);
                self.enter_live();
                if changed {
                    self.publish_messages();
                }
                self.publish_status();
            }
            FeedEvent::ConversationsTouched => {
                tracing::debug!("conversation-table event ignored by message scope");
            }
            FeedEvent::Closed { reason } => {
                tracing::warn!(
                    code = CHANNEL_CLOSED,
                    reason = %reason,
                    "subscription channel closed"
                );
                self.subscription = None;
                if !self.subscribe_in_flight && !self.resubscribe_pending {
                    self.schedule_resubscribe();
                }
            }
        }
    }

    fn start_subscribe(&mut self) {
        self.generation += 1;
        self.subscribe_in_flight = true;
        let generation = self.generation;
        let store = self.store.clone();
        let scope = SubscribeScope::ConversationMessages {
            conversation_id: self.conversation_id.clone(),
        };
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = store.subscribe(scope).await;
            let _ = command_tx.send(Command::SubscribeResolved { generation, result });
        });
    }

    fn start_fetch(&mut self) {
        self.fetch_in_flight = true;
        let store = self.store.clone();
        let conversation_id = self.conversation_id.clone();
        let limit = normalized_page_size(self.config.page_size);
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = store.list_messages(&conversation_id, limit).await;
            let _ = command_tx.send(Command::FetchResolved { result });
        });
    }

    fn start_insert(&mut self, temp_id: Uuid, draft: MessageDraft) {
        let store = self.store.clone();
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = store.insert_message(draft).await;
            let _ = command_tx.send(Command::InsertResolved { temp_id, result });
        });
    }

    /// Fire-and-forget outbound notification. A failed dispatch never rolls
    /// the message back; it stays sent.
    fn dispatch_notification(&self, message: Message) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(error) = notifier.dispatch(&message).await {
                tracing::warn!(
                    code = NOTIFY_DISPATCH_FAILED,
                    message_id = %message.id,
                    error = %error,
                    "outbound notification dispatch failed; message stays sent"
                );
            }
        });
    }

    fn schedule_resubscribe(&mut self) {
        self.resubscribe_attempt += 1;
        if self.config.backoff.exhausted(self.resubscribe_attempt) {
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
        let delay = self.config.backoff.delay(self.resubscribe_attempt);
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = command_tx.send(Command::ResubscribeDue);
        });
    }

    fn buffer_event(&mut self, change: ChangeEvent) {
        if self.buffer.len() >= MAX_BUFFERED_EVENTS {
            tracing::warn!(
                code = EVENT_BUFFER_OVERFLOW,
                "event buffer full; dropping oldest"
            );
            self.buffer.remove(0);
        }
        self.buffer.push(change);
    }

    /// Applies buffered events in delivery order. Returns whether any were
    /// applied.
    fn drain_buffer(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        for change in std::mem::take(&mut self.buffer) {
            self.reconciler.apply_change(change);
        }
        true
    }

    /// First successful event delivery moves the scope live.
    fn enter_live(&mut self) {
        if self.status.phase == ScopePhase::Subscribing {
            self.status.phase = ScopePhase::Live;
        }
    }

    async fn shutdown(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.store.unsubscribe(handle).await;
        }
        self.status.phase = ScopePhase::Closed;
        let _ = self.status_tx.send(self.status.clone());
    }

    fn publish_messages(&self) {
        let _ = self.messages_tx.send(self.reconciler.messages().to_vec());
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(self.status.clone());
    }
}
