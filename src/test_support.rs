//! Shared test doubles: a scriptable in-memory backend plus entity builders.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use crate::domain::{
    clock,
    conversation::Conversation,
    events::FeedEvent,
    message::{Message, MessageId, SendStatus},
    participant::Participant,
};
use crate::sync::contracts::{
    AuthProvider, MessageDraft, Notifier, NotifyError, RemoteStore, RemoteStoreError,
    SubscribeScope, SyncSubscription,
};

pub fn confirmed_message(id: &str, conversation_id: &str, at: i64) -> Message {
    Message {
        id: MessageId::Confirmed(id.to_owned()),
        conversation_id: conversation_id.to_owned(),
        sender_id: "u1".to_owned(),
        recipient_phone: None,
        content: format!("msg-{id}"),
        status: SendStatus::Sent,
        created_at_unix_ms: at,
    }
}

pub fn conversation_with_activity(id: &str, last_message_at: i64) -> Conversation {
    Conversation {
        id: id.to_owned(),
        title: None,
        participants: vec![Participant {
            id: format!("{id}-p1"),
            name: "Ada".to_owned(),
            phone: "+15550100".to_owned(),
            avatar_url: None,
        }],
        last_message: Some("hello".to_owned()),
        last_message_at_unix_ms: Some(last_message_at),
        created_at_unix_ms: 500,
        updated_at_unix_ms: last_message_at,
    }
}

/// Scriptable in-memory backend. Results are queued per operation; an empty
/// queue yields a benign default (empty list, or a confirmation built from
/// the draft). Optional semaphore gates hold an operation until the test
/// releases a permit, making intermediate states observable.
#[derive(Debug, Default)]
pub struct StubStore {
    list_results: Mutex<VecDeque<Result<Vec<Message>, RemoteStoreError>>>,
    insert_results: Mutex<VecDeque<Result<Message, RemoteStoreError>>>,
    conversations_results: Mutex<VecDeque<Result<Vec<Conversation>, RemoteStoreError>>>,
    feed_senders: Mutex<Vec<mpsc::Sender<FeedEvent>>>,
    insert_gate: Mutex<Option<Arc<Semaphore>>>,
    list_gate: Mutex<Option<Arc<Semaphore>>>,
    subscribe_should_fail: AtomicBool,
    subscribe_count: AtomicUsize,
    list_conversations_count: AtomicUsize,
    insert_seq: AtomicUsize,
}

impl StubStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_list_result(&self, result: Result<Vec<Message>, RemoteStoreError>) {
        self.list_results
            .lock()
            .expect("list results lock")
            .push_back(result);
    }

    pub fn push_insert_result(&self, result: Result<Message, RemoteStoreError>) {
        self.insert_results
            .lock()
            .expect("insert results lock")
            .push_back(result);
    }

    pub fn push_conversations_result(&self, result: Result<Vec<Conversation>, RemoteStoreError>) {
        self.conversations_results
            .lock()
            .expect("conversations results lock")
            .push_back(result);
    }

    /// Holds every `insert_message` until a permit is added.
    pub fn gate_inserts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.insert_gate.lock().expect("insert gate lock") = Some(gate.clone());
        gate
    }

    /// Holds every `list_messages` until a permit is added.
    pub fn gate_lists(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.list_gate.lock().expect("list gate lock") = Some(gate.clone());
        gate
    }

    pub fn fail_subscribes(&self) {
        self.subscribe_should_fail.store(true, Ordering::SeqCst);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    pub fn list_conversations_count(&self) -> usize {
        self.list_conversations_count.load(Ordering::SeqCst)
    }

    /// Sender feeding the most recent subscription. Waits until one exists.
    pub async fn feed_sender(&self) -> mpsc::Sender<FeedEvent> {
        loop {
            if let Some(sender) = self
                .feed_senders
                .lock()
                .expect("feed senders lock")
                .last()
                .cloned()
            {
                return sender;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn wait_gate(gate: Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate should stay open");
            permit.forget();
        }
    }
}

#[async_trait]
impl RemoteStore for StubStore {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, RemoteStoreError> {
        self.list_conversations_count.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .conversations_results
            .lock()
            .expect("conversations results lock")
            .pop_front();
        scripted.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn list_messages(
        &self,
        _conversation_id: &str,
        _limit: usize,
    ) -> Result<Vec<Message>, RemoteStoreError> {
        let gate = self.list_gate.lock().expect("list gate lock").clone();
        Self::wait_gate(gate).await;

        let scripted = self
            .list_results
            .lock()
            .expect("list results lock")
            .pop_front();
        scripted.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn insert_message(&self, draft: MessageDraft) -> Result<Message, RemoteStoreError> {
        let gate = self.insert_gate.lock().expect("insert gate lock").clone();
        Self::wait_gate(gate).await;

        let scripted = self
            .insert_results
            .lock()
            .expect("insert results lock")
            .pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let sequence = self.insert_seq.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(Message {
                    id: MessageId::Confirmed(format!("srv-{sequence}")),
                    conversation_id: draft.conversation_id,
                    sender_id: draft.sender_id,
                    recipient_phone: draft.recipient_phone,
                    content: draft.content,
                    status: SendStatus::Sent,
                    created_at_unix_ms: clock::now_unix_ms(),
                })
            }
        }
    }

    async fn subscribe(
        &self,
        _scope: SubscribeScope,
    ) -> Result<(SyncSubscription, mpsc::Receiver<FeedEvent>), RemoteStoreError> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        if self.subscribe_should_fail.load(Ordering::SeqCst) {
            return Err(RemoteStoreError::Unavailable(
                "stub subscribe disabled".to_owned(),
            ));
        }

        let (sender, receiver) = mpsc::channel(32);
        self.feed_senders
            .lock()
            .expect("feed senders lock")
            .push(sender);
        Ok((SyncSubscription::inert(), receiver))
    }

    async fn unsubscribe(&self, handle: SyncSubscription) {
        drop(handle);
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubAuth {
    user: Option<String>,
}

impl StubAuth {
    pub fn user(id: &str) -> Self {
        Self {
            user: Some(id.to_owned()),
        }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl AuthProvider for StubAuth {
    async fn current_user(&self) -> Result<Option<String>, RemoteStoreError> {
        Ok(self.user.clone())
    }
}

#[derive(Debug, Default)]
pub struct StubNotifier {
    dispatched: Mutex<Vec<Message>>,
    fail: bool,
}

impl StubNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            dispatched: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn dispatched(&self) -> Vec<Message> {
        self.dispatched.lock().expect("dispatched lock").clone()
    }
}

#[async_trait]
impl Notifier for StubNotifier {
    async fn dispatch(&self, message: &Message) -> Result<(), NotifyError> {
        self.dispatched
            .lock()
            .expect("dispatched lock")
            .push(message.clone());
        if self.fail {
            return Err(NotifyError::Rejected { status: 502 });
        }
        Ok(())
    }
}
