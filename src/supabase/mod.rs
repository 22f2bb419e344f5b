//! Supabase integration layer: REST queries/inserts, realtime change feed,
//! auth lookup, and the SMS webhook, bound together behind the sync seams.

mod auth;
pub mod notify;
mod realtime;
mod rest;
mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{conversation::Conversation, events::FeedEvent, message::Message};
use crate::infra::{config::BackendConfig, error::AppError};
use crate::sync::contracts::{
    AuthProvider, MessageDraft, RemoteStore, RemoteStoreError, SubscribeScope, SyncSubscription,
};

use realtime::RealtimeClient;
use rest::RestClient;

/// Backend adapter: one REST client plus a realtime endpoint, shared by all
/// scopes opened against it.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    rest: RestClient,
    realtime: RealtimeClient,
}

impl SupabaseStore {
    pub fn new(config: &BackendConfig) -> Result<Self, AppError> {
        let rest = RestClient::new(config)?;
        let realtime = RealtimeClient::new(rest.base_url(), rest.anon_key());
        Ok(Self { rest, realtime })
    }
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, RemoteStoreError> {
        self.rest.list_conversations().await
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, RemoteStoreError> {
        self.rest.list_messages(conversation_id, limit).await
    }

    async fn insert_message(&self, draft: MessageDraft) -> Result<Message, RemoteStoreError> {
        self.rest.insert_message(draft).await
    }

    async fn subscribe(
        &self,
        scope: SubscribeScope,
    ) -> Result<(SyncSubscription, mpsc::Receiver<FeedEvent>), RemoteStoreError> {
        self.realtime.open_channel(scope).await
    }

    async fn unsubscribe(&self, handle: SyncSubscription) {
        // The handle's drop signals the channel task to stop.
        drop(handle);
    }
}

#[async_trait]
impl AuthProvider for SupabaseStore {
    async fn current_user(&self) -> Result<Option<String>, RemoteStoreError> {
        self.rest.current_user().await
    }
}
