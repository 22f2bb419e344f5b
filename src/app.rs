use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::DateTime;

use crate::{
    cli::{Cli, Command},
    domain::{
        conversation::Conversation,
        message::{Message, MessageId, SendStatus},
    },
    infra::{
        self,
        config::{AppConfig, FileConfigAdapter},
        contracts::ConfigAdapter,
    },
    supabase::{
        notify::{NoopNotifier, SmsWebhook},
        SupabaseStore,
    },
    sync::{
        contracts::Notifier,
        controller::{ScopeConfig, SyncController},
        conversation_list::ConversationListController,
    },
};

const SEND_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<SupabaseStore>,
    pub notifier: Arc<dyn Notifier>,
}

pub fn run(cli: Cli) -> Result<()> {
    let context = bootstrap(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command_or_default() {
        Command::Run {
            conversation: Some(conversation_id),
        } => runtime.block_on(tail_conversation(&context, &conversation_id)),
        Command::Run { conversation: None } => runtime.block_on(tail_conversation_list(&context)),
        Command::Send {
            conversation,
            to,
            text,
        } => runtime.block_on(send_once(&context, &conversation, to, &text)),
    }
}

pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext> {
    let context = build_context(config_path)?;
    infra::logging::init(&context.config.logging)?;
    Ok(context)
}

fn build_context(config_path: Option<&Path>) -> Result<AppContext> {
    let config = FileConfigAdapter::new(config_path).load()?;
    let store = Arc::new(SupabaseStore::new(&config.backend)?);

    let notifier: Arc<dyn Notifier> = match config.notify.sms_webhook_url.clone() {
        Some(url) => {
            let bearer = config
                .backend
                .access_token
                .clone()
                .unwrap_or_else(|| config.backend.anon_key.clone());
            Arc::new(SmsWebhook::new(url, bearer)?)
        }
        None => Arc::new(NoopNotifier),
    };

    Ok(AppContext {
        config,
        store,
        notifier,
    })
}

fn scope_config(context: &AppContext) -> ScopeConfig {
    ScopeConfig {
        page_size: context.config.sync.page_size,
        backoff: context.config.sync.backoff(),
    }
}

async fn tail_conversation(context: &AppContext, conversation_id: &str) -> Result<()> {
    let controller = SyncController::open(
        context.store.clone(),
        context.store.clone(),
        context.notifier.clone(),
        scope_config(context),
        conversation_id,
    )
    .await;

    let mut messages = controller.messages();
    let mut status = controller.status();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.close();
                return Ok(());
            }
            changed = messages.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                println!("--- {conversation_id} ---");
                for line in transcript_lines(&messages.borrow_and_update()) {
                    println!("{line}");
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = status.borrow_and_update().clone();
                if !snapshot.live_updates_available {
                    eprintln!("live updates unavailable; transcript may lag until refresh");
                }
                if let Some(error) = snapshot.last_error {
                    eprintln!("sync degraded: {}", error.code);
                }
            }
        }
    }
}

async fn tail_conversation_list(context: &AppContext) -> Result<()> {
    let controller =
        ConversationListController::open(context.store.clone(), context.config.sync.backoff());
    let mut conversations = controller.conversations();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.close();
                return Ok(());
            }
            changed = conversations.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                println!("--- conversations ---");
                for line in conversation_lines(&conversations.borrow_and_update()) {
                    println!("{line}");
                }
            }
        }
    }
}

async fn send_once(
    context: &AppContext,
    conversation_id: &str,
    recipient: Option<String>,
    text: &str,
) -> Result<()> {
    let controller = SyncController::open(
        context.store.clone(),
        context.store.clone(),
        context.notifier.clone(),
        scope_config(context),
        conversation_id,
    )
    .await;

    let temp_id = controller.send(recipient, text)?;
    let outcome = tokio::time::timeout(
        SEND_CONFIRM_TIMEOUT,
        wait_for_confirmation(&controller, &temp_id),
    )
    .await
    .map_err(|_| anyhow!("timed out waiting for send confirmation"))?;
    controller.close();

    outcome?;
    println!("message sent");
    Ok(())
}

/// Resolves once the provisional entry either fails or is rewritten to a
/// confirmed record (it disappears under its temporary id).
async fn wait_for_confirmation(controller: &SyncController, temp_id: &MessageId) -> Result<()> {
    let mut messages = controller.messages();
    let mut seen_pending = false;

    loop {
        {
            let snapshot = messages.borrow_and_update();
            match snapshot.iter().find(|message| message.id == *temp_id) {
                Some(entry) if entry.status == SendStatus::Failed => {
                    return Err(anyhow!("send failed; the entry is kept for retry"));
                }
                Some(_) => seen_pending = true,
                None if seen_pending => return Ok(()),
                None => {}
            }
        }

        if messages.changed().await.is_err() {
            return Err(anyhow!("scope ended before the send was confirmed"));
        }
    }
}

fn transcript_lines(messages: &[Message]) -> Vec<String> {
    messages.iter().map(transcript_line).collect()
}

fn transcript_line(message: &Message) -> String {
    let time = DateTime::from_timestamp_millis(message.created_at_unix_ms)
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_owned());
    let marker = match message.status {
        SendStatus::Pending => " [sending]",
        SendStatus::Failed => " [failed]",
        SendStatus::Sent => "",
    };

    format!(
        "[{time}] {}: {}{marker}",
        message.sender_id, message.content
    )
}

fn conversation_lines(conversations: &[Conversation]) -> Vec<String> {
    conversations
        .iter()
        .map(|conversation| {
            format!(
                "{}  {} - {}",
                conversation.id,
                conversation.display_title(),
                conversation.display_preview()
            )
        })
        .collect()
}
