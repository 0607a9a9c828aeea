//! ragchat – terminal client.
//!
//! Conversations live in a local SQLite database; `send` streams the
//! assistant reply from ragchat-proxy to stdout as it arrives.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use ragchat_client::{
    ChatSession, Conversation, ConversationPatch, ConversationStore, ProxyClient, SessionView, SqliteStore,
};
use ragchat_types::models::find_model;
use ragchat_types::{AVAILABLE_MODELS, Role};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "ragchat", version, about = "Chat with a RAG assistant through ragchat-proxy")]
struct Cli {
    /// Full URL of the proxy's chat endpoint.
    #[arg(long, env = "RAGCHAT_PROXY_URL", default_value = "http://localhost:3000/chat")]
    proxy_url: String,

    /// Sent as a bearer token when set.
    #[arg(long, env = "RAGCHAT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// SQLite database holding conversations.
    #[arg(long, env = "RAGCHAT_DATABASE_URL", default_value = "sqlite://ragchat.db")]
    database_url: String,

    /// `tracing` filter for diagnostics on stderr.
    #[arg(long, env = "RAGCHAT_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List selectable models.
    Models,
    /// Start a new conversation and print its id.
    New {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// List conversations, most recently active first.
    List,
    /// Print the messages of a conversation.
    History { conversation: Uuid },
    /// Send a message and stream the reply.
    Send {
        conversation: Uuid,
        /// Overrides the conversation's model for this message.
        #[arg(long)]
        model: Option<String>,
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    Rename { conversation: Uuid, title: String },
    SetModel { conversation: Uuid, model: String },
    /// Delete a conversation and all of its messages.
    Delete { conversation: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = match cli.log.parse::<tracing_subscriber::EnvFilter>() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("WARN: --log '{}' is not a valid tracing filter ({e}); falling back to 'warn'", cli.log);
            tracing_subscriber::EnvFilter::new("warn")
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Command::Models = cli.command {
        for m in AVAILABLE_MODELS {
            let badge = m.badge.map(|b| format!(" [{b}]")).unwrap_or_default();
            println!("{:<14} {}{badge}: {}", m.id, m.name, m.description);
        }
        return Ok(());
    }

    let store = Arc::new(
        SqliteStore::connect(&cli.database_url)
            .await
            .with_context(|| format!("failed to open database {}", cli.database_url))?,
    );
    debug!(database_url = %cli.database_url, "store ready");

    match cli.command {
        Command::Models => {}
        Command::New { title, model } => {
            if let Some(model) = model.as_deref() {
                ensure_known_model(model)?;
            }
            let conv = Conversation::new(title.as_deref(), model.as_deref());
            store.create_conversation(&conv).await?;
            println!("{}", conv.id);
        }
        Command::List => {
            for c in store.list_conversations().await? {
                println!(
                    "{}  {}  {:<12} {}",
                    c.id,
                    c.updated_at.format("%Y-%m-%d %H:%M"),
                    c.model,
                    c.title
                );
            }
        }
        Command::History { conversation } => {
            require_conversation(store.as_ref(), conversation).await?;
            for m in store.list_messages(conversation).await? {
                println!("[{}] {}\n", m.role, m.content);
            }
        }
        Command::Send {
            conversation,
            model,
            message,
        } => {
            let conv = require_conversation(store.as_ref(), conversation).await?;
            let model = model.unwrap_or(conv.model);
            ensure_known_model(&model)?;

            let proxy = ProxyClient::new(cli.proxy_url, cli.api_key);
            let session = ChatSession::open(store, proxy, conversation).await?;
            send(&session, &message.join(" "), &model).await?;
        }
        Command::Rename { conversation, title } => {
            let title = title.trim();
            if title.is_empty() {
                bail!("title must not be empty");
            }
            let patch = ConversationPatch {
                title: Some(title.to_owned()),
                model: None,
            };
            if !store.update_conversation(conversation, patch).await? {
                bail!("conversation {conversation} not found");
            }
        }
        Command::SetModel { conversation, model } => {
            ensure_known_model(&model)?;
            let patch = ConversationPatch {
                title: None,
                model: Some(model),
            };
            if !store.update_conversation(conversation, patch).await? {
                bail!("conversation {conversation} not found");
            }
        }
        Command::Delete { conversation } => {
            if !store.delete_conversation(conversation).await? {
                bail!("conversation {conversation} not found");
            }
        }
    }
    Ok(())
}

async fn require_conversation(store: &SqliteStore, id: Uuid) -> anyhow::Result<Conversation> {
    store
        .get_conversation(id)
        .await?
        .with_context(|| format!("conversation {id} not found"))
}

fn ensure_known_model(model: &str) -> anyhow::Result<()> {
    if find_model(model).is_none() {
        let known: Vec<_> = AVAILABLE_MODELS.iter().map(|m| m.id).collect();
        bail!("unknown model '{model}' (available: {})", known.join(", "));
    }
    Ok(())
}

/// Run one send, echoing the assistant reply to stdout while it streams.
async fn send(session: &ChatSession<SqliteStore>, text: &str, model: &str) -> anyhow::Result<()> {
    let mut updates = session.subscribe();
    // The user message lands at `reply_index - 1`, the reply right after it.
    let reply_index = session.view().messages.len() + 1;
    let mut printed = 0;

    let sending = session.send_message(text, model);
    tokio::pin!(sending);
    let result = loop {
        tokio::select! {
            result = &mut sending => break result,
            Ok(()) = updates.changed() => {
                printed = echo(&updates.borrow_and_update(), reply_index, printed);
            }
        }
    };
    printed = echo(&session.view(), reply_index, printed);
    if printed > 0 {
        println!();
    }

    match result? {
        Some(reply) => debug!(message_id = %reply.id, "reply stored"),
        None => eprintln!("(the assistant returned an empty reply)"),
    }
    Ok(())
}

/// Print whatever part of the streaming reply has not been printed yet.
fn echo(view: &SessionView, reply_index: usize, printed: usize) -> usize {
    match view.messages.get(reply_index) {
        Some(m) if m.role == Role::Assistant && m.content.len() > printed => {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(m.content[printed..].as_bytes());
            let _ = out.flush();
            m.content.len()
        }
        _ => printed,
    }
}
