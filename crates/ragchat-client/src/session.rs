//! One open conversation: local message list, streaming state and the send
//! workflow.
//!
//! The local view lives in a [`watch`] channel. Renderers subscribe to it and
//! see every delta as it is applied; when all of them have gone away the
//! session keeps updating its own copy and still persists the reply.
//!
//! Sends on a session are serialized, so two overlapping calls never stream
//! into the same placeholder or interleave their history.

use std::sync::Arc;

use futures::StreamExt;
use ragchat_types::{ChatMessage, ChatRequest, Role};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ClientError;
use crate::proxy::{ChunkStream, ProxyClient};
use crate::sse::{ParserLimits, SseDecoder};
use crate::store::{ConversationStore, Message};

/// What a renderer needs to draw the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub messages: Vec<Message>,
    /// An assistant reply is currently streaming in.
    pub streaming: bool,
    /// Message of the last failed send, cleared when the next one starts.
    pub error: Option<String>,
}

pub struct ChatSession<S> {
    conversation_id: Uuid,
    store: Arc<S>,
    proxy: ProxyClient,
    limits: ParserLimits,
    view: watch::Sender<SessionView>,
    send_lock: Mutex<()>,
}

impl<S: ConversationStore> ChatSession<S> {
    /// Open an existing conversation and load its messages.
    pub async fn open(store: Arc<S>, proxy: ProxyClient, conversation_id: Uuid) -> Result<Self, ClientError> {
        if store.get_conversation(conversation_id).await?.is_none() {
            return Err(ClientError::ConversationNotFound(conversation_id.to_string()));
        }
        let messages = store.list_messages(conversation_id).await?;
        debug!(%conversation_id, messages = messages.len(), "session opened");

        let (view, _) = watch::channel(SessionView {
            messages,
            ..SessionView::default()
        });
        Ok(Self {
            conversation_id,
            store,
            proxy,
            limits: ParserLimits::default(),
            view,
            send_lock: Mutex::new(()),
        })
    }

    pub fn with_parser_limits(mut self, limits: ParserLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Snapshot of the current local state.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Replace the local list with what the store holds.
    pub async fn reload(&self) -> Result<(), ClientError> {
        let messages = self.store.list_messages(self.conversation_id).await?;
        self.view.send_modify(|v| v.messages = messages);
        Ok(())
    }

    /// Send a user message and stream the assistant reply into the session.
    ///
    /// Returns the persisted assistant message, or `None` when the reply
    /// carried no content. If the stream breaks after some content arrived,
    /// that partial reply is still persisted before the error is returned.
    pub async fn send_message(&self, content: &str, model: &str) -> Result<Option<Message>, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let _guard = self.send_lock.lock().await;

        let user = Message::new(self.conversation_id, Role::User, content);
        let history: Vec<ChatMessage> = {
            let view = self.view.borrow();
            view.messages
                .iter()
                .filter(|m| m.role != Role::System)
                .chain(std::iter::once(&user))
                .map(Message::to_chat_message)
                .collect()
        };

        self.view.send_modify(|v| {
            v.error = None;
            v.messages.push(user.clone());
        });
        if let Err(e) = self.store.append_message(&user).await {
            warn!(conversation_id = %self.conversation_id, error = %e, "failed to persist user message");
        }

        let request = ChatRequest {
            messages: history,
            model: model.to_owned(),
            conversation_id: Some(self.conversation_id.to_string()),
        };
        info!(conversation_id = %self.conversation_id, model, turns = request.messages.len(), "sending message");

        self.view.send_modify(|v| v.streaming = true);
        let result = self.stream_reply(&request).await;
        self.view.send_modify(|v| {
            v.streaming = false;
            if let Err(e) = &result {
                v.error = Some(e.to_string());
            }
        });
        result
    }

    async fn stream_reply(&self, request: &ChatRequest) -> Result<Option<Message>, ClientError> {
        let chunks = self.proxy.open_stream(request).await?;

        let mut reply = Message::new(self.conversation_id, Role::Assistant, "");
        let reply_id = reply.id;
        self.view.send_modify(|v| v.messages.push(reply.clone()));

        let mut decoder = SseDecoder::with_limits(self.limits);
        let outcome = self.pump(chunks, &mut decoder, reply_id, &mut reply.content).await;
        if outcome.is_ok() {
            for delta in decoder.finish() {
                self.apply_delta(reply_id, &mut reply.content, &delta);
            }
        }

        if reply.content.is_empty() {
            self.view.send_modify(|v| v.messages.retain(|m| m.id != reply_id));
            debug!(conversation_id = %self.conversation_id, "reply carried no content");
            return outcome.map(|()| None);
        }

        self.store.append_message(&reply).await?;
        debug!(
            conversation_id = %self.conversation_id,
            chars = reply.content.chars().count(),
            done = decoder.saw_done(),
            "assistant reply persisted"
        );
        outcome.map(|()| Some(reply))
    }

    async fn pump(
        &self,
        mut chunks: ChunkStream,
        decoder: &mut SseDecoder,
        reply_id: Uuid,
        content: &mut String,
    ) -> Result<(), ClientError> {
        let mut deltas = Vec::new();
        while let Some(chunk) = chunks.next().await {
            let fed = decoder.feed_into(&chunk?, &mut deltas);
            for delta in deltas.drain(..) {
                self.apply_delta(reply_id, content, &delta);
            }
            fed?;
        }
        Ok(())
    }

    fn apply_delta(&self, reply_id: Uuid, content: &mut String, delta: &str) {
        content.push_str(delta);
        self.view.send_modify(|v| {
            if let Some(m) = v.messages.iter_mut().find(|m| m.id == reply_id) {
                m.content.push_str(delta);
            }
        });
    }
}
