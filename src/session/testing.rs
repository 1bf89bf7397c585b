//! Mock backend for controller tests
//!
//! Streams are scripted ahead of time: either a fixed list of chunks or a
//! gated stream whose chunks the test releases one at a time.

use crate::api::{ApiError, ConversationStore};
use crate::state::{AssistantMessage, Conversation, ConversationSummary};
use crate::stream::{ByteStream, StreamTransport, TransportError, TurnRequest};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

type Chunk = Result<Bytes, TransportError>;

/// Encode events as `data:` lines
pub fn frames(events: &[Value]) -> String {
    events.iter().map(|e| format!("data: {e}\n\n")).collect()
}

enum Script {
    Chunks(Vec<Chunk>),
    Gated(mpsc::UnboundedReceiver<Chunk>),
    Fail(TransportError),
}

/// Releases chunks into a gated stream
pub struct StreamGate {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl StreamGate {
    pub fn send_event(&self, event: &Value) {
        self.send_raw(&format!("data: {event}\n\n"));
    }

    pub fn send_raw(&self, raw: &str) {
        let _ = self.tx.send(Ok(Bytes::from(raw.to_string())));
    }

    pub fn fail(&self, error: TransportError) {
        let _ = self.tx.send(Err(error));
    }

    /// End the stream
    pub fn close(self) {
        drop(self.tx);
    }
}

/// Mock backend with queued streams and an in-memory conversation store
pub struct MockBackend {
    streams: Mutex<VecDeque<Script>>,
    conversations: Mutex<Vec<Conversation>>,
    /// Record of all stream requests made
    pub requests: Mutex<Vec<TurnRequest>>,
    list_calls: AtomicUsize,
    stall_lists: AtomicBool,
    held_delete: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            conversations: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            stall_lists: AtomicBool::new(false),
            held_delete: Mutex::new(None),
        }
    }

    /// Store a conversation the client can open
    pub fn with_conversation(self, id: &str) -> Self {
        self.conversations
            .lock()
            .unwrap()
            .push(Conversation::new(id, fixed_time()));
        self
    }

    /// Queue a stream that yields `chunks` and then ends
    pub fn queue_chunks(&self, chunks: &[&str]) {
        let chunks = chunks
            .iter()
            .map(|c| Ok(Bytes::from((*c).to_string())))
            .collect();
        self.streams
            .lock()
            .unwrap()
            .push_back(Script::Chunks(chunks));
    }

    /// Queue a stream carrying `events`, one chunk per event
    pub fn queue_events(&self, events: &[Value]) {
        let encoded: Vec<String> = events.iter().map(|e| frames(std::slice::from_ref(e))).collect();
        let refs: Vec<&str> = encoded.iter().map(String::as_str).collect();
        self.queue_chunks(&refs);
    }

    /// Queue a stream that yields `chunks` and then breaks with `error`
    pub fn queue_broken(&self, chunks: &[&str], error: TransportError) {
        let mut script: Vec<Chunk> = chunks
            .iter()
            .map(|c| Ok(Bytes::from((*c).to_string())))
            .collect();
        script.push(Err(error));
        self.streams
            .lock()
            .unwrap()
            .push_back(Script::Chunks(script));
    }

    /// Queue a stream that cannot be opened
    pub fn queue_failure(&self, error: TransportError) {
        self.streams.lock().unwrap().push_back(Script::Fail(error));
    }

    /// Queue a stream driven by the returned gate
    pub fn queue_gated(&self) -> StreamGate {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(Script::Gated(rx));
        StreamGate { tx }
    }

    /// Make every list call hang forever
    pub fn stall_lists(&self) {
        self.stall_lists.store(true, Ordering::SeqCst);
    }

    /// Hold the next delete until the returned sender fires or is dropped
    pub fn hold_next_delete(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.held_delete.lock().unwrap() = Some(rx);
        tx
    }

    pub fn recorded_requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

fn fixed_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

#[async_trait]
impl StreamTransport for MockBackend {
    async fn open_stream(&self, request: &TurnRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.streams.lock().unwrap().pop_front();
        match script {
            Some(Script::Chunks(chunks)) => Ok(futures::stream::iter(chunks).boxed()),
            Some(Script::Gated(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(Script::Fail(error)) => Err(error),
            None => Err(TransportError::Connect("no mock stream queued".to_string())),
        }
    }
}

#[async_trait]
impl ConversationStore for MockBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.stall_lists.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .map(|c| ConversationSummary {
                message_count: c.messages.len(),
                ..ConversationSummary::fresh(c)
            })
            .collect())
    }

    async fn create_conversation(&self) -> Result<Conversation, ApiError> {
        let conversation = Conversation::new(uuid::Uuid::new_v4().to_string(), fixed_time());
        self.conversations.lock().unwrap().insert(0, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation, ApiError> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Conversation {id} not found")))
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        let held = self.held_delete.lock().unwrap().take();
        if let Some(release) = held {
            let _ = release.await;
        }
        let mut conversations = self.conversations.lock().unwrap();
        let before = conversations.len();
        conversations.retain(|c| c.id != id);
        if conversations.len() == before {
            return Err(ApiError::not_found(format!("Conversation {id} not found")));
        }
        Ok(())
    }

    async fn send_message(&self, id: &str, _content: &str) -> Result<AssistantMessage, ApiError> {
        self.get_conversation(id).await?;
        Ok(AssistantMessage::placeholder())
    }
}
