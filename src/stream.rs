//! Streaming delivery and end-of-stream persistence.
//!
//! The pipeline's output is a lazy, finite, non-restartable sequence of
//! line-delimited JSON events. A bounded channel (capacity 1) gives the
//! producer explicit backpressure: it pushes only when the consumer pulls,
//! and a dropped consumer fails the next emission so the producer stops
//! issuing stage invocations and releases its handles.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::chat::{self, DatasetInfo};
use crate::db::MessageStore;
use crate::error::{EngineError, Result};
use crate::llm::{ChatBackend, ModelResolver, Task};
use crate::pipeline::types::PipelineEvent;
use crate::pipeline::AnalysisPipeline;
use crate::router;
use crate::sql_engine::QueryExecutor;

/// One incoming question with its routing context.
#[derive(Debug, Clone)]
pub struct QuestionRequest {
    pub question: String,
    pub conversation_id: i64,
    /// Requested model name; task defaults apply when absent.
    pub model: Option<String>,
    /// Tables exposed by the uploaded dataset; empty when nothing was
    /// uploaded.
    pub table_names: Vec<String>,
    pub dataset: Option<DatasetInfo>,
}

/// Where the producer pushes events. Tracks the transcript for the final
/// save.
pub struct EventSink {
    tx: mpsc::Sender<String>,
    transcript: Mutex<Vec<serde_json::Value>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Emit one pipeline event as a `{"data": ...}` line.
    pub async fn emit(&self, event: PipelineEvent) -> Result<()> {
        let payload = serde_json::to_value(&event)?;
        self.emit_value(payload).await
    }

    /// Emit an arbitrary payload as a `{"data": ...}` line.
    pub async fn emit_value(&self, payload: serde_json::Value) -> Result<()> {
        let line = serde_json::json!({ "data": payload }).to_string();
        self.transcript.lock().await.push(payload);
        self.tx
            .send(line)
            .await
            .map_err(|_| EngineError::StreamClosed)
    }

    /// Emit an `{"error": ...}` line. Errors are not part of the saved
    /// transcript.
    pub async fn emit_error(&self, message: &str) -> Result<()> {
        let line = serde_json::json!({ "error": message }).to_string();
        self.tx
            .send(line)
            .await
            .map_err(|_| EngineError::StreamClosed)
    }

    /// Take the data payloads emitted so far, in order.
    pub async fn take_transcript(&self) -> Vec<serde_json::Value> {
        std::mem::take(&mut *self.transcript.lock().await)
    }
}

/// Consumer side of a question stream. Finite and non-restartable: lines
/// arrive in emission order until the producer finishes or aborts.
pub struct EventStream {
    rx: mpsc::Receiver<String>,
}

impl EventStream {
    /// Next serialized line, or `None` once the stream is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// The resolved backends one question runs with.
pub struct Backends {
    /// Relevance, SQL generation and result formatting.
    pub primary: Arc<dyn ChatBackend>,
    /// Validation and visualization (cheaper tier).
    pub fast: Arc<dyn ChatBackend>,
    /// Direct conversational path.
    pub chat: Arc<dyn ChatBackend>,
}

impl Backends {
    /// Resolve backends for a request, honoring an explicit model choice
    /// and falling back per the resolver rules.
    pub fn resolve(resolver: &ModelResolver, requested: Option<&str>) -> Result<Self> {
        let primary: Arc<dyn ChatBackend> = match requested {
            Some(name) => Arc::new(resolver.resolve(name, true)?),
            None => Arc::new(resolver.resolve_for_task(Task::SqlGeneration)?),
        };
        let fast: Arc<dyn ChatBackend> = Arc::new(resolver.resolve_for_task(Task::Visualization)?);
        let chat: Arc<dyn ChatBackend> = match requested {
            Some(name) => Arc::new(resolver.resolve(name, true)?),
            None => Arc::new(resolver.resolve_for_task(Task::Chat)?),
        };
        Ok(Self {
            primary,
            fast,
            chat,
        })
    }
}

/// Answer a question, resolving model backends first. Returns immediately;
/// the work happens in a background task feeding the stream.
pub fn answer_question(
    resolver: ModelResolver,
    executor: Option<Arc<dyn QueryExecutor>>,
    store: Arc<dyn MessageStore>,
    request: QuestionRequest,
) -> EventStream {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let sink = EventSink::new(tx);
        match Backends::resolve(&resolver, request.model.as_deref()) {
            Ok(backends) => drive(backends, executor, store, request, sink).await,
            Err(e) => {
                error!("model resolution failed: {}", e);
                let _ = sink.emit_error(&e.to_string()).await;
            }
        }
    });
    EventStream { rx }
}

/// Answer a question with pre-resolved backends.
pub fn answer_question_with(
    backends: Backends,
    executor: Option<Arc<dyn QueryExecutor>>,
    store: Arc<dyn MessageStore>,
    request: QuestionRequest,
) -> EventStream {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let sink = EventSink::new(tx);
        drive(backends, executor, store, request, sink).await;
    });
    EventStream { rx }
}

async fn drive(
    backends: Backends,
    executor: Option<Arc<dyn QueryExecutor>>,
    store: Arc<dyn MessageStore>,
    request: QuestionRequest,
    sink: EventSink,
) {
    let request_id = Uuid::new_v4();
    info!(%request_id, question = %request.question, "answering question");

    match route_and_run(&backends, executor, store.clone(), &request, &sink).await {
        Ok(()) => {
            let transcript = sink.take_transcript().await;
            if transcript.is_empty() {
                return;
            }
            // The whole transcript becomes one assistant message, each
            // fragment stored as its serialized form.
            let fragments: Vec<serde_json::Value> = transcript
                .iter()
                .map(|payload| serde_json::Value::String(payload.to_string()))
                .collect();
            let content = serde_json::json!({ "answer": fragments });
            if let Err(e) = store
                .append_message(request.conversation_id, "assistant", &content)
                .await
            {
                // Durability failed but the caller already has the results;
                // surface it as a trailing error without retracting them.
                error!(%request_id, "failed to save transcript: {}", e);
                let _ = sink.emit_error(&e.to_string()).await;
            }
        }
        Err(EngineError::StreamClosed) => {
            info!(%request_id, "consumer disconnected, aborting stream");
        }
        Err(e) => {
            error!(%request_id, "stream failed: {}", e);
            let _ = sink.emit_error(&e.to_string()).await;
        }
    }
}

async fn route_and_run(
    backends: &Backends,
    executor: Option<Arc<dyn QueryExecutor>>,
    store: Arc<dyn MessageStore>,
    request: &QuestionRequest,
    sink: &EventSink,
) -> Result<()> {
    let has_uploaded_data = !request.table_names.is_empty();

    if router::should_run_sql_pipeline(&request.question, has_uploaded_data) {
        let executor = executor.ok_or_else(|| {
            EngineError::QueryExecution("no query execution backend configured".to_string())
        })?;
        let schema = executor.get_schema(&request.table_names).await?;
        let pipeline = AnalysisPipeline::new(
            backends.primary.clone(),
            backends.fast.clone(),
            executor,
        );
        pipeline.run(&request.question, &schema, sink).await
    } else {
        chat::run_direct_chat(backends.chat.clone(), store, request, sink).await
    }
}
