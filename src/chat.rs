//! Direct conversational path.
//!
//! When the router decides against the SQL pipeline, the engine rebuilds a
//! bounded message history from the store, prepends a system instruction
//! (data-aware when dataset metadata is available) and makes a single
//! model call.

use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{ConversationTurn, MessageStore};
use crate::error::Result;
use crate::llm::{ChatBackend, ChatMessage};
use crate::stream::{EventSink, QuestionRequest};

/// Turns of history included as model context.
const CONTEXT_TURNS: i64 = 10;

/// Metadata about the uploaded dataset, used to ground explanations.
#[derive(Debug, Clone, Default)]
pub struct DatasetInfo {
    pub name: String,
    pub table_name: Option<String>,
    pub data_preview: Option<String>,
}

/// System instruction for direct chat, data-aware when dataset metadata is
/// available.
pub fn system_instruction(dataset: Option<&DatasetInfo>) -> String {
    match dataset {
        Some(info) => format!(
            "You are an expert data analyst assistant. The user has uploaded a dataset and wants to understand it.\n\n\
             Dataset information:\n\
             - File/Source: {}\n\
             - Table: {}\n\n\
             {}\n\
             Provide clear, comprehensive explanations about the data. Use markdown formatting for readability:\n\
             - Use **bold** for emphasis\n\
             - Use bullet points for lists\n\
             - Be conversational and helpful\n\n\
             Focus on explaining WHAT the data represents and WHY it matters, not just technical details.\n\
             Do NOT write SQL queries unless specifically asked. Provide natural language explanations.",
            info.name,
            info.table_name.as_deref().unwrap_or("N/A"),
            info.data_preview.as_deref().unwrap_or(""),
        ),
        None => "You are a helpful AI assistant. Provide clear, comprehensive, and well-structured \
                 responses using markdown formatting. Be concise but thorough."
            .to_string(),
    }
}

/// Rebuild role-tagged context from persisted history, collapsing each
/// structured payload into a single message per turn.
pub async fn build_context(
    store: &dyn MessageStore,
    conversation_id: i64,
) -> Result<Vec<ChatMessage>> {
    let turns = store.list_messages(conversation_id, CONTEXT_TURNS).await?;
    Ok(turns.iter().filter_map(collapse_turn).collect())
}

/// Collapse one stored turn into a chat message.
///
/// Historical payloads come in three shapes: `{"question": ...}` for user
/// turns, `{"answer": ...}` for assistant turns (where the answer may be a
/// plain string or a list of streamed fragments), and legacy plain text.
fn collapse_turn(turn: &ConversationTurn) -> Option<ChatMessage> {
    let content = &turn.content;

    if let Some(obj) = content.as_object() {
        if let Some(question) = obj.get("question").and_then(|v| v.as_str()) {
            return Some(ChatMessage::user(question));
        }
        if let Some(answer) = obj.get("answer") {
            match answer {
                serde_json::Value::String(text) => {
                    return Some(ChatMessage::assistant(text.clone()))
                }
                serde_json::Value::Array(fragments) => {
                    // Streamed transcript: the last fragment carrying an
                    // answer wins.
                    for fragment in fragments.iter().rev() {
                        let parsed = match fragment {
                            serde_json::Value::String(raw) => {
                                serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
                            }
                            other => other.clone(),
                        };
                        if let Some(text) = extract_answer_text(&parsed) {
                            return Some(ChatMessage::assistant(text));
                        }
                    }
                    return None;
                }
                other => return Some(ChatMessage::assistant(other.to_string())),
            }
        }
        // Unrecognized structured payload: keep it as raw context.
        return Some(ChatMessage::new(turn.role.clone(), content.to_string()));
    }

    content
        .as_str()
        .map(|text| ChatMessage::new(turn.role.clone(), text))
}

fn extract_answer_text(value: &serde_json::Value) -> Option<String> {
    value
        .get("answer")
        .and_then(|a| a.as_str())
        .or_else(|| {
            value
                .get("output")
                .and_then(|o| o.get("answer"))
                .and_then(|a| a.as_str())
        })
        .map(str::to_string)
}

/// Run the direct chat path: one model call over system instruction,
/// history and the current question, emitted as a single data event.
pub async fn run_direct_chat(
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn MessageStore>,
    request: &QuestionRequest,
    sink: &EventSink,
) -> Result<()> {
    info!(model = backend.model_name(), "running direct chat");

    let mut history = match build_context(store.as_ref(), request.conversation_id).await {
        Ok(history) => history,
        Err(e) => {
            warn!("could not fetch conversation history: {}", e);
            Vec::new()
        }
    };

    // The transport may have persisted the current question before
    // streaming; the history must not repeat it ahead of the final user
    // message.
    if history
        .last()
        .map_or(false, |m| m.role == "user" && m.content == request.question)
    {
        history.pop();
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_instruction(
        request.dataset.as_ref(),
    )));
    messages.extend(history);
    messages.push(ChatMessage::user(request.question.clone()));

    let answer = backend.invoke(&messages).await?;

    sink.emit_value(serde_json::json!({
        "answer": answer,
        "mode": "direct_chat",
        "model_used": backend.model_name(),
    }))
    .await?;

    Ok(())
}

/// Document/embedding chat is not wired up; the operation surface exists
/// only as an explicit unsupported stub.
pub fn run_document_chat(_question: &str, _embedding_model: &str, _table_name: &str) -> Result<()> {
    Err(crate::error::EngineError::Unsupported(
        "document chat is disabled".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, content: serde_json::Value) -> ConversationTurn {
        ConversationTurn {
            role: role.to_string(),
            content,
            created_at: None,
        }
    }

    #[test]
    fn collapses_question_payload_to_user_message() {
        let message = collapse_turn(&turn("user", serde_json::json!({"question": "hi there"})))
            .unwrap();
        assert_eq!(message.role, "user");
        assert_eq!(message.content, "hi there");
    }

    #[test]
    fn collapses_plain_answer_to_assistant_message() {
        let message = collapse_turn(&turn(
            "assistant",
            serde_json::json!({"answer": "42 rows", "mode": "direct_chat"}),
        ))
        .unwrap();
        assert_eq!(message.role, "assistant");
        assert_eq!(message.content, "42 rows");
    }

    #[test]
    fn collapses_streamed_fragment_list_to_last_answer() {
        let fragments = vec![
            serde_json::json!({"stage": "sql", "output": {"query": "SELECT 1"}}).to_string(),
            serde_json::json!({"stage": "answer", "output": {"answer": "the final answer"}})
                .to_string(),
        ];
        let message = collapse_turn(&turn(
            "assistant",
            serde_json::json!({ "answer": fragments }),
        ))
        .unwrap();
        assert_eq!(message.role, "assistant");
        assert_eq!(message.content, "the final answer");
    }

    #[test]
    fn keeps_legacy_plain_text_content() {
        let message = collapse_turn(&turn(
            "assistant",
            serde_json::Value::String("plain old text".to_string()),
        ))
        .unwrap();
        assert_eq!(message.content, "plain old text");
    }

    #[test]
    fn unparseable_fragment_list_is_skipped() {
        let collapsed = collapse_turn(&turn(
            "assistant",
            serde_json::json!({"answer": ["not json", "also not json"]}),
        ));
        assert!(collapsed.is_none());
    }

    #[test]
    fn dataset_aware_instruction_mentions_the_table() {
        let info = DatasetInfo {
            name: "sales.csv".to_string(),
            table_name: Some("sales".to_string()),
            data_preview: None,
        };
        let instruction = system_instruction(Some(&info));
        assert!(instruction.contains("sales.csv"));
        assert!(instruction.contains("Table: sales"));

        let generic = system_instruction(None);
        assert!(generic.contains("helpful AI assistant"));
    }

    #[test]
    fn document_chat_is_disabled() {
        assert!(run_document_chat("q", "model", "table").is_err());
    }
}
