//! Typed runtime events.
//!
//! The runtime publishes `{"type": "...", "properties": {...}}` envelopes.
//! Only the kinds the bridge reacts to are decoded; everything else becomes
//! [`AgentEvent::Other`] so the stream never stalls on an unknown kind.

use serde::Deserialize;
use serde_json::Value;

use crate::AgentError;

/// One selectable answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// A multiple-choice question raised by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRequest {
    /// Request id the reply is keyed by.
    pub id: String,
    pub session_id: String,
    /// Short header, when the runtime supplies one.
    pub header: Option<String>,
    pub question: String,
    pub options: Vec<QuestionOption>,
    /// Whether a free-form answer is accepted besides the listed options.
    pub custom: bool,
}

/// A tool permission the agent is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub id: String,
    pub session_id: String,
    pub title: String,
}

/// Events the bridge consumes from the runtime stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Streaming text for a session. `delta` is appended when present,
    /// otherwise `text` replaces the buffer.
    PartUpdated {
        session_id: String,
        text: String,
        delta: Option<String>,
    },
    SessionCreated {
        session_id: String,
        parent_id: Option<String>,
    },
    SessionIdle {
        session_id: String,
    },
    QuestionAsked(QuestionRequest),
    PermissionAsked(PermissionRequest),
    /// Any other event kind (or a part that is not text).
    Other(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Value,
}

#[derive(Deserialize)]
struct PartProps {
    part: Part,
    #[serde(default)]
    delta: Option<String>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct SessionProps {
    info: SessionInfoProps,
}

#[derive(Deserialize)]
struct SessionInfoProps {
    id: String,
    #[serde(rename = "parentID", default)]
    parent_id: Option<String>,
}

#[derive(Deserialize)]
struct IdleProps {
    #[serde(rename = "sessionID")]
    session_id: String,
}

#[derive(Deserialize)]
struct StatusProps {
    #[serde(rename = "sessionID")]
    session_id: String,
    status: StatusInfo,
}

#[derive(Deserialize)]
struct StatusInfo {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct QuestionProps {
    id: String,
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(default)]
    questions: Vec<QuestionItem>,
}

#[derive(Deserialize)]
struct QuestionItem {
    #[serde(default)]
    question: String,
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    options: Vec<QuestionOption>,
    #[serde(default = "default_custom")]
    custom: bool,
}

fn default_custom() -> bool {
    true
}

#[derive(Deserialize)]
struct PermissionProps {
    id: String,
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    permission: Option<String>,
}

impl AgentEvent {
    /// Decode one event payload (the SSE `data:` body).
    pub fn parse(payload: &str) -> Result<Self, AgentError> {
        let envelope: Envelope = serde_json::from_str(payload)?;
        Self::from_parts(&envelope.kind, envelope.properties)
    }

    fn from_parts(kind: &str, properties: Value) -> Result<Self, AgentError> {
        let event = match kind {
            "message.part.updated" => {
                let props: PartProps = serde_json::from_value(properties)?;
                if props.part.kind != "text" {
                    return Ok(AgentEvent::Other(format!("{kind}:{}", props.part.kind)));
                }
                AgentEvent::PartUpdated {
                    session_id: props.part.session_id,
                    text: props.part.text,
                    delta: props.delta,
                }
            }
            "session.created" => {
                let props: SessionProps = serde_json::from_value(properties)?;
                AgentEvent::SessionCreated {
                    session_id: props.info.id,
                    parent_id: props.info.parent_id.filter(|p| !p.is_empty()),
                }
            }
            "session.idle" => {
                let props: IdleProps = serde_json::from_value(properties)?;
                AgentEvent::SessionIdle {
                    session_id: props.session_id,
                }
            }
            // Newer runtimes report idleness through a status transition.
            "session.status" => {
                let props: StatusProps = serde_json::from_value(properties)?;
                if props.status.kind != "idle" {
                    return Ok(AgentEvent::Other(kind.to_string()));
                }
                AgentEvent::SessionIdle {
                    session_id: props.session_id,
                }
            }
            "question.asked" => {
                let props: QuestionProps = serde_json::from_value(properties)?;
                // One question per interaction; extra entries are not surfaced.
                if props.questions.len() > 1 {
                    tracing::warn!(
                        request = %props.id,
                        dropped = props.questions.len() - 1,
                        "question request has several questions, only the first is asked"
                    );
                }
                let Some(item) = props.questions.into_iter().next() else {
                    return Err(AgentError::Decode(format!(
                        "question {} carries no questions",
                        props.id
                    )));
                };
                AgentEvent::QuestionAsked(QuestionRequest {
                    id: props.id,
                    session_id: props.session_id,
                    header: item.header.filter(|h| !h.is_empty()),
                    question: item.question,
                    options: item.options,
                    custom: item.custom,
                })
            }
            "permission.asked" | "permission.updated" => {
                let props: PermissionProps = serde_json::from_value(properties)?;
                let title = props
                    .title
                    .or(props.permission)
                    .or(props.kind)
                    .unwrap_or_else(|| "permission requested".to_string());
                AgentEvent::PermissionAsked(PermissionRequest {
                    id: props.id,
                    session_id: props.session_id,
                    title,
                })
            }
            other => AgentEvent::Other(other.to_string()),
        };
        Ok(event)
    }
}
