//! Client side of the agent runtime.
//!
//! The bridge consumes the runtime only through its public surface: a typed
//! event stream plus a small request/reply API for prompts, question and
//! permission replies, session listing and the model catalog.
//!
//! - [`client`]: the [`AgentRuntime`] trait and the HTTP implementation
//! - [`event`]: typed runtime events decoded from the stream
//! - [`models`]: sessions, providers and model references
//! - [`sse`]: server-sent event framing
//! - [`stream`]: the reconnecting subscription loop

pub mod client;
pub mod error;
pub mod event;
pub mod models;
pub mod sse;
pub mod stream;

pub use client::{AgentRuntime, OpencodeClient, PermissionReply};
pub use error::AgentError;
pub use event::{AgentEvent, PermissionRequest, QuestionOption, QuestionRequest};
pub use models::{ModelInfo, ModelRef, ProviderCatalog, ProviderInfo, SessionInfo};
pub use stream::subscribe;
