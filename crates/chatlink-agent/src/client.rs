//! Request/reply surface of the agent runtime.
//!
//! [`AgentRuntime`] is the seam the bridge depends on; [`OpencodeClient`]
//! implements it over the runtime's HTTP API.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::models::{ModelRef, ProviderCatalog, SessionInfo};
use crate::AgentError;

/// Answer to a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionReply {
    /// Allow this one invocation.
    Once,
    /// Allow this and matching future invocations.
    Always,
    Reject,
}

impl PermissionReply {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionReply::Once => "once",
            PermissionReply::Always => "always",
            PermissionReply::Reject => "reject",
        }
    }
}

/// Operations the bridge performs against the agent runtime.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Append text to the runtime's prompt input.
    async fn append_prompt(&self, text: &str) -> Result<(), AgentError>;

    /// Submit whatever is in the prompt input.
    async fn submit_prompt(&self) -> Result<(), AgentError>;

    /// Answer a pending question.
    async fn reply_question(&self, request_id: &str, answer: &str) -> Result<(), AgentError>;

    /// Answer a pending permission request.
    async fn reply_permission(
        &self,
        session_id: &str,
        request_id: &str,
        reply: PermissionReply,
    ) -> Result<(), AgentError>;

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, AgentError>;

    async fn providers(&self) -> Result<ProviderCatalog, AgentError>;

    /// Switch the model used for subsequent prompts.
    async fn set_model(&self, model: &ModelRef) -> Result<(), AgentError>;

    /// Append `text` and submit it as one agent input.
    async fn send_input(&self, text: &str) -> Result<(), AgentError> {
        self.append_prompt(text).await?;
        self.submit_prompt().await
    }
}

/// HTTP client for an opencode-style runtime server.
pub struct OpencodeClient {
    client: Client,
    base_url: String,
}

impl OpencodeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<(), AgentError> {
        debug!(path, "runtime POST");
        let resp = self.client.post(self.url(path)).json(&body).send().await?;
        check_status(resp).await.map(|_| ())
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, AgentError> {
        let resp = self.client.get(self.url(path)).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }
}

pub(crate) async fn check_status(resp: Response) -> Result<Response, AgentError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AgentError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AgentRuntime for OpencodeClient {
    async fn append_prompt(&self, text: &str) -> Result<(), AgentError> {
        self.post_json("/tui/append-prompt", json!({ "text": text }))
            .await
    }

    async fn submit_prompt(&self) -> Result<(), AgentError> {
        self.post_json("/tui/submit-prompt", json!({})).await
    }

    async fn reply_question(&self, request_id: &str, answer: &str) -> Result<(), AgentError> {
        self.post_json(
            &format!("/question/{request_id}/reply"),
            json!({ "answers": [[answer]] }),
        )
        .await
    }

    async fn reply_permission(
        &self,
        session_id: &str,
        request_id: &str,
        reply: PermissionReply,
    ) -> Result<(), AgentError> {
        self.post_json(
            &format!("/session/{session_id}/permissions/{request_id}"),
            json!({ "response": reply }),
        )
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, AgentError> {
        let value = self.get_json("/session").await?;
        SessionInfo::list_from_json(value)
    }

    async fn providers(&self) -> Result<ProviderCatalog, AgentError> {
        let value = self.get_json("/config/providers").await?;
        ProviderCatalog::from_json(value)
    }

    async fn set_model(&self, model: &ModelRef) -> Result<(), AgentError> {
        let resp = self
            .client
            .patch(self.url("/config"))
            .json(&json!({ "model": model.to_string() }))
            .send()
            .await?;
        check_status(resp).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn send_input_appends_then_submits() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/tui/append-prompt"))
            .and(matchers::body_json(json!({"text": "run the tests"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/tui/submit-prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpencodeClient::new(&server.uri());
        client.send_input("run the tests").await.unwrap();
    }

    #[tokio::test]
    async fn send_input_stops_when_append_fails() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/tui/append-prompt"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/tui/submit-prompt"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = OpencodeClient::new(&server.uri());
        let err = client.send_input("x").await.unwrap_err();
        match err {
            AgentError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Status, got {other}"),
        }
    }

    #[tokio::test]
    async fn reply_question_wraps_answer() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/question/que_1/reply"))
            .and(matchers::body_json(json!({"answers": [["Postgres"]]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpencodeClient::new(&server.uri());
        client.reply_question("que_1", "Postgres").await.unwrap();
    }

    #[tokio::test]
    async fn reply_permission_posts_response() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/session/ses_1/permissions/per_1"))
            .and(matchers::body_json(json!({"response": "always"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpencodeClient::new(&format!("{}/", server.uri()));
        client
            .reply_permission("ses_1", "per_1", PermissionReply::Always)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn providers_and_sessions_decode() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/config/providers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "providers": [{"id": "anthropic", "name": "Anthropic",
                               "models": {"claude-a": {"id": "claude-a"}}}],
                "default": {"anthropic": "claude-a"}
            })))
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "ses_1", "time": {"updated": 10}}
            ])))
            .mount(&server)
            .await;

        let client = OpencodeClient::new(&server.uri());
        let catalog = client.providers().await.unwrap();
        assert_eq!(catalog.providers[0].models[0].id, "claude-a");
        let sessions = client.list_sessions().await.unwrap();
        assert_eq!(sessions[0].id, "ses_1");
    }

    #[tokio::test]
    async fn set_model_patches_config() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("PATCH"))
            .and(matchers::path("/config"))
            .and(matchers::body_json(json!({"model": "anthropic/claude-a"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpencodeClient::new(&server.uri());
        client
            .set_model(&ModelRef::new("anthropic", "claude-a"))
            .await
            .unwrap();
    }

    #[test]
    fn permission_reply_wire_names() {
        assert_eq!(
            serde_json::to_value(PermissionReply::Once).unwrap(),
            json!("once")
        );
        assert_eq!(PermissionReply::Reject.as_str(), "reject");
    }
}
