//! The bridge against HTTP doubles of the Slack Web API and the agent server.

mod common;

use std::sync::Arc;

use chatlink_agent::OpencodeClient;
use chatlink_channel::slack::SlackApi;
use chatlink_channel::Bridge;
use serde_json::{json, Value};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

async fn slack_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "user_id": "UBOT"})))
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;
    server
}

async fn posted_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == "/chat.postMessage")
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}

#[tokio::test]
async fn channel_message_reaches_agent_prompt() {
    let slack = slack_server().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/conversations.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channels": [{"id": "C1", "name": "ops"}],
            "response_metadata": {"next_cursor": ""}
        })))
        .expect(1)
        .mount(&slack)
        .await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/conversations.history"))
        .and(matchers::query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "messages": [{"ts": "100.000001", "user": "U1", "text": "old backlog"}]
        })))
        .mount(&slack)
        .await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/conversations.history"))
        .and(matchers::query_param("limit", "10"))
        .and(matchers::query_param("oldest", "100.000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "messages": [
                {"ts": "100.000003", "user": "U1", "text": "run the tests"},
                {"ts": "100.000002", "user": "UBOT", "bot_id": "B1", "text": "startup"},
                {"ts": "100.000001", "user": "U1", "text": "old backlog"}
            ]
        })))
        .mount(&slack)
        .await;

    let agent = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/tui/append-prompt"))
        .and(matchers::body_json(json!({"text": "run the tests"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(1)
        .mount(&agent)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/tui/submit-prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(1)
        .mount(&agent)
        .await;

    let api = Arc::new(SlackApi::with_base_url("xoxb-test", &slack.uri()));
    let runtime = Arc::new(OpencodeClient::new(&agent.uri()));
    let mut bridge = Bridge::new(&common::config("#ops"), api, runtime, common::INSTANCE_ID);

    bridge.start("startup").await;
    let report = bridge.poll_once().await;
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(bridge.poller().watermark().unwrap().as_str(), "100.000003");

    let posts = posted_bodies(&slack).await;
    assert_eq!(posts, vec![json!({"channel": "C1", "text": "startup"})]);
}

#[tokio::test]
async fn direct_target_opens_conversation_once() {
    let slack = slack_server().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/users.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "members": [
                {"id": "U1", "name": "alice", "profile": {"display_name": "Alice"}},
                {"id": "U2", "name": "bob"}
            ]
        })))
        .expect(1)
        .mount(&slack)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/conversations.open"))
        .and(matchers::body_json(json!({"users": "U1"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "channel": {"id": "D1"}})),
        )
        .expect(1)
        .mount(&slack)
        .await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/conversations.history"))
        .and(matchers::query_param("channel", "D1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "messages": []})))
        .mount(&slack)
        .await;

    let agent = MockServer::start().await;
    let api = Arc::new(SlackApi::with_base_url("xoxb-test", &slack.uri()));
    let runtime = Arc::new(OpencodeClient::new(&agent.uri()));
    let mut bridge = Bridge::new(&common::config("alice"), api, runtime, common::INSTANCE_ID);

    bridge.start("startup").await;
    bridge.poll_once().await;
    bridge
        .handle_event(chatlink_agent::AgentEvent::PartUpdated {
            session_id: "ses_1".into(),
            text: "a < b".into(),
            delta: None,
        })
        .await;
    bridge
        .handle_event(chatlink_agent::AgentEvent::SessionIdle {
            session_id: "ses_1".into(),
        })
        .await;

    let posts = posted_bodies(&slack).await;
    assert_eq!(
        posts,
        vec![
            json!({"channel": "D1", "text": "startup"}),
            json!({"channel": "D1", "text": "_opencode session [4242]_\na &lt; b"}),
        ]
    );
}

#[tokio::test]
async fn missing_channel_posts_nothing() {
    let slack = slack_server().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/conversations.list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "channels": [{"id": "C1", "name": "ops"}]
        })))
        .expect(1)
        .mount(&slack)
        .await;

    let agent = MockServer::start().await;
    let api = Arc::new(SlackApi::with_base_url("xoxb-test", &slack.uri()));
    let runtime = Arc::new(OpencodeClient::new(&agent.uri()));
    let mut bridge = Bridge::new(&common::config("#nowhere"), api, runtime, common::INSTANCE_ID);

    bridge.start("startup").await;
    assert!(bridge.poll_once().await.skipped);
    assert!(bridge.poll_once().await.skipped);
    assert!(posted_bodies(&slack).await.is_empty());
}
