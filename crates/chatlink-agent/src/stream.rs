//! Reconnecting subscription to the runtime event stream.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{check_status, OpencodeClient};
use crate::event::AgentEvent;
use crate::AgentError;

const MAX_BACKOFF_SECS: u64 = 60;

impl OpencodeClient {
    /// Read `/event` until the server closes the stream.
    ///
    /// Decoded events are forwarded through `tx`. Payloads that fail to
    /// decode are logged and skipped. Returns [`AgentError::StreamClosed`] if
    /// the receiver is gone.
    pub async fn stream_events(&self, tx: &mpsc::Sender<AgentEvent>) -> Result<(), AgentError> {
        let resp = self
            .http()
            .get(self.url("/event"))
            .header("accept", "text/event-stream")
            .send()
            .await?;
        let resp = check_status(resp).await?;
        info!(url = %self.base_url(), "runtime event stream connected");

        let mut accumulator = crate::sse::SseAccumulator::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for payload in accumulator.push(&chunk) {
                forward(&payload, tx).await?;
            }
        }
        if let Some(payload) = accumulator.finish() {
            forward(&payload, tx).await?;
        }
        Ok(())
    }
}

async fn forward(payload: &str, tx: &mpsc::Sender<AgentEvent>) -> Result<(), AgentError> {
    match AgentEvent::parse(payload) {
        Ok(AgentEvent::Other(kind)) => {
            debug!(kind = %kind, "ignoring runtime event");
            Ok(())
        }
        Ok(event) => tx.send(event).await.map_err(|_| AgentError::StreamClosed),
        Err(e) => {
            warn!(error = %e, "undecodable runtime event");
            Ok(())
        }
    }
}

/// Keep the event stream open for the lifetime of `tx`.
///
/// Connection failures and server-side closes back off exponentially
/// (1s doubling up to 60s); a stream that delivered data resets the backoff.
pub async fn subscribe(client: Arc<OpencodeClient>, tx: mpsc::Sender<AgentEvent>) {
    let mut backoff_secs = 1u64;

    loop {
        let started = tokio::time::Instant::now();
        match client.stream_events(&tx).await {
            Ok(()) => {
                info!("runtime event stream ended, reconnecting");
            }
            Err(AgentError::StreamClosed) => {
                info!("event receiver dropped, stopping subscription");
                return;
            }
            Err(e) => {
                warn!(error = %e, backoff_secs, "runtime event stream failed, backing off");
            }
        }
        if tx.is_closed() {
            return;
        }

        if started.elapsed() > Duration::from_secs(backoff_secs) {
            backoff_secs = 1;
        }
        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn sse_body(events: &[&str]) -> String {
        events
            .iter()
            .map(|e| format!("data: {e}\n\n"))
            .collect::<String>()
    }

    #[tokio::test]
    async fn stream_events_forwards_known_kinds() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"type":"server.connected","properties":{}}"#,
            r#"{"type":"session.idle","properties":{"sessionID":"ses_1"}}"#,
            "garbage",
            r#"{"type":"session.created","properties":{"info":{"id":"ses_2","parentID":"ses_1"}}}"#,
        ]);
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/event"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = OpencodeClient::new(&server.uri());
        let (tx, mut rx) = mpsc::channel(8);
        client.stream_events(&tx).await.unwrap();
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                AgentEvent::SessionIdle {
                    session_id: "ses_1".into()
                },
                AgentEvent::SessionCreated {
                    session_id: "ses_2".into(),
                    parent_id: Some("ses_1".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn stream_events_keeps_characters_split_across_writes() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            let event = sse_body(&[
                r#"{"type":"message.part.updated","properties":{"part":{"sessionID":"s","type":"text","text":"héllo"}}}"#,
            ]);
            let bytes = event.as_bytes();
            let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
            socket.write_all(&bytes[..split]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            socket.write_all(&bytes[split..]).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let client = OpencodeClient::new(&format!("http://{addr}"));
        let (tx, mut rx) = mpsc::channel(8);
        client.stream_events(&tx).await.unwrap();
        server.await.unwrap();

        match rx.recv().await {
            Some(AgentEvent::PartUpdated { text, .. }) => assert_eq!(text, "h\u{e9}llo"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_events_reports_http_status() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/event"))
            .respond_with(ResponseTemplate::new(503).set_body_string("starting"))
            .mount(&server)
            .await;

        let client = OpencodeClient::new(&server.uri());
        let (tx, _rx) = mpsc::channel(1);
        let err = client.stream_events(&tx).await.unwrap_err();
        assert!(matches!(err, AgentError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn subscribe_stops_when_receiver_dropped() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/event"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
                r#"{"type":"session.idle","properties":{"sessionID":"ses_1"}}"#,
            ])))
            .mount(&server)
            .await;

        let client = Arc::new(OpencodeClient::new(&server.uri()));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), subscribe(client, tx))
            .await
            .expect("subscribe should return once the receiver is gone");
    }
}
