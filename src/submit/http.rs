use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::trace;
use url::Url;

use super::{SubmitError, Submitter};
use crate::rules::CandidateRow;

/// POSTs each row's fields as a JSON object to a fixed endpoint.
pub struct HttpSubmitter {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
}

impl HttpSubmitter {
    pub fn new(endpoint: Url, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            auth_token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, row: &CandidateRow) -> Result<(), SubmitError> {
        let mut req = self.client.post(self.endpoint.clone()).json(&row.fields);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                SubmitError::Transient("timed out".into())
            } else {
                SubmitError::Transient(format!("request failed: {e}"))
            }
        })?;

        let status = resp.status();
        trace!(line = row.line, %status, "submitted row");
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let message = failure_message(status, &body);
        if status.is_client_error() {
            Err(SubmitError::Rejected(message))
        } else {
            Err(SubmitError::Transient(message))
        }
    }
}

/// Prefer the server's own explanation over the bare status line.
fn failure_message(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "detail", "error"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let text = body.trim();
    if text.is_empty() {
        status.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Verdict;
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serves one canned response per connection and forwards each raw request.
    async fn stub_server(status: &'static str, body: &'static str) -> (Url, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = sock.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf);
                    if let Some(end) = text.find("\r\n\r\n") {
                        let content_length = text[..end]
                            .lines()
                            .find_map(|l| {
                                let (name, value) = l.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + content_length {
                            break;
                        }
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&buf).to_string()).await;
                let resp = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(resp.as_bytes()).await.unwrap();
                let _ = sock.shutdown().await;
            }
        });

        let url = Url::parse(&format!("http://{addr}/api/enrollments")).unwrap();
        (url, rx)
    }

    fn row() -> CandidateRow {
        CandidateRow {
            line: 2,
            fields: BTreeMap::from([
                ("student_identifier".to_string(), "a@b.edu".to_string()),
                ("section_identifier".to_string(), "CS201-A".to_string()),
            ]),
            verdict: Verdict::Valid,
        }
    }

    #[tokio::test]
    async fn success_posts_fields_with_token() {
        let (url, mut requests) = stub_server("201 Created", "{}").await;
        let submitter =
            HttpSubmitter::new(url, Some("secret".into()), Duration::from_secs(5)).unwrap();

        assert_eq!(submitter.submit(&row()).await, Ok(()));

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("POST /api/enrollments"));
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains(r#""student_identifier":"a@b.edu""#));
    }

    #[tokio::test]
    async fn client_error_is_rejected_with_server_message() {
        let (url, _requests) =
            stub_server("409 Conflict", r#"{"message":"already enrolled"}"#).await;
        let submitter = HttpSubmitter::new(url, None, Duration::from_secs(5)).unwrap();

        assert_eq!(
            submitter.submit(&row()).await,
            Err(SubmitError::Rejected("already enrolled".into()))
        );
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let (url, _requests) = stub_server("503 Service Unavailable", "").await;
        let submitter = HttpSubmitter::new(url, None, Duration::from_secs(5)).unwrap();

        assert_eq!(
            submitter.submit(&row()).await,
            Err(SubmitError::Transient("503 Service Unavailable".into()))
        );
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let submitter = HttpSubmitter::new(url, None, Duration::from_secs(5)).unwrap();

        match submitter.submit(&row()).await {
            Err(SubmitError::Transient(msg)) => assert!(msg.starts_with("request failed")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut chunk = [0u8; 1024];
            let _ = sock.read(&mut chunk).await;
            // Hold the connection open without answering.
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let url = Url::parse(&format!("http://{addr}/api/enrollments")).unwrap();
        let submitter = HttpSubmitter::new(url, None, Duration::from_millis(100)).unwrap();

        assert_eq!(
            submitter.submit(&row()).await,
            Err(SubmitError::Transient("timed out".into()))
        );
    }

    #[test]
    fn failure_message_prefers_json_fields() {
        assert_eq!(
            failure_message(StatusCode::NOT_FOUND, r#"{"detail":"unknown section"}"#),
            "unknown section"
        );
        assert_eq!(failure_message(StatusCode::BAD_REQUEST, " plain text "), "plain text");
        assert_eq!(failure_message(StatusCode::BAD_REQUEST, ""), "400 Bad Request");
    }
}
