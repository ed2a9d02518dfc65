use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::retry::{Attempt, OverloadRetry, retry_on_overload};
use super::{InferenceClient, InferenceError, TRANSCRIPTION_PROMPT};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// `generateContent` client for the Gemini API.
pub struct GeminiClient {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
    retry: OverloadRetry,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(client: Client, api_base: String, model: String, api_key: String) -> Self {
        Self {
            client,
            api_base,
            model,
            api_key,
            retry: OverloadRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: OverloadRetry) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    async fn send_once(&self, payload: &Value, attempt: u32) -> Result<Attempt<GenerateResponse>, InferenceError> {
        tracing::debug!(model = %self.model, attempt, "Sending generateContent request");
        let resp = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(Attempt::Overloaded);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Gemini API error");
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = resp
            .json::<GenerateResponse>()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))?;
        Ok(Attempt::Done(parsed))
    }
}

pub fn mime_type_for(image: &Path) -> &'static str {
    let ext = image
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

pub fn build_payload(prompt: &str, mime_type: &str, data_base64: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                {
                    "inline_data": {
                        "mime_type": mime_type,
                        "data": data_base64,
                    }
                }
            ]
        }]
    })
}

fn first_text(resp: GenerateResponse) -> Option<String> {
    resp.candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
        .filter(|t| !t.trim().is_empty())
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn transcribe(&self, image: &Path) -> Result<String, InferenceError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|source| InferenceError::ImageRead {
                path: image.to_path_buf(),
                source,
            })?;

        let payload = build_payload(TRANSCRIPTION_PROMPT, mime_type_for(image), &STANDARD.encode(&bytes));
        tracing::info!(model = %self.model, bytes = bytes.len(), "Requesting transcription");

        let payload = &payload;
        let resp = retry_on_overload(&self.retry, move |attempt| self.send_once(payload, attempt)).await?;

        match first_text(resp) {
            Some(text) => Ok(text),
            None => {
                tracing::warn!(model = %self.model, "No candidates returned");
                Err(InferenceError::EmptyResponse)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serves one canned response per connection, in order.
    async fn fake_api(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>, Arc<tokio::sync::Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let hits_srv = hits.clone();
        let requests_srv = requests.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                hits_srv.fetch_add(1, Ordering::SeqCst);
                let raw = read_request(&mut socket).await;
                requests_srv.lock().await.push(raw);
                let reason = match status {
                    200 => "OK",
                    503 => "Service Unavailable",
                    _ => "Error",
                };
                let resp = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(resp.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}/v1beta"), hits, requests)
    }

    fn client(base: String) -> GeminiClient {
        GeminiClient::new(Client::new(), base, "gemini-1.5-flash".into(), "test-key".into())
            .with_retry(OverloadRetry {
                max_attempts: 3,
                backoff_unit: Duration::from_millis(1),
            })
    }

    fn image_fixture() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, b"\x89PNG fake image bytes").unwrap();
        (dir, path)
    }

    fn ok_body(text: &str) -> String {
        json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
        .to_string()
    }

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(mime_type_for(Path::new("a.png")), "image/png");
        assert_eq!(mime_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("no_extension")), "image/jpeg");
    }

    #[test]
    fn test_build_payload_shape() {
        let payload = build_payload("describe", "image/png", "AAAA");
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "describe");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AAAA");
    }

    #[test]
    fn test_first_text_skips_empty() {
        let resp: GenerateResponse = serde_json::from_str(&ok_body("   ")).unwrap();
        assert!(first_text(resp).is_none());
        let resp: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(first_text(resp).is_none());
    }

    #[tokio::test]
    async fn test_transcribe_success() {
        let (base, hits, requests) = fake_api(vec![(200, ok_body("Hello notes"))]).await;
        let (_dir, image) = image_fixture();

        let text = client(base).transcribe(&image).await.unwrap();
        assert_eq!(text, "Hello notes");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let raw = requests.lock().await[0].clone();
        assert!(raw.starts_with("POST /v1beta/models/gemini-1.5-flash:generateContent"));
        assert!(raw.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(raw.contains("\"mime_type\":\"image/png\""));
        assert!(raw.contains(&STANDARD.encode(b"\x89PNG fake image bytes")));
    }

    #[tokio::test]
    async fn test_three_overloads_give_up() {
        let overloaded = json!({ "error": { "code": 503 } }).to_string();
        let (base, hits, _) = fake_api(vec![
            (503, overloaded.clone()),
            (503, overloaded.clone()),
            (503, overloaded),
        ])
        .await;
        let (_dir, image) = image_fixture();

        let err = client(base).transcribe(&image).await.unwrap_err();
        assert!(matches!(err, InferenceError::Overloaded { attempts: 3 }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_overload_then_success() {
        let (base, hits, _) = fake_api(vec![
            (503, "{}".to_string()),
            (200, ok_body("second time lucky")),
        ])
        .await;
        let (_dir, image) = image_fixture();

        let text = client(base).transcribe(&image).await.unwrap();
        assert_eq!(text, "second time lucky");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (base, hits, _) = fake_api(vec![(400, r#"{"error":"API key not valid"}"#.to_string())]).await;
        let (_dir, image) = image_fixture();

        let err = client(base).transcribe(&image).await.unwrap_err();
        match err {
            InferenceError::Api { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("API key not valid"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let (base, _, _) = fake_api(vec![(200, r#"{"candidates":[]}"#.to_string())]).await;
        let (_dir, image) = image_fixture();

        let err = client(base).transcribe(&image).await.unwrap_err();
        assert!(matches!(err, InferenceError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_missing_image_fails_before_request() {
        let err = client("http://127.0.0.1:9/v1beta".into())
            .transcribe(Path::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::ImageRead { .. }));
    }
}
