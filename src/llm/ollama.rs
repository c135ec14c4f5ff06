use super::*;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Ollama provider implementation
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider with the given base URL and model
    pub fn new(base_url: String, model: String) -> Self {
        // Timeouts are applied per request in `send`
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        }
    }

    fn build_request(&self, request: &GenerateRequest) -> OllamaChatRequest {
        OllamaChatRequest {
            model: request
                .model_override
                .clone()
                .unwrap_or_else(|| self.model.clone()),
            messages: request
                .messages
                .iter()
                .map(|t| OllamaMessage {
                    role: t.role,
                    content: t.content.clone(),
                })
                .collect(),
            stream: true,
            options: Some(OllamaOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
                top_p: request.top_p,
            }),
        }
    }

    async fn send(&self, request: &GenerateRequest) -> LlmResult<reqwest::Response> {
        let body = self.build_request(request);
        let url = format!("{}/api/chat", self.base_url);

        let response = tokio::time::timeout(
            request.timeout,
            self.client.post(&url).json(&body).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(request.timeout))?
        .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ApiError(format!(
                "Ollama API returned status: {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: TurnRole,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

/// One line of a streamed `/api/chat` response
#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

struct LineReader<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    finished: bool,
}

/// Turn a newline-delimited JSON byte stream into content fragments.
/// Ends after the `done` chunk, the first error, or end of input.
fn ndjson_fragments<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let reader = LineReader {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        finished: false,
    };

    Box::pin(stream::unfold(reader, |mut reader| async move {
        loop {
            if reader.finished {
                return None;
            }

            if let Some(pos) = reader.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = reader.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let chunk: OllamaChatChunk = match serde_json::from_str(line) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        reader.finished = true;
                        return Some((Err(LlmError::ParseError(e.to_string())), reader));
                    }
                };
                if let Some(error) = chunk.error {
                    reader.finished = true;
                    return Some((Err(LlmError::ApiError(error)), reader));
                }
                reader.finished = chunk.done;

                let text = chunk.message.map(|m| m.content).unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                return Some((Ok(text), reader));
            }

            match reader.bytes.next().await {
                Some(Ok(bytes)) => reader.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    reader.finished = true;
                    return Some((Err(LlmError::ApiError(e.to_string())), reader));
                }
                None if reader.buffer.iter().all(u8::is_ascii_whitespace) => return None,
                // Last line without a trailing newline
                None => reader.buffer.push(b'\n'),
            }
        }
    }))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn stream(&self, request: GenerateRequest) -> LlmResult<FragmentStream> {
        let response = self.send(&request).await?;
        Ok(ndjson_fragments(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + Unpin {
        let items: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(items)
    }

    async fn collect(parts: &[&str]) -> Vec<LlmResult<String>> {
        ndjson_fragments(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn test_ndjson_split_across_chunks() {
        let fragments = collect(&[
            r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
            "\n{\"message\":{\"role\":\"assistant\",\"con",
            r#"tent":"lo"},"done":false}"#,
            "\n{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        ])
        .await;

        let texts: Vec<String> = fragments.into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(texts, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[tokio::test]
    async fn test_ndjson_last_line_without_newline() {
        let fragments =
            collect(&[r#"{"message":{"role":"assistant","content":"only"},"done":true}"#]).await;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_deref().unwrap(), "only");
    }

    #[tokio::test]
    async fn test_ndjson_stops_at_done() {
        let fragments = collect(&[
            "{\"message\":{\"role\":\"assistant\",\"content\":\"a\"},\"done\":true}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"ignored\"},\"done\":false}\n",
        ])
        .await;
        assert_eq!(fragments.len(), 1);
    }

    #[tokio::test]
    async fn test_ndjson_error_line() {
        let fragments = collect(&["{\"error\":\"model not found\"}\n"]).await;
        assert_eq!(fragments.len(), 1);
        assert!(matches!(&fragments[0], Err(LlmError::ApiError(msg)) if msg == "model not found"));
    }

    #[tokio::test]
    async fn test_ndjson_malformed_line() {
        let fragments = collect(&["not json\n"]).await;
        assert!(matches!(&fragments[0], Err(LlmError::ParseError(_))));
    }

    #[test]
    fn test_request_body() {
        let provider =
            OllamaProvider::new("http://localhost:11434/".to_string(), "llama3.2".to_string());
        let request = GenerateRequest {
            messages: vec![ChatTurn::new(TurnRole::User, "hi")],
            max_tokens: Some(50),
            temperature: Some(0.5),
            top_p: None,
            timeout: Duration::from_secs(5),
            model_override: None,
        };

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["options"]["num_predict"], 50);
        assert!(body["options"].get("top_p").is_none());
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    #[ignore] // Only run with Ollama running locally
    async fn test_ollama_stream() {
        let provider =
            OllamaProvider::new("http://localhost:11434".to_string(), "llama3.2".to_string());
        let request = GenerateRequest {
            messages: vec![ChatTurn::new(TurnRole::User, "Say hello")],
            max_tokens: Some(20),
            temperature: None,
            top_p: None,
            timeout: Duration::from_secs(30),
            model_override: None,
        };

        let fragments: Vec<_> = provider.stream(request).await.unwrap().collect().await;
        assert!(!fragments.is_empty());
    }
}
