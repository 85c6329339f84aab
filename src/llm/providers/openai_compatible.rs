// OpenAI-compatible chat and embedding provider.
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{ReplayError, ReplayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    /// Full chat-completions URL.
    api_base: String,
    embeddings_url: Option<String>,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            embeddings_url: None,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_embeddings_url(mut self, url: Option<String>) -> Self {
        self.embeddings_url = url;
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> ReplayResult<LlmResponse> {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });
        if let Some(max_tokens) = cfg.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            messages = messages.len(),
            "chat request"
        );
        let response = self.post(&self.api_base, &body).await?;

        if cfg.stream {
            accumulate_stream(response).await
        } else {
            parse_completion(response.json().await?)
        }
    }

    async fn embed(&self, input: &str, model: &str) -> ReplayResult<Vec<f32>> {
        let Some(url) = self.embeddings_url.as_deref() else {
            return Err(ReplayError::Config(format!(
                "provider '{}' has no embeddings_url",
                self.id
            )));
        };
        let body = serde_json::json!({ "model": model, "input": input });
        let json: serde_json::Value = self.post(url, &body).await?.json().await?;

        let vector = parse_embedding(&json)?;
        tracing::debug!(provider = %self.id, dims = vector.len(), "embedding received");
        Ok(vector)
    }
}

impl OpenAiCompatibleProvider {
    /// POSTs `body` with the bearer key; non-2xx statuses become errors carrying the body.
    async fn post(&self, url: &str, body: &serde_json::Value) -> ReplayResult<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(ReplayError::LlmProvider(format!("{} returned {status}: {detail}", self.id)))
    }
}

/// Drains an SSE body into one response. Stops at `[DONE]` or end of stream.
async fn accumulate_stream(response: reqwest::Response) -> ReplayResult<LlmResponse> {
    let mut byte_stream = response.bytes_stream();
    let mut pending = String::new();
    let mut out = LlmResponse::default();

    'stream: while let Some(bytes) = byte_stream.next().await {
        pending.push_str(&String::from_utf8_lossy(&bytes?));

        while let Some(newline) = pending.find('\n') {
            let line: String = pending.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match sse_parser::parse_sse_line(line) {
                Ok(Some(chunk)) => match chunk.kind {
                    StreamChunkKind::Reasoning => out.reasoning.push_str(&chunk.content),
                    StreamChunkKind::Content => out.content.push_str(&chunk.content),
                    StreamChunkKind::Done => break 'stream,
                },
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "skipping SSE line"),
            }
        }
    }

    tracing::info!(
        content_len = out.content.len(),
        reasoning_len = out.reasoning.len(),
        "stream finished"
    );
    Ok(out)
}

fn parse_completion(json: serde_json::Value) -> ReplayResult<LlmResponse> {
    let message = &json["choices"][0]["message"];
    let text = |key: &str| message[key].as_str().unwrap_or_default().to_string();
    let out = LlmResponse {
        content: text("content"),
        reasoning: text("reasoning_content"),
    };
    tracing::info!(content_len = out.content.len(), "completion received");
    Ok(out)
}

fn parse_embedding(json: &serde_json::Value) -> ReplayResult<Vec<f32>> {
    let values = json["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| ReplayError::LlmProvider("embedding response without data".into()))?;
    Ok(values
        .iter()
        .filter_map(|v| v.as_f64())
        .map(|f| f as f32)
        .collect())
}
