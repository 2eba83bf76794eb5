//! Live provider transport: genai for chat, OpenAI-compatible REST for
//! embeddings and transcription.

use futures_util::StreamExt;
use genai::Client;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest, ChatStreamEvent};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::error::ProviderFailure;
use super::provider::{
    ChatOutput, ChatParams, ChatRole, ChatTurn, ModelProvider, ProviderTokenStream, TokenUsage,
};
use crate::config::ModelConfig;

/// Transport backed by real providers.
///
/// Chat goes through the genai multi-provider client, which resolves the
/// provider from the model name; embeddings and transcription hit
/// OpenAI-compatible REST endpoints directly.
pub struct LiveProvider {
    genai: Client,
    http: reqwest::Client,
    embedding_base_url: String,
    transcription_base_url: String,
    api_key: Option<String>,
}

impl LiveProvider {
    /// Builds the transport from model configuration.
    pub fn new(models: &ModelConfig) -> Self {
        Self {
            genai: Client::default(),
            http: reqwest::Client::new(),
            embedding_base_url: models.embedding_base_url.trim_end_matches('/').to_string(),
            transcription_base_url: models
                .transcription_base_url
                .trim_end_matches('/')
                .to_string(),
            api_key: models.api_key.clone(),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

fn genai_request(turns: &[ChatTurn]) -> ChatRequest {
    let messages: Vec<ChatMessage> = turns
        .iter()
        .map(|t| match t.role {
            ChatRole::System => ChatMessage::system(t.content.clone()),
            ChatRole::User => ChatMessage::user(t.content.clone()),
            ChatRole::Assistant => ChatMessage::assistant(t.content.clone()),
        })
        .collect();
    ChatRequest::new(messages)
}

fn genai_options(params: &ChatParams) -> ChatOptions {
    ChatOptions::default()
        .with_temperature(params.temperature)
        .with_max_tokens(params.max_tokens)
}

/// Classifies a genai transport error by its rendered detail.
///
/// genai flattens provider status into its error display, so the HTTP class
/// is recovered from the text. Unrecognized errors are treated as transient:
/// retrying an unknown failure is cheaper than dropping a recoverable one.
fn classify_genai_error(err: &genai::Error) -> ProviderFailure {
    let detail = err.to_string();
    let lowered = detail.to_lowercase();

    if lowered.contains("429") || lowered.contains("rate limit") {
        return ProviderFailure::transient(detail);
    }
    if lowered.contains("timeout") || lowered.contains("timed out") {
        return ProviderFailure::transient(detail);
    }
    if lowered.contains("500")
        || lowered.contains("502")
        || lowered.contains("503")
        || lowered.contains("504")
        || lowered.contains("overloaded")
    {
        return ProviderFailure::transient(detail);
    }
    if lowered.contains("content_filter")
        || lowered.contains("content policy")
        || lowered.contains("refused")
    {
        return ProviderFailure::policy(detail);
    }
    if lowered.contains("401")
        || lowered.contains("403")
        || lowered.contains("invalid_api_key")
        || lowered.contains("400")
        || lowered.contains("invalid request")
    {
        return ProviderFailure::invalid(detail);
    }

    ProviderFailure::transient(detail)
}

fn classify_http_status(status: reqwest::StatusCode, body: String) -> ProviderFailure {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderFailure::transient(format!("{status}: {body}"))
    } else {
        ProviderFailure::invalid(format!("{status}: {body}"))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ProviderFailure {
    if err.is_timeout() || err.is_connect() {
        ProviderFailure::transient(err.to_string())
    } else {
        ProviderFailure::invalid(err.to_string())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl ModelProvider for LiveProvider {
    async fn chat(
        &self,
        model: &str,
        turns: &[ChatTurn],
        params: &ChatParams,
    ) -> Result<ChatOutput, ProviderFailure> {
        let request = genai_request(turns);
        let options = genai_options(params);

        let response = self
            .genai
            .exec_chat(model, request, Some(&options))
            .await
            .map_err(|e| {
                error!(model, "chat provider error: {e}");
                classify_genai_error(&e)
            })?;

        let content = response.first_text().unwrap_or_default().to_string();

        Ok(ChatOutput {
            content,
            usage: TokenUsage::default(),
        })
    }

    async fn chat_stream(
        &self,
        model: &str,
        turns: &[ChatTurn],
        params: &ChatParams,
    ) -> Result<ProviderTokenStream, ProviderFailure> {
        let request = genai_request(turns);
        let options = genai_options(params);

        let response = self
            .genai
            .exec_chat_stream(model, request, Some(&options))
            .await
            .map_err(|e| {
                error!(model, "chat stream init error: {e}");
                classify_genai_error(&e)
            })?;

        let stream = response.stream.filter_map(|event| async move {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) if !chunk.content.is_empty() => {
                    Some(Ok(chunk.content))
                }
                Ok(ChatStreamEvent::Start) | Ok(ChatStreamEvent::End(_)) => None,
                Ok(_) => None,
                Err(e) => {
                    error!("stream error: {e}");
                    Some(Err(classify_genai_error(&e)))
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderFailure> {
        let url = format!("{}/embeddings", self.embedding_base_url);
        let request = EmbeddingRequest {
            model,
            input: texts,
        };

        let response = self
            .authorize(self.http.post(&url).json(&request))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status, body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderFailure::invalid(format!("embedding response decode: {e}")))?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(ProviderFailure::invalid(format!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                data.len()
            )));
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn transcribe(
        &self,
        model: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ProviderFailure> {
        let url = format!("{}/audio/transcriptions", self.transcription_base_url);

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ProviderFailure::invalid(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .part("file", part);

        let response = self
            .authorize(self.http.post(&url).multipart(form))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status, body));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderFailure::invalid(format!("transcription decode: {e}")))?;

        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::error::FailureKind;

    #[test]
    fn http_status_classification() {
        let transient =
            classify_http_status(reqwest::StatusCode::BAD_GATEWAY, "bad gateway".into());
        assert_eq!(transient.kind, FailureKind::Transient);

        let invalid =
            classify_http_status(reqwest::StatusCode::UNAUTHORIZED, "bad key".into());
        assert_eq!(invalid.kind, FailureKind::Invalid);

        let limited =
            classify_http_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert_eq!(limited.kind, FailureKind::Transient);
    }
}
