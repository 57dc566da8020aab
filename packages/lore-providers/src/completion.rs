use std::pin::Pin;

use futures::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Incremental answer text. Dropping the stream aborts the underlying request.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: String,
	pub content: String,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: "system".to_string(), content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: "user".to_string(), content: content.into() }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self { role: "assistant".to_string(), content: content.into() }
	}
}

/// One-shot completion. `max_tokens` overrides the configured answer ceiling.
pub async fn complete(
	cfg: &lore_config::LlmProviderConfig,
	messages: &[ChatMessage],
	max_tokens: Option<u32>,
) -> Result<String> {
	let client = crate::http_client(cfg.timeout_ms)?;
	let body = request_body(cfg, messages, max_tokens, false);
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_response(&json)
}

/// Streamed completion over server-sent events. Ends at `[DONE]` or when the body closes.
pub async fn stream(
	cfg: &lore_config::LlmProviderConfig,
	messages: &[ChatMessage],
) -> Result<ChunkStream> {
	let client = crate::http_client(cfg.timeout_ms)?;
	let body = request_body(cfg, messages, None, true);
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?;

	Ok(Box::pin(sse_chunks(res.bytes_stream())))
}

fn request_body(
	cfg: &lore_config::LlmProviderConfig,
	messages: &[ChatMessage],
	max_tokens: Option<u32>,
	stream: bool,
) -> Value {
	serde_json::json!({
		"model": cfg.model,
		"messages": messages,
		"stream": stream,
		"temperature": cfg.temperature,
		"top_p": cfg.top_p,
		"max_tokens": max_tokens.unwrap_or(cfg.max_tokens),
	})
}

fn parse_completion_response(json: &Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(|content| content.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing choices[0].message.content.".to_string(),
		})
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
	Skip,
	Content(String),
	Done,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
	let trimmed = line.trim();

	if trimmed.is_empty()
		|| trimmed.starts_with(':')
		|| trimmed.starts_with("event:")
		|| trimmed.starts_with("id:")
		|| trimmed.starts_with("retry:")
	{
		return Ok(SseLine::Skip);
	}

	let data = trimmed.strip_prefix("data:").map(str::trim).unwrap_or(trimmed);

	if data.is_empty() {
		return Ok(SseLine::Skip);
	}
	if data == "[DONE]" {
		return Ok(SseLine::Done);
	}

	let json: Value = serde_json::from_str(data)?;
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("delta"))
		.and_then(|delta| delta.get("content"))
		.and_then(|content| content.as_str())
		.unwrap_or_default();

	if content.is_empty() { Ok(SseLine::Skip) } else { Ok(SseLine::Content(content.to_string())) }
}

struct SseState<S> {
	body: Pin<Box<S>>,
	buffer: Vec<u8>,
	finished: bool,
}

/// Splits the byte stream on newlines before decoding, so multi-byte characters that straddle
/// network chunks survive intact.
fn sse_chunks<S, B>(body: S) -> impl Stream<Item = Result<String>> + Send
where
	S: Stream<Item = reqwest::Result<B>> + Send + 'static,
	B: AsRef<[u8]> + Send,
{
	let state = SseState { body: Box::pin(body), buffer: Vec::new(), finished: false };

	stream::unfold(state, |mut state| async move {
		loop {
			if state.finished {
				return None;
			}

			if let Some(newline) = state.buffer.iter().position(|byte| *byte == b'\n') {
				let line: Vec<u8> = state.buffer.drain(..=newline).collect();

				match parse_sse_line(&String::from_utf8_lossy(&line)) {
					Ok(SseLine::Skip) => continue,
					Ok(SseLine::Content(content)) => return Some((Ok(content), state)),
					Ok(SseLine::Done) => {
						state.finished = true;

						return None;
					},
					Err(err) => {
						tracing::debug!(error = %err, "Skipping unparsable completion chunk.");

						continue;
					},
				}
			}

			match state.body.next().await {
				Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
				Some(Err(err)) => {
					state.finished = true;

					return Some((Err(Error::from(err)), state));
				},
				None => {
					state.finished = true;

					let rest = std::mem::take(&mut state.buffer);

					return match parse_sse_line(&String::from_utf8_lossy(&rest)) {
						Ok(SseLine::Content(content)) => Some((Ok(content), state)),
						_ => None,
					};
				},
			}
		}
	})
}
