use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::JudgeError;
use crate::judge::{Judge, JudgeRequest, JudgeVerdict};
use crate::parse::parse_verdict;
use crate::prompt::{user_prompt, SYSTEM_PROMPT};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PLACEHOLDER_KEY: &str = "your-api-key-here";

/// Connection and sampling settings for [`ChatCompletionsJudge`].
#[derive(Clone)]
pub struct ChatJudgeConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub model: String,
    /// Bound on the whole request, connect to last byte.
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl std::fmt::Debug for ChatJudgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatJudgeConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Judge backed by an OpenAI-style chat completions endpoint.
pub struct ChatCompletionsJudge {
    client: Client,
    config: ChatJudgeConfig,
}

impl ChatCompletionsJudge {
    pub fn new(config: ChatJudgeConfig) -> Result<Self, JudgeError> {
        let key = config.api_key.expose_secret();
        if key.is_empty() || key == PLACEHOLDER_KEY {
            return Err(JudgeError::NotConfigured("API key missing".into()));
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| JudgeError::Network(format!("build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Send the prompts and return the first choice's text.
    async fn complete(&self, user: &str) -> Result<String, JudgeError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let resp = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(JudgeError::Http { status, body });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(JudgeError::EmptyResponse)
    }
}

#[async_trait]
impl Judge for ChatCompletionsJudge {
    fn name(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(model = %self.config.model, entries = request.transcript.len()))]
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let reply = self.complete(&user_prompt(request)).await?;
        debug!(chars = reply.len(), "judge replied");
        parse_verdict(&reply).inspect_err(|e| {
            warn!(error = %e, "could not parse judge reply");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{Side, SpeechMessage, TranscriptEntry, Winner};
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String) -> ChatJudgeConfig {
        ChatJudgeConfig {
            api_url: url,
            api_key: SecretString::from("sk-test".to_string()),
            model: "gpt-4".into(),
            timeout: Duration::from_secs(5),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }

    fn request() -> JudgeRequest {
        JudgeRequest {
            topic: "T".into(),
            supporting: "alpha-1".into(),
            opposing: "beta-2".into(),
            transcript: vec![TranscriptEntry {
                round: 1,
                speaker: "alpha-1".into(),
                side: Side::Supporting,
                timestamp: "t".into(),
                message: SpeechMessage::markdown("opening"),
            }],
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
        })
    }

    #[tokio::test]
    async fn successful_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4", "max_tokens": 1000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "Verdict: {\"winner\":\"opposing\",\"supporting_score\":61,\"opposing_score\":74,\"summary\":\"Opposing rebutted well.\"}",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let judge = ChatCompletionsJudge::new(config(format!("{}/v1/chat/completions", server.uri()))).unwrap();
        let verdict = judge.judge(&request()).await.unwrap();
        assert_eq!(verdict.winner, Winner::Opposing);
        assert_eq!(verdict.opposing_score, 74);
        assert_eq!(verdict.summary, "Opposing rebutted well.");
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let judge = ChatCompletionsJudge::new(config(server.uri())).unwrap();
        match judge.judge(&request()).await {
            Err(JudgeError::Http { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let judge = ChatCompletionsJudge::new(config(server.uri())).unwrap();
        assert!(matches!(
            judge.judge(&request()).await,
            Err(JudgeError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn prose_reply_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Both did great!")))
            .mount(&server)
            .await;

        let judge = ChatCompletionsJudge::new(config(server.uri())).unwrap();
        assert!(matches!(
            judge.judge(&request()).await,
            Err(JudgeError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("{}"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.timeout = Duration::from_millis(200);
        let judge = ChatCompletionsJudge::new(cfg).unwrap();
        assert!(matches!(judge.judge(&request()).await, Err(JudgeError::Timeout)));
    }

    #[test]
    fn placeholder_key_is_not_configured() {
        let mut cfg = config("http://localhost".into());
        cfg.api_key = SecretString::from(PLACEHOLDER_KEY.to_string());
        assert!(matches!(
            ChatCompletionsJudge::new(cfg),
            Err(JudgeError::NotConfigured(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let cfg = config("http://localhost".into());
        assert!(!format!("{cfg:?}").contains("sk-test"));
    }
}
