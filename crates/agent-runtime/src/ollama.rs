//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference through
//! `ollama-rs`, using the non-streaming chat endpoint.

use std::net::IpAddr;
use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, GenerationOptions, LlmProvider, TokenUsage},
};
use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    error::OllamaError,
    generation::{
        chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    },
    models::ModelOptions as OllamaOptions,
};
use reqwest::Url;
use serde::Deserialize;

const DEFAULT_HOST: &str = "http://localhost";
const DEFAULT_PORT: u16 = 11434;

/// Ollama provider configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Scheme and host, e.g. `http://localhost`
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Request timeout in seconds; `None` waits as long as the model takes
    pub timeout_secs: Option<u64>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            timeout_secs: None,
        }
    }
}

impl OllamaConfig {
    /// Build from `OLLAMA_HOST`, `OLLAMA_PORT` and `OLLAMA_TIMEOUT_SECS`
    /// as returned by `lookup`.
    ///
    /// `OLLAMA_HOST` may be a bare host (`gpu-box`), a host with a port
    /// (`127.0.0.1:11434`) or a full URL. The scheme defaults to `http`.
    /// `OLLAMA_PORT` only applies when the host names no port.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("OLLAMA_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                AgentError::Config(format!("OLLAMA_PORT is not a port number: {raw:?}"))
            })?,
            None => DEFAULT_PORT,
        };
        let (host, port) = match lookup("OLLAMA_HOST").filter(|h| !h.trim().is_empty()) {
            Some(raw) => parse_host(&raw, port)?,
            None => (DEFAULT_HOST.into(), port),
        };
        let timeout_secs = match lookup("OLLAMA_TIMEOUT_SECS") {
            Some(raw) => Some(raw.trim().parse().map_err(|_| {
                AgentError::Config(format!("OLLAMA_TIMEOUT_SECS is not a number: {raw:?}"))
            })?),
            None => None,
        };

        Ok(Self {
            host,
            port,
            timeout_secs,
        })
    }

    /// `scheme://host:port` without a trailing slash
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn is_loopback(&self) -> bool {
        let Ok(url) = Url::parse(&self.host) else {
            return false;
        };
        match url.host_str() {
            Some("localhost") => true,
            Some(host) => host
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .is_ok_and(|ip| ip.is_loopback()),
            None => false,
        }
    }
}

/// Split an `OLLAMA_HOST` value into `scheme://host` and a port
fn parse_host(raw: &str, default_port: u16) -> Result<(String, u16)> {
    let raw = raw.trim().trim_end_matches('/');
    let url = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("http://{raw}"))
    }
    .map_err(|e| AgentError::Config(format!("OLLAMA_HOST is not a valid host: {raw:?} ({e})")))?;

    let host = url
        .host_str()
        .ok_or_else(|| AgentError::Config(format!("OLLAMA_HOST has no host name: {raw:?}")))?;

    Ok((
        format!("{}://{host}", url.scheme()),
        url.port().unwrap_or(default_port),
    ))
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if config.is_loopback() {
            builder = builder.no_proxy();
        }
        let http = builder
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Ollama::new_with_client(config.host.as_str(), config.port, http),
            config,
        })
    }

    /// Whether `model` has been pulled on the server.
    ///
    /// `llama3` and `llama3:latest` name the same model.
    pub async fn has_model(&self, model: &str) -> Result<bool> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| classify(e, &self.config))?;

        tracing::debug!(available = models.len(), model, "listed local models");
        Ok(models.iter().any(|m| same_model(&m.name, model)))
    }

    /// Convert agent messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    // Tools appear as user context
                    Role::User | Role::Tool => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                };
                ChatMessage::new(role, m.content.clone())
            })
            .collect()
    }

    /// Build Ollama generation options
    fn build_options(opts: &GenerationOptions) -> OllamaOptions {
        OllamaOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .top_k(opts.top_k)
            .repeat_penalty(opts.repeat_penalty)
            .num_ctx(u64::from(opts.num_ctx))
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
    }

    /// Convert Ollama response to agent completion
    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        Completion {
            content: response.message.content,
            model: model.to_string(),
            usage: response.final_data.as_ref().map(|d| {
                TokenUsage::new(token_count(d.prompt_eval_count), token_count(d.eval_count))
            }),
        }
    }
}

fn token_count(count: impl Into<Option<u64>>) -> u32 {
    count
        .into()
        .map_or(0, |c| u32::try_from(c).unwrap_or(u32::MAX))
}

fn same_model(listed: &str, wanted: &str) -> bool {
    let untagged = |name: &str| name.strip_suffix(":latest").unwrap_or(name).to_owned();
    untagged(listed) == untagged(wanted)
}

/// Transport failures mean the server is not there; everything else came
/// back from a server that was.
fn classify(err: OllamaError, config: &OllamaConfig) -> AgentError {
    match err {
        OllamaError::ReqwestError(e) if e.is_connect() || e.is_timeout() => {
            AgentError::EndpointUnavailable(format!("{}: {e}", config.base_url()))
        }
        OllamaError::ReqwestError(e) => AgentError::Endpoint {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        },
        OllamaError::Other(body) => AgentError::Endpoint {
            status: None,
            message: error_message(&body),
        },
        other => AgentError::Endpoint {
            status: None,
            message: other.to_string(),
        },
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Pull the `error` field out of an Ollama error body, else use the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .ok()
        .filter(|m| !m.is_empty())
        .or_else(|| Some(body.trim().to_string()).filter(|m| !m.is_empty()))
        .unwrap_or_else(|| "request failed".to_string())
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        tracing::debug!(
            url = %self.config.base_url(),
            model = %options.model,
            messages = messages.len(),
            "sending chat request"
        );

        let request =
            ChatMessageRequest::new(options.model.clone(), Self::convert_messages(messages))
                .options(Self::build_options(options));

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| classify(e, &self.config))?;

        Ok(Self::convert_completion(response, &options.model))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    use super::*;

    const CHAT_REPLY: &str = r#"{
        "model": "deepseek-coder-v2:16b",
        "created_at": "2024-01-01T00:00:00Z",
        "message": {"role": "assistant", "content": "Sure."},
        "done": true,
        "done_reason": "stop",
        "total_duration": 1000,
        "load_duration": 10,
        "prompt_eval_count": 12,
        "prompt_eval_duration": 100,
        "eval_count": 3,
        "eval_duration": 200
    }"#;

    const TAGS_REPLY: &str = r#"{"models": [{
        "name": "deepseek-coder-v2:16b",
        "model": "deepseek-coder-v2:16b",
        "modified_at": "2024-01-01T00:00:00Z",
        "size": 8905125842,
        "digest": "63fb193b3a9b",
        "details": {"format": "gguf", "family": "deepseek2"}
    }]}"#;

    fn config_from(vars: &[(&str, &str)]) -> Result<OllamaConfig> {
        OllamaConfig::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        })
    }

    fn provider_on(port: u16) -> OllamaProvider {
        OllamaProvider::from_config(OllamaConfig {
            host: "http://127.0.0.1".into(),
            port,
            timeout_secs: Some(10),
        })
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.base_url(), "http://localhost:11434");
        assert_eq!(config_from(&[]).unwrap(), config);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = config_from(&[
            ("OLLAMA_HOST", "http://gpu-box/"),
            ("OLLAMA_PORT", "8080"),
            ("OLLAMA_TIMEOUT_SECS", "90"),
        ])
        .unwrap();

        assert_eq!(config.base_url(), "http://gpu-box:8080");
        assert_eq!(config.timeout_secs, Some(90));
    }

    #[test]
    fn test_host_forms() {
        let base_url = |host: &str| {
            config_from(&[("OLLAMA_HOST", host)])
                .unwrap()
                .base_url()
        };

        assert_eq!(base_url("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(base_url("gpu-box"), "http://gpu-box:11434");
        assert_eq!(base_url("https://ollama.internal:8443"), "https://ollama.internal:8443");
        assert_eq!(base_url("http://[::1]:9000/"), "http://[::1]:9000");
    }

    #[test]
    fn test_host_port_wins_over_ollama_port() {
        let config = config_from(&[("OLLAMA_HOST", "10.0.0.5:9999"), ("OLLAMA_PORT", "8080")])
            .unwrap();
        assert_eq!(config.base_url(), "http://10.0.0.5:9999");
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let err = config_from(&[("OLLAMA_PORT", "eleven")]).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));

        let err = config_from(&[("OLLAMA_HOST", "http://")]).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_loopback_compares_the_host() {
        let loopback = |host: &str| config_from(&[("OLLAMA_HOST", host)]).unwrap().is_loopback();

        assert!(loopback("localhost"));
        assert!(loopback("http://127.0.0.1:11434"));
        assert!(loopback("http://[::1]"));
        assert!(!loopback("notlocalhost.example"));
        assert!(!loopback("http://localhost.evil.example"));
        assert!(!loopback("http://10.0.0.5"));
    }

    #[test]
    fn test_same_model_ignores_latest_tag() {
        assert!(same_model("llama3:latest", "llama3"));
        assert!(same_model("llama3", "llama3:latest"));
        assert!(same_model("deepseek-coder-v2:16b", "deepseek-coder-v2:16b"));
        assert!(!same_model("deepseek-coder-v2:16b", "deepseek-coder-v2"));
    }

    #[test]
    fn test_server_error_body_becomes_endpoint_error() {
        let err = classify(
            OllamaError::Other(r#"{"error":"model 'x' not found, try pulling it first"}"#.into()),
            &OllamaConfig::default(),
        );

        match err {
            AgentError::Endpoint { status, message } => {
                assert_eq!(status, None);
                assert_eq!(message, "model 'x' not found, try pulling it first");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(error_message("plain failure"), "plain failure");
        assert_eq!(error_message(""), "request failed");
    }

    /// Serve exactly one HTTP response and hand back the raw request
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (u16, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            tx.send(request).ok();
        });

        (port, rx)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn test_complete_success() {
        let (port, request) = serve_once("200 OK", CHAT_REPLY).await;
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
            Message::tool("[read_file 'a' returned]\nx"),
        ];

        let completion = provider_on(port)
            .complete(&messages, &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(completion.content, "Sure.");
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(15));

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/chat"));
        assert!(request.contains(r#""stream":false"#));
        assert!(request.contains(r#""model":"deepseek-coder-v2:16b""#));
        assert!(request.contains(r#""role":"system""#));
        assert!(!request.contains(r#""role":"tool""#));
        assert!(request.contains(r#""top_k":40"#));
        assert!(request.contains(r#""num_ctx":8192"#));
        assert!(request.contains(r#""num_predict":2048"#));
    }

    #[tokio::test]
    async fn test_complete_server_error() {
        let (port, _request) =
            serve_once("500 Internal Server Error", r#"{"error":"out of memory"}"#).await;

        let err = provider_on(port)
            .complete(&[Message::user("hi")], &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Endpoint { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_complete_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let provider = provider_on(port);

        let err = provider
            .complete(&[Message::user("hi")], &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::EndpointUnavailable(_)), "{err}");
        assert!(!provider.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_has_model_reads_tags() {
        let (port, request) = serve_once("200 OK", TAGS_REPLY).await;
        assert!(provider_on(port).has_model("deepseek-coder-v2:16b").await.unwrap());
        assert!(request.await.unwrap().starts_with("GET /api/tags"));

        let (port, _request) = serve_once("200 OK", TAGS_REPLY).await;
        assert!(!provider_on(port).has_model("qwen2.5-coder:7b").await.unwrap());
    }

    #[tokio::test]
    async fn test_has_model_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = provider_on(port).has_model("llama3").await.unwrap_err();
        assert!(matches!(err, AgentError::EndpointUnavailable(_)), "{err}");
    }
}
