use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Failure of a single model invocation. Everything except `Moderation` is
/// retried by the backoff controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("model call timed out")]
    Timeout,

    #[error("rate limit reached, wait {wait_secs} seconds")]
    RateLimited { wait_secs: u64 },

    #[error("flagged moderation category: {category}")]
    Moderation { category: String },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed stream: {0}")]
    Framing(String),
}

/// Terminal outcome of a response cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("message rejected for moderation category: {category}")]
    ModerationRejected { category: String },

    #[error("model unavailable after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    #[error("malformed arguments for tool {tool}: {reason}")]
    MalformedToolArguments { tool: String, reason: String },

    #[error(transparent)]
    Internal(#[from] byte_common::Error),
}

static RATE_LIMIT_SECONDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:s\b|sec|second)")
        .expect("rate limit regex should compile")
});

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("number regex should compile"));

static MODERATION_CATEGORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)flagged moderation category: (.+?)$")
        .expect("moderation regex should compile")
});

impl InvocationError {
    /// Classify an API failure from its error text.
    ///
    /// The completion API signals rate limiting and moderation only through
    /// the message text, so this is a parsing contract on that text:
    /// - contains `Rate limit reached` -> `RateLimited`, waiting for the
    ///   seconds hint (`7s`, `7 seconds`) or else the first integer found;
    /// - contains `flagged moderation category: <name>` up to end of line ->
    ///   `Moderation { category: <name> }`;
    /// - anything else -> `Api`.
    ///
    /// A 429 status without the phrase falls back to `retry_after` seconds.
    pub fn classify(status: u16, message: &str, retry_after: Option<u64>) -> Self {
        if message.contains("Rate limit reached") {
            return Self::RateLimited {
                wait_secs: wait_hint(message).unwrap_or(1),
            };
        }

        if let Some(category) = MODERATION_CATEGORY
            .captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
        {
            return Self::Moderation { category };
        }

        if status == 429 {
            if let Some(wait_secs) = retry_after {
                return Self::RateLimited { wait_secs };
            }
        }

        Self::Api {
            status,
            message: message.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

fn wait_hint(message: &str) -> Option<u64> {
    if let Some(secs) = RATE_LIMIT_SECONDS
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return Some(secs.ceil() as u64);
    }
    FIRST_NUMBER
        .find(message)
        .and_then(|m| m.as_str().parse::<u64>().ok())
}
