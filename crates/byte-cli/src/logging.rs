use std::sync::LazyLock;

use regex::Regex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// A writer that redacts API keys and bot tokens from log output.
pub struct RedactingWriter<W> {
    inner: W,
}

impl RedactingWriter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self {
            inner: std::io::stderr(),
        }
    }
}

impl<W: std::io::Write> std::io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let original = String::from_utf8_lossy(buf);
        let redacted = redact_secrets(&original);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<'a> MakeWriter<'a> for RedactingWriter<std::io::Stderr> {
    type Writer = RedactingWriter<std::io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::stderr()
    }
}

static SECRETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
          sk-\S{20,}                                   # OpenAI-style keys
        | AIza[0-9A-Za-z_\-]{20,}                      # Google API keys
        | Bot\s+[A-Za-z0-9_\-.]{30,}                   # Authorization: Bot <token>
        | [MNO][A-Za-z0-9_\-]{23,25}\.[A-Za-z0-9_\-]{6}\.[A-Za-z0-9_\-]{27,}  # Discord bot tokens
        ",
    )
    .expect("redaction regex should compile")
});

/// Replace known secret shapes with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    SECRETS.replace_all(input, "[REDACTED]").into_owned()
}

/// Install the global subscriber. `level` wins over `RUST_LOG`.
pub fn init(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(RedactingWriter::stderr())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_openai_key() {
        let input = "key=sk-1234567890123456789012345";
        assert_eq!(redact_secrets(input), "key=[REDACTED]");
    }

    #[test]
    fn redacts_google_key() {
        let input = "url=https://www.googleapis.com/customsearch/v1?key=AIzaSyA1234567890abcdefghijk&cx=1";
        assert_eq!(
            redact_secrets(input),
            "url=https://www.googleapis.com/customsearch/v1?key=[REDACTED]&cx=1"
        );
    }

    #[test]
    fn redacts_discord_token() {
        let input = "token MTA5ODc2NTQzMjEwOTg3NjU0.GaBcDe.abcdefghijklmnopqrstuvwxyz12345 rejected";
        assert_eq!(redact_secrets(input), "token [REDACTED] rejected");
    }

    #[test]
    fn leaves_normal_text_unchanged() {
        let input = "conversation 1234567890 answered in 2.3s";
        assert_eq!(redact_secrets(input), input);
    }
}
