//! Line ingestion for `logrelay serve --stdin`.
//!
//! A line that is a JSON object with a `message` field is published with its
//! own `level` (default `log`) and `metadata`. Anything else is published
//! verbatim at `log` level. Blank lines are skipped.

use logrelay_core::{LogLevel, LogMetadata, Logger};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

#[derive(Deserialize)]
struct StructuredLine {
    #[serde(default)]
    level: Option<String>,
    message: String,
    #[serde(default)]
    metadata: Value,
}

/// Parse one input line into a level, message and metadata.
pub fn parse_line(line: &str) -> Option<(LogLevel, String, Option<LogMetadata>)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') {
        if let Ok(structured) = serde_json::from_str::<StructuredLine>(trimmed) {
            let level = structured
                .level
                .as_deref()
                .and_then(|l| l.parse().ok())
                .unwrap_or(LogLevel::Log);
            match LogMetadata::from_value(structured.metadata) {
                Ok(metadata) => return Some((level, structured.message, Some(metadata))),
                Err(e) => debug!(error = %e, "ignoring malformed metadata on input line"),
            }
            return Some((level, structured.message, None));
        }
    }

    Some((LogLevel::Log, trimmed.to_string(), None))
}

/// Publish every line of `reader` through `logger` until EOF. Returns the
/// number of events published; listener failures are logged and skipped.
pub async fn ingest_lines<R>(reader: R, logger: &Logger) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;

    while let Some(line) = lines.next_line().await? {
        let Some((level, message, metadata)) = parse_line(&line) else {
            continue;
        };
        match logger.emit_at(level, message, metadata).await {
            Ok(()) => published += 1,
            Err(e) => warn!(error = %e, "failed to publish input line"),
        }
    }

    debug!(published, "input reached EOF");
    Ok(published)
}
