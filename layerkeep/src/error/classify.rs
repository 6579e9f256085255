//! Text classification of unstructured surface errors.
//!
//! Map libraries usually throw plain strings. The patterns below cover the
//! messages seen in practice; anything else is treated as `INVALID_STATE`.
//! Patterns are checked in order, so the more specific source/dependency
//! patterns come before the generic layer one.

use regex::Regex;
use std::sync::OnceLock;

use super::{ErrorKind, LayerError};

struct Pattern {
    kind: ErrorKind,
    regex: Regex,
}

fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table = [
            (
                ErrorKind::SurfaceNotReady,
                r#"(?i)style is not (?:done )?loaded|not done loading|map is not ready"#,
            ),
            (ErrorKind::OperationTimeout, r#"(?i)timed? ?out"#),
            (
                ErrorKind::SourceNotFound,
                r#"(?i)source\s+["']([^"']+)["']\s+(?:not found|does not exist)|unknown source\s+["']([^"']+)["']"#,
            ),
            (
                ErrorKind::DependencyMissing,
                r#"(?i)(?:missing )?dependency\s+["']([^"']+)["']"#,
            ),
            (
                ErrorKind::LayerNotFound,
                r#"(?i)layer\s+["']([^"']+)["']\s+(?:does not exist|not found)|non-existing layer\s+["']([^"']+)["']"#,
            ),
        ];
        table
            .into_iter()
            .map(|(kind, pattern)| Pattern {
                kind,
                regex: Regex::new(pattern).unwrap(),
            })
            .collect()
    })
}

/// Classifies an error message.
///
/// `fallback_id` names the layer or source the failing operation targeted;
/// it is used when the message does not quote an id.
pub(crate) fn classify_message(message: &str, fallback_id: &str) -> LayerError {
    for pattern in patterns() {
        let Some(captures) = pattern.regex.captures(message) else {
            continue;
        };
        let id = captures
            .iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| fallback_id.to_string());

        return match pattern.kind {
            ErrorKind::SurfaceNotReady => LayerError::SurfaceNotReady,
            ErrorKind::OperationTimeout => LayerError::OperationTimeout { elapsed_ms: 0 },
            ErrorKind::SourceNotFound => LayerError::source_not_found(id),
            ErrorKind::DependencyMissing => LayerError::dependency_missing(fallback_id, id),
            ErrorKind::LayerNotFound => LayerError::layer_not_found(id),
            ErrorKind::InvalidState | ErrorKind::QueueFull => {
                LayerError::InvalidState(message.to_string())
            }
        };
    }
    LayerError::InvalidState(message.to_string())
}
