//! Shared HTTP plumbing for provider adapters.

use std::collections::HashSet;
use std::time::Duration;

use cardsmith_core::error::ProviderError;
use cardsmith_core::message::Turn;
use tracing::warn;

/// Build the HTTP client every adapter uses.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Map a non-success response to a [`ProviderError`].
pub(crate) async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(format!(
            "{provider}: invalid API key or insufficient permissions"
        )));
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider, status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

/// Map a reqwest send failure.
pub(crate) fn send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Ids of tool calls that have a tool-result turn in the transcript.
///
/// Chat APIs reject an assistant tool call that is never answered, so
/// adapters leave unanswered calls off the wire.
pub(crate) fn answered_call_ids(turns: &[Turn]) -> HashSet<&str> {
    turns
        .iter()
        .filter_map(|t| match t {
            Turn::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardsmith_core::message::ToolInvocation;

    #[test]
    fn answered_ids_come_from_tool_turns() {
        let turns = vec![
            Turn::user("q"),
            Turn::Assistant {
                content: None,
                tool_calls: vec![
                    ToolInvocation::new("a", "webSearch", "{}"),
                    ToolInvocation::new("b", "webSearch", "{}"),
                ],
            },
            Turn::Tool {
                tool_call_id: "a".into(),
                content: "{}".into(),
            },
        ];
        let ids = answered_call_ids(&turns);
        assert!(ids.contains("a"));
        assert!(!ids.contains("b"));
    }
}
