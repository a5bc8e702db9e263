//! Built-in tool implementations for Cardsmith.
//!
//! The agent gets one tool, `webSearch`, backed by an HTTP search API.

pub mod serper;
pub mod web_search;

use std::sync::Arc;

use cardsmith_config::SearchConfig;
use cardsmith_core::error::ToolError;
use cardsmith_core::search::SearchBackend;
use cardsmith_core::tool::ToolRegistry;

pub use serper::SerperSearch;
pub use web_search::WebSearchTool;

/// Create the tool registry the agent uses.
///
/// Without a search API key the registry is empty and the agent answers
/// from the model alone.
pub fn default_registry(config: &SearchConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    if let Some(api_key) = &config.api_key {
        let backend: Arc<dyn SearchBackend> =
            Arc::new(SerperSearch::new(config.api_url.clone(), api_key.clone())?);
        registry.register(Box::new(search_tool(backend, config)));
    } else {
        tracing::warn!("No search API key configured; webSearch is disabled");
    }
    Ok(registry)
}

/// Build the `webSearch` tool over any backend using the configured ranges.
pub fn search_tool(backend: Arc<dyn SearchBackend>, config: &SearchConfig) -> WebSearchTool {
    WebSearchTool::new(backend, config.min_results, config.max_results)
        .with_default_results(config.default_results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_empty_without_key() {
        let registry = default_registry(&SearchConfig::default()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_has_web_search_with_key() {
        let config = SearchConfig {
            api_key: Some("serper-test".into()),
            ..SearchConfig::default()
        };
        let registry = default_registry(&config).unwrap();
        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, web_search::TOOL_NAME);
    }

    #[tokio::test]
    async fn empty_web_search_arguments_are_a_parse_error() {
        let config = SearchConfig {
            api_key: Some("serper-test".into()),
            ..SearchConfig::default()
        };
        let registry = default_registry(&config).unwrap();
        let err = registry.invoke(web_search::TOOL_NAME, "").await.unwrap_err();
        assert!(matches!(err, ToolError::ArgumentParse { .. }));
    }
}
