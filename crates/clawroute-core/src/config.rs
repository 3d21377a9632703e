//! Router configuration
//!
//! Loaded once by the caller (see the binary's loader) and handed to the
//! router as a frozen struct. Every section defaults to the stock
//! OpenRouter free-tier setup.

use crate::category::TaskCategory;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{Error, Result};
use crate::health::HealthConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default endpoint identifier
pub const STEP_FLASH: &str = "stepfun/step-3.5-flash:free";
/// Secondary free-tier endpoint
pub const TRINITY_LARGE: &str = "arcee-ai/trinity-large-preview:free";

/// Max output tokens used when an endpoint has no descriptor
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Static description of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Endpoint (model) identifier
    pub id: String,
    /// Short display name
    #[serde(default)]
    pub alias: Option<String>,
    /// USD per million input tokens
    #[serde(default)]
    pub price_per_1m_input: f64,
    /// USD per million output tokens
    #[serde(default)]
    pub price_per_1m_output: f64,
    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Lower is preferred
    #[serde(default)]
    pub priority: u32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl EndpointDescriptor {
    /// Create a free endpoint with default limits
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: None,
            price_per_1m_input: 0.0,
            price_per_1m_output: 0.0,
            max_tokens: DEFAULT_MAX_TOKENS,
            priority: 0,
        }
    }

    /// Set prices (USD per million tokens)
    #[must_use]
    pub fn with_pricing(mut self, input: f64, output: f64) -> Self {
        self.price_per_1m_input = input;
        self.price_per_1m_output = output;
        self
    }

    /// Set priority
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set alias
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Estimated cost in USD
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (f64::from(input_tokens) / 1_000_000.0) * self.price_per_1m_input
            + (f64::from(output_tokens) / 1_000_000.0) * self.price_per_1m_output
    }
}

/// Ordered candidate endpoints per category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Candidates for `chat`
    pub chat: Vec<String>,
    /// Candidates for `reason`
    pub reason: Vec<String>,
    /// Candidates for `reason_strict`
    pub reason_strict: Vec<String>,
    /// Candidates for `tool`
    pub tool: Vec<String>,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            chat: vec!["minimax/minimax-m2.5".to_string()],
            reason: vec![STEP_FLASH.to_string()],
            reason_strict: vec!["deepseek/deepseek-v3.2".to_string(), STEP_FLASH.to_string()],
            tool: vec![TRINITY_LARGE.to_string()],
        }
    }
}

impl CandidateConfig {
    /// Candidates for `category`, in priority order
    #[must_use]
    pub fn for_category(&self, category: TaskCategory) -> &[String] {
        match category {
            TaskCategory::Chat => &self.chat,
            TaskCategory::Reason => &self.reason,
            TaskCategory::ReasonStrict => &self.reason_strict,
            TaskCategory::Tool => &self.tool,
        }
    }
}

/// Prompt length thresholds (in characters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthThresholds {
    /// Below this everything is chat
    pub short_chat: usize,
    /// Below this everything but JSON requests is chat
    pub medium_chat: usize,
    /// Above this reasoning keywords select `reason`
    pub long_reason_boost: usize,
    /// Above this code selects `reason` instead of `chat`
    pub code_reason_boost_length: usize,
}

impl Default for LengthThresholds {
    fn default() -> Self {
        Self {
            short_chat: 40,
            medium_chat: 80,
            long_reason_boost: 500,
            code_reason_boost_length: 500,
        }
    }
}

/// Base scores for [`debug_scores`](crate::classifier::TaskClassifier::debug_scores)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    /// Base score for chat
    pub chat: f64,
    /// Base score for reason
    pub reason: f64,
    /// Base score for reason_strict
    pub reason_strict: f64,
    /// Base score for tool
    pub tool: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            chat: 1.0,
            reason: 1.0,
            reason_strict: 1.0,
            tool: 1.0,
        }
    }
}

/// Task classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Keywords that force `reason_strict`
    pub strict_keywords: Vec<String>,
    /// Keywords that select `reason` for long prompts
    pub reason_keywords: Vec<String>,
    /// Length thresholds
    pub thresholds: LengthThresholds,
    /// Base scores
    pub weights: CategoryWeights,
    /// Whether code indicators are considered
    pub code_detection: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let strings = |words: &[&str]| words.iter().map(|w| (*w).to_string()).collect();
        Self {
            strict_keywords: strings(&["證明", "反證", "最小化", "最佳化", "複雜度", "嚴格", "formal"]),
            reason_keywords: strings(&[
                "為什麼",
                "推理",
                "分析",
                "步驟",
                "一步一步",
                "深入思考",
                "架構設計",
                "優缺點",
                "取捨",
                "reason step by step",
                "step by step",
                "analyze",
                "analysis",
                "design an architecture",
                "architecture design",
                "trade-offs",
                "pros and cons",
            ]),
            thresholds: LengthThresholds::default(),
            weights: CategoryWeights::default(),
            code_detection: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also emit every routing log entry as a debug event
    pub debug_route: bool,
    /// Append routing log entries to `routing_log_path`
    pub routing_log: bool,
    /// JSON-lines routing log file
    pub routing_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug_route: false,
            routing_log: false,
            routing_log_path: PathBuf::from("./routing.log"),
        }
    }
}

/// Complete router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Known endpoints with pricing and limits
    pub endpoints: Vec<EndpointDescriptor>,
    /// Used when a category has no candidates
    pub default_endpoint: String,
    /// Substitutes for endpoints in poor health
    pub fallbacks: Vec<String>,
    /// Candidates per category
    pub candidates: CandidateConfig,
    /// Classifier settings
    pub classifier: ClassifierConfig,
    /// Circuit breaker settings
    pub circuit_breaker: CircuitBreakerConfig,
    /// Health monitor settings
    pub health: HealthConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Deadline for one completion call
    pub request_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                EndpointDescriptor::new(STEP_FLASH)
                    .with_alias("step")
                    .with_priority(2),
                EndpointDescriptor::new(TRINITY_LARGE)
                    .with_alias("trinity")
                    .with_priority(3),
            ],
            default_endpoint: STEP_FLASH.to_string(),
            fallbacks: vec![TRINITY_LARGE.to_string()],
            candidates: CandidateConfig::default(),
            classifier: ClassifierConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
            request_timeout_ms: 120_000,
        }
    }
}

impl RouterConfig {
    /// Deadline for one completion call
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Descriptor for `id`
    #[must_use]
    pub fn endpoint(&self, id: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    /// Endpoints sorted by priority, then id
    #[must_use]
    pub fn endpoints_by_priority(&self) -> Vec<&EndpointDescriptor> {
        let mut endpoints: Vec<_> = self.endpoints.iter().collect();
        endpoints.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        endpoints
    }

    /// Reject settings the router cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.default_endpoint.trim().is_empty() {
            return Err(invalid("default_endpoint must not be empty"));
        }
        if self.health.window_size == 0 {
            return Err(invalid("health.window_size must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.health.success_rate_threshold) {
            return Err(invalid("health.success_rate_threshold must be within 0..=1"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(invalid("circuit_breaker.failure_threshold must be at least 1"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms must be positive"));
        }

        let t = &self.classifier.thresholds;
        if t.short_chat > t.medium_chat {
            return Err(invalid(
                "classifier.thresholds.short_chat must not exceed medium_chat",
            ));
        }

        let keywords = self
            .classifier
            .strict_keywords
            .iter()
            .chain(&self.classifier.reason_keywords);
        for keyword in keywords {
            if keyword.trim().is_empty() {
                return Err(invalid("classifier keywords must not be empty"));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.id.trim().is_empty() {
                return Err(invalid("endpoint id must not be empty"));
            }
            if !seen.insert(endpoint.id.as_str()) {
                return Err(invalid(&format!("duplicate endpoint {}", endpoint.id)));
            }
            if endpoint.price_per_1m_input < 0.0 || endpoint.price_per_1m_output < 0.0 {
                return Err(invalid(&format!("negative price for {}", endpoint.id)));
            }
        }

        for category in TaskCategory::ALL {
            if self
                .candidates
                .for_category(category)
                .iter()
                .any(|c| c.trim().is_empty())
            {
                return Err(invalid(&format!("empty candidate for {category}")));
            }
        }

        Ok(())
    }
}

fn invalid(message: &str) -> Error {
    Error::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.default_endpoint, STEP_FLASH);
        assert_eq!(config.fallbacks, vec![TRINITY_LARGE.to_string()]);
        assert_eq!(
            config.candidates.for_category(TaskCategory::ReasonStrict),
            ["deepseek/deepseek-v3.2".to_string(), STEP_FLASH.to_string()]
        );
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.health.window_size, 20);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert!(config.classifier.strict_keywords.contains(&"formal".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoints_by_priority() {
        let mut config = RouterConfig::default();
        config
            .endpoints
            .push(EndpointDescriptor::new("paid/model").with_priority(1));
        let ids: Vec<_> = config
            .endpoints_by_priority()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["paid/model", STEP_FLASH, TRINITY_LARGE]);
        assert_eq!(config.endpoint(TRINITY_LARGE).unwrap().max_tokens, 4096);
    }

    #[test]
    fn test_calculate_cost() {
        let endpoint = EndpointDescriptor::new("m").with_pricing(10.0, 20.0);
        assert!((endpoint.calculate_cost(1_000_000, 1_000_000) - 30.0).abs() < 1e-9);
        assert!((endpoint.calculate_cost(1_000, 500) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RouterConfig::default();
        config.health.window_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = RouterConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.default_endpoint = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.classifier.strict_keywords.push(String::new());
        assert!(config.validate().is_err());

        let mut config = RouterConfig::default();
        config.endpoints.push(EndpointDescriptor::new(STEP_FLASH));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: RouterConfig = serde_json::from_str(
            r#"{"request_timeout_ms": 5000, "health": {"window_size": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.health.window_size, 5);
        assert_eq!(config.health.latency_threshold_ms, 5000);
        assert_eq!(config.default_endpoint, STEP_FLASH);
    }
}
