//! Task classifier
//!
//! A total, deterministic mapping from prompt text to [`TaskCategory`].
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. shorter than `short_chat` -> chat
//! 2. shorter than `medium_chat` and not a JSON/schema request -> chat
//! 3. JSON/schema request -> tool
//! 4. strict keyword -> reason_strict
//! 5. code indicator -> reason when longer than `code_reason_boost_length`, else chat
//! 6. longer than `long_reason_boost` with a reasoning keyword -> reason
//! 7. chat
//!
//! Lengths are counted in characters. Keyword matching is case-insensitive.

use crate::category::TaskCategory;
use crate::config::ClassifierConfig;
use serde::Serialize;

/// Substrings that mark a prompt as containing code
const CODE_INDICATORS: &[&str] = &[
    "```", "function ", "def ", "class ", "import ", "require(", "<?php", "#!/", "<?=", "<%@", "%>",
];

/// Rule that decided a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationRule {
    /// Rule 1
    ShortPrompt,
    /// Rule 2
    MediumPrompt,
    /// Rule 3
    JsonSchema,
    /// Rule 4
    StrictKeyword,
    /// Rule 5, long prompt
    LongCode,
    /// Rule 5, short prompt
    Code,
    /// Rule 6
    LongReasoning,
    /// Rule 7
    Default,
}

/// Classification with the evidence behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// Resulting category
    pub category: TaskCategory,
    /// Deciding rule
    pub rule: ClassificationRule,
    /// Keywords matched by the deciding rule
    pub matched_keywords: Vec<String>,
    /// Prompt length in characters
    pub length: usize,
}

/// Additive per-category scores, for diagnostics only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScores {
    /// Chat score
    pub chat: f64,
    /// Reason score
    pub reason: f64,
    /// Strict reasoning score
    pub reason_strict: f64,
    /// Tool score
    pub tool: f64,
}

/// Keyword and length based task classifier
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    config: ClassifierConfig,
    strict_lower: Vec<String>,
    reason_lower: Vec<String>,
}

impl TaskClassifier {
    /// Create a classifier
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        let lower = |words: &[String]| words.iter().map(|w| w.to_lowercase()).collect();
        Self {
            strict_lower: lower(&config.strict_keywords),
            reason_lower: lower(&config.reason_keywords),
            config,
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a prompt
    #[must_use]
    pub fn classify(&self, prompt: &str) -> TaskCategory {
        self.classify_detailed(prompt).category
    }

    /// Classify a prompt and report the deciding rule and keywords
    #[must_use]
    pub fn classify_detailed(&self, prompt: &str) -> Classification {
        let t = &self.config.thresholds;
        let length = prompt.chars().count();
        let lower = prompt.to_lowercase();
        let json = has_json_schema(prompt, &lower);

        let decided = |category, rule, matched_keywords| Classification {
            category,
            rule,
            matched_keywords,
            length,
        };

        if length < t.short_chat {
            return decided(TaskCategory::Chat, ClassificationRule::ShortPrompt, Vec::new());
        }
        if length < t.medium_chat && !json {
            return decided(TaskCategory::Chat, ClassificationRule::MediumPrompt, Vec::new());
        }
        if json {
            return decided(TaskCategory::Tool, ClassificationRule::JsonSchema, Vec::new());
        }

        let strict = matching(&lower, &self.config.strict_keywords, &self.strict_lower);
        if !strict.is_empty() {
            return decided(TaskCategory::ReasonStrict, ClassificationRule::StrictKeyword, strict);
        }

        if self.config.code_detection && contains_code(prompt) {
            return if length > t.code_reason_boost_length {
                decided(TaskCategory::Reason, ClassificationRule::LongCode, Vec::new())
            } else {
                decided(TaskCategory::Chat, ClassificationRule::Code, Vec::new())
            };
        }

        if length > t.long_reason_boost {
            let reason = matching(&lower, &self.config.reason_keywords, &self.reason_lower);
            if !reason.is_empty() {
                return decided(TaskCategory::Reason, ClassificationRule::LongReasoning, reason);
            }
        }

        decided(TaskCategory::Chat, ClassificationRule::Default, Vec::new())
    }

    /// Per-category scores starting from the configured weights
    ///
    /// Mirrors the rule conditions without short-circuiting after the first
    /// match (except for short prompts), so overlapping signals are visible.
    #[must_use]
    pub fn debug_scores(&self, prompt: &str) -> CategoryScores {
        let t = &self.config.thresholds;
        let w = &self.config.weights;
        let length = prompt.chars().count();
        let lower = prompt.to_lowercase();
        let json = has_json_schema(prompt, &lower);

        let mut scores = CategoryScores {
            chat: w.chat,
            reason: w.reason,
            reason_strict: w.reason_strict,
            tool: w.tool,
        };

        if length < t.short_chat {
            scores.chat += 10.0;
            return scores;
        }
        if length < t.medium_chat && !json {
            scores.chat += 5.0;
        }
        if json {
            scores.tool += 5.0;
        }
        if self.strict_lower.iter().any(|k| lower.contains(k.as_str())) {
            scores.reason_strict += 10.0;
        }
        if self.config.code_detection && contains_code(prompt) {
            scores.chat += 3.0;
            if length > t.code_reason_boost_length {
                scores.reason += 2.0;
            }
        }
        if length > t.long_reason_boost && self.reason_lower.iter().any(|k| lower.contains(k.as_str())) {
            scores.reason += 3.0;
        }
        scores
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

/// "json" or "schema" (any case) together with a bracket character
fn has_json_schema(text: &str, lower: &str) -> bool {
    (lower.contains("json") || lower.contains("schema"))
        && text.contains(|c| matches!(c, '[' | ']' | '{' | '}'))
}

fn contains_code(text: &str) -> bool {
    CODE_INDICATORS.iter().any(|ind| text.contains(ind))
}

/// Original spellings of the keywords whose lowercase form occurs in `lower`
fn matching(lower: &str, original: &[String], lowered: &[String]) -> Vec<String> {
    original
        .iter()
        .zip(lowered)
        .filter(|(_, k)| lower.contains(k.as_str()))
        .map(|(o, _)| o.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> TaskClassifier {
        TaskClassifier::default()
    }

    fn pad(prefix: &str, len: usize) -> String {
        let mut s = prefix.to_string();
        while s.chars().count() < len {
            s.push_str(" and more");
        }
        s
    }

    #[test]
    fn test_examples() {
        let c = classifier();
        assert_eq!(c.classify("Hi there"), TaskCategory::Chat);
        assert_eq!(
            c.classify("Convert this to JSON: { \"name\": \"test\" }"),
            TaskCategory::Tool
        );

        let long = pad("Please walk me through it step by step", 600);
        assert!(long.chars().count() >= 600);
        assert_eq!(c.classify(&long), TaskCategory::Reason);
        let detailed = c.classify_detailed(&long);
        assert_eq!(detailed.rule, ClassificationRule::LongReasoning);
        assert_eq!(detailed.matched_keywords, vec!["step by step".to_string()]);
    }

    #[test]
    fn test_empty_prompt_is_chat() {
        let d = classifier().classify_detailed("");
        assert_eq!(d.category, TaskCategory::Chat);
        assert_eq!(d.rule, ClassificationRule::ShortPrompt);
        assert_eq!(d.length, 0);
    }

    #[test]
    fn test_short_prompts_are_chat_regardless_of_content() {
        let c = classifier();
        for prompt in ["formal proof {json}", "```def f(): pass```", "證明這個定理", "schema []"] {
            assert!(prompt.chars().count() < 40);
            assert_eq!(c.classify(prompt), TaskCategory::Chat, "{prompt}");
        }
    }

    #[test]
    fn test_medium_json_is_tool() {
        // 40..80 chars: JSON requests escape the medium-length chat rule
        let prompt = "Return a JSON list like [1, 2, 3] for the numbers";
        let len = prompt.chars().count();
        assert!((40..80).contains(&len));
        assert_eq!(classifier().classify(prompt), TaskCategory::Tool);
    }

    #[test]
    fn test_strict_keyword_wins_over_code_and_reasoning() {
        let prompt = pad("Give a formal argument, step by step, for this function body", 700);
        let d = classifier().classify_detailed(&prompt);
        assert_eq!(d.category, TaskCategory::ReasonStrict);
        assert_eq!(d.rule, ClassificationRule::StrictKeyword);
        assert_eq!(d.matched_keywords, vec!["formal".to_string()]);
    }

    #[test]
    fn test_strict_keyword_is_case_insensitive_and_multilingual() {
        let c = classifier();
        let en = pad("We need a FORMAL treatment of the scheduling problem", 90);
        assert_eq!(c.classify(&en), TaskCategory::ReasonStrict);

        let zh = "請證明以下命題在所有正整數上成立，並且說明每一個推導環節所依據的定理與引理，不要省略任何中間過程。這是作業要求的一部分，請完整寫出來，越詳細越好，謝謝你的幫忙。再補充一點，請注意邊界條件。";
        assert!(zh.chars().count() >= 80);
        assert_eq!(c.classify(zh), TaskCategory::ReasonStrict);
    }

    #[test]
    fn test_json_rule_precedes_strict_keyword() {
        let prompt = pad("Produce a formal JSON schema {\"type\": \"object\"} for users", 100);
        assert_eq!(classifier().classify(&prompt), TaskCategory::Tool);
    }

    #[test]
    fn test_code_detection() {
        let c = classifier();
        let short_code = pad("Why does this fail?\n```\nlet x = 1;\n```", 120);
        assert_eq!(c.classify(&short_code), TaskCategory::Chat);
        assert_eq!(c.classify_detailed(&short_code).rule, ClassificationRule::Code);

        let long_code = pad("Review this module:\nimport os\n", 600);
        assert_eq!(c.classify(&long_code), TaskCategory::Reason);

        let mut config = ClassifierConfig::default();
        config.code_detection = false;
        let no_code = TaskClassifier::new(config);
        assert_eq!(
            no_code.classify_detailed(&long_code).rule,
            ClassificationRule::Default
        );
    }

    #[test]
    fn test_reasoning_keyword_needs_long_prompt() {
        let c = classifier();
        let medium = pad("Can you analyze the quarterly numbers we talked about", 200);
        assert_eq!(c.classify(&medium), TaskCategory::Chat);

        let long = pad("Can you analyze the quarterly numbers we talked about", 520);
        assert_eq!(c.classify(&long), TaskCategory::Reason);
    }

    #[test]
    fn test_debug_scores() {
        let c = classifier();
        let short = c.debug_scores("hello");
        assert_eq!(short.chat, 11.0);
        assert_eq!(short.tool, 1.0);

        let prompt = pad("Give a formal argument, step by step, for this function body", 700);
        let scores = c.debug_scores(&prompt);
        assert_eq!(scores.reason_strict, 11.0);
        assert_eq!(scores.chat, 4.0);
        assert_eq!(scores.reason, 1.0 + 2.0 + 3.0);
        assert_eq!(scores.tool, 1.0);
    }
}
