//! `clawroute classify` and `clawroute endpoints`
//!
//! Neither command needs an API key or makes a network call.

use anyhow::Result;
use clawroute_core::{RouterConfig, TaskCategory, TaskClassifier};
use std::path::Path;

pub fn classify(config_path: Option<&Path>, prompt: &str, scores: bool) -> Result<()> {
    let config = crate::loader::load_config(config_path)?;
    let classifier = TaskClassifier::new(config.classifier);
    let c = classifier.classify_detailed(prompt);

    println!("{}", c.category);
    if scores {
        let s = classifier.debug_scores(prompt);
        println!("  rule:          {:?}", c.rule);
        println!("  length:        {}", c.length);
        if !c.matched_keywords.is_empty() {
            println!("  keywords:      {}", c.matched_keywords.join(", "));
        }
        println!("  chat:          {:.1}", s.chat);
        println!("  reason:        {:.1}", s.reason);
        println!("  reason_strict: {:.1}", s.reason_strict);
        println!("  tool:          {:.1}", s.tool);
    }
    Ok(())
}

pub fn endpoints(config_path: Option<&Path>) -> Result<()> {
    let config = crate::loader::load_config(config_path)?;
    print!("{}", render_endpoints(&config));
    Ok(())
}

fn render_endpoints(config: &RouterConfig) -> String {
    let mut out = String::from("Endpoints (by priority):\n");
    for e in config.endpoints_by_priority() {
        let alias = e.alias.as_deref().unwrap_or("-");
        out.push_str(&format!(
            "  {:>2}  {:<40} {:<10} in ${:.2}/1M  out ${:.2}/1M  max {} tokens\n",
            e.priority, e.id, alias, e.price_per_1m_input, e.price_per_1m_output, e.max_tokens
        ));
    }

    out.push_str(&format!("Default: {}\n", config.default_endpoint));
    if !config.fallbacks.is_empty() {
        out.push_str(&format!("Fallbacks: {}\n", config.fallbacks.join(", ")));
    }

    out.push_str("Candidates:\n");
    for category in TaskCategory::ALL {
        let candidates = config.candidates.for_category(category);
        let list = if candidates.is_empty() {
            format!("(default) {}", config.default_endpoint)
        } else {
            candidates.join(", ")
        };
        out.push_str(&format!("  {:<14} {}\n", category.as_str(), list));
    }
    out
}
