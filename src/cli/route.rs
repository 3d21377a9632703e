//! `clawroute route`

use super::RouteArgs;
use anyhow::{Context, Result};
use clawroute_core::{
    compose_prompt, format_error_for_cli, RequestedCategory, RouteOptions, Router,
};
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub async fn run(config_path: Option<&Path>, args: RouteArgs) -> Result<()> {
    let config = crate::loader::load_config(config_path)?;
    let router = match Router::from_env(config) {
        Ok(router) => router,
        Err(e) => anyhow::bail!("{}", format_error_for_cli(&e)),
    };

    let (requested, prompt) = prepare(&router, &args);
    let mut options = RouteOptions::new();
    if let Some(system) = args.system {
        options = options.with_system_context(system);
    }
    if let Some(ms) = args.timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }

    if args.stream {
        stream(&router, requested, &prompt, options).await
    } else {
        complete(&router, requested, &prompt, options).await
    }
}

/// Pin the category before wrapping the prompt, so the headers added by
/// composition cannot change the classification
fn prepare(router: &Router, args: &RouteArgs) -> (RequestedCategory, String) {
    if args.context.is_none() && args.schema.is_none() {
        return (args.task, args.prompt.clone());
    }

    let category = match args.task {
        RequestedCategory::Fixed(category) => category,
        RequestedCategory::Auto => router.classify(&args.prompt),
    };
    let prompt = compose_prompt(
        category,
        &args.prompt,
        args.context.as_deref(),
        args.schema.as_deref(),
    );
    debug!(category = %category, chars = prompt.chars().count(), "Composed prompt");
    (RequestedCategory::Fixed(category), prompt)
}

async fn complete(
    router: &Router,
    requested: RequestedCategory,
    prompt: &str,
    options: RouteOptions,
) -> Result<()> {
    let result = match router.route(requested, prompt, options).await {
        Ok(result) => result,
        Err(e) => anyhow::bail!("{}", format_error_for_cli(&e)),
    };

    println!("{}", result.output);

    let fallback = result
        .fallback_from
        .as_deref()
        .map(|from| format!(" | fallback from {from}"))
        .unwrap_or_default();
    eprintln!(
        "[{} | {} | {} ms | {} tokens{} | ${:.6}{}]",
        result.endpoint,
        result.category,
        result.latency.as_millis(),
        result.usage.total_tokens,
        if result.usage_estimated { " (est.)" } else { "" },
        result.estimated_cost_usd,
        fallback,
    );
    Ok(())
}

async fn stream(
    router: &Router,
    requested: RequestedCategory,
    prompt: &str,
    options: RouteOptions,
) -> Result<()> {
    let mut stream = match router.route_stream(requested, prompt, options).await {
        Ok(stream) => stream,
        Err(e) => anyhow::bail!("{}", format_error_for_cli(&e)),
    };

    let endpoint = stream.endpoint.clone();
    let category = stream.category;
    let latency = stream.latency;

    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        let text = chunk.with_context(|| format!("stream from {endpoint} failed"))?;
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
    }
    println!();

    eprintln!(
        "[{endpoint} | {category} | opened in {} ms | session ${:.6}]",
        latency.as_millis(),
        router.session_cost(),
    );
    Ok(())
}
