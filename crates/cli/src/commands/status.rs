//! `threadwise status`: show resolved configuration.

use threadwise_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let ctx = &config.context;

    println!("🧵 Threadwise Status");
    println!("===================");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  API key:        {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  API URL:        {}", config.api_url.as_deref().unwrap_or("(default)"));
    println!("  Model:          {}", config.model);
    println!("  Delegate model: {}", config.delegate_model());
    println!("  Temperature:    {}", config.temperature);
    println!("  Max tokens:     {}", config.max_tokens);
    println!();
    println!("  Context window: {} tokens (soft limit {:.0}%, reserve {})",
        ctx.context_window,
        ctx.soft_limit_ratio * 100.0,
        ctx.response_reserve
    );
    println!("  History:        fixed {}, adaptive {}..{}, unlimited cap {}",
        ctx.fixed_limit, ctx.adaptive_initial, ctx.adaptive_cap, ctx.unlimited_cap
    );
    println!("  Rounds:         max {} (retry {}x from {}ms)",
        config.orchestrator.max_iterations,
        config.orchestrator.retry_attempts,
        config.orchestrator.retry_base_delay_ms
    );
    println!("  Delegate:       {} concurrent, query ≤ {} chars",
        config.delegate.max_concurrent, config.delegate.max_query_chars
    );
    println!("  Breaker:        {} failures, {}s cooldown",
        config.breaker.failure_threshold, config.breaker.cooldown_secs
    );
    println!("  Store:          {} ({})",
        config.store.backend,
        config.store.resolved_path().display()
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file, run `threadwise onboard` first");
    }

    Ok(())
}
