//! `threadwise chat`: interactive session over the local transport.
//!
//! Every line typed is posted to the channel as a user message, the
//! context is assembled adaptively around it, and the orchestrator's answer
//! is posted back as the assistant. Threads created by the assistant live
//! in the same in-process transport, so `delegate_query` can read them.

use std::io::Write;
use std::sync::Arc;
use threadwise_agent::{
    AssemblyRequest, ContextAssembler, DelegateQueryGateway, DelegateWiring, StreamOrchestrator,
    Strategy, Termination, TokenBudgetEstimator,
};
use threadwise_channels::{HttpAttachmentResolver, LocalTransport};
use threadwise_config::AppConfig;
use threadwise_core::attachment::AttachmentResolver;
use threadwise_core::channel::{Author, ChatTransport};
use threadwise_core::delegate::DelegateService;
use threadwise_core::provider::Provider;
use threadwise_providers::{AnthropicProvider, CircuitBreaker};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

pub async fn run(channel_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    THREADWISE_API_KEY=sk-ant-...");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider: Arc<dyn Provider> = Arc::new(AnthropicProvider::from_config(&config)?);
    let store = super::open_store(&config).await?;

    let local = Arc::new(LocalTransport::new("Threadwise"));
    local.add_channel(channel_id, channel_id).await;
    let transport: Arc<dyn ChatTransport> = local.clone();

    let resolver: Arc<dyn AttachmentResolver> = Arc::new(HttpAttachmentResolver::new());

    let assembler = ContextAssembler::new(
        store.clone(),
        transport.clone(),
        TokenBudgetEstimator::new(provider.clone(), config.model.clone()),
        config.context.clone(),
    );

    // The delegate session counts tokens against its own model
    let delegate_assembler = Arc::new(ContextAssembler::new(
        store,
        transport.clone(),
        TokenBudgetEstimator::new(provider.clone(), config.delegate_model()),
        config.context.clone(),
    ));
    let gateway = Arc::new(DelegateQueryGateway::from_config(&config));
    gateway.wire(DelegateWiring {
        provider: provider.clone(),
        transport: transport.clone(),
        assembler: delegate_assembler,
        resolver: Some(resolver.clone()),
        model: config.delegate_model().to_string(),
    });
    let delegate: Arc<dyn DelegateService> = gateway;

    let capabilities = Arc::new(threadwise_tools::default_registry(transport, delegate, channel_id));
    let breaker = Arc::new(CircuitBreaker::from_config("generation", &config.breaker));
    let orchestrator = StreamOrchestrator::from_config(provider, capabilities.clone(), &config)
        .with_breaker(breaker);

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        Threadwise: Interactive Session       ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Delegate:  {}", config.delegate_model());
    println!("  Channel:   {channel_id}");
    println!("  Tools:     {}", capabilities.names().join(", "));
    println!("  Store:     {}", config.store.backend);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let user = Author::user("local-user", "You");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let posted = local.post(channel_id, user.clone(), line, Vec::new()).await?;

        eprint!("  ...");
        let request = AssemblyRequest::new(channel_id, Strategy::Adaptive { limit: None })
            .with_system_prompt(orchestrator.system_prompt())
            .with_current(&posted)
            .with_resolver(resolver.as_ref());
        let context = match assembler.assemble(request).await {
            Ok(context) => context,
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] Failed to assemble context: {e}");
                println!();
                continue;
            }
        };

        let outcome = orchestrator.run(&context, line).await;
        eprint!("\r     \r");

        if outcome.termination != Termination::Completed {
            warn!(termination = ?outcome.termination, rounds = outcome.rounds, "Turn ended early");
        }

        println!();
        for text_line in outcome.text.lines() {
            println!("  Assistant > {text_line}");
        }
        println!();

        local
            .post(channel_id, local.assistant().clone(), outcome.text, Vec::new())
            .await?;
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}
