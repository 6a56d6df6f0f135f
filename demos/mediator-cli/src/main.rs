//! Answers requests by letting a language model pick one capability.
//!
//! ```text
//! toolbridge --config mediator.json tools
//! toolbridge --config mediator.json prompt "What is 10 plus 8?"
//! toolbridge --config mediator.json ask "Calculate BMI for weight 70kg and height 1.75m"
//! toolbridge --config mediator.json ask --max-steps 3 "What is (10 + 8) x 20?"
//! ```
//!
//! The weather provider in the sample configuration expects
//! `capability-provider --catalog weather --transport http` to be running.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use toolbridge::adapters::openai::OpenAiAdapter;
use toolbridge::config::BridgeConfig;
use toolbridge::kernel::{Invocation, Mediator, MediatorResult};
use toolbridge::prompts::compile;
use toolbridge::registry::CapabilityRegistry;
use toolbridge::session::ProviderEndpoint;
use toolbridge::telemetry::TelemetryConfig;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "toolbridge", version, about = "Mediate model tool calls onto capability providers")]
struct Cli {
    /// Configuration file.
    #[arg(long, short, default_value = "mediator.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every discovered capability with its provider.
    Tools,
    /// Print the prompt a request would compile to.
    Prompt {
        /// Natural-language request.
        request: String,
    },
    /// Ask the model and run the capability it picks.
    Ask {
        /// Natural-language request.
        request: String,

        /// Capability calls to chain, each seeing the earlier results.
        #[arg(long, default_value_t = 1)]
        max_steps: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    toolbridge::telemetry::init(&TelemetryConfig::default().with_target(false))?;

    let config = BridgeConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let endpoints = config.endpoints();
    let session_config = config.session.session_config();

    match cli.command {
        Command::Tools => {
            let registry = CapabilityRegistry::discover(named(&endpoints), &session_config).await?;
            for capability in registry.iter() {
                let name = capability.name().as_str();
                let provider = registry.provider_of(name).unwrap_or("?");
                println!("{name:<20} [{provider}] {}", capability.description());
            }
        }
        Command::Prompt { request } => {
            let registry = CapabilityRegistry::discover(named(&endpoints), &session_config).await?;
            println!("{}", compile(&request, &registry));
        }
        Command::Ask { request, max_steps } => {
            let adapter_config = config
                .model
                .adapter_config(|variable| std::env::var(variable).ok())?;
            let adapter = Arc::new(OpenAiAdapter::new(adapter_config)?);

            let (registry, sessions) =
                CapabilityRegistry::discover_warm(named(&endpoints), &session_config).await?;
            info!(capabilities = registry.len(), "registry ready");

            let mut mediator = Mediator::new(adapter, registry, sessions)
                .with_settings(config.model.completion_settings());
            let outcome: MediatorResult<Vec<Invocation>> = if max_steps > 1 {
                mediator
                    .handle_chain(&request, max_steps)
                    .await
                    .map(|chain| chain.steps().to_vec())
            } else {
                mediator
                    .handle(&request)
                    .await
                    .map(|dispatch| dispatch.invocation().into_iter().cloned().collect())
            };
            mediator.shutdown().await?;

            let steps = outcome?;
            if steps.is_empty() {
                println!("No capability needed.");
            }
            for invocation in &steps {
                println!("{} -> {}", invocation.capability(), invocation.text());
            }
        }
    }
    Ok(())
}

fn named(endpoints: &[(String, ProviderEndpoint)]) -> impl Iterator<Item = (&str, &ProviderEndpoint)> {
    endpoints
        .iter()
        .map(|(name, endpoint)| (name.as_str(), endpoint))
}
