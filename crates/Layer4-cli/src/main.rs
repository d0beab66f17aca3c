//! Weave CLI - Main entry point

mod demo;
mod watch;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weave_core::{BulkReport, PluginManager, RegisterOutcome, RuntimeContext};
use weave_foundation::{JsonStore, PluginConfigStore, RuntimeConfig};

/// Weave - plugin runtime with dependency ordering, hooks and hot reload
#[derive(Parser, Debug)]
#[command(name = "weave")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory holding weave.json and plugins.json
    /// (default: ./.weave if present, otherwise the user config directory)
    #[arg(short = 'C', long)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enable all plugins and print the runtime summary
    Run {
        /// Keep running and hot reload plugins when their files change
        #[arg(short, long)]
        watch: bool,
    },
    /// Print the resolved activation order
    Order,
    /// Print the effective runtime configuration
    Config,
    /// Format a greeting through the greeter plugin
    Greet {
        /// Who to greet
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_dir = match args.config_dir {
        Some(dir) => dir,
        None => JsonStore::discover(std::env::current_dir()?)?
            .base_dir()
            .to_path_buf(),
    };
    info!(dir = %config_dir.display(), "Using config directory");

    let config = RuntimeConfig::load(&config_dir)
        .with_context(|| format!("loading runtime config from {}", config_dir.display()))?;
    let plugin_config = PluginConfigStore::from_dir(&config_dir)
        .with_context(|| format!("loading plugin config from {}", config_dir.display()))?;

    let runtime = Arc::new(RuntimeContext::with_plugin_config(config, Arc::new(plugin_config)));
    demo::install_defaults(&runtime);

    let manager = Arc::new(PluginManager::new(runtime.clone()));
    register_demo_plugins(&manager)?;

    match args.command.unwrap_or(Command::Run { watch: false }) {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(runtime.config())?);
        }
        Command::Order => {
            let order = manager.resolve_order()?;
            println!("{}", order.join(" -> "));
        }
        Command::Greet { name } => {
            print_report("enable", &manager.enable_all().await?);
            let greeting = runtime
                .hooks()
                .dispatch_waterfall(demo::GREETING_FORMAT_HOOK, json!(name))
                .await?;
            runtime.events().publish(demo::GREETING_SENT_EVENT, &greeting);
            println!("{}", greeting.as_str().unwrap_or_default());
            print_report("shutdown", &manager.shutdown().await);
        }
        Command::Run { watch } => {
            print_report("enable", &manager.enable_all().await?);
            println!("{}", serde_json::to_string_pretty(&manager.summary())?);

            if watch {
                watch::run(manager.clone(), &config_dir).await?;
            }
            print_report("shutdown", &manager.shutdown().await);
        }
    }

    Ok(())
}

/// 데모 플러그인 등록 (조건이 있으면 조건부)
fn register_demo_plugins(manager: &PluginManager) -> anyhow::Result<()> {
    let ctx = manager.condition_context();
    for name in demo::NAMES {
        let plugin = demo::create(name).with_context(|| format!("unknown demo plugin {name}"))?;
        match demo::condition(name) {
            Some(condition) => match manager.register_when(plugin, &condition, &ctx)? {
                RegisterOutcome::Registered(desc) => info!(plugin = %desc.name, "Registered"),
                RegisterOutcome::Skipped(name) => info!(plugin = %name, "Skipped by condition"),
            },
            None => {
                manager.register(plugin)?;
            }
        }
    }
    Ok(())
}

fn print_report(operation: &str, report: &BulkReport) {
    for (name, error) in &report.failed {
        warn!(operation, plugin = %name, error = %error, "Plugin failed");
    }
    for (name, error) in &report.skipped {
        warn!(operation, plugin = %name, error = %error, "Plugin skipped");
    }
    info!(
        operation,
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "Bulk operation finished"
    );
}
