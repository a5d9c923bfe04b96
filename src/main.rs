use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{error, info};
use serde_json::Value;
use std::fs;
use std::sync::Arc;

use siyuan_mcp::api::{HostStorage, SiyuanClient, TOOLS_CONFIG_KEY, storage_path};
use siyuan_mcp::config::{ConfigEnv, ConfigResolver, GatewaySettings, default_tool_level_config};
use siyuan_mcp::protocol::McpServer;
use siyuan_mcp::supervisor::{ProcessState, ProcessSupervisor, SpawnOptions};
use siyuan_mcp::tools::{HIGH_RISK_TOOLS, ToolRouter, registries};

mod cli;

use cli::Cli;
use cli::commands::{Commands, ConfigCommands};

fn setup_logging(cli: &Cli) -> Result<()> {
    let default_level = if cli.is_verbose() { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));

    // stdout carries protocol traffic, so logs go to stderr or a file
    match &cli.log_file {
        Some(log_file) => {
            if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).context("Failed to create log directory")?;
            }
            let target = Box::new(
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(log_file)
                    .context("Failed to open log file")?,
            );
            builder.target(env_logger::Target::Pipe(target));
        }
        None => {
            builder.target(env_logger::Target::Stderr);
        }
    }

    builder.init();
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Panic: {}", panic_info);
    }));
}

fn connect(settings: &GatewaySettings) -> Result<Arc<SiyuanClient>> {
    let client = SiyuanClient::new(settings.client_config())
        .context("Failed to create note store client")?;
    Ok(Arc::new(client))
}

fn resolver_for(client: &Arc<SiyuanClient>) -> ConfigResolver {
    let host: Arc<dyn HostStorage> = client.clone();
    ConfigResolver::new(Some(host), ConfigEnv::from_process())
}

async fn run_application(cli: &Cli, settings: &GatewaySettings) -> Result<()> {
    info!("Starting application");

    match &cli.command {
        None | Some(Commands::Serve) => handle_serve(settings).await,
        Some(Commands::Tools { all }) => handle_tools_command(*all, settings).await,
        Some(Commands::Config { command }) => handle_config_command(command, settings).await,
        Some(Commands::Supervise { command }) => handle_supervise_command(command).await,
    }
}

async fn handle_serve(settings: &GatewaySettings) -> Result<()> {
    let client = connect(settings)?;
    let router = Arc::new(ToolRouter::new(resolver_for(&client), client.clone()));

    info!("Serving MCP on stdio, note store at {}", client.base_url());
    McpServer::new(router)
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("MCP session failed")?;
    info!("Input closed, shutting down");
    Ok(())
}

async fn handle_tools_command(all: bool, settings: &GatewaySettings) -> Result<()> {
    let client = connect(settings)?;
    let (config, source) = resolver_for(&client).resolve_with_source().await;
    println!("{} {}", "Tool config from:".green(), source);

    let mut enabled_count = 0;
    let mut total = 0;
    for registry in registries() {
        let category = registry.category();
        println!("\n{}", category.as_str().bold());
        for tool in registry.tools() {
            total += 1;
            let enabled = config.allows(category, &tool.name);
            if enabled {
                enabled_count += 1;
            } else if !all {
                continue;
            }
            let mark = if enabled { "+".green() } else { "-".red() };
            let risk = if HIGH_RISK_TOOLS.contains(&tool.name.as_str()) {
                " (confirm first)".yellow().to_string()
            } else {
                String::new()
            };
            println!("  {} {}{}", mark, tool.name, risk);
        }
    }

    println!("\n{} of {} tools enabled", enabled_count, total);
    Ok(())
}

async fn handle_config_command(command: &ConfigCommands, settings: &GatewaySettings) -> Result<()> {
    info!("Handling config command: {:?}", command);
    let client = connect(settings)?;

    match command {
        ConfigCommands::Show => {
            println!("{} {}", "Note store:".green(), settings.api.url);
            println!(
                "{} {}",
                "API token:".green(),
                if settings.api.token.is_some() { "set" } else { "not set" }
            );
            println!("{} {}ms", "Timeout:".green(), settings.api.timeout_ms);

            let (config, source) = resolver_for(&client).resolve_with_source().await;
            println!("{} {}", "Tool config from:".green(), source);
            let rendered =
                serde_json::to_string_pretty(&config).context("Failed to render tool config")?;
            println!("{}", rendered);
        }
        ConfigCommands::Init => {
            let stored = client
                .load(TOOLS_CONFIG_KEY)
                .await
                .context("Failed to read host storage")?;
            if stored.is_some() {
                println!(
                    "{} {}",
                    "Tool config already stored at".yellow(),
                    storage_path(TOOLS_CONFIG_KEY)
                );
                return Ok(());
            }
            let defaults = Value::Object(default_tool_level_config());
            client
                .save(TOOLS_CONFIG_KEY, &defaults)
                .await
                .context("Failed to write host storage")?;
            println!(
                "{} {}",
                "Stored default tool config at".green(),
                storage_path(TOOLS_CONFIG_KEY)
            );
        }
        ConfigCommands::Reset => {
            client
                .remove(TOOLS_CONFIG_KEY)
                .await
                .context("Failed to clear host storage")?;
            println!(
                "{} {}",
                "Removed".red(),
                storage_path(TOOLS_CONFIG_KEY)
            );
        }
    }
    Ok(())
}

async fn handle_supervise_command(command: &[String]) -> Result<()> {
    let supervisor = ProcessSupervisor::new();
    let (state_tx, mut state_rx) = tokio::sync::watch::channel(supervisor.state());
    supervisor.subscribe(move |state| {
        info!("Supervised process is {}", state);
        let _ = state_tx.send(state);
    });

    supervisor
        .start(command, SpawnOptions::default())
        .await
        .context("Failed to start supervised process")?;
    println!(
        "{} {} (pid {})",
        "Started:".green(),
        command.join(" "),
        supervisor
            .pid()
            .map_or_else(|| "unknown".to_string(), |pid| pid.to_string())
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Stopping...".yellow());
                supervisor.stop().await?;
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                if matches!(state, ProcessState::Stopped | ProcessState::Error) {
                    break;
                }
            }
        }
    }

    if let Some(message) = supervisor.error_message() {
        eyre::bail!("Supervised process failed: {}", message);
    }
    println!("{}", "Supervised process stopped".green());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging before anything else can log
    setup_logging(&cli).context("Failed to setup logging")?;
    install_panic_hook();

    // Load settings
    let settings =
        GatewaySettings::load(cli.config.as_ref()).context("Failed to load configuration")?;
    settings.validate()?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &settings)
        .await
        .context("Application failed")?;

    Ok(())
}
