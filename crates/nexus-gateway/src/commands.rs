//! Subcommand implementations for the `nexus` binary.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use nexus_config::{Config, ResolvedConfig, ShowFormat};
use nexus_gateway::{Gateway, GatewayClient, NO_PENDING_MESSAGE, PURGE_INTERVAL, ToolResult};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Serve until Ctrl-C.
pub(crate) async fn run(cfg: &Config, bind: Option<String>) -> Result<()> {
    let gateway = Arc::new(Gateway::from_config(cfg).context("Failed to start gateway")?);
    let addr = bind.unwrap_or_else(|| cfg.gateway.bind_addr.clone());
    let (handle, local) = Arc::clone(&gateway).start(&addr).await?;
    let sweep = gateway.spawn_purge_task(PURGE_INTERVAL);

    println!("Nexus gateway listening on ws://{local}");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("shutdown requested");
        },
        () = handle.clone().stopped() => {
            warn!("server stopped unexpectedly");
        },
    }

    sweep.abort();
    // Already stopped is fine here.
    let _ = handle.stop();
    handle.stopped().await;
    Ok(())
}

pub(crate) async fn tools(url: &str) -> Result<()> {
    let client = GatewayClient::connect(url).await?;
    for tool in client.list_tools().await? {
        let tag = if tool.dangerous { "approval" } else { "" };
        println!("{:<24} {tag:<9} {}", tool.name, tool.description);
    }
    Ok(())
}

pub(crate) async fn call(url: &str, name: &str, args: Option<&str>) -> Result<()> {
    let arguments = match args {
        Some(raw) => {
            let value: Value =
                serde_json::from_str(raw).context("--args must be a JSON object")?;
            Some(value)
        },
        None => None,
    };
    let client = GatewayClient::connect(url).await?;
    print_result(&client.call_tool(name, arguments).await?)
}

pub(crate) async fn approve(url: &str, token: &str) -> Result<()> {
    let client = GatewayClient::connect(url).await?;
    print_result(
        &client
            .call_tool("approve_action", Some(json!({ "token": token })))
            .await?,
    )
}

pub(crate) async fn pending(url: &str) -> Result<()> {
    let client = GatewayClient::connect(url).await?;
    let pending = client.list_pending().await?;
    if pending.is_empty() {
        println!("{NO_PENDING_MESSAGE}");
        return Ok(());
    }
    for p in pending {
        println!(
            "{}  {}  {}  expires {}",
            p.token,
            p.tool,
            p.arguments,
            p.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

pub(crate) async fn status(url: &str) -> Result<()> {
    let client = GatewayClient::connect(url).await?;
    let s = client.status().await?;
    println!("Nexus {} (up {}s)", s.version, s.uptime_secs);
    println!("  store:           {}", s.storage_backend);
    println!("  model:           {} / {}", s.model_provider, s.model);
    println!("  dangerous tools: {}", s.dangerous_tools.join(", "));
    println!("  approval ttl:    {}s", s.approval_ttl_secs);
    println!("  pending actions: {}", s.pending_actions);
    Ok(())
}

pub(crate) fn config_show(
    resolved: &ResolvedConfig,
    format: &str,
    section: Option<&str>,
) -> Result<()> {
    let format = match format {
        "toml" => ShowFormat::Toml,
        "json" => ShowFormat::Json,
        other => bail!("unknown format '{other}' (expected toml or json)"),
    };
    let out = resolved
        .show(format, section)
        .map_err(|_| anyhow!("unknown config section '{}'", section.unwrap_or_default()))?;
    println!("{out}");
    Ok(())
}

pub(crate) fn config_validate(resolved: &ResolvedConfig) {
    println!("Configuration is valid.");
    if resolved.loaded_files.is_empty() {
        println!("  (defaults only)");
    }
    for file in &resolved.loaded_files {
        println!("  loaded {file}");
    }
}

fn print_result(result: &ToolResult) -> Result<()> {
    if result.is_error {
        eprintln!("{}", result.content);
        bail!("tool call failed ({})", result.kind);
    }
    println!("{}", result.content);
    Ok(())
}
