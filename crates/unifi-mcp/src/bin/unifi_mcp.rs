//! UniFi MCP Server - Entry Point
//!
//! Usage:
//!   unifi-mcp                                   # serve over stdio (env config)
//!   unifi-mcp serve --mode eager                # list every generated tool
//!   unifi-mcp generate --out tools.json         # write the tool catalog

use anyhow::{Context, Result};
use argh::FromArgs;
use std::path::PathBuf;
use unifi_mcp::config::Config;
use unifi_mcp::mcp::{ToolMode, UnifiMcpServer};

/// UniFi MCP Server - expose a UniFi Network controller to AI assistants
#[derive(FromArgs)]
struct Args {
    /// show version information
    #[argh(switch, short = 'V')]
    version: bool,

    #[argh(subcommand)]
    command: Option<Command>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Serve(ServeArgs),
    Generate(GenerateArgs),
}

/// Serve MCP over stdio (default)
#[derive(FromArgs, Default)]
#[argh(subcommand, name = "serve")]
struct ServeArgs {
    /// tool mode: lazy or eager (overrides UNIFI_TOOL_MODE)
    #[argh(option, short = 'm')]
    mode: Option<ToolMode>,

    /// resource catalog file (overrides UNIFI_CATALOG)
    #[argh(option, short = 'c')]
    catalog: Option<PathBuf>,
}

/// Write the generated tool descriptors as JSON
#[derive(FromArgs)]
#[argh(subcommand, name = "generate")]
struct GenerateArgs {
    /// resource catalog file (default: built-in)
    #[argh(option, short = 'c')]
    catalog: Option<PathBuf>,

    /// output file (default: stdout)
    #[argh(option, short = 'o')]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    if args.version {
        println!("unifi-mcp {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Logs go to stderr; stdout carries the MCP protocol
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    match args.command {
        None => serve(ServeArgs::default()).await,
        Some(Command::Serve(serve_args)) => serve(serve_args).await,
        Some(Command::Generate(generate_args)) => generate(generate_args),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if args.catalog.is_some() {
        config.catalog = args.catalog;
    }

    log::info!("Starting UniFi MCP server ({} mode)", config.mode);
    let catalog = unifi_mcp::load_catalog(config.catalog.as_deref())?;
    let dispatcher = unifi_mcp::build_dispatcher(&config, &catalog)?;
    let server = UnifiMcpServer::new(dispatcher, config.mode).context("startup validation failed")?;
    server.run_stdio().await
}

fn generate(args: GenerateArgs) -> Result<()> {
    let catalog = unifi_mcp::load_catalog(args.catalog.as_deref())?;
    let tools = unifi_mcp::schema::build_all(&catalog);
    let json = serde_json::to_string_pretty(&tools)?;

    match args.out {
        Some(path) => {
            std::fs::write(&path, format!("{}\n", json))
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("Wrote {} tools to {}", tools.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
