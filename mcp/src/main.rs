use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use odoo_mcp_core::DefaultSettings;
use odoo_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "odoo-mcp",
    version,
    about = "Odoo MCP server over stdio, configured from ODOO_* / ALGOLIA_* / TO_USE"
)]
struct Cli {
    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "odoo_mcp_runtime=info,odoo_mcp_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = DefaultSettings::from_env();
    let code = run_mcp(&settings, cli.command).await;
    std::process::exit(code);
}
