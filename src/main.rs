use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use consul_mcp::config::{load_config, Config};
use consul_mcp::consul::{ConsulBackend, ConsulClient};
use consul_mcp::mcp::McpServer;
use std::path::PathBuf;
use std::sync::Arc;

/// Consul MCP Server - expose Consul catalog, health and KV to MCP clients
#[derive(Parser, Debug)]
#[command(name = "consul-mcp-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server for HashiCorp Consul over SSE", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the SSE server (default)
    Serve {
        /// Host to bind to (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides PORT)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// List the tools exposed to MCP clients
    Tools {
        /// Print the full tool definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that Consul is reachable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config: Config = load_config(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration from environment".to_string(),
    })?;

    // Held for the whole run so buffered file logs are flushed on exit
    let _log_guard = consul_mcp::logging::init(&config.logging, cli.verbose, cli.quiet);

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            tracing::info!("Consul MCP server v{}", consul_mcp::VERSION);
            tracing::info!("Consul: {}", config.consul);

            let backend: Arc<dyn ConsulBackend> =
                Arc::new(ConsulClient::new(&config.consul).context("Failed to create Consul client")?);
            if !backend.is_connected().await {
                tracing::warn!("Consul is not reachable yet; tools will report errors until it is");
            }

            consul_mcp::api::serve(&config.server, backend)
                .await
                .context("Server error")?;
        }

        Commands::Tools { json } => {
            let backend: Arc<dyn ConsulBackend> = Arc::new(ConsulClient::new(&config.consul)?);
            let server = McpServer::new(backend);
            let tools = server.tool_infos();

            if json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else {
                use comfy_table::{Attribute, Cell, Table};
                let mut table = Table::new();
                table.load_preset(comfy_table::presets::UTF8_FULL);
                table.set_header(vec!["Tool", "Required", "Description"]);

                for tool in &tools {
                    let required = tool.input_schema["required"]
                        .as_array()
                        .map(|names| {
                            names
                                .iter()
                                .filter_map(|n| n.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        })
                        .unwrap_or_default();

                    let description = if tool.description.chars().count() > 70 {
                        let short: String = tool.description.chars().take(67).collect();
                        format!("{}...", short)
                    } else {
                        tool.description.clone()
                    };

                    table.add_row(vec![
                        Cell::new(&tool.name).add_attribute(Attribute::Bold),
                        Cell::new(required),
                        Cell::new(description),
                    ]);
                }
                println!("{table}");
            }
        }

        Commands::Check => {
            let client = ConsulClient::new(&config.consul)?;
            if client.is_connected().await {
                println!("Consul at {} is reachable", config.consul);
            } else {
                anyhow::bail!("Consul at {} is not reachable", config.consul);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_version() {
        let version = env!("CARGO_PKG_VERSION");
        let parts: Vec<&str> = version.split('.').collect();
        assert!(parts.len() >= 2);
        assert!(parts[0].parse::<u32>().is_ok());
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["consul-mcp-server"]);
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        assert!(cli.config.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["consul-mcp-server", "-v"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["consul-mcp-server", "-vv"]);
        assert_eq!(cli.verbose, 2);

        let cli = Cli::parse_from(["consul-mcp-server", "serve", "--verbose"]);
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_flag() {
        let cli = Cli::parse_from(["consul-mcp-server", "-q"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_config_flag() {
        let cli = Cli::parse_from(["consul-mcp-server", "--config", "/etc/consul-mcp.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/consul-mcp.toml")));
    }

    #[test]
    fn test_cli_serve_command() {
        let cli = Cli::parse_from(["consul-mcp-server", "serve", "--host", "127.0.0.1", "-p", "9090"]);
        match cli.command {
            Some(Commands::Serve { host, port }) => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(9090));
            }
            other => panic!("Expected Serve command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_tools_command() {
        let cli = Cli::parse_from(["consul-mcp-server", "tools", "--json"]);
        assert!(matches!(cli.command, Some(Commands::Tools { json: true })));
    }

    #[test]
    fn test_cli_check_command() {
        let cli = Cli::parse_from(["consul-mcp-server", "check"]);
        assert!(matches!(cli.command, Some(Commands::Check)));
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["consul-mcp-server", "serve", "--port", "99999"]).is_err());
    }
}
