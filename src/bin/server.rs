//! Terminal hop binary
//!
//! Usage: hopsocks-terminal [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>        Path to configuration file
//!   -l, --listen <ADDR:PORT>   Listen without a config file
//!   -s, --standalone           Also answer client greetings (single-hop proxy)
//!   -g, --generate             Print a default configuration
//!   -h, --help                 Print help information
//!
//! Without options the hop listens on 0.0.0.0:8081.

use std::env;

use hopsocks::server::config::parse_endpoint;
use hopsocks::server::{Hop, HopConfig, HopConfigFile, HopMode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, filtered by RUST_LOG (e.g. RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return run_terminal(HopConfig::default_for(HopMode::Terminal)).await;
    }

    match args[1].as_str() {
        "-h" | "--help" => {
            print_usage();
        }
        "-g" | "--generate" => {
            generate_config()?;
        }
        "-c" | "--config" => {
            if args.len() < 3 {
                eprintln!("Error: --config requires a file path");
                return Ok(());
            }
            let config = load_config(&args[2])?;
            run_terminal(config).await?;
        }
        "-l" | "--listen" => {
            if args.len() < 3 {
                eprintln!("Error: --listen requires <ADDR:PORT>");
                return Ok(());
            }
            let (listen_addr, listen_port) = parse_endpoint(&args[2])?;
            let standalone = args
                .get(3)
                .map(|flag| flag == "-s" || flag == "--standalone")
                .unwrap_or(false);
            let config = if standalone {
                HopConfig::standalone(listen_addr, listen_port)
            } else {
                HopConfig::terminal(listen_addr, listen_port)
            };
            run_terminal(config).await?;
        }
        "-s" | "--standalone" => {
            run_terminal(HopConfig::default_for(HopMode::Standalone)).await?;
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!(
        r#"hopsocks terminal hop - resolves SOCKS5 requests and dials targets

USAGE:
    hopsocks-terminal [OPTIONS]

OPTIONS:
    -c, --config <FILE>        Path to configuration file
    -l, --listen <ADDR:PORT>   Listen without a config file (add -s for standalone)
    -s, --standalone           Also answer client greetings (single-hop proxy)
    -g, --generate             Print a default configuration
    -h, --help                 Print help information

CONFIGURATION FILE FORMAT (TOML):
    mode = "terminal"          # or "standalone"
    listen_addr = "0.0.0.0"
    listen_port = 8081
    connect_timeout_secs = 10
    handshake_timeout_secs = 10
    strict_reply = false       # dial first, report failures with a reply code
    nodelay = true

EXAMPLES:
    Generate a configuration:
        hopsocks-terminal --generate > terminal.toml

    Run as a single-hop SOCKS5 proxy on port 1080:
        hopsocks-terminal --listen 127.0.0.1:1080 --standalone
"#
    );
}

fn generate_config() -> anyhow::Result<()> {
    let config = HopConfig::default_for(HopMode::Terminal);
    let config_file = HopConfigFile::from_config(&config);

    println!("# hopsocks terminal hop configuration");
    println!("# Generated: {}", chrono::Utc::now());
    println!();
    println!("{}", config_file.to_toml()?);

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<HopConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = HopConfigFile::from_toml(&content)?.to_config()?;
    if config.mode == HopMode::Entry {
        anyhow::bail!("{} configures an entry hop; use hopsocks-entry", path);
    }
    Ok(config)
}

async fn run_terminal(config: HopConfig) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!(
        "Starting {} hop on {} (strict reply: {})",
        config.mode,
        config.listen_endpoint(),
        config.strict_reply
    );

    let hop = Hop::new(config);
    hop.run().await?;

    Ok(())
}
