//! Entry hop binary
//!
//! Usage: hopsocks-entry [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>                 Path to configuration file
//!   -l, --listen <ADDR:PORT> <UPSTREAM> Listen and forward without a config file
//!   -g, --generate                      Print a default configuration
//!   -h, --help                          Print help information
//!
//! Without options the hop listens on 0.0.0.0:8888 and forwards to
//! 127.0.0.1:8081.

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
        return run_entry(HopConfig::default_for(HopMode::Entry)).await;
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
            run_entry(config).await?;
        }
        "-l" | "--listen" => {
            if args.len() < 4 {
                eprintln!("Error: --listen requires <ADDR:PORT> <UPSTREAM>");
                return Ok(());
            }
            let (listen_addr, listen_port) = parse_endpoint(&args[2])?;
            run_entry(HopConfig::entry(listen_addr, listen_port, args[3].as_str())).await?;
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
        r#"hopsocks entry hop - answers SOCKS5 greetings and forwards upstream

USAGE:
    hopsocks-entry [OPTIONS]

OPTIONS:
    -c, --config <FILE>                   Path to configuration file
    -l, --listen <ADDR:PORT> <UPSTREAM>   Listen and forward without a config file
    -g, --generate                        Print a default configuration
    -h, --help                            Print help information

EXAMPLES:
    Generate a configuration:
        hopsocks-entry --generate > entry.toml

    Run with a configuration:
        hopsocks-entry --config entry.toml

    Forward 127.0.0.1:1080 to a terminal hop:
        hopsocks-entry --listen 127.0.0.1:1080 relay.example.com:8081
"#
    );
}

fn generate_config() -> anyhow::Result<()> {
    let config = HopConfig::default_for(HopMode::Entry);
    let config_file = HopConfigFile::from_config(&config);

    println!("# hopsocks entry hop configuration");
    println!("# Generated: {}", chrono::Utc::now());
    println!();
    println!("{}", config_file.to_toml()?);

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<HopConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = HopConfigFile::from_toml(&content)?.to_config()?;
    if config.mode != HopMode::Entry {
        anyhow::bail!("{} configures a {} hop, expected entry", path, config.mode);
    }
    Ok(config)
}

async fn run_entry(config: HopConfig) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!("Starting entry hop on {}", config.listen_endpoint());

    let hop = Hop::new(config);
    hop.run().await?;

    Ok(())
}
