//! revgate CLI - GitHub App webhook gateway for automated code review

mod commands;

use clap::{Parser, Subcommand};
use revgate_core::{Config, SecretSource, Secrets};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::ServeArgs;

/// revgate: verify GitHub webhooks, review pull requests, publish the result
#[derive(Parser, Debug)]
#[command(name = "revgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Run the webhook receiver
    #[command(visible_alias = "s")]
    Serve(ServeArgs),

    /// Show current configuration
    Config,
}

fn set_or_unset(value: bool) -> &'static str {
    if value {
        "(set)"
    } else {
        "(not set)"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --verbose
    let default_filter = if cli.verbose {
        "info,revgate=debug,revgate_server=debug,revgate_github=debug,revgate_core=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("revgate {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve(args)) => {
            args.execute(cli.verbose).await?;
        }
        Some(Commands::Config) => {
            let config = Config::load_with_overrides(None, false)?;
            let secrets = Secrets::load()?;

            println!("revgate Configuration");
            println!("=====================");
            println!();
            println!("Server:");
            println!("  bind: {}", config.server.bind);
            println!("  environment: {}", config.server.environment);
            println!();
            println!("GitHub:");
            println!("  api_url: {}", config.github.api_url);
            println!("  request_timeout: {:?}", config.github.request_timeout);
            println!("  deadline: {:?}", config.github.deadline);
            println!("  max_attempts: {}", config.github.max_attempts);
            println!("  per_page: {}", config.github.per_page);
            println!();
            println!("Review:");
            println!("  extensions: {}", config.review.extensions.join(", "));
            println!("  publish: {:?}", config.review.publish);
            println!("  disposition: {}", config.review.disposition);
            println!(
                "  engine: {} {}",
                config.review.engine_command,
                config.review.engine_args.join(" ")
            );
            println!("  engine_timeout: {:?}", config.review.engine_timeout);
            println!();
            println!("Credentials:");
            println!("  app_id: {}", set_or_unset(secrets.app_id().is_some()));
            println!(
                "  private_key: {}",
                set_or_unset(secrets.private_key()?.is_some())
            );
            println!(
                "  webhook_secret: {}",
                set_or_unset(secrets.webhook_secret_source().webhook_secret().is_some())
            );
            println!();
            if let Some(path) = Config::default_config_path() {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
        }
        None => {
            println!("revgate - GitHub webhook gateway for automated code review");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
