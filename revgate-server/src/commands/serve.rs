//! Serve command - run the webhook receiver

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use revgate_core::{Config, ProcessEngine, Secrets};
use revgate_github::{
    AppAuthenticator, HttpClient, HttpTokenExchange, ReqwestTransport, SignatureVerifier,
};
use revgate_server::{router, AppState, Dispatcher};
use tokio::signal;
use tracing::info;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides config and env)
    #[arg(short, long, env = "REVGATE_BIND")]
    pub bind: Option<String>,

    /// Run in production mode: a webhook secret is required
    #[arg(long)]
    pub production: bool,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(&self, verbose: bool) -> anyhow::Result<()> {
        let config = Config::load_with_overrides(self.bind.clone(), self.production)?;
        let secrets = Secrets::load()?;

        if verbose {
            info!(
                bind = %config.server.bind,
                environment = %config.server.environment,
                api_url = %config.github.api_url,
                "Configuration loaded"
            );
        }

        let verifier = SignatureVerifier::new(
            Arc::new(secrets.webhook_secret_source()),
            config.server.environment,
        );
        // refuse to serve unverified deliveries in production
        verifier.ensure_ready()?;

        let transport = Arc::new(ReqwestTransport::new()?);
        let http = Arc::new(HttpClient::from_config(transport, &config.github));

        let exchange = Arc::new(HttpTokenExchange::new(
            http.clone(),
            &config.github.api_url,
            config.github.user_agent.clone(),
        ));
        let authenticator = Arc::new(
            AppAuthenticator::new(secrets.app_credentials()?, exchange)
                .with_safety_margin(config.github.token_safety_margin),
        );
        if !authenticator.has_credentials() {
            tracing::warn!("GitHub App credentials not configured - pull request reviews will fail");
        }

        let engine = Arc::new(
            ProcessEngine::new(
                config.review.engine_command.clone(),
                config.review.engine_args.clone(),
            )
            .with_timeout(config.review.engine_timeout),
        );

        let dispatcher = Dispatcher::new(
            verifier,
            authenticator,
            http,
            engine,
            config.github.clone(),
            config.review.clone(),
        );
        let app = router(AppState::new(dispatcher));

        let listener = tokio::net::TcpListener::bind(&config.server.bind)
            .await
            .with_context(|| format!("Failed to bind {}", config.server.bind))?;

        info!(
            bind = %config.server.bind,
            environment = %config.server.environment,
            "revgate listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        info!("revgate stopped");
        Ok(())
    }
}

/// Resolves when Ctrl+C is pressed
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
