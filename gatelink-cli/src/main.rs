//! Gatelink CLI
//!
//! Command-line client for the Gatelink platform: log in via the OAuth2
//! Authorization Code flow with PKCE, then serve gateway commands with the
//! bundled example handlers.
//!
//! # Usage
//!
//! ```bash
//! # Log in via the browser
//! gatelink login
//!
//! # Silent re-login using the stored refresh token
//! gatelink refresh
//!
//! # Register with the gateway and serve commands
//! gatelink serve
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use gatelink_client::Dispatcher;
use gatelink_core::auth::{AuthFlow, AuthState};
use gatelink_core::config::{load_config, PlatformConfig};
use gatelink_core::store::{create_store, CredentialStore};

mod callback;
mod handlers;

#[derive(Parser)]
#[command(name = "gatelink")]
#[command(about = "Gateway peer client for the Gatelink platform")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in via the browser (authorization code flow with PKCE)
    Login,

    /// Log in silently using the stored refresh token
    Refresh,

    /// Show the current authentication state
    Status,

    /// Forget all tokens and stored credentials
    Logout,

    /// Connect to the gateway and serve commands with the example handlers
    Serve {
        /// Connect to a fixed gateway endpoint instead of querying the
        /// platform configuration
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Login => login().await,
        Commands::Refresh => refresh().await,
        Commands::Status => status().await,
        Commands::Logout => logout().await,
        Commands::Serve { endpoint } => serve(endpoint).await,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Build a flow over the persistent credential store.
async fn open_flow(auto_login: bool) -> Result<(PlatformConfig, AuthFlow<Box<dyn CredentialStore>>)> {
    let config = load_config()?;
    let store = create_store(true);
    let mut flow = AuthFlow::new(config.clone(), store).with_auto_login(auto_login);
    flow.init().await?;
    Ok((config, flow))
}

async fn login() -> Result<()> {
    let (config, mut flow) = open_flow(false).await?;
    run_browser_login(&config, &mut flow).await?;
    println!("Logged in.");
    Ok(())
}

/// Initiate the flow, wait for the redirect on the loopback listener, and
/// complete the code exchange.
async fn run_browser_login(
    config: &PlatformConfig,
    flow: &mut AuthFlow<Box<dyn CredentialStore>>,
) -> Result<()> {
    let auth_url = flow.initiate().await?;

    let redirect = Url::parse(&config.redirect_uri)
        .with_context(|| format!("invalid redirect URI {}", config.redirect_uri))?;
    let port = redirect.port().unwrap_or(80);

    println!("Open this URL in your browser to log in:\n\n  {auth_url}\n");

    let query = callback::listen_for_callback(port).await?;

    if let Err(e) = flow.handle_callback(&query).await {
        if let Some(description) = flow.error_description() {
            eprintln!("Authentication failed: {description}");
        }
        return Err(e.into());
    }

    Ok(())
}

async fn refresh() -> Result<()> {
    let (_config, mut flow) = open_flow(false).await?;

    flow.auth_using_refresh_token().await?;
    println!("Logged in using the stored refresh token.");
    Ok(())
}

async fn status() -> Result<()> {
    let (_config, flow) = open_flow(false).await?;

    match flow.state() {
        AuthState::NotAuthenticated => println!("Not authenticated."),
        AuthState::RefreshTokenPresent => {
            println!("Not authenticated; a stored refresh token is available (try `gatelink refresh`).")
        }
        AuthState::Authenticating => println!("Authentication in progress."),
        AuthState::Authenticated => println!("Authenticated."),
        AuthState::Error => {
            println!(
                "Authentication error: {}",
                flow.error().unwrap_or("unknown")
            );
            if let Some(description) = flow.error_description() {
                println!("  {description}");
            }
        }
    }
    Ok(())
}

async fn logout() -> Result<()> {
    let (_config, mut flow) = open_flow(false).await?;
    flow.logout().await?;
    println!("Logged out; stored credentials cleared.");
    Ok(())
}

async fn serve(endpoint: Option<String>) -> Result<()> {
    // Prefer the silent refresh; fall back to the browser login.
    let (config, mut flow) = open_flow(true).await?;

    if !flow.is_authenticated() {
        run_browser_login(&config, &mut flow).await?;
    }

    let platform = flow.platform_client()?;

    let mut builder = Dispatcher::builder(platform)
        .supported_data(handlers::supported_data())
        .handlers(Arc::new(handlers::ExampleHandlers))
        .client_version(env!("CARGO_PKG_VERSION"));

    if let Some(endpoint) = endpoint {
        builder = builder.endpoint(endpoint);
    }

    let dispatcher = builder.connect().await?;

    info!("serving gateway commands, press Ctrl+C to stop");

    tokio::select! {
        _ = dispatcher.join() => {
            info!("gateway closed the connection");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
