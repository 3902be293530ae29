mod render;

use clap::{Args, Parser, Subcommand};
use quartet::config::DEFAULT_API_URL;
use quartet::{
    ApiClient, ApiError, ConfigError, Deployment, DraftError, Endpoint, MissingCredentials, SessionConfig, SessionHandle,
    validate_credentials, validate_draft,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};

use crate::render::Renderer;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Credentials(#[from] MissingCredentials),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid endpoint: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to read input: {0}")]
    Input(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "quartet-cli", about = "Terminal client for the four-person chat room")]
struct Cli {
    #[arg(long, env = "QUARTET_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// WebSocket base; derived from the API URL when unset.
    #[arg(long, env = "QUARTET_WS_URL")]
    ws_url: Option<String>,

    /// Always use secure schemes.
    #[arg(long, default_value_t = false)]
    production: bool,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the backend health report.
    Health,
    /// Check credentials and print the login result.
    Login(CredentialArgs),
    /// Sign in and join the chat room.
    Chat(CredentialArgs),
}

#[derive(Args, Debug)]
struct CredentialArgs {
    #[arg(long, env = "QUARTET_USERNAME")]
    username: String,

    #[arg(long, env = "QUARTET_PASSWORD", hide_env_values = true)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let api = ApiClient::new(&cli.api_url);
    match &cli.command {
        Command::Health => run_health(&api).await,
        Command::Login(args) => run_login(&api, args).await.map(|_| ()),
        Command::Chat(args) => run_chat(&cli, &api, args).await,
    }
}

fn deployment(cli: &Cli) -> Deployment {
    if cli.production {
        return Deployment::Production;
    }
    std::env::var("QUARTET_ENV")
        .map(|value| Deployment::parse(&value))
        .unwrap_or_default()
}

async fn run_health(api: &ApiClient) -> Result<(), CliError> {
    let health = api.health().await?;
    print_json(&serde_json::to_value(&health)?)
}

/// Log in and return the identity the backend confirmed.
async fn run_login(api: &ApiClient, args: &CredentialArgs) -> Result<String, CliError> {
    let credentials = validate_credentials(&args.username, &args.password)?;
    let response = api.login(&credentials.username, &credentials.password).await?;
    print_json(&serde_json::to_value(&response)?)?;

    if !response.success {
        return Err(CliError::LoginFailed(
            response.message.unwrap_or_else(|| "Login failed".to_owned()),
        ));
    }
    Ok(response.username.unwrap_or(credentials.username))
}

async fn run_chat(cli: &Cli, api: &ApiClient, args: &CredentialArgs) -> Result<(), CliError> {
    let identity = run_login(api, args).await?;
    let endpoint = Endpoint::resolve(cli.ws_url.as_deref(), &cli.api_url, deployment(cli))?;
    let config = SessionConfig::from_env();
    info!(%identity, endpoint = endpoint.base(), "chat: starting session");

    let handle = SessionHandle::spawn(config, endpoint);
    let mut snapshots = handle.subscribe();
    let mut renderer = Renderer::new(identity.clone(), config.reconnect_attempts, config.message_history_limit);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    handle.connect(identity.clone());
    eprintln!("type a message and press enter; /reconnect retries, /quit leaves");

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                for line in renderer.update(&snapshot) {
                    println!("{line}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "/quit" => break,
                    "/reconnect" => handle.connect(identity.clone()),
                    _ => send_draft(&handle, &line, config.max_message_length).await,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    eprintln!("signed out");
    Ok(())
}

async fn send_draft(handle: &SessionHandle, draft: &str, max_len: usize) {
    let text = match validate_draft(draft, max_len) {
        Ok(text) => text,
        Err(DraftError::Empty) => return,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    if let Some(reason) = render::input_blocked(handle.snapshot().status) {
        eprintln!("{reason}");
        return;
    }
    if let Err(e) = handle.send_message(text).await {
        warn!(error = %e, "chat: send failed");
        eprintln!("Failed to send message. Please check your connection.");
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
