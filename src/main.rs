use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use earshot::{cli, config, error, providers::Provider};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in to a provider (browser redirect, QR scan or pasted cookie)
    Login(LoginOptions),

    /// Remove the stored credential of a provider
    Logout(ProviderOption),

    /// Show login state for one or all providers
    Status(StatusOptions),

    /// Send one authenticated request to a provider API
    Call(CallOptions),

    /// Show or change persisted settings
    Config(ConfigOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct ProviderOption {
    /// spotify, netease, qqmusic or ytmusic
    provider: Provider,
}

#[derive(Parser, Debug, Clone)]
pub struct LoginOptions {
    /// spotify, netease, qqmusic or ytmusic
    provider: Provider,

    /// Log in by scanning a QR code instead of pasting a cookie (qqmusic)
    #[clap(long)]
    qr: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusOptions {
    provider: Option<Provider>,
}

#[derive(Parser, Debug, Clone)]
pub struct CallOptions {
    provider: Provider,

    /// Path relative to the provider API base, or an absolute URL
    endpoint: String,

    #[clap(long, default_value = "GET")]
    method: String,

    /// JSON request body
    #[clap(long)]
    json: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigOptions {
    /// Spotify application client id used for the OAuth login
    #[clap(long)]
    client_id: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EARSHOT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Login(opt) => cli::login(opt.provider, opt.qr).await,
        Command::Logout(opt) => cli::logout(opt.provider).await,
        Command::Status(opt) => cli::status(opt.provider).await,
        Command::Call(opt) => cli::call(opt.provider, opt.endpoint, opt.method, opt.json).await,
        Command::Config(opt) => cli::settings(opt.client_id).await,
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
