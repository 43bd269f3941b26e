use std::time::Duration;

use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use spotmeta::{cli, config, error};

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
    /// Fetch metadata for a Spotify link or URI
    Fetch(FetchOptions),

    /// Print a bearer token
    Token(TokenOptions),

    /// Manage the optional Spotify login
    Auth(AuthOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct FetchOptions {
    /// Track, album, playlist, artist or discography link
    pub url: String,

    /// Batch mode: pause between listing pages and report the page count
    #[clap(long)]
    pub batch: bool,

    /// Pause between pages in batch mode, in seconds
    #[clap(long, default_value_t = 0)]
    pub delay: u64,

    /// Overall deadline in seconds, 0 for none
    #[clap(long, default_value_t = 60)]
    pub timeout: u64,

    /// Print the track list as a table instead of JSON
    #[clap(long)]
    pub table: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct TokenOptions {
    /// Deadline in seconds, 0 for none
    #[clap(long, default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct AuthOptions {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuthSubcommand {
    /// Log in through the browser (OAuth PKCE)
    Login(LoginOpts),

    /// Show the stored login
    Status,

    /// Remove the stored login
    Logout,
}

#[derive(Parser, Debug, Clone)]
pub struct LoginOpts {
    /// Spotify application client id, defaults to SPOTIFY_API_AUTH_CLIENT_ID
    #[clap(long)]
    pub client_id: Option<String>,

    /// Seconds to wait for the browser callback
    #[clap(long, default_value_t = 120)]
    pub timeout: u64,
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

    let cli = Cli::parse();

    match cli.command {
        Command::Fetch(opt) => {
            cli::fetch(
                &opt.url,
                opt.batch,
                Duration::from_secs(opt.delay),
                Duration::from_secs(opt.timeout),
                opt.table,
            )
            .await
        }
        Command::Token(opt) => cli::token(Duration::from_secs(opt.timeout)).await,
        Command::Auth(opt) => match opt.command {
            AuthSubcommand::Login(l) => {
                cli::login(l.client_id, Duration::from_secs(l.timeout)).await
            }
            AuthSubcommand::Status => cli::status().await,
            AuthSubcommand::Logout => cli::logout().await,
        },
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
