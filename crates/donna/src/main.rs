use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::{LevelFilter, debug};

use donna::api;
use donna::chat::{self, ChatOptions};
use donna::config;

const APP_NAME: &str = "donna";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common)?;

    let settings = config::load(cli.common.config.as_deref())?;
    debug!("settings loaded: {settings:#?}");

    match cli.command {
        Command::Serve => async_serve(settings),
        Command::Chat(cmd) => async_chat(settings, cmd),
        Command::Config { command } => handle_config(&settings, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[tokio::main]
async fn async_serve(settings: config::Settings) -> Result<()> {
    api::serve(settings).await
}

#[tokio::main]
async fn async_chat(settings: config::Settings, cmd: ChatCommand) -> Result<()> {
    chat::run(
        &settings,
        ChatOptions {
            server_url: cmd.server,
            timezone: cmd.timezone,
            token: cmd.token,
            dev_mode: resolve_dev_mode(cmd.dev, cmd.plain),
        },
    )
    .await
}

fn resolve_dev_mode(dev: bool, plain: bool) -> Option<bool> {
    match (dev, plain) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Donna - personal assistant server and chat client.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the backend server
    Serve,
    /// Chat with Donna from the terminal
    Chat(ChatCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct ChatCommand {
    /// Server websocket URL (defaults to client.server_url)
    #[arg(long)]
    server: Option<String>,
    /// IANA timezone to report, e.g. Europe/Berlin
    #[arg(long)]
    timezone: Option<String>,
    /// Auth token, when the server requires one
    #[arg(long, env = "DONNA_TOKEN")]
    token: Option<String>,
    /// Show thinking and tool activity
    #[arg(long, conflicts_with = "plain")]
    dev: bool,
    /// Hide thinking and tool activity
    #[arg(long)]
    plain: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the resolved configuration
    Show,
    /// Print the config file path
    Path,
}

fn init_logging(common: &CommonOpts) -> Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    if common.quiet {
        log::set_max_level(LevelFilter::Off);
        return Ok(());
    }
    let level = match common.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // HTTP request traces go through tracing, everything else through log.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("donna={level},tower_http={level}")));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal()),
        )
        .try_init()
        .ok();

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.to_string()),
    );
    builder.format_timestamp_secs();
    if !io::stderr().is_terminal() {
        builder.write_style(env_logger::WriteStyle::Never);
    }
    builder.try_init().ok();
    Ok(())
}

fn handle_config(settings: &config::Settings, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            println!("{}", toml::to_string_pretty(settings)?);
        }
        ConfigCommand::Path => match config::default_config_path() {
            Some(path) => println!("{}", path.display()),
            None => eprintln!("no config directory available"),
        },
    }
    Ok(())
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}
