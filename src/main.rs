use std::{process, sync::Arc};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::mpsc,
};
use url::Url;

use mazetune::{
    auth::CredentialManager,
    bridge::Bridge,
    config::Config,
    error::{Error, ErrorKind, Result},
    events::Event,
    game::{GameHooks, JsonLinesHooks},
    http::Client as HttpClient,
    location::{ConsoleLocation, Location},
    player::Player,
    runtime::{ConnectRuntime, Runtime},
    signal,
    storage::{FileStorage, MemoryStorage},
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("mazetune.toml"))]
    config: String,

    /// URL the game was opened with
    ///
    /// An `error` parameter, as Spotify appends when a login is declined,
    /// is logged and removed before a new login starts.
    ///
    /// [default: the configured redirect URI]
    #[arg(long, value_name = "URL", value_hint = ValueHint::Url)]
    callback_url: Option<String>,

    /// Name of the Spotify Connect device to play on
    ///
    /// [default: from the configuration file]
    #[arg(short, long)]
    name: Option<String>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// Logs go to stderr; stdout carries the game hooks.
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.target(env_logger::Target::Stderr).init();
}

type StdinLines = Lines<BufReader<Stdin>>;

/// Starts the run, walking the user through a login when needed.
async fn start<R, H>(
    bridge: &mut Bridge<R, ConsoleLocation, H>,
    lines: &mut StdinLines,
) -> Result<()>
where
    R: Runtime,
    H: GameHooks,
{
    loop {
        match bridge.start_run().await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind == ErrorKind::Unauthenticated => {
                let Some(login_url) = bridge.location().pending() else {
                    return Err(e);
                };

                eprintln!("Log in to Spotify by opening:\n\n    {login_url}\n");
                eprintln!("Then paste the URL your browser was redirected to:");

                let line = lines
                    .next_line()
                    .await?
                    .ok_or_else(|| Error::cancelled("input closed before login completed"))?;
                let redirected = Url::parse(line.trim())?;
                bridge.location_mut().replace(redirected);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Forwards game events from stdin until it closes.
fn forward_events(mut lines: StdinLines) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("reading events failed: {e}");
                    break;
                }
            };

            match Event::from_line(&line) {
                Ok(Some(event)) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("ignoring event: {e}"),
            }
        }

        debug!("event input closed");
    });
    rx
}

/// Main application loop.
///
/// # Errors
///
/// Returns error when the configuration is invalid, the run cannot be
/// started, or signal handlers cannot be installed.
async fn run(args: Args) -> Result<()> {
    let mut config = Config::from_file(&args.config)?;
    if let Some(name) = args.name {
        config.device_name = name;
    }

    let current = match args.callback_url {
        Some(url) => Url::parse(&url)?,
        None => config.redirect_uri.clone(),
    };

    let http_client = Arc::new(HttpClient::new(&config)?);
    let credentials = CredentialManager::new(
        &config,
        Arc::clone(&http_client),
        Box::new(FileStorage::new(&config.state_dir)),
        Box::new(MemoryStorage::new()),
    );
    let runtime = ConnectRuntime::new(
        Arc::clone(&http_client),
        config.api_url.clone(),
        &config.device_name,
    );
    let player = Player::new(&config, Arc::clone(&http_client), runtime);
    let hooks = JsonLinesHooks::new(std::io::stdout());

    let mut bridge = Bridge::new(
        &config,
        http_client,
        credentials,
        ConsoleLocation::new(current),
        player,
        hooks,
    );

    let mut signals = signal::Handler::new()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let session = async {
        start(&mut bridge, &mut lines).await?;
        let mut events = forward_events(lines);
        bridge.run(&mut events).await;
        Ok::<_, Error>(())
    };

    tokio::select! {
        // Prioritize shutdown signals.
        biased;

        signal = signals.recv() => {
            info!("received {signal}, shutting down gracefully");
            Ok(())
        }

        result = session => result,
    }
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }

    // A pending stdin read would otherwise keep the runtime from shutting down.
    process::exit(0);
}
