use std::{error::Error, path::PathBuf, process, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};

use ynison_bio::{
    alert::Topic,
    config::{Config, Secrets, Telegram},
    error::{self, ErrorKind},
    signal,
    sync::Syncer,
    token::Token,
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
    /// Secrets file
    ///
    /// Holds the Yandex Music token and, optionally, the Telegram bot token
    /// and chat. Keep this file private: the tokens grant access to your
    /// accounts.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// Yandex Music OAuth token, instead of the one in the secrets file
    #[arg(long, env = "YANDEX_MUSIC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Telegram bot token, instead of the one in the secrets file
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    bot_token: Option<String>,

    /// Telegram chat for alerts, instead of the one in the secrets file
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    chat_id: Option<String>,

    /// Text to restore when the bot has not seen your own text yet
    #[arg(long, env = "INITIAL_BIO", default_value_t = String::new())]
    initial_bio: String,

    /// File that remembers your own text across restarts
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from(Config::DEFAULT_STATE_FILE))]
    state_file: String,

    /// File to dump the last session state to
    ///
    /// Set to an empty string to disable.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from(Config::DEFAULT_SNAPSHOT_FILE))]
    snapshot_file: String,

    /// Seconds between sync cycles
    #[arg(short, long, value_name = "SECONDS", default_value_t = Config::DEFAULT_INTERVAL.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Forum topic for playback alerts
    #[arg(long, env = "YM_THREAD", default_value_t = 0)]
    ym_thread: i64,

    /// Forum topic for profile alerts
    #[arg(long, env = "BIO_THREAD", default_value_t = 0)]
    bio_thread: i64,

    /// Track playback without publishing statuses
    #[arg(long, default_value_t = false)]
    dry_run: bool,

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

    logger.init();
}

/// Builds the configuration from the secrets file and the arguments.
///
/// Arguments and environment variables take precedence over the secrets
/// file, which may be absent when they provide the token.
///
/// # Errors
///
/// Returns an `Unauthenticated` error when no token is provided, or the
/// error of reading the secrets file.
fn load_config(args: &Args) -> error::Result<Config> {
    let secrets = match Secrets::from_file(&args.secrets_file) {
        Ok(secrets) => Some(secrets),
        Err(e) if e.kind == ErrorKind::NotFound && args.token.is_some() => None,
        Err(e) => {
            if e.kind == ErrorKind::NotFound {
                info!(
                    "read the documentation on how to set your token in {}",
                    args.secrets_file
                );
            }
            return Err(e);
        }
    };

    let token = match &args.token {
        Some(token) => Some(token.parse::<Token>()?),
        None => secrets.as_ref().and_then(|secrets| secrets.token.clone()),
    }
    .ok_or_else(|| error::Error::unauthenticated("no Yandex Music token configured"))?;

    let bot_token = match &args.bot_token {
        Some(token) => Some(token.parse::<Token>()?),
        None => secrets.as_ref().and_then(|secrets| secrets.bot_token.clone()),
    };
    let chat_id = args
        .chat_id
        .clone()
        .or_else(|| secrets.and_then(|secrets| secrets.chat_id));

    let mut config = Config::with_token(token);
    config.initial_bio.clone_from(&args.initial_bio);
    config.state_file = PathBuf::from(&args.state_file);
    config.snapshot_file = Some(&args.snapshot_file)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from);
    config.interval = Duration::from_secs(args.interval);
    config.telegram = bot_token.map(|bot_token| Telegram {
        bot_token,
        chat_id,
        playback_thread: args.ym_thread,
        profile_thread: args.bio_thread,
    });

    debug!("{config:#?}");
    Ok(config)
}

/// Main application loop.
///
/// Runs a cycle, then waits for the interval or a signal. Cycle errors are
/// reported and the loop goes on, except for a rejected token in the first
/// cycle after (re)loading. SIGHUP rebuilds the configuration and handles;
/// if that fails, the current ones are kept.
///
/// # Errors
///
/// Returns an error when the configuration cannot be loaded at start or the
/// token is rejected.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut signals = signal::Handler::new()?;

    let mut config = load_config(&args)?;
    let mut syncer = Syncer::new(&config, args.dry_run)?;
    let mut first = true;

    loop {
        if first {
            syncer
                .alerter()
                .info(
                    Topic::Playback,
                    &format!("syncing every {}s", config.interval.as_secs()),
                )
                .await;
        }

        // A cycle runs to completion; signals are handled in between.
        match syncer.cycle().await {
            Ok(outcome) => debug!("cycle done: {outcome}"),
            Err(e) if first && e.kind == ErrorKind::Unauthenticated => {
                syncer.alerter().error(Topic::Playback, &e.to_string()).await;
                return Err(e.into());
            }
            Err(e) => syncer.report(&e).await,
        }
        first = false;

        tokio::select! {
            // Prioritize signals.
            biased;

            signal = signals.recv() => {
                if signal.is_shutdown() {
                    info!("received {signal}, shutting down");
                    syncer.alerter().info(Topic::Playback, "sync stopped").await;
                    break Ok(());
                }

                info!("received {signal}, reloading");
                match load_config(&args)
                    .and_then(|reloaded| Ok((Syncer::new(&reloaded, args.dry_run)?, reloaded)))
                {
                    Ok((reloaded_syncer, reloaded)) => {
                        syncer = reloaded_syncer;
                        config = reloaded;
                        first = true;
                    }
                    Err(e) => error!("reload failed, keeping current configuration: {e}"),
                }
            }

            () = tokio::time::sleep(config.interval) => {}
        }
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

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
