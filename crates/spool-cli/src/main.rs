//! Spool CLI - load a file on a background loader and report the outcome
//!
//! ## Usage
//!
//! ```text
//! spool-cli <path> [--delay-ms N] [--cancel-after-ms N] [--throttle-ms N] [--config FILE]
//!           [--save-config]
//! ```
//!
//! - `--delay-ms`: wait before reading (defaults to `start_delay_ms` from config)
//! - `--cancel-after-ms`: cancel the load if it is still running after N ms
//! - `--throttle-ms`: pause after every 64 KiB chunk
//! - `--config`: loader config file (defaults to `<config dir>/spool/loader.yaml`)
//! - `--save-config`: write the effective settings back to the config file
//!
//! Set RUST_LOG=debug for verbose output.

mod file_load;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use spool_core::config::default_config_path;
use spool_core::{Callback, EventQueue, LoadError, Loader, LoaderConfig};

use file_load::FileLoadable;

/// How long to keep waiting for the terminal callback
const MAX_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Default, PartialEq)]
struct Args {
    path: PathBuf,
    delay: Option<Duration>,
    cancel_after: Option<Duration>,
    throttle: Duration,
    config: Option<PathBuf>,
    save_config: bool,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut path = None;
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--delay-ms" => parsed.delay = Some(millis(&arg, iter.next())?),
            "--cancel-after-ms" => parsed.cancel_after = Some(millis(&arg, iter.next())?),
            "--throttle-ms" => parsed.throttle = millis(&arg, iter.next())?,
            "--save-config" => parsed.save_config = true,
            "--config" => {
                let value = iter.next().with_context(|| format!("{} needs a value", arg))?;
                parsed.config = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => bail!("Unexpected argument: {}", arg),
        }
    }

    parsed.path = path.context("Missing <path> argument")?;
    Ok(parsed)
}

/// Config file settings with command-line overrides applied
fn effective_config(file: LoaderConfig, args: &Args) -> LoaderConfig {
    let mut config = file;
    if let Some(delay) = args.delay {
        config.start_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    }
    config
}

fn millis(flag: &str, value: Option<String>) -> Result<Duration> {
    let value = value.with_context(|| format!("{} needs a value", flag))?;
    let ms: u64 = value
        .parse()
        .with_context(|| format!("{} expects milliseconds, got {:?}", flag, value))?;
    Ok(Duration::from_millis(ms))
}

/// How the load ended, as seen by the callback
#[derive(Debug)]
enum Ending {
    Canceled { bytes: u64 },
    Completed { bytes: u64 },
    Failed(LoadError),
}

#[derive(Clone, Default)]
struct RecordEnding {
    ending: Arc<Mutex<Option<Ending>>>,
}

impl RecordEnding {
    fn set(&self, ending: Ending) {
        if let Ok(mut slot) = self.ending.lock() {
            *slot = Some(ending);
        }
    }

    fn take(&self) -> Option<Ending> {
        self.ending.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl Callback<FileLoadable> for RecordEnding {
    fn on_load_canceled(&self, loadable: &FileLoadable) {
        self.set(Ending::Canceled { bytes: loadable.bytes_read() });
    }

    fn on_load_completed(&self, loadable: &FileLoadable) {
        self.set(Ending::Completed { bytes: loadable.bytes_read() });
    }

    fn on_load_error(&self, _: &FileLoadable, error: LoadError) {
        self.set(Ending::Failed(error));
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path("loader.yaml"));
    let config = effective_config(LoaderConfig::load_or_default(&config_path), &args);
    if args.save_config {
        config.save(&config_path)?;
    }
    let delay = config.start_delay();

    let queue = EventQueue::prepare("main").context("Failed to bind event queue")?;
    let mut loader = Loader::from_config(&config).context("Failed to create loader")?;

    let loadable = Arc::new(FileLoadable::new(&args.path, args.throttle));
    let record = RecordEnding::default();
    loader
        .start_loading_delayed(loadable.clone(), record.clone(), delay)
        .context("Failed to start load")?;

    log::info!("Loading {:?} (delay {:?})", loadable.path(), delay);

    if let Some(cancel_after) = args.cancel_after {
        if !queue.run_until(cancel_after, || !loader.is_loading()) {
            log::info!("Canceling after {:?}", cancel_after);
            loader.cancel_loading()?;
        }
    }
    if !queue.run_until(MAX_WAIT, || !loader.is_loading()) {
        bail!("Load did not finish within {:?}", MAX_WAIT);
    }
    loader.release();

    match record.take() {
        Some(Ending::Completed { bytes }) => println!("completed: {} bytes", bytes),
        Some(Ending::Canceled { bytes }) => println!("canceled after {} bytes", bytes),
        Some(Ending::Failed(e)) => {
            return Err(anyhow::Error::new(e).context(format!("Loading {:?} failed", args.path)));
        }
        None => bail!("Loader went idle without reporting an outcome"),
    }

    Ok(())
}
