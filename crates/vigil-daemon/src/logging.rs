//! Tracing subscriber setup driven by the `[logging]` section.
//!
//! Levels live behind a reloadable `EnvFilter`, so a configuration reload
//! can change them in place. Sinks are fixed once installed.

use parking_lot::Mutex;
use tracing::{info, warn, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Layer, Registry};
use vigil_config::{FileSettings, LogFormat, LoggingSettings, Rotation};

use crate::error::DaemonError;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Handle on the installed subscriber.
///
/// Keeps the file writer's worker alive; drop it only at exit.
pub struct LoggingHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    applied: Mutex<LoggingSettings>,
    _guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    /// Check that `settings` would be accepted by [`update`](Self::update).
    pub fn check(&self, settings: &LoggingSettings) -> Result<(), DaemonError> {
        build_filter(settings).map(|_| ())
    }

    /// Apply new levels. Returns whether the levels changed.
    ///
    /// Only levels are recorded as applied; the sinks stay those installed
    /// by [`init`], so a sink change keeps being reported until a restart.
    pub fn update(&self, settings: &LoggingSettings) -> Result<bool, DaemonError> {
        let mut applied = self.applied.lock();

        if !applied.same_sinks(settings) {
            warn!("Log sink changes take effect after a restart");
        }
        if applied.filter_directives() == settings.filter_directives() {
            return Ok(false);
        }

        let filter = build_filter(settings)?;
        self.filter
            .reload(filter)
            .map_err(|e| DaemonError::Logging(e.to_string()))?;
        applied.level = settings.level.clone();
        applied.targets = settings.targets.clone();

        info!(directives = %settings.filter_directives(), "Log levels updated");
        Ok(true)
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured levels at startup. The console sink
/// is only attached when [`ConsoleSettings::is_attached`] allows it for the
/// current mode.
///
/// [`ConsoleSettings::is_attached`]: vigil_config::ConsoleSettings::is_attached
pub fn init(settings: &LoggingSettings, foreground: bool) -> Result<LoggingHandle, DaemonError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(settings)?,
    };
    let (filter_layer, filter) = reload::Layer::new(env_filter);

    let console = settings
        .console
        .is_attached(foreground)
        .then(|| format_layer(settings.console.format, std::io::stderr, foreground));

    let (file, guard) = match &settings.file {
        Some(file_settings) => {
            let appender = file_appender(file_settings)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(format_layer(file_settings.format, writer, false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| DaemonError::Logging(e.to_string()))?;

    Ok(LoggingHandle {
        filter,
        applied: Mutex::new(settings.clone()),
        _guard: guard,
    })
}

/// Build the level filter for `settings`.
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter, DaemonError> {
    let directives = settings.filter_directives();
    EnvFilter::try_new(&directives)
        .map_err(|e| DaemonError::Logging(format!("Invalid log levels '{}': {}", directives, e)))
}

fn file_appender(settings: &FileSettings) -> Result<RollingFileAppender, DaemonError> {
    std::fs::create_dir_all(&settings.directory)?;

    let rotation = match settings.rotation {
        Rotation::Never => rolling::Rotation::NEVER,
        Rotation::Hourly => rolling::Rotation::HOURLY,
        Rotation::Daily => rolling::Rotation::DAILY,
    };

    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&settings.prefix)
        .build(&settings.directory)
        .map_err(|e| DaemonError::Logging(e.to_string()))
}

fn format_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_target(true);
    match format {
        LogFormat::Full => layer.with_ansi(ansi).boxed(),
        LogFormat::Compact => layer.compact().with_ansi(ansi).boxed(),
        LogFormat::Json => layer.json().with_ansi(false).boxed(),
    }
}
