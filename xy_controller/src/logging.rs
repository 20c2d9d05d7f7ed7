use std::{io, path::Path};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt as _,
};

use crate::config::LoggingSettings;

/// Installs the stdout and log file layers. `RUST_LOG` overrides the
/// configured level. Keep the guard alive or buffered file lines are lost.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&settings.directory)?;

    let file_appender = tracing_appender::rolling::never(&settings.directory, &settings.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))?;

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .with(
            fmt::Layer::new()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false),
        )
        .with(filter);

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

/// Lines of the log file, newest first.
pub async fn read_log(path: &Path) -> io::Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content.lines().rev().map(str::to_owned).collect())
}
