use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::LoggingError;

/// Install the global log subscriber.
///
/// With a log directory, output is appended to `<dir>/<component>.log` without
/// colour, after a restart banner. Without one, it goes to stderr. `level` is
/// a filter directive such as `info` or `riden=debug`; unparsable directives
/// are ignored and the level falls back to `info`.
pub fn init(log_dir: Option<&Path>, component: &str, level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(level);

    match log_dir {
        Some(dir) => {
            let path = dir.join(format!("{component}.log"));
            let open_error = |source| LoggingError::Open {
                path: path.display().to_string(),
                source,
            };
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(open_error)?;
            writeln!(file, "\n").map_err(open_error)?;

            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    info!(component, "------- Re-starting logging -------");
    Ok(())
}
