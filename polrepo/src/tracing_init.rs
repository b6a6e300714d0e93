use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::settings::RepoSettings;

/// Installs the global subscriber.
///
/// Log path: `POLREPO_LOG` env var > `~/.polrepo/polrepo.log` > stderr.
/// The log file always records DEBUG; stderr gets INFO unless `debug` is set.
pub fn init_tracing(debug: bool) {
    let log_path = std::env::var_os("POLREPO_LOG")
        .map(PathBuf::from)
        .or_else(|| {
            RepoSettings::settings_dir()
                .ok()
                .map(|d| d.join("polrepo.log"))
        });

    let log_file = log_path.as_deref().and_then(|path| {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).ok()?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    let layer: Box<dyn Layer<_> + Send + Sync> = match log_file {
        Some(file) => tracing_subscriber::fmt::layer()
            .with_writer(file)
            .pretty()
            .with_ansi(false)
            .with_filter(LevelFilter::from_level(Level::DEBUG))
            .boxed(),
        None => {
            let level = if debug { Level::DEBUG } else { Level::INFO };
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .pretty()
                .with_ansi(false)
                .with_filter(LevelFilter::from_level(level))
                .boxed()
        }
    };

    tracing_subscriber::registry().with(layer).init()
}
