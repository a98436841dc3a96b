use crate::config::LoggingConfig;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Level picked from `-v` flags, falling back to the configured one.
fn effective_level(config: &LoggingConfig, cli_verbose: u8) -> &str {
    match cli_verbose {
        0 => &config.level,
        1 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG` wins when set; otherwise workspace crates log at `level` and
/// everything else at `warn`.
pub fn build_filter(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<EnvFilter> {
    let level = effective_level(config, cli_verbose);
    let mut filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("warn,mathstake={}", level)),
    );

    for (module, level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }
    Ok(filter)
}

fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let filter = build_filter(config, cli_verbose)?;
    let subscriber = tracing_subscriber::registry().with(filter);
    let file = config.file_output.as_deref().map(open_log_file).transpose()?;

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true);

            if let Some(file) = file {
                let file_layer = fmt::layer().json().with_writer(file).with_ansi(false);
                subscriber.with(json_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(json_layer).try_init()?;
            }
        }
        "compact" => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(false)
                .with_file(false);

            if let Some(file) = file {
                let file_layer = fmt::layer().compact().with_writer(file).with_ansi(false);
                subscriber.with(compact_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(compact_layer).try_init()?;
            }
        }
        _ => {
            // Source locations only at debug and below.
            let show_location = matches!(effective_level(config, cli_verbose), "debug" | "trace");

            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_thread_ids(false)
                .with_line_number(show_location)
                .with_file(show_location);

            if let Some(file) = file {
                let file_layer = fmt::layer().with_writer(file).with_ansi(false);
                subscriber.with(pretty_layer).with(file_layer).try_init()?;
            } else {
                subscriber.with(pretty_layer).try_init()?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag_overrides_level() {
        let config = LoggingConfig::default();
        assert_eq!(effective_level(&config, 0), "info");
        assert_eq!(effective_level(&config, 1), "debug");
        assert_eq!(effective_level(&config, 3), "trace");
    }

    #[test]
    fn test_bad_module_filter_is_rejected() {
        let mut config = LoggingConfig::default();
        config
            .module_filters
            .insert("mathstake_sandbox".into(), "loud".into());
        assert!(build_filter(&config, 0).is_err());
    }

    #[test]
    fn test_log_file_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("node.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
