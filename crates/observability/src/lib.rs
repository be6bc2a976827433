use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber writing to a non-blocking stderr.
/// Stdout stays free for command output.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to every target.
/// Keep the returned guard alive for the lifetime of the process or buffered
/// lines are dropped on exit.
pub fn init_tracing(
    service_name: &str,
    default_level: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(service_name, default_level)));

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    installed.ok().map(|_| guard)
}

fn default_filter(service_name: &str, level: &str) -> String {
    let target = service_name.replace('-', "_");
    format!("{target}={level},{level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_normalizes_binary_name() {
        assert_eq!(
            default_filter("creative-signals", "debug"),
            "creative_signals=debug,debug"
        );
    }

    #[test]
    fn second_init_is_harmless() {
        let first = init_tracing("observability", "info");
        let second = init_tracing("observability", "info");
        assert!(first.is_some());
        assert!(second.is_none());
    }
}
