//! Tracing setup for the sidecar runner.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing from the environment.
///
/// `QUICKTRANS_LOG` selects the level (`trace`, `debug`, `info`, `warn`,
/// `error`; default `info`); `LOG_FORMAT=json` switches to JSON output.
/// Library code never installs a subscriber, only the runner binary calls
/// this.
pub fn init_tracing() {
    let filter = if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else {
        let level = level_from(std::env::var("QUICKTRANS_LOG").ok().as_deref());
        EnvFilter::new(format!("quicktrans_sidecar={level},quicktrans={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn level_from(value: Option<&str>) -> &'static str {
    match value {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tracing_level_is_selectable() {
        assert_eq!(level_from(Some("trace")), "trace");
        assert_eq!(level_from(Some("debug")), "debug");
        assert_eq!(level_from(Some("info")), "info");
        assert_eq!(level_from(Some("warn")), "warn");
        assert_eq!(level_from(Some("warning")), "warn");
        assert_eq!(level_from(Some("error")), "error");
    }

    #[test]
    fn unknown_or_unset_level_defaults_to_info() {
        assert_eq!(level_from(None), "info");
        assert_eq!(level_from(Some("verbose")), "info");
    }
}
