//! Tracing setup shared by the `explainx` and `explainx-web` binaries.
//!
//! | Verbosity | Default filter                 |
//! |-----------|--------------------------------|
//! | 0         | `warn,explainx=info`           |
//! | 1         | `info,explainx=debug`          |
//! | 2+        | `debug,explainx=trace`         |
//!
//! `RUST_LOG`, when set, replaces the default filter entirely. Output goes to
//! stderr so stdout stays clean for command results.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter directive for a `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,explainx=info,explainx_web=info",
        1 => "info,explainx=debug,explainx_web=debug",
        _ => "debug,explainx=trace,explainx_web=trace",
    }
}

/// Install the global subscriber. Calling it twice is harmless; the second
/// call leaves the first subscriber in place.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_parse() {
        for v in 0..4 {
            assert!(default_directive(v).parse::<EnvFilter>().is_ok());
        }
    }

    #[test]
    fn init_twice_is_harmless() {
        init(0);
        init(2);
        tracing::info!("logging initialized");
    }
}
