use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter directive for the given verbosity.
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Install the global subscriber. Logs go to stderr; `RUST_LOG` takes
/// precedence over the `-v`/`-q` flags.
pub fn init(verbose: bool, quiet: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_level(true)
        .compact();

    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose, quiet)))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_picks_the_directive() {
        assert_eq!(default_directive(false, false), "info");
        assert_eq!(default_directive(true, false), "debug");
        assert_eq!(default_directive(false, true), "warn");
    }

    #[test]
    fn init_twice_does_not_panic() {
        // Only the first install in a process succeeds.
        let _ = init(false, false);
        assert!(init(false, false).is_err());
        tracing::info!("logging initialised");
    }
}
