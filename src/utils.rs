use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => Verbosity::Verbose,
            (false, true) => Verbosity::Quiet,
            (false, false) => Verbosity::Normal,
        }
    }

    fn level(self) -> Level {
        match self {
            Verbosity::Quiet => Level::ERROR,
            Verbosity::Normal => Level::INFO,
            Verbosity::Verbose => Level::DEBUG,
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` directives still apply on
/// top of the level chosen here.
pub fn setup_logging(verbosity: Verbosity) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("flatsift={}", verbosity.level()).parse()?);

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

pub fn format_duration(millis: u64) -> String {
    let seconds = millis as f64 / 1000.0;
    match seconds {
        s if s < 60.0 => format!("{:.1}s", s),
        s if s < 3600.0 => format!("{:.1}m", s / 60.0),
        s => format!("{:.1}h", s / 3600.0),
    }
}

/// Lines per second, or `None` when no time has elapsed.
pub fn lines_per_second(lines: usize, millis: u64) -> Option<f64> {
    (millis > 0).then(|| lines as f64 * 1000.0 / millis as f64)
}
