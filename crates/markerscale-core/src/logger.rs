//! Stderr logger for binaries and tests.
//!
//! Lines look like `[  0.153s  INFO detect::chain] message`: the
//! `markerscale_` prefix of the target is dropped so the crate part reads
//! `core`, `detect` or `markerscale`.
//!
//! Levels come from a [`LogFilter`]: a default level plus per-target
//! overrides in the `MARKERSCALE_LOG` syntax, e.g.
//! `warn,markerscale_detect::chain=debug`. The longest matching target
//! prefix wins. With the `tracing` feature, [`init_tracing`] installs a
//! `tracing-subscriber` formatter driven by the same variable (falling back
//! to `RUST_LOG`) instead.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable read by [`filter_from_env`] and [`init_tracing`].
pub const LOG_LEVEL_ENV: &str = "MARKERSCALE_LOG";

const TARGET_PREFIX: &str = "markerscale_";

/// Default level with per-target overrides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    pub default: LevelFilter,
    /// `(target prefix, level)`; the longest matching prefix applies.
    pub targets: Vec<(String, LevelFilter)>,
}

impl LogFilter {
    pub fn new(default: LevelFilter) -> Self {
        Self {
            default,
            targets: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>, level: LevelFilter) -> Self {
        self.targets.push((target.into(), level));
        self
    }

    /// Parse comma-separated directives: a bare level sets the default,
    /// `target=level` adds an override. Unparsable directives are skipped.
    pub fn parse(spec: &str, default: LevelFilter) -> Self {
        let mut filter = Self::new(default);
        for directive in spec.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.split_once('=') {
                Some((target, level)) => {
                    if let Ok(level) = level.trim().parse() {
                        filter.targets.push((target.trim().to_string(), level));
                    }
                }
                None => {
                    if let Ok(level) = directive.parse() {
                        filter.default = level;
                    }
                }
            }
        }
        filter
    }

    pub fn level_for(&self, target: &str) -> LevelFilter {
        self.targets
            .iter()
            .filter(|(prefix, _)| target_matches(target, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.default, |(_, level)| *level)
    }

    /// Most verbose level any target can reach.
    pub fn max_level(&self) -> LevelFilter {
        self.targets
            .iter()
            .map(|(_, level)| *level)
            .fold(self.default, Ord::max)
    }
}

/// `prefix` names `target` itself or one of its modules.
fn target_matches(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

fn short_target(target: &str) -> &str {
    target.strip_prefix(TARGET_PREFIX).unwrap_or(target)
}

struct StderrLogger {
    filter: LogFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter.level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger; later calls are no-ops.
pub fn init_with_filter(filter: LogFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let max = filter.max_level();
        let logger = LOGGER.get_or_init(|| StderrLogger {
            filter,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(max);
    }
    Ok(())
}

/// Install the stderr logger with one level for every target.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    init_with_filter(LogFilter::new(level))
}

/// Filter parsed from [`LOG_LEVEL_ENV`], or `default` everywhere when unset.
pub fn filter_from_env(default: LevelFilter) -> LogFilter {
    match std::env::var(LOG_LEVEL_ENV) {
        Ok(spec) => LogFilter::parse(&spec, default),
        Err(_) => LogFilter::new(default),
    }
}

/// Output layout of [`init_tracing`].
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable lines with uptime and span timings.
    Pretty,
    /// One flattened JSON object per event, for collecting run timings.
    Json,
}

/// Install a `tracing-subscriber` formatter. Spans report their duration on
/// close, so the detection stages and the precision pipeline are timed.
#[cfg(feature = "tracing")]
pub fn init_tracing(format: TracingFormat) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            EnvFilter::new("warn,markerscale=info,markerscale_core=info,markerscale_detect=info")
        });
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);
    let _ = match format {
        TracingFormat::Json => builder.json().flatten_event(true).finish().try_init(),
        TracingFormat::Pretty => builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_set_default_and_overrides() {
        let f = LogFilter::parse(
            "warn, markerscale_detect=debug,markerscale_detect::chain=trace,bogus=loud",
            LevelFilter::Info,
        );
        assert_eq!(f.default, LevelFilter::Warn);
        assert_eq!(f.targets.len(), 2);
        assert_eq!(f.level_for("markerscale_core::ransac"), LevelFilter::Warn);
        assert_eq!(f.level_for("markerscale_detect::edges"), LevelFilter::Debug);
        assert_eq!(f.level_for("markerscale_detect::chain"), LevelFilter::Trace);
        assert_eq!(f.max_level(), LevelFilter::Trace);
    }

    #[test]
    fn prefixes_match_whole_path_segments() {
        let f = LogFilter::new(LevelFilter::Error).with_target("markerscale", LevelFilter::Debug);
        assert_eq!(f.level_for("markerscale::precision"), LevelFilter::Debug);
        assert_eq!(f.level_for("markerscale_detect::color"), LevelFilter::Error);
    }

    #[test]
    fn targets_drop_the_crate_prefix() {
        assert_eq!(short_target("markerscale_detect::chain"), "detect::chain");
        assert_eq!(short_target("markerscale::precision"), "markerscale::precision");
        assert_eq!(short_target("other"), "other");
    }

    #[test]
    fn empty_spec_keeps_the_default() {
        assert_eq!(LogFilter::parse("", LevelFilter::Info), LogFilter::new(LevelFilter::Info));
    }
}
