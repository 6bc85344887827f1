//! Logger setup and logging macros
//!
//! For the macros to properly compile, the calling crate must add a dependency to
//! crate log (ie. `log.workspace = true`).

pub use log::{Level, LevelFilter};

use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::PathBuf;

/// Environment variable overriding the log filter expression (`RUST_LOG`-style syntax)
pub const DEFAULT_LOGGER_ENV: &str = "PROVENANCE_LOG";

const LOG_FILE_NAME: &str = "provenance.log";
const LOG_FILE_MAX_SIZE: u64 = 100 * 1024 * 1024;
const LOG_FILE_MAX_ROLLS: u32 = 8;
const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f%z)} [{h({l:>5})}] {m}{n}";

const CONSOLE_APPENDER: &str = "stdout";
const LOG_FILE_APPENDER: &str = "log_file";

/// Parses a `RUST_LOG`-style filter expression such as
/// `info,provenance_query=trace,provenance_database=debug` into a root level
/// and a list of per-module loggers. Unparsable levels fall back to `info`.
fn parse_filters(expression: &str) -> (LevelFilter, Vec<Logger>) {
    let mut root_level = LevelFilter::Info;
    let mut loggers = Vec::new();
    for part in expression.split(',').map(str::trim).filter(|x| !x.is_empty()) {
        match part.split_once('=') {
            Some((target, level)) => {
                let level = level.parse().unwrap_or(LevelFilter::Info);
                loggers.push(Logger::builder().build(target.to_string(), level));
            }
            None => {
                root_level = part.parse().unwrap_or(LevelFilter::Info);
            }
        }
    }
    (root_level, loggers)
}

fn effective_filters(filters: &str) -> String {
    std::env::var(DEFAULT_LOGGER_ENV).unwrap_or_else(|_| filters.to_string())
}

pub fn init_logger(log_dir: Option<&str>, filters: &str) {
    let (root_level, loggers) = parse_filters(&effective_filters(filters));

    let stdout = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build();
    let mut config = Config::builder().appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(stdout)));
    let mut root = Root::builder().appender(CONSOLE_APPENDER);

    if let Some(log_dir) = log_dir {
        let log_path: PathBuf = [log_dir, LOG_FILE_NAME].iter().collect();
        let roll_pattern = format!("{}.{{}}.gz", log_path.display());
        let policy = CompoundPolicy::new(
            Box::new(SizeTrigger::new(LOG_FILE_MAX_SIZE)),
            Box::new(FixedWindowRoller::builder().build(&roll_pattern, LOG_FILE_MAX_ROLLS).expect("valid roller pattern")),
        );
        let file_appender = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN)))
            .build(log_path, Box::new(policy))
            .expect("log file appender");
        config = config.appender(Appender::builder().build(LOG_FILE_APPENDER, Box::new(file_appender)));
        root = root.appender(LOG_FILE_APPENDER);
    }

    let config = config.loggers(loggers).build(root.build(root_level)).unwrap();
    let _ = log4rs::init_config(config).unwrap();
}

/// Routes panics through the logger before aborting the process, so crashes
/// on worker-pool threads land in the log files and not only on stderr.
pub fn init_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        let location = info.location().map(|l| l.to_string()).unwrap_or_else(|| "<unknown>".to_string());
        let thread = std::thread::current();
        log::error!("panic on thread '{}' at {location}: {message}", thread.name().unwrap_or("<unnamed>"));
        default_hook(info);
        log::logger().flush();
        std::process::exit(1);
    }));
}

/// Tries to init the global logger, but does not panic if it was already setup.
/// Should be used for tests.
pub fn try_init_logger(filters: &str) {
    let (root_level, loggers) = parse_filters(&effective_filters(filters));
    let stdout = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN))).build();
    let config = Config::builder()
        .appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(stdout)))
        .loggers(loggers)
        .build(Root::builder().appender(CONSOLE_APPENDER).build(root_level))
        .unwrap();
    let _ = log4rs::init_config(config);
}

#[macro_export]
macro_rules! trace {
    ($($t:tt)*) => (
        log::trace!($($t)*)
    )
}

#[macro_export]
macro_rules! debug {
    ($($t:tt)*) => (
        log::debug!($($t)*)
    )
}

#[macro_export]
macro_rules! info {
    ($($t:tt)*) => (
        log::info!($($t)*)
    )
}

#[macro_export]
macro_rules! warn {
    ($($t:tt)*) => (
        log::warn!($($t)*)
    )
}

#[macro_export]
macro_rules! error {
    ($($t:tt)*) => (
        log::error!($($t)*)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        let (root, loggers) = parse_filters("debug,provenance_query=trace");
        assert_eq!(root, LevelFilter::Debug);
        assert_eq!(loggers.len(), 1);

        let (root, loggers) = parse_filters("");
        assert_eq!(root, LevelFilter::Info);
        assert!(loggers.is_empty());

        let (root, _) = parse_filters("nonsense");
        assert_eq!(root, LevelFilter::Info);
    }
}
