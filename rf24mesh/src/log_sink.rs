//! User-attachable logging sink (spec §6, "Logger sink").
//!
//! Fire-and-forget: a sink that blocks or panics stalls the endpoint's tick
//! loop, so implementations should buffer or drop rather than synchronously
//! flush to a slow backend. The default sink forwards to the `log` crate,
//! which is what every example in this workspace already uses for ambient
//! logging.

/// Severity of a message passed to a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_log_level(self) -> log::Level {
        match self {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// A sink an `Endpoint` forwards diagnostic messages to via `attachLogger`
/// (spec §4.5).
pub trait LogSink: Send {
    fn log(&mut self, level: LogLevel, msg: &str);
}

/// Default sink: forwards every message to the `log` crate under the
/// `rf24mesh` target, letting the process's own logger config decide
/// what's kept.
pub struct DefaultLogSink;

impl LogSink for DefaultLogSink {
    fn log(&mut self, level: LogLevel, msg: &str) {
        log::log!(target: "rf24mesh", level.to_log_level(), "{}", msg);
    }
}
