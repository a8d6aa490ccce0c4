use std::fmt::{Debug, Display, Formatter};
use strum_macros::{AsRefStr, Display as StrumDisplay};

/// A structured log field: key and printable value.
pub type Field<'a> = (&'a str, &'a dyn Display);

#[derive(StrumDisplay, AsRefStr, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[strum(serialize_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => log::Level::Trace,
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error | Level::Fatal => log::Level::Error,
        }
    }
}

/// Logger pluggable into transports and the request logging middleware.
///
/// Every entry is a message plus a list of key/value fields.
pub trait Logger: Debug + Send + Sync {
    fn log(&self, level: Level, msg: &str, fields: &[Field<'_>]);

    fn trace(&self, msg: &str, fields: &[Field<'_>]) {
        self.log(Level::Trace, msg, fields)
    }

    fn debug(&self, msg: &str, fields: &[Field<'_>]) {
        self.log(Level::Debug, msg, fields)
    }

    fn info(&self, msg: &str, fields: &[Field<'_>]) {
        self.log(Level::Info, msg, fields)
    }

    fn warn(&self, msg: &str, fields: &[Field<'_>]) {
        self.log(Level::Warn, msg, fields)
    }

    fn error(&self, msg: &str, fields: &[Field<'_>]) {
        self.log(Level::Error, msg, fields)
    }

    fn fatal(&self, msg: &str, fields: &[Field<'_>]) {
        self.log(Level::Fatal, msg, fields)
    }
}

/// Discards every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Level, _msg: &str, _fields: &[Field<'_>]) {}
}

/// Forwards entries to the [`log`] facade under the `usrv` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn log(&self, level: Level, msg: &str, fields: &[Field<'_>]) {
        log::log!(
            target: "usrv",
            log::Level::from(level),
            "{}{}",
            msg,
            DisplayFields(fields)
        );
    }
}

struct DisplayFields<'a, 'b>(&'a [Field<'b>]);

impl Display for DisplayFields<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (key, value) in self.0 {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}
