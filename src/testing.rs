use crate::logger::{Field, Level, Logger};
use std::sync::Mutex;

/// One entry captured by [`RecordingLogger`], values rendered to strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl Entry {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Logger keeping every entry in memory, for asserting on log output.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<Entry>>,
}

impl RecordingLogger {
    pub fn entries(&self) -> Vec<Entry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, msg: &str, fields: &[Field<'_>]) {
        let entry = Entry {
            level,
            message: msg.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
