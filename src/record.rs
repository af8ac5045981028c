use chrono::{DateTime, Datelike, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum length of the `level` column.
pub const MAX_LEVEL_LEN: usize = 20;

/// Maximum length of the bounded string columns (`logger`, `module`,
/// `function`, `thread_name`).
pub const MAX_NAME_LEN: usize = 255;

/// Sub-second digits kept on timestamps; both backends store microseconds.
const TIMESTAMP_PRECISION: u16 = 6;

/// One structured log entry as it is persisted by a [`LogStore`].
///
/// Records carry no identity of their own: the auto-assigned row id stays
/// inside the backend.
///
/// [`LogStore`]: crate::store::LogStore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub logger: String,
    pub module: Option<String>,
    pub function: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub thread_name: Option<String>,
    pub process_id: Option<i32>,
    pub exception: Option<String>,
    pub extra_data: Option<BTreeMap<String, serde_json::Value>>,
}

impl LogRecord {
    /// Create a record stamped with the current time, truncated to whole
    /// microseconds so it reads back unchanged.
    pub fn new(
        level: impl Into<String>,
        logger: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LogRecord {
            timestamp: Utc::now().trunc_subsecs(TIMESTAMP_PRECISION),
            level: level.into(),
            logger: logger.into(),
            module: None,
            function: None,
            line: None,
            message: message.into(),
            thread_name: None,
            process_id: None,
            exception: None,
            extra_data: None,
        }
    }

    /// Set the timestamp, truncated to whole microseconds.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(TIMESTAMP_PRECISION);
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = Some(thread_name.into());
        self
    }

    pub fn with_process_id(mut self, process_id: i32) -> Self {
        self.process_id = Some(process_id);
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Attach one key of structured extra data, creating the map on first use.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra_data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Check the record against the persisted column constraints.
    ///
    /// **Returns**
    /// - `Ok(())` if the record can be written by every backend.
    /// - `Err(RecordError)` naming the first offending field.
    pub fn validate(&self) -> Result<(), RecordError> {
        require_non_empty("level", &self.level)?;
        require_non_empty("logger", &self.logger)?;
        require_non_empty("message", &self.message)?;

        check_len("level", Some(self.level.as_str()), MAX_LEVEL_LEN)?;
        check_len("logger", Some(self.logger.as_str()), MAX_NAME_LEN)?;
        check_len("module", self.module.as_deref(), MAX_NAME_LEN)?;
        check_len("function", self.function.as_deref(), MAX_NAME_LEN)?;
        check_len("thread_name", self.thread_name.as_deref(), MAX_NAME_LEN)?;

        let year = self.timestamp.year();
        if !(0..=9999).contains(&year) {
            return Err(RecordError::YearOutOfRange(year));
        }

        if let Some(line) = self.line {
            if i32::try_from(line).is_err() {
                return Err(RecordError::LineOutOfRange(line));
            }
        }

        Ok(())
    }

    /// Source line as stored in the 32-bit `line` column.
    pub(crate) fn line_column(&self) -> Option<i32> {
        self.line.and_then(|l| i32::try_from(l).ok())
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), RecordError> {
    if value.trim().is_empty() {
        Err(RecordError::Empty(field))
    } else {
        Ok(())
    }
}

fn check_len(field: &'static str, value: Option<&str>, max: usize) -> Result<(), RecordError> {
    match value {
        Some(v) if v.chars().count() > max => Err(RecordError::TooLong { field, max }),
        _ => Ok(()),
    }
}

/// Reason a [`LogRecord`] cannot be persisted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("required field `{0}` is empty")]
    Empty(&'static str),

    #[error("field `{field}` exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("line number {0} does not fit the line column")]
    LineOutOfRange(u32),

    #[error("timestamp year {0} is outside 0..=9999")]
    YearOutOfRange(i32),
}

/// Filter and pagination parameters for [`LogStore::query`].
///
/// [`LogStore::query`]: crate::store::LogStore::query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub limit: u32,
    pub offset: u32,
    /// Exact match on the `level` column.
    pub level: Option<String>,
    /// Exact match on the `logger` column.
    pub logger: Option<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            level: None,
            logger: None,
        }
    }
}

impl LogQuery {
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }
}
