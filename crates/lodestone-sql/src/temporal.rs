//! Configurable rendering and parsing of temporal values.
//!
//! Each temporal subtype carries its own format string, independently
//! overridable at runtime. Parsing is the exact inverse of the currently
//! configured format, so `string_to_x(x_to_string(v)) == v` holds even after
//! the format is changed and reverted.

use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{CompileError, ExpressionError};

/// Format strings for each temporal subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalFormat {
    /// Format for [`crate::SqlValue::Date`].
    pub date: String,
    /// Format for [`crate::SqlValue::Time`].
    pub time: String,
    /// Format for [`crate::SqlValue::DateTime`].
    pub datetime: String,
    /// Format for [`crate::SqlValue::Timestamp`].
    pub timestamp: String,
    /// Format for [`crate::SqlValue::Year`].
    pub year: String,
}

impl Default for TemporalFormat {
    fn default() -> Self {
        Self {
            date: String::from("%Y-%m-%d"),
            time: String::from("%H:%M:%S"),
            datetime: String::from("%Y-%m-%d %H:%M:%S"),
            timestamp: String::from("%Y-%m-%d %H:%M:%S"),
            year: String::from("%Y"),
        }
    }
}

impl TemporalFormat {
    /// Renders a date with the configured format.
    #[must_use]
    pub fn date_to_string(&self, value: NaiveDate) -> String {
        value.format(&self.date).to_string()
    }

    /// Parses a date, inverse of [`TemporalFormat::date_to_string`].
    pub fn string_to_date(&self, value: &str) -> Result<NaiveDate, ExpressionError> {
        NaiveDate::parse_from_str(value, &self.date).map_err(|_| ExpressionError::InvalidTemporal {
            value: value.to_string(),
            format: self.date.clone(),
        })
    }

    /// Renders a time of day with the configured format.
    #[must_use]
    pub fn time_to_string(&self, value: NaiveTime) -> String {
        value.format(&self.time).to_string()
    }

    /// Parses a time of day, inverse of [`TemporalFormat::time_to_string`].
    pub fn string_to_time(&self, value: &str) -> Result<NaiveTime, ExpressionError> {
        NaiveTime::parse_from_str(value, &self.time).map_err(|_| ExpressionError::InvalidTemporal {
            value: value.to_string(),
            format: self.time.clone(),
        })
    }

    /// Renders a datetime with the configured format.
    #[must_use]
    pub fn datetime_to_string(&self, value: NaiveDateTime) -> String {
        value.format(&self.datetime).to_string()
    }

    /// Parses a datetime, inverse of [`TemporalFormat::datetime_to_string`].
    pub fn string_to_datetime(&self, value: &str) -> Result<NaiveDateTime, ExpressionError> {
        NaiveDateTime::parse_from_str(value, &self.datetime).map_err(|_| {
            ExpressionError::InvalidTemporal {
                value: value.to_string(),
                format: self.datetime.clone(),
            }
        })
    }

    /// Renders a timestamp with the configured format.
    #[must_use]
    pub fn timestamp_to_string(&self, value: NaiveDateTime) -> String {
        value.format(&self.timestamp).to_string()
    }

    /// Parses a timestamp, inverse of [`TemporalFormat::timestamp_to_string`].
    pub fn string_to_timestamp(&self, value: &str) -> Result<NaiveDateTime, ExpressionError> {
        NaiveDateTime::parse_from_str(value, &self.timestamp).map_err(|_| {
            ExpressionError::InvalidTemporal {
                value: value.to_string(),
                format: self.timestamp.clone(),
            }
        })
    }

    /// Renders a bare year with the configured format.
    pub fn year_to_string(&self, year: i32) -> Result<String, CompileError> {
        let date = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| CompileError::Temporal(format!("year {year}")))?;
        Ok(date.format(&self.year).to_string())
    }

    /// Parses a bare year, inverse of [`TemporalFormat::year_to_string`].
    pub fn string_to_year(&self, value: &str) -> Result<i32, ExpressionError> {
        let mut parsed = Parsed::new();
        parse(&mut parsed, value, StrftimeItems::new(&self.year)).map_err(|_| {
            ExpressionError::InvalidTemporal {
                value: value.to_string(),
                format: self.year.clone(),
            }
        })?;
        parsed.year.ok_or_else(|| ExpressionError::InvalidTemporal {
            value: value.to_string(),
            format: self.year.clone(),
        })
    }
}
