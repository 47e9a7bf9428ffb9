use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive `[start, end]` date filter. Either bound may be open.
///
/// Comparisons are date-only: a timestamp is reduced to its calendar date in
/// `offset` (UTC unless a source publishes in local time) before checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    #[serde(skip, default = "utc_offset")]
    offset: FixedOffset,
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(Error::InvalidWindow(format!("start {} is after end {}", s, e)));
            }
        }
        Ok(Self {
            start,
            end,
            offset: utc_offset(),
        })
    }

    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
            offset: utc_offset(),
        }
    }

    /// Builds a window from optional `YYYY-MM-DD` strings.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map_err(|e| Error::InvalidWindow(format!("'{}': {}", s, e)))
        };
        Self::new(start.map(parse).transpose()?, end.map(parse).transpose()?)
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The window as UTC instants: inclusive start, exclusive end (midnight
    /// after the end date). Used by stores that filter on raw timestamps.
    pub fn utc_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let midnight = |date: NaiveDate| {
            date.and_hms_opt(0, 0, 0)
                .and_then(|dt| dt.and_local_timezone(self.offset).single())
                .map(|dt| dt.with_timezone(&Utc))
        };
        (
            self.start.and_then(midnight),
            self.end.and_then(|e| e.succ_opt()).and_then(midnight),
        )
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    fn date_of(&self, timestamp: &DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.offset).date_naive()
    }

    /// False for an absent timestamp: undated items never match a window.
    pub fn includes(&self, timestamp: Option<&DateTime<Utc>>) -> bool {
        let Some(ts) = timestamp else {
            return false;
        };
        let date = self.date_of(ts);
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    /// True iff the window has a start and `timestamp` falls on an earlier date.
    pub fn precedes_start(&self, timestamp: &DateTime<Utc>) -> bool {
        self.start.map_or(false, |s| self.date_of(timestamp) < s)
    }
}
