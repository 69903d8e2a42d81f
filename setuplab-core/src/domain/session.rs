//! Trading sessions keyed by the UTC hour of a bar's timestamp.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Intraday trading session.
///
/// Boundaries (UTC, start inclusive):
/// `asia` 00–07, `london` 07–12, `overlap` 12–16, `new_york` 16–21, `after_hours` 21–24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Session {
    Asia,
    London,
    Overlap,
    NewYork,
    AfterHours,
}

impl Session {
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        match ts.hour() {
            0..=6 => Session::Asia,
            7..=11 => Session::London,
            12..=15 => Session::Overlap,
            16..=20 => Session::NewYork,
            _ => Session::AfterHours,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Session::Asia => "asia",
            Session::London => "london",
            Session::Overlap => "overlap",
            Session::NewYork => "new_york",
            Session::AfterHours => "after_hours",
        }
    }
}
