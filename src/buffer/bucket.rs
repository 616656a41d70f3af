use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Rollover granularity encoded into buffer file names.
///
/// The suffix is a fixed-width digit string (`20240102` for a `Day` bucket),
/// which makes lexicographic order equal to chronological order when listing
/// a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    /// One unbounded file set, no date suffix.
    Infinite,
    Year,
    Month,
    #[default]
    Day,
    Hour,
    Minute,
}

impl TimeBucket {
    pub fn format_str(self) -> &'static str {
        match self {
            TimeBucket::Infinite => "",
            TimeBucket::Year => "%Y",
            TimeBucket::Month => "%Y%m",
            TimeBucket::Day => "%Y%m%d",
            TimeBucket::Hour => "%Y%m%d%H",
            TimeBucket::Minute => "%Y%m%d%H%M",
        }
    }

    /// Width of the digit suffix; 0 for `Infinite`.
    pub fn suffix_len(self) -> usize {
        match self {
            TimeBucket::Infinite => 0,
            TimeBucket::Year => 4,
            TimeBucket::Month => 6,
            TimeBucket::Day => 8,
            TimeBucket::Hour => 10,
            TimeBucket::Minute => 12,
        }
    }

    pub fn suffix(self, at: DateTime<Utc>) -> String {
        at.format(self.format_str()).to_string()
    }

    /// Parses a file name suffix back into the start of its bucket.
    ///
    /// Strict: the suffix must be exactly `suffix_len()` ASCII digits and
    /// denote a real calendar instant. `Infinite` encodes no date and always
    /// yields `None`; callers fall back to the current time.
    pub fn parse_suffix(self, suffix: &str) -> Option<NaiveDateTime> {
        if self == TimeBucket::Infinite {
            return None;
        }
        if suffix.len() != self.suffix_len() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Pad the missing components with bucket-start defaults and parse once.
        let padded = match self {
            TimeBucket::Infinite => return None,
            TimeBucket::Year => format!("{suffix}01010000"),
            TimeBucket::Month => format!("{suffix}010000"),
            TimeBucket::Day => format!("{suffix}0000"),
            TimeBucket::Hour => format!("{suffix}00"),
            TimeBucket::Minute => suffix.to_string(),
        };
        NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M").ok()
    }
}
