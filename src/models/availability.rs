use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// A calendar date plus a time window (`HH:MM`, 24-hour) during which the
/// customer can be reached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilitySlot {
    #[serde(deserialize_with = "deserialize_slot_date")]
    pub date: NaiveDate,
    pub start: String,
    pub end: String,
}

impl AvailabilitySlot {
    pub fn to_human_readable(&self) -> String {
        format!("{}: {}-{}", self.date.format("%a %-d %b %Y"), self.start, self.end)
    }
}

pub fn to_human_readable(slots: &[AvailabilitySlot]) -> String {
    slots
        .iter()
        .map(AvailabilitySlot::to_human_readable)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Accepts a plain `YYYY-MM-DD` date or a full RFC 3339 timestamp, which is
/// what browsers produce from `Date.toISOString()`.
pub fn parse_slot_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// Checks a strict 24-hour `HH:MM` value.
pub fn is_valid_time(s: &str) -> bool {
    let Some((hour, minute)) = s.split_once(':') else {
        return false;
    };
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hour) || !two_digits(minute) {
        return false;
    }
    match (hour.parse::<u32>(), minute.parse::<u32>()) {
        (Ok(h), Ok(m)) => h <= 23 && m <= 59,
        _ => false,
    }
}

fn deserialize_slot_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_slot_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid availability date: {raw}")))
}
