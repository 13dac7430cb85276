//! Order numbers: `{PREFIX}{yyyyMMdd}{seq:03}`, sequence restarting daily.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Sequences past 999 keep growing in width rather than wrapping.
    pub fn compose(prefix: &str, date: NaiveDate, sequence: u32) -> Self {
        Self(format!("{prefix}{}{sequence:03}", date.format("%Y%m%d")))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The daily sequence, if this number was issued under `prefix` on `date`.
    pub fn sequence_for(&self, prefix: &str, date: NaiveDate) -> Option<u32> {
        let stamp = date.format("%Y%m%d").to_string();
        let digits = self.0.strip_prefix(prefix)?.strip_prefix(stamp.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Max existing sequence for `prefix` on `date`, plus one.
pub fn next_number<'a, I>(prefix: &str, date: NaiveDate, existing: I) -> OrderNumber
where
    I: IntoIterator<Item = &'a OrderNumber>,
{
    let max = existing
        .into_iter()
        .filter_map(|n| n.sequence_for(prefix, date))
        .max()
        .unwrap_or(0);
    OrderNumber::compose(prefix, date, max + 1)
}
