use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Zero-based calendar month (0 = January … 11 = December) within the
/// current year context.
///
/// The inner value is private so a `MonthKey` is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct MonthKey(u8);

impl MonthKey {
    pub const JANUARY: MonthKey = MonthKey(0);
    pub const DECEMBER: MonthKey = MonthKey(11);

    /// Build a key from a raw index, rejecting anything outside 0..=11.
    pub fn new(index: i64) -> Result<Self, CoreError> {
        match u8::try_from(index) {
            Ok(i) if i < 12 => Ok(Self(i)),
            _ => Err(CoreError::InvalidMonth(index)),
        }
    }

    /// The system's current calendar month (local time).
    #[must_use]
    pub fn current() -> Self {
        Self(Local::now().month0() as u8)
    }

    #[must_use]
    pub fn index(self) -> u8 {
        self.0
    }

    /// One-based month number (1 = January).
    #[must_use]
    pub fn number(self) -> u32 {
        u32::from(self.0) + 1
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        MONTH_NAMES[usize::from(self.0)]
    }

    /// The `YYYY-MM` label the remote API uses to identify a budget month.
    #[must_use]
    pub fn label(self, year: i32) -> String {
        format!("{year:04}-{:02}", self.number())
    }

    /// Label within the current local year.
    #[must_use]
    pub fn current_year_label(self) -> String {
        self.label(Local::now().year())
    }
}

impl Default for MonthKey {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<i64> for MonthKey {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MonthKey> for u8 {
    fn from(key: MonthKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_full_range() {
        for i in 0..12 {
            assert_eq!(MonthKey::new(i).unwrap().index() as i64, i);
        }
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(MonthKey::new(12), Err(CoreError::InvalidMonth(12)));
        assert_eq!(MonthKey::new(-1), Err(CoreError::InvalidMonth(-1)));
        assert_eq!(MonthKey::new(300), Err(CoreError::InvalidMonth(300)));
    }

    #[test]
    fn label_is_zero_padded() {
        assert_eq!(MonthKey::new(3).unwrap().label(2025), "2025-04");
        assert_eq!(MonthKey::DECEMBER.label(2024), "2024-12");
    }

    #[test]
    fn serde_uses_plain_index() {
        let key = MonthKey::new(5).unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "5");
        let back: MonthKey = serde_json::from_str("5").unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<MonthKey>("12").is_err());
    }
}
