//! Daily spend tracking for value caps.

use chrono::NaiveDate;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct DaySpend {
    day: NaiveDate,
    total: f64,
}

/// Running totals per grant per UTC day.
///
/// Each key keeps only its current day; a spend on a later day starts a new
/// total.
#[derive(Debug, Default)]
pub struct SpendLedger {
    totals: DashMap<String, DaySpend>,
}

impl SpendLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total spent under `key` on `day`.
    #[must_use]
    pub fn spent(&self, key: &str, day: NaiveDate) -> f64 {
        self.totals
            .get(key)
            .filter(|entry| entry.day == day)
            .map_or(0.0, |entry| entry.total)
    }

    /// Add `amount` to the day's total unless that would exceed `cap`.
    ///
    /// # Errors
    ///
    /// Returns the unchanged total when the cap would be exceeded or
    /// `amount` is negative or not finite.
    pub fn try_record(&self, key: &str, day: NaiveDate, amount: f64, cap: f64) -> Result<f64, f64> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(self.spent(key, day));
        }
        let mut entry = self
            .totals
            .entry(key.to_string())
            .or_insert(DaySpend { day, total: 0.0 });
        if entry.day != day {
            *entry = DaySpend { day, total: 0.0 };
        }
        let next = entry.total + amount;
        if next > cap {
            return Err(entry.total);
        }
        entry.total = next;
        Ok(next)
    }

    /// Forget totals from days before `day`. Returns how many were dropped.
    pub fn prune_before(&self, day: NaiveDate) -> usize {
        let before = self.totals.len();
        self.totals.retain(|_, entry| entry.day >= day);
        before.saturating_sub(self.totals.len())
    }
}
