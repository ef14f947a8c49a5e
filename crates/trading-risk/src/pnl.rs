//! Rolling daily, weekly and monthly P&L.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// P&L accumulated per calendar period (UTC), reset when the period rolls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlPeriods {
    pub daily: Decimal,
    pub weekly: Decimal,
    pub monthly: Decimal,
    day: NaiveDate,
    week: (i32, u32),
    month: (i32, u32),
}

impl PnlPeriods {
    pub fn new(now: DateTime<Utc>) -> Self {
        let day = now.date_naive();
        Self {
            daily: Decimal::ZERO,
            weekly: Decimal::ZERO,
            monthly: Decimal::ZERO,
            day,
            week: iso_week(day),
            month: (day.year(), day.month()),
        }
    }

    /// Reset every period `now` has moved past. Returns true if the day rolled.
    pub fn roll(&mut self, now: DateTime<Utc>) -> bool {
        let day = now.date_naive();
        if day == self.day {
            return false;
        }
        self.daily = Decimal::ZERO;
        self.day = day;
        if iso_week(day) != self.week {
            self.weekly = Decimal::ZERO;
            self.week = iso_week(day);
        }
        if (day.year(), day.month()) != self.month {
            self.monthly = Decimal::ZERO;
            self.month = (day.year(), day.month());
        }
        true
    }

    pub fn record(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll(now);
        self.daily += pnl;
        self.weekly += pnl;
        self.monthly += pnl;
    }
}

fn iso_week(day: NaiveDate) -> (i32, u32) {
    let week = day.iso_week();
    (week.year(), week.week())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_day_rollover_keeps_week() {
        // Tuesday then Wednesday of the same ISO week
        let mut pnl = PnlPeriods::new(at(2024, 3, 5));
        pnl.record(dec!(-100), at(2024, 3, 5));
        pnl.record(dec!(50), at(2024, 3, 6));

        assert_eq!(pnl.daily, dec!(50));
        assert_eq!(pnl.weekly, dec!(-50));
        assert_eq!(pnl.monthly, dec!(-50));
    }

    #[test]
    fn test_week_and_month_rollover() {
        let mut pnl = PnlPeriods::new(at(2024, 3, 29));
        pnl.record(dec!(-200), at(2024, 3, 29));
        // Monday 1 April: new day, week and month
        pnl.record(dec!(10), at(2024, 4, 1));

        assert_eq!(pnl.daily, dec!(10));
        assert_eq!(pnl.weekly, dec!(10));
        assert_eq!(pnl.monthly, dec!(10));
    }

    #[test]
    fn test_same_day_is_not_a_roll() {
        let mut pnl = PnlPeriods::new(at(2024, 3, 5));
        assert!(!pnl.roll(at(2024, 3, 5)));
        assert!(pnl.roll(at(2024, 3, 6)));
    }
}
