//! Trading-session calendar for the A-share market.
//!
//! Weekday-based only; statutory holidays are not modeled and a holiday
//! weekday is treated as a (quiet) trading day.

use chrono::{DateTime, Datelike, Local, NaiveTime, Timelike, Weekday};

/// Morning session open (includes the 9:15 call auction).
const MORNING_OPEN: (u32, u32) = (9, 15);
/// Morning session close.
const MORNING_CLOSE: (u32, u32) = (11, 30);
/// Afternoon session open.
const AFTERNOON_OPEN: (u32, u32) = (13, 0);
/// Afternoon session close.
const AFTERNOON_CLOSE: (u32, u32) = (15, 0);

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

/// Whether the given instant falls on a trading day (Mon-Fri).
pub fn is_trading_day(now: DateTime<Local>) -> bool {
    !matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Whether the given instant falls inside a live trading session.
pub fn is_trading_time(now: DateTime<Local>) -> bool {
    if !is_trading_day(now) {
        return false;
    }
    let t = now.time();
    let morning = t >= time(MORNING_OPEN.0, MORNING_OPEN.1)
        && t <= time(MORNING_CLOSE.0, MORNING_CLOSE.1);
    let afternoon = t >= time(AFTERNOON_OPEN.0, AFTERNOON_OPEN.1)
        && t <= time(AFTERNOON_CLOSE.0, AFTERNOON_CLOSE.1);
    morning || afternoon
}

/// Human-readable session status for the given instant.
pub fn session_message(now: DateTime<Local>) -> &'static str {
    if !is_trading_day(now) {
        return "market closed (weekend)";
    }
    if is_trading_time(now) {
        return "market open";
    }
    let t = now.time();
    if t < time(MORNING_OPEN.0, MORNING_OPEN.1) {
        "pre-market"
    } else if t > time(MORNING_CLOSE.0, MORNING_CLOSE.1)
        && t < time(AFTERNOON_OPEN.0, AFTERNOON_OPEN.1)
    {
        "lunch break"
    } else {
        "market closed"
    }
}

/// Whether the session has closed for the day (at or after 15:00 on a
/// trading day). Drives daily cache cutover.
pub fn is_after_close(now: DateTime<Local>) -> bool {
    is_trading_day(now) && now.hour() >= 15
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_trading_day() {
        // 2025-06-02 is a Monday, 2025-06-07 a Saturday
        assert!(is_trading_day(at(2025, 6, 2, 10, 0)));
        assert!(!is_trading_day(at(2025, 6, 7, 10, 0)));
        assert!(!is_trading_day(at(2025, 6, 8, 10, 0)));
    }

    #[test]
    fn test_trading_time_sessions() {
        assert!(is_trading_time(at(2025, 6, 2, 9, 15)));
        assert!(is_trading_time(at(2025, 6, 2, 10, 30)));
        assert!(is_trading_time(at(2025, 6, 2, 11, 30)));
        assert!(!is_trading_time(at(2025, 6, 2, 12, 0)));
        assert!(is_trading_time(at(2025, 6, 2, 13, 0)));
        assert!(is_trading_time(at(2025, 6, 2, 14, 59)));
        assert!(!is_trading_time(at(2025, 6, 2, 15, 1)));
        assert!(!is_trading_time(at(2025, 6, 2, 9, 0)));
        assert!(!is_trading_time(at(2025, 6, 7, 10, 0)));
    }

    #[test]
    fn test_session_message() {
        assert_eq!(session_message(at(2025, 6, 2, 8, 0)), "pre-market");
        assert_eq!(session_message(at(2025, 6, 2, 10, 0)), "market open");
        assert_eq!(session_message(at(2025, 6, 2, 12, 0)), "lunch break");
        assert_eq!(session_message(at(2025, 6, 2, 16, 0)), "market closed");
        assert_eq!(session_message(at(2025, 6, 7, 10, 0)), "market closed (weekend)");
    }

    #[test]
    fn test_after_close() {
        assert!(!is_after_close(at(2025, 6, 2, 14, 59)));
        assert!(is_after_close(at(2025, 6, 2, 15, 0)));
        assert!(!is_after_close(at(2025, 6, 7, 16, 0)));
    }
}
