//! Adaptive wall-clock scheduler for analysis runs.
//!
//! Cadence follows a fixed window table over the local trading day, with a
//! blackout between the 15:00 close and the 15:15 settlement run. A run is
//! forced at 15:15 when the day's last run predates the close, so every
//! trading day ends with a post-close analysis even if the intraday cadence
//! just missed it.

use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};

use boardwatch_common::MonitorConfig;

use crate::market::calendar;

// ============================================================================
// Cadence table
// ============================================================================

/// What kind of sweep a scheduled run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Live-session sweep over fresh quotes
    Intraday,
    /// Recap sweep over the settled session
    AfterHours,
}

/// One cadence decision: how often to run and how far back to look.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cadence {
    pub interval_secs: u64,
    pub lookback_hours: f64,
    pub mode: ScanMode,
}

/// Settlement-run time, minutes from midnight (15:15).
const SETTLEMENT_MINUTE: u32 = 15 * 60 + 15;

/// Cadence for the given instant per the window table, or `None` during
/// the post-close blackout and on weekends.
pub fn cadence_at(now: DateTime<Local>) -> Option<Cadence> {
    if !calendar::is_trading_day(now) {
        return None;
    }

    let minute = now.hour() * 60 + now.minute();
    let cadence = |interval_secs, lookback_hours, mode| Cadence {
        interval_secs,
        lookback_hours,
        mode,
    };

    match minute {
        // Pre-open ramp-up
        m if (510..570).contains(&m) => Some(cadence(900, 0.25, ScanMode::AfterHours)),
        // Live session
        m if (570..900).contains(&m) => Some(cadence(900, 0.25, ScanMode::Intraday)),
        // Close-to-settlement blackout
        m if (900..915).contains(&m) => None,
        // Post-settlement afternoon
        m if (915..1080).contains(&m) => Some(cadence(3600, 1.0, ScanMode::AfterHours)),
        // Evening
        m if (1080..1380).contains(&m) => Some(cadence(10_800, 3.0, ScanMode::AfterHours)),
        // Early morning ramp
        m if (360..510).contains(&m) => Some(cadence(3600, 1.0, ScanMode::AfterHours)),
        // Overnight
        _ => Some(cadence(21_600, 6.0, ScanMode::AfterHours)),
    }
}

// ============================================================================
// Scheduler state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Idle,
    Running,
    Paused,
}

/// Serialized view of the schedule for API clients.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    pub enabled: bool,
    pub smart: bool,
    pub status: ScheduleStatus,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    pub interval_secs: Option<u64>,
    pub mode: Option<ScanMode>,
}

/// Tracks run timing; the service loop polls [`Scheduler::due`] on a short
/// tick and executes when a cadence comes back.
pub struct Scheduler {
    last_run: Option<DateTime<Local>>,
    status: ScheduleStatus,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            last_run: None,
            status: ScheduleStatus::Idle,
        }
    }

    /// Seed the last-run marker, e.g. from persisted state age at startup.
    pub fn seed_last_run(&mut self, at: DateTime<Local>) {
        self.last_run = Some(at);
    }

    pub fn status(&self) -> ScheduleStatus {
        self.status
    }

    /// Mark a run as started. Recorded before execution so a long run
    /// cannot double-trigger.
    pub fn mark_started(&mut self, now: DateTime<Local>) {
        self.last_run = Some(now);
        self.status = ScheduleStatus::Running;
    }

    pub fn mark_finished(&mut self) {
        self.status = ScheduleStatus::Idle;
    }

    /// Whether the settlement run is owed: we are at or past 15:15 on a
    /// trading day and the last run predates today's settlement time.
    fn settlement_due(&self, now: DateTime<Local>) -> bool {
        if !calendar::is_trading_day(now) {
            return false;
        }
        let minute = now.hour() * 60 + now.minute();
        if minute < SETTLEMENT_MINUTE {
            return false;
        }
        match self.last_run {
            None => true,
            Some(last) => {
                last.date_naive() < now.date_naive()
                    || last.hour() * 60 + last.minute() < SETTLEMENT_MINUTE
            }
        }
    }

    /// Active cadence for the instant under the given config, ignoring
    /// elapsed-time gating.
    fn active_cadence(&self, now: DateTime<Local>, config: &MonitorConfig) -> Option<Cadence> {
        if config.use_smart_schedule {
            cadence_at(now)
        } else {
            if !calendar::is_trading_day(now) {
                return None;
            }
            // The close-to-settlement blackout holds under the fixed
            // interval too.
            let minute = now.hour() * 60 + now.minute();
            if (900..SETTLEMENT_MINUTE).contains(&minute) {
                return None;
            }
            let mode = if calendar::is_trading_time(now) {
                ScanMode::Intraday
            } else {
                ScanMode::AfterHours
            };
            Some(Cadence {
                interval_secs: config.fixed_interval_minutes.max(1) * 60,
                lookback_hours: config.fixed_interval_minutes as f64 / 60.0,
                mode,
            })
        }
    }

    /// Decide whether a run is due now. Returns the cadence to run with,
    /// or `None` to keep waiting.
    pub fn due(&mut self, now: DateTime<Local>, config: &MonitorConfig) -> Option<Cadence> {
        if !config.auto_analysis_enabled {
            self.status = ScheduleStatus::Paused;
            return None;
        }
        if self.status == ScheduleStatus::Paused {
            self.status = ScheduleStatus::Idle;
        }
        if self.status == ScheduleStatus::Running {
            return None;
        }

        if self.settlement_due(now) {
            return Some(Cadence {
                interval_secs: 0,
                lookback_hours: 1.0,
                mode: ScanMode::AfterHours,
            });
        }

        let cadence = self.active_cadence(now, config)?;
        match self.last_run {
            None => Some(cadence),
            Some(last) => {
                let next = last + chrono::Duration::seconds(cadence.interval_secs as i64);
                if now >= next {
                    Some(cadence)
                } else {
                    None
                }
            }
        }
    }

    /// Schedule state for the API.
    pub fn view(&self, now: DateTime<Local>, config: &MonitorConfig) -> ScheduleView {
        let cadence = self.active_cadence(now, config);
        let next_run = match (self.last_run, cadence) {
            (Some(last), Some(c)) => {
                let next = last + chrono::Duration::seconds(c.interval_secs as i64);
                Some(next.max(now).format("%Y-%m-%d %H:%M:%S").to_string())
            }
            (None, Some(_)) => Some(now.format("%Y-%m-%d %H:%M:%S").to_string()),
            _ => None,
        };
        ScheduleView {
            enabled: config.auto_analysis_enabled,
            smart: config.use_smart_schedule,
            status: self.status,
            last_run: self
                .last_run
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            next_run,
            interval_secs: cadence.map(|c| c.interval_secs),
            mode: cadence.map(|c| c.mode),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
