//! Quote acquisition: vendor sources, the failover resolver, and the
//! daily-bar history provider.

pub mod eastmoney;
pub mod history;
pub mod resolver;
pub mod sina;
pub mod source;

use serde::{Deserialize, Serialize};

/// One historical daily bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBar {
    /// Trade date, "YYYY-MM-DD"
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}
