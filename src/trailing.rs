//! Trailing-stop monitor
//!
//! Tracks the high-water mark of a holding episode and emits a sell signal
//! when price retraces a fixed fraction from the peak.
//!
//! WARNING: the stop is best-effort, not guaranteed. At 1-second polling a
//! fast dump can gap well below the threshold before detection; the reported
//! exit price is the first observed sample under it, not the threshold
//! itself.

use tracing::debug;

/// Monitor state: Armed is tracking, Triggered is terminal for the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Armed,
    Triggered,
}

/// Outcome of feeding one price sample to the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum TrailingStopEvent {
    /// Feed miss: no trigger, no reset, no observation this tick
    NoData,
    /// Still armed; periodic status for external notification
    Status {
        price: f64,
        high_water_mark: f64,
        threshold_price: f64,
        pnl_pct: f64,
    },
    /// Stop fired. One-shot: repeated observations keep reporting the
    /// original exit price and never re-arm.
    Triggered { exit_price: f64 },
}

/// Trailing stop over a single holding episode.
///
/// The high-water mark starts at the CURRENT market price, not the entry
/// price, so a resume-after-restart re-arms against live conditions. It is
/// monotonically non-decreasing within the episode. The trigger comparison is
/// strict `<` against `high_water_mark * threshold_ratio`; exact equality
/// does not trigger.
#[derive(Debug, Clone)]
pub struct TrailingStopMonitor {
    high_water_mark: f64,
    threshold_ratio: f64,
    entry_price: f64,
    state: MonitorState,
    exit_price: f64,
}

impl TrailingStopMonitor {
    /// Arm the monitor. `current_price` seeds the high-water mark;
    /// `entry_price` is only used for P&L in status observations.
    pub fn arm(current_price: f64, entry_price: f64, threshold_ratio: f64) -> Self {
        debug!(
            "Trailing stop armed: hwm={} threshold={}",
            current_price,
            current_price * threshold_ratio
        );
        Self {
            high_water_mark: current_price,
            threshold_ratio,
            entry_price,
            state: MonitorState::Armed,
            exit_price: 0.0,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }

    /// Price below which the stop fires
    pub fn threshold_price(&self) -> f64 {
        self.high_water_mark * self.threshold_ratio
    }

    /// Feed one price sample. `None` means the feed was unavailable this
    /// tick; the caller decides what repeated unavailability means.
    pub fn observe(&mut self, price: Option<f64>) -> TrailingStopEvent {
        if self.state == MonitorState::Triggered {
            return TrailingStopEvent::Triggered {
                exit_price: self.exit_price,
            };
        }

        let Some(price) = price else {
            return TrailingStopEvent::NoData;
        };

        if price > self.high_water_mark {
            self.high_water_mark = price;
        }

        if price < self.threshold_price() {
            self.state = MonitorState::Triggered;
            self.exit_price = price;
            return TrailingStopEvent::Triggered { exit_price: price };
        }

        TrailingStopEvent::Status {
            price,
            high_water_mark: self.high_water_mark,
            threshold_price: self.threshold_price(),
            pnl_pct: if self.entry_price == 0.0 {
                0.0
            } else {
                ((price - self.entry_price) / self.entry_price) * 100.0
            },
        }
    }
}
