// libs/reminder-cell/src/services/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::services::dispatcher::ReminderDispatcher;

/// Periodically runs the dispatcher for `today + lead_days` until the
/// shutdown channel flips to `true`. A run in progress finishes first.
pub struct ReminderScheduler {
    dispatcher: Arc<ReminderDispatcher>,
    period: Duration,
}

impl ReminderScheduler {
    pub fn new(dispatcher: Arc<ReminderDispatcher>, config: &AppConfig) -> Self {
        Self::with_period(dispatcher, interval_period(config.reminder_interval_minutes))
    }

    pub fn with_period(dispatcher: Arc<ReminderDispatcher>, period: Duration) -> Self {
        Self { dispatcher, period }
    }

    /// Returns `None` when the period is zero.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        if self.period.is_zero() {
            info!("Reminder scheduler disabled");
            return None;
        }
        Some(tokio::spawn(self.run(shutdown)))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Reminder scheduler started, period {:?}", self.period);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reminder scheduler stopped");
    }

    async fn tick(&self) {
        let target_date = match self.dispatcher.settings().target_date_for(Utc::now().date_naive()) {
            Ok(date) => date,
            Err(e) => {
                error!("Scheduled reminder run skipped: {}", e);
                return;
            }
        };
        debug!("Scheduled reminder run for {}", target_date);

        if let Err(e) = self.dispatcher.run_once(target_date).await {
            error!("Scheduled reminder run for {} failed: {}", target_date, e);
        }
    }
}

const DEFAULT_INTERVAL_MINUTES: u64 = 60;

/// Zero disables the scheduler; an overflowing minute count falls back to
/// the default interval.
fn interval_period(minutes: u64) -> Duration {
    match minutes.checked_mul(60) {
        Some(seconds) => Duration::from_secs(seconds),
        None => {
            warn!(
                "REMINDER_INTERVAL_MINUTES {} is out of range, using {}",
                minutes, DEFAULT_INTERVAL_MINUTES
            );
            Duration::from_secs(DEFAULT_INTERVAL_MINUTES * 60)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_converted_to_seconds() {
        assert_eq!(interval_period(15), Duration::from_secs(900));
        assert!(interval_period(0).is_zero());
    }

    #[test]
    fn overflowing_interval_uses_default() {
        assert_eq!(interval_period(u64::MAX), Duration::from_secs(3600));
    }
}
