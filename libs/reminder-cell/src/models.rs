// libs/reminder-cell/src/models.rs
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use shared_config::AppConfig;
use shared_database::StoreError;
use shared_models::ErrorKind;

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderSettings {
    pub template_name: Option<String>,
    pub template_language: String,
    /// Inbound activity younger than this allows a freeform message.
    pub freeform_window: Duration,
    pub lead_days: i64,
}

const DEFAULT_FREEFORM_WINDOW_HOURS: i64 = 24;
const DEFAULT_LEAD_DAYS: i64 = 1;

impl ReminderSettings {
    /// Out-of-range hour or day counts fall back to the defaults.
    pub fn from_config(config: &AppConfig) -> Self {
        let freeform_window = Duration::try_hours(config.reminder_freeform_window_hours)
            .unwrap_or_else(|| {
                warn!(
                    "REMINDER_FREEFORM_WINDOW_HOURS {} is out of range, using {}",
                    config.reminder_freeform_window_hours, DEFAULT_FREEFORM_WINDOW_HOURS
                );
                Duration::hours(DEFAULT_FREEFORM_WINDOW_HOURS)
            });

        let lead_days = match Duration::try_days(config.reminder_lead_days) {
            Some(_) => config.reminder_lead_days,
            None => {
                warn!(
                    "REMINDER_LEAD_DAYS {} is out of range, using {}",
                    config.reminder_lead_days, DEFAULT_LEAD_DAYS
                );
                DEFAULT_LEAD_DAYS
            }
        };

        Self {
            template_name: config.reminder_template_name.clone(),
            template_language: config.reminder_template_language.clone(),
            freeform_window,
            lead_days,
        }
    }

    pub fn target_date_for(&self, today: NaiveDate) -> Result<NaiveDate, DispatchError> {
        Duration::try_days(self.lead_days)
            .and_then(|lead| today.checked_add_signed(lead))
            .ok_or_else(|| DispatchError::InvalidDate(format!("{} + {} days", today, self.lead_days)))
    }
}

/// Tally of one dispatcher run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DispatchReport {
    pub target_date: Option<NaiveDate>,
    pub due: usize,
    pub sent_freeform: usize,
    pub sent_template: usize,
    pub skipped_no_template: usize,
    pub failed: usize,
    pub mark_anomalies: usize,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.sent_freeform + self.sent_template
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunQuery {
    pub date: Option<String>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid reminder date: {0}")]
    InvalidDate(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::InvalidDate(_) => ErrorKind::InvalidInput,
            DispatchError::Store(e) => e.kind(),
        }
    }
}

impl From<DispatchError> for shared_models::AppError {
    fn from(err: DispatchError) -> Self {
        shared_models::AppError::from_kind(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn settings_follow_config() {
        let config = AppConfig {
            reminder_template_name: Some("appointment_reminder".to_string()),
            reminder_freeform_window_hours: 12,
            reminder_lead_days: 2,
            ..AppConfig::default()
        };
        let settings = ReminderSettings::from_config(&config);
        assert_eq!(settings.freeform_window, Duration::hours(12));
        assert_eq!(
            settings.target_date_for(NaiveDate::from_ymd_opt(2025, 5, 30).unwrap()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
        );
    }

    #[test]
    fn out_of_range_config_falls_back_to_defaults() {
        let config = AppConfig {
            reminder_freeform_window_hours: i64::MAX,
            reminder_lead_days: i64::MIN,
            ..AppConfig::default()
        };
        let settings = ReminderSettings::from_config(&config);
        assert_eq!(settings.freeform_window, Duration::hours(24));
        assert_eq!(settings.lead_days, 1);
    }

    #[test]
    fn unreachable_target_date_is_an_error() {
        let settings = ReminderSettings {
            template_name: None,
            template_language: "es".to_string(),
            freeform_window: Duration::hours(24),
            lead_days: i64::MAX,
        };
        let today = NaiveDate::from_ymd_opt(2025, 5, 30).unwrap();
        assert_matches!(settings.target_date_for(today), Err(DispatchError::InvalidDate(_)));

        let near_end = ReminderSettings { lead_days: 1, ..settings };
        assert_matches!(near_end.target_date_for(NaiveDate::MAX), Err(DispatchError::InvalidDate(_)));
    }
}
