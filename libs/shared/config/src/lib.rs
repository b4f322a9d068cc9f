use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub whatsapp_api_base_url: String,
    pub whatsapp_phone_number_id: String,
    pub whatsapp_access_token: String,
    pub webhook_verify_token: String,
    pub webhook_app_secret: String,
    pub nlu_base_url: String,
    pub nlu_api_key: String,
    pub admin_api_token: String,
    pub session_schema_version: i32,
    pub upstream_timeout_seconds: u64,
    pub history_limit: i64,
    pub reminder_template_name: Option<String>,
    pub reminder_template_language: String,
    pub reminder_freeform_window_hours: i64,
    pub reminder_lead_days: i64,
    pub reminder_interval_minutes: u64,
    pub reset_keywords: Vec<String>,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("DATABASE_URL not set, falling back to in-memory store");
                    String::new()
                }),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
            whatsapp_api_base_url: env::var("WHATSAPP_API_BASE_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v19.0".to_string()),
            whatsapp_phone_number_id: env::var("WHATSAPP_PHONE_NUMBER_ID")
                .unwrap_or_else(|_| {
                    warn!("WHATSAPP_PHONE_NUMBER_ID not set, using empty value");
                    String::new()
                }),
            whatsapp_access_token: env::var("WHATSAPP_ACCESS_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("WHATSAPP_ACCESS_TOKEN not set, using empty value");
                    String::new()
                }),
            webhook_verify_token: env::var("WEBHOOK_VERIFY_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("WEBHOOK_VERIFY_TOKEN not set, webhook subscription will be refused");
                    String::new()
                }),
            webhook_app_secret: env::var("WEBHOOK_APP_SECRET")
                .unwrap_or_else(|_| {
                    warn!("WEBHOOK_APP_SECRET not set, inbound webhooks will be rejected");
                    String::new()
                }),
            nlu_base_url: env::var("NLU_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("NLU_BASE_URL not set, using empty value");
                    String::new()
                }),
            nlu_api_key: env::var("NLU_API_KEY").unwrap_or_default(),
            admin_api_token: env::var("ADMIN_API_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("ADMIN_API_TOKEN not set, admin routes will reject every request");
                    String::new()
                }),
            session_schema_version: parse_or("SESSION_SCHEMA_VERSION", 1),
            upstream_timeout_seconds: parse_or("UPSTREAM_TIMEOUT_SECONDS", 15),
            history_limit: parse_or("HISTORY_LIMIT", 20),
            reminder_template_name: env::var("REMINDER_TEMPLATE_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty()),
            reminder_template_language: env::var("REMINDER_TEMPLATE_LANGUAGE")
                .unwrap_or_else(|_| "es".to_string()),
            reminder_freeform_window_hours: parse_or("REMINDER_FREEFORM_WINDOW_HOURS", 24),
            reminder_lead_days: parse_or("REMINDER_LEAD_DAYS", 1),
            reminder_interval_minutes: parse_or("REMINDER_INTERVAL_MINUTES", 60),
            reset_keywords: env::var("RESET_KEYWORDS")
                .map(|raw| parse_keywords(&raw))
                .unwrap_or_else(|_| default_reset_keywords()),
            port: parse_or("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        self.is_messaging_configured() && self.is_nlu_configured()
    }

    pub fn is_messaging_configured(&self) -> bool {
        !self.whatsapp_api_base_url.is_empty()
            && !self.whatsapp_phone_number_id.is_empty()
            && !self.whatsapp_access_token.is_empty()
    }

    pub fn is_nlu_configured(&self) -> bool {
        !self.nlu_base_url.is_empty()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_seconds)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            database_max_connections: 10,
            whatsapp_api_base_url: "https://graph.facebook.com/v19.0".to_string(),
            whatsapp_phone_number_id: String::new(),
            whatsapp_access_token: String::new(),
            webhook_verify_token: String::new(),
            webhook_app_secret: String::new(),
            nlu_base_url: String::new(),
            nlu_api_key: String::new(),
            admin_api_token: String::new(),
            session_schema_version: 1,
            upstream_timeout_seconds: 15,
            history_limit: 20,
            reminder_template_name: None,
            reminder_template_language: "es".to_string(),
            reminder_freeform_window_hours: 24,
            reminder_lead_days: 1,
            reminder_interval_minutes: 60,
            reset_keywords: default_reset_keywords(),
            port: 3000,
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

fn default_reset_keywords() -> Vec<String> {
    ["reset", "reiniciar", "restart", "menu"]
        .iter()
        .map(|keyword| keyword.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_trimmed_and_lowercased() {
        assert_eq!(parse_keywords(" Reset, ,MENU "), vec!["reset", "menu"]);
    }

    #[test]
    fn default_config_is_not_configured() {
        let config = AppConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.session_schema_version, 1);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(15));
    }
}
