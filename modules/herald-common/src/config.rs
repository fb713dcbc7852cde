use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Deployment flavour, selected by `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    DevelopmentLocal,
    TestLocal,
    Testing,
    Production,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DevelopmentLocal => "development_local",
            Self::TestLocal => "test_local",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development_local" => Ok(Self::DevelopmentLocal),
            "test_local" => Ok(Self::TestLocal),
            "testing" => Ok(Self::Testing),
            "production" => Ok(Self::Production),
            other => Err(ConfigError::Invalid {
                key: "APP_ENV",
                value: other.to_string(),
            }),
        }
    }
}

/// SMTPS login, from `SMTP_SERVER`, `SMTP_PORT`, `EMAIL_USER`, `EMAIL_PASSWORD`.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Pipeline configuration loaded from environment variables.
///
/// Channel credentials are optional: a channel without credentials is wired to
/// a no-op client by the binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: AppEnv,

    // Database
    pub database_url: String,

    // Broker
    pub topic: String,
    pub consumer_group: String,
    pub partitions: u32,
    pub poll_interval: Duration,

    // Channels
    pub channel_timeout: Duration,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Set only when server, user and password are all present.
    pub smtp: Option<SmtpSettings>,
    pub sms_token: Option<String>,
    pub sms_gateway_domain: String,
    /// Set only when all three Twilio keys are present.
    pub twilio: Option<TwilioSettings>,
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` delegates here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = match lookup("APP_ENV") {
            Some(v) => v.parse()?,
            None => AppEnv::DevelopmentLocal,
        };

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None => database_url_from_parts(&lookup)?,
        };

        Ok(Self {
            app_env,
            database_url,
            topic: lookup("EVENTS_TOPIC").unwrap_or_else(|| "events".to_string()),
            consumer_group: lookup("EVENTS_CONSUMER_GROUP")
                .unwrap_or_else(|| "event-processor".to_string()),
            partitions: parse_or(&lookup, "EVENTS_PARTITIONS", 1)?,
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "EVENTS_POLL_INTERVAL_MS",
                500,
            )?),
            channel_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CHANNEL_TIMEOUT_SECS",
                10,
            )?),
            telegram_bot_token: lookup("TG_BOT_TOKEN"),
            telegram_chat_id: lookup("TG_CHAT_ID"),
            smtp: smtp_from(&lookup)?,
            sms_token: lookup("SMS_TOKEN"),
            sms_gateway_domain: lookup("SMS_GATEWAY_DOMAIN")
                .unwrap_or_else(|| "sms.ru".to_string()),
            twilio: twilio_from(&lookup),
        })
    }

    /// Log the loaded configuration with secrets reduced to a short preview.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let n = val.chars().take(4).map(char::len_utf8).sum::<usize>();
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  APP_ENV: {}", self.app_env);
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  EVENTS_TOPIC: {}", self.topic);
        tracing::info!("  EVENTS_CONSUMER_GROUP: {}", self.consumer_group);
        tracing::info!("  EVENTS_PARTITIONS: {}", self.partitions);
        tracing::info!("  TG_BOT_TOKEN: {}", preview_opt(&self.telegram_bot_token));
        match &self.smtp {
            Some(smtp) => {
                tracing::info!("  SMTP_SERVER: {}:{}", smtp.server, smtp.port);
                tracing::info!("  EMAIL_USER: {}", smtp.user);
                tracing::info!("  EMAIL_PASSWORD: {}", preview(&smtp.password));
            }
            None => tracing::info!("  SMTP_SERVER: <not set>"),
        }
        tracing::info!("  SMS_TOKEN: {}", preview_opt(&self.sms_token));
        tracing::info!(
            "  TWILIO_AUTH_TOKEN: {}",
            preview_opt(&self.twilio.as_ref().map(|t| t.auth_token.clone()))
        );
    }
}

fn smtp_from<F>(lookup: &F) -> Result<Option<SmtpSettings>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (Some(server), Some(user), Some(password)) = (
        lookup("SMTP_SERVER"),
        lookup("EMAIL_USER"),
        lookup("EMAIL_PASSWORD"),
    ) else {
        return Ok(None);
    };

    Ok(Some(SmtpSettings {
        server,
        port: parse_or(lookup, "SMTP_PORT", 465)?,
        user,
        password,
    }))
}

fn twilio_from<F>(lookup: &F) -> Option<TwilioSettings>
where
    F: Fn(&str) -> Option<String>,
{
    Some(TwilioSettings {
        account_sid: lookup("TWILIO_ACCOUNT_SID")?,
        auth_token: lookup("TWILIO_AUTH_TOKEN")?,
        from_number: lookup("TWILIO_FROM_NUMBER")?,
    })
}

fn database_url_from_parts<F>(lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let user = lookup("DB_USER").ok_or(ConfigError::Missing("DATABASE_URL or DB_USER"))?;
    let password = lookup("DB_PASSWORD").ok_or(ConfigError::Missing("DB_PASSWORD"))?;
    let name = lookup("DB_NAME").ok_or(ConfigError::Missing("DB_NAME"))?;
    let host = lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string());
    let port: u16 = parse_or(lookup, "DB_PORT", 5432)?;

    Ok(format!("postgres://{user}:{password}@{host}:{port}/{name}"))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
