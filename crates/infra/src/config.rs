//! Process configuration, loaded from the environment (`.env` supported).

use std::env;
use std::str::FromStr;

use anyhow::Context;
use chrono_tz::Tz;

/// SMTP settings for the email transport.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// WeCom (企业微信) application credentials.
#[derive(Debug, Clone)]
pub struct WeComConfig {
    pub corp_id: String,
    pub agent_id: String,
    pub secret: String,
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Business-local timezone for instance numbering and schedules.
    pub timezone: Tz,
    /// Minutes between the approval-timeout and escalation scans.
    pub scan_interval_minutes: u32,
    /// Absent when email delivery is disabled.
    pub mail: Option<MailConfig>,
    /// Absent when WeCom delivery is disabled.
    pub wecom: Option<WeComConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Shanghai,
            scan_interval_minutes: 15,
            mail: None,
            wecom: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment, reading a `.env` file if present.
    ///
    /// Channel configs are all-or-nothing: a partially set mail or WeCom
    /// block is an error rather than a silently disabled channel.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(tz) = env::var("ARCHERP_TIMEZONE") {
            config.timezone =
                Tz::from_str(&tz).with_context(|| format!("unknown timezone `{tz}`"))?;
        }
        if let Ok(minutes) = env::var("ARCHERP_SCAN_INTERVAL_MINUTES") {
            config.scan_interval_minutes = minutes
                .parse()
                .with_context(|| format!("bad scan interval `{minutes}`"))?;
        }

        config.mail = Self::mail_from_env()?;
        config.wecom = Self::wecom_from_env()?;
        Ok(config)
    }

    fn mail_from_env() -> anyhow::Result<Option<MailConfig>> {
        let vars = [
            "ARCHERP_MAIL_HOST",
            "ARCHERP_MAIL_USERNAME",
            "ARCHERP_MAIL_PASSWORD",
            "ARCHERP_MAIL_FROM",
        ];
        let set = vars.iter().filter(|v| env::var(v).is_ok()).count();
        if set == 0 {
            return Ok(None);
        }
        if set < vars.len() {
            anyhow::bail!("mail config incomplete: all of {vars:?} must be set");
        }
        let port = match env::var("ARCHERP_MAIL_PORT") {
            Ok(p) => p.parse().with_context(|| format!("bad mail port `{p}`"))?,
            Err(_) => 465,
        };
        Ok(Some(MailConfig {
            host: env::var("ARCHERP_MAIL_HOST")?,
            port,
            username: env::var("ARCHERP_MAIL_USERNAME")?,
            password: env::var("ARCHERP_MAIL_PASSWORD")?,
            from: env::var("ARCHERP_MAIL_FROM")?,
        }))
    }

    fn wecom_from_env() -> anyhow::Result<Option<WeComConfig>> {
        let vars = [
            "ARCHERP_WECOM_CORP_ID",
            "ARCHERP_WECOM_AGENT_ID",
            "ARCHERP_WECOM_SECRET",
        ];
        let set = vars.iter().filter(|v| env::var(v).is_ok()).count();
        if set == 0 {
            return Ok(None);
        }
        if set < vars.len() {
            anyhow::bail!("wecom config incomplete: all of {vars:?} must be set");
        }
        Ok(Some(WeComConfig {
            corp_id: env::var("ARCHERP_WECOM_CORP_ID")?,
            agent_id: env::var("ARCHERP_WECOM_AGENT_ID")?,
            secret: env::var("ARCHERP_WECOM_SECRET")?,
        }))
    }
}

/// Process entry helper: install tracing, then load the configuration.
pub fn bootstrap() -> anyhow::Result<AppConfig> {
    archerp_observability::init();
    let config = AppConfig::from_env()?;
    tracing::info!(
        timezone = %config.timezone,
        scan_interval_minutes = config.scan_interval_minutes,
        mail = config.mail.is_some(),
        wecom = config.wecom.is_some(),
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_shanghai_and_fifteen_minutes() {
        let config = AppConfig::default();
        assert_eq!(config.timezone, chrono_tz::Asia::Shanghai);
        assert_eq!(config.scan_interval_minutes, 15);
        assert!(config.mail.is_none());
        assert!(config.wecom.is_none());
    }
}
