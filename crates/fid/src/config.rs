use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use fid_core::Schedule;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    pub scheduler: SchedulerConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: "YOUR_TELEGRAM_BOT_TOKEN".to_string(),
            chat_id: "YOUR_TELEGRAM_CHAT_ID".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// 最初に観測されたイベントの開始時刻（UTC, RFC 3339）
    pub anchor: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde", default)]
    pub advance: Duration,
    #[serde(with = "humantime_serde", default = "default_event_duration")]
    pub event_duration: Duration,
    #[serde(with = "humantime_serde", default = "default_tolerance")]
    pub tolerance: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            anchor: default_anchor(),
            interval: Duration::from_secs(8 * 3600 + 20 * 60),
            advance: Duration::ZERO,
            event_duration: default_event_duration(),
            tolerance: default_tolerance(),
        }
    }
}

// 2025-08-19 16:00:00 UTC
fn default_anchor() -> DateTime<Utc> {
    DateTime::from_timestamp(1_755_619_200, 0).expect("valid anchor timestamp")
}

fn default_event_duration() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_tolerance() -> Duration {
    Duration::from_secs(5 * 60)
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde_as(as = "DisplayFromStr")]
    pub timezone: Tz,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Kyiv,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SchedulerConfig {
    pub backend: SchedulerBackend,
    pub api_key: String,
    #[serde(default = "default_poll_minutes")]
    pub poll_minutes: u32,
    #[serde(default = "default_job_title_prefix")]
    pub job_title_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backend: SchedulerBackend::FastCron,
            api_key: "YOUR_SCHEDULER_API_KEY".to_string(),
            poll_minutes: default_poll_minutes(),
            job_title_prefix: default_job_title_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerBackend {
    CronJob,
    FastCron,
}

fn default_poll_minutes() -> u32 {
    20
}

fn default_job_title_prefix() -> String {
    "Floating Island".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// cron バックエンドが叩く repository_dispatch エンドポイント
    pub url: String,
    pub token: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            url: "https://api.github.com/repos/owner/repo/dispatches".to_string(),
            token: "YOUR_GITHUB_TOKEN".to_string(),
        }
    }
}

impl Config {
    /// 検証済みのスケジュールを構築する。不正な設定は起動時にここで弾く。
    pub fn schedule(&self) -> Result<Schedule> {
        let schedule = Schedule::new(
            self.schedule.anchor,
            to_delta(self.schedule.interval).context("Interval out of range")?,
            to_delta(self.schedule.advance).context("Advance out of range")?,
            to_delta(self.schedule.event_duration).context("Event duration out of range")?,
            to_delta(self.schedule.tolerance).context("Tolerance out of range")?,
        )?;

        if self.scheduler.poll_minutes == 0 || self.scheduler.poll_minutes > 60 {
            bail!(
                "poll_minutes must be between 1 and 60 (got {})",
                self.scheduler.poll_minutes
            );
        }

        Ok(schedule)
    }
}

fn to_delta(duration: Duration) -> Result<TimeDelta> {
    TimeDelta::from_std(duration).context("Duration too large")
}

pub fn open_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
    let config: Config = toml::from_str(&content).context("Failed to parse configuration file")?;
    Ok(config)
}

pub fn write_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = Config::default();
    let content = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_example_config() {
        let content = include_str!("../../../config.example.toml");
        let config: Config = toml::from_str(content).expect("Failed to parse config.example.toml");

        assert_eq!(config, Config::default());
    }

    #[test]
    fn default_config_round_trips() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");

        write_default_config(&path).expect("Failed to write default config");
        let config = open_config(&path).expect("Failed to read config back");

        assert_eq!(config, Config::default());
    }

    #[test]
    fn default_schedule_is_valid() {
        let schedule = Config::default().schedule().expect("valid default schedule");
        assert_eq!(
            schedule.interval(),
            TimeDelta::hours(8) + TimeDelta::minutes(20)
        );
        assert_eq!(schedule.tolerance(), TimeDelta::minutes(5));
    }

    #[test]
    fn rejects_ambiguous_tolerance() {
        let mut config = Config::default();
        config.schedule.tolerance = Duration::from_secs(5 * 3600);
        assert!(config.schedule().is_err());
    }

    #[test]
    fn rejects_zero_poll_minutes() {
        let mut config = Config::default();
        config.scheduler.poll_minutes = 0;
        assert!(config.schedule().is_err());
    }
}
