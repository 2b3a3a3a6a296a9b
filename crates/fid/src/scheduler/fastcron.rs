//! FastCron API クライアント。
//!
//! ジョブはフォームエンコードの `POST /crontab` に 5 フィールドの
//! cron 式を渡して作成する。レート制限（429）には短い線形バックオフで
//! 再試行する。レスポンスは `{"status": "OK", ...}` のエンベロープ。

use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Datelike as _, Timelike as _, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{DispatchConfig, SchedulerConfig};
use crate::dispatch;

use super::{JobSummary, one_shot_title, polling_title};

const FASTCRON_API_BASE: &str = "https://www.fastcron.com/api";

const RETRY_LIMIT: u32 = 3;

pub struct FastCronClient {
    client: reqwest::Client,
    api_key: String,
    title_prefix: String,
    dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    crons: Vec<CronEntry>,
}

#[derive(Debug, Deserialize)]
struct CronEntry {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FastCronClient {
    pub fn new(scheduler: &SchedulerConfig, dispatch: &DispatchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: scheduler.api_key.clone(),
            title_prefix: scheduler.job_title_prefix.clone(),
            dispatch: dispatch.clone(),
        }
    }

    /// 指定時刻に 1 回だけ発火するジョブを作成し、ジョブ ID を返す。
    pub async fn create_one_shot(&self, at: DateTime<Utc>) -> Result<i64> {
        let title = one_shot_title(&self.title_prefix, at);
        let id = self
            .create_job(&title, &cron_expression(at), dispatch::notification_payload(at))
            .await?;
        info!(job_id = id, at = %at, "One-shot job created on FastCron");
        Ok(id)
    }

    /// `poll_minutes` ごとに発火する定期ジョブを作成する。
    pub async fn create_polling_job(&self, poll_minutes: u32) -> Result<i64> {
        let title = polling_title(&self.title_prefix);
        let id = self
            .create_job(&title, &polling_expression(poll_minutes), dispatch::check_payload())
            .await?;
        info!(job_id = id, poll_minutes, "Polling job created on FastCron");
        Ok(id)
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        let response = self
            .client
            .get(format!("{FASTCRON_API_BASE}/crontab"))
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .context("Failed to reach FastCron")?;

        let envelope = Self::parse_envelope(response).await?;
        Ok(envelope
            .crons
            .into_iter()
            .map(|cron| JobSummary {
                id: cron.id,
                title: cron.name,
                enabled: cron.enabled,
            })
            .collect())
    }

    pub async fn delete_job(&self, id: i64) -> Result<()> {
        let response = self
            .client
            .delete(format!("{FASTCRON_API_BASE}/crontab/{id}"))
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .context("Failed to reach FastCron")?;

        Self::parse_envelope(response).await?;
        Ok(())
    }

    async fn create_job(
        &self,
        name: &str,
        cron: &str,
        body: serde_json::Value,
    ) -> Result<i64> {
        let headers = serde_json::json!([
            format!("Authorization: token {}", self.dispatch.token),
            "Accept: application/vnd.github.v3+json",
            "Content-Type: application/json",
        ])
        .to_string();
        let data = body.to_string();

        let form = [
            ("token", self.api_key.as_str()),
            ("name", name),
            ("cron", cron),
            ("url", self.dispatch.url.as_str()),
            ("method", "POST"),
            ("headers", headers.as_str()),
            ("data", data.as_str()),
            ("timezone", "UTC"),
        ];

        for attempt in 1..=RETRY_LIMIT {
            let response = self
                .client
                .post(format!("{FASTCRON_API_BASE}/crontab"))
                .form(&form)
                .send()
                .await
                .context("Failed to reach FastCron")?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let wait = Duration::from_secs(u64::from(attempt) * 3);
                warn!(attempt, wait = ?wait, "FastCron rate limited, backing off");
                tokio::time::sleep(wait).await;
                continue;
            }

            let envelope = Self::parse_envelope(response).await?;
            return envelope
                .id
                .context("FastCron response is missing the job id");
        }

        bail!("FastCron rate limit persisted after {RETRY_LIMIT} attempts")
    }

    async fn parse_envelope(response: reqwest::Response) -> Result<Envelope> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("FastCron returned {status}: {body}");
        }

        let envelope: Envelope = response
            .json()
            .await
            .context("Failed to parse FastCron response")?;

        if envelope.status != "OK" {
            bail!(
                "FastCron API error: {}",
                envelope.message.as_deref().unwrap_or("unknown error")
            );
        }

        Ok(envelope)
    }
}

/// 指定時刻ちょうどに 1 回マッチする cron 式を作る（分 時 日 月 曜日）。
fn cron_expression(at: DateTime<Utc>) -> String {
    format!(
        "{} {} {} {} *",
        at.minute(),
        at.hour(),
        at.day(),
        at.month()
    )
}

/// `poll_minutes` ごとにマッチする cron 式を作る。
fn polling_expression(poll_minutes: u32) -> String {
    format!("*/{poll_minutes} * * * *")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn cron_expression_pins_minute_hour_day_month() {
        let at = Utc.with_ymd_and_hms(2025, 8, 20, 0, 20, 0).unwrap();
        assert_eq!(cron_expression(at), "20 0 20 8 *");
    }

    #[test]
    fn polling_expression_uses_step_syntax() {
        assert_eq!(polling_expression(20), "*/20 * * * *");
    }

    #[test]
    fn envelope_parses_create_and_list_shapes() {
        let created: Envelope =
            serde_json::from_str(r#"{"status":"OK","id":123}"#).expect("create shape");
        assert_eq!(created.id, Some(123));

        let listed: Envelope = serde_json::from_str(
            r#"{"status":"OK","crons":[{"id":1,"name":"Floating Island check"}]}"#,
        )
        .expect("list shape");
        assert_eq!(listed.crons.len(), 1);
        assert_eq!(listed.crons[0].name, "Floating Island check");
        assert!(listed.crons[0].enabled);

        let failed: Envelope =
            serde_json::from_str(r#"{"status":"error","message":"bad token"}"#)
                .expect("error shape");
        assert_eq!(failed.status, "error");
        assert_eq!(failed.message.as_deref(), Some("bad token"));
    }
}
