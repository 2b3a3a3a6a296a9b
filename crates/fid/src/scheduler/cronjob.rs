//! cron-job.org API クライアント。
//!
//! ジョブの作成は `PUT /jobs`、一覧は `GET /jobs`、削除は
//! `DELETE /jobs/{id}`。スケジュールは各フィールドの値リストで表現し、
//! ワイルドカードは `[-1]`。

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Datelike as _, Timelike as _, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{DispatchConfig, SchedulerConfig};
use crate::dispatch;

use super::{JobSummary, one_shot_title, polling_title};

const CRONJOB_API_BASE: &str = "https://api.cron-job.org";

/// `requestMethod` の POST を表す値
const REQUEST_METHOD_POST: u8 = 1;

pub struct CronJobClient {
    client: reqwest::Client,
    api_key: String,
    title_prefix: String,
    dispatch: DispatchConfig,
}

#[derive(Debug, Serialize)]
struct JobRequest {
    job: Job,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    url: String,
    enabled: bool,
    title: String,
    schedule: JobSchedule,
    request_method: u8,
    request_headers: Vec<Header>,
    request_body: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct JobSchedule {
    timezone: &'static str,
    hours: Vec<i32>,
    minutes: Vec<i32>,
    mdays: Vec<i32>,
    months: Vec<i32>,
    wdays: Vec<i32>,
}

#[derive(Debug, Serialize)]
struct Header {
    name: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobResponse {
    job_id: i64,
}

#[derive(Debug, Deserialize)]
struct ListJobsResponse {
    #[serde(default)]
    jobs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobEntry {
    job_id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    enabled: bool,
}

impl CronJobClient {
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
        let body = dispatch::notification_payload(at);
        let job = self.job(title, one_shot_schedule(at), body);

        let id = self.put_job(job).await?;
        info!(job_id = id, at = %at, "One-shot job created on cron-job.org");
        Ok(id)
    }

    /// `poll_minutes` ごとに発火する定期ジョブを作成する。
    pub async fn create_polling_job(&self, poll_minutes: u32) -> Result<i64> {
        let title = polling_title(&self.title_prefix);
        let job = self.job(title, polling_schedule(poll_minutes), dispatch::check_payload());

        let id = self.put_job(job).await?;
        info!(job_id = id, poll_minutes, "Polling job created on cron-job.org");
        Ok(id)
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        let response = self
            .client
            .get(format!("{CRONJOB_API_BASE}/jobs"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to reach cron-job.org")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("cron-job.org returned {status}: {body}");
        }

        let list: ListJobsResponse = response
            .json()
            .await
            .context("Failed to parse cron-job.org job list")?;

        Ok(list
            .jobs
            .into_iter()
            .map(|job| JobSummary {
                id: job.job_id,
                title: job.title,
                enabled: job.enabled,
            })
            .collect())
    }

    pub async fn delete_job(&self, id: i64) -> Result<()> {
        let response = self
            .client
            .delete(format!("{CRONJOB_API_BASE}/jobs/{id}"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to reach cron-job.org")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("cron-job.org returned {status} deleting job {id}: {body}");
        }

        Ok(())
    }

    fn job(&self, title: String, schedule: JobSchedule, body: serde_json::Value) -> Job {
        Job {
            url: self.dispatch.url.clone(),
            enabled: true,
            title,
            schedule,
            request_method: REQUEST_METHOD_POST,
            request_headers: vec![
                Header {
                    name: "Content-Type",
                    value: "application/json".to_string(),
                },
                Header {
                    name: "Accept",
                    value: "application/vnd.github.v3+json".to_string(),
                },
                Header {
                    name: "Authorization",
                    value: format!("token {}", self.dispatch.token),
                },
            ],
            request_body: body.to_string(),
        }
    }

    async fn put_job(&self, job: Job) -> Result<i64> {
        let response = self
            .client
            .put(format!("{CRONJOB_API_BASE}/jobs"))
            .bearer_auth(&self.api_key)
            .json(&JobRequest { job })
            .send()
            .await
            .context("Failed to reach cron-job.org")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("cron-job.org returned {status}: {body}");
        }

        let created: CreateJobResponse = response
            .json()
            .await
            .context("Failed to parse cron-job.org response")?;
        Ok(created.job_id)
    }
}

/// 指定時刻ちょうどに 1 回マッチするスケジュールを作る。
fn one_shot_schedule(at: DateTime<Utc>) -> JobSchedule {
    JobSchedule {
        timezone: "UTC",
        hours: vec![at.hour() as i32],
        minutes: vec![at.minute() as i32],
        mdays: vec![at.day() as i32],
        months: vec![at.month() as i32],
        wdays: vec![-1],
    }
}

/// `poll_minutes` ごとに毎時マッチするスケジュールを作る。
fn polling_schedule(poll_minutes: u32) -> JobSchedule {
    JobSchedule {
        timezone: "UTC",
        hours: vec![-1],
        minutes: (0..60).step_by(poll_minutes as usize).map(|m| m as i32).collect(),
        mdays: vec![-1],
        months: vec![-1],
        wdays: vec![-1],
    }
}
