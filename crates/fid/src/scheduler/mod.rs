//! 外部の cron-as-a-service バックエンドとの連携。
//!
//! 提供する能力は「指定時刻の単発ジョブ」「定期ポーリングジョブ」
//! 「一覧」「削除」の 4 つだけで、どのバックエンドが有効かは
//! このモジュールの外に漏らさない。

mod cronjob;
mod fastcron;

pub use cronjob::CronJobClient;
pub use fastcron::FastCronClient;

use anyhow::Result;
use chrono::{DateTime, Utc};
use fid_core::Occurrence;
use tracing::info;

use crate::config::{DispatchConfig, SchedulerBackend, SchedulerConfig};

/// バックエンド上のジョブの概要。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub id: i64,
    pub title: String,
    pub enabled: bool,
}

/// 設定で選択されたスケジューラバックエンド。
pub enum Scheduler {
    CronJob(CronJobClient),
    FastCron(FastCronClient),
}

impl Scheduler {
    pub fn from_config(scheduler: &SchedulerConfig, dispatch: &DispatchConfig) -> Self {
        match scheduler.backend {
            SchedulerBackend::CronJob => Self::CronJob(CronJobClient::new(scheduler, dispatch)),
            SchedulerBackend::FastCron => Self::FastCron(FastCronClient::new(scheduler, dispatch)),
        }
    }

    /// 出現 1 回分の単発通知ジョブを作成する。
    pub async fn schedule_one_shot(&self, occurrence: &Occurrence) -> Result<i64> {
        match self {
            Self::CronJob(client) => client.create_one_shot(occurrence.notification_time).await,
            Self::FastCron(client) => client.create_one_shot(occurrence.notification_time).await,
        }
    }

    /// `poll_minutes` ごとにディスパッチ先を叩く定期ジョブを作成する。
    pub async fn create_polling_job(&self, poll_minutes: u32) -> Result<i64> {
        match self {
            Self::CronJob(client) => client.create_polling_job(poll_minutes).await,
            Self::FastCron(client) => client.create_polling_job(poll_minutes).await,
        }
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        match self {
            Self::CronJob(client) => client.list_jobs().await,
            Self::FastCron(client) => client.list_jobs().await,
        }
    }

    pub async fn delete_job(&self, id: i64) -> Result<()> {
        match self {
            Self::CronJob(client) => client.delete_job(id).await,
            Self::FastCron(client) => client.delete_job(id).await,
        }
    }

    /// プレフィックスに一致する単発ジョブを削除する。
    ///
    /// 定期ポーリングジョブは残す。削除した件数を返す。
    pub async fn cleanup(&self, prefix: &str) -> Result<usize> {
        let keep = polling_title(prefix);
        let mut removed = 0;

        for job in self.list_jobs().await? {
            if !job.title.starts_with(prefix) || job.title == keep {
                continue;
            }
            self.delete_job(job.id).await?;
            info!(job_id = job.id, title = %job.title, "Stale job deleted");
            removed += 1;
        }

        Ok(removed)
    }
}

/// 単発ジョブのタイトル。通知時刻を含めて識別できるようにする。
pub fn one_shot_title(prefix: &str, notification_time: DateTime<Utc>) -> String {
    format!("{prefix} {} UTC", notification_time.format("%d.%m %H:%M"))
}

/// 定期ポーリングジョブのタイトル。
pub fn polling_title(prefix: &str) -> String {
    format!("{prefix} check")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn one_shot_title_embeds_notification_time() {
        let time = Utc.with_ymd_and_hms(2025, 8, 20, 0, 20, 0).unwrap();
        assert_eq!(
            one_shot_title("Floating Island", time),
            "Floating Island 20.08 00:20 UTC"
        );
    }

    #[test]
    fn polling_title_is_distinct_from_one_shots() {
        let time = Utc.with_ymd_and_hms(2025, 8, 20, 0, 20, 0).unwrap();
        let prefix = "Floating Island";
        assert_ne!(polling_title(prefix), one_shot_title(prefix, time));
        assert!(polling_title(prefix).starts_with(prefix));
    }
}
