//! GitHub repository_dispatch エンドポイントとの連携。
//!
//! cron バックエンドに登録したジョブはこのエンドポイントを叩いて
//! ワークフロー経由でボットを再起動する。

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::config::DispatchConfig;

const DISPATCH_URL_PREFIX: &str = "https://api.github.com/repos/";
const DISPATCH_URL_SUFFIX: &str = "/dispatches";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchUrlError {
    #[error("Dispatch URL must start with https://api.github.com/repos/")]
    WrongHost,
    #[error("Dispatch URL must end with /dispatches")]
    MissingDispatchesSuffix,
    #[error("Dispatch URL must name exactly owner/repo")]
    MalformedRepoPath,
}

/// ディスパッチ URL の構造を検証し、(owner, repo) を返す。
pub fn validate_dispatch_url(url: &str) -> Result<(String, String), DispatchUrlError> {
    let rest = url
        .strip_prefix(DISPATCH_URL_PREFIX)
        .ok_or(DispatchUrlError::WrongHost)?;
    let rest = rest
        .strip_suffix(DISPATCH_URL_SUFFIX)
        .ok_or(DispatchUrlError::MissingDispatchesSuffix)?;

    match rest.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(DispatchUrlError::MalformedRepoPath),
    }
}

/// 単発の通知ジョブが送る repository_dispatch ペイロード。
pub fn notification_payload(notification_time: DateTime<Utc>) -> serde_json::Value {
    json!({
        "event_type": "floating_island_notification",
        "client_payload": {
            "notification_time": notification_time.to_rfc3339(),
            "auto_scheduled": true,
        }
    })
}

/// 定期ポーリングジョブが送る repository_dispatch ペイロード。
pub fn check_payload() -> serde_json::Value {
    json!({
        "event_type": "floating_island_check",
        "client_payload": {},
    })
}

/// repository_dispatch エンドポイントのクライアント。
pub struct DispatchClient {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl DispatchClient {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            token: config.token.clone(),
        }
    }

    /// テスト用のディスパッチを送って疎通確認する。
    pub async fn send_test(&self) -> Result<(String, String)> {
        let (owner, repo) =
            validate_dispatch_url(&self.url).context("Invalid dispatch URL")?;

        let payload = json!({
            "event_type": "test_webhook",
            "client_payload": {
                "test": true,
                "timestamp": Utc::now().to_rfc3339(),
            }
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", "fid")
            .json(&payload)
            .send()
            .await
            .context("Failed to reach dispatch endpoint")?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok((owner, repo)),
            StatusCode::UNAUTHORIZED => bail!("Dispatch token rejected (401 Unauthorized)"),
            StatusCode::NOT_FOUND => {
                bail!("Repository not found (404), check the dispatch URL")
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                bail!("Dispatch endpoint returned {status}: {body}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_url() {
        let (owner, repo) =
            validate_dispatch_url("https://api.github.com/repos/ekuinox/fid/dispatches")
                .expect("valid URL");
        assert_eq!(owner, "ekuinox");
        assert_eq!(repo, "fid");
    }

    #[test]
    fn rejects_wrong_host() {
        assert_eq!(
            validate_dispatch_url("https://example.com/repos/a/b/dispatches"),
            Err(DispatchUrlError::WrongHost)
        );
    }

    #[test]
    fn rejects_missing_suffix() {
        assert_eq!(
            validate_dispatch_url("https://api.github.com/repos/a/b"),
            Err(DispatchUrlError::MissingDispatchesSuffix)
        );
    }

    #[test]
    fn rejects_malformed_repo_path() {
        for url in [
            "https://api.github.com/repos/only-owner/dispatches",
            "https://api.github.com/repos/a/b/c/dispatches",
            "https://api.github.com/repos//b/dispatches",
        ] {
            assert_eq!(
                validate_dispatch_url(url),
                Err(DispatchUrlError::MalformedRepoPath),
                "{url}"
            );
        }
    }

    #[test]
    fn notification_payload_carries_time() {
        let time = "2025-08-20T00:20:00Z".parse().expect("valid time");
        let payload = notification_payload(time);

        assert_eq!(payload["event_type"], "floating_island_notification");
        assert_eq!(
            payload["client_payload"]["notification_time"],
            "2025-08-20T00:20:00+00:00"
        );
        assert_eq!(payload["client_payload"]["auto_scheduled"], true);
    }
}
