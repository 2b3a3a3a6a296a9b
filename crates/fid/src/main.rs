mod config;
mod dispatch;
mod message;
mod scheduler;
mod telegram;
mod version;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fid_core::Schedule;
use tracing::{info, warn};

use crate::{
    config::{Config, open_config, write_default_config},
    scheduler::Scheduler,
    telegram::TelegramClient,
    version::short_version,
};

#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long)]
    init: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether an event is starting now, notify, and re-arm the next job
    Run,
    /// Show the upcoming schedule without sending anything
    Schedule {
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Send a test message to the configured Telegram chat
    TestSend,
    /// Create the recurring polling job on the scheduler backend
    Setup,
    /// Schedule a one-shot job for the next occurrence only
    Arm,
    /// List jobs on the scheduler backend
    Jobs,
    /// Delete stale one-shot jobs from the scheduler backend
    Cleanup,
    /// Validate and test the dispatch webhook target
    CheckWebhook,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    tracing::info!(version = short_version(), "fid version");

    let config = open_config(&args.config).context("Failed to load configuration")?;
    let schedule = config.schedule().context("Invalid schedule configuration")?;
    info!(backend = ?config.scheduler.backend, "Configuration loaded");

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_check(&config, &schedule).await,
        Command::Schedule { count } => show_schedule(&config, &schedule, count),
        Command::TestSend => send_test(&config).await,
        Command::Setup => setup_polling(&config).await,
        Command::Arm => arm_next(&config, &schedule).await,
        Command::Jobs => list_jobs(&config).await,
        Command::Cleanup => cleanup_jobs(&config).await,
        Command::CheckWebhook => check_webhook(&config).await,
    }
}

/// 外部トリガーから定期的に呼ばれる本体。
///
/// いま通知すべき出現があれば Telegram に送信し、次の出現の単発ジョブを
/// 登録する。なければ次の通知時刻をログに出して終わる。トリガーの発火
/// タイミングは正確ではないため、判定は許容幅つきで行う。
async fn run_check(config: &Config, schedule: &Schedule) -> Result<()> {
    let now = Utc::now();

    let Some(due) = schedule.due_at(now) else {
        let next = schedule.next_after(now);
        info!(
            notification_time = %next.notification_time,
            event_start = %next.event_start,
            "No event due now"
        );
        return Ok(());
    };

    info!(event_start = %due.event_start, "Event is starting, sending notification");

    let next = schedule.next_after(due.event_start);
    let text = message::arrival(&due, &next, config.display.timezone);

    let telegram = TelegramClient::new(&config.telegram.bot_token, &config.telegram.chat_id);
    telegram
        .send_message(&text)
        .await
        .context("Failed to send notification")?;

    // 再スケジュールの失敗で通知自体を失敗扱いにはしない。
    // 定期ポーリングジョブが残っていれば次の出現も拾える
    let scheduler = Scheduler::from_config(&config.scheduler, &config.dispatch);
    match scheduler.schedule_one_shot(&next).await {
        Ok(job_id) => info!(
            job_id,
            notification_time = %next.notification_time,
            "Next notification scheduled"
        ),
        Err(e) => warn!(error = %e, "Failed to schedule the next notification"),
    }

    Ok(())
}

fn show_schedule(config: &Config, schedule: &Schedule, count: usize) -> Result<()> {
    let now = Utc::now();

    let occurrences = schedule.next_occurrences(now, count);
    println!(
        "{}",
        message::schedule_preview(&occurrences, config.display.timezone)
    );

    if let Some(due) = schedule.due_at(now) {
        println!(
            "Due right now: event at {} UTC",
            due.event_start.format("%d.%m.%Y %H:%M")
        );
    } else {
        let next = schedule.next_after(now);
        println!(
            "Next notification: {} UTC",
            next.notification_time.format("%d.%m.%Y %H:%M")
        );
    }

    Ok(())
}

async fn send_test(config: &Config) -> Result<()> {
    let telegram = TelegramClient::new(&config.telegram.bot_token, &config.telegram.chat_id);
    telegram
        .send_message(&message::test_message(Utc::now()))
        .await
        .context("Failed to send test message")?;
    info!("Test message sent");
    Ok(())
}

async fn setup_polling(config: &Config) -> Result<()> {
    let scheduler = Scheduler::from_config(&config.scheduler, &config.dispatch);
    let job_id = scheduler
        .create_polling_job(config.scheduler.poll_minutes)
        .await
        .context("Failed to create the polling job")?;
    info!(
        job_id,
        poll_minutes = config.scheduler.poll_minutes,
        "Polling job created"
    );
    Ok(())
}

async fn arm_next(config: &Config, schedule: &Schedule) -> Result<()> {
    let next = schedule.next_after(Utc::now());
    let scheduler = Scheduler::from_config(&config.scheduler, &config.dispatch);
    let job_id = scheduler
        .schedule_one_shot(&next)
        .await
        .context("Failed to schedule the next notification")?;
    info!(
        job_id,
        notification_time = %next.notification_time,
        event_start = %next.event_start,
        "Next notification scheduled"
    );
    Ok(())
}

async fn list_jobs(config: &Config) -> Result<()> {
    let scheduler = Scheduler::from_config(&config.scheduler, &config.dispatch);
    let jobs = scheduler.list_jobs().await?;

    println!("{} job(s):", jobs.len());
    for job in jobs {
        let status = if job.enabled { "enabled" } else { "disabled" };
        println!("  [{status}] {} - {}", job.id, job.title);
    }

    Ok(())
}

async fn cleanup_jobs(config: &Config) -> Result<()> {
    let scheduler = Scheduler::from_config(&config.scheduler, &config.dispatch);
    let removed = scheduler
        .cleanup(&config.scheduler.job_title_prefix)
        .await?;
    info!(removed, "Cleanup finished");
    Ok(())
}

async fn check_webhook(config: &Config) -> Result<()> {
    let client = dispatch::DispatchClient::new(&config.dispatch);
    let (owner, repo) = client
        .send_test()
        .await
        .context("Dispatch webhook check failed")?;
    info!(owner, repo, "Dispatch webhook is reachable");
    Ok(())
}
