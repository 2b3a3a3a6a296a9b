//! 通知メッセージの整形。
//!
//! UTC の絶対時刻をローカル表示に変換するのはここだけ。変換した値を
//! スケジュール計算に戻してはならない。

use std::fmt::Write as _;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use fid_core::Occurrence;

/// イベント到来の通知本文を整形する。
pub fn arrival(current: &Occurrence, next: &Occurrence, tz: Tz) -> String {
    let start_local = current.event_start.with_timezone(&tz);
    let end_local = current.event_end.with_timezone(&tz);
    let next_local = next.event_start.with_timezone(&tz);

    format!(
        "🎈 <b>Floating Island has arrived!</b>\n\n\
         {tz_name}: {start_local} – {end_local}\n\
         UTC: {start_utc}\n\n\
         Available for {duration}\n\n\
         Next arrival at {next_local}",
        tz_name = tz.name(),
        start_local = start_local.format("%H:%M"),
        end_local = end_local.format("%H:%M"),
        start_utc = current.event_start.format("%H:%M"),
        duration = format_delta(current.event_end - current.event_start),
        next_local = next_local.format("%H:%M"),
    )
}

/// 今後の出現一覧を整形する（プレビュー・デバッグ用）。
pub fn schedule_preview(occurrences: &[Occurrence], tz: Tz) -> String {
    let mut out = format!("Upcoming events ({}):\n", tz.name());
    for occurrence in occurrences {
        let start = occurrence.event_start.with_timezone(&tz);
        let end = occurrence.event_end.with_timezone(&tz);
        let _ = writeln!(
            out,
            "{:>2}. {} – {}",
            occurrence.sequence_index,
            start.format("%d.%m %H:%M"),
            end.format("%H:%M"),
        );
    }
    out
}

/// 疎通確認用のテストメッセージを整形する。
pub fn test_message(now: DateTime<Utc>) -> String {
    format!(
        "🧪 <b>Test notification</b>\n\n\
         The bot is up and can reach Telegram.\n\
         Time: {} UTC",
        now.format("%d.%m.%Y %H:%M:%S"),
    )
}

fn format_delta(delta: TimeDelta) -> String {
    match delta.to_std() {
        Ok(duration) => humantime::format_duration(duration).to_string(),
        Err(_) => delta.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn occurrence(start: DateTime<Utc>, index: usize) -> Occurrence {
        Occurrence {
            event_start: start,
            event_end: start + TimeDelta::minutes(30),
            notification_time: start,
            sequence_index: index,
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn arrival_renders_both_timezones() {
        // 2025-08-20 は夏時間なのでキーウは UTC+3
        let current = occurrence(utc(2025, 8, 20, 0, 20), 1);
        let next = occurrence(utc(2025, 8, 20, 8, 40), 2);

        let text = arrival(&current, &next, chrono_tz::Europe::Kyiv);

        assert!(text.contains("Europe/Kyiv: 03:20 – 03:50"));
        assert!(text.contains("UTC: 00:20"));
        assert!(text.contains("Available for 30m"));
        assert!(text.contains("Next arrival at 11:40"));
    }

    #[test]
    fn preview_lists_sequence_numbers_in_local_time() {
        let occurrences = vec![
            occurrence(utc(2025, 8, 20, 0, 20), 1),
            occurrence(utc(2025, 8, 20, 8, 40), 2),
        ];

        let text = schedule_preview(&occurrences, chrono_tz::Europe::Kyiv);

        assert!(text.contains(" 1. 20.08 03:20 – 03:50"));
        assert!(text.contains(" 2. 20.08 11:40 – 12:10"));
    }

    #[test]
    fn test_message_shows_utc_time() {
        let text = test_message(utc(2025, 8, 29, 23, 34));
        assert!(text.contains("29.08.2025 23:34:00 UTC"));
    }
}
