//! 基準時刻と固定間隔から出現スケジュールを計算する。
//!
//! すべての出現は固定の基準時刻 `anchor` に `interval` を繰り返し加算して
//! 導出する。計算は常に UTC の絶対時刻で行い、ローカルタイムゾーンへの
//! 変換は表示層の責務としてここには持ち込まない。

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

/// スケジュール設定が不正な場合のエラー。
///
/// 構築時に検証するので、計算の途中でエラーになることはない。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Interval must be positive (got {0})")]
    NonPositiveInterval(TimeDelta),
    #[error("Notification advance must be non-negative (got {0})")]
    NegativeAdvance(TimeDelta),
    #[error("Event duration must be non-negative (got {0})")]
    NegativeDuration(TimeDelta),
    #[error("Tolerance must be non-negative (got {0})")]
    NegativeTolerance(TimeDelta),
    #[error("Tolerance {tolerance} exceeds half the interval {interval}")]
    AmbiguousTolerance {
        tolerance: TimeDelta,
        interval: TimeDelta,
    },
}

/// イベントの 1 回の出現。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// イベント開始時刻
    pub event_start: DateTime<Utc>,
    /// イベント終了時刻（開始 + 継続時間）
    pub event_end: DateTime<Utc>,
    /// 通知を送るべき時刻（開始 - 事前通知オフセット）
    pub notification_time: DateTime<Utc>,
    /// クエリ開始位置からの 1 始まりの連番（表示・デバッグ用）
    pub sequence_index: usize,
}

/// 検証済みのスケジュール定数一式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    anchor: DateTime<Utc>,
    interval: TimeDelta,
    advance: TimeDelta,
    event_duration: TimeDelta,
    tolerance: TimeDelta,
}

impl Schedule {
    /// 定数を検証してスケジュールを作成する。
    pub fn new(
        anchor: DateTime<Utc>,
        interval: TimeDelta,
        advance: TimeDelta,
        event_duration: TimeDelta,
        tolerance: TimeDelta,
    ) -> Result<Self, ScheduleError> {
        if interval <= TimeDelta::zero() {
            return Err(ScheduleError::NonPositiveInterval(interval));
        }
        if advance < TimeDelta::zero() {
            return Err(ScheduleError::NegativeAdvance(advance));
        }
        if event_duration < TimeDelta::zero() {
            return Err(ScheduleError::NegativeDuration(event_duration));
        }
        if tolerance < TimeDelta::zero() {
            return Err(ScheduleError::NegativeTolerance(tolerance));
        }
        // 許容幅がインターバルの半分を超えると 2 つの出現が同時にマッチしうる
        if tolerance * 2 > interval {
            return Err(ScheduleError::AmbiguousTolerance {
                tolerance,
                interval,
            });
        }
        Ok(Self {
            anchor,
            interval,
            advance,
            event_duration,
            tolerance,
        })
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    pub fn tolerance(&self) -> TimeDelta {
        self.tolerance
    }

    /// `from` 以降（同時刻を含む）の出現を時系列順に列挙する無限イテレータを返す。
    pub fn upcoming(&self, from: DateTime<Utc>) -> Upcoming<'_> {
        Upcoming {
            schedule: self,
            next_start: self.first_start_at_or_after(from),
            next_index: 1,
        }
    }

    /// `from` 以降の出現をちょうど `count` 件返す。
    pub fn next_occurrences(&self, from: DateTime<Utc>, count: usize) -> Vec<Occurrence> {
        self.upcoming(from).take(count).collect()
    }

    /// いま通知すべき出現があれば返す。
    ///
    /// `now` と通知時刻の差が許容幅以内（境界を含む）の出現を探す。複数が
    /// マッチした場合は差が最小のものを返すが、構築時の検証により許容幅は
    /// インターバルの半分以下なので実際には高々 1 件しかマッチしない。
    /// 該当なしは正常な結果であり、エラーではない。
    pub fn due_at(&self, now: DateTime<Utc>) -> Option<Occurrence> {
        // 呼び出しが遅れた場合もカバーできるよう 1 インターバル前から候補を見る
        self.upcoming(now - self.interval)
            .take_while(|occ| occ.notification_time <= now + self.tolerance)
            .filter(|occ| abs_delta(now, occ.notification_time) <= self.tolerance)
            .min_by_key(|occ| abs_delta(now, occ.notification_time))
    }

    /// `now` より厳密に後に通知すべき最初の出現を返す。
    ///
    /// 前方には出現が無限に続くため、この問い合わせは必ず成功する。
    pub fn next_after(&self, now: DateTime<Utc>) -> Occurrence {
        let mut start = self.first_start_at_or_after(now);
        let mut index = 1;
        loop {
            let occurrence = self.occurrence(start, index);
            if occurrence.notification_time > now {
                return occurrence;
            }
            start += self.interval;
            index += 1;
        }
    }

    /// `from` 以降（同時刻を含む）で最初のイベント開始時刻を返す。
    ///
    /// 基準時刻からの繰り返し加算のみで導出する。`from` が基準時刻より
    /// 前の場合は基準時刻そのものが最初の出現になる。
    fn first_start_at_or_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let mut start = self.anchor;
        while start < from {
            start += self.interval;
        }
        start
    }

    fn occurrence(&self, event_start: DateTime<Utc>, sequence_index: usize) -> Occurrence {
        Occurrence {
            event_start,
            event_end: event_start + self.event_duration,
            notification_time: event_start - self.advance,
            sequence_index,
        }
    }
}

/// [`Schedule::upcoming`] が返す無限イテレータ。
#[derive(Debug, Clone)]
pub struct Upcoming<'a> {
    schedule: &'a Schedule,
    next_start: DateTime<Utc>,
    next_index: usize,
}

impl Iterator for Upcoming<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        let occurrence = self
            .schedule
            .occurrence(self.next_start, self.next_index);
        self.next_start += self.schedule.interval;
        self.next_index += 1;
        Some(occurrence)
    }
}

fn abs_delta(a: DateTime<Utc>, b: DateTime<Utc>) -> TimeDelta {
    (a - b).abs()
}
