//! Floating Island の出現スケジュールを計算する純粋なコア。
//!
//! I/O や外部サービスへの依存は持たない。通知の配送やジョブの登録は
//! `fid` バイナリ側の責務。

mod schedule;

pub use schedule::{Occurrence, Schedule, ScheduleError, Upcoming};
