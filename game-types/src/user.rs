use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Number of mistake histogram buckets: 0..=4 mistakes plus "not finished".
pub const HISTOGRAM_BUCKETS: usize = 6;

/// Bucket counting rounds that expired before the player finished.
pub const UNFINISHED_BUCKET: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub username: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatsData {
    pub puzzles_completed: u32,
    /// Percentage of completed puzzles that were won
    pub win_rate: f64,
    /// Percentage of completed puzzles lost on mistakes
    pub loss_rate: f64,
    pub current_streak: u32,
    pub max_streak: u32,
    pub perfect_puzzles: u32,
    pub mistake_histogram: [u32; HISTOGRAM_BUCKETS],
}
