use game_types::{HISTOGRAM_BUCKETS, PlayerStatsData, UNFINISHED_BUCKET};
use serde::{Deserialize, Serialize};

use crate::scoring::MAX_MISTAKES;

/// How a round session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundOutcome {
    Won { mistakes: u8 },
    /// Ran out of mistakes.
    Lost,
    /// The round expired before the player finished.
    TimedOut,
}

impl RoundOutcome {
    pub fn histogram_bucket(&self) -> usize {
        match self {
            RoundOutcome::Won { mistakes } => usize::from((*mistakes).min(MAX_MISTAKES)),
            RoundOutcome::Lost => usize::from(MAX_MISTAKES),
            RoundOutcome::TimedOut => UNFINISHED_BUCKET,
        }
    }
}

/// Cumulative per-account statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub puzzles_completed: u32,
    pub puzzles_won: u32,
    pub puzzles_lost: u32,
    pub current_streak: u32,
    pub max_streak: u32,
    pub perfect_puzzles: u32,
    pub mistake_histogram: [u32; HISTOGRAM_BUCKETS],
}

impl PlayerStats {
    pub fn record(&mut self, outcome: RoundOutcome) {
        self.puzzles_completed += 1;
        self.mistake_histogram[outcome.histogram_bucket()] += 1;

        match outcome {
            RoundOutcome::Won { mistakes } => {
                self.puzzles_won += 1;
                self.current_streak += 1;
                self.max_streak = self.max_streak.max(self.current_streak);
                if mistakes == 0 {
                    self.perfect_puzzles += 1;
                }
            }
            RoundOutcome::Lost => {
                self.puzzles_lost += 1;
                self.current_streak = 0;
            }
            RoundOutcome::TimedOut => {
                self.current_streak = 0;
            }
        }
    }

    /// Percentage of completed puzzles that were won.
    pub fn win_rate(&self) -> f64 {
        percentage(self.puzzles_won, self.puzzles_completed)
    }

    pub fn loss_rate(&self) -> f64 {
        percentage(self.puzzles_lost, self.puzzles_completed)
    }
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) * 100.0 / f64::from(whole)
    }
}

impl From<&PlayerStats> for PlayerStatsData {
    fn from(stats: &PlayerStats) -> Self {
        PlayerStatsData {
            puzzles_completed: stats.puzzles_completed,
            win_rate: stats.win_rate(),
            loss_rate: stats.loss_rate(),
            current_streak: stats.current_streak,
            max_streak: stats.max_streak,
            perfect_puzzles: stats.perfect_puzzles,
            mistake_histogram: stats.mistake_histogram,
        }
    }
}
