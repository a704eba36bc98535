use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub type RoundId = u32;

/// Sent back on a successful login when a round is installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub game_id: RoundId,
    pub words: Vec<String>,
    /// Milliseconds until the round expires
    pub remaining_time: u64,
    pub correct_proposals: u8,
    pub wrong_proposals: u8,
    pub current_score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProposalData {
    pub correct: bool,
    pub new_score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GameStatsData {
    pub game_id: RoundId,
    pub active: bool,
    pub remaining_time: u64,
    pub total_players: usize,
    pub finished_players: usize,
    pub winners: usize,
}
