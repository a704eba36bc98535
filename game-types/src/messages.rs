use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{GameStatsData, LeaderboardEntry, LoginData, PlayerStatsData, ProposalData, ServerError};

/// Every value accepted in the `operation` field of a request line.
pub const OPERATIONS: [&str; 8] = [
    "register",
    "login",
    "updateCredentials",
    "logout",
    "submitProposal",
    "requestGameStats",
    "requestLeaderboard",
    "requestPlayerStats",
];

/// One request line. Fields are optional on the wire so that a missing
/// field is reported as a validation error rather than a decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum ClientRequest {
    Register {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        psw: Option<String>,
    },
    Login {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        psw: Option<String>,
    },
    UpdateCredentials {
        #[serde(rename = "oldName", default, skip_serializing_if = "Option::is_none")]
        old_name: Option<String>,
        #[serde(rename = "oldPsw", default, skip_serializing_if = "Option::is_none")]
        old_psw: Option<String>,
        #[serde(rename = "newName", default, skip_serializing_if = "Option::is_none")]
        new_name: Option<String>,
        #[serde(rename = "newPsw", default, skip_serializing_if = "Option::is_none")]
        new_psw: Option<String>,
    },
    Logout {},
    SubmitProposal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        words: Option<Vec<String>>,
    },
    RequestGameStats {},
    RequestLeaderboard {
        #[serde(rename = "playerName", default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
        #[serde(rename = "topPlayers", default, skip_serializing_if = "Option::is_none")]
        top_players: Option<usize>,
    },
    RequestPlayerStats {},
}

impl ClientRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            ClientRequest::Register { .. } => "register",
            ClientRequest::Login { .. } => "login",
            ClientRequest::UpdateCredentials { .. } => "updateCredentials",
            ClientRequest::Logout {} => "logout",
            ClientRequest::SubmitProposal { .. } => "submitProposal",
            ClientRequest::RequestGameStats {} => "requestGameStats",
            ClientRequest::RequestLeaderboard { .. } => "requestLeaderboard",
            ClientRequest::RequestPlayerStats {} => "requestPlayerStats",
        }
    }
}

/// Payload carried in the optional `data` field of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(untagged)]
pub enum ResponseData {
    Login(LoginData),
    Proposal(ProposalData),
    GameStats(GameStatsData),
    PlayerStats(PlayerStatsData),
    Leaderboard(Vec<LeaderboardEntry>),
    PlayerRank(LeaderboardEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServerResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl ServerResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn success_with(message: impl Into<String>, data: ResponseData) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure_with(message: impl Into<String>, data: ResponseData) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl From<ServerError> for ServerResponse {
    fn from(error: ServerError) -> Self {
        ServerResponse::failure(error.to_string())
    }
}
