use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::accounts::{Account, AccountDirectory};
use crate::network::connection::ConnectionId;
use crate::round_manager::RoundManager;
use game_types::{
    AuthError, ClientRequest, GameStateError, OPERATIONS, ProposalData, ResponseData,
    ServerError, ServerResponse,
};

/// Decodes one request line. A line that is not JSON is a transport
/// error; a JSON object with a bad or missing field is a validation error.
pub fn parse_request(line: &str) -> Result<ClientRequest, ServerError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| ServerError::transport(e.to_string()))?;

    let operation = match value.get("operation") {
        Some(operation) => operation
            .as_str()
            .ok_or_else(|| ServerError::validation("field 'operation' must be a string"))?,
        None => return Err(ServerError::validation("missing field 'operation'")),
    };

    if !OPERATIONS.contains(&operation) {
        return Err(ServerError::validation(format!(
            "unknown operation: {}",
            operation
        )));
    }

    let operation = operation.to_string();
    serde_json::from_value(value)
        .map_err(|e| ServerError::validation(format!("invalid {} request: {}", operation, e)))
}

/// Per-connection command router. Holds the account this connection is
/// logged into; every call runs synchronously on a worker thread.
#[derive(Clone)]
pub struct CommandDispatcher {
    connection_id: ConnectionId,
    accounts: Arc<AccountDirectory>,
    rounds: Arc<RoundManager>,
    logged_in: Arc<Mutex<Option<Arc<Account>>>>,
}

impl CommandDispatcher {
    pub fn new(
        connection_id: ConnectionId,
        accounts: Arc<AccountDirectory>,
        rounds: Arc<RoundManager>,
    ) -> Self {
        Self {
            connection_id,
            accounts,
            rounds,
            logged_in: Arc::new(Mutex::new(None)),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Current name of the account logged in on this connection.
    pub fn current_username(&self) -> Option<String> {
        self.logged_in.lock().as_ref().map(|account| account.username())
    }

    pub fn handle_line(&self, line: &str) -> ServerResponse {
        debug!("Request on {}: {}", self.connection_id, line);
        let response = match parse_request(line).and_then(|request| self.handle_request(request)) {
            Ok(response) => response,
            Err(error) => error.into(),
        };
        debug!(
            "Response on {}: success={} {}",
            self.connection_id, response.success, response.message
        );
        response
    }

    pub fn handle_request(&self, request: ClientRequest) -> Result<ServerResponse, ServerError> {
        match request {
            ClientRequest::Register { name, psw } => self.handle_register(name, psw),
            ClientRequest::Login { username, psw } => self.handle_login(username, psw),
            ClientRequest::UpdateCredentials {
                old_name,
                old_psw,
                new_name,
                new_psw,
            } => self.handle_update_credentials(old_name, old_psw, new_name, new_psw),
            ClientRequest::Logout {} => self.handle_logout(),
            ClientRequest::SubmitProposal { words } => self.handle_submit_proposal(words),
            ClientRequest::RequestGameStats {} => self.handle_game_stats(),
            ClientRequest::RequestLeaderboard {
                player_name,
                top_players,
            } => self.handle_leaderboard(player_name, top_players),
            ClientRequest::RequestPlayerStats {} => self.handle_player_stats(),
        }
    }

    /// Logs out whatever account this connection still holds.
    pub fn handle_disconnect(&self) {
        if let Some(account) = self.logged_in.lock().take() {
            info!(
                "Connection {} closed, logging out {}",
                self.connection_id,
                account.username()
            );
            self.accounts.logout(&account);
        }
    }

    fn require_login(&self) -> Result<Arc<Account>, ServerError> {
        self.logged_in
            .lock()
            .clone()
            .ok_or_else(|| AuthError::NotLoggedIn.into())
    }

    fn handle_register(
        &self,
        name: Option<String>,
        psw: Option<String>,
    ) -> Result<ServerResponse, ServerError> {
        let (name, psw) = required_pair(name, psw, "name", "psw")?;
        self.accounts.register(&name, &psw)?;
        Ok(ServerResponse::success("registration completed"))
    }

    fn handle_login(
        &self,
        username: Option<String>,
        psw: Option<String>,
    ) -> Result<ServerResponse, ServerError> {
        let (username, psw) = required_pair(username, psw, "username", "psw")?;

        let mut logged_in = self.logged_in.lock();
        if let Some(current) = logged_in.as_ref() {
            return Err(AuthError::AlreadyLoggedIn {
                username: current.username(),
            }
            .into());
        }

        let account = self.accounts.login(&username, &psw)?;
        *logged_in = Some(account.clone());
        drop(logged_in);

        match self.rounds.join(&account) {
            Ok(data) => Ok(ServerResponse::success_with(
                "login successful",
                ResponseData::Login(data),
            )),
            Err(GameStateError::NoActiveRound) => {
                Ok(ServerResponse::success("login successful (no active round)"))
            }
            Err(GameStateError::RoundExpired) => Ok(ServerResponse::success(
                "login successful (round over, next round starting soon)",
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn handle_update_credentials(
        &self,
        old_name: Option<String>,
        old_psw: Option<String>,
        new_name: Option<String>,
        new_psw: Option<String>,
    ) -> Result<ServerResponse, ServerError> {
        let (old_name, old_psw) = required_pair(old_name, old_psw, "oldName", "oldPsw")?;

        let account = self.accounts.update_credentials(
            &old_name,
            &old_psw,
            new_name.as_deref(),
            new_psw.as_deref(),
        )?;
        debug!(
            "Credentials of {} updated from connection {}",
            account.username(),
            self.connection_id
        );
        Ok(ServerResponse::success("credentials updated"))
    }

    fn handle_logout(&self) -> Result<ServerResponse, ServerError> {
        let account = self
            .logged_in
            .lock()
            .take()
            .ok_or(AuthError::NotLoggedIn)?;
        self.accounts.logout(&account);
        Ok(ServerResponse::success("logout successful"))
    }

    fn handle_submit_proposal(
        &self,
        words: Option<Vec<String>>,
    ) -> Result<ServerResponse, ServerError> {
        let account = self.require_login()?;
        let words = words.ok_or_else(|| ServerError::validation("missing field 'words'"))?;

        let result = self.rounds.submit_proposal(&account, &words)?;
        info!(
            "{} proposed {:?}: correct={} score={}",
            account.username(),
            words,
            result.correct,
            result.new_score
        );

        let message = match (result.correct, result.finished.is_some()) {
            (true, true) => "correct group, puzzle solved",
            (true, false) => "correct group",
            (false, true) => "wrong group, no mistakes left",
            (false, false) => "wrong group",
        };
        let data = ResponseData::Proposal(ProposalData {
            correct: result.correct,
            new_score: result.new_score,
            theme: result.theme,
        });

        if result.correct {
            Ok(ServerResponse::success_with(message, data))
        } else {
            Ok(ServerResponse::failure_with(message, data))
        }
    }

    fn handle_game_stats(&self) -> Result<ServerResponse, ServerError> {
        self.require_login()?;
        let stats = self
            .rounds
            .round_stats()
            .ok_or(GameStateError::NoActiveRound)?;
        Ok(ServerResponse::success_with(
            "round statistics",
            ResponseData::GameStats(stats),
        ))
    }

    fn handle_leaderboard(
        &self,
        player_name: Option<String>,
        top_players: Option<usize>,
    ) -> Result<ServerResponse, ServerError> {
        self.require_login()?;

        if let Some(username) = player_name {
            let entry = self
                .accounts
                .rank_of(&username)
                .ok_or(GameStateError::PlayerNotFound { username })?;
            return Ok(ServerResponse::success_with(
                "leaderboard position",
                ResponseData::PlayerRank(entry),
            ));
        }

        let entries = match top_players {
            Some(k) => self.accounts.top(k),
            None => self.accounts.leaderboard(),
        };
        Ok(ServerResponse::success_with(
            "leaderboard",
            ResponseData::Leaderboard(entries),
        ))
    }

    fn handle_player_stats(&self) -> Result<ServerResponse, ServerError> {
        let account = self.require_login()?;
        Ok(ServerResponse::success_with(
            "player statistics",
            ResponseData::PlayerStats(account.stats_data()),
        ))
    }
}

fn required_pair(
    first: Option<String>,
    second: Option<String>,
    first_name: &str,
    second_name: &str,
) -> Result<(String, String), ServerError> {
    match (first, second) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(ServerError::validation(format!(
            "fields '{}' and '{}' are required",
            first_name, second_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round_manager::RoundSettings;
    use game_core::{GroupSpec, RoundSpec, VecRoundSource};
    use std::time::Duration;

    fn spec() -> RoundSpec {
        let groups = [
            ("Fruit", ["apple", "pear", "plum", "fig"]),
            ("Colors", ["red", "blue", "green", "teal"]),
            ("Metals", ["iron", "gold", "zinc", "lead"]),
            ("Planets", ["mars", "venus", "earth", "saturn"]),
        ];
        RoundSpec {
            game_id: 1,
            groups: groups
                .iter()
                .map(|(theme, words)| GroupSpec {
                    theme: theme.to_string(),
                    words: words.iter().map(|w| w.to_string()).collect(),
                })
                .collect(),
        }
    }

    fn dispatcher(with_round: bool) -> CommandDispatcher {
        let source = VecRoundSource::new(vec![spec()]);
        let rounds = RoundManager::new(
            Box::new(source),
            RoundSettings {
                duration: Duration::from_secs(60),
                rotation_delay: Duration::from_secs(1),
                retry_interval: Duration::from_secs(1),
            },
        );
        if with_round {
            rounds.start_new_round().unwrap();
        }
        CommandDispatcher::new(
            ConnectionId::new(),
            Arc::new(AccountDirectory::new()),
            rounds,
        )
    }

    #[test]
    fn test_parse_errors_are_classified() {
        assert!(matches!(
            parse_request("not json"),
            Err(ServerError::Transport(_))
        ));
        assert!(matches!(
            parse_request(r#"{"psw":"x"}"#),
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            parse_request(r#"{"operation":"dance"}"#),
            Err(ServerError::Validation(message)) if message.contains("unknown operation")
        ));
        assert!(matches!(
            parse_request(r#"{"operation":"submitProposal","words":"apple"}"#),
            Err(ServerError::Validation(_))
        ));
        assert_eq!(
            parse_request(r#"{"operation":"requestPlayerStats"}"#).unwrap(),
            ClientRequest::RequestPlayerStats {}
        );
    }

    #[tokio::test]
    async fn test_login_joins_current_round() {
        let dispatcher = dispatcher(true);

        let response = dispatcher.handle_line(r#"{"operation":"register","name":"alice","psw":"pw1"}"#);
        assert!(response.success);

        let response = dispatcher.handle_line(r#"{"operation":"login","username":"alice","psw":"pw1"}"#);
        assert!(response.success);
        match response.data {
            Some(ResponseData::Login(data)) => {
                assert_eq!(data.game_id, 1);
                assert_eq!(data.words.len(), 16);
                assert_eq!(data.current_score, 0);
            }
            other => panic!("Expected login data, got {:?}", other),
        }
        assert_eq!(dispatcher.current_username().as_deref(), Some("alice"));

        let response = dispatcher.handle_line(r#"{"operation":"login","username":"alice","psw":"pw1"}"#);
        assert!(!response.success);
        assert!(response.message.contains("already logged in"));
    }

    #[tokio::test]
    async fn test_login_without_round_succeeds_without_data() {
        let dispatcher = dispatcher(false);
        dispatcher.handle_line(r#"{"operation":"register","name":"bob","psw":"pw"}"#);

        let response = dispatcher.handle_line(r#"{"operation":"login","username":"bob","psw":"pw"}"#);
        assert!(response.success);
        assert!(response.data.is_none());

        let response = dispatcher.handle_line(r#"{"operation":"requestGameStats"}"#);
        assert!(!response.success);
        assert_eq!(response.message, "no active round");
    }

    #[tokio::test]
    async fn test_commands_require_login() {
        let dispatcher = dispatcher(true);
        for line in [
            r#"{"operation":"logout"}"#,
            r#"{"operation":"submitProposal","words":["apple","pear","plum","fig"]}"#,
            r#"{"operation":"requestGameStats"}"#,
            r#"{"operation":"requestLeaderboard"}"#,
            r#"{"operation":"requestPlayerStats"}"#,
        ] {
            let response = dispatcher.handle_line(line);
            assert!(!response.success, "{} should fail", line);
            assert_eq!(response.message, "login required");
        }
    }

    #[tokio::test]
    async fn test_wrong_proposal_reports_score() {
        let dispatcher = dispatcher(true);
        dispatcher.handle_line(r#"{"operation":"register","name":"alice","psw":"pw1"}"#);
        dispatcher.handle_line(r#"{"operation":"login","username":"alice","psw":"pw1"}"#);

        let response = dispatcher
            .handle_line(r#"{"operation":"submitProposal","words":["apple","red","iron","mars"]}"#);
        assert!(!response.success);
        assert_eq!(
            response.data,
            Some(ResponseData::Proposal(ProposalData {
                correct: false,
                new_score: -4,
                theme: None,
            }))
        );

        let response = dispatcher
            .handle_line(r#"{"operation":"submitProposal","words":["fig","plum","pear","apple"]}"#);
        assert!(response.success);
        assert_eq!(
            response.data,
            Some(ResponseData::Proposal(ProposalData {
                correct: true,
                new_score: 2,
                theme: Some("Fruit".to_string()),
            }))
        );
    }

    #[tokio::test]
    async fn test_rename_keeps_connection_logged_in() {
        let dispatcher = dispatcher(true);
        dispatcher.handle_line(r#"{"operation":"register","name":"alice","psw":"pw1"}"#);
        dispatcher.handle_line(r#"{"operation":"login","username":"alice","psw":"pw1"}"#);

        let response = dispatcher.handle_line(
            r#"{"operation":"updateCredentials","oldName":"alice","oldPsw":"pw1","newName":"alicia"}"#,
        );
        assert!(response.success);
        assert_eq!(dispatcher.current_username().as_deref(), Some("alicia"));

        let response = dispatcher.handle_line(r#"{"operation":"requestPlayerStats"}"#);
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_leaderboard_forms() {
        let dispatcher = dispatcher(true);
        dispatcher.handle_line(r#"{"operation":"register","name":"alice","psw":"pw1"}"#);
        dispatcher.handle_line(r#"{"operation":"register","name":"bob","psw":"pw2"}"#);
        dispatcher.handle_line(r#"{"operation":"login","username":"alice","psw":"pw1"}"#);

        let response = dispatcher.handle_line(r#"{"operation":"requestLeaderboard"}"#);
        assert!(matches!(response.data, Some(ResponseData::Leaderboard(ref e)) if e.len() == 2));

        let response = dispatcher.handle_line(r#"{"operation":"requestLeaderboard","topPlayers":1}"#);
        assert!(matches!(response.data, Some(ResponseData::Leaderboard(ref e)) if e.len() == 1));

        let response = dispatcher
            .handle_line(r#"{"operation":"requestLeaderboard","playerName":"bob","topPlayers":1}"#);
        match response.data {
            Some(ResponseData::PlayerRank(entry)) => assert_eq!(entry.username, "bob"),
            other => panic!("Expected player rank, got {:?}", other),
        }

        let response =
            dispatcher.handle_line(r#"{"operation":"requestLeaderboard","playerName":"zed"}"#);
        assert!(!response.success);
        assert_eq!(response.message, "player not found: zed");
    }

    #[tokio::test]
    async fn test_disconnect_logs_out() {
        let dispatcher = dispatcher(true);
        dispatcher.handle_line(r#"{"operation":"register","name":"alice","psw":"pw1"}"#);
        dispatcher.handle_line(r#"{"operation":"login","username":"alice","psw":"pw1"}"#);
        assert_eq!(dispatcher.accounts.logged_in_count(), 1);

        dispatcher.handle_disconnect();
        assert_eq!(dispatcher.accounts.logged_in_count(), 0);
        assert!(dispatcher.current_username().is_none());
    }
}
