use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use base64::{Engine as _, engine::general_purpose};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use game_core::{PlayerStats, RoundOutcome};
use game_types::{AuthError, LeaderboardEntry, PlayerStatsData, RoundId, ServerError};

fn digest_password(password: &str) -> String {
    let hash = Sha256::digest(password.as_bytes());
    general_purpose::STANDARD.encode(hash)
}

/// A registered player. Never removed from the directory.
#[derive(Debug)]
pub struct Account {
    id: Uuid,
    username: RwLock<String>,
    password_digest: RwLock<String>,
    total_score: AtomicI64,
    /// Connections currently logged into this account.
    logins: AtomicUsize,
    current_round: Mutex<Option<RoundId>>,
    stats: Mutex<PlayerStats>,
}

impl Account {
    fn new(username: String, password: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: RwLock::new(username),
            password_digest: RwLock::new(digest_password(password)),
            total_score: AtomicI64::new(0),
            logins: AtomicUsize::new(0),
            current_round: Mutex::new(None),
            stats: Mutex::new(PlayerStats::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> String {
        self.username.read().clone()
    }

    pub fn total_score(&self) -> i64 {
        self.total_score.load(Ordering::SeqCst)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logins.load(Ordering::SeqCst) > 0
    }

    pub fn current_round(&self) -> Option<RoundId> {
        *self.current_round.lock()
    }

    pub fn set_current_round(&self, round: Option<RoundId>) {
        *self.current_round.lock() = round;
    }

    pub fn check_password(&self, password: &str) -> bool {
        *self.password_digest.read() == digest_password(password)
    }

    /// Merges a finished session into the cumulative score and stats.
    pub fn record_round(&self, score: i32, outcome: RoundOutcome) {
        let mut stats = self.stats.lock();
        self.total_score
            .fetch_add(i64::from(score), Ordering::SeqCst);
        stats.record(outcome);
    }

    pub fn stats(&self) -> PlayerStats {
        self.stats.lock().clone()
    }

    pub fn stats_data(&self) -> PlayerStatsData {
        PlayerStatsData::from(&*self.stats.lock())
    }
}

/// Credentials, statistics and ranking for every registered account.
pub struct AccountDirectory {
    accounts: DashMap<String, Arc<Account>>,
    rename_lock: Mutex<()>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            rename_lock: Mutex::new(()),
        }
    }

    pub fn register(&self, username: &str, password: &str) -> Result<Arc<Account>, ServerError> {
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(ServerError::validation("username and password are required"));
        }

        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => {
                warn!("Registration rejected, username taken: {}", username);
                Err(AuthError::UsernameTaken.into())
            }
            Entry::Vacant(entry) => {
                let account = Arc::new(Account::new(username.to_string(), password));
                entry.insert(account.clone());
                info!("Registered account {} ({})", username, account.id());
                Ok(account)
            }
        }
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Arc<Account>, AuthError> {
        let account = self.lookup(username).ok_or_else(|| {
            warn!("Login failed, unknown user: {}", username);
            AuthError::InvalidCredentials
        })?;

        if !account.check_password(password) {
            warn!("Login failed, wrong password for {}", username);
            return Err(AuthError::InvalidCredentials);
        }

        account.logins.fetch_add(1, Ordering::SeqCst);
        info!("Logged in: {}", username);
        Ok(account)
    }

    /// Releases one login. The account stays logged in while another
    /// connection still holds it.
    pub fn logout(&self, account: &Account) {
        let released = account
            .logins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1));
        if released == Ok(1) {
            info!("Logged out: {}", account.username());
        }
    }

    /// Checks the old credentials, then applies whichever of the new
    /// username and password were supplied.
    pub fn update_credentials(
        &self,
        old_name: &str,
        old_password: &str,
        new_name: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<Arc<Account>, ServerError> {
        if new_name.is_some_and(|name| name.trim().is_empty())
            || new_password.is_some_and(|password| password.trim().is_empty())
        {
            return Err(ServerError::validation(
                "new username and password must not be empty",
            ));
        }

        let _guard = self.rename_lock.lock();

        let account = self
            .lookup(old_name)
            .ok_or(AuthError::InvalidCredentials)?;
        if !account.check_password(old_password) {
            return Err(AuthError::InvalidCredentials.into());
        }

        if let Some(new_name) = new_name.filter(|name| *name != old_name) {
            match self.accounts.entry(new_name.to_string()) {
                Entry::Occupied(_) => {
                    warn!("Rename {} -> {} rejected, name taken", old_name, new_name);
                    return Err(AuthError::UsernameTaken.into());
                }
                Entry::Vacant(entry) => {
                    entry.insert(account.clone());
                }
            }
            self.accounts
                .remove_if(old_name, |_, existing| Arc::ptr_eq(existing, &account));
            *account.username.write() = new_name.to_string();
            info!("Renamed account {} -> {}", old_name, new_name);
        }

        if let Some(new_password) = new_password.filter(|password| *password != old_password) {
            *account.password_digest.write() = digest_password(new_password);
            info!("Password updated for {}", account.username());
        }

        Ok(account)
    }

    pub fn lookup(&self, username: &str) -> Option<Arc<Account>> {
        self.accounts.get(username).map(|entry| entry.value().clone())
    }

    /// Every account ranked by cumulative score, ties by username.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut standings: Vec<(String, i64)> = self
            .accounts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().total_score()))
            .collect();

        standings.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        standings
            .into_iter()
            .enumerate()
            .map(|(index, (username, score))| LeaderboardEntry {
                rank: index + 1,
                username,
                score,
            })
            .collect()
    }

    pub fn top(&self, k: usize) -> Vec<LeaderboardEntry> {
        let mut leaderboard = self.leaderboard();
        leaderboard.truncate(k);
        leaderboard
    }

    pub fn rank_of(&self, username: &str) -> Option<LeaderboardEntry> {
        self.leaderboard()
            .into_iter()
            .find(|entry| entry.username == username)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn logged_in_count(&self) -> usize {
        self.accounts
            .iter()
            .filter(|entry| entry.value().is_logged_in())
            .count()
    }
}

impl Default for AccountDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let directory = AccountDirectory::new();
        let original = directory.register("alice", "pw1").unwrap();
        original.record_round(6, RoundOutcome::TimedOut);

        let err = directory.register("alice", "other").unwrap_err();
        assert_eq!(err, ServerError::Auth(AuthError::UsernameTaken));

        let account = directory.lookup("alice").unwrap();
        assert!(account.check_password("pw1"));
        assert!(!account.check_password("other"));
        assert_eq!(account.total_score(), 6);
    }

    #[test]
    fn test_register_requires_fields() {
        let directory = AccountDirectory::new();
        assert!(matches!(
            directory.register("", "pw"),
            Err(ServerError::Validation(_))
        ));
        assert!(matches!(
            directory.register("bob", "  "),
            Err(ServerError::Validation(_))
        ));
        assert_eq!(directory.account_count(), 0);
    }

    #[test]
    fn test_login_checks_password() {
        let directory = AccountDirectory::new();
        directory.register("alice", "pw1").unwrap();

        assert_eq!(
            directory.login("alice", "wrong").unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert_eq!(
            directory.login("nobody", "pw1").unwrap_err(),
            AuthError::InvalidCredentials
        );

        let account = directory.login("alice", "pw1").unwrap();
        assert!(account.is_logged_in());
        assert_eq!(directory.logged_in_count(), 1);

        directory.logout(&account);
        directory.logout(&account);
        assert!(!account.is_logged_in());
        assert_eq!(directory.logged_in_count(), 0);
    }

    #[test]
    fn test_shared_account_stays_logged_in_until_last_logout() {
        let directory = AccountDirectory::new();
        directory.register("alice", "pw1").unwrap();

        let first = directory.login("alice", "pw1").unwrap();
        let second = directory.login("alice", "pw1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        directory.logout(&first);
        assert!(second.is_logged_in());
        assert_eq!(directory.logged_in_count(), 1);

        directory.logout(&second);
        assert!(!second.is_logged_in());
        assert_eq!(directory.logged_in_count(), 0);
    }

    #[test]
    fn test_rename_rekeys_account() {
        let directory = AccountDirectory::new();
        let account = directory.register("alice", "pw1").unwrap();

        let renamed = directory
            .update_credentials("alice", "pw1", Some("alicia"), Some("pw2"))
            .unwrap();

        assert!(Arc::ptr_eq(&account, &renamed));
        assert_eq!(renamed.username(), "alicia");
        assert!(directory.lookup("alice").is_none());
        assert!(directory.login("alicia", "pw2").is_ok());
        assert_eq!(directory.account_count(), 1);
    }

    #[test]
    fn test_rename_collision_changes_nothing() {
        let directory = AccountDirectory::new();
        directory.register("alice", "pw1").unwrap();
        directory.register("bob", "pw2").unwrap();

        let err = directory
            .update_credentials("alice", "pw1", Some("bob"), Some("new"))
            .unwrap_err();
        assert_eq!(err, ServerError::Auth(AuthError::UsernameTaken));

        assert!(directory.lookup("alice").unwrap().check_password("pw1"));
        assert!(directory.lookup("bob").unwrap().check_password("pw2"));
    }

    #[test]
    fn test_update_requires_old_password() {
        let directory = AccountDirectory::new();
        directory.register("alice", "pw1").unwrap();

        let err = directory
            .update_credentials("alice", "bad", None, Some("pw2"))
            .unwrap_err();
        assert_eq!(err, ServerError::Auth(AuthError::InvalidCredentials));

        let err = directory
            .update_credentials("alice", "pw1", Some(""), None)
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[test]
    fn test_leaderboard_orders_by_score() {
        let directory = AccountDirectory::new();
        for (name, score) in [("carol", 10), ("alice", 36), ("bob", -4), ("dave", 10)] {
            let account = directory.register(name, "pw").unwrap();
            account.record_round(score, RoundOutcome::TimedOut);
        }

        let names: Vec<String> = directory
            .leaderboard()
            .into_iter()
            .map(|entry| entry.username)
            .collect();
        assert_eq!(names, vec!["alice", "carol", "dave", "bob"]);

        let top = directory.top(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].username, "carol");
        assert_eq!(directory.top(10).len(), 4);

        let bob = directory.rank_of("bob").unwrap();
        assert_eq!(bob.rank, 4);
        assert_eq!(bob.score, -4);
        assert!(directory.rank_of("erin").is_none());
    }

    #[test]
    fn test_rank_counts_strictly_greater_scores() {
        let directory = AccountDirectory::new();
        for (index, name) in ["p0", "p1", "p2", "p3", "p4"].iter().enumerate() {
            let account = directory.register(name, "pw").unwrap();
            account.record_round((index as i32) * 7 - 10, RoundOutcome::Lost);
        }

        let leaderboard = directory.leaderboard();
        for entry in &leaderboard {
            let greater = leaderboard.iter().filter(|e| e.score > entry.score).count();
            assert_eq!(entry.rank, greater + 1);
            assert_eq!(directory.rank_of(&entry.username).unwrap(), *entry);
        }
    }
}
