use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accounts::Account;
use game_core::{
    GROUP_SIZE, Round, RoundError, RoundOutcome, RoundSession, RoundSource, first_duplicate,
};
use game_types::{GameStateError, GameStatsData, LoginData, RoundId};

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("round source has no more rounds")]
    Exhausted,
    #[error("round source failed: {0}")]
    Source(String),
    #[error("malformed round: {0}")]
    Malformed(#[from] RoundError),
}

#[derive(Debug, Clone, Copy)]
pub struct RoundSettings {
    pub duration: Duration,
    /// Pause between a round expiring and the next one starting.
    pub rotation_delay: Duration,
    /// How long to wait before asking an exhausted source again.
    pub retry_interval: Duration,
}

/// Outcome of one adjudicated proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalResult {
    pub correct: bool,
    pub new_score: i32,
    pub theme: Option<String>,
    pub finished: Option<RoundOutcome>,
}

struct SessionEntry {
    account: Arc<Account>,
    state: Arc<Mutex<RoundSession>>,
}

struct LiveRound {
    round: Arc<Round>,
    sessions: DashMap<Uuid, SessionEntry>,
    finalized: AtomicBool,
}

impl LiveRound {
    fn new(round: Arc<Round>) -> Self {
        Self {
            round,
            sessions: DashMap::new(),
            finalized: AtomicBool::new(false),
        }
    }

    /// Closes every unfinished session as a timeout. Runs at most once.
    fn finalize(&self) -> usize {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let mut timed_out = 0;
        for entry in self.sessions.iter() {
            if self.time_out(&entry.account, &entry.state) {
                timed_out += 1;
            }
        }
        timed_out
    }

    /// Closes one session as a timeout unless it already finished.
    fn time_out(&self, account: &Account, state: &Mutex<RoundSession>) -> bool {
        let mut session = state.lock();
        if !session.mark_timed_out() {
            return false;
        }
        account.record_round(session.score(), RoundOutcome::TimedOut);
        true
    }
}

/// Owns the current round, its sessions and the expiry timer.
pub struct RoundManager {
    source: Mutex<Box<dyn RoundSource>>,
    settings: RoundSettings,
    current: RwLock<Option<Arc<LiveRound>>>,
    history: DashMap<RoundId, Arc<Round>>,
    // Held for the whole of a rotation.
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RoundManager {
    pub fn new(source: Box<dyn RoundSource>, settings: RoundSettings) -> Arc<Self> {
        Arc::new(Self {
            source: Mutex::new(source),
            settings,
            current: RwLock::new(None),
            history: DashMap::new(),
            timer: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> RoundSettings {
        self.settings
    }

    /// Installs the next round from the source and arms its expiry timer.
    /// On failure the installed round, if any, is left untouched.
    pub fn start_new_round(self: &Arc<Self>) -> Result<Arc<Round>, RotationError> {
        let mut timer = self.timer.lock();
        self.install_next(&mut timer)
    }

    /// Like `start_new_round`, but keeps retrying in the background when
    /// the source has nothing to offer yet.
    pub fn start_with_retry(self: &Arc<Self>) -> Option<Arc<Round>> {
        let mut timer = self.timer.lock();
        match self.install_next(&mut timer) {
            Ok(round) => Some(round),
            Err(e) => {
                warn!(
                    "Could not start a round: {}. Retrying in {:?}",
                    e, self.settings.retry_interval
                );
                let pending = timer.as_ref().is_some_and(|handle| !handle.is_finished());
                if !pending {
                    let expected = self.installed_id();
                    let manager = Arc::downgrade(self);
                    let retry = self.settings.retry_interval;
                    *timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(retry).await;
                        Self::rotation_loop(manager, expected).await;
                    }));
                }
                None
            }
        }
    }

    fn install_next(
        self: &Arc<Self>,
        timer: &mut Option<JoinHandle<()>>,
    ) -> Result<Arc<Round>, RotationError> {
        let spec = self
            .source
            .lock()
            .next_round()
            .map_err(|e| RotationError::Source(format!("{:#}", e)))?
            .ok_or(RotationError::Exhausted)?;
        let round = Arc::new(Round::from_spec(spec, self.settings.duration)?);

        if let Some(handle) = timer.take() {
            handle.abort();
        }

        let previous = self
            .current
            .write()
            .replace(Arc::new(LiveRound::new(round.clone())));

        if let Some(previous) = previous {
            if !previous.round.is_active() {
                let timed_out = previous.finalize();
                if timed_out > 0 {
                    info!(
                        "Round {} closed {} unfinished sessions during rotation",
                        previous.round.id(),
                        timed_out
                    );
                }
            }
            info!("Archived round {}", previous.round.id());
        }

        self.history.insert(round.id(), round.clone());
        *timer = Some(self.arm_expiry(round.id(), round.deadline()));

        info!(
            "Started round {} ({} words, {:?})",
            round.id(),
            round.words().len(),
            round.duration()
        );
        Ok(round)
    }

    fn arm_expiry(self: &Arc<Self>, round_id: RoundId, deadline: Instant) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let rotation_delay = self.settings.rotation_delay;

        tokio::spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;

            match manager.upgrade() {
                Some(strong) => {
                    strong.expire_round(round_id);
                }
                None => return,
            }

            tokio::time::sleep(rotation_delay).await;
            Self::rotation_loop(manager, Some(round_id)).await;
        })
    }

    /// Rotates away from `expected`, retrying while the source is empty.
    /// Stops as soon as some other rotation has replaced `expected`.
    async fn rotation_loop(manager: Weak<Self>, expected: Option<RoundId>) {
        loop {
            let Some(strong) = manager.upgrade() else {
                return;
            };

            let retry = strong.settings.retry_interval;
            match strong.rotate_from(expected) {
                Ok(_) => return,
                Err(e) => {
                    error!("Automatic rotation failed: {}. Retrying in {:?}", e, retry);
                }
            }

            drop(strong);
            tokio::time::sleep(retry).await;
        }
    }

    fn rotate_from(
        self: &Arc<Self>,
        expected: Option<RoundId>,
    ) -> Result<Option<Arc<Round>>, RotationError> {
        let mut timer = self.timer.lock();
        if self.installed_id() != expected {
            debug!("Skipping rotation, round {:?} already replaced", expected);
            return Ok(None);
        }
        self.install_next(&mut timer).map(Some)
    }

    /// Times out every unfinished session of `round_id` if it is still the
    /// installed round. Returns how many sessions were closed.
    pub fn expire_round(&self, round_id: RoundId) -> usize {
        let live = self.live();
        match live {
            Some(live) if live.round.id() == round_id => {
                let timed_out = live.finalize();
                info!(
                    "Round {} expired, {} unfinished sessions timed out",
                    round_id, timed_out
                );
                timed_out
            }
            _ => 0,
        }
    }

    fn live(&self) -> Option<Arc<LiveRound>> {
        self.current.read().clone()
    }

    fn installed_id(&self) -> Option<RoundId> {
        self.current.read().as_ref().map(|live| live.round.id())
    }

    pub fn current_round(&self) -> Option<Arc<Round>> {
        self.current.read().as_ref().map(|live| live.round.clone())
    }

    /// Any round installed so far, archived or current.
    pub fn round_by_id(&self, round_id: RoundId) -> Option<Arc<Round>> {
        self.history.get(&round_id).map(|entry| entry.value().clone())
    }

    pub fn archived_count(&self) -> usize {
        self.history.len().saturating_sub(usize::from(self.installed_id().is_some()))
    }

    /// Joins `account` to the current round. Joining twice returns the
    /// existing session unchanged; a new join into an expired round is
    /// refused.
    pub fn join(&self, account: &Arc<Account>) -> Result<LoginData, GameStateError> {
        let live = self.live().ok_or(GameStateError::NoActiveRound)?;
        let round_id = live.round.id();

        let existing = live
            .sessions
            .get(&account.id())
            .map(|entry| entry.state.clone());
        let state = match existing {
            Some(state) => state,
            None => {
                if !live.round.is_active() {
                    return Err(GameStateError::RoundExpired);
                }
                let state = live
                    .sessions
                    .entry(account.id())
                    .or_insert_with(|| {
                        debug!("{} joined round {}", account.username(), round_id);
                        SessionEntry {
                            account: account.clone(),
                            state: Arc::new(Mutex::new(RoundSession::new(account.id(), round_id))),
                        }
                    })
                    .state
                    .clone();
                // Expiry may have swept this shard before the insert landed
                if live.finalized.load(Ordering::SeqCst) {
                    live.time_out(account, &state);
                }
                state
            }
        };
        account.set_current_round(Some(round_id));

        let session = state.lock();
        Ok(LoginData {
            game_id: round_id,
            words: live.round.words().to_vec(),
            remaining_time: live.round.remaining_millis(),
            correct_proposals: session.correct(),
            wrong_proposals: session.wrong(),
            current_score: session.score(),
        })
    }

    pub fn submit_proposal(
        &self,
        account: &Account,
        words: &[String],
    ) -> Result<ProposalResult, GameStateError> {
        let live = self.live().ok_or(GameStateError::NoActiveRound)?;
        let (owner, state) = live
            .sessions
            .get(&account.id())
            .map(|entry| (entry.account.clone(), entry.state.clone()))
            .ok_or(GameStateError::NotInRound)?;

        let round = &live.round;
        let mut session = state.lock();

        if session.is_finished() {
            return Err(GameStateError::AlreadyTerminated);
        }
        if !round.is_active() {
            return Err(GameStateError::RoundExpired);
        }
        if words.len() != GROUP_SIZE {
            return Err(GameStateError::WrongWordCount { count: words.len() });
        }
        if first_duplicate(words).is_some() {
            return Err(GameStateError::DuplicateWords);
        }
        if let Some(word) = words.iter().find(|word| !round.contains_word(word)) {
            return Err(GameStateError::UnknownWord { word: word.clone() });
        }

        let (outcome, theme) = match round.group_index(words) {
            Some(index) => (
                session.register_correct(index)?,
                round.theme(index).map(str::to_string),
            ),
            None => (session.register_wrong()?, None),
        };

        if let Some(finished) = outcome.finished {
            owner.record_round(session.score(), finished);
            info!(
                "{} finished round {}: {:?}, score {}",
                owner.username(),
                round.id(),
                finished,
                session.score()
            );
        }

        Ok(ProposalResult {
            correct: outcome.correct,
            new_score: outcome.new_score,
            theme,
            finished: outcome.finished,
        })
    }

    pub fn session_of(&self, account_id: Uuid) -> Option<RoundSession> {
        let live = self.live()?;
        let state = live.sessions.get(&account_id)?.state.clone();
        let session = state.lock().clone();
        Some(session)
    }

    /// Snapshot of the installed round, or `None` when there is none.
    pub fn round_stats(&self) -> Option<GameStatsData> {
        let live = self.live()?;

        let mut finished_players = 0;
        let mut winners = 0;
        for entry in live.sessions.iter() {
            let session = entry.state.lock();
            if session.is_finished() {
                finished_players += 1;
            }
            if session.has_won() {
                winners += 1;
            }
        }

        Some(GameStatsData {
            game_id: live.round.id(),
            active: live.round.is_active(),
            remaining_time: live.round.remaining_millis(),
            total_players: live.sessions.len(),
            finished_players,
            winners,
        })
    }

    /// Cancels the expiry timer and closes the round source.
    pub fn shutdown(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        if let Err(e) = self.source.lock().close() {
            warn!("Failed to close round source: {:#}", e);
        }
        info!("Round manager stopped");
    }
}
