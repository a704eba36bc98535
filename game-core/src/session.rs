use std::collections::BTreeSet;

use game_types::{GameStateError, RoundId};
use uuid::Uuid;

use crate::scoring::{GROUPS_TO_WIN, MAX_MISTAKES, ScoringEngine, WRONG_PROPOSAL_PENALTY};
use crate::stats::RoundOutcome;

/// Result of applying one proposal to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalOutcome {
    pub correct: bool,
    pub new_score: i32,
    /// Set when this proposal finished the session.
    pub finished: Option<RoundOutcome>,
}

/// One account's progress within one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSession {
    pub account_id: Uuid,
    pub round_id: RoundId,
    found: BTreeSet<usize>,
    correct: u8,
    wrong: u8,
    score: i32,
    finished: bool,
    won: bool,
}

impl RoundSession {
    pub fn new(account_id: Uuid, round_id: RoundId) -> Self {
        Self {
            account_id,
            round_id,
            found: BTreeSet::new(),
            correct: 0,
            wrong: 0,
            score: 0,
            finished: false,
            won: false,
        }
    }

    pub fn correct(&self) -> u8 {
        self.correct
    }

    pub fn wrong(&self) -> u8 {
        self.wrong
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn has_won(&self) -> bool {
        self.won
    }

    pub fn register_correct(
        &mut self,
        group_index: usize,
    ) -> Result<ProposalOutcome, GameStateError> {
        if self.finished {
            return Err(GameStateError::AlreadyTerminated);
        }
        if !self.found.insert(group_index) {
            return Err(GameStateError::GroupAlreadyFound);
        }

        self.correct += 1;
        self.score += ScoringEngine::bonus_for_correct(self.correct);

        let finished = if self.correct >= GROUPS_TO_WIN {
            self.finished = true;
            self.won = true;
            Some(RoundOutcome::Won {
                mistakes: self.wrong,
            })
        } else {
            None
        };

        Ok(ProposalOutcome {
            correct: true,
            new_score: self.score,
            finished,
        })
    }

    pub fn register_wrong(&mut self) -> Result<ProposalOutcome, GameStateError> {
        if self.finished {
            return Err(GameStateError::AlreadyTerminated);
        }

        self.wrong += 1;
        self.score -= WRONG_PROPOSAL_PENALTY;

        let finished = if self.wrong >= MAX_MISTAKES {
            self.finished = true;
            self.won = false;
            Some(RoundOutcome::Lost)
        } else {
            None
        };

        Ok(ProposalOutcome {
            correct: false,
            new_score: self.score,
            finished,
        })
    }

    /// Finishes an unfinished session as a timeout. Returns false when the
    /// session had already finished.
    pub fn mark_timed_out(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.won = false;
        true
    }

    /// How the session ended, once it has.
    pub fn outcome(&self) -> Option<RoundOutcome> {
        if !self.finished {
            None
        } else if self.won {
            Some(RoundOutcome::Won {
                mistakes: self.wrong,
            })
        } else if self.wrong >= MAX_MISTAKES {
            Some(RoundOutcome::Lost)
        } else {
            Some(RoundOutcome::TimedOut)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> RoundSession {
        RoundSession::new(Uuid::new_v4(), 1)
    }

    #[test]
    fn test_three_groups_win() {
        let mut session = session();

        assert_eq!(session.register_correct(0).unwrap().new_score, 6);
        assert_eq!(session.register_correct(2).unwrap().new_score, 18);
        let last = session.register_correct(1).unwrap();

        assert_eq!(last.new_score, 36);
        assert_eq!(last.finished, Some(RoundOutcome::Won { mistakes: 0 }));
        assert!(session.is_finished());
        assert!(session.has_won());
        assert_eq!(session.found, std::collections::BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn test_repeat_group_is_rejected_without_mutation() {
        let mut session = session();
        session.register_correct(3).unwrap();
        let before = session.clone();

        assert_eq!(
            session.register_correct(3),
            Err(GameStateError::GroupAlreadyFound)
        );
        assert_eq!(session, before);
    }

    #[test]
    fn test_four_mistakes_lose() {
        let mut session = session();
        for expected in [-4, -8, -12] {
            let outcome = session.register_wrong().unwrap();
            assert_eq!(outcome.new_score, expected);
            assert_eq!(outcome.finished, None);
        }

        let last = session.register_wrong().unwrap();
        assert_eq!(last.new_score, -16);
        assert_eq!(last.finished, Some(RoundOutcome::Lost));
        assert_eq!(session.wrong(), 4);
        assert_eq!(session.register_wrong(), Err(GameStateError::AlreadyTerminated));
        assert_eq!(session.wrong(), 4);
    }

    #[test]
    fn test_score_law_holds_at_every_step() {
        let mut session = session();
        session.register_wrong().unwrap();
        session.register_correct(0).unwrap();
        session.register_wrong().unwrap();
        session.register_correct(1).unwrap();

        assert_eq!(
            session.score(),
            ScoringEngine::score_for(session.correct(), session.wrong())
        );
        assert_eq!(session.score(), 10);
    }

    #[test]
    fn test_timeout_only_applies_once() {
        let mut session = session();
        session.register_wrong().unwrap();

        assert!(session.mark_timed_out());
        assert!(!session.mark_timed_out());
        assert_eq!(session.outcome(), Some(RoundOutcome::TimedOut));
        assert_eq!(session.score(), -4);
    }

    #[test]
    fn test_finished_session_ignores_timeout() {
        let mut session = session();
        for group in 0..3 {
            session.register_correct(group).unwrap();
        }
        assert!(!session.mark_timed_out());
        assert_eq!(session.outcome(), Some(RoundOutcome::Won { mistakes: 0 }));
    }
}
