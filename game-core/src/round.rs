use std::collections::HashSet;
use std::time::{Duration, Instant};

use game_types::RoundId;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::word_group::{GROUPS_PER_ROUND, RoundError, WORDS_PER_ROUND, WordGroup};

/// One round as provided by a round source, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSpec {
    #[serde(rename = "gameId")]
    pub game_id: RoundId,
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub theme: String,
    pub words: Vec<String>,
}

impl RoundSpec {
    /// Checks the 4 groups x 4 distinct words shape and builds the groups.
    pub fn validate(&self) -> Result<Vec<WordGroup>, RoundError> {
        if self.groups.len() != GROUPS_PER_ROUND {
            return Err(RoundError::WrongGroupCount {
                count: self.groups.len(),
            });
        }

        let groups = self
            .groups
            .iter()
            .map(|group| WordGroup::new(group.theme.clone(), group.words.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::with_capacity(WORDS_PER_ROUND);
        for word in groups.iter().flat_map(|group| group.words()) {
            if !seen.insert(word.as_str()) {
                return Err(RoundError::DuplicateWord { word: word.clone() });
            }
        }

        Ok(groups)
    }
}

/// An installed round. Immutable once created; archived rounds keep
/// answering queries after rotation.
#[derive(Debug)]
pub struct Round {
    id: RoundId,
    groups: Vec<WordGroup>,
    words: Vec<String>,
    started_at: Instant,
    duration: Duration,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl Round {
    pub fn from_spec(spec: RoundSpec, duration: Duration) -> Result<Self, RoundError> {
        let groups = spec.validate()?;

        let mut words: Vec<String> = groups
            .iter()
            .flat_map(|group| group.words().iter().cloned())
            .collect();
        words.shuffle(&mut rand::thread_rng());

        Ok(Self {
            id: spec.game_id,
            groups,
            words,
            started_at: Instant::now(),
            duration,
            created_at: chrono::Utc::now(),
        })
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn groups(&self) -> &[WordGroup] {
        &self.groups
    }

    /// The 16 words in the order shown to players.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    pub fn deadline(&self) -> Instant {
        self.started_at + self.duration
    }

    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    pub fn remaining_millis(&self) -> u64 {
        u64::try_from(self.remaining().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn is_active(&self) -> bool {
        Instant::now() < self.deadline()
    }

    pub fn contains_word(&self, word: &str) -> bool {
        self.groups.iter().any(|group| group.contains(word))
    }

    /// Index of the group whose words are exactly `proposal`, if any.
    pub fn group_index<S: AsRef<str>>(&self, proposal: &[S]) -> Option<usize> {
        self.groups.iter().position(|group| group.matches(proposal))
    }

    pub fn theme(&self, index: usize) -> Option<&str> {
        self.groups.get(index).map(WordGroup::theme)
    }
}
