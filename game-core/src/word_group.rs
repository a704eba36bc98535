use std::collections::HashSet;

use thiserror::Error;

pub const GROUP_SIZE: usize = 4;
pub const GROUPS_PER_ROUND: usize = 4;
pub const WORDS_PER_ROUND: usize = GROUP_SIZE * GROUPS_PER_ROUND;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    #[error("round has {count} groups, expected 4")]
    WrongGroupCount { count: usize },
    #[error("group '{theme}' has {count} words, expected 4")]
    WrongWordCount { theme: String, count: usize },
    #[error("word '{word}' appears more than once")]
    DuplicateWord { word: String },
}

/// A theme and its four words. Matching ignores word order.
#[derive(Debug, Clone)]
pub struct WordGroup {
    theme: String,
    words: Vec<String>,
    members: HashSet<String>,
}

impl WordGroup {
    pub fn new(theme: impl Into<String>, words: Vec<String>) -> Result<Self, RoundError> {
        let theme = theme.into();
        if words.len() != GROUP_SIZE {
            return Err(RoundError::WrongWordCount {
                theme,
                count: words.len(),
            });
        }

        let members: HashSet<String> = words.iter().cloned().collect();
        if members.len() != GROUP_SIZE {
            let word = first_duplicate(&words).unwrap_or_default();
            return Err(RoundError::DuplicateWord { word });
        }

        Ok(Self {
            theme,
            words,
            members,
        })
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn contains(&self, word: &str) -> bool {
        self.members.contains(word)
    }

    /// True when `proposal` holds exactly this group's words, in any order.
    pub fn matches<S: AsRef<str>>(&self, proposal: &[S]) -> bool {
        proposal.len() == GROUP_SIZE
            && proposal.iter().all(|word| self.contains(word.as_ref()))
            && distinct(proposal)
    }
}

impl PartialEq for WordGroup {
    fn eq(&self, other: &Self) -> bool {
        self.theme == other.theme && self.members == other.members
    }
}

pub(crate) fn distinct<S: AsRef<str>>(words: &[S]) -> bool {
    let mut seen = HashSet::with_capacity(words.len());
    words.iter().all(|word| seen.insert(word.as_ref()))
}

pub fn first_duplicate<S: AsRef<str>>(words: &[S]) -> Option<String> {
    let mut seen = HashSet::with_capacity(words.len());
    words
        .iter()
        .map(AsRef::as_ref)
        .find(|word| !seen.insert(*word))
        .map(str::to_string)
}
