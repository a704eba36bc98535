use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::round::RoundSpec;

/// Pull-based provider of round definitions.
pub trait RoundSource: Send {
    /// Next round to install, or `None` once the source is exhausted.
    fn next_round(&mut self) -> Result<Option<RoundSpec>>;

    fn close(&mut self) -> Result<()>;
}

/// Rounds read from a JSON array of `{"gameId", "groups"}` objects.
#[derive(Debug)]
pub struct JsonFileRoundSource {
    path: PathBuf,
    rounds: Vec<RoundSpec>,
    cursor: usize,
    cycle: bool,
    closed: bool,
}

impl JsonFileRoundSource {
    pub fn open<P: AsRef<Path>>(path: P, cycle: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read rounds file: {}", path.display()))?;

        let rounds: Vec<RoundSpec> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse rounds file: {}", path.display()))?;

        for (index, spec) in rounds.iter().enumerate() {
            spec.validate().with_context(|| {
                format!(
                    "Malformed round #{} (gameId={}) in {}",
                    index,
                    spec.game_id,
                    path.display()
                )
            })?;
        }

        info!("Loaded {} rounds from {}", rounds.len(), path.display());

        Ok(Self {
            path,
            rounds,
            cursor: 0,
            cycle,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loaded_count(&self) -> usize {
        self.rounds.len()
    }

    /// Rounds handed out so far, counting restarts when cycling.
    pub fn served_count(&self) -> usize {
        self.cursor
    }
}

impl RoundSource for JsonFileRoundSource {
    fn next_round(&mut self) -> Result<Option<RoundSpec>> {
        if self.closed {
            bail!("Round source {} is closed", self.path.display());
        }
        if self.rounds.is_empty() {
            return Ok(None);
        }

        let index = if self.cycle {
            self.cursor % self.rounds.len()
        } else if self.cursor < self.rounds.len() {
            self.cursor
        } else {
            return Ok(None);
        };

        self.cursor += 1;
        let spec = self.rounds[index].clone();
        debug!("Serving round {} (entry {})", spec.game_id, index);
        Ok(Some(spec))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// In-memory queue of rounds.
#[derive(Debug, Default)]
pub struct VecRoundSource {
    rounds: VecDeque<RoundSpec>,
    closed: bool,
}

impl VecRoundSource {
    pub fn new(rounds: impl IntoIterator<Item = RoundSpec>) -> Self {
        Self {
            rounds: rounds.into_iter().collect(),
            closed: false,
        }
    }

    pub fn push(&mut self, spec: RoundSpec) {
        self.rounds.push_back(spec);
    }

    pub fn remaining(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl RoundSource for VecRoundSource {
    fn next_round(&mut self) -> Result<Option<RoundSpec>> {
        if self.closed {
            bail!("Round source is closed");
        }
        Ok(self.rounds.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
