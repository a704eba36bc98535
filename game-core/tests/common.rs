#![allow(dead_code)]

use game_core::{GroupSpec, RoundSpec};
use std::io::Write;
use tempfile::NamedTempFile;

pub const THEMES: [&str; 4] = ["Fruit", "Colors", "Metals", "Planets"];

pub const WORDS: [[&str; 4]; 4] = [
    ["apple", "pear", "plum", "fig"],
    ["red", "blue", "green", "teal"],
    ["iron", "gold", "zinc", "lead"],
    ["mars", "venus", "earth", "saturn"],
];

/// Creates a well-formed round with the fixed themes and words
pub fn create_test_spec(game_id: u32) -> RoundSpec {
    RoundSpec {
        game_id,
        groups: THEMES
            .iter()
            .zip(WORDS.iter())
            .map(|(theme, words)| GroupSpec {
                theme: theme.to_string(),
                words: words.iter().map(|w| w.to_string()).collect(),
            })
            .collect(),
    }
}

/// The words of fixture group `index` as owned strings
pub fn group_words(index: usize) -> Vec<String> {
    WORDS[index].iter().map(|w| w.to_string()).collect()
}

/// Writes the given rounds to a temporary JSON file
pub fn write_rounds_file(specs: &[RoundSpec]) -> NamedTempFile {
    let json = serde_json::to_string_pretty(specs).unwrap();
    write_raw_file(&json)
}

pub fn write_raw_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
