/// Bonus for the 1st, 2nd and 3rd correct group of a round.
pub const CORRECT_GROUP_BONUS: [i32; 3] = [6, 12, 18];
pub const WRONG_PROPOSAL_PENALTY: i32 = 4;
/// The third correct group wins; the fourth is implied.
pub const GROUPS_TO_WIN: u8 = 3;
pub const MAX_MISTAKES: u8 = 4;

pub struct ScoringEngine;

impl ScoringEngine {
    /// Points awarded for the `ordinal`-th correct group (1-based).
    pub fn bonus_for_correct(ordinal: u8) -> i32 {
        match ordinal {
            1..=3 => CORRECT_GROUP_BONUS[usize::from(ordinal - 1)],
            _ => 0,
        }
    }

    /// Score implied by the counters alone.
    pub fn score_for(correct: u8, wrong: u8) -> i32 {
        let bonus: i32 = (1..=correct.min(GROUPS_TO_WIN))
            .map(Self::bonus_for_correct)
            .sum();
        bonus - WRONG_PROPOSAL_PENALTY * i32::from(wrong)
    }
}
