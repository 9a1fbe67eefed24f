use serde::Serialize;
use strsim::generic_levenshtein;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct WordAgreement {
    /// Word insertions, deletions and substitutions between the two readings.
    pub edits: usize,
    pub score: f64,
}

/// Aligns two providers' word sequences for one page.
///
/// Words are compared whole and case-sensitive, in reading order. The score is
/// `1 - edits / longer_len`; pages where neither provider read a word have no
/// agreement.
pub fn word_agreement(left: &[&str], right: &[&str]) -> Option<WordAgreement> {
    let longest = left.len().max(right.len());
    if longest == 0 {
        return None;
    }
    let edits = generic_levenshtein(&left.to_vec(), &right.to_vec());
    Some(WordAgreement {
        edits,
        score: 1.0 - edits as f64 / longest as f64,
    })
}
