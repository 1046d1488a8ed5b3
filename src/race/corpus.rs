//! Fixed corpus of practice passages for races

use rand::seq::SliceRandom;

/// Practice passages a new room draws from, uniformly at random
pub const PASSAGES: &[&str] = &[
    "The quick brown fox jumps over the lazy dog. Typing races are a fun way to \
     improve your typing skills while competing with others.",
    "In the world of competitive typing, speed and accuracy are the keys to \
     success. Practice makes perfect, so keep typing!",
    "Programming requires fast typing skills. The more you practice, the better \
     you become at writing code efficiently.",
    "Typing games are not just fun, they help improve your muscle memory and \
     increase your words per minute over time.",
    "The art of typing quickly comes from consistent practice and proper finger \
     placement on the keyboard.",
];

/// Pick a passage for a new race
pub fn random_passage() -> &'static str {
    PASSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PASSAGES[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_passage_comes_from_corpus() {
        for _ in 0..32 {
            let passage = random_passage();
            assert!(PASSAGES.contains(&passage));
        }
    }

    #[test]
    fn test_corpus_is_non_trivial() {
        assert!(!PASSAGES.is_empty());
        assert!(PASSAGES.iter().all(|p| p.len() > 40));
    }
}
