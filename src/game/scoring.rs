use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Per-round time budget. Shared by the scorer and the scheduler; the
/// deadline timer and the score decay must count down from the same
/// number or timeouts and scores desynchronize.
pub const ROUND_DURATION_MS: u64 = 30_000;

/// Interval of the progressive-reveal ticker.
pub const REVEAL_TICK_MS: u64 = 500;

/// Guesses shorter than this (after normalization) never match, so a
/// single letter cannot score as a substring hit.
const MIN_GUESS_LEN: usize = 3;

/// Maximum edit distance still counted as a fuzzy match.
const FUZZY_MAX_DISTANCE: usize = 3;

/// How a guess relates to the target name, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    Exact,
    Fuzzy,
    Substring,
    NoMatch,
}

impl MatchKind {
    pub fn is_match(&self) -> bool {
        !matches!(self, MatchKind::NoMatch)
    }

    fn multiplier(&self) -> f64 {
        match self {
            MatchKind::Exact => 1.0,
            MatchKind::Fuzzy => 0.8,
            MatchKind::Substring => 0.5,
            MatchKind::NoMatch => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessEvaluation {
    pub kind: MatchKind,
    pub points: u32,
}

/// Unicode-decompose, strip diacritics, lowercase, trim.
///
/// "Évoli " and "evoli" normalize to the same string, so accents in card
/// names never cost a player the match.
pub fn normalize(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Classic DP edit distance: insertion, deletion, substitution each cost 1.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            let insertion = curr[j] + 1;
            let deletion = prev[j + 1] + 1;
            curr[j + 1] = substitution.min(insertion).min(deletion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Classifies a raw guess against the target card name.
///
/// Pure: same inputs always produce the same classification.
pub fn classify(raw_guess: &str, target_name: &str) -> MatchKind {
    let guess = normalize(raw_guess);
    let target = normalize(target_name);

    if guess.chars().count() < MIN_GUESS_LEN {
        return MatchKind::NoMatch;
    }

    if guess == target {
        MatchKind::Exact
    } else if edit_distance(&guess, &target) <= FUZZY_MAX_DISTANCE {
        MatchKind::Fuzzy
    } else if target.contains(&guess) {
        MatchKind::Substring
    } else {
        MatchKind::NoMatch
    }
}

/// Points for a classified guess at the given elapsed time.
///
/// Base value is the time remaining in the round, floored at zero, scaled
/// by the match-kind multiplier and floored to an integer.
pub fn score(kind: MatchKind, elapsed_millis: u64) -> u32 {
    let remaining = ROUND_DURATION_MS.saturating_sub(elapsed_millis);
    (remaining as f64 * kind.multiplier()).floor() as u32
}

/// Full evaluation of one guess: classification plus point value.
pub fn evaluate_guess(raw_guess: &str, target_name: &str, elapsed_millis: u64) -> GuessEvaluation {
    let kind = classify(raw_guess, target_name);
    GuessEvaluation {
        kind,
        points: score(kind, elapsed_millis),
    }
}
