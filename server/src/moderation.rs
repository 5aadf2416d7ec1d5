//! Text admissibility checks for usernames and chat messages.
//!
//! Screening runs in two stages:
//! 1. A lexical pass over the lowercased text. Banned roots match anywhere in
//!    the text, banned words only match a whole token (optionally pluralised),
//!    and `rustrict` flags anything it rates at least [`Type::INAPPROPRIATE`].
//! 2. A leetspeak sweep. Every word-boundary-bounded candidate that contains a
//!    homoglyph (digits, `@`, `$`, `!`, `|`) is decoded and re-run through the
//!    lexical pass. Runs of single-character tokens (`s h i t`, `f.u.c.k`) are
//!    joined into one candidate first.
//!
//! This is a heuristic, not a decoder. Some false positives and negatives are
//! expected.

use rustrict::{Censor, Type};
use shared::RESERVED_USERNAME;

/// Banned substrings, matched anywhere in the lowercased text. Supplements
/// the `rustrict` dictionary with compounds it rates below the threshold.
const DEFAULT_ROOTS: &[&str] = &[
    "fuck", "shit", "cunt", "bitch", "nigger", "nigga", "faggot", "whore", "slut", "asshole",
    "bastard", "pussy", "wank", "twat", "motherf", "cock", "dick", "dumbass", "badass", "jackass",
    "smartass", "penis", "retard",
];

/// Banned tokens, matched only as a whole word.
const DEFAULT_WORDS: &[&str] = &[
    "ass", "arse", "cum", "fag", "tit", "tits", "piss", "prick", "douche", "skank",
];

/// Homoglyph substitutions, in sweep order. `1` and `|` are ambiguous and
/// decode to both `i` and `l`.
const LEET_TABLE: &[(char, &[char])] = &[
    ('1', &['i', 'l']),
    ('!', &['i']),
    ('|', &['l', 'i']),
    ('3', &['e']),
    ('4', &['a']),
    ('@', &['a']),
    ('5', &['s']),
    ('$', &['s']),
    ('6', &['g']),
    ('7', &['t']),
    ('8', &['b']),
    ('0', &['o']),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admissible,
    /// Matched the wordlist directly.
    Profane,
    /// Matched the wordlist only after leetspeak decoding.
    MaskedProfanity,
    /// Username equals the reserved value.
    Reserved,
}

impl Verdict {
    pub fn is_admissible(self) -> bool {
        self == Verdict::Admissible
    }
}

/// Moderator backed by the `rustrict` dictionary plus local wordlists.
#[derive(Debug, Clone)]
pub struct Moderator {
    roots: Vec<String>,
    words: Vec<String>,
    threshold: Type,
}

impl Default for Moderator {
    fn default() -> Self {
        Self::new(DEFAULT_ROOTS, DEFAULT_WORDS)
    }
}

impl Moderator {
    pub fn new(roots: &[&str], words: &[&str]) -> Self {
        Self {
            roots: roots.iter().map(|w| w.to_lowercase()).collect(),
            words: words.iter().map(|w| w.to_lowercase()).collect(),
            threshold: Type::INAPPROPRIATE,
        }
    }

    /// Screens chat text.
    pub fn screen_text(&self, text: &str) -> Verdict {
        let lowered = text.to_lowercase();

        if self.lexical_match(&lowered) {
            return Verdict::Profane;
        }
        if self.leetspeak_match(&lowered) {
            return Verdict::MaskedProfanity;
        }
        Verdict::Admissible
    }

    /// Screens a (trimmed) username. The reserved value is rejected
    /// regardless of wordlist status.
    pub fn screen_username(&self, username: &str) -> Verdict {
        if username == RESERVED_USERNAME {
            return Verdict::Reserved;
        }
        self.screen_text(username)
    }

    fn lexical_match(&self, lowered: &str) -> bool {
        if self.roots.iter().any(|root| lowered.contains(root.as_str())) {
            return true;
        }

        if lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .any(|token| self.is_banned_word(token))
        {
            return true;
        }

        Censor::from_str(lowered).analyze().is(self.threshold)
    }

    fn is_banned_word(&self, token: &str) -> bool {
        self.words.iter().any(|word| {
            token == word
                || token
                    .strip_suffix('s')
                    .map_or(false, |stem| stem == word.as_str())
        })
    }

    fn leetspeak_match(&self, lowered: &str) -> bool {
        candidates(lowered).iter().any(|candidate| {
            decode_variants(candidate)
                .iter()
                .any(|decoded| self.lexical_match(decoded))
        })
    }
}

fn is_leet_symbol(c: char) -> bool {
    LEET_TABLE.iter().any(|(glyph, _)| *glyph == c)
}

/// Splits text into word-boundary-bounded tokens, keeping homoglyphs inside
/// tokens, then adds one joined candidate per run of single-character tokens.
fn candidates(lowered: &str) -> Vec<String> {
    let tokens: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || is_leet_symbol(c)))
        .filter(|token| !token.is_empty())
        .collect();

    let mut candidates: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();

    let mut run = String::new();
    let mut run_len = 0;
    for token in tokens.iter().chain(std::iter::once(&"")) {
        if token.chars().count() == 1 {
            run.push_str(token);
            run_len += 1;
            continue;
        }
        if run_len > 1 {
            candidates.push(std::mem::take(&mut run));
        }
        run.clear();
        run_len = 0;
    }

    candidates
}

/// Applies the substitution table. Ambiguous glyphs fan out into one variant
/// per reading, applied uniformly across the candidate.
fn decode_variants(candidate: &str) -> Vec<String> {
    if !candidate.chars().any(is_leet_symbol) {
        return vec![candidate.to_string()];
    }

    let widest = LEET_TABLE
        .iter()
        .map(|(_, readings)| readings.len())
        .max()
        .unwrap_or(1);

    (0..widest)
        .map(|reading| {
            candidate
                .chars()
                .map(|c| {
                    LEET_TABLE
                        .iter()
                        .find(|(glyph, _)| *glyph == c)
                        .map_or(c, |(_, readings)| {
                            readings[reading.min(readings.len() - 1)]
                        })
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_admissible() {
        let moderator = Moderator::default();
        assert_eq!(moderator.screen_text("hello there"), Verdict::Admissible);
        assert_eq!(moderator.screen_text("meet at 14:30"), Verdict::Admissible);
        assert_eq!(moderator.screen_text("I am 1337"), Verdict::Admissible);
        assert_eq!(moderator.screen_username("alice"), Verdict::Admissible);
    }

    #[test]
    fn test_lexical_match_is_case_insensitive() {
        let moderator = Moderator::default();
        assert_eq!(moderator.screen_text("well SHIT"), Verdict::Profane);
        assert_eq!(moderator.screen_text("BullShitting"), Verdict::Profane);
    }

    #[test]
    fn test_banned_words_match_whole_tokens_only() {
        let moderator = Moderator::default();
        assert_eq!(moderator.screen_text("you ass"), Verdict::Profane);
        assert_eq!(moderator.screen_text("tits"), Verdict::Profane);
        assert_eq!(moderator.screen_text("first class"), Verdict::Admissible);
        assert_eq!(moderator.screen_text("grass is green"), Verdict::Admissible);
    }

    #[test]
    fn test_compound_words_match_roots() {
        let moderator = Moderator::default();
        for name in ["cocksucker", "dumbass", "dickface", "badass", "penis", "retard"] {
            assert_eq!(moderator.screen_username(name), Verdict::Profane, "{}", name);
        }
    }

    #[test]
    fn test_leetspeak_compounds_are_rejected() {
        let moderator = Moderator::default();
        for name in ["c0cksucker", "dumb4ss", "d1ckface", "r3tard", "p3n1s"] {
            assert!(!moderator.screen_username(name).is_admissible(), "{}", name);
        }
    }

    #[test]
    fn test_leetspeak_username_is_rejected() {
        let moderator = Moderator::default();
        for name in ["5h1t", "B1TCH", "@ss"] {
            assert!(!moderator.screen_username(name).is_admissible(), "{}", name);
        }
        assert!(!moderator.screen_text("what the sh!t").is_admissible());
    }

    #[test]
    fn test_masked_local_word_is_found_by_sweep() {
        let moderator = Moderator::new(&["zorblax"], &["frob"]);
        assert_eq!(moderator.screen_text("z0rbl4x"), Verdict::MaskedProfanity);
        assert_eq!(moderator.screen_text("fr0b it"), Verdict::MaskedProfanity);
        assert_eq!(moderator.screen_text("frobnicate"), Verdict::Admissible);
    }

    #[test]
    fn test_ambiguous_one_reads_as_l() {
        let moderator = Moderator::new(&[], &["blarg"]);
        assert_eq!(moderator.screen_text("b1arg"), Verdict::MaskedProfanity);
    }

    #[test]
    fn test_spaced_out_letters_are_joined() {
        let moderator = Moderator::default();
        assert!(!moderator.screen_text("s h i t").is_admissible());
        assert!(!moderator.screen_text("f.u.c.k you").is_admissible());
        assert_eq!(moderator.screen_text("a b c"), Verdict::Admissible);
        let local = Moderator::new(&[], &["frob"]);
        assert_eq!(local.screen_text("f r o b"), Verdict::MaskedProfanity);
    }

    #[test]
    fn test_reserved_username() {
        let moderator = Moderator::default();
        assert_eq!(moderator.screen_username("guest"), Verdict::Reserved);
        // Case-sensitive, like every other username comparison.
        assert_eq!(moderator.screen_username("Guest"), Verdict::Admissible);
        // Only usernames reserve the value.
        assert_eq!(moderator.screen_text("guest"), Verdict::Admissible);
    }

    #[test]
    fn test_candidates_collect_single_letter_runs() {
        let found = candidates("x y z hello q");
        assert!(found.contains(&"xyz".to_string()));
        assert!(found.contains(&"hello".to_string()));
        assert!(!found.contains(&"xyzq".to_string()));
    }

    #[test]
    fn test_decode_variants() {
        assert_eq!(decode_variants("hello"), vec!["hello".to_string()]);
        let variants = decode_variants("5h1t");
        assert!(variants.contains(&"shit".to_string()));
        assert!(variants.contains(&"shlt".to_string()));
    }

    #[test]
    fn test_custom_wordlist() {
        let moderator = Moderator::new(&["zorblax"], &["frob"]);
        assert_eq!(moderator.screen_text("ZORBLAXian"), Verdict::Profane);
        assert_eq!(moderator.screen_text("FROBS"), Verdict::Profane);
        // The dictionary still applies without local lists.
        assert_eq!(moderator.screen_text("fuck"), Verdict::Profane);
    }
}
