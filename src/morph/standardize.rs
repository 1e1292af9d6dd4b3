//! Deterministic standardization of a word's morphemes into a tag sequence.
//!
//! The lexical index stores each sentence as a `normalized_tags` string; a
//! query must be normalized with exactly the same rules to match. Per
//! morpheme:
//!
//! - particles, endings, dependent nouns, auxiliaries: surface form verbatim
//! - nouns: tag + `_O`/`_X` by final-consonant presence
//! - verbs/adjectives: tag + `_O`/`_X` + `_P`/`_N` by vowel harmony
//! - everything else: the tag alone

use super::categories::{is_category, PosCategory};
use super::Word;

/// First Hangul syllable codepoint (가).
const HANGUL_BASE: u32 = 0xAC00;
/// Last Hangul syllable codepoint (힣).
const HANGUL_LAST: u32 = 0xD7A3;
/// Jamo combinations per leading consonant block.
const VOWEL_BLOCK: u32 = 28;
/// Number of medial vowels.
const VOWEL_COUNT: u32 = 21;

fn last_syllable(morph: &str) -> Option<u32> {
    let code = u32::from(morph.chars().last()?);
    (HANGUL_BASE..=HANGUL_LAST).contains(&code).then_some(code)
}

/// Whether the last syllable of `morph` carries a final consonant (받침).
///
/// Characters outside the Hangul syllable range never do.
pub fn has_final_consonant(morph: &str) -> bool {
    match last_syllable(morph) {
        Some(code) => (code - HANGUL_BASE) % VOWEL_BLOCK != 0,
        None => false,
    }
}

/// Whether the last syllable of `morph` has a positive-harmony vowel (ㅏ, ㅗ).
pub fn has_positive_vowel(morph: &str) -> bool {
    match last_syllable(morph) {
        Some(code) => {
            let vowel_idx = ((code - HANGUL_BASE) / VOWEL_BLOCK) % VOWEL_COUNT;
            vowel_idx == 0 || vowel_idx == 4
        }
        None => false,
    }
}

/// Standardize one word into its tag-sequence form.
///
/// Per-morpheme emissions are concatenated without separators. An empty
/// result means the word contributed nothing to the query.
pub fn standardize_word(word: &Word) -> String {
    let mut parts: Vec<String> = Vec::new();

    for morph in &word.morphs {
        if morph.surface.is_empty() {
            continue;
        }
        let tag = morph.tag.as_str();

        if is_category(tag, PosCategory::Particle)
            || is_category(tag, PosCategory::Ending)
            || is_category(tag, PosCategory::DependentNoun)
            || is_category(tag, PosCategory::Auxiliary)
        {
            parts.push(morph.surface.clone());
            continue;
        }

        let is_noun = is_category(tag, PosCategory::Noun);
        let is_predicate =
            is_category(tag, PosCategory::Verb) || is_category(tag, PosCategory::Adjective);

        if is_noun || is_predicate {
            let mut emitted = format!(
                "{tag}{}",
                if has_final_consonant(&morph.surface) {
                    "_O"
                } else {
                    "_X"
                }
            );
            if is_predicate {
                emitted.push_str(if has_positive_vowel(&morph.surface) {
                    "_P"
                } else {
                    "_N"
                });
            }
            parts.push(emitted);
            continue;
        }

        parts.push(tag.to_owned());
    }

    parts.concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::Morpheme;

    fn word(morphs: &[(&str, &str)]) -> Word {
        Word {
            morphs: morphs
                .iter()
                .map(|(surface, tag)| Morpheme {
                    surface: (*surface).to_owned(),
                    tag: (*tag).to_owned(),
                })
                .collect(),
        }
    }

    #[test]
    fn final_consonant_detection() {
        assert!(has_final_consonant("밥"));
        assert!(!has_final_consonant("비"));
        assert!(has_final_consonant("먹"));
    }

    #[test]
    fn non_hangul_never_has_jamo_features() {
        assert!(!has_final_consonant("abc"));
        assert!(!has_positive_vowel("abc"));
        assert!(!has_final_consonant("123"));
        assert!(!has_final_consonant(""));
    }

    #[test]
    fn positive_vowel_detection() {
        assert!(has_positive_vowel("가"));
        assert!(has_positive_vowel("오"));
        assert!(!has_positive_vowel("먹"));
        assert!(!has_positive_vowel("주"));
    }

    #[test]
    fn particles_and_endings_pass_surface_through() {
        let w = word(&[("을", "JKO"), ("다", "EF")]);
        assert_eq!(standardize_word(&w), "을다");
    }

    #[test]
    fn nouns_get_consonant_suffix() {
        assert_eq!(standardize_word(&word(&[("밥", "NNG")])), "NNG_O");
        assert_eq!(standardize_word(&word(&[("비", "NNG")])), "NNG_X");
    }

    #[test]
    fn predicates_get_consonant_and_vowel_suffix() {
        // 먹: final consonant, negative vowel.
        assert_eq!(standardize_word(&word(&[("먹", "VV")])), "VV_O_N");
        // 가: no final consonant, positive vowel.
        assert_eq!(standardize_word(&word(&[("가", "VV")])), "VV_X_P");
        assert_eq!(standardize_word(&word(&[("작", "VA")])), "VA_O_P");
    }

    #[test]
    fn other_tags_emit_tag_alone() {
        let w = word(&[("매우", "MAG"), ("abc", "SL")]);
        assert_eq!(standardize_word(&w), "MAGSL");
    }

    #[test]
    fn empty_morphs_are_skipped() {
        let w = word(&[("", "NNG"), ("을", "JKO")]);
        assert_eq!(standardize_word(&w), "을");
    }

    #[test]
    fn standardization_is_deterministic() {
        let w = word(&[("비빔밥", "NNG"), ("은", "JX"), ("먹", "VV"), ("었", "EP"), ("다", "EF")]);
        let first = standardize_word(&w);
        let second = standardize_word(&w);
        assert_eq!(first, second);
        assert_eq!(first, "NNG_O은VV_O_N었다");
    }
}
