/// Reply classification for a staged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Affirm,
    Deny,
    Neither,
}

pub const AFFIRM_WORDS: &[&str] = &[
    "tak", "yes", "ok", "potwierdź", "potwierdzam", "dawaj", "jasne", "sure", "y",
];

pub const DENY_WORDS: &[&str] = &["nie", "no", "anuluj", "cancel", "stop", "rezygnuję", "n"];

/// Classify a whole message. Only an exact (case-insensitive, trimmed) match
/// against a vocabulary entry counts; "tak, dodaj Ewę" is `Neither`.
pub fn classify(message: &str) -> Confirmation {
    let msg = message.trim().to_lowercase();
    if AFFIRM_WORDS.contains(&msg.as_str()) {
        Confirmation::Affirm
    } else if DENY_WORDS.contains(&msg.as_str()) {
        Confirmation::Deny
    } else {
        Confirmation::Neither
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirm_vocabulary() {
        for word in AFFIRM_WORDS {
            assert_eq!(classify(word), Confirmation::Affirm, "{word}");
            assert_eq!(classify(&format!("  {}\n", word.to_uppercase())), Confirmation::Affirm, "{word}");
        }
    }

    #[test]
    fn deny_vocabulary() {
        for word in DENY_WORDS {
            assert_eq!(classify(word), Confirmation::Deny, "{word}");
            assert_eq!(classify(&format!("\t{}", word.to_uppercase())), Confirmation::Deny, "{word}");
        }
    }

    #[test]
    fn vocabularies_are_disjoint() {
        assert!(AFFIRM_WORDS.iter().all(|w| !DENY_WORDS.contains(w)));
    }

    #[test]
    fn partial_or_embedded_words_are_neither() {
        for msg in ["tak, dodaj Ewę", "taki", "nie wiem", "okej?", "", "yes please", "pomoc"] {
            assert_eq!(classify(msg), Confirmation::Neither, "{msg}");
        }
    }
}
