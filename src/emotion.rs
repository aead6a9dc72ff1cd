use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]").expect("valid regex");
}

/// Classification outcome returned by `/predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmotionLabel {
    Furia,
    Desagrado,
    Temor,
    Alegria,
    Tristeza,
    /// Upstream answered with something outside the five canonical labels
    Desconocida,
}

impl EmotionLabel {
    pub const CANONICAL: [EmotionLabel; 5] = [
        EmotionLabel::Furia,
        EmotionLabel::Desagrado,
        EmotionLabel::Temor,
        EmotionLabel::Alegria,
        EmotionLabel::Tristeza,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Furia => "Furia",
            Self::Desagrado => "Desagrado",
            Self::Temor => "Temor",
            Self::Alegria => "Alegria",
            Self::Tristeza => "Tristeza",
            Self::Desconocida => "Desconocida",
        }
    }

    /// Maps free text from the vision model onto a label. Anything that does not
    /// normalize to exactly one canonical label becomes `Desconocida`.
    pub fn from_model_output(raw: &str) -> Self {
        let cleaned = normalize(raw);
        Self::CANONICAL
            .into_iter()
            .find(|label| label.as_str() == cleaned)
            .unwrap_or(Self::Desconocida)
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strips diacritics and punctuation, then capitalizes: `"Alegría!!"` becomes `"Alegria"`.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    // NFD splits accented letters into base letter + combining mark; marks are non-ASCII
    let ascii: String = raw.nfd().filter(char::is_ascii).collect();
    let lowered = NON_WORD.replace_all(&ascii, "").trim().to_lowercase();

    let mut chars = lowered.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
