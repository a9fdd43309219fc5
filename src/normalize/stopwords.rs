//! Stopword filtering.
//!
//! The base list comes from the `stop-words` crate for the configured locale.
//! For Portuguese a fixed set of correspondence function words (greetings,
//! sign-offs, mail jargon) is added on top.

use std::collections::HashSet;

use stop_words::{LANGUAGE, get};
use unicode_normalization::UnicodeNormalization;

/// Supplementary stopwords for Portuguese correspondence.
pub const CORRESPONDENCE_STOPWORDS: &[&str] = &[
    "prezado",
    "prezada",
    "prezados",
    "prezadas",
    "caro",
    "cara",
    "caros",
    "olá",
    "oi",
    "atenciosamente",
    "cordialmente",
    "abraço",
    "abraços",
    "att",
    "obrigado",
    "obrigada",
    "obrigados",
    "grato",
    "grata",
    "favor",
    "gentileza",
    "segue",
    "seguem",
    "email",
    "mail",
    "mensagem",
    "assunto",
    "cc",
    "re",
    "fw",
    "fwd",
    "bom",
    "boa",
    "dia",
    "tarde",
    "noite",
    "senhor",
    "senhora",
    "sr",
    "sra",
    "aqui",
    "ainda",
    "apenas",
    "então",
    "assim",
    "pois",
];

/// A filter for removing stopwords from a token stream.
#[derive(Debug, Clone, Default)]
pub struct StopwordFilter {
    /// Lowercased, NFC-normalized stopwords.
    stopwords: HashSet<String>,
}

impl StopwordFilter {
    /// Build the filter for a locale: base list plus, for Portuguese, the
    /// correspondence supplement.
    ///
    /// Unknown locales fall back to Portuguese, the deployment default.
    pub fn for_locale(locale: &str) -> Self {
        let language = Self::language(locale);
        let portuguese = matches!(language, LANGUAGE::Portuguese);
        let mut filter = Self {
            stopwords: get(language).iter().map(|w| canonical(w)).collect(),
        };
        if portuguese {
            filter.add_stopwords(CORRESPONDENCE_STOPWORDS);
        }
        filter
    }

    /// Whether `locale` resolves to the Portuguese resources. Unknown
    /// locales do, matching the fallback of `for_locale`.
    pub fn resolves_to_portuguese(locale: &str) -> bool {
        matches!(Self::language(locale), LANGUAGE::Portuguese)
    }

    /// Create an empty filter (no filtering).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a filter from a custom list.
    pub fn from_list(words: &[&str]) -> Self {
        Self {
            stopwords: words.iter().map(|w| canonical(w)).collect(),
        }
    }

    /// Add words to the filter.
    pub fn add_stopwords(&mut self, words: &[&str]) {
        for word in words {
            self.stopwords.insert(canonical(word));
        }
    }

    /// Check whether an already-lowercased token is a stopword.
    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Number of stopwords in the filter.
    pub fn len(&self) -> usize {
        self.stopwords.len()
    }

    /// Whether the filter is empty.
    pub fn is_empty(&self) -> bool {
        self.stopwords.is_empty()
    }

    fn language(locale: &str) -> LANGUAGE {
        let primary = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match primary.as_str() {
            "en" | "english" => LANGUAGE::English,
            "es" | "spanish" => LANGUAGE::Spanish,
            "fr" | "french" => LANGUAGE::French,
            "de" | "german" => LANGUAGE::German,
            "it" | "italian" => LANGUAGE::Italian,
            _ => LANGUAGE::Portuguese,
        }
    }
}

/// Lowercase and NFC-compose a word so it compares equal to normalizer output.
fn canonical(word: &str) -> String {
    word.to_lowercase().nfc().collect()
}
