//! Text normalization: raw correspondence text to a canonical token stream.
//!
//! Steps, in order:
//! 1. Lowercase, then NFC-compose
//! 2. Strip URLs (`http://`, `https://`, `www.`)
//! 3. Strip email addresses
//! 4. Replace punctuation and symbols with spaces (diacritics kept)
//! 5. Strip digit sequences
//! 6. Segment into words (Unicode word boundaries)
//! 7. Drop stopwords and tokens of two characters or fewer, lemmatize the rest
//! 8. Join with single spaces
//!
//! The output is stable under re-normalization.

pub mod lemma;
pub mod stopwords;

pub use lemma::{DictionaryLemmatizer, IdentityLemmatizer, Lemmatizer};
pub use stopwords::{CORRESPONDENCE_STOPWORDS, StopwordFilter};

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, error, warn};
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::AppConfig;
use crate::error::{ConfigError, NormalizeError};

pub(crate) static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://|www\.)\S+").unwrap());
pub(crate) static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+").unwrap());
/// Anything that is not a word character, whitespace or an accented Latin
/// letter; connector punctuation (`_`) is treated as a separator too.
static SYMBOL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\sáàâãäéèêëíìîïóòôõöúùûüçñ]|\p{Pc}").unwrap()
});
static DIGITS_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Tokens must be longer than this many characters.
const MIN_TOKEN_CHARS: usize = 2;

/// Deterministic text normalizer. Cheap to share behind an `Arc`.
pub struct Normalizer {
    stopwords: StopwordFilter,
    lemmatizer: Arc<dyn Lemmatizer>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("stopwords", &self.stopwords.len())
            .field("lemmatizer", &self.lemmatizer.name())
            .finish()
    }
}

impl Normalizer {
    /// Create a normalizer from explicit resources.
    pub fn new(stopwords: StopwordFilter, lemmatizer: Arc<dyn Lemmatizer>) -> Self {
        Self {
            stopwords,
            lemmatizer,
        }
    }

    /// Built-in resources for a locale. Only Portuguese ships a lemma table;
    /// other known locales lemmatize to the identity. Unknown locales get the
    /// Portuguese stopwords and lemmas together.
    pub fn for_locale(locale: &str) -> Self {
        let portuguese = StopwordFilter::resolves_to_portuguese(locale);
        let lemmatizer: Arc<dyn Lemmatizer> = if portuguese {
            Arc::new(DictionaryLemmatizer::portuguese())
        } else {
            Arc::new(IdentityLemmatizer)
        };
        Self::new(StopwordFilter::for_locale(locale), lemmatizer)
    }

    /// Resources from configuration, honoring a lemma table override.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let Some(ref path) = config.lemma_table else {
            return Ok(Self::for_locale(&config.locale));
        };
        let table = DictionaryLemmatizer::from_tsv_file(path)?;
        debug!(path = %path.display(), entries = table.len(), "Loaded lemma table");
        Ok(Self::new(
            StopwordFilter::for_locale(&config.locale),
            Arc::new(table),
        ))
    }

    /// Normalize `text`. Never fails: an internal fault yields empty text.
    pub fn normalize(&self, text: &str) -> String {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_normalize(text))) {
            Ok(Ok(normalized)) => normalized,
            Ok(Err(e)) => {
                warn!(error = %e, "Normalization failed, returning empty text");
                String::new()
            }
            Err(_) => {
                error!(
                    lemmatizer = self.lemmatizer.name(),
                    "Normalization panicked, returning empty text"
                );
                String::new()
            }
        }
    }

    /// Normalize `text`, surfacing lemmatizer faults.
    pub fn try_normalize(&self, text: &str) -> Result<String, NormalizeError> {
        Ok(self.tokens(text)?.join(" "))
    }

    /// Surviving, lemmatized tokens in input order.
    pub fn tokens(&self, text: &str) -> Result<Vec<String>, NormalizeError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let cleaned = clean(text);
        let mut tokens = Vec::new();
        for word in cleaned.unicode_words() {
            if !self.is_feature(word) {
                continue;
            }
            let lemma = self.lemmatizer.lemmatize(word)?;
            // The lemma must itself survive filtering, or a second pass would drop it.
            if self.is_feature(&lemma) {
                tokens.push(lemma);
            }
        }
        Ok(tokens)
    }

    fn is_feature(&self, token: &str) -> bool {
        token.chars().count() > MIN_TOKEN_CHARS
            && token.chars().all(char::is_alphabetic)
            && !self.stopwords.is_stopword(token)
    }
}

/// Steps 1–5: case folding and removal of URLs, emails, symbols and digits.
pub fn clean(text: &str) -> String {
    let lowered: String = text.to_lowercase().nfc().collect();
    let text = URL_REGEX.replace_all(&lowered, "");
    let text = EMAIL_REGEX.replace_all(&text, "");
    let text = SYMBOL_REGEX.replace_all(&text, " ");
    let text = DIGITS_REGEX.replace_all(&text, "");
    // Dropping digits can bring a base letter and a combining mark together.
    text.nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    static PORTUGUESE: LazyLock<Normalizer> = LazyLock::new(|| Normalizer::for_locale("pt"));

    fn small_normalizer(stopwords: &[&str]) -> Normalizer {
        Normalizer::new(
            StopwordFilter::from_list(stopwords),
            Arc::new(DictionaryLemmatizer::portuguese()),
        )
    }

    struct FailingLemmatizer;

    impl Lemmatizer for FailingLemmatizer {
        fn name(&self) -> &str {
            "failing"
        }
        fn lemmatize(&self, token: &str) -> Result<String, NormalizeError> {
            Err(NormalizeError::Lemmatizer {
                token: token.to_string(),
                reason: "table corrupted".into(),
            })
        }
    }

    struct PanickingLemmatizer;

    impl Lemmatizer for PanickingLemmatizer {
        fn name(&self) -> &str {
            "panicking"
        }
        fn lemmatize(&self, _token: &str) -> Result<String, NormalizeError> {
            panic!("lemmatizer blew up")
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(PORTUGUESE.normalize(""), "");
        assert_eq!(PORTUGUESE.normalize("   \n\t "), "");
    }

    #[test]
    fn strips_urls_emails_digits_and_punctuation() {
        let normalizer = small_normalizer(&["olá", "as", "para", "e"]);
        let out = normalizer.normalize(
            "Olá Maria! Enviei as faturas 2023 para www.empresa.com.br e para joao@empresa.com.",
        );
        assert_eq!(out, "maria enviar fatura");
    }

    #[test]
    fn visit_example_has_no_url_or_digits() {
        let out = PORTUGUESE.normalize("Visite http://x.com hoje, já!! 123");
        assert!(!out.contains("http"));
        assert!(!out.contains("x.com"));
        assert!(!out.chars().any(|c| c.is_ascii_digit()));
        assert!(!out.split(' ').any(|t| t == "já"));
    }

    #[test]
    fn preserves_diacritics() {
        let normalizer = Normalizer::new(StopwordFilter::empty(), Arc::new(IdentityLemmatizer));
        assert_eq!(
            normalizer.normalize("Reunião AMANHÃ às 10h, ação!"),
            "reunião amanhã ação"
        );
    }

    #[test]
    fn composes_decomposed_input() {
        let normalizer = Normalizer::new(StopwordFilter::empty(), Arc::new(IdentityLemmatizer));
        assert_eq!(normalizer.normalize("Reunia\u{303}o"), "reunião");
    }

    #[test]
    fn underscores_split_words() {
        let normalizer = Normalizer::new(StopwordFilter::empty(), Arc::new(IdentityLemmatizer));
        assert_eq!(normalizer.normalize("relatorio_final.pdf"), "relatorio final pdf");
    }

    #[test]
    fn digits_inside_words_are_removed() {
        let normalizer = Normalizer::new(StopwordFilter::empty(), Arc::new(IdentityLemmatizer));
        assert_eq!(normalizer.normalize("abc123def"), "abcdef");
    }

    #[test]
    fn short_tokens_are_dropped() {
        let normalizer = Normalizer::new(StopwordFilter::empty(), Arc::new(IdentityLemmatizer));
        assert_eq!(normalizer.normalize("eu vi o mar azul"), "mar azul");
    }

    #[test]
    fn correspondence_stopwords_are_dropped() {
        let out = PORTUGUESE.normalize("Prezados, segue o contrato. Atenciosamente, Ana");
        for word in ["prezados", "segue", "atenciosamente"] {
            assert!(!out.split(' ').any(|t| t == word), "{word} survived in {out:?}");
        }
        assert!(out.contains("contrato"));
    }

    #[test]
    fn lemma_that_is_a_stopword_is_dropped() {
        let normalizer = Normalizer::new(
            StopwordFilter::from_list(&["fazer"]),
            Arc::new(DictionaryLemmatizer::from_pairs([("fazemos", "fazer")])),
        );
        assert_eq!(normalizer.normalize("fazemos entregas"), "entregas");
    }

    #[test]
    fn lemmatizer_error_fails_closed() {
        let normalizer = Normalizer::new(StopwordFilter::empty(), Arc::new(FailingLemmatizer));
        assert_eq!(normalizer.normalize("texto qualquer"), "");
        assert!(normalizer.try_normalize("texto qualquer").is_err());
    }

    #[test]
    fn lemmatizer_panic_fails_closed() {
        let normalizer = Normalizer::new(StopwordFilter::empty(), Arc::new(PanickingLemmatizer));
        assert_eq!(normalizer.normalize("texto qualquer"), "");
    }

    #[test]
    fn locale_selects_lemmatizer() {
        assert_eq!(Normalizer::for_locale("pt-BR").lemmatizer.name(), "dictionary");
        assert_eq!(Normalizer::for_locale("en").lemmatizer.name(), "identity");
    }

    #[test]
    fn unknown_locale_falls_back_to_portuguese_consistently() {
        let normalizer = Normalizer::for_locale("xx");
        assert_eq!(normalizer.lemmatizer.name(), "dictionary");
        assert!(normalizer.stopwords.is_stopword("atenciosamente"));
        assert_eq!(normalizer.normalize("Atenciosamente, faturas"), "fatura");
    }

    #[test]
    fn from_config_uses_lemma_table_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lemmas.tsv");
        std::fs::write(&path, "cachorros\tcachorro\n").unwrap();

        let config = AppConfig {
            lemma_table: Some(path),
            ..AppConfig::default()
        };
        let normalizer = Normalizer::from_config(&config).unwrap();
        assert_eq!(normalizer.normalize("cachorros"), "cachorro");
        // The override replaces the built-in table.
        assert_eq!(normalizer.normalize("faturas"), "faturas");
    }

    #[test]
    fn from_config_reports_missing_lemma_table() {
        let config = AppConfig {
            lemma_table: Some("/nonexistent/lemmas.tsv".into()),
            ..AppConfig::default()
        };
        let err = Normalizer::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Resource { ref path, .. } if path.ends_with("lemmas.tsv")));
    }

    fn correspondence_text() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            Just("Prezados".to_string()),
            Just("solicitações".to_string()),
            Just("REUNIÕES".to_string()),
            Just("https://example.com/a?b=1".to_string()),
            Just("www.site.com.br".to_string()),
            Just("fulano@empresa.com".to_string()),
            Just("!!".to_string()),
            Just("já".to_string()),
            "[0-9]{1,6}",
            "[a-zA-Záéíóúãõç_]{1,12}",
            "\\PC{1,8}",
        ];
        prop::collection::vec(piece, 0..24).prop_map(|pieces| pieces.join(" "))
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(text in correspondence_text()) {
            let once = PORTUGUESE.normalize(&text);
            prop_assert_eq!(PORTUGUESE.normalize(&once), once);
        }

        #[test]
        fn normalize_is_idempotent_on_arbitrary_text(text in "\\PC{0,120}") {
            let once = PORTUGUESE.normalize(&text);
            prop_assert_eq!(PORTUGUESE.normalize(&once), once);
        }

        #[test]
        fn output_tokens_are_clean(text in correspondence_text()) {
            let out = PORTUGUESE.normalize(&text);
            prop_assert!(!DIGITS_REGEX.is_match(&out));
            prop_assert!(!URL_REGEX.is_match(&out));
            prop_assert!(!EMAIL_REGEX.is_match(&out));
            for token in out.split_whitespace() {
                prop_assert!(token.chars().count() > MIN_TOKEN_CHARS);
                prop_assert!(!PORTUGUESE.stopwords.is_stopword(token));
                prop_assert!(token.chars().all(char::is_alphabetic));
            }
        }
    }
}
