//! Canned reply suggestions keyed by classification label.

use std::collections::HashMap;

use rand::seq::SliceRandom;

use crate::classifier::ClassificationResult;

const PRODUTIVO_REPLIES: &[&str] = &[
    "Olá! Recebemos sua solicitação e ela já está em análise. Retornaremos com uma atualização em breve.",
    "Obrigado pelo contato. Sua mensagem foi encaminhada à equipe responsável e responderemos assim que possível.",
    "Agradecemos o envio. Estamos verificando as informações e entraremos em contato com os próximos passos.",
];

const IMPRODUTIVO_REPLIES: &[&str] = &[
    "Muito obrigado pela mensagem! Desejamos um ótimo dia.",
    "Agradecemos o contato e as gentis palavras. Tenha uma excelente semana!",
    "Obrigado por lembrar de nós! Ficamos felizes com a mensagem.",
];

const GENERIC_REPLY: &str = "Recebemos sua mensagem. Obrigado pelo contato!";

/// Picks a reply template for a classified message.
#[derive(Debug, Clone)]
pub struct ReplySuggester {
    templates: HashMap<String, Vec<String>>,
    fallback: String,
}

impl Default for ReplySuggester {
    fn default() -> Self {
        Self::portuguese()
    }
}

impl ReplySuggester {
    /// Templates for the default Portuguese label set.
    pub fn portuguese() -> Self {
        let mut suggester = Self::empty(GENERIC_REPLY);
        suggester.add_templates("Produtivo", PRODUTIVO_REPLIES);
        suggester.add_templates("Improdutivo", IMPRODUTIVO_REPLIES);
        suggester
    }

    /// No per-label templates; every label gets `fallback`.
    pub fn empty(fallback: impl Into<String>) -> Self {
        Self {
            templates: HashMap::new(),
            fallback: fallback.into(),
        }
    }

    pub fn add_templates(&mut self, label: &str, replies: &[&str]) {
        self.templates
            .entry(label.to_string())
            .or_default()
            .extend(replies.iter().map(|r| r.to_string()));
    }

    /// Reply for `result`, or `None` when classification failed.
    pub fn suggest(&self, result: &ClassificationResult) -> Option<String> {
        if result.is_error() {
            return None;
        }
        let reply = self
            .templates
            .get(result.category())
            .and_then(|replies| replies.choose(&mut rand::thread_rng()))
            .unwrap_or(&self.fallback);
        Some(reply.clone())
    }
}
