//! Lemmatization: reducing a token to its dictionary base form.
//!
//! The dictionary lemmatizer is lookup-only: unknown tokens are returned
//! unchanged. Lookup chains are resolved once at construction so that
//! `lemmatize(lemmatize(t)) == lemmatize(t)` for every token.

use std::collections::HashMap;
use std::path::Path;

use unicode_normalization::UnicodeNormalization;

use crate::error::{ConfigError, NormalizeError};

/// Reduces a lowercase token to its lemma.
pub trait Lemmatizer: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Lemma for `token`. Must be stable under re-application.
    fn lemmatize(&self, token: &str) -> Result<String, NormalizeError>;
}

/// Lemmatizer that returns every token unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLemmatizer;

impl Lemmatizer for IdentityLemmatizer {
    fn name(&self) -> &str {
        "identity"
    }

    fn lemmatize(&self, token: &str) -> Result<String, NormalizeError> {
        Ok(token.to_string())
    }
}

/// Table-driven lemmatizer.
#[derive(Debug, Clone, Default)]
pub struct DictionaryLemmatizer {
    /// form → lemma, already resolved to a fixed point; identity pairs removed.
    table: HashMap<String, String>,
}

impl DictionaryLemmatizer {
    /// Built-in Portuguese table, focused on vocabulary common in business mail.
    pub fn portuguese() -> Self {
        Self::from_pairs(PORTUGUESE_LEMMAS.iter().copied())
    }

    /// Build from `(form, lemma)` pairs. Later pairs override earlier ones.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let raw: HashMap<String, String> = pairs
            .into_iter()
            .map(|(form, lemma)| (canonical(form), canonical(lemma)))
            .collect();
        Self {
            table: resolve(&raw),
        }
    }

    /// Load a tab-separated `form<TAB>lemma` file. Blank lines and `#` comments
    /// are skipped.
    pub fn from_tsv_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Resource {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse_tsv(&content).map_err(|reason| ConfigError::Resource {
            path: path.display().to_string(),
            reason,
        })
    }

    /// Parse TSV content. Errors name the offending line.
    pub fn parse_tsv(content: &str) -> Result<Self, String> {
        let mut pairs = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t').map(str::trim);
            let (Some(form), Some(lemma), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(format!("line {}: expected two tab-separated fields", idx + 1));
            };
            for word in [form, lemma] {
                if word.is_empty() || !word.chars().all(char::is_alphabetic) {
                    return Err(format!("line {}: {word:?} is not an alphabetic word", idx + 1));
                }
            }
            pairs.push((form, lemma));
        }
        Ok(Self::from_pairs(pairs))
    }

    /// Number of non-trivial entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Lemmatizer for DictionaryLemmatizer {
    fn name(&self) -> &str {
        "dictionary"
    }

    fn lemmatize(&self, token: &str) -> Result<String, NormalizeError> {
        Ok(self
            .table
            .get(token)
            .cloned()
            .unwrap_or_else(|| token.to_string()))
    }
}

fn canonical(word: &str) -> String {
    word.trim().to_lowercase().nfc().collect()
}

/// Follow every chain to its end. A cycle collapses onto its smallest member,
/// so every cycle member agrees on one representative.
fn resolve(raw: &HashMap<String, String>) -> HashMap<String, String> {
    let mut resolved = HashMap::with_capacity(raw.len());
    for key in raw.keys() {
        let mut path: Vec<&str> = vec![key.as_str()];
        let mut current = key.as_str();
        let lemma = loop {
            match raw.get(current) {
                None => break current,
                Some(next) => {
                    if let Some(pos) = path.iter().position(|p| *p == next.as_str()) {
                        break path[pos..].iter().min().copied().unwrap_or(current);
                    }
                    path.push(next.as_str());
                    current = next.as_str();
                }
            }
        };
        if lemma != key.as_str() {
            resolved.insert(key.clone(), lemma.to_string());
        }
    }
    resolved
}

/// Built-in Portuguese form → lemma pairs.
const PORTUGUESE_LEMMAS: &[(&str, &str)] = &[
    // solicitar
    ("solicito", "solicitar"),
    ("solicitamos", "solicitar"),
    ("solicitei", "solicitar"),
    ("solicitou", "solicitar"),
    ("solicitado", "solicitar"),
    ("solicitada", "solicitar"),
    ("solicitados", "solicitar"),
    ("solicitadas", "solicitar"),
    ("solicitando", "solicitar"),
    ("solicitações", "solicitação"),
    // enviar
    ("envio", "enviar"),
    ("enviei", "enviar"),
    ("enviamos", "enviar"),
    ("enviou", "enviar"),
    ("enviado", "enviar"),
    ("enviada", "enviar"),
    ("enviados", "enviar"),
    ("enviadas", "enviar"),
    ("enviando", "enviar"),
    // receber
    ("recebi", "receber"),
    ("recebemos", "receber"),
    ("recebeu", "receber"),
    ("recebido", "receber"),
    ("recebida", "receber"),
    ("recebidos", "receber"),
    ("recebidas", "receber"),
    // precisar
    ("preciso", "precisar"),
    ("precisamos", "precisar"),
    ("precisando", "precisar"),
    ("precisei", "precisar"),
    // aguardar
    ("aguardo", "aguardar"),
    ("aguardamos", "aguardar"),
    ("aguardando", "aguardar"),
    // verificar
    ("verifiquei", "verificar"),
    ("verificamos", "verificar"),
    ("verificado", "verificar"),
    ("verificada", "verificar"),
    ("verificando", "verificar"),
    // confirmar
    ("confirmo", "confirmar"),
    ("confirmamos", "confirmar"),
    ("confirmado", "confirmar"),
    ("confirmada", "confirmar"),
    ("confirmei", "confirmar"),
    // atualizar
    ("atualizado", "atualizar"),
    ("atualizada", "atualizar"),
    ("atualizamos", "atualizar"),
    ("atualizei", "atualizar"),
    ("atualizações", "atualização"),
    // pagar
    ("paguei", "pagar"),
    ("pagamos", "pagar"),
    ("pagou", "pagar"),
    ("pagos", "pagar"),
    ("pagas", "pagar"),
    ("pagamentos", "pagamento"),
    // agradecer
    ("agradeço", "agradecer"),
    ("agradecemos", "agradecer"),
    ("agradecido", "agradecer"),
    ("agradecida", "agradecer"),
    // desejar
    ("desejo", "desejar"),
    ("desejamos", "desejar"),
    ("desejando", "desejar"),
    // resolver
    ("resolvi", "resolver"),
    ("resolvemos", "resolver"),
    ("resolvido", "resolver"),
    ("resolvida", "resolver"),
    // analisar
    ("analisei", "analisar"),
    ("analisamos", "analisar"),
    ("analisado", "analisar"),
    ("analisada", "analisar"),
    ("analisando", "analisar"),
    // plural nouns
    ("pedidos", "pedido"),
    ("documentos", "documento"),
    ("arquivos", "arquivo"),
    ("anexos", "anexo"),
    ("contratos", "contrato"),
    ("faturas", "fatura"),
    ("boletos", "boleto"),
    ("notas", "nota"),
    ("reuniões", "reunião"),
    ("problemas", "problema"),
    ("erros", "erro"),
    ("sistemas", "sistema"),
    ("clientes", "cliente"),
    ("informações", "informação"),
    ("dúvidas", "dúvida"),
    ("relatórios", "relatório"),
    ("prazos", "prazo"),
    ("projetos", "projeto"),
    ("processos", "processo"),
    ("chamados", "chamado"),
    ("tickets", "ticket"),
    ("contas", "conta"),
    ("acessos", "acesso"),
    ("senhas", "senha"),
    ("usuários", "usuário"),
    ("propostas", "proposta"),
    ("orçamentos", "orçamento"),
    ("produtos", "produto"),
    ("serviços", "serviço"),
    ("festas", "festa"),
    ("felicitações", "felicitação"),
    ("cumprimentos", "cumprimento"),
    ("votos", "voto"),
    ("parceiros", "parceiro"),
    ("equipes", "equipe"),
];
