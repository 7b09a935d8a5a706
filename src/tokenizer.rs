/// Which tokenizer a model expects. `None` means token-level request fields
/// (stop sequences, banned ids, logit bias) cannot be produced for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerKind {
    Nerd,
    Nerd2,
    Llama3,
    None,
}

pub fn tokenizer_for_model(model: &str) -> TokenizerKind {
    if model.contains("clio") {
        TokenizerKind::Nerd
    } else if model.contains("kayra") {
        TokenizerKind::Nerd2
    } else if model.contains("erato") {
        TokenizerKind::Llama3
    } else {
        TokenizerKind::None
    }
}

/// Text-to-token-id encoding, provided by the embedding application. The
/// request builder only ever calls this for models whose tokenizer kind is
/// not `None`.
pub trait Tokenizer {
    fn encode(&self, kind: TokenizerKind, text: &str) -> Vec<u32>;
}

/// Tokenizer that encodes nothing. Useful when no local tokenizer data is
/// available; token-level fields simply come out empty.
pub struct NullTokenizer;

impl Tokenizer for NullTokenizer {
    fn encode(&self, _kind: TokenizerKind, _text: &str) -> Vec<u32> {
        Vec::new()
    }
}
