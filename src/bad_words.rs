use std::collections::HashMap;

use crate::tokenizer::{Tokenizer, TokenizerKind};

/// Parses a banned-token spec into token id sequences. The spec is one entry
/// per line: `{text}` is tokenized verbatim, `[1, 2, 3]` is a raw id list,
/// anything else is expanded into case and leading-space permutations before
/// tokenizing. Malformed id lists are logged and skipped, they never fail the
/// whole spec.
pub fn parse_banned_tokens(
    spec: &str,
    kind: TokenizerKind,
    tokenizer: &dyn Tokenizer,
) -> Vec<Vec<u32>> {
    if kind == TokenizerKind::None {
        return Vec::new();
    }

    let mut result = Vec::new();
    for line in spec.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            let inner = &trimmed[1..trimmed.len() - 1];
            result.push(tokenizer.encode(kind, inner));
        } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
            match serde_json::from_str::<Vec<u32>>(trimmed) {
                Ok(ids) => result.push(ids),
                Err(err) => {
                    log::warn!("Failed to parse bad word token list {trimmed:?}: {err}");
                }
            }
        } else {
            for variant in permutations(trimmed) {
                result.push(tokenizer.encode(kind, &variant));
            }
        }
    }
    result
}

/// Case and leading-space variants of a banned word, deduplicated in order.
pub fn permutations(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    let lower = text.to_lowercase();
    let candidates = [
        text.to_string(),
        format!(" {text}"),
        capitalize_first(text),
        format!(" {}", capitalize_first(text)),
        lower_first(text),
        format!(" {}", lower_first(text)),
        upper.clone(),
        format!(" {upper}"),
        lower.clone(),
        format!(" {lower}"),
    ];

    let mut unique: Vec<String> = Vec::new();
    for candidate in candidates {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse results keyed by (spec, tokenizer kind).
#[derive(Default)]
pub struct BadWordsCache {
    cache: HashMap<(String, TokenizerKind), Vec<Vec<u32>>>,
}

impl BadWordsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(
        &mut self,
        spec: &str,
        kind: TokenizerKind,
        tokenizer: &dyn Tokenizer,
    ) -> Vec<Vec<u32>> {
        if let Some(ids) = self.cache.get(&(spec.to_string(), kind)) {
            log::debug!("Bad words ids cache hit for {spec:?}");
            return ids.clone();
        }
        let ids = parse_banned_tokens(spec, kind, tokenizer);
        self.cache.insert((spec.to_string(), kind), ids.clone());
        ids
    }
}
