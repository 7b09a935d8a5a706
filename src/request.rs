use serde::Serialize;

use crate::bad_words::BadWordsCache;
use crate::settings::{MAX_OUTPUT_LENGTH, SamplerConfig};
use crate::tier::{self, SubscriptionData};
use crate::tokenizer::{Tokenizer, TokenizerKind, tokenizer_for_model};

const MAX_STOP_SEQUENCES: usize = 1024;

/// How far back to scan the prompt for instruct brackets. The provider claims
/// it scans the last 1000 characters; scan a bit more than that.
const INSTRUCT_SCAN_CHARS: usize = 1500;

const ERATO_PROMPT_PRELUDE: &str = "<|startoftext|><|reserved_special_token81|>";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogitBias {
    pub bias: f64,
    pub ensure_sequence_finish: bool,
    pub generate_once: bool,
    pub sequence: Vec<u32>,
}

/// Generation payload in the provider's wire shape. Token-level fields are
/// omitted entirely when the model has no tokenizer.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub input: String,
    pub model: String,
    pub use_string: bool,
    pub temperature: f64,
    pub max_length: u32,
    pub min_length: u32,
    pub tail_free_sampling: f64,
    pub repetition_penalty: f64,
    pub repetition_penalty_range: u32,
    pub repetition_penalty_slope: f64,
    pub repetition_penalty_frequency: f64,
    pub repetition_penalty_presence: f64,
    pub top_a: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub min_p: f64,
    pub math1_temp: f64,
    pub math1_quad: f64,
    pub math1_quad_entropy_scale: f64,
    pub typical_p: f64,
    pub mirostat_lr: f64,
    pub mirostat_tau: f64,
    pub phrase_rep_pen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<Vec<u32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bad_words_ids: Option<Vec<Vec<u32>>>,
    pub logit_bias_exp: Vec<LogitBias>,
    pub generate_until_sentence: bool,
    pub use_cache: bool,
    pub return_full_text: bool,
    pub prefix: String,
    pub order: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_logprobs: Option<u32>,
    pub streaming: bool,
}

/// Projects the current sampler configuration and a finished prompt into the
/// provider payload. `max_length` is clamped to the tier-derived cap for
/// tier-limited models and to the global output ceiling otherwise.
/// `stopping_strings` come from the embedding application; `num_logprobs` is
/// set when the caller wants token probabilities back.
pub fn build_generate_request(
    prompt: &str,
    config: &SamplerConfig,
    max_length: u32,
    stopping_strings: &[String],
    subscription: Option<&SubscriptionData>,
    num_logprobs: Option<u32>,
    tokenizer: &dyn Tokenizer,
    bad_words: &mut BadWordsCache,
) -> GenerateRequest {
    let is_kayra = config.model.contains("kayra");
    let is_erato = config.model.contains("erato");
    let kind = tokenizer_for_model(&config.model);

    let mut stopping_strings = stopping_strings.to_vec();
    if is_erato {
        stopping_strings = expand_erato_stop_strings(stopping_strings);
    }

    let stop_sequences = (kind != TokenizerKind::None).then(|| {
        stopping_strings
            .iter()
            .take(MAX_STOP_SEQUENCES)
            .map(|s| tokenizer.encode(kind, s))
            .collect()
    });

    let bad_words_ids = (kind != TokenizerKind::None)
        .then(|| bad_words.get_or_parse(&config.banned_tokens, kind, tokenizer));

    let prefix = select_prefix(config, prompt);

    let logit_bias_exp = if kind != TokenizerKind::None {
        calculate_logit_bias(config, kind, tokenizer)
    } else {
        Vec::new()
    };

    let input = if is_erato {
        format!("{ERATO_PROMPT_PRELUDE}{prompt}")
    } else {
        prompt.to_string()
    };

    let adjusted_max_length = if is_kayra || is_erato {
        tier::max_response_tokens(subscription)
    } else {
        MAX_OUTPUT_LENGTH
    };

    GenerateRequest {
        input,
        model: config.model.clone(),
        use_string: true,
        temperature: config.temperature,
        max_length: max_length.min(adjusted_max_length),
        min_length: config.min_length,
        tail_free_sampling: config.tail_free_sampling,
        repetition_penalty: config.repetition_penalty,
        repetition_penalty_range: config.repetition_penalty_range,
        repetition_penalty_slope: config.repetition_penalty_slope,
        repetition_penalty_frequency: config.repetition_penalty_frequency,
        repetition_penalty_presence: config.repetition_penalty_presence,
        top_a: config.top_a,
        top_p: config.top_p,
        top_k: config.top_k,
        min_p: config.min_p,
        math1_temp: config.math1_temp,
        math1_quad: config.math1_quad,
        math1_quad_entropy_scale: config.math1_quad_entropy_scale,
        typical_p: config.typical_p,
        mirostat_lr: config.mirostat_lr,
        mirostat_tau: config.mirostat_tau,
        phrase_rep_pen: config.phrase_rep_pen.clone(),
        stop_sequences,
        bad_words_ids,
        logit_bias_exp,
        generate_until_sentence: true,
        use_cache: false,
        return_full_text: false,
        prefix,
        order: config.order.clone(),
        num_logprobs,
        streaming: config.streaming,
    }
}

/// The llama 3 tokenizer merges sentence-final punctuation into the following
/// newline, so a stop string starting with a newline also has to be matched
/// with the punctuation glued on.
fn expand_erato_stop_strings(mut stopping_strings: Vec<String>) -> Vec<String> {
    const PUNCTUATION: [&str; 12] = [
        ".", "!", "?", "*", "\"", "_", "...", ".\"", "?\"", "!\"", ".*", ")",
    ];
    let mut additional = Vec::new();
    for stop in &stopping_strings {
        if stop.starts_with('\n') {
            for p in PUNCTUATION {
                additional.push(format!("{p}{stop}"));
            }
        }
    }
    stopping_strings.extend(additional);
    stopping_strings
}

/// Overrides the configured prefix with the instruct module when the prompt
/// tail contains instruct brackets. Legacy models only ever get `vanilla`.
fn select_prefix(config: &SamplerConfig, prompt: &str) -> String {
    let is_new_model = ["clio", "kayra", "erato"]
        .iter()
        .any(|m| config.model.contains(m));
    if !is_new_model {
        return "vanilla".to_string();
    }

    let chars: Vec<char> = prompt.chars().collect();
    let tail_start = chars.len().saturating_sub(INSTRUCT_SCAN_CHARS);
    let use_instruct = chars[tail_start..].contains(&'}');
    if use_instruct {
        "special_instruct".to_string()
    } else {
        config.prefix.clone()
    }
}

fn calculate_logit_bias(
    config: &SamplerConfig,
    kind: TokenizerKind,
    tokenizer: &dyn Tokenizer,
) -> Vec<LogitBias> {
    let mut result = Vec::new();
    for entry in &config.logit_bias {
        let text = entry.text.trim();
        if text.is_empty() {
            continue;
        }

        let sequence = if text.starts_with('{') && text.ends_with('}') {
            tokenizer.encode(kind, &text[1..text.len() - 1])
        } else if text.starts_with('[') && text.ends_with(']') {
            match serde_json::from_str::<Vec<u32>>(text) {
                Ok(ids) => ids,
                Err(err) => {
                    log::warn!("Failed to parse logit bias token list {text:?}: {err}");
                    continue;
                }
            }
        } else {
            tokenizer.encode(kind, text)
        };

        if sequence.is_empty() {
            continue;
        }

        result.push(LogitBias {
            bias: entry.value,
            ensure_sequence_finish: false,
            generate_once: false,
            sequence,
        });
    }
    result
}

/// Rewrites an instruction into the provider's instruct format when it is not
/// already bracketed. Square brackets serve a different purpose there and are
/// stripped.
pub fn adjust_instruction_prompt(prompt: &str) -> String {
    let stripped: String = prompt.chars().filter(|c| *c != '[' && *c != ']').collect();
    let stripped = stripped.trim();
    if !stripped.contains("{ ") {
        format!("{{ {stripped} }}")
    } else {
        stripped.to_string()
    }
}
