use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PREAMBLE: &str = "[ Style: chat, complex, sensory, visceral ]";
pub const DEFAULT_ORDER: [u32; 6] = [1, 5, 0, 2, 3, 4];

/// Hard ceiling on generated tokens for models without a tier-specific cap.
pub const MAX_OUTPUT_LENGTH: u32 = 150;

/// Maps a sampler name to the id the provider expects in the `order` list.
/// Ids 6 and 7 belonged to samplers the provider has since removed.
pub fn sampler_id(name: &str) -> Option<u32> {
    match name {
        "temperature" => Some(0),
        "top_k" => Some(1),
        "top_p" => Some(2),
        "tfs" => Some(3),
        "top_a" => Some(4),
        "typical_p" => Some(5),
        "mirostat" => Some(8),
        "math1" => Some(9),
        "min_p" => Some(10),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogitBiasEntry {
    pub text: String,
    pub value: f64,
}

/// Current sampler parameters for one generation backend. Mutated by preset
/// loads or by whatever settings surface sits on top; passed by reference to
/// the request builder. Numeric fields are sent to the provider as-is, without
/// range validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub temperature: f64,
    pub repetition_penalty: f64,
    pub repetition_penalty_range: u32,
    pub repetition_penalty_slope: f64,
    pub repetition_penalty_frequency: f64,
    pub repetition_penalty_presence: f64,
    pub tail_free_sampling: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub top_a: f64,
    pub typical_p: f64,
    pub min_p: f64,
    pub math1_temp: f64,
    pub math1_quad: f64,
    pub math1_quad_entropy_scale: f64,
    pub min_length: u32,
    pub phrase_rep_pen: String,
    pub mirostat_lr: f64,
    pub mirostat_tau: f64,
    pub model: String,
    pub preset: String,
    pub streaming: bool,
    pub preamble: String,
    pub prefix: String,
    pub banned_tokens: String,
    pub order: Vec<u32>,
    pub logit_bias: Vec<LogitBiasEntry>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            temperature: 1.5,
            repetition_penalty: 2.25,
            repetition_penalty_range: 2048,
            repetition_penalty_slope: 0.09,
            repetition_penalty_frequency: 0.0,
            repetition_penalty_presence: 0.005,
            tail_free_sampling: 0.975,
            top_k: 10,
            top_p: 0.75,
            top_a: 0.08,
            typical_p: 0.975,
            min_p: 0.0,
            math1_temp: 1.0,
            math1_quad: 0.0,
            math1_quad_entropy_scale: 0.0,
            min_length: 1,
            phrase_rep_pen: "off".to_string(),
            mirostat_lr: 1.0,
            mirostat_tau: 0.0,
            model: "clio-v1".to_string(),
            preset: "Talker-Chat-Clio".to_string(),
            streaming: false,
            preamble: DEFAULT_PREAMBLE.to_string(),
            prefix: String::new(),
            banned_tokens: String::new(),
            order: DEFAULT_ORDER.to_vec(),
            logit_bias: Vec::new(),
        }
    }
}

impl SamplerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
