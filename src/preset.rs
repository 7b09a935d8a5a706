use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::settings::{DEFAULT_ORDER, DEFAULT_PREAMBLE, LogitBiasEntry, SamplerConfig, sampler_id};

/// Named immutable snapshot of sampler settings. Fields absent from the
/// stored preset either keep the current config value or fall back to a
/// documented default when applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub max_context: Option<u32>,
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    pub temperature: Option<f64>,
    pub repetition_penalty: Option<f64>,
    pub repetition_penalty_range: Option<u32>,
    pub repetition_penalty_slope: Option<f64>,
    pub repetition_penalty_frequency: Option<f64>,
    pub repetition_penalty_presence: Option<f64>,
    pub tail_free_sampling: Option<f64>,
    pub top_k: Option<u32>,
    pub top_p: Option<f64>,
    pub top_a: Option<f64>,
    pub typical_p: Option<f64>,
    pub min_p: Option<f64>,
    pub phrase_rep_pen: Option<String>,
    pub mirostat_lr: Option<f64>,
    pub mirostat_tau: Option<f64>,
    pub math1_temp: Option<f64>,
    pub math1_quad: Option<f64>,
    pub math1_quad_entropy_scale: Option<f64>,
    pub prefix: Option<String>,
    pub preamble: Option<String>,
    pub banned_tokens: Option<String>,
    pub order: Option<Vec<u32>>,
    pub logit_bias: Option<Vec<LogitBiasEntry>>,
}

impl Preset {
    /// Overwrites the matching config fields. Fields with a documented
    /// fallback always overwrite; the rest only when the preset carries them.
    pub fn apply(&self, config: &mut SamplerConfig) {
        macro_rules! set {
            ($field:ident) => {
                if let Some(value) = self.$field.clone() {
                    config.$field = value;
                }
            };
        }
        set!(temperature);
        set!(repetition_penalty);
        set!(repetition_penalty_range);
        set!(repetition_penalty_slope);
        set!(repetition_penalty_frequency);
        set!(repetition_penalty_presence);
        set!(tail_free_sampling);
        set!(top_k);
        set!(top_p);
        set!(top_a);
        set!(typical_p);
        set!(min_length);
        set!(phrase_rep_pen);
        set!(mirostat_lr);
        set!(mirostat_tau);
        set!(prefix);

        config.banned_tokens = self.banned_tokens.clone().unwrap_or_default();
        config.order = self.order.clone().unwrap_or_else(|| DEFAULT_ORDER.to_vec());
        config.logit_bias = self.logit_bias.clone().unwrap_or_default();
        config.preamble = self
            .preamble
            .clone()
            .unwrap_or_else(|| DEFAULT_PREAMBLE.to_string());
        config.min_p = self.min_p.unwrap_or(0.0);
        config.math1_temp = self.math1_temp.unwrap_or(1.0);
        config.math1_quad = self.math1_quad.unwrap_or(0.0);
        config.math1_quad_entropy_scale = self.math1_quad_entropy_scale.unwrap_or(0.0);
    }

    /// Converts a provider-native preset file (presetVersion 3) into the
    /// internal shape. Returns `None` when the value is not such a file.
    /// Order entries are kept only for enabled, still-supported samplers.
    pub fn from_native(data: &Value) -> Option<Preset> {
        if data.get("presetVersion").and_then(Value::as_i64) != Some(3) {
            return None;
        }
        let parameters = data.get("parameters")?.as_object()?;

        let order = parameters.get("order").and_then(Value::as_array).map(|entries| {
            entries
                .iter()
                .filter(|e| e.get("enabled").and_then(Value::as_bool) == Some(true))
                .filter_map(|e| e.get("id").and_then(Value::as_str))
                .filter_map(sampler_id)
                .collect::<Vec<u32>>()
        });

        // The native order shape is incompatible with the internal one and is
        // converted above.
        let mut parameters = parameters.clone();
        parameters.remove("order");
        parameters.remove("logit_bias");

        let mut preset: Preset = match serde_json::from_value(Value::Object(parameters)) {
            Ok(preset) => preset,
            Err(err) => {
                log::warn!("Unusable native preset parameters: {err}");
                Preset::default()
            }
        };
        preset.max_context = Some(8000);
        preset.order = Some(order.unwrap_or_else(|| DEFAULT_ORDER.to_vec()));
        Some(preset)
    }
}

/// Presets loaded from a directory of JSON files, keyed by file stem.
/// Provider-native files are converted on load.
#[derive(Debug, Default)]
pub struct PresetStore {
    entries: Vec<(String, Preset)>,
}

impl PresetStore {
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("Reading presets from {dir:?}"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = fs::read_to_string(&path)?;
            let value: Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(err) => {
                    log::warn!("Skipping unreadable preset {path:?}: {err}");
                    continue;
                }
            };
            let preset = match Preset::from_native(&value) {
                Some(preset) => preset,
                None => serde_json::from_value(value)
                    .with_context(|| format!("Parsing preset {path:?}"))?,
            };
            entries.push((name.to_string(), preset));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(PresetStore { entries })
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, preset)| preset)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

/// Preset to switch to when the model changes.
pub fn default_preset_for_model(model: &str) -> Option<&'static str> {
    match model {
        "clio-v1" => Some("Talker-Chat-Clio"),
        "kayra-v1" => Some("Carefree-Kayra"),
        "llama-3-erato-v1" => Some("Erato-Dragonfruit"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_overwrites_and_falls_back() {
        let mut config = SamplerConfig {
            temperature: 0.5,
            banned_tokens: "junk".to_string(),
            min_p: 0.2,
            ..Default::default()
        };
        let preset = Preset {
            temperature: Some(1.1),
            top_k: Some(50),
            ..Default::default()
        };
        preset.apply(&mut config);

        assert_eq!(config.temperature, 1.1);
        assert_eq!(config.top_k, 50);
        // Fallback fields reset even when the preset omits them.
        assert_eq!(config.banned_tokens, "");
        assert_eq!(config.min_p, 0.0);
        assert_eq!(config.order, DEFAULT_ORDER.to_vec());
        assert_eq!(config.preamble, DEFAULT_PREAMBLE);
    }

    #[test]
    fn native_preset_conversion_filters_order() {
        let native = json!({
            "presetVersion": 3,
            "parameters": {
                "temperature": 1.25,
                "top_k": 25,
                "order": [
                    {"id": "temperature", "enabled": true},
                    {"id": "top_k", "enabled": false},
                    {"id": "cfg", "enabled": true},
                    {"id": "min_p", "enabled": true},
                ],
            },
        });
        let preset = Preset::from_native(&native).unwrap();
        assert_eq!(preset.temperature, Some(1.25));
        assert_eq!(preset.max_context, Some(8000));
        // Disabled and unknown samplers are dropped.
        assert_eq!(preset.order, Some(vec![0, 10]));
    }

    #[test]
    fn non_native_values_are_rejected() {
        assert!(Preset::from_native(&json!({"temperature": 1.0})).is_none());
        assert!(Preset::from_native(&json!({"presetVersion": 2, "parameters": {}})).is_none());
    }

    #[test]
    fn default_presets_per_model() {
        assert_eq!(default_preset_for_model("clio-v1"), Some("Talker-Chat-Clio"));
        assert_eq!(default_preset_for_model("kayra-v1"), Some("Carefree-Kayra"));
        assert_eq!(
            default_preset_for_model("llama-3-erato-v1"),
            Some("Erato-Dragonfruit")
        );
        assert_eq!(default_preset_for_model("euterpe-v2"), None);
    }
}
