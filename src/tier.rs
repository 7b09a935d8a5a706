use serde::Deserialize;

use crate::settings::MAX_OUTPUT_LENGTH;

/// Status string reported when no subscription data could be fetched.
pub const NO_CONNECTION: &str = "no_connection";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainingSteps {
    #[serde(rename = "fixedTrainingStepsLeft", default)]
    pub fixed_training_steps_left: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Perks {
    #[serde(rename = "unlimitedImageGeneration", default)]
    pub unlimited_image_generation: bool,
}

/// Subscription record returned by the provider's status endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionData {
    pub tier: Option<u8>,
    #[serde(rename = "trainingStepsLeft")]
    pub training_steps_left: Option<TrainingSteps>,
    pub perks: Option<Perks>,
}

pub fn tier_name(data: Option<&SubscriptionData>) -> &'static str {
    match data.and_then(|d| d.tier) {
        Some(0) => "Paper",
        Some(1) => "Tablet",
        Some(2) => "Scroll",
        Some(3) => "Opus",
        _ => NO_CONNECTION,
    }
}

/// Context window granted by the subscription tier. `None` when no
/// subscription data is present or the tier is unknown.
pub fn max_context_tokens(data: Option<&SubscriptionData>) -> Option<u32> {
    match data.and_then(|d| d.tier) {
        Some(1) => Some(4096),
        Some(2) | Some(3) => Some(8192),
        _ => None,
    }
}

/// Per-request output cap for tier-limited models. Falls back to the global
/// maximum when subscription data is missing.
pub fn max_response_tokens(data: Option<&SubscriptionData>) -> u32 {
    match data.and_then(|d| d.tier) {
        Some(1) | Some(2) => 150,
        Some(3) => 250,
        _ => MAX_OUTPUT_LENGTH,
    }
}

pub fn anlas_left(data: Option<&SubscriptionData>) -> u64 {
    data.and_then(|d| d.training_steps_left.as_ref())
        .map(|t| t.fixed_training_steps_left)
        .unwrap_or(0)
}

pub fn unlimited_image_generation(data: Option<&SubscriptionData>) -> bool {
    data.and_then(|d| d.perks.as_ref())
        .map(|p| p.unlimited_image_generation)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(tier: u8) -> SubscriptionData {
        SubscriptionData {
            tier: Some(tier),
            ..Default::default()
        }
    }

    #[test]
    fn tier_caps() {
        assert_eq!(max_context_tokens(Some(&sub(1))), Some(4096));
        assert_eq!(max_context_tokens(Some(&sub(2))), Some(8192));
        assert_eq!(max_context_tokens(Some(&sub(3))), Some(8192));
        assert_eq!(max_context_tokens(Some(&sub(0))), None);
        assert_eq!(max_context_tokens(None), None);

        assert_eq!(max_response_tokens(Some(&sub(1))), 150);
        assert_eq!(max_response_tokens(Some(&sub(2))), 150);
        assert_eq!(max_response_tokens(Some(&sub(3))), 250);
        assert_eq!(max_response_tokens(None), MAX_OUTPUT_LENGTH);
    }

    #[test]
    fn missing_subscription_is_no_connection() {
        assert_eq!(tier_name(None), NO_CONNECTION);
        assert_eq!(tier_name(Some(&SubscriptionData::default())), NO_CONNECTION);
        assert_eq!(tier_name(Some(&sub(3))), "Opus");
    }

    #[test]
    fn subscription_extras_default_when_absent() {
        assert_eq!(anlas_left(None), 0);
        assert!(!unlimited_image_generation(None));

        let data: SubscriptionData = serde_json::from_str(
            r#"{"tier": 3, "trainingStepsLeft": {"fixedTrainingStepsLeft": 5000},
                "perks": {"unlimitedImageGeneration": true}}"#,
        )
        .unwrap();
        assert_eq!(anlas_left(Some(&data)), 5000);
        assert!(unlimited_image_generation(Some(&data)));
    }
}
