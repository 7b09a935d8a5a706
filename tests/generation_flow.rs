//! End-to-end checks of the preset -> config -> payload -> stream pipeline,
//! using canned wire data instead of a live server.

use bytes::Bytes;
use futures::StreamExt;

use nai_bridge::bad_words::BadWordsCache;
use nai_bridge::preset::Preset;
use nai_bridge::request::build_generate_request;
use nai_bridge::settings::SamplerConfig;
use nai_bridge::stream::decode_sse;
use nai_bridge::tier::SubscriptionData;
use nai_bridge::tokenizer::{Tokenizer, TokenizerKind};

struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, _kind: TokenizerKind, text: &str) -> Vec<u32> {
        text.chars().map(|c| c as u32).collect()
    }
}

fn tablet() -> SubscriptionData {
    serde_json::from_str(r#"{"tier": 1}"#).unwrap()
}

#[test]
fn preset_settings_flow_into_payload() {
    let mut config = SamplerConfig {
        model: "kayra-v1".to_string(),
        ..Default::default()
    };
    let preset: Preset = serde_json::from_str(
        r#"{
            "temperature": 1.35,
            "top_k": 15,
            "top_p": 0.85,
            "repetition_penalty": 2.8,
            "order": [0, 1, 2],
            "banned_tokens": "[5, 6]"
        }"#,
    )
    .unwrap();
    preset.apply(&mut config);

    let mut bad_words = BadWordsCache::new();
    let request = build_generate_request(
        "Once upon a time",
        &config,
        500,
        &["\nUser:".to_string()],
        Some(&tablet()),
        Some(10),
        &CharTokenizer,
        &mut bad_words,
    );

    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["model"], "kayra-v1");
    assert_eq!(json["temperature"], 1.35);
    assert_eq!(json["top_k"], 15);
    assert_eq!(json["order"], serde_json::json!([0, 1, 2]));
    // Tablet tier caps responses at 150 even though 500 was requested.
    assert_eq!(json["max_length"], 150);
    assert_eq!(json["bad_words_ids"], serde_json::json!([[5, 6]]));
    assert_eq!(json["num_logprobs"], 10);
    assert_eq!(json["use_string"], true);
    assert_eq!(json["generate_until_sentence"], true);
}

#[tokio::test]
async fn streamed_tokens_carry_merged_logprobs() {
    let transcript = concat!(
        "data: {\"token\": \"The\", \"logprobs\": {",
        "\"chosen\": [[[791], [-0.3, -0.2]]],",
        "\"before\": [[[791], [-0.3, -0.2]], [[32], [-1.4, -1.2]], [[99], [-2.0, -1.9]]],",
        "\"after\": [[[791], [-0.3, -0.2]], [[32], [-1.4, -1.2]]]}}\n\n",
        "data: {\"token\": \" end\"}\n\n",
    );
    let bytes = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
        transcript.as_bytes(),
    ))]);

    let chunks: Vec<_> = decode_sse(Box::pin(bytes))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "The");
    assert_eq!(chunks[1].text, "The end");

    let logprobs = chunks[0].logprobs.as_ref().unwrap();
    assert_eq!(logprobs.token, 791);
    assert_eq!(
        logprobs.top_logprobs,
        vec![(791, -0.2), (32, -1.2), (99, f64::NEG_INFINITY)]
    );
    assert!(chunks[1].logprobs.is_none());
}

#[tokio::test]
async fn server_error_record_aborts_generation() {
    let transcript = "data: {\"error\": \"Invalid API key\"}\n\n";
    let bytes = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
        transcript.as_bytes(),
    ))]);

    let results: Vec<_> = decode_sse(Box::pin(bytes)).collect::<Vec<_>>().await;
    assert_eq!(results.len(), 1);
    let err = results[0].as_ref().unwrap_err();
    assert!(err.to_string().contains("Invalid API key"));
}
