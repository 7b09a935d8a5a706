pub mod bad_words;
pub mod client;
pub mod logprobs;
pub mod preset;
pub mod request;
pub mod secrets;
pub mod settings;
pub mod stream;
pub mod tier;
pub mod tokenizer;

pub use client::{ClientConfig, NaiClient};
pub use logprobs::{TokenLogprobs, merge_logprobs};
pub use preset::{Preset, PresetStore};
pub use request::{GenerateRequest, build_generate_request};
pub use settings::SamplerConfig;
pub use stream::GenerationChunk;
