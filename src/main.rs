use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use tokio::signal;

use nai_bridge::bad_words::BadWordsCache;
use nai_bridge::client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, NaiClient};
use nai_bridge::preset::PresetStore;
use nai_bridge::request::build_generate_request;
use nai_bridge::secrets::{API_KEY_NOVEL, SecretStore};
use nai_bridge::settings::SamplerConfig;
use nai_bridge::tier;
use nai_bridge::tokenizer::NullTokenizer;

#[derive(Parser)]
#[command(about = "Stream a completion from the NovelAI text generation API")]
struct Args {
    /// Prompt to complete.
    prompt: String,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Sampler settings file (JSON). Defaults are used when absent.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory of preset JSON files.
    #[arg(long)]
    preset_dir: Option<PathBuf>,

    /// Preset name to apply on top of the settings.
    #[arg(long)]
    preset: Option<String>,

    #[arg(long, default_value = "secrets.json")]
    secrets: PathBuf,

    #[arg(long, default_value_t = 150)]
    max_length: u32,

    /// Request the top 10 token probabilities per generated token.
    #[arg(long)]
    logprobs: bool,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // default level is info
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    tokio::select! {
        res = run(args) => res,
        _ = signal::ctrl_c() => {
            println!("\nReceived Ctrl+C, shutting down");
            Ok(())
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.settings {
        Some(path) => SamplerConfig::load(path)
            .with_context(|| format!("Loading settings from {path:?}"))?,
        None => SamplerConfig::default(),
    };
    config.streaming = true;

    if let Some(name) = &args.preset {
        let dir = args
            .preset_dir
            .as_ref()
            .context("--preset requires --preset-dir")?;
        let store = PresetStore::load_dir(dir)?;
        let preset = store
            .get(name)
            .with_context(|| format!("No preset named {name:?}"))?;
        preset.apply(&mut config);
        config.preset = name.clone();
        log::info!("Applied preset {name}");
    }

    let secrets = SecretStore::load(&args.secrets)?;
    let Some(api_key) = secrets.get(API_KEY_NOVEL) else {
        bail!("No API key stored under {API_KEY_NOVEL:?} in {:?}", args.secrets);
    };

    let client = NaiClient::new(ClientConfig {
        base_url: args.base_url.clone(),
        api_key: api_key.to_string(),
        timeout: args.timeout,
    })?;

    let subscription = match client.fetch_subscription().await {
        Ok(data) => {
            log::info!(
                "Connected: tier {}, {} Anlas left",
                tier::tier_name(Some(&data)),
                tier::anlas_left(Some(&data))
            );
            Some(data)
        }
        Err(err) => {
            log::warn!("Could not load subscription data: {err:#}");
            None
        }
    };

    let mut bad_words = BadWordsCache::new();
    let request = build_generate_request(
        &args.prompt,
        &config,
        args.max_length,
        &[],
        subscription.as_ref(),
        args.logprobs.then_some(10),
        &NullTokenizer,
        &mut bad_words,
    );

    let mut stream = client.generate_stream(&request).await?;
    let mut printed = 0;
    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        write!(stdout, "{}", &chunk.text[printed..])?;
        stdout.flush()?;
        printed = chunk.text.len();
        if args.logprobs {
            if let Some(logprobs) = &chunk.logprobs {
                log::debug!(
                    "token {} with {} candidates",
                    logprobs.token,
                    logprobs.top_logprobs.len()
                );
            }
        }
    }
    println!();
    Ok(())
}
