//! VRT - visual regression comparison CLI
//!
//! ## Commands
//!
//! - `compare`: compare a screenshot against its baseline in an image store
//! - `import`: copy image files into a store under content-addressed names
//! - `models`: list the models available on the local Ollama server
//! - `judge`: send images straight to a judge model and print its raw answer

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use vlm_judge::{
    GeminiProvider, OllamaProvider, ProviderKind, ProviderRegistry, VlmConfig,
    VlmProviderResponse,
};
use vrt_core::{
    decode_image, encode_png, CompareService, DiffResult, FsImageStore, IgnoreArea,
    ImageCompareInput, ImageComparison, ImageKind, ImageStore, TestStatus, METRICS,
};

#[derive(Parser)]
#[command(name = "vrt")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Visual regression comparison with optional VLM review", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a screenshot with its baseline
    Compare {
        /// Image store directory
        #[arg(long, env = "VRT_STORE", default_value = ".vrt/images")]
        store: PathBuf,

        /// Stored name of the new screenshot
        #[arg(long)]
        image: String,

        /// Stored name of the baseline (omit for a new test)
        #[arg(long)]
        baseline: Option<String>,

        /// Comparison engine: pixelmatch, lookSame, structural or vlm
        #[arg(short, long, default_value = "pixelmatch")]
        engine: ImageComparison,

        /// Engine configuration as a JSON object
        #[arg(short, long, default_value = "")]
        config: String,

        /// Read the engine configuration from a file instead
        #[arg(long, conflicts_with = "config")]
        config_file: Option<PathBuf>,

        /// Gemini API key, added to the config when it has none
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Largest diff percentage still accepted as ok
        #[arg(short, long, default_value = "0")]
        tolerance: f64,

        /// Region to ignore as x,y,width,height (repeatable)
        #[arg(long = "ignore", value_parser = parse_ignore_area)]
        ignore: Vec<IgnoreArea>,

        /// Do not persist the diff image
        #[arg(long)]
        no_diff: bool,

        /// Write a JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Exit with an error when the result is unresolved
        #[arg(long)]
        fail_on_unresolved: bool,
    },

    /// Add image files to a store and print their names
    Import {
        /// Image store directory
        #[arg(long, env = "VRT_STORE", default_value = ".vrt/images")]
        store: PathBuf,

        /// Role of the imported images: baseline, screenshot or diff
        #[arg(short, long, default_value = "screenshot", value_parser = parse_image_kind)]
        kind: ImageKind,

        /// PNG or JPEG files to import
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List models served by the local Ollama instance
    Models {
        /// Ollama base URL
        #[arg(long, env = "OLLAMA_BASE_URL")]
        ollama_url: Option<String>,
    },

    /// Ask a judge model about images and print its raw answer
    Judge {
        /// Images sent to the model in order (baseline, candidate, diff)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Judge backend: ollama or gemini
        #[arg(long, default_value = "ollama", value_parser = parse_provider)]
        provider: ProviderKind,

        /// Model identifier (required for gemini)
        #[arg(short, long)]
        model: Option<String>,

        /// Instruction prompt (defaults to the built-in verdict prompt)
        #[arg(short, long)]
        prompt: Option<String>,

        /// Sampling temperature
        #[arg(short, long)]
        temperature: Option<f32>,

        /// Gemini API key
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Ollama base URL
        #[arg(long, env = "OLLAMA_BASE_URL")]
        ollama_url: Option<String>,
    },
}

/// Parse `x,y,width,height`.
fn parse_ignore_area(s: &str) -> std::result::Result<IgnoreArea, String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid ignore area '{s}': {e}"))?;
    match parts.as_slice() {
        &[x, y, width, height] => Ok(IgnoreArea::new(x, y, width, height)),
        _ => Err(format!(
            "invalid ignore area '{s}': expected x,y,width,height"
        )),
    }
}

fn parse_image_kind(s: &str) -> std::result::Result<ImageKind, String> {
    serde_json::from_value(Value::String(s.to_ascii_lowercase()))
        .map_err(|_| format!("unknown image kind '{s}' (expected baseline, screenshot or diff)"))
}

fn parse_provider(s: &str) -> std::result::Result<ProviderKind, String> {
    serde_json::from_value(Value::String(s.to_ascii_lowercase()))
        .map_err(|_| format!("unknown provider '{s}' (expected ollama or gemini)"))
}

/// Judge config from `judge` flags, over the defaults.
fn judge_config(
    provider: ProviderKind,
    model: Option<&str>,
    prompt: Option<&str>,
    temperature: Option<f32>,
    api_key: Option<&str>,
) -> Result<VlmConfig> {
    let mut config = match provider {
        ProviderKind::Ollama => VlmConfig::default(),
        ProviderKind::Gemini => {
            let Some(model) = model else {
                bail!("--model is required for the gemini provider");
            };
            VlmConfig::gemini(model, api_key.unwrap_or_default())
        }
    };
    if let Some(model) = model {
        config = config.with_model(model);
    }
    if let Some(prompt) = prompt {
        config = config.with_prompt(prompt);
    }
    if let Some(temperature) = temperature {
        config = config.with_temperature(temperature);
    }
    Ok(config)
}

/// Insert `apiKey` into a JSON config object that lacks one.
///
/// A blank config becomes `{"apiKey": key}`. Anything that is not a JSON
/// object is passed through for the resolver to fall back on defaults.
fn with_api_key(raw: &str, api_key: &str) -> String {
    if raw.trim().is_empty() {
        return serde_json::json!({ "apiKey": api_key }).to_string();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(mut fields)) => {
            fields
                .entry("apiKey")
                .or_insert_with(|| Value::String(api_key.to_string()));
            Value::Object(fields).to_string()
        }
        _ => raw.to_string(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareReport<'a> {
    generated_at: DateTime<Utc>,
    engine: ImageComparison,
    baseline: Option<&'a str>,
    image: &'a str,
    result: &'a DiffResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vrt_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Compare {
            store,
            image,
            baseline,
            engine,
            config,
            config_file,
            api_key,
            tolerance,
            ignore,
            no_diff,
            report,
            fail_on_unresolved,
        } => {
            let mut raw_config = match config_file {
                Some(path) => std::fs::read_to_string(&path)
                    .context(format!("Failed to read config file {:?}", path))?,
                None => config,
            };
            if let Some(key) = api_key.as_deref().filter(|k| !k.trim().is_empty()) {
                if engine == ImageComparison::Vlm {
                    raw_config = with_api_key(&raw_config, key);
                }
            }

            let mut input = ImageCompareInput::new(baseline.as_deref(), &image)
                .with_tolerance(tolerance)
                .with_saved_diff(!no_diff);
            input.ignore_areas = ignore;

            let result = cmd_compare(&store, &input, engine, &raw_config, report.as_deref()).await?;
            if fail_on_unresolved && result.status == TestStatus::Unresolved {
                bail!(
                    "'{}' differs from its baseline by {:.3}%",
                    image,
                    result.diff_percent
                );
            }
            Ok(())
        }
        Commands::Import { store, kind, files } => cmd_import(&store, kind, &files).await,
        Commands::Models { ollama_url } => cmd_models(ollama_url).await,
        Commands::Judge {
            files,
            provider,
            model,
            prompt,
            temperature,
            api_key,
            ollama_url,
        } => {
            let config = judge_config(
                provider,
                model.as_deref(),
                prompt.as_deref(),
                temperature,
                api_key.as_deref(),
            )?;
            let registry = ProviderRegistry::new()
                .with_provider(ProviderKind::Ollama, Arc::new(OllamaProvider::new(ollama_url)))
                .with_provider(ProviderKind::Gemini, Arc::new(GeminiProvider::new()));
            let response = cmd_judge(&registry, &config, &files).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

/// Run one comparison and print the result as JSON
async fn cmd_compare(
    store_dir: &Path,
    input: &ImageCompareInput,
    engine: ImageComparison,
    raw_config: &str,
    report_path: Option<&Path>,
) -> Result<DiffResult> {
    let store = FsImageStore::new(store_dir)
        .context(format!("Failed to open image store {:?}", store_dir))?;
    let service = CompareService::new(Arc::new(store), ProviderRegistry::from_env());

    let result = service
        .get_diff(input, engine, raw_config)
        .await
        .context(format!("Comparison of '{}' failed", input.image))?;

    info!(
        status = %result.status,
        diff_percent = result.diff_percent,
        "comparison complete"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(path) = report_path {
        let report = CompareReport {
            generated_at: Utc::now(),
            engine,
            baseline: input.baseline.as_deref(),
            image: &input.image,
            result: &result,
        };
        std::fs::write(path, serde_json::to_vec_pretty(&report)?)
            .context(format!("Failed to write report to {:?}", path))?;
        eprintln!("Report written to {}", path.display());
    }

    METRICS.flush();
    Ok(result)
}

/// Copy files into the store
async fn cmd_import(store_dir: &Path, kind: ImageKind, files: &[PathBuf]) -> Result<()> {
    let store = FsImageStore::new(store_dir)
        .context(format!("Failed to open image store {:?}", store_dir))?;

    for file in files {
        let bytes =
            std::fs::read(file).context(format!("Failed to read image {:?}", file))?;
        let image = decode_image(&bytes).context(format!("Failed to decode {:?}", file))?;
        let name = store.save_image(kind, &image).await?;
        println!("{}\t{}", name, file.display());
    }

    Ok(())
}

/// List local models
async fn cmd_models(ollama_url: Option<String>) -> Result<()> {
    let provider = OllamaProvider::new(ollama_url);
    let models = provider
        .list_models()
        .await
        .context("Failed to list Ollama models")?;

    if models.is_empty() {
        println!("No models installed");
        return Ok(());
    }

    for model in models {
        let size_gb = model.size as f64 / 1e9;
        match model.details {
            Some(details) if !details.parameter_size.is_empty() => println!(
                "{:<32} {:>8} {:>7.1} GB",
                model.name, details.parameter_size, size_gb
            ),
            _ => println!("{:<32} {:>8} {:>7.1} GB", model.name, "-", size_gb),
        }
    }

    Ok(())
}

/// Send the files, PNG-encoded and in order, to the configured judge
async fn cmd_judge(
    registry: &ProviderRegistry,
    config: &VlmConfig,
    files: &[PathBuf],
) -> Result<VlmProviderResponse> {
    let mut images = Vec::with_capacity(files.len());
    for file in files {
        let bytes =
            std::fs::read(file).context(format!("Failed to read image {:?}", file))?;
        let image = decode_image(&bytes).context(format!("Failed to decode {:?}", file))?;
        images.push(encode_png(&image)?);
    }

    info!(
        provider = %config.provider,
        model = %config.model,
        images = images.len(),
        "sending images to judge"
    );
    registry
        .generate(config, &images)
        .await
        .context(format!("{} judge request failed", config.provider))
}
