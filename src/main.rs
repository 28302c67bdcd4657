mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cf_core::config::{self, Config};
use cf_core::events::EventPayload;
use cf_core::{FileFormat, MediaKind, QualityTier};
use cf_pipeline::{
    classify_media_kind, classify_variant, negotiate_mime, EncodeProfile, MediaRuntime,
    StaticCapabilities, SyntheticMedia, SyntheticRuntime,
};
use clap::Parser;
use clipforge::bridge::{MessageBridge, StartConversion};
use clipforge::conversion::ConversionService;
use clipforge::state::JobCoordinator;
use cli::{Cli, Commands};
use serde::Serialize;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforge=trace,cf_pipeline=trace,cf_core=debug".to_string()
        } else {
            "clipforge=info,cf_pipeline=info,cf_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Classify { file_name, json } => classify_file(&file_name, json),
        Commands::Plan {
            file_name,
            format,
            quality,
            size,
            supports,
            json,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            plan(&config, &file_name, format.as_deref(), &quality, size, &supports, json)
        }
        Commands::Simulate {
            file_name,
            format,
            quality,
            duration,
            no_audio,
            size,
            supports,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(simulate(
                config,
                SimulateArgs {
                    file_name,
                    format,
                    quality,
                    duration,
                    no_audio,
                    size,
                    supports,
                },
            ))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("clipforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Resolve the output format, defaulting by the source's media kind.
fn output_format(kind: MediaKind, format: Option<&str>) -> Result<FileFormat> {
    match format {
        Some(ext) => Ok(ext.parse()?),
        None => Ok(kind.default_output()),
    }
}

#[derive(Serialize)]
struct Classification<'a> {
    file_name: &'a str,
    kind: MediaKind,
    format: FileFormat,
    mime_type: &'static str,
    default_output: FileFormat,
}

fn classify_file(file_name: &str, json: bool) -> Result<()> {
    let kind = classify_media_kind(file_name)?;
    let format = FileFormat::from_file_name(file_name)
        .with_context(|| format!("No extension in {file_name}"))?;
    let report = Classification {
        file_name,
        kind,
        format,
        mime_type: format.mime_type(),
        default_output: kind.default_output(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("File: {}", report.file_name);
        println!("Kind: {}", report.kind);
        println!("MIME: {}", report.mime_type);
        println!("Default output: {}", report.default_output);
    }
    Ok(())
}

#[derive(Serialize)]
struct Plan {
    variant: String,
    output_format: FileFormat,
    output_file_name: String,
    quality: QualityTier,
    preferred_mime_type: String,
    negotiated_mime_type: String,
    audio_bits_per_second: u32,
    video_bits_per_second: Option<u32>,
    load_timeout_ms: u64,
}

fn plan(
    config: &Config,
    file_name: &str,
    format: Option<&str>,
    quality: &str,
    size: u64,
    supports: &[String],
    json: bool,
) -> Result<()> {
    let kind = classify_media_kind(file_name)?;
    let target = output_format(kind, format)?;
    let variant = classify_variant(kind, target)?;
    let quality = QualityTier::parse_lenient(quality);
    let profile = EncodeProfile::resolve(variant, target, quality);

    let negotiated = if supports.is_empty() {
        profile.container_mime_type.clone()
    } else {
        let caps = StaticCapabilities::new(supports.iter().cloned());
        negotiate_mime(&profile.container_mime_type, profile.kind, &caps)?
    };

    let plan = Plan {
        variant: variant.to_string(),
        output_format: target,
        output_file_name: cf_core::output_file_name(file_name, target),
        quality,
        preferred_mime_type: profile.container_mime_type,
        negotiated_mime_type: negotiated,
        audio_bits_per_second: profile.audio_bits_per_second,
        video_bits_per_second: profile.video_bits_per_second,
        load_timeout_ms: config.pipeline.load_timeout_ms(size),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("Variant: {}", plan.variant);
        println!("Output: {} ({})", plan.output_file_name, plan.quality);
        println!("Container: {}", plan.negotiated_mime_type);
        if plan.negotiated_mime_type != plan.preferred_mime_type {
            println!("  (preferred {} unsupported)", plan.preferred_mime_type);
        }
        println!("Audio bitrate: {} bps", plan.audio_bits_per_second);
        if let Some(video) = plan.video_bits_per_second {
            println!("Video bitrate: {video} bps");
        }
        println!("Load timeout: {} ms", plan.load_timeout_ms);
    }
    Ok(())
}

struct SimulateArgs {
    file_name: String,
    format: Option<String>,
    quality: String,
    duration: f64,
    no_audio: bool,
    size: usize,
    supports: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    success: bool,
    file_name: Option<String>,
    mime_type: Option<String>,
    size: Option<u64>,
    size_human: Option<String>,
    error: Option<clipforge::state::FailureResponse>,
}

async fn simulate(config: Config, args: SimulateArgs) -> Result<()> {
    let kind = classify_media_kind(&args.file_name)?;
    let target = output_format(kind, args.format.as_deref())?;

    let mut media = match kind {
        MediaKind::Video => SyntheticMedia::video(args.duration),
        MediaKind::Audio => SyntheticMedia::audio(args.duration),
    };
    if args.no_audio {
        media = media.without_audio();
    }
    let mut runtime = SyntheticRuntime::new(media);
    if !args.supports.is_empty() {
        runtime = runtime.with_supported(args.supports);
    }
    let runtime: Arc<dyn MediaRuntime> = Arc::new(runtime);

    let coordinator = JobCoordinator::new(&config.coordinator);
    let service = ConversionService::new(coordinator.clone(), runtime, config.pipeline.clone());
    let bridge = MessageBridge::spawn(service, config.coordinator.channel_capacity);

    let mut events = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let EventPayload::JobProgress { percent, status, .. } = &event.payload {
                eprintln!("[{percent:>3}%] {status}");
            }
            if event.payload.is_terminal() {
                break;
            }
        }
    });

    let mut client = bridge.connect();
    let data = StartConversion::new(
        vec![0u8; args.size],
        args.file_name,
        target.extension(),
        args.quality,
    );
    let job_id = client
        .start_conversion(data)
        .await
        .map_err(|f| anyhow::anyhow!("{}: {}", f.error_kind, f.message))?;
    tracing::info!("Simulating job {job_id}");

    let result = client
        .wait_for_completion(job_id)
        .await
        .map_err(|f| anyhow::anyhow!("{}: {}", f.error_kind, f.message))?;
    let _ = printer.await;
    bridge.shutdown();

    let report = SimulationReport {
        success: result.success,
        file_name: result.file_name,
        mime_type: result.data.as_ref().map(|d| d.mime_type.clone()),
        size: result.data.as_ref().map(|d| d.size),
        size_human: result.data.as_ref().map(|d| cf_core::format_bytes(d.size)),
        error: result.error,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        anyhow::bail!("Conversion failed");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!(
        "  Load timeout: {}-{} ms",
        config.pipeline.load_timeout_min_ms, config.pipeline.load_timeout_max_ms
    );
    println!("  Chunk interval: {} ms", config.pipeline.chunk_interval_ms);
    println!("  Progress interval: {} ms", config.pipeline.progress_interval_ms);
    println!("  History size: {}", config.coordinator.history_size);
    for warning in config.warnings() {
        println!("  ⚠ {warning}");
    }
    Ok(())
}
