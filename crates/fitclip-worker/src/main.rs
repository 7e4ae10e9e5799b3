//! Workout processing worker binary.
//!
//! Usage: `fitclip-worker <video> [labeler_response.json] [transcript.json|.vtt]`
//!
//! Without a stored labeler response the transcript keyword labeler is used.
//! The processing outcome is printed to stdout as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fitclip_media::FfmpegClipEncoder;
use fitclip_worker::{
    load_transcript, ExerciseLabeler, JsonFileLabeler, KeywordFallbackLabeler, WorkerConfig,
    WorkoutProcessor,
};

const USAGE: &str = "usage: fitclip-worker <video> [labeler_response.json] [transcript.json|.vtt]";

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("fitclip=info".parse().unwrap())
        .add_directive("fitclip_media=info".parse().unwrap())
        .add_directive("fitclip_worker=info".parse().unwrap());

    // Logs go to stderr; stdout carries the JSON result
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let mut args = std::env::args().skip(1);
    let Some(video) = args.next().map(PathBuf::from) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let labeler_response = args.next().map(PathBuf::from);
    let transcript_path = args.next().map(PathBuf::from);

    info!("Starting fitclip-worker");

    // Load configuration
    let config = WorkerConfig::from_env();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    info!("Worker config: {:?}", config);

    let transcript = match &transcript_path {
        Some(path) => match load_transcript(path).await {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to load transcript {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Vec::new(),
    };

    let labeler: Arc<dyn ExerciseLabeler> = match labeler_response {
        Some(path) => Arc::new(JsonFileLabeler::new(path)),
        None => Arc::new(KeywordFallbackLabeler::new()),
    };
    let encoder = Arc::new(
        FfmpegClipEncoder::new(config.encoding.clone()).with_timeout(config.clip_timeout.as_secs()),
    );

    let processor = WorkoutProcessor::new(config, labeler, encoder);

    let outcome = tokio::select! {
        result = processor.process(&video, &transcript) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            std::process::exit(130);
        }
    };

    match outcome {
        Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize outcome: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Processing failed: {}", e);
            std::process::exit(if e.is_permanent_failure() { 3 } else { 1 });
        }
    }
}
