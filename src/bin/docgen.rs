//! docgen: run the document pipeline or inspect a transcript's chunk plan.
//!
//! Usage:
//!   docgen run --execution-id <id> --transcript <uri> [--video <uri>]
//!   docgen chunk <file> [--max-tokens <n>]

use anyhow::{bail, Context};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use transcript_docgen::config::ProcessorConfig;
use transcript_docgen::processor::Processor;
use transcript_docgen::transcript::chunker::DEFAULT_MAX_TOKENS_PER_CHUNK;
use transcript_docgen::transcript::{format_timestamp, TranscriptChunker};

fn print_usage() {
    println!(
        r#"docgen: transcript to technical document pipeline

USAGE:
    docgen <COMMAND> [OPTIONS]

COMMANDS:
    run --execution-id <id> --transcript <uri> [--video <uri>]
                                Run the six-stage pipeline for one transcript
    chunk <file> [--max-tokens <n>]
                                Print the chunk plan of a local transcript JSON
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    DOCGEN_OUTPUT_BUCKET        Output bucket (required for `run`)
    DOCGEN_STORAGE_ROOT         Local object store root (default ./data)
    DOCGEN_CONFIG               Optional YAML configuration file
    DOCGEN_LOG_LEVEL            Log filter (falls back to RUST_LOG, then info)"#
    );
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn init_tracing() {
    let filter = std::env::var("DOCGEN_LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn cmd_run(args: &[String]) -> anyhow::Result<i32> {
    let execution_id = flag(args, "--execution-id").context("missing --execution-id")?;
    let transcript = flag(args, "--transcript").context("missing --transcript")?;
    let video = flag(args, "--video").unwrap_or(transcript);

    let config = ProcessorConfig::load().context("loading configuration")?;
    let processor = Processor::from_config(config).context("building processor")?;
    let response = processor
        .handle(&json!({
            "execution_id": execution_id,
            "transcription_uri": transcript,
            "video_uri": video,
        }))
        .await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(if response.is_success() { 0 } else { 1 })
}

fn cmd_chunk(args: &[String]) -> anyhow::Result<i32> {
    let Some(path) = args.first().filter(|a| !a.starts_with("--")) else {
        bail!("missing transcript file");
    };
    let max_tokens = match flag(args, "--max-tokens") {
        Some(raw) => raw.parse().with_context(|| format!("invalid --max-tokens {raw}"))?,
        None => DEFAULT_MAX_TOKENS_PER_CHUNK,
    };

    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    let chunker = TranscriptChunker::new(max_tokens);
    let parsed = chunker.parse_bytes(&bytes)?;
    let chunks = chunker.chunk(&parsed);

    println!(
        "{}: {} segments, {} speakers, {} chunk(s) at max {} tokens",
        path,
        parsed.segments.len(),
        parsed.speakers.len(),
        chunks.len(),
        chunker.max_tokens()
    );
    for chunk in &chunks {
        println!(
            "  chunk {}/{}  {:>8} tokens  {} - {}  {} segments ({} overlap)  speakers: {}",
            chunk.chunk_id,
            chunk.total_chunks,
            chunk.token_count,
            format_timestamp(chunk.time_range.0),
            format_timestamp(chunk.time_range.1),
            chunk.segments.len(),
            chunk.metadata.overlap_segments,
            chunk.speakers.join(", ")
        );
    }
    Ok(0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }
    init_tracing();

    let code = match args[1].as_str() {
        "run" => cmd_run(&args[2..]).await?,
        "chunk" => cmd_chunk(&args[2..])?,
        "version" | "--version" | "-V" => {
            println!("docgen {}", env!("CARGO_PKG_VERSION"));
            0
        }
        "help" | "--help" | "-h" => {
            print_usage();
            0
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            1
        }
    };
    std::process::exit(code);
}
