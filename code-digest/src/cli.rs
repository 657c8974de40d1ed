/// # code-digest CLI Interface (Module)
///
/// This module implements the CLI for code-digest: command parsing, settings
/// merging, client construction and printing the run result.
///
/// All pipeline logic (selection, ignore rules, retrying analysis, report
/// building) lives in the [`code-digest-core`] crate. This module is strictly
/// CLI glue.
///
/// ## Features
/// - [`Cli`] defines the user-facing options and subcommands.
/// - Subcommands: `local` (directory tree), `s3` (bucket prefix) and
///   `s3-event` (folder of the object named by an S3 notification).
/// - Async entrypoint [`run`] for programmatic invocation and integration tests.
///
/// ## Output
/// The run result is printed to stdout as pretty JSON:
/// `{message, total_processed, results}` on success, `{error}` for a
/// configuration error and `{error, trace}` when the source cannot be enumerated.
///
/// [`code-digest-core`]: ../../code-digest-core/
use crate::bedrock::BedrockFlowInvoker;
use crate::load_config::{load_config, Settings, DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_PREFIX};
use crate::s3::{S3Event, S3Store};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use code_digest_core::analysis::{AnalysisClient, RetryPolicy};
use code_digest_core::config::ConfigError;
use code_digest_core::contract::DocumentStore;
use code_digest_core::digest::{digest, DigestReport, OutputLayout};
use code_digest_core::local_store::LocalStore;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI for code-digest: analyse source files with a Bedrock flow.
#[derive(Parser)]
#[clap(
    name = "code-digest",
    version,
    about = "Analyse source files with a Bedrock flow and store markdown digests"
)]
pub struct Cli {
    /// Optional YAML config file; environment variables take precedence over it
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backoff unit between retries of a transient flow error, in milliseconds
    #[clap(long, global = true, default_value_t = 1000)]
    pub base_delay_ms: u64,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse every target file under a local directory
    Local {
        /// Directory to scan [default: input]
        #[clap(long)]
        input: Option<PathBuf>,
        /// Directory receiving the markdown digests [default: output]
        #[clap(long)]
        output: Option<PathBuf>,
        /// Descend into symlinked directories
        #[clap(long)]
        follow_links: bool,
    },
    /// Analyse every target object under an S3 prefix
    S3 {
        #[clap(long)]
        bucket: String,
        /// Key prefix to scan; empty scans the whole bucket
        #[clap(long, default_value = "")]
        prefix: String,
        /// Key prefix receiving the markdown digests [default: output/]
        #[clap(long)]
        output_prefix: Option<String>,
    },
    /// Analyse the folder containing the object named by an S3 event notification
    S3Event {
        /// Path to the event JSON
        #[clap(long)]
        event: PathBuf,
        /// Key prefix receiving the markdown digests [default: output/]
        #[clap(long)]
        output_prefix: Option<String>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let settings = match load_config(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            let missing = e.downcast_ref::<ConfigError>().is_some();
            tracing::error!(error = %e, missing_options = missing, "Configuration error, nothing processed");
            print_json(&serde_json::json!({ "error": e.to_string() }))?;
            return Err(e);
        }
    };
    let retry = RetryPolicy {
        base_delay: Duration::from_millis(cli.base_delay_ms),
        ..RetryPolicy::default()
    };

    let result = match cli.command {
        Commands::Local {
            input,
            output,
            follow_links,
        } => {
            let store = LocalStore::new().with_follow_links(follow_links);
            run_local(&settings, retry, store, input, output).await
        }
        Commands::S3 {
            bucket,
            prefix,
            output_prefix,
        } => run_s3(&settings, retry, bucket, prefix, output_prefix).await,
        Commands::S3Event {
            event,
            output_prefix,
        } => {
            let folder = std::fs::read_to_string(&event)
                .with_context(|| format!("Failed to read S3 event file {:?}", event))
                .and_then(|raw| S3Event::from_json(&raw))
                .and_then(|event| event.folder());
            match folder {
                Ok(folder) => {
                    tracing::info!(bucket = %folder.bucket, prefix = %folder.prefix, "Processing folder");
                    run_s3(&settings, retry, folder.bucket, folder.prefix, output_prefix).await
                }
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(report) => {
            tracing::info!(
                total_processed = report.total_processed,
                succeeded = report.succeeded(),
                failed = report.failed(),
                "Digest complete"
            );
            print_json(&report)?;
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Digest run failed");
            print_json(&serde_json::json!({
                "error": e.to_string(),
                "trace": format!("{e:?}"),
            }))?;
            Err(e)
        }
    }
}

async fn run_local(
    settings: &Settings,
    retry: RetryPolicy,
    store: LocalStore,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<DigestReport> {
    let input = input
        .or_else(|| settings.paths.input_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR));
    let output = output
        .or_else(|| settings.paths.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    // Absolute roots let the ignore-file search climb above the input directory.
    let input = input
        .canonicalize()
        .with_context(|| format!("Input directory {:?} cannot be read", input))?;
    std::fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create output directory {:?}", output))?;
    let output = output
        .canonicalize()
        .with_context(|| format!("Output directory {:?} cannot be resolved", output))?;

    let layout = OutputLayout::new(path_string(&input), path_string(&output));
    run_digest(settings, retry, &store, &layout).await
}

async fn run_s3(
    settings: &Settings,
    retry: RetryPolicy,
    bucket: String,
    prefix: String,
    output_prefix: Option<String>,
) -> Result<DigestReport> {
    let output_prefix = output_prefix
        .or_else(|| settings.paths.output_prefix.clone())
        .unwrap_or_else(|| DEFAULT_OUTPUT_PREFIX.to_string());
    let store = S3Store::from_env(bucket).await;
    let layout = OutputLayout::new(prefix, output_prefix);
    run_digest(settings, retry, &store, &layout).await
}

async fn run_digest<S>(
    settings: &Settings,
    retry: RetryPolicy,
    store: &S,
    layout: &OutputLayout,
) -> Result<DigestReport>
where
    S: DocumentStore + ?Sized,
{
    let invoker = BedrockFlowInvoker::from_env(&settings.region).await;
    let client = AnalysisClient::new(invoker, settings.digest.flow.clone()).with_retry_policy(retry);
    let report = digest(store, &client, &settings.digest.target_extensions, layout).await?;
    Ok(report)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
