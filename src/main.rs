use drydock::run::{DEFAULT_EVENT, DEFAULT_REPO};
use drydock::util::{init_logging, parse_level, LoggingConfig};
use drydock::{DockerCli, HttpClient, Invocation, RunOptions, VERSION};

use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, Level};

/// One-shot containerized code analysis
#[derive(Parser, Debug)]
#[command(
    name = "drydock",
    about = "Runs containerized analyzers over a local source tree",
    version,
    long_about = "drydock pulls and starts a set of analysis containers, streams \
                  analysis results for the given file or directory, optionally runs \
                  a post-build phase after extracting build units, and tears the \
                  containers down again."
)]
struct CliArgs {
    #[arg(value_name = "PATH", help = "File or directory to analyze")]
    target: PathBuf,

    #[arg(
        long = "analyzer",
        value_name = "IMAGE",
        help = "Third-party analyzer image to run (repeatable); defaults to the repository's .drydock.yml"
    )]
    analyzers: Vec<String>,

    #[arg(
        long,
        value_name = "SYSTEM",
        help = "Build system to extract build units with, enabling the post-build phase"
    )]
    build: Option<String>,

    #[arg(
        long = "category",
        value_name = "CATEGORY",
        help = "Analysis category to trigger (repeatable); defaults to the service configuration"
    )]
    categories: Vec<String>,

    #[arg(long, help = "Expose the local container daemon inside the analysis containers")]
    local_daemon: bool,

    #[arg(long, default_value = DEFAULT_EVENT, help = "Event name attached to the request")]
    event: String,

    #[arg(
        long,
        value_name = "FILE",
        help = "Write results as JSON to FILE instead of the console"
    )]
    json_output: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_REPO, help = "Registry prefix for the drydock images")]
    repo: String,

    #[arg(long, help = "Keep the containers running after the analysis")]
    stay_up: bool,

    #[arg(long, default_value = "prod", help = "Image tag; 'local' skips all pulling")]
    tag: String,

    #[arg(long, help = "Use the local build extractor image without pulling it")]
    local_extractor: bool,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    log_level: Option<String>,

    #[arg(short = 'v', long, help = "Verbose output")]
    verbose: bool,

    #[arg(short = 'q', long, conflicts_with = "verbose", help = "Only log errors")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("drydock v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let options = RunOptions {
        target: args.target,
        third_party_analyzers: args.analyzers,
        build: args.build,
        trigger_categories: args.categories,
        local_daemon: args.local_daemon,
        event: args.event,
        json_output: args.json_output,
        repo: args.repo,
        stay_up: args.stay_up,
        tag: args.tag,
        local_extractor: args.local_extractor,
    };

    let invocation = Invocation::new(
        options,
        Arc::new(DockerCli::new()),
        Arc::new(HttpClient::local()),
    );
    let report = invocation.run().await;

    println!("{} notes", report.notes);
    if let Some(e) = report.error {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("DRYDOCK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    init_logging(LoggingConfig::with_level(level));
}
