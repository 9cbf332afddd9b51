// ABOUTME: CLI binary for schema-driven search result extraction.
// ABOUTME: Extracts saved HTML pages offline or runs live query batches against a search endpoint.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_json::Value;
use serp_extract::{
    extract_html_with_schema, load_registry_file, load_schema_file, Client, PageSchema,
    QueryTask, SearchEndpoint, SerpError, TimeoutPolicy,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "serp")]
#[command(about = "Extract structured search results with a declarative schema")]
struct Args {
    /// Schema JSON file (a registry object when --provider is given)
    #[arg(long = "schema")]
    schema: PathBuf,

    /// Schema name inside the registry file
    #[arg(long = "provider")]
    provider: Option<String>,

    /// Saved HTML page to extract (offline mode)
    #[arg(long = "html")]
    html: Option<PathBuf>,

    /// Base URL relative links in --html are resolved against
    #[arg(long = "url")]
    url: Option<String>,

    /// Search endpoint base URL (live mode)
    #[arg(long = "endpoint")]
    endpoint: Option<String>,

    /// Name of the query parameter on the endpoint
    #[arg(long = "query-param", default_value = "q")]
    query_param: String,

    /// Extra static endpoint parameter as key=value (repeatable)
    #[arg(long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Per-query timeout in milliseconds
    #[arg(long = "timeout-ms", default_value_t = 40_000)]
    timeout_ms: u64,

    /// Let timed-out queries finish in the background instead of cancelling them
    #[arg(long = "detach")]
    detach: bool,

    /// Allow fetching from private/local networks
    #[arg(long = "allow-private-networks")]
    allow_private_networks: bool,

    /// Output file path (default: stdout)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Print elapsed time in ms to stderr
    #[arg(long = "timing")]
    timing: bool,

    /// Queries to run (live mode)
    #[arg()]
    queries: Vec<String>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,serp_extract=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn load_schema(args: &Args) -> Result<Arc<PageSchema>, SerpError> {
    match args.provider {
        Some(ref name) => {
            let registry = load_registry_file(&args.schema)?;
            registry.shared(name)
        }
        None => load_schema_file(&args.schema).map(Arc::new),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Returns the JSON output and whether every query succeeded.
async fn run(args: &Args, schema: Arc<PageSchema>) -> Result<(String, bool), SerpError> {
    if let Some(ref html_path) = args.html {
        let html = fs::read_to_string(html_path).map_err(|e| {
            SerpError::extract(
                html_path.display().to_string(),
                "Read",
                Some(anyhow::Error::new(e)),
            )
        })?;
        let record = extract_html_with_schema(&schema, &html, args.url.as_deref())?;
        return Ok((pretty(&Value::Object(record)), true));
    }

    let Some(ref endpoint_url) = args.endpoint else {
        return Err(SerpError::invalid_url("", "Args", None));
    };
    let mut endpoint = SearchEndpoint::parse(endpoint_url)?.query_param(args.query_param.as_str());
    for (k, v) in &args.params {
        endpoint = endpoint.param(k.as_str(), v.as_str());
    }

    let policy = if args.detach {
        TimeoutPolicy::Detach
    } else {
        TimeoutPolicy::Cancel
    };
    let client = Client::builder()
        .timeout(Duration::from_millis(args.timeout_ms))
        .timeout_policy(policy)
        .allow_private_networks(args.allow_private_networks)
        .build()?;

    let tasks: Vec<QueryTask> = args.queries.iter().map(|q| QueryTask::new(q.as_str())).collect();
    let total = tasks.len();
    let result = client.search_with_schema(schema, endpoint, tasks).await;
    let all_ok = result.success_count() == total;
    Ok((pretty(&result.to_json()), all_ok))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    if args.html.is_some() && (args.endpoint.is_some() || !args.queries.is_empty()) {
        eprintln!("error: cannot combine --html with --endpoint or queries");
        return ExitCode::from(2);
    }
    if args.html.is_none() && args.endpoint.is_none() {
        eprintln!("error: either --html or --endpoint is required");
        return ExitCode::from(2);
    }
    if args.endpoint.is_some() && args.queries.is_empty() {
        eprintln!("error: at least one query is required with --endpoint");
        return ExitCode::from(2);
    }

    let schema = match load_schema(&args) {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("error loading schema: {}", e);
            return ExitCode::from(2);
        }
    };

    let start = Instant::now();
    let (output, all_ok) = match run(&args, schema).await {
        Ok(out) => out,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(1);
        }
    };
    let elapsed = start.elapsed();

    let mut had_error = !all_ok;
    if let Some(ref output_path) = args.output {
        if let Err(e) = fs::write(output_path, &output) {
            eprintln!("error writing to {:?}: {}", output_path, e);
            had_error = true;
        }
    } else {
        println!("{}", output);
    }

    if args.timing {
        let _ = writeln!(io::stderr(), "elapsed: {}ms", elapsed.as_millis());
    }

    if had_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
