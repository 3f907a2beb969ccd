//! issue-melt: Run a tracker query and export flat rows
//!
//! Usage:
//!   # Query the tracker (credentials from JIRA_BASE_URL / JIRA_EMAIL / JIRA_API_TOKEN)
//!   issue-melt --jql "project = X" --field summary=Summary --field status.name=Status
//!
//!   # Standard report columns, written as JSON Lines
//!   issue-melt --jql "project = X AND sprint in openSprints()" --format jsonl
//!
//!   # Field list from a file, CSV written to disk
//!   issue-melt --jql "project = X" --fields-file fields.json --output issues.csv
//!
//!   # Replay captured search responses without touching the network
//!   issue-melt --jql "project = X" --replay pages.json

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use issue_melt::catalog;
use issue_melt::melt::{declared_columns, CsvRecordWriter, FieldSpec, JsonLinesWriter};
use issue_melt::query::{
    Auth, ClientConfig, HttpSearchClient, QueryEngine, QueryOptions, SearchPage, SearchTransport,
    StaticPages, DEFAULT_PAGE_SIZE, DEFAULT_SEARCH_PATH,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Jsonl,
}

#[derive(Parser, Debug)]
#[command(name = "issue-melt")]
#[command(about = "Run a tracker query and export flat rows", long_about = None)]
struct Args {
    /// Query text sent to the search endpoint
    #[arg(long)]
    jql: String,

    /// Field to request, as wire[.flattenKey][=Alias] (repeatable)
    #[arg(long = "field", value_name = "SPEC")]
    fields: Vec<String>,

    /// JSON file holding an array of {"wire", "alias", "flatten", "separator"} objects
    #[arg(long, value_name = "FILE")]
    fields_file: Option<String>,

    /// Custom field code holding sprint assignments (standard report only)
    #[arg(long, env = "JIRA_SPRINT_FIELD", default_value = "customfield_10020")]
    sprint_field: String,

    /// Custom field code holding story points (standard report only)
    #[arg(long, env = "JIRA_POINTS_FIELD", default_value = "customfield_10016")]
    points_field: String,

    /// Tracker base URL
    #[arg(long, env = "JIRA_BASE_URL")]
    base_url: Option<String>,

    /// Account email for basic auth
    #[arg(long, env = "JIRA_EMAIL")]
    email: Option<String>,

    /// API token (bearer token when no email is given)
    #[arg(long, env = "JIRA_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Search endpoint path
    #[arg(long, env = "JIRA_SEARCH_PATH", default_value = DEFAULT_SEARCH_PATH)]
    search_path: String,

    /// Request timeout in seconds
    #[arg(long, env = "JIRA_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Results requested per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Stop after this many results
    #[arg(long)]
    max_results: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Output file (stdout if omitted)
    #[arg(long, short = 'o')]
    output: Option<String>,

    /// Replay captured search responses (JSON array, single page or NDJSON)
    #[arg(long, value_name = "FILE")]
    replay: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let fields = resolve_fields(&args)?;
    let options = QueryOptions {
        page_size: args.page_size,
        max_results: args.max_results,
    };

    if let Some(path) = &args.replay {
        let pages = read_capture(path)?;
        let engine = QueryEngine::new(StaticPages::new(pages)).with_options(options);
        run(&engine, &args, &fields).await
    } else {
        let engine = QueryEngine::new(HttpSearchClient::new(client_config(&args)?)?).with_options(options);
        run(&engine, &args, &fields).await
    }
}

/// Run the query and write every record
async fn run<T: SearchTransport>(engine: &QueryEngine<T>, args: &Args, fields: &[FieldSpec]) -> Result<()> {
    let outcome = engine
        .run_query_detailed(&args.jql, fields)
        .await
        .with_context(|| format!("Query failed: {}", args.jql))?;

    for warning in &outcome.warnings {
        eprintln!("⚠ Warning: {}", warning);
    }

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Cannot create output file: {}", path))?,
        )),
        None => Box::new(std::io::stdout()),
    };

    match args.format {
        Format::Csv => {
            let mut writer = CsvRecordWriter::new(output).with_columns(declared_columns(fields));
            writer.write_records(&outcome.records)?;
            writer.flush()?;
        }
        Format::Jsonl => {
            let mut writer = JsonLinesWriter::new(output);
            writer.write_records(&outcome.records)?;
            writer.flush()?;
        }
    }

    eprintln!(
        "✓ {} records from {} page(s)",
        outcome.records.len(),
        outcome.pages
    );
    Ok(())
}

/// Explicit fields first, then the fields file; the standard report when neither is given
fn resolve_fields(args: &Args) -> Result<Vec<FieldSpec>> {
    let mut fields = Vec::new();

    for spec in &args.fields {
        fields.push(spec.parse::<FieldSpec>()?);
    }

    if let Some(path) = &args.fields_file {
        let file = File::open(path).with_context(|| format!("Cannot open fields file: {}", path))?;
        let from_file: Vec<FieldSpec> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid fields file: {}", path))?;
        fields.extend(from_file);
    }

    if fields.is_empty() {
        fields = catalog::default_report(&args.sprint_field, &args.points_field);
    }
    Ok(fields)
}

fn client_config(args: &Args) -> Result<ClientConfig> {
    let Some(base_url) = &args.base_url else {
        bail!("No tracker URL: pass --base-url or set JIRA_BASE_URL (or use --replay)");
    };

    let mut config = ClientConfig::new(base_url.clone());
    config.search_path = args.search_path.clone();
    config.timeout_secs = args.timeout_secs;
    config.auth = match (&args.email, &args.token) {
        (Some(email), Some(token)) => Auth::Basic {
            email: email.clone(),
            token: token.clone(),
        },
        (None, Some(token)) => Auth::Bearer(token.clone()),
        _ => Auth::None,
    };
    Ok(config)
}

/// Read captured search pages using SIMD-accelerated JSON parsing when possible
fn read_capture(path: &str) -> Result<Vec<SearchPage>> {
    let mut content = Vec::new();
    BufReader::new(File::open(path).with_context(|| format!("Cannot open capture: {}", path))?)
        .read_to_end(&mut content)?;

    let mut pages = Vec::new();

    match simd_json::to_owned_value(&mut content.clone()) {
        Ok(simd_json::OwnedValue::Array(arr)) => {
            // JSON array of pages
            for elem in arr.iter() {
                let json_str = simd_json::to_string(elem)?;
                pages.push(serde_json::from_str(&json_str)?);
            }
        }
        Ok(elem) => {
            // Single page
            let json_str = simd_json::to_string(&elem)?;
            pages.push(serde_json::from_str(&json_str)?);
        }
        Err(_) => {
            // Fallback to serde_json for NDJSON
            let content_str = String::from_utf8_lossy(&content);
            for (idx, line) in content_str.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let page: SearchPage = serde_json::from_str(line)
                    .with_context(|| format!("JSON parse error on line {}", idx + 1))?;
                pages.push(page);
            }
        }
    }

    if pages.is_empty() {
        bail!("Capture {} holds no search pages", path);
    }
    Ok(pages)
}
