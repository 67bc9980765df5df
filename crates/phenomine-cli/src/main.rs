//! Phenomine CLI
//!
//! Run clinical text through a concept-mining service and print what a
//! curator would review:
//! - `mine`: one live round against the service
//! - `render`: the same output from a saved service payload, offline

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use phenomine_core::{render, render_document, AnnotationSet, PhenotypeTerm, SidePanel};
use phenomine_mining::config::{DEFAULT_TIMEOUT_SECS, DEFAULT_VOCABULARY};
use phenomine_mining::{decode, CurationSession, MiningConfig, Signal};
use url::Url;

#[derive(Parser)]
#[command(name = "phenomine")]
#[command(author, version, about = "Phenomine: phenotype concept mining and curation")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine a text file (or stdin) and print the highlighted text and the
    /// present / NOT lists.
    Mine {
        #[command(flatten)]
        service: ServiceArgs,
        /// Query text; stdin when omitted or `-`
        input: Option<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
        /// Approve every recognized term and print them as JSON lines
        #[arg(long)]
        approve_all: bool,
    },

    /// Render a saved service payload over its query text.
    Render {
        /// Query text the payload was mined from
        #[arg(long)]
        text: PathBuf,
        /// JSON payload returned by the service
        #[arg(long)]
        payload: PathBuf,
        #[arg(long, env = "PHENOMINE_VOCABULARY", default_value = DEFAULT_VOCABULARY)]
        vocabulary: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct ServiceArgs {
    /// Mining service endpoint
    #[arg(long, env = "PHENOMINE_ENDPOINT")]
    endpoint: Url,
    /// Namespace prefix of the ids to keep
    #[arg(long, env = "PHENOMINE_VOCABULARY", default_value = DEFAULT_VOCABULARY)]
    vocabulary: String,
    #[arg(long, env = "PHENOMINE_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
}

impl ServiceArgs {
    fn config(&self) -> Result<MiningConfig> {
        let config = MiningConfig::new(self.endpoint.clone())
            .with_vocabulary(self.vocabulary.clone())
            .with_timeout_secs(self.timeout_secs)
            .with_user_agent(concat!("phenomine/", env!("CARGO_PKG_VERSION")));
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
struct OutputArgs {
    /// Print a standalone HTML document instead of the fragment
    #[arg(long)]
    document: bool,
    /// Skip the present / NOT lists
    #[arg(long)]
    no_panel: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Mine {
            service,
            input,
            output,
            approve_all,
        } => cmd_mine(&service, input.as_deref(), &output, approve_all).await,
        Commands::Render {
            text,
            payload,
            vocabulary,
            output,
        } => cmd_render(&text, &payload, &vocabulary, &output),
    }
}

fn init_tracing(verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter_directives(
            verbose,
            rust_log.as_deref(),
        )))
        .init();
}

/// A non-empty `RUST_LOG` wins over the `--verbose` level.
fn filter_directives(verbose: bool, rust_log: Option<&str>) -> String {
    match rust_log.map(str::trim) {
        Some(directives) if !directives.is_empty() => directives.to_string(),
        _ if verbose => "debug".to_string(),
        _ => "info".to_string(),
    }
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

async fn cmd_mine(
    service: &ServiceArgs,
    input: Option<&Path>,
    output: &OutputArgs,
    approve_all: bool,
) -> Result<()> {
    let query = read_input(input)?;
    if query.trim().is_empty() {
        return Err(anyhow!("query text is empty"));
    }

    let config = service.config()?;
    let mut session = CurationSession::from_config(&config)?;
    eprintln!("{} {}", "Mining".green().bold(), config.endpoint);

    session.submit(query)?;
    let token = session
        .next_completion()
        .await
        .ok_or_else(|| anyhow!("mining round ended without an answer"))??;
    tracing::debug!(%token, "round ready");

    let round = session
        .review_mut()
        .ok_or_else(|| anyhow!("no round under review"))?;
    let markup = if output.document {
        round.document()
    } else {
        round.markup()
    };
    println!("{markup}");
    if !output.no_panel {
        print_panel(round.panel());
    }

    if approve_all {
        round.approve_all();
        let approved = session.finish(Signal::Done)?;
        for term in &approved {
            println!("{}", term_json(term));
        }
        eprintln!("{} {} term(s) approved", "ok".green().bold(), approved.len());
    } else {
        session.finish(Signal::Cancelled)?;
    }
    session.close();
    Ok(())
}

fn cmd_render(text: &Path, payload: &Path, vocabulary: &str, output: &OutputArgs) -> Result<()> {
    let query = fs::read_to_string(text)
        .with_context(|| format!("failed to read {}", text.display()))?;
    let raw = fs::read_to_string(payload)
        .with_context(|| format!("failed to read {}", payload.display()))?;

    let set: AnnotationSet = decode(&raw, &query, vocabulary)?
        .into_iter()
        .map(PhenotypeTerm::from)
        .collect();

    let markup = if output.document {
        render_document(&query, set.iter())
    } else {
        render(&query, set.iter())
    };
    println!("{markup}");
    if !output.no_panel {
        print_panel(&set.side_panel());
    }
    Ok(())
}

fn print_panel(panel: &SidePanel) {
    eprintln!();
    eprintln!("{} ({})", "Present".green().bold(), panel.present.len());
    for term in &panel.present {
        eprintln!("  {} {}", term.id().to_string().cyan(), term.term.name);
    }
    eprintln!("{} ({})", "NOT".red().bold(), panel.excluded.len());
    for term in &panel.excluded {
        eprintln!("  {} {}", term.id().to_string().cyan(), term.term.name);
    }
}

fn term_json(term: &PhenotypeTerm) -> String {
    serde_json::json!({
        "id": term.id().as_str(),
        "name": term.term.name,
        "present": term.present,
        "start": term.span.start,
        "end": term.span.end,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_overrides_verbosity() {
        assert_eq!(filter_directives(true, Some("phenomine_mining=warn")), "phenomine_mining=warn");
        assert_eq!(filter_directives(false, Some("warn")), "warn");
        assert_eq!(filter_directives(true, None), "debug");
        assert_eq!(filter_directives(false, Some("  ")), "info");
    }
}
