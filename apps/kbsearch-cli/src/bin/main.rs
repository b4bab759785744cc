use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kbsearch_cli::backends::build_dealer;
use kbsearch_cli::output::render_text;
use kbsearch_cli::parse_filter;
use kbsearch_core::config::Config;
use kbsearch_core::types::{Query, Scope, SearchOptions};
use kbsearch_embed::get_default_embedder;

/// kbsearch - hybrid retrieval over local knowledge bases
#[derive(Parser, Debug)]
#[command(name = "kbsearch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve ranked, cited chunks for a question
    Search(SearchArgs),
    /// Show corpus statistics used for term weighting
    Stats,
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    #[arg(long, short)]
    question: String,
    /// Knowledge bases to search
    #[arg(long = "kb", default_value = "default")]
    kb_ids: Vec<String>,
    /// Restrict to these documents
    #[arg(long = "doc")]
    doc_ids: Vec<String>,
    /// Metadata equality filter, key=value
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    #[arg(long, default_value_t = 5)]
    top_k: usize,
    /// Similarity threshold (0.0-1.0)
    #[arg(long, default_value_t = 0.2)]
    similarity: f32,
    #[arg(long)]
    rerank: bool,
    #[arg(long)]
    highlight: bool,
    /// Search lexically only, without embedding the question
    #[arg(long)]
    no_embed: bool,
    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("KBSEARCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = Config::load()?;
    let base = std::env::current_dir()?;
    let dealer = build_dealer(&config, &base).await?;

    match args.command {
        Command::Stats => {
            let stats = dealer.term_stats().snapshot();
            println!("documents: {}", stats.doc_count);
            println!("distinct terms: {}", stats.doc_freq.len());
            println!("avg tokens per chunk: {:.1}", stats.avg_doc_len());
        }
        Command::Search(s) => {
            let mut query = Query::new(s.question.clone());
            for (k, v) in s.filters {
                query = query.with_filter(k, v);
            }
            if !s.no_embed {
                match embed(&config, &s.question) {
                    Ok(e) => query = query.with_embedding(e),
                    Err(e) => tracing::warn!(error = %e, "query embedding unavailable, searching lexically"),
                }
            }
            let mut scope = Scope::knowledge_bases(s.kb_ids);
            if !s.doc_ids.is_empty() {
                scope = scope.with_documents(s.doc_ids);
            }
            let options = SearchOptions {
                rerank: s.rerank,
                rerank_top_n: None,
                similarity_threshold: Some(s.similarity),
                highlight: s.highlight,
            };

            let res = dealer.search(&query, &scope, s.top_k, &options).await?;
            if s.json {
                println!("{}", serde_json::to_string_pretty(&res)?);
            } else {
                print!("{}", render_text(&s.question, &res));
            }
        }
    }
    Ok(())
}

fn embed(config: &Config, text: &str) -> anyhow::Result<Vec<f32>> {
    let embedder = get_default_embedder(&config.embed()?)?;
    embedder
        .embed_batch(&[text.to_string()])?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
}
