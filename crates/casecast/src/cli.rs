use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "casecast",
    about = "Predict UK tenancy deposit tribunal outcomes from past decisions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest tribunal decision PDFs into the corpus.
    Ingest {
        #[arg(long)]
        pdf_dir: String,
        /// Re-embed documents that are already indexed.
        #[arg(long, default_value_t = false)]
        reingest: bool,
    },
    /// Query the corpus for similar cases.
    Query {
        text: String,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        year_min: Option<i32>,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate an outcome prediction for a case file.
    Predict {
        /// Path to a CaseFile JSON snapshot (as produced by intake).
        #[arg(long)]
        case_file: String,
        #[arg(long, default_value_t = false)]
        no_reasoning: bool,
        #[arg(long)]
        max_cases: Option<usize>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print corpus statistics.
    Stats,
    /// Delete all indexed data.
    Clear,
    /// Rebuild the BM25 index from the semantic store.
    RebuildBm25,
}
