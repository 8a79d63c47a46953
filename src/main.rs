//! PageIndex CLI
//!
//! Builds page-anchored table-of-contents trees for PDF and text documents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pageindex::{
    config::{Config, IndexConfig, PageMethod, TocDetection},
    document::Document,
    indexer::TreeIndexer,
    llm::{DisabledGenerator, LlmClient, TextGenerator},
    pdf::LopdfExtractor,
    persistence::{default_output_path, load_tree, save_tree, tree_exists, tree_size},
    tokenizer::tokenizer_for,
    tree::DocumentTree,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// PageIndex - hierarchical, page-anchored document structure
#[derive(Parser)]
#[command(name = "pageindex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum YesNo {
    Yes,
    No,
}

impl From<YesNo> for bool {
    fn from(value: YesNo) -> Self {
        value == YesNo::Yes
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TxtMethod {
    Token,
    Char,
}

/// Overrides for the indexing configuration; unset flags keep the config file value.
#[derive(clap::Args, Debug)]
struct IndexArgs {
    /// Model identifier for the LLM endpoint
    #[arg(long)]
    model: Option<String>,

    /// Pages scanned for a table of contents
    #[arg(long)]
    toc_check_pages: Option<usize>,

    /// Maximum pages in a leaf node
    #[arg(long)]
    max_pages_per_node: Option<usize>,

    /// Maximum tokens in a leaf node
    #[arg(long)]
    max_tokens_per_node: Option<usize>,

    #[arg(long, value_enum)]
    if_add_node_id: Option<YesNo>,

    #[arg(long, value_enum)]
    if_add_node_summary: Option<YesNo>,

    #[arg(long, value_enum)]
    if_add_doc_description: Option<YesNo>,

    #[arg(long, value_enum)]
    if_add_node_text: Option<YesNo>,

    /// How plain text is cut into pages
    #[arg(long, value_enum)]
    txt_method: Option<TxtMethod>,

    #[arg(long)]
    txt_tokens_per_page: Option<usize>,

    #[arg(long)]
    txt_chars_per_page: Option<usize>,

    /// Tokenizer encoding name
    #[arg(long)]
    txt_tokenizer: Option<String>,

    /// Units repeated at the start of each text page
    #[arg(long)]
    txt_chunk_overlap: Option<usize>,

    /// Ask the LLM to find the table of contents instead of line patterns
    #[arg(long)]
    llm_toc_detection: bool,

    /// Run without any LLM calls
    #[arg(long)]
    no_llm: bool,
}

impl IndexArgs {
    fn apply(&self, config: &mut Config) {
        let index: &mut IndexConfig = &mut config.index;
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(v) = self.toc_check_pages {
            index.toc_check_page_num = v;
        }
        if let Some(v) = self.max_pages_per_node {
            index.max_page_num_each_node = v;
        }
        if let Some(v) = self.max_tokens_per_node {
            index.max_token_num_each_node = v;
        }
        if let Some(v) = self.if_add_node_id {
            index.if_add_node_id = v.into();
        }
        if let Some(v) = self.if_add_node_summary {
            index.if_add_node_summary = v.into();
        }
        if let Some(v) = self.if_add_doc_description {
            index.if_add_doc_description = v.into();
        }
        if let Some(v) = self.if_add_node_text {
            index.if_add_node_text = v.into();
        }
        if let Some(method) = self.txt_method {
            index.txt_page_method = match method {
                TxtMethod::Token => PageMethod::Token,
                TxtMethod::Char => PageMethod::Char,
            };
        }
        if let Some(v) = self.txt_tokens_per_page {
            index.txt_tokens_per_page = v;
        }
        if let Some(v) = self.txt_chars_per_page {
            index.txt_chars_per_page = v;
        }
        if let Some(v) = &self.txt_tokenizer {
            index.txt_tokenizer = v.clone();
        }
        if let Some(v) = self.txt_chunk_overlap {
            index.txt_chunk_overlap = v;
        }
        if self.llm_toc_detection {
            index.toc_detection = TocDetection::Llm;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the structure tree for a document
    Index {
        /// Path to the document (.pdf or .txt)
        document: PathBuf,

        /// Output path (defaults to results/<name>_structure.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        args: IndexArgs,
    },

    /// Display the tree structure of an index
    Show {
        /// Path to the structure file
        index: PathBuf,

        /// Output as JSON instead of formatted tree
        #[arg(long)]
        json: bool,
    },

    /// Show information about an index
    Info {
        /// Path to the structure file
        index: PathBuf,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Index {
            document,
            output,
            args,
        } => cmd_index(document, output, args).await,
        Commands::Show { index, json } => cmd_show(index, json),
        Commands::Info { index } => cmd_info(index),
        Commands::Test => cmd_test().await,
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn build<G: TextGenerator>(
    generator: G,
    config: IndexConfig,
    document: &Document,
) -> Result<DocumentTree> {
    TreeIndexer::new(generator, config)
        .index(document)
        .await
        .context("Failed to build tree index")
}

async fn cmd_index(document_path: PathBuf, output: Option<PathBuf>, args: IndexArgs) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    args.apply(&mut config);
    config.index.validate().context("Invalid configuration")?;
    if !args.no_llm {
        config.validate_llm().context("Invalid LLM configuration (use --no-llm to skip)")?;
    }

    println!("Indexing document: {}", document_path.display());
    if args.no_llm {
        println!("LLM disabled, using heuristics only");
    } else {
        println!("Using model: {}", config.llm.model);
    }

    let start = Instant::now();

    let tokenizer = tokenizer_for(&config.index.txt_tokenizer);
    let document = Document::from_path(
        &document_path,
        &config.index,
        tokenizer.as_ref(),
        &LopdfExtractor,
    )
    .context("Failed to load document")?;

    println!(
        "  Document: {} ({} pages, ~{} tokens)",
        document.name,
        document.page_count(),
        document.total_tokens()
    );

    let tree = if args.no_llm {
        build(DisabledGenerator, config.index, &document).await?
    } else {
        build(LlmClient::new(config.llm), config.index, &document).await?
    };

    let build_duration = start.elapsed();

    println!("\nTree Index Built:");
    println!("  Sections:    {}", tree.node_count());
    println!("  Max depth:   {}", tree.max_depth());
    println!("  Warnings:    {}", tree.warnings.len());
    println!("  Build time:  {:.2?}", build_duration);

    let output = output.unwrap_or_else(|| default_output_path(&document_path));
    save_tree(&tree, &output).context("Failed to save tree index")?;

    let size = tree_size(&output)?;
    println!("\nIndex saved to: {}", output.display());
    println!("  File size: {:.1} KB", size as f64 / 1024.0);

    Ok(())
}

fn cmd_show(index_path: PathBuf, json: bool) -> Result<()> {
    if !tree_exists(&index_path) {
        anyhow::bail!(
            "Index not found at '{}'. Run 'index' command first.",
            index_path.display()
        );
    }

    let tree = load_tree(&index_path).context("Failed to load tree index")?;

    if json {
        let json_str = tree.to_json().context("Failed to serialize tree")?;
        println!("{}", json_str);
    } else {
        println!("{}", tree.format());
    }

    Ok(())
}

fn cmd_info(index_path: PathBuf) -> Result<()> {
    if !tree_exists(&index_path) {
        anyhow::bail!(
            "Index not found at '{}'. Run 'index' command first.",
            index_path.display()
        );
    }

    let tree = load_tree(&index_path).context("Failed to load tree index")?;
    let size = tree_size(&index_path)?;

    println!("Tree Index Information");
    println!("{}", "─".repeat(40));
    println!("  Document:     {}", tree.name);
    println!("  Total pages:  {}", tree.total_pages);
    println!("  Sections:     {}", tree.node_count());
    println!("  Leaves:       {}", tree.leaves().len());
    println!("  Max depth:    {}", tree.max_depth());
    println!("  Warnings:     {}", tree.warnings.len());
    println!("  File size:    {:.1} KB", size as f64 / 1024.0);
    println!("  Index path:   {}", index_path.display());

    if let Some(desc) = &tree.description {
        println!("  Description:  {}", desc);
    }

    match tree.validate() {
        Ok(()) => println!("  Coverage:     ok"),
        Err(e) => println!("  Coverage:     {}", e),
    }

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    let key_preview: String = config.llm.api_key.chars().take(8).collect();
    println!("  API Key:   {}...", key_preview);
    println!();

    if let Err(e) = config.validate_llm() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
