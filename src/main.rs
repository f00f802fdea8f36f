use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use review_pipeline::acquisition::ArchiveDownloader;
use review_pipeline::analysis::StatsReport;
use review_pipeline::config::Config;
use review_pipeline::error::Result;
use review_pipeline::logging;
use review_pipeline::pipeline::sample::SampleExporter;
use review_pipeline::pipeline::Pipeline;
use review_pipeline::storage::{
    DocumentStore, FilterCondition, QueryEngine, Storage, MASTER_TABLE,
};

#[derive(Parser)]
#[command(name = "review_pipeline")]
#[command(about = "Review dataset preprocessing and document store pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and extract raw review archives
    Acquire {
        /// Specific categories (comma-separated); defaults to all configured
        #[arg(long)]
        categories: Option<String>,
    },
    /// Run the preprocessing pipeline over extracted raw files and rebuild the store
    Process,
    /// Run acquisition and processing sequentially
    Run {
        /// Specific categories (comma-separated); defaults to all configured
        #[arg(long)]
        categories: Option<String>,
    },
    /// Filter query against the persisted store
    Query {
        /// Table to query
        #[arg(long, default_value = MASTER_TABLE)]
        table: String,
        #[arg(long)]
        min_rating: Option<f64>,
        #[arg(long)]
        max_rating: Option<f64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tier: Option<String>,
        #[arg(long)]
        segment: Option<String>,
        /// Print at most this many matching documents
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Exploratory statistics over the persisted store
    Stats,
    /// Export a representative sample of the persisted store
    Sample {
        /// Output path; defaults to the configured samples directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn selected_categories(config: &Config, categories: Option<String>) -> Vec<String> {
    match categories {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => config.category_names(),
    }
}

async fn acquire(config: &Config, categories: Vec<String>) -> Result<()> {
    println!("📥 Acquiring review archives...");
    let downloader = ArchiveDownloader::new(config.acquisition.clone())?;

    for category in &categories {
        if !config.categories.contains_key(category) {
            warn!(category = %category, "Unknown category requested");
            println!("⚠️  Unknown category: {}", category);
            continue;
        }
        match downloader.fetch_category(category, &config.data.raw_dir).await {
            Ok(path) => println!("✅ {}: extracted to {}", category, path.display()),
            Err(e) => {
                error!(category = %category, "Acquisition failed: {}", e);
                println!("❌ {}: {}", category, e);
            }
        }
    }
    Ok(())
}

async fn process(config: &Config) -> Result<()> {
    println!("🔧 Running preprocessing pipeline...");
    let storage: Arc<dyn Storage> = Arc::new(DocumentStore::new(&config.data.store_path));
    let pipeline = Pipeline::new(config.clone());

    let sources = pipeline.sources_from_raw_dir();
    if sources.is_empty() {
        println!(
            "⚠️  No raw review files under {}; run `acquire` first",
            config.data.raw_dir.display()
        );
        return Ok(());
    }

    let result = pipeline.run(sources, storage).await?;

    println!("\n📊 Pipeline Results:");
    println!("   Total records:       {}", result.stats.total_records);
    println!("   Stored documents:    {}", result.stats.stored_records);
    println!("   Rejected:            {}", result.stats.rejected_total());
    println!("   Duplicates dropped:  {}", result.stats.duplicates_dropped);
    println!("   Conversion failures: {}", result.stats.conversion_failures);
    println!("   Store snapshot:      {}", result.store_path);

    if !result.errors.is_empty() {
        warn!(
            "{} errors encountered during pipeline run",
            result.errors.len()
        );
        println!("\n⚠️  Errors encountered:");
        for error in &result.errors {
            println!("   - {}", error);
        }
    }
    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn Storage>> {
    let store = DocumentStore::open(&config.data.store_path).await?;
    Ok(Arc::new(store))
}

#[allow(clippy::too_many_arguments)]
async fn query(
    config: &Config,
    table: String,
    min_rating: Option<f64>,
    max_rating: Option<f64>,
    category: Option<String>,
    tier: Option<String>,
    segment: Option<String>,
    limit: usize,
) -> Result<()> {
    let storage = open_store(config).await?;
    let engine = QueryEngine::new(storage);

    let mut conditions = Vec::new();
    if let Some(min) = min_rating {
        conditions.push(FilterCondition::gte("rating", json!(min)));
    }
    if let Some(max) = max_rating {
        conditions.push(FilterCondition::lte("rating", json!(max)));
    }
    if let Some(category) = category {
        conditions.push(FilterCondition::equals("category", json!(category)));
    }
    if let Some(tier) = tier {
        conditions.push(FilterCondition::equals("rating_tier", json!(tier)));
    }
    if let Some(segment) = segment {
        conditions.push(FilterCondition::equals("commercial_segment", json!(segment)));
    }

    let results = engine.filter(&table, &conditions).await?;
    println!("🔍 {} matching documents in '{}'", results.len(), table);
    for document in results.iter().take(limit) {
        println!("{}", serde_json::to_string_pretty(document)?);
    }
    if results.len() > limit {
        println!("   ... and {} more (raise --limit to see them)", results.len() - limit);
    }
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let storage = open_store(config).await?;
    let engine = QueryEngine::new(storage.clone());

    let documents = storage.get_all(MASTER_TABLE).await?;
    let report = StatsReport::compute(&documents);
    println!("📈 Dataset statistics:");
    println!("{}", serde_json::to_string_pretty(&report)?);

    let averages = engine.average_rating_by_category().await?;
    println!("\n⭐ Average rating by category:");
    println!("{}", serde_json::to_string_pretty(&averages)?);

    if let Some(metadata) = storage.get_metadata().await? {
        info!(
            record_count = metadata.record_count,
            built_at = %metadata.built_at,
            "Store metadata"
        );
        println!("\n🗂  Store built at {} ({} records)", metadata.built_at, metadata.record_count);
    }
    Ok(())
}

async fn sample(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let storage = open_store(config).await?;
    let out_path = output.unwrap_or_else(|| {
        config
            .data
            .samples_dir
            .join("representative_sample.json")
    });

    let exporter = SampleExporter::new(config.sampling.clone());
    let exported = exporter.export(&storage, &out_path).await?;
    println!("✅ Exported {} documents to {}", exported, out_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Acquire { categories } => {
            let categories = selected_categories(&config, categories);
            acquire(&config, categories).await?;
        }
        Commands::Process => {
            process(&config).await?;
        }
        Commands::Run { categories } => {
            println!("🚀 Running full pipeline (acquire + process)...");
            let categories = selected_categories(&config, categories);
            acquire(&config, categories).await?;
            process(&config).await?;
        }
        Commands::Query {
            table,
            min_rating,
            max_rating,
            category,
            tier,
            segment,
            limit,
        } => {
            query(
                &config, table, min_rating, max_rating, category, tier, segment, limit,
            )
            .await?;
        }
        Commands::Stats => {
            stats(&config).await?;
        }
        Commands::Sample { output } => {
            sample(&config, output).await?;
        }
    }
    Ok(())
}
