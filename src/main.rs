mod brands;
mod categories;
mod classify;
mod db;
mod dedup;
mod error;
mod export;
mod import;
mod reclassify;
mod report;
mod scrape;
mod settings;
mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;

use classify::Ruleset;
use db::memory::MemoryStore;
use db::rest::RestStore;
use db::CatalogStore;
use settings::Settings;

#[derive(Parser)]
#[command(name = "catalog", about = "Tractor-parts catalog: scrape, classify, import and audit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a supplier listing into a CSV/JSON snapshot
    Scrape {
        /// Supplier profile key (zip-agro, tata-agro, agrodom, or one from --profiles)
        supplier: String,
        /// Output snapshot (.csv or .json)
        #[arg(short, long)]
        out: PathBuf,
        /// Listing path or URL, repeatable (default: the profile's listings)
        #[arg(short, long)]
        listing: Vec<String>,
        /// Page ceiling per listing (default: the profile's)
        #[arg(short = 'n', long)]
        max_pages: Option<u32>,
        /// Extra supplier profiles as JSON
        #[arg(long)]
        profiles: Option<PathBuf>,
    },
    /// Print brand, part type and category for each title
    Classify {
        #[arg(required = true)]
        titles: Vec<String>,
    },
    /// Import a snapshot into the catalog, skipping names already present
    Import {
        file: PathBuf,
        /// Put every row into this category slug
        #[arg(long)]
        category: Option<String>,
        /// Classify and count without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Create the brand × part type categories that are missing
    Categories {
        #[arg(long)]
        apply: bool,
    },
    /// Recompute brand, part type and category for existing products
    Reclassify {
        /// Only touch products without a known brand
        #[arg(long)]
        only_universal: bool,
        /// Concurrent update requests
        #[arg(short, long, default_value_t = reclassify::DEFAULT_WORKERS)]
        workers: usize,
        #[arg(long)]
        apply: bool,
        /// Brand moves to list
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Fold manufacturer spellings to canonical brand labels
    NormalizeBrands {
        #[arg(short, long, default_value_t = reclassify::DEFAULT_WORKERS)]
        workers: usize,
        #[arg(long)]
        apply: bool,
    },
    /// Find duplicate products and delete all but the oldest
    Dedup {
        #[arg(long, value_enum, default_value = "name")]
        by: dedup::DedupKey,
        #[arg(long)]
        apply: bool,
        /// Groups to list
        #[arg(long, default_value = "20")]
        top: usize,
    },
    /// Catalog totals, distribution and category reconciliation
    Report {
        /// Rows per section
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },
    /// Dump all products to a CSV/JSON snapshot
    Export { file: PathBuf },
}

fn connect(settings: &Settings) -> anyhow::Result<Arc<dyn CatalogStore>> {
    Ok(Arc::new(RestStore::connect(settings)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let ruleset = Ruleset::load(settings.ruleset.as_deref())?;

    let result = match cli.command {
        Commands::Scrape {
            supplier,
            out,
            listing,
            max_pages,
            profiles,
        } => {
            let all = scrape::suppliers::load(profiles.as_deref())?;
            let supplier = scrape::suppliers::find(&all, &supplier)?;
            let listings: Vec<scrape::suppliers::Listing> = if listing.is_empty() {
                supplier.listings.clone()
            } else {
                listing.iter().map(|l| l.as_str().into()).collect()
            };
            let max_pages = max_pages.unwrap_or(supplier.max_pages);
            let fetcher = scrape::HttpFetcher::new(&settings)?;

            println!(
                "Scraping {}: {} listings, up to {} pages each...",
                supplier.key,
                listings.len(),
                max_pages
            );
            let stats = scrape::scrape_supplier(&fetcher, supplier, &listings, max_pages, &out).await?;
            println!(
                "Saved {} products from {} pages of {} listings to {} ({} repeats dropped, {} pages failed).",
                stats.records,
                stats.pages,
                stats.listings,
                out.display(),
                stats.duplicates,
                stats.failed_pages
            );
            Ok(())
        }
        Commands::Classify { titles } => {
            println!(
                "{:<40} | {:<10} | {:<24} | {:<8} | {}",
                "Title", "Brand", "Part type", "Engine", "Category"
            );
            println!("{}", "-".repeat(110));
            for title in &titles {
                let c = ruleset.classify(title);
                println!(
                    "{:<40} | {:<10} | {:<24} | {:<8} | {}",
                    truncate(title, 40),
                    c.brand,
                    ruleset.part_type_name(&c.part_type).unwrap_or(&c.part_type),
                    c.engine_model.as_deref().unwrap_or("-"),
                    ruleset.category_slug(&c)
                );
            }
            Ok(())
        }
        Commands::Import {
            file,
            category,
            dry_run,
        } => {
            let records = snapshot::read(&file)?;
            if records.is_empty() {
                println!("{} has no rows.", file.display());
                return Ok(());
            }
            let store: Arc<dyn CatalogStore> = if dry_run && settings.credentials().is_err() {
                warn!("No Supabase credentials; dry run checks duplicates within the file only");
                Arc::new(MemoryStore::new())
            } else {
                connect(&settings)?
            };
            println!("Importing {} rows from {}...", records.len(), file.display());
            let opts = import::ImportOptions {
                category,
                dry_run,
                batch_size: settings.batch_size,
            };
            let stats = import::run(store.as_ref(), &ruleset, &records, &opts).await?;
            stats.print();
            if dry_run {
                println!("Dry run; nothing was written.");
            }
            Ok(())
        }
        Commands::Categories { apply } => {
            let store = connect(&settings)?;
            let existing = store.list_categories().await?;
            let missing = categories::missing(&ruleset, &existing);
            println!(
                "{} categories exist, {} of {} expected are missing.",
                existing.len(),
                missing.len(),
                ruleset.categories().len()
            );
            for c in &missing {
                println!("  {:<36} {}", c.slug, c.name);
            }
            if apply {
                let created = categories::apply(store.as_ref(), &ruleset).await?;
                println!("Created {} categories.", created);
            } else if !missing.is_empty() {
                println!("Pass --apply to create them.");
            }
            Ok(())
        }
        Commands::Reclassify {
            only_universal,
            workers,
            apply,
            top,
        } => {
            let store = connect(&settings)?;
            let cats = store.list_categories().await?;
            let products = db::fetch_all_products(store.as_ref()).await?;
            println!("Planning {} products...", products.len());
            let mut plan = reclassify::plan(&ruleset, &products, &cats, only_universal);
            plan.print(top);
            if apply && !plan.updates.is_empty() {
                reclassify::resolve_categories(store.as_ref(), &ruleset, &mut plan.updates).await?;
                let stats = reclassify::apply_updates(store, plan.updates, workers).await?;
                stats.print();
            } else if !apply {
                println!("Pass --apply to write.");
            }
            Ok(())
        }
        Commands::NormalizeBrands { workers, apply } => {
            let store = connect(&settings)?;
            let products = db::fetch_all_products(store.as_ref()).await?;
            let plan = brands::plan(&ruleset, &products);
            plan.print();
            if apply && !plan.updates.is_empty() {
                let stats = reclassify::apply_updates(store, plan.updates, workers).await?;
                stats.print();
            } else if !apply {
                println!("Pass --apply to write.");
            }
            Ok(())
        }
        Commands::Dedup { by, apply, top } => {
            let store = connect(&settings)?;
            let products = db::fetch_all_products(store.as_ref()).await?;
            let groups = dedup::find_duplicates(&products, by);
            dedup::print_groups(&groups, top);
            if apply && !groups.is_empty() {
                let deleted = dedup::remove(store.as_ref(), &groups).await?;
                println!("Deleted {} rows.", deleted);
            } else if !apply && !groups.is_empty() {
                println!("Pass --apply to delete.");
            }
            Ok(())
        }
        Commands::Report { top } => {
            let store = connect(&settings)?;
            let cats = store.list_categories().await?;
            let products = db::fetch_all_products(store.as_ref()).await?;
            report::build(&ruleset, &cats, &products).print(top);
            Ok(())
        }
        Commands::Export { file } => {
            let store = connect(&settings)?;
            let cats = store.list_categories().await?;
            let products = db::fetch_all_products(store.as_ref()).await?;
            let records = export::to_records(&cats, &products);
            snapshot::write(&file, &records)
                .with_context(|| format!("Failed to export to {}", file.display()))?;
            println!("Exported {} products to {}.", records.len(), file.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// At most `max` characters of `s`, marked with "..." when cut.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let total = d.as_secs();
    match (total / 3600, total % 3600 / 60, total % 60) {
        (0, 0, _) => format!("{:.1}s", d.as_secs_f64()),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, m, s) => format!("{}h {}m {}s", h, m, s),
    }
}
