use std::collections::HashSet;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::categories;
use crate::classify::{slug, Ruleset};
use crate::db::{self, CatalogStore, NewProduct, Specifications};
use crate::snapshot::{self, SnapshotRecord};

pub struct ImportOptions {
    /// Put everything into this category instead of the classified one.
    pub category: Option<String>,
    pub dry_run: bool,
    pub batch_size: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub read: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub blank: usize,
    pub unclassified: usize,
    pub failed_batches: usize,
}

impl ImportStats {
    pub fn print(&self) {
        println!(
            "Read {} rows: {} inserted, {} duplicates, {} blank, {} unclassified, {} failed batches.",
            self.read, self.inserted, self.duplicates, self.blank, self.unclassified, self.failed_batches,
        );
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Non-empty, trimmed text or `None`.
fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Slug stem for a product: `<brand>-<title>`, falling back to the article
/// and then to `product` when the title has nothing slug-worthy. Made
/// unique later in [`run`].
fn base_slug(brand_slug: &str, record: &SnapshotRecord) -> String {
    let name = [&record.title, &record.article]
        .into_iter()
        .map(|s| slug::slugify(s))
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "product".to_string());
    if name == brand_slug || name.starts_with(&format!("{}-", brand_slug)) {
        name
    } else {
        format!("{}-{}", brand_slug, name)
    }
}

/// Product row for one snapshot record, classified with the ruleset.
/// `category_id` is filled in later.
fn to_product(
    ruleset: &Ruleset,
    record: &SnapshotRecord,
    category_override: Option<&str>,
) -> (NewProduct, bool) {
    let c = ruleset.reclassify(non_empty(&record.brand).as_deref(), &record.title);
    let category = category_override
        .map(str::to_string)
        .unwrap_or_else(|| ruleset.category_slug(&c));
    let price = snapshot::parse_price(&record.price);
    let in_stock = price.is_some_and(|p| p > 0.0) && !record.is_out_of_stock();

    let product = NewProduct {
        name: record.title.clone(),
        slug: base_slug(&c.brand_slug, record),
        price,
        category_id: None,
        manufacturer: c.brand.clone(),
        model: c.engine_model.clone(),
        in_stock,
        image_url: non_empty(&record.image_url),
        specifications: Specifications {
            brand: Some(c.brand.clone()),
            part_type: Some(c.part_type.clone()),
            engine_model: c.engine_model.clone(),
            article: non_empty(&record.article),
            source_url: non_empty(&record.url),
            category: Some(category),
        },
    };
    (product, c.is_unmatched())
}

pub async fn run(
    store: &dyn CatalogStore,
    ruleset: &Ruleset,
    records: &[SnapshotRecord],
    opts: &ImportOptions,
) -> Result<ImportStats> {
    let mut stats = ImportStats {
        read: records.len(),
        ..ImportStats::default()
    };

    let existing = db::fetch_all_products(store).await?;
    let mut seen: HashSet<String> = existing.iter().map(|p| name_key(&p.name)).collect();
    let mut slugs: HashSet<String> = existing.iter().filter_map(|p| p.slug.clone()).collect();
    info!("{} products already in the catalog", existing.len());

    let mut rows = Vec::new();
    for record in records {
        if record.title.trim().is_empty() {
            stats.blank += 1;
            continue;
        }
        if !seen.insert(name_key(&record.title)) {
            stats.duplicates += 1;
            continue;
        }
        let (mut product, unmatched) = to_product(ruleset, record, opts.category.as_deref());
        product.slug = slug::unique_slug(&product.slug, &mut slugs);
        if unmatched {
            stats.unclassified += 1;
        }
        rows.push(product);
    }

    if opts.dry_run {
        info!("Dry run: {} products would be inserted", rows.len());
        stats.inserted = rows.len();
        return Ok(stats);
    }
    if rows.is_empty() {
        return Ok(stats);
    }

    let wanted: Vec<String> = rows
        .iter()
        .filter_map(|r| r.specifications.category.clone())
        .collect();
    let ids = categories::ensure(store, ruleset, &wanted).await?;
    for r in &mut rows {
        r.category_id = r.specifications.category.as_ref().and_then(|s| ids.get(s)).copied();
    }

    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} inserted")?
            .progress_chars("=> "),
    );
    for (i, batch) in rows.chunks(opts.batch_size.max(1)).enumerate() {
        match store.insert_products(batch).await {
            Ok(inserted) => stats.inserted += inserted.len(),
            Err(e) => {
                warn!("Batch {} ({} rows) failed: {:#}", i + 1, batch.len(), e);
                stats.failed_batches += 1;
            }
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_and_clear();
    Ok(stats)
}
