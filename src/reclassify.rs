use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::categories;
use crate::classify::Ruleset;
use crate::db::{CatalogStore, Category, Product, ProductPatch, UpdateOutcome};
use crate::error::CatalogError;

pub const DEFAULT_WORKERS: usize = 8;

/// One row to write, guarded by the `updated_at` it was read with.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub id: i64,
    pub expected_updated_at: Option<String>,
    pub patch: ProductPatch,
    /// Target category slug; resolved to `patch.category_id` before writing.
    pub category: Option<String>,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub updates: Vec<PlannedUpdate>,
    pub unchanged: usize,
    pub skipped: usize,
    /// Brand moves, e.g. `universal → DongFeng`.
    pub moves: HashMap<(String, String), usize>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub updated: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl ApplyStats {
    pub fn print(&self) {
        println!(
            "Applied: {} updated, {} conflicts, {} failed.",
            self.updated, self.conflicts, self.failed
        );
    }
}

fn is_universal(ruleset: &Ruleset, manufacturer: Option<&str>) -> bool {
    match manufacturer.map(str::trim).filter(|m| !m.is_empty()) {
        None => true,
        Some(m) => ruleset.canonical_brand(m) == Some(ruleset.default_brand.as_str()),
    }
}

fn plan_one(
    ruleset: &Ruleset,
    p: &Product,
    category_slugs: &HashMap<i64, String>,
) -> Option<PlannedUpdate> {
    let c = ruleset.reclassify(p.manufacturer.as_deref(), &p.name);
    let target = ruleset.category_slug(&c);

    let current = p.specs();
    let mut specs = current.clone();
    specs.brand = Some(c.brand.clone());
    specs.part_type = Some(c.part_type.clone());
    if c.engine_model.is_some() {
        specs.engine_model = c.engine_model.clone();
    }
    specs.category = Some(target.clone());

    let current_slug = p.category_id.and_then(|id| category_slugs.get(&id));
    let unchanged = p.manufacturer.as_deref() == Some(c.brand.as_str())
        && specs == current
        && current_slug == Some(&target);
    if unchanged {
        return None;
    }

    Some(PlannedUpdate {
        id: p.id,
        expected_updated_at: p.updated_at.clone(),
        patch: ProductPatch {
            manufacturer: Some(c.brand),
            model: c.engine_model,
            category_id: None,
            specifications: Some(specs),
        },
        category: Some(target),
    })
}

/// Work out new brand, part type and category for every product.
/// Pure; runs on the rayon pool.
pub fn plan(
    ruleset: &Ruleset,
    products: &[Product],
    categories: &[Category],
    only_universal: bool,
) -> Plan {
    let slugs: HashMap<i64, String> = categories.iter().map(|c| (c.id, c.slug.clone())).collect();

    let results: Vec<Option<Option<PlannedUpdate>>> = products
        .par_iter()
        .map(|p| {
            if only_universal && !is_universal(ruleset, p.manufacturer.as_deref()) {
                None
            } else {
                Some(plan_one(ruleset, p, &slugs))
            }
        })
        .collect();

    let mut plan = Plan::default();
    for (p, r) in products.iter().zip(results) {
        match r {
            None => plan.skipped += 1,
            Some(None) => plan.unchanged += 1,
            Some(Some(u)) => {
                let from = p.manufacturer.clone().unwrap_or_default();
                let to = u.patch.manufacturer.clone().unwrap_or_default();
                if from != to {
                    *plan.moves.entry((from, to)).or_insert(0) += 1;
                }
                plan.updates.push(u);
            }
        }
    }
    plan
}

impl Plan {
    pub fn print(&self, top: usize) {
        println!(
            "{} to update, {} unchanged, {} skipped.",
            self.updates.len(),
            self.unchanged,
            self.skipped
        );
        let mut moves: Vec<_> = self.moves.iter().collect();
        moves.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for ((from, to), n) in moves.into_iter().take(top) {
            let from = if from.is_empty() { "(empty)" } else { from.as_str() };
            println!("  {:>6}  {} → {}", n, from, to);
        }
    }
}

/// Create the categories the plan points at and fill in `category_id`.
pub async fn resolve_categories(
    store: &dyn CatalogStore,
    ruleset: &Ruleset,
    updates: &mut [PlannedUpdate],
) -> Result<()> {
    let wanted: Vec<String> = updates.iter().filter_map(|u| u.category.clone()).collect();
    if wanted.is_empty() {
        return Ok(());
    }
    let ids = categories::ensure(store, ruleset, &wanted).await?;
    for u in updates.iter_mut() {
        u.patch.category_id = u.category.as_ref().and_then(|s| ids.get(s)).copied();
    }
    Ok(())
}

/// Write updates through at most `workers` concurrent requests. Each write
/// is a check-and-set on `updated_at`; a lost race counts as a conflict.
pub async fn apply_updates(
    store: Arc<dyn CatalogStore>,
    updates: Vec<PlannedUpdate>,
    workers: usize,
) -> Result<ApplyStats> {
    let workers = workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));

    let pb = ProgressBar::new(updates.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Result<UpdateOutcome>>(workers * 2);

    for u in updates {
        let store = Arc::clone(&store);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let res = store
                .update_product(u.id, u.expected_updated_at.as_deref(), &u.patch)
                .await;
            if let Ok(UpdateOutcome::Conflict) = &res {
                let e = CatalogError::Conflict {
                    id: u.id,
                    expected: u.expected_updated_at.unwrap_or_else(|| "null".into()),
                };
                warn!("{}", e);
            }
            let _ = tx.send(res).await;
        });
    }
    drop(tx);

    let mut stats = ApplyStats::default();
    while let Some(res) = rx.recv().await {
        match res {
            Ok(UpdateOutcome::Updated(_)) => stats.updated += 1,
            Ok(UpdateOutcome::Conflict) => stats.conflicts += 1,
            Err(e) => {
                warn!("Update failed: {:#}", e);
                stats.failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!(
        "{} updated, {} conflicts, {} failed",
        stats.updated, stats.conflicts, stats.failed
    );
    Ok(stats)
}
