use std::collections::BTreeMap;

use crate::classify::Ruleset;
use crate::db::{Product, ProductPatch};
use crate::reclassify::PlannedUpdate;

/// Manufacturer spellings folded to their canonical label.
#[derive(Debug, Default)]
pub struct BrandPlan {
    pub updates: Vec<PlannedUpdate>,
    /// `(old, new) → rows`.
    pub mapping: BTreeMap<(String, String), usize>,
    pub canonical: usize,
    /// Values the ruleset does not recognise, left alone.
    pub unknown: BTreeMap<String, usize>,
}

pub fn plan(ruleset: &Ruleset, products: &[Product]) -> BrandPlan {
    let mut plan = BrandPlan::default();
    for p in products {
        let raw = p.manufacturer.as_deref().unwrap_or("");
        let Some(label) = ruleset.canonical_brand(raw) else {
            *plan.unknown.entry(raw.to_string()).or_insert(0) += 1;
            continue;
        };
        if raw == label {
            plan.canonical += 1;
            continue;
        }
        *plan
            .mapping
            .entry((raw.to_string(), label.to_string()))
            .or_insert(0) += 1;

        let mut specs = p.specs();
        specs.brand = Some(label.to_string());
        plan.updates.push(PlannedUpdate {
            id: p.id,
            expected_updated_at: p.updated_at.clone(),
            patch: ProductPatch {
                manufacturer: Some(label.to_string()),
                specifications: Some(specs),
                ..ProductPatch::default()
            },
            category: None,
        });
    }
    plan
}

impl BrandPlan {
    pub fn print(&self) {
        println!(
            "{} rows to rename, {} already canonical, {} unrecognised.",
            self.updates.len(),
            self.canonical,
            self.unknown.values().sum::<usize>()
        );
        for ((from, to), n) in &self.mapping {
            let from = if from.is_empty() { "(empty)" } else { from.as_str() };
            println!("  {:>6}  {} → {}", n, from, to);
        }
        if !self.unknown.is_empty() {
            println!("\nUnrecognised manufacturers:");
            for (name, n) in &self.unknown {
                let name = if name.is_empty() { "(empty)" } else { name.as_str() };
                println!("  {:>6}  {}", n, name);
            }
        }
    }
}
