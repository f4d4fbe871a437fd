use std::collections::HashMap;

use crate::db::{Category, Product};
use crate::scrape::suppliers::{IN_STOCK, OUT_OF_STOCK};
use crate::snapshot::SnapshotRecord;

/// Catalog rows back into snapshot form. The category column carries the
/// category name when the id resolves, else the slug from specifications.
pub fn to_records(categories: &[Category], products: &[Product]) -> Vec<SnapshotRecord> {
    let names: HashMap<i64, &str> = categories.iter().map(|c| (c.id, c.name.as_str())).collect();
    products
        .iter()
        .map(|p| {
            let specs = p.specs();
            let category = p
                .category_id
                .and_then(|id| names.get(&id).map(|n| n.to_string()))
                .or(specs.category)
                .unwrap_or_default();
            SnapshotRecord {
                title: p.name.clone(),
                article: specs.article.unwrap_or_default(),
                price: p.price.map(|v| v.to_string()).unwrap_or_default(),
                brand: p.manufacturer.clone().unwrap_or_default(),
                category,
                stock: if p.in_stock { IN_STOCK } else { OUT_OF_STOCK }.to_string(),
                description: String::new(),
                url: specs.source_url.unwrap_or_default(),
                image_url: p.image_url.clone().unwrap_or_default(),
            }
        })
        .collect()
}
