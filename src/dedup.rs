use std::collections::HashMap;

use anyhow::Result;
use clap::ValueEnum;
use tracing::{info, warn};

use crate::db::{CatalogStore, Product};

const DELETE_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DedupKey {
    /// Case-folded, trimmed product name
    Name,
    /// Supplier URL stored in specifications
    Url,
}

fn key_of(p: &Product, by: DedupKey) -> Option<String> {
    let key = match by {
        DedupKey::Name => p.name.trim().to_lowercase(),
        DedupKey::Url => p.specs().source_url?.trim().to_string(),
    };
    (!key.is_empty()).then_some(key)
}

/// A set of rows sharing one key; `keep` is the smallest id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: String,
    pub keep: i64,
    pub remove: Vec<i64>,
}

/// Groups with more than one row, largest first.
pub fn find_duplicates(products: &[Product], by: DedupKey) -> Vec<Group> {
    let mut ids: HashMap<String, Vec<i64>> = HashMap::new();
    for p in products {
        if let Some(k) = key_of(p, by) {
            ids.entry(k).or_default().push(p.id);
        }
    }

    let mut groups: Vec<Group> = ids
        .into_iter()
        .filter(|(_, v)| v.len() > 1)
        .map(|(key, mut v)| {
            v.sort_unstable();
            let keep = v.remove(0);
            Group { key, keep, remove: v }
        })
        .collect();
    groups.sort_by(|a, b| b.remove.len().cmp(&a.remove.len()).then_with(|| a.key.cmp(&b.key)));
    groups
}

pub fn print_groups(groups: &[Group], top: usize) {
    let rows: usize = groups.iter().map(|g| g.remove.len()).sum();
    println!("{} duplicate groups, {} rows to remove.", groups.len(), rows);
    for g in groups.iter().take(top) {
        println!(
            "  {:>4} × {} (keep #{})",
            g.remove.len() + 1,
            crate::truncate(&g.key, 60),
            g.keep
        );
    }
}

/// Delete every non-kept row. Returns rows deleted; failed batches are logged.
pub async fn remove(store: &dyn CatalogStore, groups: &[Group]) -> Result<usize> {
    let ids: Vec<i64> = groups.iter().flat_map(|g| g.remove.iter().copied()).collect();
    let mut deleted = 0;
    for chunk in ids.chunks(DELETE_BATCH) {
        match store.delete_products(chunk).await {
            Ok(n) => deleted += n,
            Err(e) => warn!("Delete of {} rows failed: {:#}", chunk.len(), e),
        }
    }
    info!("Deleted {} of {} duplicate rows", deleted, ids.len());
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::{fetch_all_products, NewProduct, Specifications};

    fn row(name: &str, url: Option<&str>) -> NewProduct {
        NewProduct {
            name: name.into(),
            slug: "x".into(),
            price: None,
            category_id: None,
            manufacturer: "universal".into(),
            model: None,
            in_stock: false,
            image_url: None,
            specifications: Specifications {
                source_url: url.map(str::to_string),
                ..Specifications::default()
            },
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_products(&[
                row("Фильтр масляный", Some("https://a.ru/1")),
                row("Насос", Some("https://a.ru/2")),
                row("ФИЛЬТР МАСЛЯНЫЙ ", Some("https://a.ru/3")),
                row("фильтр масляный", Some("https://a.ru/1")),
                row("Болт", None),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn keeps_smallest_id_by_name() {
        let store = seeded().await;
        let products = fetch_all_products(&store).await.unwrap();
        let groups = find_duplicates(&products, DedupKey::Name);
        assert_eq!(
            groups,
            vec![Group {
                key: "фильтр масляный".into(),
                keep: 1,
                remove: vec![3, 4],
            }]
        );

        assert_eq!(remove(&store, &groups).await.unwrap(), 2);
        let left: Vec<i64> = fetch_all_products(&store).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(left, vec![1, 2, 5]);
        assert!(find_duplicates(&fetch_all_products(&store).await.unwrap(), DedupKey::Name).is_empty());
    }

    #[tokio::test]
    async fn by_url_ignores_missing() {
        let store = seeded().await;
        let products = fetch_all_products(&store).await.unwrap();
        let groups = find_duplicates(&products, DedupKey::Url);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].keep, 1);
        assert_eq!(groups[0].remove, vec![4]);
    }
}
