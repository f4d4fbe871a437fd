use std::collections::HashMap;

use anyhow::Result;
use tracing::info;

use crate::classify::{CategorySpec, Ruleset};
use crate::db::{CatalogStore, Category, NewCategory};

/// Categories the ruleset implies that the store does not have yet, by slug.
pub fn missing(ruleset: &Ruleset, existing: &[Category]) -> Vec<CategorySpec> {
    ruleset
        .categories()
        .into_iter()
        .filter(|spec| !existing.iter().any(|c| c.slug == spec.slug))
        .collect()
}

fn to_row(spec: &CategorySpec) -> NewCategory {
    NewCategory {
        name: spec.name.clone(),
        slug: spec.slug.clone(),
        description: Some(spec.description.clone()),
    }
}

/// Insert the missing categories. Returns how many were created.
pub async fn apply(store: &dyn CatalogStore, ruleset: &Ruleset) -> Result<usize> {
    let existing = store.list_categories().await?;
    let rows: Vec<NewCategory> = missing(ruleset, &existing).iter().map(to_row).collect();
    if rows.is_empty() {
        return Ok(0);
    }
    let created = store.insert_categories(&rows).await?;
    info!("Created {} categories", created.len());
    Ok(created.len())
}

/// Slug → id for every category, creating `wanted` slugs that are missing.
/// Slugs the ruleset does not know are created with the slug as name.
pub async fn ensure(
    store: &dyn CatalogStore,
    ruleset: &Ruleset,
    wanted: &[String],
) -> Result<HashMap<String, i64>> {
    let existing = store.list_categories().await?;
    let mut ids = slug_ids(&existing);

    let specs = ruleset.categories();
    let mut rows: Vec<NewCategory> = Vec::new();
    for slug in wanted {
        if ids.contains_key(slug) || rows.iter().any(|r| &r.slug == slug) {
            continue;
        }
        rows.push(match specs.iter().find(|s| &s.slug == slug) {
            Some(spec) => to_row(spec),
            None => NewCategory {
                name: slug.clone(),
                slug: slug.clone(),
                description: None,
            },
        });
    }

    if !rows.is_empty() {
        let created = store.insert_categories(&rows).await?;
        info!("Created {} missing categories", created.len());
        ids.extend(created.into_iter().map(|c| (c.slug, c.id)));
    }
    Ok(ids)
}

/// First id wins when a slug is duplicated in the table.
pub fn slug_ids(categories: &[Category]) -> HashMap<String, i64> {
    let mut ids = HashMap::new();
    for c in categories {
        ids.entry(c.slug.clone()).or_insert(c.id);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    #[tokio::test]
    async fn apply_is_idempotent() {
        let store = MemoryStore::new();
        let rs = Ruleset::builtin();
        let total = rs.categories().len();

        assert_eq!(apply(&store, &rs).await.unwrap(), total);
        assert_eq!(apply(&store, &rs).await.unwrap(), 0);
        assert_eq!(store.list_categories().await.unwrap().len(), total);
    }

    #[tokio::test]
    async fn only_missing_are_planned() {
        let rs = Ruleset::builtin();
        let existing = vec![Category {
            id: 1,
            name: "Jinma - Фильтры".into(),
            slug: "jinma-filters".into(),
            description: None,
        }];
        let plan = missing(&rs, &existing);
        assert_eq!(plan.len(), rs.categories().len() - 1);
        assert!(plan.iter().all(|c| c.slug != "jinma-filters"));
    }

    #[tokio::test]
    async fn ensure_creates_once() {
        let store = MemoryStore::new();
        let rs = Ruleset::builtin();
        let wanted = vec![
            "jinma-filters".to_string(),
            "jinma-filters".to_string(),
            "custom-slug".to_string(),
        ];

        let ids = ensure(&store, &rs, &wanted).await.unwrap();
        assert_eq!(ids.len(), 2);
        let again = ensure(&store, &rs, &wanted).await.unwrap();
        assert_eq!(ids, again);

        let cats = store.list_categories().await.unwrap();
        let jinma = cats.iter().find(|c| c.slug == "jinma-filters").unwrap();
        assert!(jinma.name.starts_with("Jinma - "));
        assert_eq!(cats.iter().find(|c| c.slug == "custom-slug").unwrap().name, "custom-slug");
    }
}
