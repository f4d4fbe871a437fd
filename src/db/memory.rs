use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use super::{
    CatalogStore, Category, NewCategory, NewProduct, Product, ProductPatch, UpdateOutcome,
};

#[derive(Default)]
struct State {
    categories: Vec<Category>,
    products: BTreeMap<i64, Product>,
    next_category_id: i64,
    next_product_id: i64,
    last_tick: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing timestamps so check-and-set always sees a change.
    fn tick(&mut self) -> String {
        let mut now = Utc::now();
        if let Some(last) = self.last_tick {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_tick = Some(now);
        now.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// In-process store with the same semantics as the REST backend. Like the
/// remote tables it enforces no uniqueness on names or slugs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.lock()?.categories.clone())
    }

    async fn insert_categories(&self, rows: &[NewCategory]) -> Result<Vec<Category>> {
        let mut st = self.lock()?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            st.next_category_id += 1;
            let c = Category {
                id: st.next_category_id,
                name: r.name.clone(),
                slug: r.slug.clone(),
                description: r.description.clone(),
            };
            st.categories.push(c.clone());
            out.push(c);
        }
        Ok(out)
    }

    async fn count_products(&self) -> Result<usize> {
        Ok(self.lock()?.products.len())
    }

    async fn list_products(&self, offset: usize, limit: usize) -> Result<Vec<Product>> {
        Ok(self
            .lock()?
            .products
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_products(&self, rows: &[NewProduct]) -> Result<Vec<Product>> {
        let mut st = self.lock()?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            st.next_product_id += 1;
            let ts = st.tick();
            let p = Product {
                id: st.next_product_id,
                name: r.name.clone(),
                slug: Some(r.slug.clone()),
                price: r.price,
                category_id: r.category_id,
                manufacturer: Some(r.manufacturer.clone()),
                model: r.model.clone(),
                in_stock: r.in_stock,
                image_url: r.image_url.clone(),
                specifications: Some(r.specifications.clone()),
                created_at: Some(ts.clone()),
                updated_at: Some(ts),
            };
            st.products.insert(p.id, p.clone());
            out.push(p);
        }
        Ok(out)
    }

    async fn update_product(
        &self,
        id: i64,
        expected_updated_at: Option<&str>,
        patch: &ProductPatch,
    ) -> Result<UpdateOutcome> {
        let mut st = self.lock()?;
        let ts = st.tick();
        let Some(p) = st.products.get_mut(&id) else {
            return Ok(UpdateOutcome::Conflict);
        };
        if p.updated_at.as_deref() != expected_updated_at {
            return Ok(UpdateOutcome::Conflict);
        }
        if let Some(m) = &patch.manufacturer {
            p.manufacturer = Some(m.clone());
        }
        if let Some(m) = &patch.model {
            p.model = Some(m.clone());
        }
        if let Some(c) = patch.category_id {
            p.category_id = Some(c);
        }
        if let Some(s) = &patch.specifications {
            p.specifications = Some(s.clone());
        }
        p.updated_at = Some(ts);
        Ok(UpdateOutcome::Updated(p.clone()))
    }

    async fn delete_products(&self, ids: &[i64]) -> Result<usize> {
        let mut st = self.lock()?;
        Ok(ids.iter().filter(|id| st.products.remove(*id).is_some()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fetch_all_products, Specifications};

    fn new_product(name: &str) -> NewProduct {
        NewProduct {
            name: name.into(),
            slug: crate::classify::slug::slugify(name),
            price: Some(100.0),
            category_id: None,
            manufacturer: "universal".into(),
            model: None,
            in_stock: true,
            image_url: None,
            specifications: Specifications::default(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_timestamps() {
        let store = MemoryStore::new();
        let rows = store
            .insert_products(&[new_product("Фильтр"), new_product("Насос")])
            .await
            .unwrap();
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[1].id, 2);
        assert!(rows[0].updated_at < rows[1].updated_at);
        assert_eq!(store.count_products().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stale_update_is_a_conflict() {
        let store = MemoryStore::new();
        let p = store.insert_products(&[new_product("Фильтр")]).await.unwrap().remove(0);
        let stale = p.updated_at.clone();

        let patch = ProductPatch {
            manufacturer: Some("Jinma".into()),
            ..ProductPatch::default()
        };
        let first = store.update_product(p.id, stale.as_deref(), &patch).await.unwrap();
        assert!(matches!(first, UpdateOutcome::Updated(ref u) if u.manufacturer.as_deref() == Some("Jinma")));

        // Second writer still holds the old timestamp.
        let patch = ProductPatch {
            manufacturer: Some("Foton".into()),
            ..ProductPatch::default()
        };
        let second = store.update_product(p.id, stale.as_deref(), &patch).await.unwrap();
        assert_eq!(second, UpdateOutcome::Conflict);

        let all = fetch_all_products(&store).await.unwrap();
        assert_eq!(all[0].manufacturer.as_deref(), Some("Jinma"));
    }

    #[tokio::test]
    async fn paging_and_delete() {
        let store = MemoryStore::new();
        let rows: Vec<_> = (0..5).map(|i| new_product(&format!("Болт {}", i))).collect();
        store.insert_products(&rows).await.unwrap();

        let page = store.list_products(2, 2).await.unwrap();
        assert_eq!(page.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 4]);

        assert_eq!(store.delete_products(&[1, 3, 99]).await.unwrap(), 2);
        assert_eq!(store.count_products().await.unwrap(), 3);
    }
}
