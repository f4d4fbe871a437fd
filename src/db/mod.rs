//! Catalog rows and the storage seam.
//!
//! [`CatalogStore`] is implemented by [`rest::RestStore`] (Supabase PostgREST)
//! and [`memory::MemoryStore`] (tests and dry runs).

pub mod memory;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

pub const PAGE_SIZE: usize = 1000;

// ── Rows ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

/// Typed replacement for the old free-form JSON bag. Unknown keys are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Specifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Category slug, kept for the storefront filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub specifications: Option<Specifications>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Product {
    pub fn specs(&self) -> Specifications {
        self.specifications.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub price: Option<f64>,
    pub category_id: Option<i64>,
    pub manufacturer: String,
    pub model: Option<String>,
    pub in_stock: bool,
    pub image_url: Option<String>,
    pub specifications: Specifications,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specifications: Option<Specifications>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Product),
    /// `updated_at` no longer matched; someone else wrote the row first.
    Conflict,
}

// ── Store ──

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn insert_categories(&self, rows: &[NewCategory]) -> Result<Vec<Category>>;

    async fn count_products(&self) -> Result<usize>;

    /// One page ordered by id.
    async fn list_products(&self, offset: usize, limit: usize) -> Result<Vec<Product>>;

    async fn insert_products(&self, rows: &[NewProduct]) -> Result<Vec<Product>>;

    /// Check-and-set on `updated_at`: applies only if the row still carries
    /// `expected_updated_at`, and bumps it on success.
    async fn update_product(
        &self,
        id: i64,
        expected_updated_at: Option<&str>,
        patch: &ProductPatch,
    ) -> Result<UpdateOutcome>;

    async fn delete_products(&self, ids: &[i64]) -> Result<usize>;
}

/// Page through every product, with a progress bar on stderr.
pub async fn fetch_all_products(store: &dyn CatalogStore) -> Result<Vec<Product>> {
    let total = store.count_products().await?;
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} products")?
            .progress_chars("=> "),
    );

    let mut all = Vec::with_capacity(total);
    let mut offset = 0;
    loop {
        let page = store.list_products(offset, PAGE_SIZE).await?;
        let n = page.len();
        all.extend(page);
        pb.inc(n as u64);
        offset += n;
        if n < PAGE_SIZE {
            break;
        }
    }
    pb.finish_and_clear();
    Ok(all)
}
