use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{
    CatalogStore, Category, NewCategory, NewProduct, Product, ProductPatch, UpdateOutcome,
};
use crate::error::{with_retry, CatalogError};
use crate::settings::Settings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Supabase PostgREST client for the `categories` and `products` tables.
pub struct RestStore {
    client: Client,
    base: String,
    key: String,
    retries: u32,
    retry_delay: Duration,
}

#[derive(Serialize)]
struct PatchBody<'a> {
    #[serde(flatten)]
    patch: &'a ProductPatch,
    updated_at: String,
}

impl RestStore {
    pub fn connect(settings: &Settings) -> Result<Self> {
        let (url, key) = settings.credentials()?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(RestStore {
            client,
            base: format!("{}/rest/v1", url.trim_end_matches('/')),
            key: key.to_string(),
            retries: settings.retries,
            retry_delay: settings.retry_delay,
        })
    }

    fn url(&self, table: &str) -> String {
        format!("{}/{}", self.base, table)
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Content-Type", "application/json")
    }

    /// Send with fixed-delay retry on transport errors, 429 and 5xx.
    async fn send<F>(&self, what: &str, build: F) -> Result<Response, CatalogError>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        with_retry(what, self.retries, self.retry_delay, |attempt| async move {
            match self.authed(build()).send().await {
                Ok(resp) if resp.status().is_success() => Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let url = resp.url().to_string();
                    let body = resp.text().await.unwrap_or_default();
                    Err(CatalogError::Http { status, url, body })
                }
                Err(source) => Err(CatalogError::Transport {
                    url: source.url().map(|u| u.to_string()).unwrap_or_default(),
                    attempt,
                    source,
                }),
            }
        })
        .await
    }

    async fn json<T: DeserializeOwned, F>(&self, what: &str, build: F) -> Result<T>
    where
        F: Fn() -> RequestBuilder,
    {
        let resp = self.send(what, build).await?;
        let rows = resp
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response for {}", what))?;
        Ok(rows)
    }
}

#[async_trait]
impl CatalogStore for RestStore {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        let url = self.url("categories");
        self.json("list categories", || {
            self.client
                .get(&url)
                .query(&[("select", "id,name,slug,description"), ("order", "id.asc")])
        })
        .await
    }

    async fn insert_categories(&self, rows: &[NewCategory]) -> Result<Vec<Category>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url("categories");
        self.json("insert categories", || {
            self.client
                .post(&url)
                .header("Prefer", "return=representation")
                .json(rows)
        })
        .await
    }

    async fn count_products(&self) -> Result<usize> {
        let url = self.url("products");
        let resp = self
            .send("count products", || {
                self.client
                    .get(&url)
                    .query(&[("select", "id"), ("limit", "1")])
                    .header("Prefer", "count=exact")
            })
            .await?;
        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        parse_content_range_total(&range)
            .with_context(|| format!("Unexpected Content-Range '{}'", range))
    }

    async fn list_products(&self, offset: usize, limit: usize) -> Result<Vec<Product>> {
        let url = self.url("products");
        let (offset, limit) = (offset.to_string(), limit.to_string());
        debug!("list products offset={} limit={}", offset, limit);
        self.json("list products", || {
            self.client.get(&url).query(&[
                ("select", "*"),
                ("order", "id.asc"),
                ("offset", offset.as_str()),
                ("limit", limit.as_str()),
            ])
        })
        .await
    }

    async fn insert_products(&self, rows: &[NewProduct]) -> Result<Vec<Product>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url("products");
        self.json("insert products", || {
            self.client
                .post(&url)
                .header("Prefer", "return=representation")
                .json(rows)
        })
        .await
    }

    async fn update_product(
        &self,
        id: i64,
        expected_updated_at: Option<&str>,
        patch: &ProductPatch,
    ) -> Result<UpdateOutcome> {
        let url = self.url("products");
        let id_filter = format!("eq.{}", id);
        let ts_filter = updated_at_filter(expected_updated_at);
        let body = PatchBody {
            patch,
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        };
        let rows: Vec<Product> = self
            .json("update product", || {
                self.client
                    .patch(&url)
                    .query(&[("id", id_filter.as_str()), ("updated_at", ts_filter.as_str())])
                    .header("Prefer", "return=representation")
                    .json(&body)
            })
            .await?;
        Ok(match rows.into_iter().next() {
            Some(p) => UpdateOutcome::Updated(p),
            None => UpdateOutcome::Conflict,
        })
    }

    async fn delete_products(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let url = self.url("products");
        let filter = format!(
            "in.({})",
            ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
        );
        let rows: Vec<serde_json::Value> = self
            .json("delete products", || {
                self.client
                    .delete(&url)
                    .query(&[("id", filter.as_str())])
                    .header("Prefer", "return=representation")
            })
            .await?;
        Ok(rows.len())
    }
}

/// PostgREST filter that only matches a row still carrying the
/// `updated_at` we read.
fn updated_at_filter(expected: Option<&str>) -> String {
    match expected {
        Some(ts) => format!("eq.{}", ts),
        None => "is.null".to_string(),
    }
}

/// Total from a PostgREST `Content-Range` header: `0-0/1234` or `*/0`.
fn parse_content_range_total(header: &str) -> Option<usize> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}
