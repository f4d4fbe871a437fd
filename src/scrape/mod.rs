pub mod suppliers;

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::{with_retry, CatalogError};
use crate::settings::Settings;
use crate::snapshot::{self, SnapshotRecord};
use suppliers::{Listing, Supplier};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, CatalogError>;
}

/// Plain HTTP GET with a fixed-delay retry.
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".parse()?,
        );
        headers.insert(reqwest::header::ACCEPT_LANGUAGE, "ru-RU,ru;q=0.9".parse()?);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpFetcher {
            client,
            retries: settings.retries,
            retry_delay: settings.retry_delay,
        })
    }

    async fn get_once(&self, url: &str, attempt: u32) -> Result<String, CatalogError> {
        let transport = |source| CatalogError::Transport {
            url: url.to_string(),
            attempt,
            source,
        };
        let resp = self.client.get(url).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: String::new(),
            });
        }
        resp.text().await.map_err(transport)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<String, CatalogError> {
        let what = format!("GET {}", url);
        with_retry(&what, self.retries, self.retry_delay, |attempt| {
            self.get_once(url, attempt)
        })
        .await
    }
}

pub struct ScrapeStats {
    pub listings: u32,
    pub pages: u32,
    pub records: usize,
    pub failed_pages: u32,
    pub duplicates: usize,
}

/// Crawl every listing, plus the nested listings linked from their first
/// pages, into one snapshot. Each listing is walked until a page comes back
/// empty, repeats what we already have, fails, or `max_pages` is reached.
/// The snapshot at `out` is rewritten after every page so an interrupted
/// run keeps what it got.
pub async fn scrape_supplier(
    fetcher: &dyn Fetch,
    supplier: &Supplier,
    listings: &[Listing],
    max_pages: u32,
    out: &Path,
) -> Result<ScrapeStats> {
    let mut queue: VecDeque<Listing> = listings.iter().cloned().collect();
    let mut visited: HashSet<String> = HashSet::new();
    let mut records: Vec<SnapshotRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stats = ScrapeStats {
        listings: 0,
        pages: 0,
        records: 0,
        failed_pages: 0,
        duplicates: 0,
    };
    let mut requests = 0u32;

    while let Some(listing) = queue.pop_front() {
        if !visited.insert(supplier.page_url(&listing.path, 1)?) {
            continue;
        }
        stats.listings += 1;

        for page in 1..=max_pages {
            let url = supplier.page_url(&listing.path, page)?;
            if requests > 0 && supplier.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(supplier.delay_ms)).await;
            }
            requests += 1;
            info!("Fetching page {}/{}: {}", page, max_pages, url);

            let html = match fetcher.get(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Giving up on {}: {}", url, e);
                    stats.failed_pages += 1;
                    break;
                }
            };

            if page == 1 {
                // Nested listings are crawled right after their parent.
                let children = suppliers::subcategory_links(supplier, &html, &url)?;
                for child in children.into_iter().rev() {
                    debug!("Nested listing {}", child);
                    queue.push_front(Listing {
                        path: child,
                        category: listing.category.clone(),
                    });
                }
            }

            let found = suppliers::parse_listing(supplier, &html)?;
            stats.pages += 1;
            if found.is_empty() {
                info!("Page {} is empty, moving on", page);
                break;
            }

            let before = records.len();
            for mut r in found {
                let key = if r.url.is_empty() { r.title.clone() } else { r.url.clone() };
                if !seen.insert(key) {
                    stats.duplicates += 1;
                    continue;
                }
                if let Some(category) = &listing.category {
                    r.category = category.clone();
                }
                records.push(r);
            }
            let added = records.len() - before;
            info!("Page {}: {} new products ({} total)", page, added, records.len());

            snapshot::write(out, &records)?;
            if added == 0 {
                // Past the last page some shops serve the last page again.
                break;
            }
        }
    }

    stats.records = records.len();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeSite {
        pages: HashMap<String, Result<String, u16>>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn new(pages: Vec<(String, Result<String, u16>)>) -> Self {
            FakeSite {
                pages: pages.into_iter().collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetch for FakeSite {
        async fn get(&self, url: &str) -> Result<String, CatalogError> {
            self.requested.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(CatalogError::Http {
                    status: *status,
                    url: url.into(),
                    body: String::new(),
                }),
                None => Ok("<html><body></body></html>".into()),
            }
        }
    }

    fn card(name: &str, href: &str) -> String {
        format!(
            r#"<div class="product-item"><div class="product-name"><a href="{}">{}</a></div>
               <div class="price"><span class="h6">100 р.</span></div></div>"#,
            href, name
        )
    }

    fn listing(cards: &[String]) -> String {
        format!(r#"<div id="content">{}</div>"#, cards.concat())
    }

    fn supplier() -> Supplier {
        let mut s = suppliers::builtin().remove(0);
        s.delay_ms = 0;
        s
    }

    fn site(pages: Vec<(u32, Result<String, u16>)>) -> FakeSite {
        let s = supplier();
        FakeSite::new(
            pages
                .into_iter()
                .map(|(n, body)| (s.page_url("/dongfeng", n).unwrap(), body))
                .collect(),
        )
    }

    fn dongfeng() -> Vec<Listing> {
        vec!["/dongfeng".into()]
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let fake = site(vec![
            (1, Ok(listing(&[card("Фильтр 1", "/a"), card("Фильтр 2", "/b")]))),
            (2, Ok(listing(&[card("Фильтр 3", "/c")]))),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");

        let stats = scrape_supplier(&fake, &supplier(), &dongfeng(), 5, &out).await.unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.pages, 3);
        assert_eq!(fake.requested.lock().unwrap().len(), 3);
        assert_eq!(snapshot::read(&out).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stops_when_page_repeats() {
        let page = listing(&[card("Фильтр 1", "/a")]);
        let fake = site(vec![(1, Ok(page.clone())), (2, Ok(page.clone())), (3, Ok(page))]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");

        let stats = scrape_supplier(&fake, &supplier(), &dongfeng(), 5, &out).await.unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(fake.requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_page_keeps_checkpoint() {
        let fake = site(vec![
            (1, Ok(listing(&[card("Фильтр 1", "/a")]))),
            (2, Err(503)),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");

        let stats = scrape_supplier(&fake, &supplier(), &dongfeng(), 5, &out).await.unwrap();
        assert_eq!(stats.failed_pages, 1);
        assert_eq!(stats.records, 1);
        assert_eq!(snapshot::read(&out).unwrap()[0].title, "Фильтр 1");
    }

    fn woo_card(name: &str, href: &str) -> String {
        format!(
            r#"<li class="product"><a class="woocommerce-LoopProduct-link" href="{}">
               <h2>{}</h2><span class="price"><span class="woocommerce-Price-amount">100 ₽</span></span></a></li>"#,
            href, name
        )
    }

    fn woo_page(sidebar: &str, cards: &[String]) -> String {
        format!(
            r#"<aside><ul class="product-categories">{}</ul></aside><ul class="products">{}</ul>"#,
            sidebar,
            cards.concat()
        )
    }

    #[tokio::test]
    async fn crawls_nested_listings_with_parent_category() {
        let mut s = suppliers::builtin().into_iter().find(|s| s.key == "agrodom").unwrap();
        s.delay_ms = 0;
        let sidebar = r#"<li class="cat-item"><a href="/product-category/filters/oil/">Масляные</a></li>
                         <li class="cat-item"><a href="/product-category/hydraulics/">Гидравлика</a></li>"#;
        let url = |path: &str, n: u32| s.page_url(path, n).unwrap();
        let fake = FakeSite::new(vec![
            (
                url("/product-category/filters/", 1),
                Ok(woo_page(sidebar, &[woo_card("Фильтр 1", "/p/1"), woo_card("Фильтр 2", "/p/2")])),
            ),
            (
                url("/product-category/filters/", 2),
                Ok(woo_page(sidebar, &[woo_card("Фильтр 3", "/p/3")])),
            ),
            (
                url("/product-category/filters/oil/", 1),
                Ok(woo_page(sidebar, &[woo_card("Фильтр 1", "/p/1"), woo_card("Фильтр масляный", "/p/4")])),
            ),
        ]);
        let listings = vec![
            Listing {
                path: "/product-category/filters/".into(),
                category: Some("Фильтра".into()),
            },
            // Already reached as a nested listing.
            "/product-category/filters/oil/".into(),
        ];
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");

        let stats = scrape_supplier(&fake, &s, &listings, 10, &out).await.unwrap();
        assert_eq!(stats.listings, 2);
        assert_eq!(stats.records, 4);
        assert_eq!(stats.duplicates, 1);

        let rows = snapshot::read(&out).unwrap();
        assert!(rows.iter().all(|r| r.category == "Фильтра"));
        assert_eq!(rows[3].title, "Фильтр масляный");

        let requested = fake.requested.lock().unwrap();
        assert!(requested.contains(&url("/product-category/filters/", 2)));
        assert!(!requested.iter().any(|u| u.contains("hydraulics")));
    }

    #[tokio::test]
    async fn fetcher_retries_transport_errors() {
        let settings = Settings {
            retries: 3,
            retry_delay: Duration::ZERO,
            ..Settings::default()
        };
        let fetcher = HttpFetcher::new(&settings).unwrap();
        let err = fetcher.get("not a url").await.unwrap_err();
        assert!(matches!(err, CatalogError::Transport { attempt: 3, .. }), "{}", err);
    }

    #[tokio::test]
    async fn respects_page_ceiling() {
        let fake = site(
            (1..=4)
                .map(|n| (n, Ok(listing(&[card(&format!("Фильтр {}", n), &format!("/{}", n))]))))
                .collect(),
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");

        let stats = scrape_supplier(&fake, &supplier(), &dongfeng(), 2, &out).await.unwrap();
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.records, 2);
    }
}
