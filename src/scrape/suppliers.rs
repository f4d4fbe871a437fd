use std::path::Path;
use std::sync::LazyLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::snapshot::SnapshotRecord;

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d\s\u{a0},.]*").unwrap());

pub const IN_STOCK: &str = "В наличии";
pub const OUT_OF_STOCK: &str = "Нет в наличии";
pub const ON_ORDER: &str = "Под заказ";

/// CSS selectors for one product card. `item` is matched against the
/// document, the rest inside each item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selectors {
    pub item: String,
    /// Element holding the title; its `href` is the product URL unless `link` is set.
    pub name: String,
    #[serde(default)]
    pub link: Option<String>,
    pub image: String,
    pub price: String,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub stock: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Links on a listing's first page that lead to nested listings.
    #[serde(default)]
    pub subcategories: Option<String>,
}

/// How page N of a listing is addressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pagination {
    /// `?page=N`
    #[default]
    Query,
    /// `<listing>/page/N/`, the WordPress scheme.
    Path,
}

/// One listing to crawl. `category` replaces the supplier's default for
/// every product found under it, nested listings included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub path: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl From<&str> for Listing {
    fn from(path: &str) -> Self {
        Listing {
            path: path.to_string(),
            category: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub key: String,
    pub base_url: String,
    /// Default listings, absolute or relative to `base_url`.
    pub listings: Vec<Listing>,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    /// `(param, value)` page-size query, e.g. `("limit", 100)`.
    #[serde(default)]
    pub page_size: Option<(String, u32)>,
    /// First page is requested without a page parameter. Path pagination
    /// always requests page 1 bare.
    #[serde(default)]
    pub bare_first_page: bool,
    pub max_pages: u32,
    pub delay_ms: u64,
    pub selectors: Selectors,
    #[serde(default)]
    pub brand: Option<String>,
    pub category: String,
}

fn default_page_param() -> String {
    "page".to_string()
}

/// `(slug, category)` for each top-level agrodom listing.
const AGRODOM_LISTINGS: &[(&str, &str)] = &[
    ("двигателя-дизельные", "Двигателя дизельные"),
    ("фильтра", "Фильтра"),
    ("гидравлика", "Гидравлика"),
    ("карданные-валы", "Карданные валы"),
    ("универсальные-комплектующие", "Универсальные комплектующие"),
    ("зип", "ЗИП"),
    ("стандартные-изделия", "Стандартные изделия"),
    ("запчасти-для-тракторов", "Запчасти для тракторов"),
    ("запчасти-для-навесного-оборудования", "Запчасти для навесного оборудования"),
    ("запчасти-для-дизелей", "Запчасти для дизелей"),
    ("колёса-шины-груза", "Колёса, шины, груза"),
    ("прочие-запчасти", "Прочие запчасти"),
    ("стартеры-генераторы", "Стартеры, Генераторы"),
    ("сиденья-кресла", "Сиденья (кресла)"),
    ("ожидается", "Ожидается"),
];

pub fn builtin() -> Vec<Supplier> {
    vec![
        Supplier {
            key: "zip-agro".into(),
            base_url: "https://zip-agro.ru".into(),
            listings: vec!["/dongfeng".into()],
            pagination: Pagination::Query,
            page_param: default_page_param(),
            page_size: Some(("limit".into(), 100)),
            bare_first_page: false,
            max_pages: 5,
            delay_ms: 2000,
            selectors: Selectors {
                item: "#content div.product-item".into(),
                name: ".product-name a".into(),
                link: None,
                image: ".product-image img".into(),
                price: ".price .h6".into(),
                article: Some(".badge.stiker-upc".into()),
                stock: Some("[class*=\"stock\"]".into()),
                description: Some(".product-text".into()),
                subcategories: None,
            },
            brand: Some("DongFeng".into()),
            category: "Запчасти".into(),
        },
        Supplier {
            key: "tata-agro".into(),
            base_url: "https://tata-agro-moto.com".into(),
            listings: vec!["/zapchasti-universalnye".into()],
            pagination: Pagination::Query,
            page_param: default_page_param(),
            page_size: None,
            bare_first_page: true,
            max_pages: 50,
            delay_ms: 500,
            selectors: Selectors {
                item: ".product-list > li".into(),
                name: "a span".into(),
                link: Some("a[href]".into()),
                image: "img".into(),
                price: ".price__current".into(),
                article: Some(".prodcode".into()),
                stock: Some(".product-in-stock, .stock_status_id_7".into()),
                description: None,
                subcategories: None,
            },
            brand: None,
            category: "Универсальные запчасти".into(),
        },
        Supplier {
            key: "agrodom".into(),
            base_url: "https://xn----7sbabpgpk4bsbesjp1f.xn--p1ai".into(),
            listings: AGRODOM_LISTINGS
                .iter()
                .map(|(slug, category)| Listing {
                    path: format!("/product-category/{}/", slug),
                    category: Some(category.to_string()),
                })
                .collect(),
            pagination: Pagination::Path,
            page_param: default_page_param(),
            page_size: None,
            bare_first_page: true,
            max_pages: 50,
            delay_ms: 500,
            selectors: Selectors {
                item: "ul.products li.product, .product-grid-item".into(),
                name: "h2, .product-title, .woocommerce-loop-product__title".into(),
                link: Some(
                    "a.woocommerce-LoopProduct-link, a.product-link, h2 a, .product-title a".into(),
                ),
                image: "img".into(),
                price: ".price ins .woocommerce-Price-amount, .price > .woocommerce-Price-amount".into(),
                article: None,
                stock: Some(".stock".into()),
                description: None,
                subcategories: Some(".product-categories a, .cat-item a".into()),
            },
            brand: None,
            category: "Запчасти".into(),
        },
    ]
}

/// Built-in profiles plus any from a JSON file; file entries replace
/// built-ins with the same key.
pub fn load(extra: Option<&Path>) -> Result<Vec<Supplier>> {
    let mut all = builtin();
    if let Some(path) = extra {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read supplier profiles {:?}", path))?;
        let custom: Vec<Supplier> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse supplier profiles {:?}", path))?;
        for s in custom {
            all.retain(|b| b.key != s.key);
            all.push(s);
        }
    }
    Ok(all)
}

pub fn find<'a>(suppliers: &'a [Supplier], key: &str) -> Result<&'a Supplier, CatalogError> {
    suppliers
        .iter()
        .find(|s| s.key == key)
        .ok_or_else(|| CatalogError::UnknownSupplier(key.to_string()))
}

impl Supplier {
    fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url).with_context(|| format!("Bad base URL {}", self.base_url))
    }

    /// Listing URL for a 1-based page number.
    pub fn page_url(&self, listing: &str, page: u32) -> Result<String> {
        let mut url = self
            .base()?
            .join(listing)
            .with_context(|| format!("Bad listing URL {}", listing))?;
        if self.pagination == Pagination::Path && page > 1 {
            let path = format!("{}/page/{}/", url.path().trim_end_matches('/'), page);
            url.set_path(&path);
        }
        {
            let mut q = url.query_pairs_mut();
            if let Some((param, size)) = &self.page_size {
                q.append_pair(param, &size.to_string());
            }
            if self.pagination == Pagination::Query && !(self.bare_first_page && page == 1) {
                q.append_pair(&self.page_param, &page.to_string());
            }
        }
        // query_pairs_mut leaves a dangling "?" when nothing was appended.
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url.to_string())
    }

    fn absolute(&self, href: &str) -> String {
        match self.base().and_then(|b| Ok(b.join(href)?)) {
            Ok(u) => u.to_string(),
            Err(_) => href.to_string(),
        }
    }
}

struct Compiled {
    item: Selector,
    name: Selector,
    link: Option<Selector>,
    image: Selector,
    price: Selector,
    article: Option<Selector>,
    stock: Option<Selector>,
    description: Option<Selector>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {}", css, e))
}

impl Compiled {
    fn new(s: &Selectors) -> Result<Self> {
        Ok(Compiled {
            item: selector(&s.item)?,
            name: selector(&s.name)?,
            link: s.link.as_deref().map(selector).transpose()?,
            image: selector(&s.image)?,
            price: selector(&s.price)?,
            article: s.article.as_deref().map(selector).transpose()?,
            stock: s.stock.as_deref().map(selector).transpose()?,
            description: s.description.as_deref().map(selector).transpose()?,
        })
    }
}

fn text_of(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(item: ElementRef, sel: &Selector) -> String {
    item.select(sel).next().map(text_of).unwrap_or_default()
}

/// Digits of a price label: `"1 250,50 р."` → `"1250.50"`. Empty if none.
pub fn clean_price(text: &str) -> String {
    let Some(m) = PRICE_RE.find(text) else {
        return String::new();
    };
    m.as_str()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect::<String>()
        .trim_end_matches('.')
        .to_string()
}

pub fn stock_label(text: &str) -> &'static str {
    let t = text.to_lowercase();
    if t.contains("нет") || t.contains("отсутствует") {
        OUT_OF_STOCK
    } else if t.contains("заказ") {
        ON_ORDER
    } else {
        IN_STOCK
    }
}

/// Extract every product card on a listing page. Cards without a title are skipped.
pub fn parse_listing(supplier: &Supplier, html: &str) -> Result<Vec<SnapshotRecord>> {
    let sel = Compiled::new(&supplier.selectors)?;
    let doc = Html::parse_document(html);
    let mut out = Vec::new();

    for item in doc.select(&sel.item) {
        let Some(name_el) = item.select(&sel.name).next() else {
            continue;
        };
        let title = text_of(name_el);
        if title.is_empty() {
            continue;
        }

        let href = match &sel.link {
            Some(link) => item.select(link).next().and_then(|a| a.value().attr("href")),
            None => name_el.value().attr("href"),
        };
        let url = href.map(|h| supplier.absolute(h)).unwrap_or_default();

        let image_url = item
            .select(&sel.image)
            .next()
            .and_then(|img| {
                let v = img.value();
                v.attr("data-src").or_else(|| v.attr("src"))
            })
            .filter(|src| !src.trim().is_empty())
            .map(|src| supplier.absolute(src.trim()))
            .unwrap_or_default();

        let stock = match &sel.stock {
            Some(s) => match item.select(s).next() {
                Some(el) => stock_label(&text_of(el)),
                None => IN_STOCK,
            },
            None => IN_STOCK,
        };

        out.push(SnapshotRecord {
            title,
            article: sel
                .article
                .as_ref()
                .map(|a| first_text(item, a))
                .unwrap_or_default(),
            price: clean_price(&first_text(item, &sel.price)),
            brand: supplier.brand.clone().unwrap_or_default(),
            category: supplier.category.clone(),
            stock: stock.to_string(),
            description: sel
                .description
                .as_ref()
                .map(|d| first_text(item, d))
                .unwrap_or_default(),
            url,
            image_url,
        });
    }
    Ok(out)
}

/// Nested listings linked from `parent`'s first page: links whose path
/// extends `parent`'s path, in page order, without repeats or pagination
/// links. Empty when the profile has no `subcategories` selector.
pub fn subcategory_links(supplier: &Supplier, html: &str, parent: &str) -> Result<Vec<String>> {
    let Some(css) = supplier.selectors.subcategories.as_deref() else {
        return Ok(Vec::new());
    };
    let sel = selector(css)?;
    let doc = Html::parse_document(html);
    let prefix = parent.split('?').next().unwrap_or(parent).trim_end_matches('/');

    let mut out: Vec<String> = Vec::new();
    for a in doc.select(&sel) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let url = supplier.absolute(href.trim());
        let Some(rest) = url.trim_end_matches('/').strip_prefix(prefix) else {
            continue;
        };
        if rest.len() > 1 && rest.starts_with('/') && !rest.starts_with("/page/") && !out.contains(&url) {
            out.push(url);
        }
    }
    Ok(out)
}
