//! CSV/JSON product snapshots exchanged between `scrape`, `import` and `export`.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// One scraped product. Field order is the CSV column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotRecord {
    #[serde(alias = "name")]
    pub title: String,
    #[serde(alias = "sku")]
    pub article: String,
    pub price: String,
    pub brand: String,
    pub category: String,
    pub stock: String,
    pub description: String,
    #[serde(alias = "link")]
    pub url: String,
    pub image_url: String,
}

impl SnapshotRecord {
    fn trimmed(self) -> Self {
        SnapshotRecord {
            title: self.title.trim().to_string(),
            article: self.article.trim().to_string(),
            price: self.price.trim().to_string(),
            brand: self.brand.trim().to_string(),
            category: self.category.trim().to_string(),
            stock: self.stock.trim().to_string(),
            description: self.description.trim().to_string(),
            url: self.url.trim().to_string(),
            image_url: self.image_url.trim().to_string(),
        }
    }

    pub fn is_out_of_stock(&self) -> bool {
        let s = self.stock.to_lowercase();
        s.contains("нет") || s.contains("отсутствует") || s == "0" || s == "false"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Csv,
    Json,
}

fn format_of(path: &Path) -> Result<Format, CatalogError> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") => Ok(Format::Csv),
        Some("json") => Ok(Format::Json),
        _ => Err(CatalogError::UnsupportedFormat(path.display().to_string())),
    }
}

pub fn read(path: &Path) -> Result<Vec<SnapshotRecord>> {
    let records: Vec<SnapshotRecord> = match format_of(path)? {
        Format::Csv => {
            let mut rdr = csv::ReaderBuilder::new()
                .flexible(true)
                .from_path(path)
                .with_context(|| format!("Failed to open {:?}", path))?;
            rdr.deserialize()
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to parse CSV {:?}", path))?
        }
        Format::Json => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse JSON {:?}", path))?
        }
    };
    Ok(records.into_iter().map(SnapshotRecord::trimmed).collect())
}

pub fn write(path: &Path, records: &[SnapshotRecord]) -> Result<()> {
    let format = format_of(path)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    match format {
        Format::Csv => {
            let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
            let mut w = csv::WriterBuilder::new().has_headers(true).from_writer(file);
            for r in records {
                w.serialize(r)?;
            }
            w.flush()?;
        }
        Format::Json => {
            let text = serde_json::to_string_pretty(records)?;
            fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
        }
    }
    Ok(())
}

/// `"1 250,50"` → 1250.5. Anything without digits is `None`.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SnapshotRecord> {
        vec![
            SnapshotRecord {
                title: "Фильтр масляный DongFeng 244".into(),
                article: "JX0810".into(),
                price: "1250".into(),
                brand: "DongFeng".into(),
                category: "Запчасти".into(),
                stock: "В наличии".into(),
                description: "Фильтр, \"оригинал\"".into(),
                url: "https://zip-agro.ru/dongfeng/jx0810".into(),
                image_url: "https://zip-agro.ru/image/jx0810.jpg".into(),
            },
            SnapshotRecord {
                title: "Насос НШ-10".into(),
                stock: "Нет в наличии".into(),
                ..SnapshotRecord::default()
            },
        ]
    }

    #[test]
    fn csv_and_json_preserve_fields() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["out.csv", "nested/out.json"] {
            let path = dir.path().join(name);
            write(&path, &sample()).unwrap();
            assert_eq!(read(&path).unwrap(), sample(), "{}", name);
        }
    }

    #[test]
    fn legacy_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(
            &path,
            "name,sku,price,link,extra\n  Болт М10  ,B10, 15 ,https://x.ru/b10,ignored\n",
        )
        .unwrap();
        let rows = read(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Болт М10");
        assert_eq!(rows[0].article, "B10");
        assert_eq!(rows[0].price, "15");
        assert_eq!(rows[0].url, "https://x.ru/b10");
        assert_eq!(rows[0].image_url, "");
    }

    #[test]
    fn unsupported_extension() {
        let err = read(Path::new("products.xlsx")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn prices() {
        assert_eq!(parse_price("1 250,50"), Some(1250.5));
        assert_eq!(parse_price("3400 р."), Some(3400.0));
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("по запросу"), None);
        assert_eq!(parse_price("1.2.3"), None);
    }

    #[test]
    fn stock_flags() {
        assert!(sample()[1].is_out_of_stock());
        assert!(!sample()[0].is_out_of_stock());
    }
}
