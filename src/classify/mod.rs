//! Keyword classification of free-text product titles into brand and part type.
//!
//! A [`Ruleset`] is an ordered table; a pattern matches where a word of the
//! normalised title starts with it, and the first hit in table order wins.

pub mod rules;
pub mod slug;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Manufacturer values that mean "nobody knows".
const UNKNOWN_MARKERS: &[&str] = &["неизвестно", "unknown", "universal", "универсальн", "н/д"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRule {
    pub label: String,
    pub slug: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRule {
    pub code: String,
    pub brand: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartTypeRule {
    pub slug: String,
    pub name: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    pub version: u32,
    pub default_brand: String,
    pub default_part_type: String,
    pub default_part_type_name: String,
    pub brands: Vec<BrandRule>,
    #[serde(default)]
    pub engines: Vec<EngineRule>,
    pub part_types: Vec<PartTypeRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrandSource {
    Pattern,
    Engine,
    /// Already labelled before reclassification.
    Kept,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub brand: String,
    pub brand_slug: String,
    pub brand_source: BrandSource,
    pub part_type: String,
    pub part_type_fallback: bool,
    pub engine_model: Option<String>,
}

impl Classification {
    pub fn is_universal(&self) -> bool {
        self.brand_source == BrandSource::Default
    }

    /// Neither brand nor part type came from a pattern.
    pub fn is_unmatched(&self) -> bool {
        self.is_universal() && self.part_type_fallback
    }
}

/// A category the ruleset implies should exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpec {
    pub slug: String,
    pub name: String,
    pub description: String,
}

/// `pattern` occurs in `text` at the start of a word: the character before
/// the hit is absent or not alphanumeric. "гур" hits "насос гур" but not
/// "фигурная".
fn word_prefix(text: &str, pattern: &str) -> bool {
    text.match_indices(pattern)
        .any(|(i, _)| !text[..i].chars().next_back().is_some_and(char::is_alphanumeric))
}

/// Lower-case, fold `ё`, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace('ё', "е")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl Ruleset {
    pub fn builtin() -> Self {
        rules::builtin()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ruleset {:?}", path))?;
        let ruleset: Ruleset = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse ruleset {:?}", path))?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Ruleset from `path` if given, else the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |msg: String| Err(CatalogError::InvalidRuleset(msg));

        if self.version != rules::RULESET_VERSION {
            return invalid(format!(
                "ruleset version {} is not supported (expected {})",
                self.version,
                rules::RULESET_VERSION
            ));
        }
        if self.default_brand.trim().is_empty() || self.default_part_type.trim().is_empty() {
            return invalid("default brand and part type must be set".into());
        }

        let mut brand_slugs = HashSet::new();
        for b in &self.brands {
            if b.label.trim().is_empty() || b.slug.trim().is_empty() {
                return invalid("brand with empty label or slug".into());
            }
            if !brand_slugs.insert(b.slug.as_str()) {
                return invalid(format!("duplicate brand slug '{}'", b.slug));
            }
            check_patterns(&b.label, &b.patterns)?;
            // Relabelling an already-labelled title must not move it.
            let own = self.match_brand(&normalize(&b.label)).map(|r| r.slug.as_str());
            if own != Some(b.slug.as_str()) {
                return invalid(format!(
                    "brand '{}' does not classify as itself (got {:?})",
                    b.label, own
                ));
            }
        }

        for e in &self.engines {
            if e.code.trim().is_empty() {
                return invalid("engine rule with empty code".into());
            }
            if !self.brands.iter().any(|b| b.label == e.brand) {
                return invalid(format!("engine {} names unknown brand '{}'", e.code, e.brand));
            }
            check_patterns(&e.code, &e.aliases)?;
        }

        let mut type_slugs = HashSet::new();
        for t in &self.part_types {
            if t.slug.trim().is_empty() {
                return invalid("part type with empty slug".into());
            }
            if t.slug == self.default_part_type || !type_slugs.insert(t.slug.as_str()) {
                return invalid(format!("duplicate part type slug '{}'", t.slug));
            }
            check_patterns(&t.slug, &t.patterns)?;
        }
        Ok(())
    }

    fn match_brand(&self, norm: &str) -> Option<&BrandRule> {
        self.brands
            .iter()
            .find(|b| b.patterns.iter().any(|p| word_prefix(norm, p)))
    }

    fn match_engine(&self, norm: &str) -> Option<&EngineRule> {
        self.engines.iter().find(|e| {
            word_prefix(norm, &e.code.to_lowercase())
                || e.aliases.iter().any(|a| word_prefix(norm, a))
        })
    }

    fn match_part_type(&self, norm: &str) -> Option<&PartTypeRule> {
        self.part_types
            .iter()
            .find(|t| t.patterns.iter().any(|p| word_prefix(norm, p)))
    }

    fn brand_by_label(&self, label: &str) -> Option<&BrandRule> {
        self.brands.iter().find(|b| b.label == label)
    }

    pub fn default_brand_slug(&self) -> String {
        slug::slugify(&self.default_brand)
    }

    /// Brand patterns first (table order), then engine codes, then the
    /// default brand. Part type independently, first table hit.
    pub fn classify(&self, title: &str) -> Classification {
        let norm = normalize(title);
        let engine = self.match_engine(&norm);

        let (brand, brand_slug, brand_source) = match self.match_brand(&norm) {
            Some(b) => (b.label.clone(), b.slug.clone(), BrandSource::Pattern),
            None => match engine.and_then(|e| self.brand_by_label(&e.brand)) {
                Some(b) => (b.label.clone(), b.slug.clone(), BrandSource::Engine),
                None => (
                    self.default_brand.clone(),
                    self.default_brand_slug(),
                    BrandSource::Default,
                ),
            },
        };

        let (part_type, part_type_fallback) = match self.match_part_type(&norm) {
            Some(t) => (t.slug.clone(), false),
            None => (self.default_part_type.clone(), true),
        };

        Classification {
            brand,
            brand_slug,
            brand_source,
            part_type,
            part_type_fallback,
            engine_model: engine.map(|e| e.code.clone()),
        }
    }

    /// Keep a brand that is already known; classify everything else.
    pub fn reclassify(&self, current_brand: Option<&str>, title: &str) -> Classification {
        let mut c = self.classify(title);
        let kept = current_brand
            .and_then(|raw| self.canonical_brand(raw))
            .and_then(|label| self.brand_by_label(label));
        if let Some(b) = kept {
            if b.label != c.brand {
                c.brand = b.label.clone();
                c.brand_slug = b.slug.clone();
            }
            c.brand_source = BrandSource::Kept;
        }
        c
    }

    /// Canonical label for a raw manufacturer value (`DONGFENG`, `Синтай`,
    /// `Lovol`). Unknown markers fold to the default brand; anything
    /// unrecognised is `None`.
    pub fn canonical_brand(&self, raw: &str) -> Option<&str> {
        let norm = normalize(raw);
        if norm.is_empty() {
            return None;
        }
        if norm == normalize(&self.default_brand) || UNKNOWN_MARKERS.iter().any(|m| norm.starts_with(m)) {
            return Some(self.default_brand.as_str());
        }
        if let Some(b) = self
            .brands
            .iter()
            .find(|b| normalize(&b.label) == norm || b.slug == norm)
        {
            return Some(b.label.as_str());
        }
        self.match_brand(&norm).map(|b| b.label.as_str())
    }

    pub fn part_type_name<'a>(&'a self, slug: &str) -> Option<&'a str> {
        if slug == self.default_part_type {
            return Some(self.default_part_type_name.as_str());
        }
        self.part_types
            .iter()
            .find(|t| t.slug == slug)
            .map(|t| t.name.as_str())
    }

    pub fn category_slug(&self, c: &Classification) -> String {
        format!("{}-{}", c.brand_slug, c.part_type)
    }

    /// Every category the ruleset implies: (brands + default) × (types + default).
    pub fn categories(&self) -> Vec<CategorySpec> {
        let mut brands: Vec<(String, String)> = self
            .brands
            .iter()
            .map(|b| (b.label.clone(), b.slug.clone()))
            .collect();
        brands.push((self.default_brand.clone(), self.default_brand_slug()));

        let mut types: Vec<(&str, &str)> = self
            .part_types
            .iter()
            .map(|t| (t.slug.as_str(), t.name.as_str()))
            .collect();
        types.push((self.default_part_type.as_str(), self.default_part_type_name.as_str()));

        let mut out = Vec::with_capacity(brands.len() * types.len());
        for (label, bslug) in &brands {
            for (tslug, tname) in &types {
                out.push(CategorySpec {
                    slug: format!("{}-{}", bslug, tslug),
                    name: format!("{} - {}", label, tname),
                    description: format!("{}: {}", tname, label),
                });
            }
        }
        out
    }
}

fn check_patterns(owner: &str, patterns: &[String]) -> Result<(), CatalogError> {
    for p in patterns {
        if p.trim().is_empty() {
            return Err(CatalogError::InvalidRuleset(format!("empty pattern in '{}'", owner)));
        }
        if normalize(p) != *p {
            return Err(CatalogError::InvalidRuleset(format!(
                "pattern '{}' in '{}' is not normalised (lower-case, single spaces, no ё)",
                p, owner
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rs() -> Ruleset {
        Ruleset::builtin()
    }

    #[test]
    fn builtin_is_valid() {
        rs().validate().unwrap();
    }

    #[test]
    fn engine_code_implies_brand() {
        let c = rs().classify("Дизельный двигатель KM385BT-47E1, 24 л.с.");
        assert_eq!(c.brand, "DongFeng");
        assert_eq!(c.brand_source, BrandSource::Engine);
        assert_eq!(c.part_type, "diesel-engines");
        assert_eq!(c.engine_model.as_deref(), Some("KM385"));
    }

    #[test]
    fn brand_ignores_case_and_context() {
        let r = rs();
        for title in [
            "DongFeng 244",
            "dongfeng 244",
            "ФИЛЬТР ВОЗДУШНЫЙ DONGFENG 244 (комплект)",
            "Ремень  генератора   ДОНГФЕНГ",
            "Подшипник для трактора Dongfeng-404",
        ] {
            assert_eq!(r.classify(title).brand, "DongFeng", "{}", title);
        }
    }

    #[test]
    fn unknown_title_falls_back() {
        let r = rs();
        for title in ["", "   ", "Изделие 123", "Ключ гаечный 17×19", "★★★"] {
            let c = r.classify(title);
            assert_eq!(c.brand, "universal");
            assert!(c.is_universal());
            assert_eq!(c.brand_slug, "universal");
        }
        let c = r.classify("Изделие 123");
        assert!(c.is_unmatched());
        assert_eq!(c.part_type, "other-parts");
    }

    #[test]
    fn first_brand_in_table_wins() {
        let r = rs();
        // DongFeng precedes Foton in the table, regardless of word order.
        assert_eq!(r.classify("Фильтр Foton / DongFeng").brand, "DongFeng");
        assert_eq!(r.classify("Фильтр DongFeng / Foton").brand, "DongFeng");
        // Brand names beat engine codes: ZS1115 maps to Xingtai, Foton wins.
        let c = r.classify("Поршень ZS1115 для Foton");
        assert_eq!(c.brand, "Foton");
        assert_eq!(c.brand_source, BrandSource::Pattern);
        assert_eq!(c.engine_model.as_deref(), Some("ZS1115"));
    }

    #[test]
    fn specific_part_type_first() {
        let r = rs();
        assert_eq!(r.classify("Гидроцилиндр навески Jinma").part_type, "hydraulics");
        assert_eq!(r.classify("Цилиндр двигателя Jinma").part_type, "diesel-engines");
        assert_eq!(r.classify("Фильтр топливный").part_type, "filters");
        assert_eq!(r.classify("Кольца поршневые R180").part_type, "diesel-engines");
    }

    #[test]
    fn patterns_match_word_starts_only() {
        let r = rs();
        assert_eq!(r.classify("Шайба фигурная М12").part_type, "standard-parts");
        assert_eq!(r.classify("Набор дрелей").part_type, "other-parts");
        assert_eq!(r.classify("Насос ГУР Foton").part_type, "hydraulics");
        assert_eq!(r.classify("Гидроусилитель руля").part_type, "hydraulics");
        assert_eq!(r.classify("Бачок (ГУР)").part_type, "hydraulics");
        assert_eq!(r.classify("Электростартер 12V").part_type, "starters-generators");
        assert_eq!(r.classify("Фара передняя").part_type, "electrical");
        // Engine codes glued to a prefix do not count.
        assert_eq!(r.classify("Втулка AR180").engine_model, None);
    }

    #[test]
    fn word_prefix_boundaries() {
        assert!(word_prefix("гур", "гур"));
        assert!(word_prefix("насос гур", "гур"));
        assert!(word_prefix("xingtai/уралец", "уралец"));
        assert!(word_prefix("фигурная гур-1", "гур"));
        assert!(!word_prefix("фигурная", "гур"));
        assert!(!word_prefix("", "гур"));
    }

    #[test]
    fn uralets_folds_into_xingtai() {
        let r = rs();
        assert_eq!(r.classify("Радиатор Уралец 220").brand, "Xingtai");
        assert_eq!(r.canonical_brand("Uralets"), Some("Xingtai"));
    }

    #[test]
    fn yo_is_folded() {
        assert_eq!(rs().classify("Колёсо переднее").part_type, "wheels-tires");
    }

    #[test]
    fn brand_labels_are_fixed_points() {
        let r = rs();
        for b in &r.brands {
            assert_eq!(r.classify(&b.label).brand, b.label);
            assert_eq!(r.classify(&r.classify(&b.label).brand).brand, b.label);
        }
    }

    #[test]
    fn reclassify_keeps_known_brand() {
        let r = rs();
        // Title says Foton, row already says Jinma: label does not drift.
        let c = r.reclassify(Some("JINMA"), "Фильтр масляный Foton");
        assert_eq!(c.brand, "Jinma");
        assert_eq!(c.brand_source, BrandSource::Kept);
        assert_eq!(c.part_type, "filters");

        let c = r.reclassify(Some("UNIVERSAL"), "Фильтр масляный Foton");
        assert_eq!(c.brand, "Foton");

        let c = r.reclassify(None, "Фильтр масляный Foton");
        assert_eq!(c.brand, "Foton");
    }

    #[test]
    fn reclassify_is_idempotent() {
        let r = rs();
        for title in ["Стартер Xingtai 24B", "Насос НШ-10 Jinma", "Болт М10", "Двигатель R195"] {
            let first = r.reclassify(None, title);
            let second = r.reclassify(Some(&first.brand), title);
            assert_eq!(first.brand, second.brand, "{}", title);
            assert_eq!(first.part_type, second.part_type);
        }
    }

    #[test]
    fn canonical_brand_variants() {
        let r = rs();
        assert_eq!(r.canonical_brand("DONGFENG"), Some("DongFeng"));
        assert_eq!(r.canonical_brand("dongfeng"), Some("DongFeng"));
        assert_eq!(r.canonical_brand("СИНТАЙ"), Some("Xingtai"));
        assert_eq!(r.canonical_brand("Xingtai/Уралец"), Some("Xingtai"));
        assert_eq!(r.canonical_brand("Lovol"), Some("Foton"));
        assert_eq!(r.canonical_brand("Зубр"), Some("ZUBR"));
        assert_eq!(r.canonical_brand("Неизвестно"), Some("universal"));
        assert_eq!(r.canonical_brand("UNIVERSAL"), Some("universal"));
        assert_eq!(r.canonical_brand("Acme"), None);
        assert_eq!(r.canonical_brand(""), None);
    }

    #[test]
    fn category_slugs() {
        let r = rs();
        let c = r.classify("Фильтр масляный Jinma");
        assert_eq!(r.category_slug(&c), "jinma-filters");
        let c = r.classify("Изделие 123");
        assert_eq!(r.category_slug(&c), "universal-other-parts");
    }

    #[test]
    fn categories_cover_every_classification() {
        let r = rs();
        let cats = r.categories();
        assert_eq!(cats.len(), (r.brands.len() + 1) * (r.part_types.len() + 1));
        let slugs: HashSet<_> = cats.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs.len(), cats.len());
        for title in ["Фильтр Jinma", "Двигатель KM385", "Болт", "Сиденье МТЗ"] {
            let c = r.classify(title);
            assert!(slugs.contains(r.category_slug(&c).as_str()), "{}", title);
        }
    }

    #[test]
    fn validate_rejects_self_mismatch() {
        let mut r = rs();
        r.brands.push(BrandRule {
            label: "Dongfeng Clone".into(),
            slug: "dongfeng-clone".into(),
            patterns: vec!["dongfeng clone".into()],
        });
        // "dongfeng clone" hits DongFeng first, so the label is unstable.
        assert!(matches!(r.validate(), Err(CatalogError::InvalidRuleset(_))));
    }

    #[test]
    fn validate_rejects_unnormalised_pattern() {
        let mut r = rs();
        r.part_types[0].patterns.push("Фильтр".into());
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_engine_brand() {
        let mut r = rs();
        r.engines.push(EngineRule {
            code: "X100".into(),
            brand: "Acme".into(),
            aliases: vec![],
        });
        assert!(r.validate().is_err());
    }

    #[test]
    fn ruleset_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, serde_json::to_string_pretty(&rs()).unwrap()).unwrap();
        let loaded = Ruleset::from_file(&path).unwrap();
        assert_eq!(loaded.brands.len(), rs().brands.len());
        assert_eq!(loaded.classify("Фильтр Jinma").brand, "Jinma");
    }
}
