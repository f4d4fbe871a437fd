//! Catalog health: totals, distribution, and category reconciliation.
//!
//! The numbers are reported as found. In particular, products whose
//! category is missing or points nowhere are listed, not reassigned.

use std::collections::{BTreeMap, HashMap};

use crate::classify::Ruleset;
use crate::db::{Category, Product};

#[derive(Debug, Default, PartialEq)]
pub struct Report {
    pub total: usize,
    pub in_stock: usize,
    pub with_image: usize,
    pub with_price: usize,
    /// Manufacturer is empty or one of the "unknown" spellings.
    pub universal: usize,
    pub by_brand: Vec<(String, usize)>,
    pub by_part_type: Vec<(String, usize)>,
    /// `(slug, name, products)` for every category, largest first.
    pub by_category: Vec<(String, String, usize)>,
    pub category_sum: usize,
    pub unassigned: usize,
    /// `category_id` set but no such category.
    pub dangling: usize,
    pub empty_categories: Vec<String>,
    pub duplicate_names: Vec<(String, usize)>,
}

/// Count pairs sorted by count desc, then key.
fn ranked(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut v: Vec<_> = counts.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v
}

pub fn build(ruleset: &Ruleset, categories: &[Category], products: &[Product]) -> Report {
    let mut r = Report {
        total: products.len(),
        ..Report::default()
    };

    let mut brands: HashMap<String, usize> = HashMap::new();
    let mut types: HashMap<String, usize> = HashMap::new();
    let mut per_category: HashMap<i64, usize> = HashMap::new();
    let known: HashMap<i64, &Category> = categories.iter().map(|c| (c.id, c)).collect();

    for p in products {
        if p.in_stock {
            r.in_stock += 1;
        }
        if p.image_url.as_deref().is_some_and(|u| !u.trim().is_empty()) {
            r.with_image += 1;
        }
        if p.price.is_some_and(|v| v > 0.0) {
            r.with_price += 1;
        }

        let manufacturer = p.manufacturer.as_deref().unwrap_or("").trim();
        let brand = match ruleset.canonical_brand(manufacturer) {
            None if manufacturer.is_empty() => ruleset.default_brand.as_str(),
            None => manufacturer,
            Some(label) => label,
        };
        if brand == ruleset.default_brand {
            r.universal += 1;
        }
        *brands.entry(brand.to_string()).or_insert(0) += 1;

        let part_type = p.specs().part_type.unwrap_or_else(|| "(none)".to_string());
        *types.entry(part_type).or_insert(0) += 1;

        match p.category_id {
            None => r.unassigned += 1,
            Some(id) if known.contains_key(&id) => *per_category.entry(id).or_insert(0) += 1,
            Some(_) => r.dangling += 1,
        }
    }

    r.by_brand = ranked(brands);
    r.by_part_type = ranked(types);

    r.by_category = categories
        .iter()
        .map(|c| (c.slug.clone(), c.name.clone(), per_category.get(&c.id).copied().unwrap_or(0)))
        .collect();
    r.by_category.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    r.category_sum = per_category.values().sum();
    r.empty_categories = r
        .by_category
        .iter()
        .filter(|(_, _, n)| *n == 0)
        .map(|(slug, _, _)| slug.clone())
        .collect();

    let mut names: BTreeMap<&str, usize> = BTreeMap::new();
    for c in categories {
        *names.entry(c.name.as_str()).or_insert(0) += 1;
    }
    r.duplicate_names = names
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(name, n)| (name.to_string(), n))
        .collect();
    r
}

fn pct(n: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        n as f64 * 100.0 / total as f64
    }
}

impl Report {
    /// Every product is in a real category.
    pub fn is_reconciled(&self) -> bool {
        self.category_sum == self.total
    }

    pub fn print(&self, top: usize) {
        println!("Products:    {}", self.total);
        println!("In stock:    {} ({:.1}%)", self.in_stock, pct(self.in_stock, self.total));
        println!("With image:  {} ({:.1}%)", self.with_image, pct(self.with_image, self.total));
        println!("With price:  {} ({:.1}%)", self.with_price, pct(self.with_price, self.total));
        println!("Universal:   {} ({:.1}%)", self.universal, pct(self.universal, self.total));

        println!("\n--- Brands ---");
        for (brand, n) in self.by_brand.iter().take(top) {
            println!("{:>7}  {}", n, brand);
        }

        println!("\n--- Part types ---");
        for (t, n) in self.by_part_type.iter().take(top) {
            println!("{:>7}  {}", n, t);
        }

        println!("\n--- Categories ---");
        for (slug, name, n) in self.by_category.iter().take(top) {
            println!("{:>7}  {:<32} {}", n, crate::truncate(slug, 32), name);
        }

        println!("\n--- Reconciliation ---");
        println!("Sum over categories: {}", self.category_sum);
        println!("Total products:      {}", self.total);
        println!("Without category:    {}", self.unassigned);
        println!("Unknown category id: {}", self.dangling);
        println!(
            "Empty categories:    {} of {}",
            self.empty_categories.len(),
            self.by_category.len()
        );
        for (name, n) in &self.duplicate_names {
            println!("Duplicate name:      {} (×{})", name, n);
        }
        if self.is_reconciled() {
            println!("OK: category totals match the product count.");
        } else {
            println!(
                "MISMATCH: {} products are not counted in any category.",
                self.total - self.category_sum
            );
        }
    }
}
