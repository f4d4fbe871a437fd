use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static NON_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s-]+").unwrap());

const MAX_SLUG_LEN: usize = 100;

/// Latin spelling of a single Cyrillic letter, or `None` for anything else.
fn latin(c: char) -> Option<&'static str> {
    let s = match c {
        'а' => "a", 'б' => "b", 'в' => "v", 'г' => "g", 'д' => "d",
        'е' => "e", 'ё' => "yo", 'ж' => "zh", 'з' => "z", 'и' => "i",
        'й' => "y", 'к' => "k", 'л' => "l", 'м' => "m", 'н' => "n",
        'о' => "o", 'п' => "p", 'р' => "r", 'с' => "s", 'т' => "t",
        'у' => "u", 'ф' => "f", 'х' => "h", 'ц' => "ts", 'ч' => "ch",
        'ш' => "sh", 'щ' => "sch", 'ъ' => "", 'ы' => "y", 'ь' => "",
        'э' => "e", 'ю' => "yu", 'я' => "ya",
        'А' => "A", 'Б' => "B", 'В' => "V", 'Г' => "G", 'Д' => "D",
        'Е' => "E", 'Ё' => "Yo", 'Ж' => "Zh", 'З' => "Z", 'И' => "I",
        'Й' => "Y", 'К' => "K", 'Л' => "L", 'М' => "M", 'Н' => "N",
        'О' => "O", 'П' => "P", 'Р' => "R", 'С' => "S", 'Т' => "T",
        'У' => "U", 'Ф' => "F", 'Х' => "H", 'Ц' => "Ts", 'Ч' => "Ch",
        'Ш' => "Sh", 'Щ' => "Sch", 'Ъ' => "", 'Ы' => "Y", 'Ь' => "",
        'Э' => "E", 'Ю' => "Yu", 'Я' => "Ya",
        _ => return None,
    };
    Some(s)
}

pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match latin(c) {
            Some(s) => out.push_str(s),
            None => out.push(c),
        }
    }
    out
}

/// URL-safe identifier: transliterated, lower-case, dash-separated, at most
/// 100 characters. Empty when nothing slug-worthy remains.
pub fn slugify(name: &str) -> String {
    let latin = transliterate(&name.to_lowercase());
    let cleaned = NON_SLUG_RE.replace_all(&latin, "");
    let dashed = SEPARATOR_RE.replace_all(&cleaned, "-");
    let trimmed = dashed.trim_matches('-');
    // Slug is pure ASCII here, byte truncation is safe.
    let cut = &trimmed[..trimmed.len().min(MAX_SLUG_LEN)];
    cut.trim_end_matches('-').to_string()
}

/// First of `base`, `base-1`, `base-2`, ... not in `taken`; records it there.
/// The stem is shortened so the suffixed slug still fits the length cap.
/// An empty `base` becomes `item`.
pub fn unique_slug(base: &str, taken: &mut HashSet<String>) -> String {
    let mut base = slugify(base);
    if base.is_empty() {
        base = "item".to_string();
    }
    let mut n = 0u32;
    loop {
        let suffix = if n == 0 { String::new() } else { format!("-{}", n) };
        let stem = &base[..base.len().min(MAX_SLUG_LEN - suffix.len())];
        let candidate = format!("{}{}", stem.trim_end_matches('-'), suffix);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
