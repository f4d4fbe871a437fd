//! Compiled-in keyword tables. Order is precedence: earlier rows win.

use super::{BrandRule, EngineRule, PartTypeRule, Ruleset};

pub const RULESET_VERSION: u32 = 1;
pub const DEFAULT_BRAND: &str = "universal";
pub const DEFAULT_PART_TYPE: &str = "other-parts";
pub const DEFAULT_PART_TYPE_NAME: &str = "Прочие запчасти";

/// (label, slug, patterns). Every label must match its own patterns.
const BRANDS: &[(&str, &str, &[&str])] = &[
    (
        "DongFeng",
        "dongfeng",
        &[
            "dongfeng", "донгфенг", "дунфенг", "донфенг",
            "df-240", "df-244", "df-254", "df-304", "df-354", "df-404", "df-504",
            "дф-240", "дф-244", "дф-254", "дф-304", "дф-404",
        ],
    ),
    ("Foton", "foton", &["foton", "фотон", "lovol", "ловол"]),
    ("Jinma", "jinma", &["jinma", "джинма", "jm-2", "jm-3", "jm-4"]),
    (
        "Xingtai",
        "xingtai",
        &["xingtai", "синтай", "сингтай", "уралец", "uralets", "xt-1", "xt-2"],
    ),
    ("ZUBR", "zubr", &["zubr", "зубр"]),
    ("Scout", "scout", &["scout", "скаут"]),
    ("MTZ", "mtz", &["mtz", "мтз", "беларус", "belarus"]),
    ("Kentavr", "kentavr", &["kentavr", "кентавр"]),
    ("Perkins", "perkins", &["perkins", "перкинс"]),
    ("Rusich", "rusich", &["rusich", "русич"]),
    ("Shifeng", "shifeng", &["shifeng", "шифенг"]),
];

/// (code, brand label, extra spellings). The code itself is always a pattern.
const ENGINES: &[(&str, &str, &[&str])] = &[
    ("KM385", "DongFeng", &["км385", "km-385"]),
    ("LL380", "DongFeng", &["ll-380"]),
    ("LL385", "DongFeng", &["ll-385"]),
    ("ZN490", "DongFeng", &["zn-490"]),
    ("TY290", "DongFeng", &["ty-290"]),
    ("TY295", "DongFeng", &["ty-295"]),
    ("JD2100", "DongFeng", &[]),
    ("JD295", "DongFeng", &[]),
    ("HS380", "DongFeng", &[]),
    ("ZS1110", "Xingtai", &["zs-1110"]),
    ("ZS1115", "Xingtai", &["zs-1115"]),
    ("S195", "DongFeng", &["с195", "s-195"]),
    ("R180", "Xingtai", &["р180", "r-180"]),
    ("R190", "Xingtai", &["р190", "r-190"]),
    ("R195", "Xingtai", &["р195", "r-195"]),
];

/// (slug, display name, patterns). Specific types first: "гидроцилиндр"
/// must land in hydraulics before "цилиндр" pulls it into engines.
/// Patterns match at word starts, so compounds ("электростартер") need
/// their own entry.
const PART_TYPES: &[(&str, &str, &[&str])] = &[
    ("filters", "Фильтры", &["фильтр", "filter"]),
    (
        "starters-generators",
        "Стартеры и генераторы",
        &["стартер", "электростартер", "генератор", "starter", "generator"],
    ),
    (
        "hydraulics",
        "Гидравлика",
        &[
            "гидравлик", "гидроцилиндр", "гидронасос", "гидрораспределител", "гидроусилител",
            "гур", "нш-", "насос нш", "hydraulic",
        ],
    ),
    (
        "fuel-systems",
        "Топливная система",
        &["топлив", "форсунк", "тнвд", "инжектор", "карбюратор"],
    ),
    ("cooling", "Охлаждение", &["радиатор", "охлажд", "термостат", "помпа"]),
    (
        "diesel-engines",
        "Двигатели",
        &["двигател", "поршн", "поршен", "цилиндр", "гбц", "головка блока", "коленвал", "распредвал", "engine"],
    ),
    (
        "transmissions",
        "Трансмиссия",
        &["кпп", "коробка передач", "сцеплени", "редуктор", "шестерн", "transmission"],
    ),
    (
        "electrical",
        "Электрика",
        &["провод", "электр", "аккумулятор", "акб", "фара", "реле"],
    ),
    ("seats", "Сиденья", &["сиденье", "сидение", "кресло"]),
    ("wheels-tires", "Колёса и шины", &["колес", "покрышк", "грунтозацеп", "ступиц"]),
    ("driveshafts", "Карданные валы", &["кардан"]),
    (
        "standard-parts",
        "Метизы и РТИ",
        &["болт", "гайка", "шпильк", "прокладк", "шайба", "пружин", "стопорн", "кольцо"],
    ),
    (
        "equipment-parts",
        "Запчасти для навесного оборудования",
        &["косилк", "плуг", "борона", "фреза", "картофелекопалк", "окучник", "прицеп", "погрузчик"],
    ),
];

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

pub fn builtin() -> Ruleset {
    Ruleset {
        version: RULESET_VERSION,
        default_brand: DEFAULT_BRAND.to_string(),
        default_part_type: DEFAULT_PART_TYPE.to_string(),
        default_part_type_name: DEFAULT_PART_TYPE_NAME.to_string(),
        brands: BRANDS
            .iter()
            .map(|(label, slug, patterns)| BrandRule {
                label: label.to_string(),
                slug: slug.to_string(),
                patterns: owned(patterns),
            })
            .collect(),
        engines: ENGINES
            .iter()
            .map(|(code, brand, aliases)| EngineRule {
                code: code.to_string(),
                brand: brand.to_string(),
                aliases: owned(aliases),
            })
            .collect(),
        part_types: PART_TYPES
            .iter()
            .map(|(slug, name, patterns)| PartTypeRule {
                slug: slug.to_string(),
                name: name.to_string(),
                patterns: owned(patterns),
            })
            .collect(),
    }
}
