use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Amounts above this are almost always a unit mix-up (e.g. "2000kg" meant "2000g").
pub const DEFAULT_MAX_AMOUNT: f64 = 10_000.0;

const EMPTY_LIST_ERROR: &str = "请输入至少一种食材";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[default]
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "ml")]
    Millilitre,
    #[serde(rename = "l")]
    Litre,
    #[serde(rename = "个")]
    Piece,
    #[serde(rename = "片")]
    Slice,
    #[serde(rename = "瓣")]
    Clove,
    #[serde(rename = "根")]
    Stalk,
    #[serde(rename = "把")]
    Handful,
    #[serde(rename = "勺")]
    Spoon,
    #[serde(rename = "杯")]
    Cup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

const ALL_UNITS: [Unit; 11] = [
    Unit::Gram,
    Unit::Kilogram,
    Unit::Millilitre,
    Unit::Litre,
    Unit::Piece,
    Unit::Slice,
    Unit::Clove,
    Unit::Stalk,
    Unit::Handful,
    Unit::Spoon,
    Unit::Cup,
];

/// Written-out forms accepted on input; output always uses `Unit::token`.
const UNIT_ALIASES: [(&str, Unit); 4] = [
    ("克", Unit::Gram),
    ("千克", Unit::Kilogram),
    ("毫升", Unit::Millilitre),
    ("升", Unit::Litre),
];

impl Unit {
    pub fn token(self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Millilitre => "ml",
            Unit::Litre => "l",
            Unit::Piece => "个",
            Unit::Slice => "片",
            Unit::Clove => "瓣",
            Unit::Stalk => "根",
            Unit::Handful => "把",
            Unit::Spoon => "勺",
            Unit::Cup => "杯",
        }
    }

    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Gram | Unit::Kilogram => Dimension::Mass,
            Unit::Millilitre | Unit::Litre => Dimension::Volume,
            _ => Dimension::Count,
        }
    }

    /// Multiplier to the smallest unit of the same dimension (g or ml).
    fn base_factor(self) -> Option<f64> {
        match self {
            Unit::Gram | Unit::Millilitre => Some(1.0),
            Unit::Kilogram | Unit::Litre => Some(1000.0),
            _ => None,
        }
    }

    fn is_ascii(self) -> bool {
        self.token().is_ascii()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUnit(pub String);

impl fmt::Display for UnknownUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown unit '{}'", self.0)
    }
}

impl std::error::Error for UnknownUnit {}

impl FromStr for Unit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        ALL_UNITS
            .iter()
            .copied()
            .find(|u| u.token() == lowered)
            .or_else(|| {
                UNIT_ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == lowered)
                    .map(|(_, unit)| *unit)
            })
            .ok_or_else(|| UnknownUnit(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientItem {
    pub name: String,
    pub amount: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

// longer tokens first: alternation is leftmost-first
const UNIT_ALTERNATION: &str = "kg|ml|千克|毫升|克|升|g|l|个|片|瓣|根|把|勺|杯";

// name, optional colon, amount, optional unit, optional separated note:
// "猪肉 200g", "猪肉: 200g", "鸡蛋2个", "猪肉200克", "猪肉 200g 新鲜"
static NAME_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?P<name>[\p{{L}}\p{{M}}_\s]+?)\s*[:：]?\s*(?P<amount>\d+(?:\.\d+)?)\s*(?P<unit>{})?(?:[\s,，;；(（].*)?$",
        UNIT_ALTERNATION
    ))
    .expect("name-first pattern is valid")
});

// amount, optional unit, name: "200g 猪肉", "2个 鸡蛋"
static AMOUNT_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?P<amount>\d+(?:\.\d+)?)\s*(?P<unit>{})?(?P<rest>.*)$",
        UNIT_ALTERNATION
    ))
    .expect("amount-first pattern is valid")
});

static TRAILING_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?P<amount>\d+(?:\.\d+)?)(?P<unit>{})?$",
        UNIT_ALTERNATION
    ))
    .expect("trailing-amount pattern is valid")
});

static NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}\p{M}_\s]+$").expect("name pattern is valid"));

type LineMatcher = fn(&str) -> Option<IngredientItem>;

/// Tried in order; the first `Some` wins.
const MATCHERS: [LineMatcher; 3] = [match_name_first, match_amount_first, match_trailing_token];

fn build_item(name: &str, amount: &str, unit: Option<&str>) -> Option<IngredientItem> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let amount = amount.parse::<f64>().ok()?;
    let unit = match unit {
        Some(token) => token.parse::<Unit>().ok()?,
        None => Unit::default(),
    };
    Some(IngredientItem {
        name: name.to_string(),
        amount,
        unit,
    })
}

fn match_name_first(line: &str) -> Option<IngredientItem> {
    let caps = NAME_FIRST.captures(line)?;
    build_item(
        caps.name("name")?.as_str(),
        caps.name("amount")?.as_str(),
        caps.name("unit").map(|m| m.as_str()),
    )
}

fn match_amount_first(line: &str) -> Option<IngredientItem> {
    let caps = AMOUNT_FIRST.captures(line)?;
    let amount = caps.name("amount")?.as_str();
    let mut unit = caps.name("unit").map(|m| m.as_str());
    let mut rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("").to_string();

    // "2 lemons" must not read as 2 litres of "emons"
    if let Some(token) = unit {
        let glued_to_word = rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        let ascii_unit = token.parse::<Unit>().map(Unit::is_ascii).unwrap_or(false);
        if ascii_unit && glued_to_word {
            rest = format!("{}{}", token, rest);
            unit = None;
        }
    }

    if !NAME_CHARS.is_match(&rest) {
        return None;
    }
    build_item(&rest, amount, unit)
}

fn match_trailing_token(line: &str) -> Option<IngredientItem> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }
    let (last, head) = parts.split_last()?;
    let caps = TRAILING_AMOUNT.captures(last)?;
    build_item(
        &head.join(" "),
        caps.name("amount")?.as_str(),
        caps.name("unit").map(|m| m.as_str()),
    )
}

/// Parses free text, one ingredient per line. Lines nothing recognises are dropped.
pub fn parse(raw_text: &str) -> Vec<IngredientItem> {
    let mut items = Vec::new();
    for line in raw_text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match MATCHERS.iter().find_map(|matcher| matcher(line)) {
            Some(item) => {
                tracing::debug!(line, name = %item.name, amount = item.amount, unit = %item.unit, "parsed ingredient line");
                items.push(item);
            }
            None => tracing::debug!(line, "no ingredient pattern matched, skipping line"),
        }
    }
    items
}

pub fn validate(items: &[IngredientItem]) -> ValidationReport {
    validate_with_limit(items, DEFAULT_MAX_AMOUNT)
}

pub fn validate_with_limit(items: &[IngredientItem], max_amount: f64) -> ValidationReport {
    let mut errors = Vec::new();

    if items.is_empty() {
        errors.push(EMPTY_LIST_ERROR.to_string());
    }

    for (index, item) in items.iter().enumerate() {
        let line = index + 1;
        if item.name.trim().is_empty() {
            errors.push(format!("第{}行：食材名称不能为空", line));
        }
        if item.amount <= 0.0 || item.amount.is_nan() {
            errors.push(format!("第{}行：食材数量必须大于0", line));
        }
        if item.amount > max_amount {
            errors.push(format!("第{}行：食材数量过大，请检查单位", line));
        }
    }

    ValidationReport::from_errors(errors)
}

/// Same-dimension conversion between mass or volume units. Anything else is returned unchanged.
pub fn convert_unit(amount: f64, from: Unit, to: Unit) -> f64 {
    if from.dimension() != to.dimension() {
        return amount;
    }
    match (from.base_factor(), to.base_factor()) {
        (Some(from_factor), Some(to_factor)) => amount * from_factor / to_factor,
        _ => amount,
    }
}

pub fn supported_units() -> Vec<Unit> {
    ALL_UNITS.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, amount: f64, unit: Unit) -> IngredientItem {
        IngredientItem {
            name: name.to_string(),
            amount,
            unit,
        }
    }

    #[test]
    fn test_parse_name_then_amount() {
        assert_eq!(parse("猪肉 200g"), vec![item("猪肉", 200.0, Unit::Gram)]);
    }

    #[test]
    fn test_parse_is_order_tolerant() {
        assert_eq!(parse("200g 猪肉"), parse("猪肉 200g"));
    }

    #[test]
    fn test_parse_colon_and_counters() {
        let items = parse("猪肉: 200g\n鸡蛋2个\n大蒜 3瓣");
        assert_eq!(
            items,
            vec![
                item("猪肉", 200.0, Unit::Gram),
                item("鸡蛋", 2.0, Unit::Piece),
                item("大蒜", 3.0, Unit::Clove),
            ]
        );
    }

    #[test]
    fn test_parse_defaults_to_grams() {
        assert_eq!(parse("土豆 300"), vec![item("土豆", 300.0, Unit::Gram)]);
    }

    #[test]
    fn test_parse_written_out_units() {
        assert_eq!(parse("猪肉200克"), vec![item("猪肉", 200.0, Unit::Gram)]);
        assert_eq!(
            parse("面粉 1千克\n牛奶 250毫升\n水 2升"),
            vec![
                item("面粉", 1.0, Unit::Kilogram),
                item("牛奶", 250.0, Unit::Millilitre),
                item("水", 2.0, Unit::Litre),
            ]
        );
    }

    #[test]
    fn test_parse_ignores_trailing_note() {
        assert_eq!(parse("猪肉 200g 新鲜"), vec![item("猪肉", 200.0, Unit::Gram)]);
        assert_eq!(parse("鸡蛋 2个（土鸡蛋）"), vec![item("鸡蛋", 2.0, Unit::Piece)]);
        // a note must be separated from the unit
        assert!(parse("猪肉 200gram").is_empty());
    }

    #[test]
    fn test_default_unit_is_gram() {
        assert_eq!(Unit::default(), Unit::Gram);
    }

    #[test]
    fn test_parse_decimal_and_uppercase_unit() {
        assert_eq!(parse("牛奶 1.5L"), vec![item("牛奶", 1.5, Unit::Litre)]);
    }

    #[test]
    fn test_parse_skips_blank_and_unrecognised_lines() {
        let items = parse("\n   \n少许盐\n白菜 500g\n");
        assert_eq!(items, vec![item("白菜", 500.0, Unit::Gram)]);
    }

    #[test]
    fn test_parse_ascii_unit_not_glued_to_name() {
        assert_eq!(parse("2 lemons"), vec![item("lemons", 2.0, Unit::Gram)]);
    }

    #[test]
    fn test_parse_trailing_token_fallback() {
        // parentheses and digits defeat the first two matchers
        assert_eq!(parse("番茄(大) 2个"), vec![item("番茄(大)", 2.0, Unit::Piece)]);
        assert_eq!(parse("7up 330ml"), vec![item("7up", 330.0, Unit::Millilitre)]);
    }

    #[test]
    fn test_validate_empty_list() {
        let report = validate(&[]);
        assert!(!report.is_valid);
        assert_eq!(report.errors, vec!["请输入至少一种食材".to_string()]);
    }

    #[test]
    fn test_validate_non_positive_amount_names_line() {
        let report = validate(&[item("土豆", -1.0, Unit::Gram)]);
        assert!(!report.is_valid);
        assert_eq!(report.errors, vec!["第1行：食材数量必须大于0".to_string()]);
    }

    #[test]
    fn test_validate_accumulates_errors() {
        let items = vec![
            item("猪肉", 200.0, Unit::Gram),
            item(" ", 0.0, Unit::Gram),
            item("米", 20_000.0, Unit::Gram),
        ];
        let report = validate(&items);
        assert_eq!(
            report.errors,
            vec![
                "第2行：食材名称不能为空".to_string(),
                "第2行：食材数量必须大于0".to_string(),
                "第3行：食材数量过大，请检查单位".to_string(),
            ]
        );
        // input untouched
        assert_eq!(items[1].name, " ");
    }

    #[test]
    fn test_validate_custom_limit() {
        let items = vec![item("米", 600.0, Unit::Gram)];
        assert!(validate(&items).is_valid);
        assert!(!validate_with_limit(&items, 500.0).is_valid);
    }

    #[test]
    fn test_convert_unit() {
        assert_eq!(convert_unit(1000.0, Unit::Gram, Unit::Kilogram), 1.0);
        assert_eq!(convert_unit(2.0, Unit::Litre, Unit::Millilitre), 2000.0);
        assert_eq!(convert_unit(3.0, Unit::Piece, Unit::Gram), 3.0);
        assert_eq!(convert_unit(3.0, Unit::Gram, Unit::Millilitre), 3.0);
        assert_eq!(convert_unit(5.0, Unit::Cup, Unit::Spoon), 5.0);
    }

    #[test]
    fn test_unit_tokens_round_trip_through_from_str() {
        for unit in supported_units() {
            assert_eq!(unit.token().parse::<Unit>(), Ok(unit));
        }
        assert!("oz".parse::<Unit>().is_err());
        assert_eq!("克".parse::<Unit>(), Ok(Unit::Gram));
        assert_eq!("千克".parse::<Unit>(), Ok(Unit::Kilogram));
        assert_eq!(serde_json::to_string(&Unit::Piece).unwrap(), "\"个\"");
    }
}
