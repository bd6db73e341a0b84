use super::{SpicyLevel, UserPreferences};

const HIGH_SPICE_TERMS: &[&str] = &["辣", "麻辣", "重口味"];
const MILD_SPICE_TERMS: &[&str] = &["微辣", "清淡"];
const NO_SPICE_TERMS: &[&str] = &["不辣"];

/// Compounds that contain the bare high-intensity term but mean the opposite.
const SPICE_COMPOUNDS: &[&str] = &["微辣", "不辣"];

/// Checked in order; the first hit wins.
pub const CUISINES: &[&str] = &["川菜", "粤菜", "鲁菜", "苏菜", "闽菜", "浙菜", "湘菜", "徽菜"];

pub const INGREDIENT_KEYWORDS: &[&str] = &["鱼", "鸡", "牛", "猪", "豆腐", "蔬菜", "海鲜"];

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| text.contains(term))
}

pub fn infer_spicy_level(message: &str) -> Option<SpicyLevel> {
    let masked = SPICE_COMPOUNDS
        .iter()
        .fold(message.to_string(), |text, compound| text.replace(compound, " "));

    if contains_any(&masked, HIGH_SPICE_TERMS) {
        Some(SpicyLevel::High)
    } else if contains_any(message, MILD_SPICE_TERMS) {
        Some(SpicyLevel::Mild)
    } else if contains_any(message, NO_SPICE_TERMS) {
        Some(SpicyLevel::None)
    } else {
        None
    }
}

pub fn infer_cuisine(message: &str) -> Option<String> {
    CUISINES
        .iter()
        .find(|cuisine| message.contains(*cuisine))
        .map(|cuisine| cuisine.to_string())
}

pub fn infer_ingredients(message: &str) -> Vec<String> {
    INGREDIENT_KEYWORDS
        .iter()
        .filter(|keyword| message.contains(*keyword))
        .map(|keyword| keyword.to_string())
        .collect()
}

/// Preferences a chat message reveals. Fields with no evidence stay `None`.
pub fn analyze(message: &str) -> UserPreferences {
    let ingredients = infer_ingredients(message);
    UserPreferences {
        spicy_level: infer_spicy_level(message),
        cuisine_type: infer_cuisine(message),
        favorite_ingredients: (!ingredients.is_empty()).then_some(ingredients),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spice_priority() {
        assert_eq!(infer_spicy_level("我喜欢麻辣的"), Some(SpicyLevel::High));
        assert_eq!(infer_spicy_level("重口味"), Some(SpicyLevel::High));
        assert_eq!(infer_spicy_level("来点微辣的"), Some(SpicyLevel::Mild));
        assert_eq!(infer_spicy_level("想吃清淡一点"), Some(SpicyLevel::Mild));
        assert_eq!(infer_spicy_level("不辣的菜"), Some(SpicyLevel::None));
        assert_eq!(infer_spicy_level("今天吃什么"), None);
    }

    #[test]
    fn test_high_term_beside_a_compound_still_wins() {
        assert_eq!(infer_spicy_level("不辣也行，最好麻辣"), Some(SpicyLevel::High));
        assert_eq!(infer_spicy_level("清淡但不辣"), Some(SpicyLevel::Mild));
    }

    #[test]
    fn test_first_cuisine_wins() {
        assert_eq!(infer_cuisine("湘菜和川菜都行").as_deref(), Some("川菜"));
        assert_eq!(infer_cuisine("西餐"), None);
    }

    #[test]
    fn test_analyze_collects_ingredients_once() {
        let prefs = analyze("想吃鱼，鱼头豆腐汤，还有鸡");
        assert_eq!(
            prefs.favorite_ingredients,
            Some(vec!["鱼".to_string(), "鸡".to_string(), "豆腐".to_string()])
        );
        assert_eq!(prefs.spicy_level, None);
        assert!(analyze("随便").is_empty());
    }
}
