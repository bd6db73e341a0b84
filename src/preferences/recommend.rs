use serde_json::Value;

use super::{AIResponse, SpicyLevel, UserPreferences};
use crate::ingredient_parser::ValidationReport;

pub const FALLBACK_MESSAGE: &str = "根据您的偏好为您推荐以下菜品：";
pub const EMPTY_REPLY_MESSAGE: &str = "抱歉，暂时无法提供推荐。";
pub const AI_REPLY_CONFIDENCE: f64 = 0.8;

/// Dish names recognised in free-form AI replies, in reporting order.
pub const KNOWN_DISHES: &[&str] = &[
    "水煮鱼", "麻婆豆腐", "宫保鸡丁", "白切鸡", "叉烧", "清蒸鱼", "红烧肉", "番茄炒蛋",
];

const SPICE_MARKERS: &[&str] = &["辣", "麻", "重口味"];

const BASE_CONFIDENCE: f64 = 0.5;
const CUISINE_MATCH_BONUS: f64 = 0.2;
const SPICE_MATCH_BONUS: f64 = 0.15;

struct FallbackBucket {
    matches: fn(&UserPreferences) -> bool,
    dishes: [&'static str; 3],
    confidence: f64,
}

fn is_spicy_sichuan(prefs: &UserPreferences) -> bool {
    prefs.cuisine_type.as_deref() == Some("川菜") && prefs.spicy_level == Some(SpicyLevel::High)
}

fn is_cantonese(prefs: &UserPreferences) -> bool {
    prefs.cuisine_type.as_deref() == Some("粤菜")
}

fn always(_: &UserPreferences) -> bool {
    true
}

/// First matching bucket wins; the last one always matches.
const FALLBACK_TABLE: &[FallbackBucket] = &[
    FallbackBucket {
        matches: is_spicy_sichuan,
        dishes: ["水煮鱼", "麻婆豆腐", "夫妻肺片"],
        confidence: 0.9,
    },
    FallbackBucket {
        matches: is_cantonese,
        dishes: ["白切鸡", "叉烧", "清蒸鱼"],
        confidence: 0.85,
    },
    FallbackBucket {
        matches: always,
        dishes: ["番茄炒蛋", "红烧肉", "宫保鸡丁"],
        confidence: 0.7,
    },
];

/// Deterministic recommendations from the preference table.
pub fn generate_fallback(prefs: &UserPreferences) -> AIResponse {
    let bucket = FALLBACK_TABLE
        .iter()
        .find(|bucket| (bucket.matches)(prefs))
        .unwrap_or(&FALLBACK_TABLE[FALLBACK_TABLE.len() - 1]);

    AIResponse {
        message: FALLBACK_MESSAGE.to_string(),
        recommendations: bucket.dishes.iter().map(|d| d.to_string()).collect(),
        confidence: bucket.confidence,
        cuisine_type: prefs.cuisine_type.clone(),
        cooking_time: None,
        difficulty: None,
    }
}

/// Known dishes mentioned in `message`, without duplicates.
pub fn extract_recommendations(message: &str) -> Vec<String> {
    KNOWN_DISHES
        .iter()
        .filter(|dish| message.contains(*dish))
        .map(|dish| dish.to_string())
        .collect()
}

/// Heuristic match score in [0, 1]. Not a probability.
pub fn confidence(prefs: &UserPreferences, recommendations: &[String]) -> f64 {
    let mut score = BASE_CONFIDENCE;

    let cuisine_initial = prefs
        .cuisine_type
        .as_deref()
        .and_then(|cuisine| cuisine.chars().next());
    if let Some(initial) = cuisine_initial {
        if recommendations.iter().any(|dish| dish.contains(initial)) {
            score += CUISINE_MATCH_BONUS;
        }
    }

    if prefs.spicy_level == Some(SpicyLevel::High)
        && recommendations
            .iter()
            .any(|dish| SPICE_MARKERS.iter().any(|marker| dish.contains(marker)))
    {
        score += SPICE_MATCH_BONUS;
    }

    score.min(1.0)
}

/// Checks an untyped AI payload has the `AIResponse` essentials.
pub fn validate_ai_response(response: &Value) -> ValidationReport {
    if response.is_null() {
        return ValidationReport::from_errors(vec!["Response is null or undefined".to_string()]);
    }

    let mut errors = Vec::new();
    if !response.get("message").is_some_and(Value::is_string) {
        errors.push("Message must be a string".to_string());
    }
    if !response.get("recommendations").is_some_and(Value::is_array) {
        errors.push("Recommendations must be an array".to_string());
    }
    let confidence_ok = response
        .get("confidence")
        .and_then(Value::as_f64)
        .is_some_and(|c| (0.0..=1.0).contains(&c));
    if !confidence_ok {
        errors.push("Confidence must be a number between 0 and 1".to_string());
    }
    ValidationReport::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prefs(cuisine: Option<&str>, spicy: Option<SpicyLevel>) -> UserPreferences {
        UserPreferences {
            cuisine_type: cuisine.map(str::to_string),
            spicy_level: spicy,
            ..Default::default()
        }
    }

    fn dishes(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_fallback_buckets() {
        let sichuan = generate_fallback(&prefs(Some("川菜"), Some(SpicyLevel::High)));
        assert_eq!(sichuan.recommendations, dishes(&["水煮鱼", "麻婆豆腐", "夫妻肺片"]));
        assert_eq!(sichuan.confidence, 0.9);

        let mild_sichuan = generate_fallback(&prefs(Some("川菜"), Some(SpicyLevel::Mild)));
        assert_eq!(mild_sichuan.confidence, 0.7);

        let cantonese = generate_fallback(&prefs(Some("粤菜"), None));
        assert_eq!(cantonese.recommendations, dishes(&["白切鸡", "叉烧", "清蒸鱼"]));
        assert_eq!(cantonese.message, FALLBACK_MESSAGE);

        let default = generate_fallback(&UserPreferences::default());
        assert_eq!(default.recommendations, dishes(&["番茄炒蛋", "红烧肉", "宫保鸡丁"]));
    }

    #[test]
    fn test_extract_recommendations_dedupes_in_vocabulary_order() {
        let text = "推荐红烧肉、水煮鱼，再来一份水煮鱼和夫妻肺片";
        assert_eq!(extract_recommendations(text), dishes(&["水煮鱼", "红烧肉"]));
        assert!(extract_recommendations("随便吃点").is_empty());
    }

    #[test]
    fn test_confidence_signals() {
        let recs = dishes(&["川味麻辣鸡"]);
        assert_eq!(confidence(&UserPreferences::default(), &recs), 0.5);
        assert!((confidence(&prefs(Some("川菜"), None), &recs) - 0.7).abs() < 1e-9);
        assert!(
            (confidence(&prefs(Some("川菜"), Some(SpicyLevel::High)), &recs) - 0.85).abs() < 1e-9
        );
        assert_eq!(confidence(&prefs(None, Some(SpicyLevel::Mild)), &recs), 0.5);
    }

    #[test]
    fn test_confidence_is_monotonic_and_bounded() {
        let levels = [
            None,
            Some(SpicyLevel::None),
            Some(SpicyLevel::Mild),
            Some(SpicyLevel::Medium),
            Some(SpicyLevel::High),
        ];
        let cuisines = [None, Some("川菜"), Some("粤菜")];
        let pool = dishes(&["水煮鱼", "麻婆豆腐", "粤式叉烧", "川味辣子鸡", "清蒸鱼"]);

        for level in levels {
            for cuisine in cuisines {
                let p = prefs(cuisine, level);
                let mut previous = 0.0;
                for n in 0..=pool.len() {
                    let score = confidence(&p, &pool[..n]);
                    assert!(score >= previous, "adding dishes lowered the score");
                    assert!((0.0..=1.0).contains(&score));
                    previous = score;
                }
            }
        }
    }

    #[test]
    fn test_validate_ai_response() {
        let good = json!({"message": "好", "recommendations": [], "confidence": 0.8});
        assert!(validate_ai_response(&good).is_valid);

        let bad = json!({"message": 1, "recommendations": "x", "confidence": 1.5});
        assert_eq!(validate_ai_response(&bad).errors.len(), 3);

        let null = validate_ai_response(&Value::Null);
        assert_eq!(null.errors, vec!["Response is null or undefined".to_string()]);
    }
}
