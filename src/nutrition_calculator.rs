use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::api_connection::endpoints::DEFAULT_NUTRITION_WEBHOOK_URL;
use crate::api_connection::{ApiConnectionError, JsonPost, JsonTransport};
use crate::ingredient_parser::{self, IngredientItem, ValidationReport, DEFAULT_MAX_AMOUNT};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionCalculationRequest {
    pub ingredients: Vec<IngredientItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct NutritionWebhookPayload<'a> {
    ingredients: &'a [IngredientItem],
    servings: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    timestamp: String,
}

/// Aggregate totals for the whole ingredient list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionInfo {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default)]
    pub fiber: f64,
    #[serde(default)]
    pub sugar: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sodium: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cholesterol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitamin_a: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitamin_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calcium: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iron: Option<f64>,
}

impl NutritionInfo {
    fn negative_field(&self) -> Option<&'static str> {
        let required = [
            ("calories", self.calories),
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
            ("fiber", self.fiber),
            ("sugar", self.sugar),
        ];
        let optional = [
            ("sodium", self.sodium),
            ("cholesterol", self.cholesterol),
            ("vitaminA", self.vitamin_a),
            ("vitaminC", self.vitamin_c),
            ("calcium", self.calcium),
            ("iron", self.iron),
        ];
        required
            .into_iter()
            .chain(optional.into_iter().filter_map(|(name, v)| v.map(|v| (name, v))))
            .find(|(_, value)| *value < 0.0 || value.is_nan())
            .map(|(name, _)| name)
    }
}

/// `analysis` and `perServing` belong to the upstream workflow; they are passed
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionCalculationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_serving: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NutritionCalculationResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            nutrition: None,
            analysis: None,
            per_serving: None,
            error: Some(error.into()),
        }
    }

    /// Free-text balance summary, when the workflow provided one.
    pub fn balance_summary(&self) -> Option<&str> {
        let balance = self.analysis.as_ref()?.get("balance")?;
        balance
            .as_str()
            .or_else(|| balance.get("summary").and_then(Value::as_str))
    }
}

fn parse_nutrition_body(body: &Value) -> Result<NutritionCalculationResponse, ApiConnectionError> {
    if !body.is_object() {
        return Err(ApiConnectionError::UnexpectedShape(
            "nutrition response is not an object".to_string(),
        ));
    }

    let nutrition = match body.get("nutrition") {
        Some(Value::Null) | None => None,
        Some(raw) => {
            let info: NutritionInfo = serde_json::from_value(raw.clone())?;
            if let Some(field) = info.negative_field() {
                return Err(ApiConnectionError::UnexpectedShape(format!(
                    "nutrition field '{}' is negative",
                    field
                )));
            }
            Some(info)
        }
    };

    let passthrough = |key: &str| body.get(key).filter(|v| !v.is_null()).cloned();

    Ok(NutritionCalculationResponse {
        success: true,
        nutrition,
        analysis: passthrough("analysis"),
        per_serving: passthrough("perServing"),
        error: None,
    })
}

pub struct NutritionClient {
    transport: Arc<dyn JsonTransport>,
    endpoint: String,
    timeout: Duration,
    max_amount: f64,
}

impl NutritionClient {
    pub fn new(transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            transport,
            endpoint: DEFAULT_NUTRITION_WEBHOOK_URL.to_string(),
            timeout: Duration::from_secs(10),
            max_amount: DEFAULT_MAX_AMOUNT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_amount(mut self, max_amount: f64) -> Self {
        self.max_amount = max_amount;
        self
    }

    pub async fn calculate(&self, request: &NutritionCalculationRequest) -> NutritionCalculationResponse {
        match self.try_calculate(request).await {
            Ok(response) => {
                tracing::info!(
                    items = request.ingredients.len(),
                    calories = response.nutrition.as_ref().map(|n| n.calories),
                    "nutrition calculated"
                );
                response
            }
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "nutrition calculation failed");
                NutritionCalculationResponse::failed(e.to_string())
            }
        }
    }

    async fn try_calculate(
        &self,
        request: &NutritionCalculationRequest,
    ) -> Result<NutritionCalculationResponse, ApiConnectionError> {
        let payload = serde_json::to_value(NutritionWebhookPayload {
            ingredients: &request.ingredients,
            servings: request.servings.filter(|s| *s > 0).unwrap_or(1),
            user_id: request.user_id.as_deref(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })?;
        tracing::debug!(payload = %payload, "sending nutrition request");

        let reply = self
            .transport
            .post_json(JsonPost::new(&self.endpoint, &payload, self.timeout))
            .await?
            .error_for_status()?;
        parse_nutrition_body(&reply.json::<Value>()?)
    }

    /// parse → validate → calculate. The request is only sent when validation passes.
    pub async fn calculate_from_text(
        &self,
        raw_text: &str,
        servings: Option<u32>,
        user_id: Option<String>,
    ) -> Result<NutritionCalculationResponse, ValidationReport> {
        let ingredients = ingredient_parser::parse(raw_text);
        let report = ingredient_parser::validate_with_limit(&ingredients, self.max_amount);
        if !report.is_valid {
            tracing::warn!(errors = ?report.errors, "ingredient list rejected");
            return Err(report);
        }

        let request = NutritionCalculationRequest {
            ingredients,
            servings,
            user_id,
        };
        Ok(self.calculate(&request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::fake::{FakeReply, FakeTransport};
    use crate::ingredient_parser::Unit;
    use serde_json::json;

    const URL: &str = "http://n8n.test/webhook/nutrition-calculator";

    fn client(transport: Arc<FakeTransport>) -> NutritionClient {
        NutritionClient::new(transport).with_endpoint(URL)
    }

    fn body() -> Value {
        json!({
            "nutrition": {"calories": 560.0, "protein": 42.0, "carbs": 12.5, "fat": 38.0, "fiber": 3.0, "sugar": 4.0, "sodium": 820.0},
            "analysis": {"balance": {"summary": "蛋白质充足", "details": {"energy": "适中"}}, "highlights": ["高蛋白"]},
            "perServing": {"calories": 280.0, "protein": 21.0, "carbs": 6.25, "fat": 19.0}
        })
    }

    #[tokio::test]
    async fn test_calculate_passes_nested_objects_through() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(URL, FakeReply::json(200, body()));

        let request = NutritionCalculationRequest {
            ingredients: vec![IngredientItem {
                name: "猪肉".to_string(),
                amount: 200.0,
                unit: Unit::Gram,
            }],
            servings: Some(2),
            user_id: None,
        };
        let response = client(transport.clone()).calculate(&request).await;

        assert!(response.success);
        assert_eq!(response.nutrition.as_ref().unwrap().sodium, Some(820.0));
        assert_eq!(response.analysis.as_ref().unwrap()["highlights"][0], "高蛋白");
        assert_eq!(response.balance_summary(), Some("蛋白质充足"));
        assert_eq!(response.per_serving.unwrap()["carbs"], 6.25);

        let sent = &transport.calls()[0].body;
        assert_eq!(sent["servings"], 2);
        assert_eq!(sent["ingredients"][0]["unit"], "g");
    }

    #[tokio::test]
    async fn test_servings_default_to_one() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(URL, FakeReply::json(200, json!({})));
        let request = NutritionCalculationRequest {
            ingredients: vec![],
            servings: None,
            user_id: Some("u-9".to_string()),
        };
        let response = client(transport.clone()).calculate(&request).await;
        assert!(response.success);
        assert!(response.nutrition.is_none());
        let sent = &transport.calls()[0].body;
        assert_eq!(sent["servings"], 1);
        assert_eq!(sent["userId"], "u-9");
    }

    #[tokio::test]
    async fn test_negative_totals_are_rejected() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            URL,
            FakeReply::json(200, json!({"nutrition": {"calories": -1.0, "protein": 1.0, "carbs": 1.0, "fat": 1.0}})),
        );
        let request = NutritionCalculationRequest {
            ingredients: vec![],
            servings: None,
            user_id: None,
        };
        let response = client(transport).calculate(&request).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("calories"));
    }

    #[tokio::test]
    async fn test_transport_failures_share_one_shape() {
        for reply in [FakeReply::Timeout, FakeReply::text(502, "bad gateway")] {
            let transport = Arc::new(FakeTransport::new());
            transport.respond(URL, reply);
            let request = NutritionCalculationRequest {
                ingredients: vec![],
                servings: None,
                user_id: None,
            };
            let response = client(transport).calculate(&request).await;
            assert!(!response.success);
            assert!(response.nutrition.is_none());
            assert!(response.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_calculate_from_text_stops_on_invalid_input() {
        let transport = Arc::new(FakeTransport::new());
        let result = client(transport.clone())
            .calculate_from_text("随便写点什么", None, None)
            .await;
        let report = result.unwrap_err();
        assert_eq!(report.errors, vec!["请输入至少一种食材".to_string()]);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_calculate_from_text_sends_parsed_items() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(URL, FakeReply::json(200, body()));
        let response = client(transport.clone())
            .calculate_from_text("猪肉 200g\n2个 鸡蛋", Some(2), None)
            .await
            .unwrap();
        assert!(response.success);
        let sent = &transport.calls()[0].body;
        assert_eq!(sent["ingredients"][1]["name"], "鸡蛋");
        assert_eq!(sent["ingredients"][1]["unit"], "个");
    }
}
