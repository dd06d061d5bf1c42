use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::Database;
use crate::integrations::{IntegrationError, IntegrationResult, Integrations};
use crate::models::{AiConfig, Business, Call, CallOutcome};
use crate::personality::Phrase;
use crate::scheduling::business_tz;

/// JSON Schema property definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    pub fn string(description: &str) -> Self {
        Self::typed("string", description)
    }

    pub fn integer(description: &str) -> Self {
        Self::typed("integer", description)
    }

    pub fn number(description: &str) -> Self {
        Self::typed("number", description)
    }

    pub fn boolean(description: &str) -> Self {
        Self::typed("boolean", description)
    }

    fn typed(schema_type: &str, description: &str) -> Self {
        PropertySchema {
            schema_type: schema_type.to_string(),
            description: description.to_string(),
            default: None,
            enum_values: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// Function arguments in JSON Schema form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for FunctionInputSchema {
    fn default() -> Self {
        FunctionInputSchema {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: vec![],
        }
    }
}

/// Definition handed to the voice agent so it knows when and how to call a function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "parameters")]
    pub input_schema: FunctionInputSchema,
}

impl FunctionDefinition {
    pub fn new(name: &str, description: &str) -> Self {
        FunctionDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: FunctionInputSchema::default(),
        }
    }

    pub fn property(mut self, name: &str, schema: PropertySchema) -> Self {
        self.input_schema.properties.insert(name.to_string(), schema);
        self
    }

    pub fn required_property(mut self, name: &str, schema: PropertySchema) -> Self {
        self.input_schema.required.push(name.to_string());
        self.property(name, schema)
    }
}

/// What the voice agent receives back. `result` is read aloud to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResult {
    pub success: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_call: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_number: Option<String>,
}

impl FunctionResult {
    pub fn success(result: impl Into<String>) -> Self {
        FunctionResult {
            success: true,
            result: result.into(),
            data: None,
            end_call: None,
            transfer_number: None,
        }
    }

    pub fn failure(result: impl Into<String>) -> Self {
        FunctionResult {
            success: false,
            ..Self::success(result)
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn ending_call(mut self) -> Self {
        self.end_call = Some(true);
        self
    }

    pub fn with_transfer(mut self, number: String) -> Self {
        self.transfer_number = Some(number);
        self
    }
}

/// Everything a call function can see about the call in progress
#[derive(Clone)]
pub struct FunctionContext {
    pub db: Arc<Database>,
    pub integrations: Arc<Integrations>,
    pub business: Business,
    pub ai_config: AiConfig,
    pub call: Option<Call>,
    /// Normalized number of the person on the line
    pub caller_number: Option<String>,
    pub now: DateTime<Utc>,
}

impl std::fmt::Debug for FunctionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionContext")
            .field("business_id", &self.business.id)
            .field("call_id", &self.call.as_ref().map(|c| c.id))
            .field("now", &self.now)
            .finish()
    }
}

impl FunctionContext {
    pub fn tz(&self) -> Tz {
        business_tz(&self.business.timezone)
    }

    /// Today's date in the business's timezone
    pub fn today(&self) -> NaiveDate {
        self.now.with_timezone(&self.tz()).date_naive()
    }

    pub fn call_id(&self) -> Option<i64> {
        self.call.as_ref().map(|c| c.id)
    }

    /// Canned sentence in the business's tone
    pub fn say(&self, phrase: Phrase) -> &'static str {
        self.ai_config.personality.phrase(phrase)
    }

    /// Failed result carrying a canned sentence
    pub fn fail(&self, phrase: Phrase) -> FunctionResult {
        FunctionResult::failure(self.say(phrase))
    }

    /// Record the call outcome. Failures are logged, never surfaced to the caller.
    pub fn mark_outcome(&self, outcome: CallOutcome) {
        if let Some(call_id) = self.call_id() {
            if let Err(e) = self.db.set_call_outcome(call_id, outcome) {
                log::error!("[functions] Failed to set outcome {} on call {}: {}", outcome, call_id, e);
            }
        }
    }

    /// Text a number from the business's line
    pub async fn send_sms(&self, to: &str, body: &str) -> IntegrationResult<String> {
        let twilio = self.integrations.twilio.as_ref().ok_or(IntegrationError::NotConfigured("twilio"))?;
        let from = self
            .business
            .phone_number
            .as_deref()
            .ok_or(IntegrationError::NotConfigured("business phone number"))?;
        twilio.send_sms(from, to, body).await
    }
}

/// Accept an integer sent either as a JSON number or a string
pub fn deserialize_i64_lenient<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        Some(Value::Number(n)) => Ok(n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))),
        Some(Value::String(s)) => Ok(s.trim().parse().ok()),
        _ => Ok(None),
    }
}

/// Accept a boolean sent either as JSON or as "true"/"yes"
pub fn deserialize_bool_lenient<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => Ok(Some(matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"))),
        _ => Ok(None),
    }
}

/// Accept a dollar amount as a number or a spoken string like "$45.50"
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => Ok(s.trim().trim_start_matches('$').replace(',', "").parse().ok()),
        _ => Ok(None),
    }
}

/// Join spoken items: "a", "a or b", "a, b, or c"
pub fn spoken_list(items: &[String], conjunction: &str) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{} {} {}", a, conjunction, b),
        [rest @ .., last] => format!("{}, {} {}", rest.join(", "), conjunction, last),
    }
}

/// "$45.00" for an amount in cents
pub fn format_dollars(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
