use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::contact_number;
use crate::functions::registry::CallFunction;
use crate::functions::types::{format_dollars, spoken_list, FunctionContext, FunctionDefinition, FunctionResult, PropertySchema};
use crate::models::{CallOutcome, CrmProviderKind, InventoryItem, Lead, NewLead};
use crate::personality::Phrase;
use crate::scheduling::format_spoken;

const INVENTORY_MATCHES: i64 = 5;

/// Look up stock for an item
pub struct CheckInventoryFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct CheckInventoryArgs {
    item: String,
}

impl CheckInventoryFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "check_inventory",
            "Check whether an item is in stock and what it costs.",
        )
        .required_property("item", PropertySchema::string("Item name or SKU the caller asked about"));
        CheckInventoryFunction { definition }
    }
}

fn stock_sentence(item: &InventoryItem) -> String {
    let price = item
        .price_cents
        .map(|p| format!(" They're {} each.", format_dollars(p)))
        .unwrap_or_default();
    match item.quantity {
        q if q <= 0 => format!("Sorry, {} is currently out of stock.", item.name),
        1 => format!("Yes, we have one {} left in stock.{}", item.name, price),
        q => format!("Yes, we have {} {} in stock.{}", q, item.name, price),
    }
}

#[async_trait]
impl CallFunction for CheckInventoryFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: CheckInventoryArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[check_inventory] Invalid args: {}", e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        let items = match ctx.db.search_inventory(&ctx.business.id, &args.item, INVENTORY_MATCHES) {
            Ok(items) => items,
            Err(e) => {
                log::error!("[check_inventory] Search failed for {}: {}", ctx.business.id, e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        let data = json!({ "items": items });
        let sentence = match items.as_slice() {
            [] => format!("I don't see {} in our inventory. Is there anything else I can check for you?", args.item.trim()),
            [item] => stock_sentence(item),
            [first, ..] if first.name.eq_ignore_ascii_case(args.item.trim()) => stock_sentence(first),
            many => {
                let names: Vec<String> = many.iter().map(|i| i.name.clone()).collect();
                let in_stock = many.iter().filter(|i| i.quantity > 0).count();
                format!(
                    "I found a few matches: {}. {} of them are in stock. Which one did you mean?",
                    spoken_list(&names, "and"),
                    in_stock
                )
            }
        };
        FunctionResult::success(sentence).with_data(data)
    }
}

/// Look up an order by number, or the caller's latest order
pub struct CheckOrderStatusFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct CheckOrderStatusArgs {
    order_number: Option<String>,
}

impl CheckOrderStatusFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "check_order_status",
            "Check the status of the caller's order. Ask for the order number if they have it.",
        )
        .property("order_number", PropertySchema::string("Order number, e.g. #1042"));
        CheckOrderStatusFunction { definition }
    }
}

#[async_trait]
impl CallFunction for CheckOrderStatusFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: CheckOrderStatusArgs = serde_json::from_value(args).unwrap_or(CheckOrderStatusArgs { order_number: None });

        let lookup = match (args.order_number.as_deref().filter(|n| !n.trim().is_empty()), &ctx.caller_number) {
            (Some(number), _) => ctx.db.find_order_by_number(&ctx.business.id, number),
            (None, Some(phone)) => ctx.db.latest_order_for_phone(&ctx.business.id, phone),
            (None, None) => return FunctionResult::failure("Could you tell me your order number?"),
        };

        let order = match lookup {
            Ok(Some(order)) => order,
            Ok(None) => {
                let sentence = if args.order_number.is_some() {
                    "I couldn't find an order with that number. Could you double-check it for me?"
                } else {
                    "I couldn't find an order for this phone number. Do you have the order number handy?"
                };
                return FunctionResult::failure(sentence).with_data(json!({ "found": false }));
            }
            Err(e) => {
                log::error!("[check_order_status] Lookup failed for {}: {}", ctx.business.id, e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        ctx.mark_outcome(CallOutcome::Info);
        let mut sentence = format!("Order {} is {}.", order.order_number, order.status.replace('_', " "));
        if let Some(ready) = order.estimated_ready_at {
            if ready > ctx.now {
                sentence.push_str(&format!(" It should be ready {}.", format_spoken(&ready.with_timezone(&ctx.tz()))));
            }
        }
        FunctionResult::success(sentence).with_data(json!({ "found": true, "order": order }))
    }
}

/// Record a sales lead and push it to the CRM
pub struct CreateLeadFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct CreateLeadArgs {
    name: String,
    phone: Option<String>,
    email: Option<String>,
    interest: Option<String>,
    notes: Option<String>,
}

impl CreateLeadFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "create_lead",
            "Save a prospective customer's details so the team can follow up.",
        )
        .required_property("name", PropertySchema::string("Caller's full name"))
        .property("phone", PropertySchema::string("Best phone number, if different from the calling number"))
        .property("email", PropertySchema::string("Email address"))
        .property("interest", PropertySchema::string("What they are interested in"))
        .property("notes", PropertySchema::string("Anything else worth noting"));
        CreateLeadFunction { definition }
    }
}

impl CreateLeadFunction {
    /// Push to HubSpot when the business has it connected; failures only log
    async fn sync_to_crm(&self, ctx: &FunctionContext, lead: &Lead) -> Option<String> {
        let hubspot = ctx.integrations.hubspot.as_ref()?;
        let integration = match ctx.db.get_crm_integration(&ctx.business.id, CrmProviderKind::Hubspot) {
            Ok(Some(integration)) => integration,
            Ok(None) => return None,
            Err(e) => {
                log::error!("[create_lead] Failed to load CRM integration: {}", e);
                return None;
            }
        };

        match hubspot.push_lead(&ctx.db, &integration, lead, ctx.now).await {
            Ok(contact_id) => {
                if let Err(e) = ctx.db.set_lead_crm_contact(lead.id, &contact_id) {
                    log::error!("[create_lead] Failed to store CRM contact id for lead {}: {}", lead.id, e);
                }
                Some(contact_id)
            }
            Err(e) => {
                log::warn!("[create_lead] HubSpot push failed for lead {}: {}", lead.id, e);
                None
            }
        }
    }
}

#[async_trait]
impl CallFunction for CreateLeadFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: CreateLeadArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[create_lead] Invalid args: {}", e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        let lead = match ctx.db.insert_lead(&NewLead {
            business_id: ctx.business.id.clone(),
            call_id: ctx.call_id(),
            name: args.name.trim().to_string(),
            phone: contact_number(ctx, args.phone.as_deref()),
            email: args.email.map(|e| e.trim().to_lowercase()).filter(|e| e.contains('@')),
            interest: args.interest,
            notes: args.notes,
        }) {
            Ok(lead) => lead,
            Err(e) => {
                log::error!("[create_lead] Failed to store lead for {}: {}", ctx.business.id, e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        log::info!("[create_lead] Stored lead {} for {}", lead.id, ctx.business.id);
        ctx.mark_outcome(CallOutcome::Info);
        let crm_contact_id = self.sync_to_crm(ctx, &lead).await;

        let first_name = lead.name.split_whitespace().next().unwrap_or("there");
        FunctionResult::success(format!(
            "Thanks, {}! I've passed your details to the team and someone will follow up with you soon.",
            first_name
        ))
        .with_data(json!({ "lead_id": lead.id, "crm_contact_id": crm_contact_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthClientConfig;
    use crate::functions::testing::{test_context, test_context_with, CALLER_PHONE};
    use crate::integrations::{HubspotClient, Integrations};
    use crate::models::OAuthTokens;
    use chrono::{Duration, TimeZone, Utc};
    use mockito::Server;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 5, 15, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_check_inventory() {
        let ctx = test_context(now());
        ctx.db.insert_inventory_item(&ctx.business.id, "Electric Toothbrush", Some("ETB-1"), 4, Some(4999)).unwrap();
        ctx.db.insert_inventory_item(&ctx.business.id, "Whitening Kit", None, 0, None).unwrap();

        let brush = CheckInventoryFunction::new().execute(json!({"item": "toothbrush"}), &ctx).await;
        assert_eq!(brush.result, "Yes, we have 4 Electric Toothbrush in stock. They're $49.99 each.");

        let kit = CheckInventoryFunction::new().execute(json!({"item": "WHITENING"}), &ctx).await;
        assert_eq!(kit.result, "Sorry, Whitening Kit is currently out of stock.");

        let none = CheckInventoryFunction::new().execute(json!({"item": "floss"}), &ctx).await;
        assert!(none.result.starts_with("I don't see floss"));
    }

    #[tokio::test]
    async fn test_check_order_by_number_and_phone() {
        let ctx = test_context(now());
        ctx.db
            .insert_order(&ctx.business.id, "1042", Some(CALLER_PHONE), "ready_for_pickup", None)
            .unwrap();

        let by_number = CheckOrderStatusFunction::new()
            .execute(json!({"order_number": "#1042"}), &ctx)
            .await;
        assert_eq!(by_number.result, "Order 1042 is ready for pickup.");

        let by_phone = CheckOrderStatusFunction::new().execute(json!({}), &ctx).await;
        assert!(by_phone.success);

        let missing = CheckOrderStatusFunction::new()
            .execute(json!({"order_number": "9999"}), &ctx)
            .await;
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_order_estimate_is_spoken() {
        let ctx = test_context(now());
        ctx.db
            .insert_order(&ctx.business.id, "A7", None, "preparing", Some(now() + Duration::hours(2)))
            .unwrap();
        let result = CheckOrderStatusFunction::new()
            .execute(json!({"order_number": "a7"}), &ctx)
            .await;
        assert_eq!(result.result, "Order A7 is preparing. It should be ready Tuesday, March 5 at 12:00 PM.");
    }

    #[tokio::test]
    async fn test_create_lead_without_crm() {
        let ctx = test_context(now());
        let result = CreateLeadFunction::new()
            .execute(json!({"name": "Dana Reyes", "interest": "Invisalign"}), &ctx)
            .await;
        assert!(result.success);
        assert!(result.result.starts_with("Thanks, Dana!"));
        assert_eq!(result.data.unwrap()["crm_contact_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_create_lead_pushes_to_hubspot() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/crm/v3/objects/contacts")
            .match_header("authorization", "Bearer hs-token")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"hs-1"}"#)
            .create_async()
            .await;

        let mut integrations = Integrations::disabled();
        integrations.hubspot = Some(
            HubspotClient::new(
                reqwest::Client::new(),
                &OAuthClientConfig {
                    client_id: "id".to_string(),
                    client_secret: "secret".to_string(),
                },
            )
            .with_base_url(&server.url()),
        );
        let ctx = test_context_with(now(), integrations);
        ctx.db
            .upsert_crm_tokens(
                &ctx.business.id,
                CrmProviderKind::Hubspot,
                &OAuthTokens {
                    access_token: "hs-token".to_string(),
                    refresh_token: Some("refresh".to_string()),
                    expires_at: Some(now() + Duration::hours(1)),
                },
            )
            .unwrap();

        let result = CreateLeadFunction::new()
            .execute(json!({"name": "Dana Reyes", "email": "dana@example.com"}), &ctx)
            .await;
        mock.assert_async().await;
        assert_eq!(result.data.unwrap()["crm_contact_id"], "hs-1");
    }
}
