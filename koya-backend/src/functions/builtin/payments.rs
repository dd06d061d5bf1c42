use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::functions::registry::CallFunction;
use crate::functions::types::{
    deserialize_amount, format_dollars, FunctionContext, FunctionDefinition, FunctionResult, PropertySchema,
};
use crate::personality::Phrase;
use crate::phone::last_four;

/// Text the caller a link to pay
pub struct ProcessPaymentFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct ProcessPaymentArgs {
    #[serde(default, deserialize_with = "deserialize_amount")]
    amount: Option<f64>,
    description: Option<String>,
}

impl ProcessPaymentFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "process_payment",
            "Send the caller a secure payment link by text. Never ask for card numbers over the phone.",
        )
        .required_property("amount", PropertySchema::number("Amount to charge in dollars, e.g. 45.00"))
        .property("description", PropertySchema::string("What the payment is for"));
        ProcessPaymentFunction { definition }
    }
}

#[async_trait]
impl CallFunction for ProcessPaymentFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: ProcessPaymentArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[process_payment] Invalid args: {}", e);
                return ctx.fail(Phrase::PaymentError);
            }
        };

        let amount_cents = args.amount.map(|a| (a * 100.0).round() as i64).unwrap_or(0);
        if amount_cents <= 0 {
            return FunctionResult::failure("How much would you like to pay today?");
        }
        let Some(caller) = ctx.caller_number.clone() else {
            return ctx.fail(Phrase::PaymentError);
        };
        let description = args
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("Payment to {}", ctx.business.name));
        let amount = format_dollars(amount_cents);

        if let Some(link) = checkout_link(ctx, amount_cents, &description).await {
            let body = format!("{}: pay {} for {} here: {}", ctx.business.name, amount, description, link);
            return match ctx.send_sms(&caller, &body).await {
                Ok(_) => FunctionResult::success(format!(
                    "I've texted you a secure payment link for {} to the number ending in {}.",
                    amount,
                    last_four(&caller)
                ))
                .with_data(json!({ "link_sent": true, "amount_cents": amount_cents, "checkout": true })),
                Err(e) => {
                    log::warn!("[process_payment] Link created but SMS failed: {}", e);
                    FunctionResult::success(format!(
                        "I've set up a payment of {}, but I couldn't text the link just now. Someone from our team will follow up with it.",
                        amount
                    ))
                    .with_data(json!({ "link_sent": false, "amount_cents": amount_cents, "checkout": true }))
                }
            };
        }

        if let Some(url) = ctx.business.payment_link_url.as_deref() {
            let body = format!("{}: pay {} for {} here: {}", ctx.business.name, amount, description, url);
            return match ctx.send_sms(&caller, &body).await {
                Ok(_) => FunctionResult::success(format!(
                    "I've texted you our payment link. The amount is {}.",
                    amount
                ))
                .with_data(json!({ "link_sent": true, "amount_cents": amount_cents, "checkout": false })),
                Err(e) => {
                    log::warn!("[process_payment] Payment link SMS failed: {}", e);
                    ctx.fail(Phrase::PaymentError)
                }
            };
        }

        log::info!("[process_payment] No payment method configured for {}", ctx.business.id);
        ctx.fail(Phrase::PaymentError)
    }
}

/// Checkout URL on the business's connected Stripe account, if it can take charges
async fn checkout_link(ctx: &FunctionContext, amount_cents: i64, description: &str) -> Option<String> {
    let stripe = ctx.integrations.stripe.as_ref()?;
    let account = match ctx.db.get_payment_account(&ctx.business.id) {
        Ok(Some(account)) if account.charges_enabled => account,
        Ok(_) => return None,
        Err(e) => {
            log::error!("[process_payment] Failed to load payment account: {}", e);
            return None;
        }
    };
    match stripe
        .create_checkout_link(&account.stripe_account_id, amount_cents, description)
        .await
    {
        Ok(link) => Some(link.url),
        Err(e) => {
            log::warn!("[process_payment] Checkout session failed: {}", e);
            None
        }
    }
}
