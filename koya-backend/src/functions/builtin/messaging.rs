use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

use super::contact_number;
use crate::functions::registry::CallFunction;
use crate::functions::types::{FunctionContext, FunctionDefinition, FunctionResult, PropertySchema};
use crate::models::{CallOutcome, NewMessage, Urgency};
use crate::personality::Phrase;
use crate::phone::{last_four, normalize_phone};

/// Leave a message in the business's inbox
pub struct TakeMessageFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct TakeMessageArgs {
    message: String,
    caller_name: Option<String>,
    callback_number: Option<String>,
    urgency: Option<String>,
}

impl TakeMessageFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "take_message",
            "Take a message for the business. Use when the caller wants someone to call them back.",
        )
        .required_property("message", PropertySchema::string("The caller's message"))
        .property("caller_name", PropertySchema::string("Caller's name"))
        .property(
            "callback_number",
            PropertySchema::string("Number to call back, if different from the calling number"),
        )
        .property(
            "urgency",
            PropertySchema::string("How urgent the message is").with_enum(&["low", "normal", "high"]),
        );
        TakeMessageFunction { definition }
    }
}

impl TakeMessageFunction {
    async fn alert_owner(&self, ctx: &FunctionContext, name: Option<&str>, phone: Option<&str>, body: &str) {
        let Some(owner) = ctx.business.owner_phone.as_deref() else {
            return;
        };
        match ctx.db.get_call_settings(&ctx.business.id) {
            Ok(settings) if settings.urgent_message_alerts => {}
            Ok(_) => return,
            Err(e) => {
                log::error!("[take_message] Failed to load call settings: {}", e);
                return;
            }
        }

        let alert = format!(
            "URGENT message from {} ({}): {}",
            name.unwrap_or("a caller"),
            phone.unwrap_or("no number"),
            body
        );
        if let Err(e) = ctx.send_sms(owner, &alert).await {
            log::warn!("[take_message] Urgent alert to owner of {} failed: {}", ctx.business.id, e);
        }
    }
}

#[async_trait]
impl CallFunction for TakeMessageFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: TakeMessageArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[take_message] Invalid args: {}", e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        let urgency = args
            .urgency
            .as_deref()
            .and_then(|u| Urgency::from_str(u.trim()).ok())
            .unwrap_or_default();
        let caller_name = args.caller_name.filter(|n| !n.trim().is_empty());
        let caller_phone = contact_number(ctx, args.callback_number.as_deref());

        let message = match ctx.db.insert_message(&NewMessage {
            business_id: ctx.business.id.clone(),
            call_id: ctx.call_id(),
            caller_name: caller_name.clone(),
            caller_phone: caller_phone.clone(),
            body: args.message.trim().to_string(),
            urgency,
            recording_url: None,
        }) {
            Ok(message) => message,
            Err(e) => {
                log::error!("[take_message] Failed to store message for {}: {}", ctx.business.id, e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        log::info!("[take_message] Stored {} message {} for {}", urgency, message.id, ctx.business.id);
        ctx.mark_outcome(CallOutcome::Message);

        if urgency == Urgency::High {
            self.alert_owner(ctx, caller_name.as_deref(), caller_phone.as_deref(), &message.body)
                .await;
        }

        let sentence = if urgency == Urgency::High {
            "I've marked your message as urgent and passed it along. Someone will get back to you as soon as possible."
        } else {
            "I've passed your message along. Someone will get back to you soon."
        };
        FunctionResult::success(sentence).with_data(json!({ "message_id": message.id, "urgency": urgency }))
    }
}

/// Text the caller
pub struct SendSmsFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct SendSmsArgs {
    message: String,
    phone_number: Option<String>,
}

impl SendSmsFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "send_sms",
            "Send the caller a text message, e.g. the address or a link they asked for.",
        )
        .required_property("message", PropertySchema::string("Text to send"))
        .property(
            "phone_number",
            PropertySchema::string("Number to text, if different from the calling number"),
        );
        SendSmsFunction { definition }
    }
}

#[async_trait]
impl CallFunction for SendSmsFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: SendSmsArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[send_sms] Invalid args: {}", e);
                return ctx.fail(Phrase::SmsError);
            }
        };

        let to = match args.phone_number.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(given) => match normalize_phone(given) {
                Some(to) => to,
                None => {
                    return FunctionResult::failure(format!(
                        "{} That number doesn't look quite right. Could you repeat it?",
                        ctx.say(Phrase::SmsError)
                    ));
                }
            },
            None => match ctx.caller_number.clone() {
                Some(to) => to,
                None => return FunctionResult::failure("What number should I text that to?"),
            },
        };

        match ctx.db.is_on_dnc(&ctx.business.id, &to) {
            Ok(false) => {}
            Ok(true) => {
                log::info!("[send_sms] ...{} is on the DNC list for {}", last_four(&to), ctx.business.id);
                return FunctionResult::failure(format!(
                    "{} That number has opted out of messages from us.",
                    ctx.say(Phrase::SmsError)
                ))
                .with_data(json!({ "sent": false, "reason": "dnc" }));
            }
            Err(e) => {
                log::error!("[send_sms] DNC check failed: {}", e);
                return ctx.fail(Phrase::SmsError);
            }
        }

        match ctx.send_sms(&to, args.message.trim()).await {
            Ok(sid) => FunctionResult::success(format!(
                "Done! I've sent that to the number ending in {}.",
                last_four(&to)
            ))
            .with_data(json!({ "sent": true, "sid": sid })),
            Err(e) => {
                log::warn!("[send_sms] Send to ...{} failed: {}", last_four(&to), e);
                ctx.fail(Phrase::SmsError).with_data(json!({ "sent": false }))
            }
        }
    }
}

/// Email the caller, or queue the request for staff when email isn't set up
pub struct SendEmailFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct SendEmailArgs {
    email: String,
    subject: Option<String>,
    body: String,
    caller_name: Option<String>,
}

impl SendEmailFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "send_email",
            "Email the caller information they asked for, such as a quote or directions.",
        )
        .required_property("email", PropertySchema::string("Caller's email address"))
        .required_property("body", PropertySchema::string("What the email should say"))
        .property("subject", PropertySchema::string("Email subject line"))
        .property("caller_name", PropertySchema::string("Caller's name"));
        SendEmailFunction { definition }
    }
}

#[async_trait]
impl CallFunction for SendEmailFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: SendEmailArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("[send_email] Invalid args: {}", e);
                return ctx.fail(Phrase::GenericError);
            }
        };

        let email = args.email.trim().replace(' ', "").to_lowercase();
        if !email.contains('@') || !email.contains('.') {
            return FunctionResult::failure("I didn't quite get that email address. Could you spell it out for me?");
        }
        let subject = args
            .subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("Information from {}", ctx.business.name));

        if let (Some(nylas), Some(grant)) = (&ctx.integrations.nylas, ctx.business.owner_email.as_deref()) {
            match nylas.send_email(grant, &email, &subject, &args.body).await {
                Ok(id) => {
                    ctx.mark_outcome(CallOutcome::Info);
                    return FunctionResult::success(format!("I've emailed that to {}. It should arrive shortly.", email))
                        .with_data(json!({ "sent": true, "message_id": id }));
                }
                Err(e) => log::warn!("[send_email] Nylas send for {} failed, queueing for staff: {}", ctx.business.id, e),
            }
        }

        let request = format!("Email request for {} - {}: {}", email, subject, args.body.trim());
        match ctx.db.insert_message(&NewMessage {
            business_id: ctx.business.id.clone(),
            call_id: ctx.call_id(),
            caller_name: args.caller_name,
            caller_phone: ctx.caller_number.clone(),
            body: request,
            urgency: Urgency::Normal,
            recording_url: None,
        }) {
            Ok(message) => {
                ctx.mark_outcome(CallOutcome::Message);
                FunctionResult::success(format!(
                    "I've passed that along, and someone from the team will email {} shortly.",
                    email
                ))
                .with_data(json!({ "sent": false, "queued_message_id": message.id }))
            }
            Err(e) => {
                log::error!("[send_email] Failed to queue email request for {}: {}", ctx.business.id, e);
                ctx.fail(Phrase::GenericError)
            }
        }
    }
}
