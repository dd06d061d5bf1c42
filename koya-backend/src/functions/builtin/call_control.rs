use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::functions::registry::CallFunction;
use crate::functions::types::{FunctionContext, FunctionDefinition, FunctionResult, PropertySchema};
use crate::models::{BusinessHours, CallOutcome};
use crate::personality::Phrase;
use crate::scheduling::hours_for_date;

/// Whether the business is open at the context's current time
fn is_open_now(ctx: &FunctionContext, hours: &[BusinessHours]) -> bool {
    let local = ctx.now.with_timezone(&ctx.tz());
    let time = local.time();
    hours_for_date(hours, local.date_naive()).is_some_and(|day| time >= day.open_time && time < day.close_time)
}

/// Hand the call to a person
pub struct TransferCallFunction {
    definition: FunctionDefinition,
}

#[derive(Debug, Deserialize)]
struct TransferCallArgs {
    reason: Option<String>,
}

impl TransferCallFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "transfer_call",
            "Transfer the caller to a staff member. Use when the caller asks for a person or needs something you can't handle.",
        )
        .property("reason", PropertySchema::string("Why the caller wants to be transferred"));
        TransferCallFunction { definition }
    }
}

#[async_trait]
impl CallFunction for TransferCallFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: Value, ctx: &FunctionContext) -> FunctionResult {
        let args: TransferCallArgs = serde_json::from_value(args).unwrap_or(TransferCallArgs { reason: None });

        let settings = match ctx.db.get_call_settings(&ctx.business.id) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("[transfer_call] Failed to load call settings: {}", e);
                return ctx.fail(Phrase::TransferUnavailable);
            }
        };

        let Some(number) = settings
            .transfer_number
            .clone()
            .or_else(|| settings.backup_transfer_number.clone())
        else {
            log::info!("[transfer_call] No transfer number configured for {}", ctx.business.id);
            return ctx.fail(Phrase::TransferUnavailable).with_data(json!({ "transferred": false }));
        };

        if settings.transfer_hours_only {
            let open = match ctx.db.get_business_hours(&ctx.business.id) {
                Ok(hours) => is_open_now(ctx, &hours),
                Err(e) => {
                    log::error!("[transfer_call] Failed to load hours: {}", e);
                    false
                }
            };
            if !open {
                log::info!("[transfer_call] Outside transfer hours for {}", ctx.business.id);
                return ctx
                    .fail(Phrase::TransferUnavailable)
                    .with_data(json!({ "transferred": false, "reason": "outside_hours" }));
            }
        }

        log::info!(
            "[transfer_call] Transferring call for {}{}",
            ctx.business.id,
            args.reason.map(|r| format!(" ({})", r)).unwrap_or_default()
        );
        ctx.mark_outcome(CallOutcome::Transferred);
        FunctionResult::success("Sure, let me connect you now. One moment please.")
            .with_data(json!({ "transferred": true }))
            .with_transfer(number)
    }
}

/// Wrap up the call
pub struct EndCallFunction {
    definition: FunctionDefinition,
}

impl EndCallFunction {
    pub fn new() -> Self {
        let definition = FunctionDefinition::new(
            "end_call",
            "End the call after saying goodbye, once the caller has nothing else they need.",
        )
        .property("reason", PropertySchema::string("Why the call is ending"));
        EndCallFunction { definition }
    }
}

#[async_trait]
impl CallFunction for EndCallFunction {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _args: Value, ctx: &FunctionContext) -> FunctionResult {
        // A call that reached a goodbye without booking or a message was informational
        if ctx.call.as_ref().is_some_and(|c| c.outcome.is_none()) {
            ctx.mark_outcome(CallOutcome::Info);
        }
        FunctionResult::success(ctx.say(Phrase::Goodbye)).ending_call()
    }
}
