//! Call functions: actions the voice agent asks the backend to perform mid-call.
//!
//! Each function is a `CallFunction` registered by name. The Retell controller
//! resolves the tenant, builds a `FunctionContext` and dispatches through the
//! registry; whatever happens, the caller hears a sentence back.

pub mod builtin;
pub mod registry;
pub mod types;

pub use registry::{CallFunction, FunctionRegistry};
pub use types::{FunctionContext, FunctionDefinition, FunctionInputSchema, FunctionResult, PropertySchema};

use std::sync::Arc;

fn register_all_functions(registry: &mut FunctionRegistry) {
    // Scheduling
    registry.register(Arc::new(builtin::FindNextAvailableFunction::new()));
    registry.register(Arc::new(builtin::CheckAvailabilityFunction::new()));
    registry.register(Arc::new(builtin::BookAppointmentFunction::new()));
    registry.register(Arc::new(builtin::CancelAppointmentFunction::new()));

    // Call control and messaging
    registry.register(Arc::new(builtin::TransferCallFunction::new()));
    registry.register(Arc::new(builtin::EndCallFunction::new()));
    registry.register(Arc::new(builtin::TakeMessageFunction::new()));
    registry.register(Arc::new(builtin::SendSmsFunction::new()));
    registry.register(Arc::new(builtin::SendEmailFunction::new()));

    // Commerce
    registry.register(Arc::new(builtin::CheckInventoryFunction::new()));
    registry.register(Arc::new(builtin::CheckOrderStatusFunction::new()));
    registry.register(Arc::new(builtin::CreateLeadFunction::new()));
    registry.register(Arc::new(builtin::CheckReservationAvailabilityFunction::new()));
    registry.register(Arc::new(builtin::ProcessPaymentFunction::new()));
}

pub fn create_default_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    register_all_functions(&mut registry);
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    use super::FunctionContext;
    use crate::db::Database;
    use crate::integrations::Integrations;
    use crate::models::{CallDirection, CreateBusinessRequest, NewCall};

    pub const BUSINESS_PHONE: &str = "+15550100000";
    pub const OWNER_PHONE: &str = "+15550109999";
    pub const CALLER_PHONE: &str = "+15551234567";

    /// A New York business with default hours (Mon-Fri 9-5) and a live inbound call
    pub fn test_context(now: DateTime<Utc>) -> FunctionContext {
        test_context_with(now, Integrations::disabled())
    }

    pub fn test_context_with(now: DateTime<Utc>, integrations: Integrations) -> FunctionContext {
        let db = Arc::new(Database::new(":memory:").unwrap());
        let business = db
            .create_business(&CreateBusinessRequest {
                name: "Bright Smile Dental".to_string(),
                phone_number: Some(BUSINESS_PHONE.to_string()),
                owner_phone: Some(OWNER_PHONE.to_string()),
                owner_email: Some("owner@brightsmile.test".to_string()),
                timezone: Some("America/New_York".to_string()),
            })
            .unwrap();
        let ai_config = db.get_ai_config(&business.id).unwrap().unwrap();
        let call = db
            .create_call(&NewCall {
                business_id: business.id.clone(),
                retell_call_id: Some("call_test".to_string()),
                twilio_call_sid: None,
                direction: CallDirection::Inbound,
                from_number: Some(CALLER_PHONE.to_string()),
                to_number: Some(BUSINESS_PHONE.to_string()),
            })
            .unwrap();

        FunctionContext {
            db,
            integrations: Arc::new(integrations),
            business,
            ai_config,
            call: Some(call),
            caller_number: Some(CALLER_PHONE.to_string()),
            now,
        }
    }

    /// Re-read the call row to see what functions recorded on it
    pub fn reload_call(ctx: &FunctionContext) -> crate::models::Call {
        let call = ctx.call.as_ref().unwrap();
        ctx.db.get_call(&ctx.business.id, call.id).unwrap().unwrap()
    }
}
