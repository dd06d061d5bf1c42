pub mod admin;
pub mod api_keys;
pub mod auth;
pub mod campaigns;
pub mod dashboard;
pub mod health;
pub mod retell;
pub mod twilio;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use serde::Serialize;

use crate::middleware::tenant_auth;
use crate::AppState;

#[derive(Serialize)]
pub struct ErrorResponse {
    success: bool,
    error: String,
}

pub fn json_error(status: StatusCode, error: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        success: false,
        error: error.into(),
    })
}

/// Log a database failure and answer 500
pub fn db_error(context: &str, e: rusqlite::Error) -> HttpResponse {
    log::error!("[db] {}: {}", context, e);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

pub fn not_found(what: &str) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, format!("{} not found", what))
}

/// Business id behind the request's bearer token
pub fn tenant(state: &AppState, req: &HttpRequest) -> Result<String, HttpResponse> {
    tenant_auth::authenticate(&state.db, req)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use actix_web::web;
    use chrono::{Duration, Utc};

    use crate::config::Config;
    use crate::db::Database;
    use crate::functions::create_default_registry;
    use crate::integrations::Integrations;
    use crate::models::{Business, CreateBusinessRequest};
    use crate::AppState;

    pub const TEST_BUSINESS_PHONE: &str = "+15550200000";

    pub fn test_state() -> web::Data<AppState> {
        test_state_with(Config::for_tests(), Integrations::disabled())
    }

    pub fn test_state_with(config: Config, integrations: Integrations) -> web::Data<AppState> {
        web::Data::new(AppState {
            db: Arc::new(Database::new(":memory:").unwrap()),
            config,
            registry: Arc::new(create_default_registry()),
            integrations: Arc::new(integrations),
        })
    }

    /// A business in New York plus a live session token for it
    pub fn seed_business(state: &AppState) -> (Business, String) {
        let business = state
            .db
            .create_business(&CreateBusinessRequest {
                name: "Harbor Salon".to_string(),
                phone_number: Some(TEST_BUSINESS_PHONE.to_string()),
                owner_phone: Some("+15550209999".to_string()),
                owner_email: None,
                timezone: Some("America/New_York".to_string()),
            })
            .unwrap();
        let token = format!("sess_{}", business.id);
        state
            .db
            .create_session(&token, &business.id, Utc::now() + Duration::hours(1))
            .unwrap();
        (business, token)
    }

    pub fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token))
    }
}
