use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono_tz::Tz;
use serde_json::json;

use super::{db_error, json_error};
use crate::controllers::auth::issue_api_key;
use crate::middleware::tenant_auth::require_admin;
use crate::models::CreateBusinessRequest;
use crate::phone::normalize_phone;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin/businesses")
            .route("", web::get().to(list_businesses))
            .route("", web::post().to(create_business)),
    );
}

async fn list_businesses(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    if let Err(resp) = require_admin(state.config.admin_token.as_deref(), &req) {
        return resp;
    }
    match state.db.list_businesses() {
        Ok(businesses) => HttpResponse::Ok().json(json!({ "success": true, "businesses": businesses })),
        Err(e) => db_error("list businesses", e),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Onboard a tenant: the business row with its defaults, plus a first API key
async fn create_business(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateBusinessRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(state.config.admin_token.as_deref(), &req) {
        return resp;
    }

    let mut request = body.into_inner();
    request.name = request.name.trim().to_string();
    if request.name.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Business name cannot be empty");
    }
    for (field, value) in [("phone_number", &mut request.phone_number), ("owner_phone", &mut request.owner_phone)] {
        if let Some(raw) = value.as_deref() {
            match normalize_phone(raw) {
                Some(phone) => *value = Some(phone),
                None => return json_error(StatusCode::BAD_REQUEST, format!("Invalid {}", field)),
            }
        }
    }
    if let Some(tz) = request.timezone.as_deref() {
        if tz.parse::<Tz>().is_err() {
            return json_error(StatusCode::BAD_REQUEST, format!("Unknown timezone '{}'", tz));
        }
    }

    let business = match state.db.create_business(&request) {
        Ok(business) => business,
        Err(e) if is_unique_violation(&e) => {
            return json_error(StatusCode::CONFLICT, "That phone number already belongs to a business");
        }
        Err(e) => return db_error("create business", e),
    };

    match issue_api_key(&state.db, &business.id, "default") {
        Ok((key, plaintext)) => {
            log::info!("[admin] Created business {} ({})", business.id, business.name);
            HttpResponse::Created().json(json!({
                "success": true,
                "business": business,
                "api_key": plaintext,
                "key": key.to_response(),
            }))
        }
        Err(e) => db_error("issue initial api key", e),
    }
}
