use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;

use super::{db_error, json_error, not_found, tenant};
use crate::controllers::auth::issue_api_key;
use crate::models::{ApiKeyResponse, CreateApiKeyRequest};
use crate::AppState;

#[derive(Serialize)]
pub struct ApiKeysListResponse {
    pub success: bool,
    pub keys: Vec<ApiKeyResponse>,
}

#[derive(Serialize)]
pub struct ApiKeyCreatedResponse {
    pub success: bool,
    pub key: ApiKeyResponse,
    /// Plaintext key, shown only in this response
    pub api_key: String,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/dashboard/api-keys")
            .route("", web::get().to(list_api_keys))
            .route("", web::post().to(create_api_key))
            .route("/{id}", web::delete().to(revoke_api_key)),
    );
}

async fn list_api_keys(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let business_id = match tenant(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.db.list_api_keys(&business_id) {
        Ok(keys) => HttpResponse::Ok().json(ApiKeysListResponse {
            success: true,
            keys: keys.iter().map(|k| k.to_response()).collect(),
        }),
        Err(e) => db_error("list api keys", e),
    }
}

async fn create_api_key(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateApiKeyRequest>,
) -> impl Responder {
    let business_id = match tenant(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let name = body.name.trim();
    if name.is_empty() {
        return json_error(actix_web::http::StatusCode::BAD_REQUEST, "Key name cannot be empty");
    }

    match issue_api_key(&state.db, &business_id, name) {
        Ok((key, plaintext)) => {
            log::info!("[api_keys] Issued key {} for {}", key.key_prefix, business_id);
            HttpResponse::Created().json(ApiKeyCreatedResponse {
                success: true,
                key: key.to_response(),
                api_key: plaintext,
            })
        }
        Err(e) => db_error("create api key", e),
    }
}

async fn revoke_api_key(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let business_id = match tenant(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.db.revoke_api_key(&business_id, path.into_inner()) {
        Ok(true) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Ok(false) => not_found("API key"),
        Err(e) => db_error("revoke api key", e),
    }
}
