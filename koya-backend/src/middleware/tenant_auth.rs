// Tenant authentication for dashboard routes.
// A bearer token is either a dashboard session token or a `koya_` API key;
// both resolve to exactly one business id, which scopes every query after it.

use actix_web::{HttpRequest, HttpResponse};
use sha2::{Digest, Sha256};

use crate::db::Database;
use crate::models::API_KEY_PREFIX;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub fn extract_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Hex SHA-256 of an API key; only this is stored
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn unauthorized(error: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "success": false,
        "error": error
    }))
}

/// Business id for a bearer token, or None if the token is unknown, expired or revoked
pub fn business_for_token(db: &Database, token: &str) -> rusqlite::Result<Option<String>> {
    if token.starts_with(API_KEY_PREFIX) {
        return Ok(db.find_active_api_key(&hash_api_key(token))?.map(|k| k.business_id));
    }
    Ok(db.validate_session(token)?.map(|s| s.business_id))
}

/// Resolve the request's business, or the error response to send back
pub fn authenticate(db: &Database, req: &HttpRequest) -> Result<String, HttpResponse> {
    let token = extract_token(req).ok_or_else(|| unauthorized("No authorization token provided"))?;

    match business_for_token(db, &token) {
        Ok(Some(business_id)) => Ok(business_id),
        Ok(None) => Err(unauthorized("Invalid or expired credentials")),
        Err(e) => {
            log::error!("[auth] Token validation error: {}", e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "error": "Internal server error"
            })))
        }
    }
}

/// Check the operator token on admin routes
pub fn require_admin(admin_token: Option<&str>, req: &HttpRequest) -> Result<(), HttpResponse> {
    let Some(expected) = admin_token else {
        return Err(HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "success": false,
            "error": "Admin access not configured. Set ADMIN_TOKEN."
        })));
    };
    let given = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    if Sha256::digest(given.as_bytes()) == Sha256::digest(expected.as_bytes()) && !given.is_empty() {
        Ok(())
    } else {
        Err(unauthorized("Invalid admin token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateBusinessRequest;
    use actix_web::test::TestRequest;
    use chrono::{Duration, Utc};

    fn setup() -> (Database, String) {
        let db = Database::new(":memory:").unwrap();
        let business = db
            .create_business(&CreateBusinessRequest {
                name: "Auth Test".to_string(),
                phone_number: None,
                owner_phone: None,
                owner_email: None,
                timezone: None,
            })
            .unwrap();
        (db, business.id)
    }

    #[test]
    fn test_api_key_and_session_resolve_business() {
        let (db, business_id) = setup();
        let key = "koya_abcdefghijklmnopqrstuvwxyz012345";
        db.insert_api_key(&business_id, "default", &key[..12], &hash_api_key(key)).unwrap();
        db.create_session("sess_token", &business_id, Utc::now() + Duration::hours(1)).unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", key)))
            .to_http_request();
        assert_eq!(authenticate(&db, &req).unwrap(), business_id);

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer sess_token"))
            .to_http_request();
        assert_eq!(authenticate(&db, &req).unwrap(), business_id);
    }

    #[test]
    fn test_rejects_missing_unknown_and_revoked() {
        let (db, business_id) = setup();
        let req = TestRequest::default().to_http_request();
        assert_eq!(authenticate(&db, &req).unwrap_err().status(), 401);

        let key = "koya_revokedkey000000000000000000000";
        let stored = db.insert_api_key(&business_id, "old", &key[..12], &hash_api_key(key)).unwrap();
        db.revoke_api_key(&business_id, stored.id).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", key)))
            .to_http_request();
        assert_eq!(authenticate(&db, &req).unwrap_err().status(), 401);
    }

    #[test]
    fn test_require_admin() {
        let req = TestRequest::default()
            .insert_header((ADMIN_TOKEN_HEADER, "admin-secret"))
            .to_http_request();
        assert!(require_admin(Some("admin-secret"), &req).is_ok());
        assert_eq!(require_admin(Some("other"), &req).unwrap_err().status(), 401);
        assert_eq!(require_admin(None, &req).unwrap_err().status(), 503);

        let empty = TestRequest::default().to_http_request();
        assert_eq!(require_admin(Some("admin-secret"), &empty).unwrap_err().status(), 401);
    }
}
