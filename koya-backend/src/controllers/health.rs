use actix_web::{web, HttpResponse, Responder};

use crate::AppState;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/api/version").route(web::get().to(get_version)));
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let integrations = &state.integrations;
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
        "functions": state.registry.len(),
        "integrations": {
            "twilio": integrations.twilio.is_some(),
            "retell": integrations.retell.is_some(),
            "stripe": integrations.stripe.is_some(),
            "nylas": integrations.nylas.is_some(),
            "hubspot": integrations.hubspot.is_some(),
        }
    }))
}

async fn get_version() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "version": VERSION
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::testing::test_state;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_reports_registry_and_integrations() {
        let app = test::init_service(App::new().app_data(test_state()).configure(config)).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["functions"], 14);
        assert_eq!(body["integrations"]["twilio"], false);
    }
}
