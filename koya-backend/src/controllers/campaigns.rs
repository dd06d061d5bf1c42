use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{db_error, json_error, not_found, tenant};
use crate::campaigns::{dispatch_campaign, CampaignError};
use crate::integrations::IntegrationError;
use crate::models::{Campaign, CampaignContactInput, CreateCampaignRequest, UpdateCampaignStatusRequest};
use crate::phone::normalize_phone;
use crate::AppState;

const MAX_ATTEMPTS_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct AddContactsRequest {
    contacts: Vec<CampaignContactInput>,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/dashboard/campaigns")
            .route("", web::get().to(list_campaigns))
            .route("", web::post().to(create_campaign))
            .route("/{id}/status", web::patch().to(update_status))
            .route("/{id}/contacts", web::get().to(list_contacts))
            .route("/{id}/contacts", web::post().to(add_contacts))
            .route("/{id}/dispatch", web::post().to(dispatch)),
    );
}

/// Tenant's campaign, or the response to return instead
fn load_campaign(state: &AppState, req: &HttpRequest, id: i64) -> Result<Campaign, HttpResponse> {
    let business_id = tenant(state, req)?;
    match state.db.get_campaign(&business_id, id) {
        Ok(Some(campaign)) => Ok(campaign),
        Ok(None) => Err(not_found("Campaign")),
        Err(e) => Err(db_error("load campaign", e)),
    }
}

async fn list_campaigns(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let business_id = match tenant(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.db.list_campaigns(&business_id) {
        Ok(campaigns) => HttpResponse::Ok().json(json!({ "success": true, "campaigns": campaigns })),
        Err(e) => db_error("list campaigns", e),
    }
}

async fn create_campaign(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateCampaignRequest>,
) -> impl Responder {
    let business_id = match tenant(&state, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if body.name.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Campaign name cannot be empty");
    }
    if body.max_attempts.is_some_and(|m| !(1..=MAX_ATTEMPTS_LIMIT).contains(&m)) {
        return json_error(
            StatusCode::BAD_REQUEST,
            format!("max_attempts must be between 1 and {}", MAX_ATTEMPTS_LIMIT),
        );
    }

    match state.db.create_campaign(&business_id, &body) {
        Ok(campaign) => HttpResponse::Created().json(json!({ "success": true, "campaign": campaign })),
        Err(e) => db_error("create campaign", e),
    }
}

async fn update_status(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateCampaignStatusRequest>,
) -> impl Responder {
    let campaign = match load_campaign(&state, &req, path.into_inner()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if !campaign.status.can_transition_to(body.status) {
        return json_error(
            StatusCode::CONFLICT,
            format!("Cannot move a {} campaign to {}", campaign.status, body.status),
        );
    }

    match state.db.set_campaign_status(&campaign.business_id, campaign.id, body.status) {
        Ok(Some(updated)) => {
            log::info!("[campaigns] Campaign {} {} -> {}", campaign.id, campaign.status, updated.status);
            HttpResponse::Ok().json(json!({ "success": true, "campaign": updated }))
        }
        Ok(None) => not_found("Campaign"),
        Err(e) => db_error("update campaign status", e),
    }
}

async fn list_contacts(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let campaign = match load_campaign(&state, &req, path.into_inner()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.db.list_campaign_contacts(&campaign.business_id, campaign.id) {
        Ok(contacts) => HttpResponse::Ok().json(json!({ "success": true, "contacts": contacts })),
        Err(e) => db_error("list campaign contacts", e),
    }
}

async fn add_contacts(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<AddContactsRequest>,
) -> impl Responder {
    let campaign = match load_campaign(&state, &req, path.into_inner()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if campaign.status.is_terminal() {
        return json_error(StatusCode::CONFLICT, format!("Campaign is {}", campaign.status));
    }

    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for contact in &body.contacts {
        match normalize_phone(&contact.phone_number) {
            Some(phone) => valid.push((phone, contact.name.clone().filter(|n| !n.trim().is_empty()))),
            None => invalid.push(contact.phone_number.clone()),
        }
    }

    match state.db.add_campaign_contacts(&campaign.business_id, campaign.id, &valid) {
        Ok(added) => HttpResponse::Ok().json(json!({
            "success": true,
            "added": added,
            "duplicates": valid.len() - added,
            "invalid": invalid,
        })),
        Err(e) => db_error("add campaign contacts", e),
    }
}

async fn dispatch(state: web::Data<AppState>, req: HttpRequest, path: web::Path<i64>) -> impl Responder {
    let campaign = match load_campaign(&state, &req, path.into_inner()) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match dispatch_campaign(&state.db, &state.integrations, &campaign, Utc::now()).await {
        Ok(summary) => HttpResponse::Ok().json(json!({ "success": true, "summary": summary })),
        Err(CampaignError::NotRunning(status)) => {
            json_error(StatusCode::CONFLICT, format!("Campaign is {}, not running", status))
        }
        Err(CampaignError::NoCallerId(_)) => {
            json_error(StatusCode::BAD_REQUEST, "Set the business phone number before dialing")
        }
        Err(CampaignError::Integration(IntegrationError::NotConfigured(service))) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{} is not configured", service),
        ),
        Err(CampaignError::Database(e)) => db_error("dispatch campaign", e),
        Err(e) => {
            log::error!("[campaigns] Dispatch failed: {}", e);
            json_error(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
