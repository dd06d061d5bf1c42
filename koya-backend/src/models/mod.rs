pub mod api_key;
pub mod appointment;
pub mod business;
pub mod call;
pub mod campaign;
pub mod commerce;
pub mod integration;
pub mod message;

pub use api_key::{ApiKey, ApiKeyResponse, AuthSession, CreateApiKeyRequest, API_KEY_PREFIX};
pub use appointment::{
    Appointment, AppointmentStatus, CreateAppointmentRequest, NewAppointment,
    UpdateAppointmentStatusRequest,
};
pub use business::{
    AiConfig, Business, BusinessHours, CallSettings, CreateBusinessRequest, Service,
    UpdateAiConfigRequest, UpdateBusinessRequest,
};
pub use call::{Call, CallDirection, CallOutcome, NewCall};
pub use campaign::{
    Campaign, CampaignContact, CampaignContactInput, CampaignStatus, ContactStatus,
    CreateCampaignRequest, UpdateCampaignStatusRequest,
};
pub use commerce::{InventoryItem, Lead, NewLead, Order, Reservation, ReservationSettings};
pub use integration::{
    CalendarIntegration, CalendarProviderKind, CrmIntegration, CrmProviderKind, OAuthTokens,
    PaymentAccount,
};
pub use message::{DncEntry, Message, NewMessage, Urgency};
