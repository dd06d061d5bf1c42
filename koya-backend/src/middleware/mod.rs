pub mod tenant_auth;
