use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;

mod campaigns;
mod config;
mod controllers;
mod db;
mod functions;
mod integrations;
mod middleware;
mod models;
mod personality;
mod phone;
mod scheduling;

use config::Config;
use db::Database;
use functions::FunctionRegistry;
use integrations::Integrations;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub registry: Arc<FunctionRegistry>,
    pub integrations: Arc<Integrations>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).map_err(|e| {
        log::error!("Failed to initialize database: {}", e);
        std::io::Error::other(e)
    })?;
    let db = Arc::new(db);

    log::info!("Initializing function registry");
    let registry = Arc::new(functions::create_default_registry());
    log::info!("Registered {} call functions", registry.len());

    let integrations = Arc::new(Integrations::from_config(&config));
    if config.retell.allow_unsigned_webhooks {
        log::warn!("ALLOW_UNSIGNED_WEBHOOKS is set: Retell signatures are not checked");
    }

    // Outbound campaign dispatcher; the sender stays alive for the life of the server
    let (_dispatcher_shutdown_tx, dispatcher_shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(campaigns::run_dispatcher(
        db.clone(),
        integrations.clone(),
        Duration::from_secs(config.campaign_dispatch_secs),
        dispatcher_shutdown_rx,
    ));
    log::info!(
        "Campaign dispatcher started (every {}s)",
        config.campaign_dispatch_secs
    );

    log::info!("Starting Koya backend on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                registry: Arc::clone(&registry),
                integrations: Arc::clone(&integrations),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::auth::config)
            .configure(controllers::api_keys::config)
            .configure(controllers::dashboard::config)
            .configure(controllers::campaigns::config)
            .configure(controllers::admin::config)
            .configure(controllers::retell::config)
            .configure(controllers::twilio::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
