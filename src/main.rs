use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use loyalty_engine::{
    addresses::AddressService,
    config::Config,
    database::Database,
    handlers,
    ledger::LedgerStore,
    loyalty::LoyaltyService,
    notify::NotificationClient,
    settings::SettingsStore,
    users::UserService,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    info!("Starting Loyalty Engine on port {}", config.server.port);

    let db = Arc::new(
        Database::new(&config.database.url, config.database.max_connections)
            .await
            .expect("Failed to connect to database"),
    );

    let pool = Arc::new(db.pool().clone());

    let ledger = Arc::new(LedgerStore::new(pool.clone()));
    let settings = Arc::new(SettingsStore::new(pool.clone()));
    let notifier = Arc::new(NotificationClient::new(
        config.notification.base_url.clone(),
        config.notification.timeout_secs,
        config.notification.sender_name.clone(),
    ));

    let loyalty_service = Arc::new(LoyaltyService::new(
        ledger,
        settings,
        config.loyalty.points_to_real_ratio_default,
        config.loyalty.points_expiry_days,
    ));

    let user_service = Arc::new(UserService::new(
        pool.clone(),
        notifier,
        config.auth.jwt_secret.clone(),
        config.auth.token_expiry_hours,
        config.auth.reset_token_ttl_hours,
        config.notification.reset_link_base.clone(),
    ));

    let address_service = Arc::new(AddressService::new(pool));

    let jwt_secret = config.auth.jwt_secret.clone();

    HttpServer::new(move || {
        let cors = Cors::permissive();
        let jwt_secret = jwt_secret.clone();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(loyalty_service.clone()))
            .app_data(web::Data::new(user_service.clone()))
            .app_data(web::Data::new(address_service.clone()))
            .configure(move |cfg| handlers::configure_routes(cfg, &jwt_secret))
    })
    .bind(("0.0.0.0", config.server.port))?
    .run()
    .await
}
