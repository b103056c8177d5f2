use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use splitledger::config::{Config, StoreKind};
use splitledger::payment::SimulatedRail;
use splitledger::routes::{configure, AppState};
use splitledger::session::SessionRegistry;
use splitledger::store::{LedgerStore, MemoryStore, MongoStore};
use splitledger::telemetry;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init();

    let config = Config::from_env().map_err(|err| {
        error!(error = %err, "invalid configuration");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
    })?;

    let store: Arc<dyn LedgerStore> = match (&config.store, &config.mongodb_uri) {
        (StoreKind::Mongo, Some(uri)) => {
            info!("Using the following URI: {}", uri);
            let store = MongoStore::connect(uri, &config.database)
                .await
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
            store
                .ensure_indexes()
                .await
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
            Arc::new(store)
        }
        _ => {
            info!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = web::Data::new(AppState {
        store,
        rail: Arc::new(SimulatedRail::new(config.settlement_delay)),
        sessions: SessionRegistry::default(),
        session_secret: config.session_secret.clone(),
        transaction_fee: config.transaction_fee,
    });

    info!(addr = %config.bind_addr, "listening");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(config.bind_addr)?
    .run()
    .await
}
