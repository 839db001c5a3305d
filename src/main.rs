use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use splitflow::api::{configure, AppState};
use splitflow::auth::HmacVerifier;
use splitflow::settings::{Settings, Store};
use splitflow::store::{LedgerStore, MemoryStore, MongoStore};
use splitflow::Ledger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::new().map_err(std::io::Error::other)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("splitflow={}", settings.log.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store: Arc<dyn LedgerStore> = match &settings.store {
        Store::Memory => {
            tracing::warn!("using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        Store::Mongo { uri, database } => Arc::new(
            MongoStore::connect(uri, database)
                .await
                .map_err(std::io::Error::other)?,
        ),
    };

    let state = web::Data::new(AppState {
        ledger: Ledger::new(store),
        verifier: Arc::new(HmacVerifier::new(&settings.auth.secret)),
    });
    let allowed_origin = settings.cors.allowed_origin.clone();

    tracing::info!(bind = %settings.server.bind, port = settings.server.port, "starting server");
    HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header(),
            None => Cors::permissive(),
        };
        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((settings.server.bind.as_str(), settings.server.port))?
    .run()
    .await
}
