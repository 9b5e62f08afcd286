use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;
use std::sync::Arc;

use attendance_engine::config::Config;
use attendance_engine::db::init_db;
use attendance_engine::docs::ApiDoc;
use attendance_engine::engine::memory::{MemoryDirectory, MemoryStore};
use attendance_engine::engine::mysql::MySqlStore;
use attendance_engine::engine::AttendanceEngine;
use attendance_engine::routes;

use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance Presence Engine"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let engine = match &config.database_url {
        Some(url) => {
            let pool = init_db(url).await;
            let store = Arc::new(MySqlStore::new(pool));
            AttendanceEngine::new(store.clone(), store)
        }
        None => {
            warn!("DATABASE_URL not set, running on the in-memory store");
            AttendanceEngine::new(Arc::new(MemoryStore::new()), Arc::new(MemoryDirectory::new()))
        }
    };
    let engine = Data::new(engine);

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(engine.clone())
            .app_data(Data::new(config.clone()))
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
