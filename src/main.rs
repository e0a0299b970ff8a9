use actix_cors::Cors;
use actix_web::{get, middleware, web, App, HttpResponse, HttpServer, Responder};
use anyhow::{anyhow, Context};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::MigrationHarness;
use log::info;

use asl_dictionary::config::{Config, DEFAULT_LOG_FILTER};
use asl_dictionary::{response, v1, MIGRATIONS};

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("ASL dictionary")
}

#[get("/ping")]
pub async fn ping() -> impl Responder {
    HttpResponse::Ok().body("pong")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG may come from .env
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .init();

    let config = Config::from_env()?;
    let listen = config.listen_addr();

    // set up database connection pool
    info!("Connecting to database");
    let manager = ConnectionManager::<PgConnection>::new(config.database_url.as_str());
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .build(manager)
        .context("Failed to create connection pool")?;

    // Migration schema
    let mut conn = pool.get().context("could not get db connection from pool")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;
    info!("Applied {} pending migration(s)", applied.len());
    drop(conn);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_header()
            .allow_any_origin()
            .allow_any_method();

        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::JsonConfig::default().error_handler(response::json_error_handler))
            .wrap(middleware::Compress::default())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .service(index)
            .service(ping)
            .service(v1::health::health_check)
            .service(v1::health::readiness_check)
            .service(v1::health::liveness_check)
            .service(web::scope("/api/v1").configure(v1::configure))
    })
    .bind(&listen)?
    .run();

    info!("Server running at http://{}", listen);

    server.await?;
    Ok(())
}
