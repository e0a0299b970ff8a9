use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::DBPool;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatabaseStatus {
    Healthy,
    Unhealthy,
    Unavailable,
}

impl DatabaseStatus {
    fn as_str(self) -> &'static str {
        match self {
            DatabaseStatus::Healthy => "healthy",
            DatabaseStatus::Unhealthy => "unhealthy",
            DatabaseStatus::Unavailable => "unavailable",
        }
    }
}

fn probe_database(pool: &DBPool) -> DatabaseStatus {
    match pool.get() {
        Ok(mut conn) => match diesel::sql_query("SELECT 1").execute(&mut conn) {
            Ok(_) => DatabaseStatus::Healthy,
            Err(_) => DatabaseStatus::Unhealthy,
        },
        Err(_) => DatabaseStatus::Unavailable,
    }
}

async fn probe(pool: web::Data<DBPool>) -> DatabaseStatus {
    web::block(move || probe_database(&pool))
        .await
        .unwrap_or(DatabaseStatus::Unavailable)
}

/// Health check for monitoring and load balancers.
/// 200 when the vote store answers, 503 otherwise.
#[get("/health")]
pub async fn health_check(pool: web::Data<DBPool>) -> impl Responder {
    let db_status = probe(pool).await;

    let response = HealthResponse {
        status: if db_status == DatabaseStatus::Healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: Utc::now().to_rfc3339(),
        database: db_status.as_str().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if db_status == DatabaseStatus::Healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

/// Readiness check - 200 when the service can accept traffic
#[get("/ready")]
pub async fn readiness_check(pool: web::Data<DBPool>) -> impl Responder {
    match probe(pool).await {
        DatabaseStatus::Healthy => HttpResponse::Ok().json(serde_json::json!({
            "status": "ready",
            "timestamp": Utc::now().to_rfc3339()
        })),
        other => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "not ready",
            "reason": format!("database {}", other.as_str())
        })),
    }
}

/// Liveness check - 200 as long as the process is running
#[get("/live")]
pub async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "alive",
        "timestamp": Utc::now().to_rfc3339()
    }))
}
