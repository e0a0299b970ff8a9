pub mod health;
pub mod identity;
pub mod score;
pub mod sign;
pub mod video;
pub mod vote;
pub mod word;

use actix_web::web;
use ammonia::clean;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use uuid::Uuid;

use crate::response::ApiError;

#[derive(Debug, Deserialize)]
pub struct OptionsQuery {
    #[serde(default)]
    pub word: String,
}

/// Register the `/api/v1` routes. Fixed paths go before `{id}` paths.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(identity::register)
        .service(identity::me)
        .service(word::list)
        .service(word::options)
        .service(word::create)
        .service(word::get)
        .service(word::add_image)
        .service(sign::list)
        .service(sign::options)
        .service(sign::create)
        .service(sign::get)
        .service(video::create)
        .service(video::get)
        .service(vote::cast)
        .service(vote::list);
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::from_str(raw.trim())
        .map_err(|_| ApiError::InvalidArgument(format!("invalid {} id: {}", what, raw)))
}

/// `LIKE` pattern matching values that start with `prefix`.
pub(crate) fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn cleanup_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(|s| clean(s.trim())))
}
