extern crate actix_web_validator;
extern crate diesel_migrations;
extern crate dotenv;

pub mod config;
pub mod response;
pub mod schema;
pub mod v1;

#[cfg(test)]
pub mod test_utils;

pub use diesel::pg::PgConnection;
pub use diesel::r2d2::{ConnectionManager, Pool};

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub type DBPool = Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

/// The dictionary runs behind a reverse proxy that talks to the identity provider.
/// The proxy forwards the authenticated user's id to us in this header.
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user-id";
