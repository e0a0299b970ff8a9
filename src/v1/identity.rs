use actix_web::dev::Payload;
use actix_web::{get, put, web, FromRequest, HttpRequest};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::{ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable, RunQueryDsl};
use log::info;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use validator::Validate;

use crate::response::ApiError;
use crate::schema::users;
use crate::DBPool;

/// The authenticated user behind a request, as vouched for by the identity provider.
///
/// Handlers that take a `Caller` reject anonymous requests with `401`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

impl Caller {
    pub fn from_request_headers(req: &HttpRequest) -> Result<Self, ApiError> {
        req.headers()
            .get(crate::AUTHENTICATED_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|user_id| Caller {
                user_id: user_id.to_string(),
            })
            .ok_or_else(|| ApiError::unauthorized("missing authenticated user"))
    }
}

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Caller::from_request_headers(req))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = users)]
pub struct UserDB {
    pub id: String,
    pub display_name: Option<String>,
    pub created_at: NaiveDateTime,
}

impl UserDB {
    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            created_at: DateTime::<Utc>::from_naive_utc_and_offset(self.created_at, Utc),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255))]
    pub display_name: Option<String>,
}

/// Mirror the caller into `users` so votes can reference them.
pub fn register_user(
    conn: &mut PgConnection,
    user_id: &str,
    display_name: Option<String>,
) -> Result<User, ApiError> {
    let row = UserDB {
        id: user_id.to_string(),
        display_name: display_name.clone(),
        created_at: Utc::now().naive_utc(),
    };

    // Re-registering without a name keeps the stored one.
    match display_name {
        Some(name) => diesel::insert_into(users::table)
            .values(&row)
            .on_conflict(users::id)
            .do_update()
            .set(users::display_name.eq(name))
            .execute(conn)?,
        None => diesel::insert_into(users::table)
            .values(&row)
            .on_conflict_do_nothing()
            .execute(conn)?,
    };

    let user = users::table.find(user_id).first::<UserDB>(conn)?;

    info!("Registered user {}", user.id);
    Ok(user.to_user())
}

pub fn find_user(conn: &mut PgConnection, user_id: &str) -> Result<Option<User>, ApiError> {
    let user = users::table
        .find(user_id)
        .first::<UserDB>(conn)
        .optional()?;

    Ok(user.map(|u| u.to_user()))
}

/// Fails with `Unauthorized` when the caller has no user row.
pub fn require_known_user(conn: &mut PgConnection, user_id: &str) -> Result<(), ApiError> {
    let known = users::table
        .find(user_id)
        .select(users::id)
        .first::<String>(conn)
        .optional()?;

    match known {
        Some(_) => Ok(()),
        None => Err(ApiError::unauthorized("unknown user")),
    }
}

/// Register (or rename) the authenticated caller. `{}` keeps the stored name.
#[put("/me")]
pub async fn register(
    caller: Caller,
    json: actix_web_validator::Json<RegisterRequest>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<User>, ApiError> {
    let name = json.into_inner().display_name;

    let user = web::block(move || {
        let mut conn = pool.get()?;
        register_user(&mut conn, &caller.user_id, name)
    })
    .await??;

    Ok(web::Json(user))
}

/// The authenticated caller's user row
#[get("/me")]
pub async fn me(caller: Caller, pool: web::Data<DBPool>) -> Result<web::Json<User>, ApiError> {
    let user = web::block(move || {
        let mut conn = pool.get()?;
        find_user(&mut conn, &caller.user_id)
    })
    .await??;

    user.map(web::Json)
        .ok_or_else(|| ApiError::not_found("User not registered"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{unconnected_pool, TestContext};
    use actix_web::{http::StatusCode, test, App};

    #[actix_rt::test]
    async fn test_caller_from_header() {
        let req = test::TestRequest::default()
            .insert_header((crate::AUTHENTICATED_USER_HEADER, " user_2abc "))
            .to_http_request();

        let caller = Caller::from_request_headers(&req).unwrap();
        assert_eq!(caller.user_id, "user_2abc");
    }

    #[actix_rt::test]
    async fn test_caller_missing_header_is_unauthorized() {
        let req = test::TestRequest::default().to_http_request();

        let err = Caller::from_request_headers(&req).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[actix_rt::test]
    async fn test_caller_blank_header_is_unauthorized() {
        let req = test::TestRequest::default()
            .insert_header((crate::AUTHENTICATED_USER_HEADER, "   "))
            .to_http_request();

        assert!(Caller::from_request_headers(&req).is_err());
    }

    #[actix_rt::test]
    async fn test_me_without_identity_is_unauthorized() {
        let pool = web::Data::new(unconnected_pool());
        let app = test::init_service(App::new().app_data(pool).service(me)).await;

        let req = test::TestRequest::get().uri("/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_register_rejects_invalid_display_name() {
        let pool = web::Data::new(unconnected_pool());
        let app = test::init_service(App::new().app_data(pool).service(register)).await;

        for name in ["".to_string(), "x".repeat(300)] {
            let req = test::TestRequest::put()
                .uri("/me")
                .insert_header((crate::AUTHENTICATED_USER_HEADER, "user_1"))
                .set_json(&RegisterRequest {
                    display_name: Some(name),
                })
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_rt::test]
    async fn test_register_without_body_is_bad_request() {
        let pool = web::Data::new(unconnected_pool());
        let app = test::init_service(App::new().app_data(pool).service(register)).await;

        let req = test::TestRequest::put()
            .uri("/me")
            .insert_header((crate::AUTHENTICATED_USER_HEADER, "user_1"))
            .insert_header(("content-type", "application/json"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    // Registering again renames; registering without a name keeps the last one.
    #[actix_rt::test]
    #[ignore = "needs a postgres server at TEST_DATABASE_URL"]
    async fn test_register_then_me() {
        let ctx = TestContext::new("test_register_then_me");
        let pool = web::Data::new(ctx.get_pool());

        let app = test::init_service(App::new().app_data(pool).service(register).service(me))
            .await;

        for name in ["first", "second"] {
            let req = test::TestRequest::put()
                .uri("/me")
                .insert_header((crate::AUTHENTICATED_USER_HEADER, "user_1"))
                .set_json(&RegisterRequest {
                    display_name: Some(name.to_string()),
                })
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
        }

        let req = test::TestRequest::put()
            .uri("/me")
            .insert_header((crate::AUTHENTICATED_USER_HEADER, "user_1"))
            .set_json(&RegisterRequest::default())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((crate::AUTHENTICATED_USER_HEADER, "user_1"))
            .to_request();
        let user: User = test::call_and_read_body_json(&app, req).await;
        assert_eq!(user.id, "user_1");
        assert_eq!(user.display_name.as_deref(), Some("second"));
    }
}
