use actix_web::{get, post, web};
use actix_web_validator::Json;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::{
    Connection, ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable,
    RunQueryDsl, TextExpressionMethods,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use super::identity::{require_known_user, Caller};
use super::score::{compute_score, format_score};
use super::video::{Video, VideoDB};
use super::vote::{list_votes_for_videos, Polarity, Vote, VoteDB};
use super::word::{list_images_for_words, Word, WordDB, WordImage};
use super::{cleanup_string, like_prefix, parse_id, OptionsQuery};
use crate::response::{ApiError, ListResp};
use crate::schema::{signs, videos, votes, words};
use crate::DBPool;

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct Sign {
    pub id: String,
    pub word_id: String,
    pub video_id: String,
    pub sign_description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = signs)]
pub struct SignDB {
    pub id: Uuid,
    pub word_id: Uuid,
    pub video_id: Uuid,
    pub sign_description: String,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl SignDB {
    pub fn to_sign(&self) -> Sign {
        Sign {
            id: self.id.to_string(),
            word_id: self.word_id.to_string(),
            video_id: self.video_id.to_string(),
            sign_description: self.sign_description.clone(),
            created_by: self.created_by.clone(),
            created_at: DateTime::<Utc>::from_naive_utc_and_offset(self.created_at, Utc),
        }
    }
}

/// A sign with its word (for listings). The full listing also carries the word's images.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct SignWithWord {
    #[serde(flatten)]
    pub sign: Sign,
    pub word: Word,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<WordImage>>,
}

/// A sign with its resolved video and that video's votes.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct SignDetail {
    #[serde(flatten)]
    pub sign: Sign,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<Word>,
    pub video: Video,
}

/// A sign paired with its score, ready for display.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct RankedSign {
    #[serde(flatten)]
    pub detail: SignDetail,
    pub score: i64,
    pub score_display: String,
}

impl RankedSign {
    pub fn new(detail: SignDetail) -> Self {
        let score = compute_score(&detail.video.votes);
        Self {
            detail,
            score,
            score_display: format_score(score),
        }
    }
}

pub type Signs = ListResp<SignWithWord>;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SignRequest {
    #[validate(required)]
    pub word_id: Option<String>,
    #[serde(default, deserialize_with = "cleanup_string")]
    pub sign_description: Option<String>,
    #[validate(required, url)]
    pub video_url: Option<String>,
}

/// Attach each video's votes, keeping the order of `rows`.
pub fn with_votes(
    conn: &mut PgConnection,
    rows: Vec<(SignDB, VideoDB)>,
) -> Result<Vec<SignDetail>, ApiError> {
    let video_ids: Vec<Uuid> = rows.iter().map(|(_, video)| video.id).collect();

    let mut votes_by_video: HashMap<String, Vec<Vote>> = HashMap::new();
    for vote in list_votes_for_videos(conn, &video_ids)? {
        votes_by_video
            .entry(vote.video_id.clone())
            .or_insert_with(Vec::new)
            .push(vote);
    }

    Ok(rows
        .into_iter()
        .map(|(sign, video)| {
            let votes = votes_by_video
                .remove(&video.id.to_string())
                .unwrap_or_default();
            SignDetail {
                sign: sign.to_sign(),
                word: None,
                video: video.to_video_with_votes(votes),
            }
        })
        .collect())
}

/// Signs of one word, oldest first, with videos and votes.
pub fn list_word_signs(
    conn: &mut PgConnection,
    word_id: Uuid,
) -> Result<Vec<SignDetail>, ApiError> {
    let rows = signs::table
        .inner_join(videos::table)
        .filter(signs::word_id.eq(word_id))
        .order((signs::created_at.asc(), signs::id.asc()))
        .load::<(SignDB, VideoDB)>(conn)?;

    with_votes(conn, rows)
}

/// Every sign, oldest first, with videos and votes.
pub fn list_all_signs(conn: &mut PgConnection) -> Result<Vec<SignDetail>, ApiError> {
    let rows = signs::table
        .inner_join(videos::table)
        .order((signs::created_at.asc(), signs::id.asc()))
        .load::<(SignDB, VideoDB)>(conn)?;

    with_votes(conn, rows)
}

fn list_signs(conn: &mut PgConnection) -> Result<Vec<SignWithWord>, ApiError> {
    let rows = signs::table
        .inner_join(words::table)
        .order((words::word.asc(), signs::created_at.asc()))
        .load::<(SignDB, WordDB)>(conn)?;

    let word_ids: Vec<Uuid> = rows.iter().map(|(_, word)| word.id).collect();
    let mut images_by_word: HashMap<Uuid, Vec<WordImage>> = HashMap::new();
    for image in list_images_for_words(conn, &word_ids)? {
        images_by_word
            .entry(image.word_id)
            .or_insert_with(Vec::new)
            .push(image.to_word_image());
    }

    Ok(rows
        .into_iter()
        .map(|(sign, word)| SignWithWord {
            sign: sign.to_sign(),
            images: Some(images_by_word.get(&word.id).cloned().unwrap_or_default()),
            word: word.to_word(),
        })
        .collect())
}

fn list_sign_options(
    conn: &mut PgConnection,
    prefix: &str,
) -> Result<Vec<SignWithWord>, ApiError> {
    let rows = signs::table
        .inner_join(words::table)
        .filter(words::word.like(like_prefix(prefix)))
        .order((words::word.asc(), signs::created_at.asc()))
        .load::<(SignDB, WordDB)>(conn)?;

    Ok(rows
        .into_iter()
        .map(|(sign, word)| SignWithWord {
            sign: sign.to_sign(),
            word: word.to_word(),
            images: None,
        })
        .collect())
}

pub fn get_sign(conn: &mut PgConnection, sign_id: Uuid) -> Result<RankedSign, ApiError> {
    let row = signs::table
        .inner_join(videos::table)
        .filter(signs::id.eq(sign_id))
        .first::<(SignDB, VideoDB)>(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Sign not found"))?;
    let word = words::table.find(row.0.word_id).first::<WordDB>(conn)?;

    let mut detail = with_votes(conn, vec![row])?
        .pop()
        .ok_or_else(|| ApiError::internal("sign disappeared while loading votes"))?;
    detail.word = Some(word.to_word());

    Ok(RankedSign::new(detail))
}

/// Store the video, the sign, and the contributor's own upvote together.
pub fn create_sign(
    conn: &mut PgConnection,
    user_id: &str,
    word_id: Uuid,
    sign_description: &str,
    video_url: &str,
) -> Result<SignDetail, ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        require_known_user(conn, user_id)?;

        let word = words::table
            .find(word_id)
            .first::<WordDB>(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Word not found"))?;

        let video = diesel::insert_into(videos::table)
            .values(VideoDB::new(video_url, user_id))
            .get_result::<VideoDB>(conn)?;

        let sign = diesel::insert_into(signs::table)
            .values(SignDB {
                id: Uuid::new_v4(),
                word_id,
                video_id: video.id,
                sign_description: sign_description.to_string(),
                created_by: user_id.to_string(),
                created_at: Utc::now().naive_utc(),
            })
            .get_result::<SignDB>(conn)?;

        let vote = diesel::insert_into(votes::table)
            .values(VoteDB::new(video.id, user_id, Polarity::Up))
            .get_result::<VoteDB>(conn)?;

        info!("Created sign {} for word {} by {}", sign.id, word.word, user_id);

        Ok(SignDetail {
            sign: sign.to_sign(),
            word: Some(word.to_word()),
            video: video.to_video_with_votes(vec![vote.to_vote()?]),
        })
    })
}

/// List all signs with their words
#[get("/signs")]
pub async fn list(pool: web::Data<DBPool>) -> Result<web::Json<Signs>, ApiError> {
    let signs = web::block(move || {
        let mut conn = pool.get()?;
        list_signs(&mut conn)
    })
    .await??;

    Ok(web::Json(Signs::from(&signs)))
}

/// Signs whose word starts with `?word=`
#[get("/signs/options")]
pub async fn options(
    query: web::Query<OptionsQuery>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<Signs>, ApiError> {
    let prefix = query.into_inner().word;

    let signs = web::block(move || {
        let mut conn = pool.get()?;
        list_sign_options(&mut conn, &prefix)
    })
    .await??;

    Ok(web::Json(Signs::from(&signs)))
}

/// Find a sign by id, with its word, video and score
#[get("/signs/{sign_id}")]
pub async fn get(
    path: web::Path<String>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<RankedSign>, ApiError> {
    let sign_id = parse_id(&path, "sign")?;

    let sign = web::block(move || {
        let mut conn = pool.get()?;
        get_sign(&mut conn, sign_id)
    })
    .await??;

    Ok(web::Json(sign))
}

/// Contribute a new sign for a word
#[post("/signs")]
pub async fn create(
    caller: Caller,
    json: Json<SignRequest>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<SignDetail>, ApiError> {
    let request = json.into_inner();
    let word_id = parse_id(request.word_id.as_deref().unwrap_or_default(), "word")?;
    let description = request.sign_description.unwrap_or_default();
    let video_url = request.video_url.unwrap_or_default();

    let sign = web::block(move || {
        let mut conn = pool.get()?;
        create_sign(&mut conn, &caller.user_id, word_id, &description, &video_url)
    })
    .await??;

    Ok(web::Json(sign))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{unconnected_pool, TestContext};
    use crate::v1::identity::register_user;
    use crate::v1::vote::{cast_vote, VoteOutcome};
    use crate::v1::word::{add_word_image, create_word};
    use actix_web::http::StatusCode;
    use actix_web::test::{call_and_read_body_json, call_service, init_service, TestRequest};
    use actix_web::App;

    fn sign_request(word_id: &str) -> SignRequest {
        SignRequest {
            word_id: Some(word_id.to_string()),
            sign_description: Some("flat hand taps the chin".to_string()),
            video_url: Some("https://cdn.test/thanks.webm".to_string()),
        }
    }

    #[actix_rt::test]
    async fn test_create_sign_requires_identity() {
        let pool = web::Data::new(unconnected_pool());
        let app = init_service(App::new().app_data(pool).service(create)).await;

        let req = TestRequest::post()
            .uri("/signs")
            .set_json(&sign_request(&Uuid::new_v4().to_string()))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_create_sign_without_video_is_bad_request() {
        let pool = web::Data::new(unconnected_pool());
        let app = init_service(App::new().app_data(pool).service(create)).await;

        let mut body = sign_request(&Uuid::new_v4().to_string());
        body.video_url = None;

        let req = TestRequest::post()
            .uri("/signs")
            .insert_header((crate::AUTHENTICATED_USER_HEADER, "user_1"))
            .set_json(&body)
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_get_sign_invalid_id() {
        let pool = web::Data::new(unconnected_pool());
        let app = init_service(App::new().app_data(pool).service(get)).await;

        let req = TestRequest::get().uri("/signs/abc1234").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    // A new sign arrives with the contributor's own upvote, so a repeat upvote retracts it.
    #[test]
    #[ignore = "needs a postgres server at TEST_DATABASE_URL"]
    fn test_create_sign_carries_creator_vote() {
        let ctx = TestContext::new("test_create_sign_carries_creator_vote");
        let pool = ctx.get_pool();
        let mut conn = pool.get().expect("could not get db connection from pool");

        register_user(&mut conn, "user_1", None).unwrap();
        let word = create_word(&mut conn, "thanks", "thangks", "gratitude", "user_1").unwrap();
        let word_id = Uuid::parse_str(&word.id).unwrap();

        let sign = create_sign(
            &mut conn,
            "user_1",
            word_id,
            "flat hand from chin",
            "https://cdn.test/thanks.webm",
        )
        .unwrap();
        assert_eq!(sign.video.votes.len(), 1);
        assert_eq!(sign.video.votes[0].polarity, Polarity::Up);

        let video_id = Uuid::parse_str(&sign.video.id).unwrap();
        let cast = cast_vote(&mut conn, "user_1", video_id, Polarity::Up).unwrap();
        assert_eq!(cast.outcome, VoteOutcome::Deleted);

        let sign_id = Uuid::parse_str(&sign.sign.id).unwrap();
        let ranked = get_sign(&mut conn, sign_id).unwrap();
        assert_eq!(ranked.score, 0);
        assert_eq!(ranked.detail.word.unwrap().word, "thanks");
    }

    #[test]
    #[ignore = "needs a postgres server at TEST_DATABASE_URL"]
    fn test_create_sign_for_missing_word() {
        let ctx = TestContext::new("test_create_sign_for_missing_word");
        let pool = ctx.get_pool();
        let mut conn = pool.get().expect("could not get db connection from pool");

        register_user(&mut conn, "user_1", None).unwrap();
        let err = create_sign(
            &mut conn,
            "user_1",
            Uuid::new_v4(),
            "",
            "https://cdn.test/x.webm",
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[actix_rt::test]
    #[ignore = "needs a postgres server at TEST_DATABASE_URL"]
    async fn test_sign_options_by_word_prefix() {
        let ctx = TestContext::new("test_sign_options_by_word_prefix");
        let pool = web::Data::new(ctx.get_pool());
        let mut conn = pool.get().expect("could not get db connection from pool");

        register_user(&mut conn, "user_1", None).unwrap();
        for term in ["hello", "help", "water"] {
            let word = create_word(&mut conn, term, term, term, "user_1").unwrap();
            if term == "hello" {
                let word_id = Uuid::parse_str(&word.id).unwrap();
                add_word_image(&mut conn, word_id, "https://cdn.test/hello.png", "user_1")
                    .unwrap();
            }
            create_sign(
                &mut conn,
                "user_1",
                Uuid::parse_str(&word.id).unwrap(),
                "",
                "https://cdn.test/x.webm",
            )
            .unwrap();
        }

        let app = init_service(
            App::new()
                .app_data(pool)
                .service(list)
                .service(options)
                .service(get),
        )
        .await;

        let req = TestRequest::get()
            .uri("/signs/options?word=hel")
            .to_request();
        let resp: Signs = call_and_read_body_json(&app, req).await;
        assert_eq!(resp.count, 2);
        assert_eq!(resp.results[0].word.word, "hello");
        assert!(resp.results[0].images.is_none());

        let req = TestRequest::get().uri("/signs").to_request();
        let resp: Signs = call_and_read_body_json(&app, req).await;
        assert_eq!(resp.count, 3);
        let images: Vec<usize> = resp
            .results
            .iter()
            .map(|s| s.images.as_ref().map_or(0, Vec::len))
            .collect();
        assert_eq!(images, vec![1, 0, 0]);
    }
}
