use actix_web::{get, post, web};
use actix_web_validator::Json;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::{
    ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable, RunQueryDsl,
    TextExpressionMethods,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use super::identity::Caller;
use super::score::rank_signs;
use super::sign::{list_all_signs, list_word_signs, RankedSign, SignDetail};
use super::{cleanup_string, like_prefix, parse_id, OptionsQuery};
use crate::response::{ApiError, ListResp};
use crate::schema::{word_images, words};
use crate::DBPool;

pub type Words = ListResp<Word>;
pub type WordListing = ListResp<WordWithSigns>;

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct Word {
    pub id: String,
    pub word: String,
    pub pronunciation: String,
    pub definition: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = words)]
pub struct WordDB {
    pub id: Uuid,
    pub word: String,
    pub pronunciation: String,
    pub definition: String,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl WordDB {
    pub fn to_word(&self) -> Word {
        Word {
            id: self.id.to_string(),
            word: self.word.clone(),
            pronunciation: self.pronunciation.clone(),
            definition: self.definition.clone(),
            created_by: self.created_by.clone(),
            created_at: DateTime::<Utc>::from_naive_utc_and_offset(self.created_at, Utc),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct WordImage {
    pub id: String,
    pub url: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = word_images)]
pub struct WordImageDB {
    pub id: Uuid,
    pub word_id: Uuid,
    pub url: String,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl WordImageDB {
    pub fn to_word_image(&self) -> WordImage {
        WordImage {
            id: self.id.to_string(),
            url: self.url.clone(),
            created_by: self.created_by.clone(),
            created_at: DateTime::<Utc>::from_naive_utc_and_offset(self.created_at, Utc),
        }
    }
}

/// Everything a word page shows: the entry, its images, and its signs best-first.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct WordPage {
    #[serde(flatten)]
    pub word: Word,
    pub images: Vec<WordImage>,
    pub signs: Vec<RankedSign>,
}

/// A word with its signs and their videos, oldest sign first.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct WordWithSigns {
    #[serde(flatten)]
    pub word: Word,
    pub signs: Vec<SignDetail>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct WordRequest {
    #[validate(required, length(min = 1, max = 255))]
    #[serde(default, deserialize_with = "cleanup_string")]
    pub word: Option<String>,
    #[validate(required, length(min = 1, max = 255))]
    #[serde(default, deserialize_with = "cleanup_string")]
    pub pronunciation: Option<String>,
    #[validate(required, length(min = 1))]
    #[serde(default, deserialize_with = "cleanup_string")]
    pub definition: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ImageRequest {
    #[validate(url)]
    pub url: String,
}

fn list_words(conn: &mut PgConnection) -> Result<Vec<WordWithSigns>, ApiError> {
    conn.build_transaction()
        .read_only()
        .repeatable_read()
        .run::<_, ApiError, _>(|conn| {
            let rows = words::table.order(words::word.asc()).load::<WordDB>(conn)?;

            let mut signs_by_word: HashMap<String, Vec<SignDetail>> = HashMap::new();
            for detail in list_all_signs(conn)? {
                signs_by_word
                    .entry(detail.sign.word_id.clone())
                    .or_insert_with(Vec::new)
                    .push(detail);
            }

            Ok(rows
                .iter()
                .map(|w| WordWithSigns {
                    word: w.to_word(),
                    signs: signs_by_word
                        .remove(&w.id.to_string())
                        .unwrap_or_default(),
                })
                .collect())
        })
}

fn list_word_options(conn: &mut PgConnection, prefix: &str) -> Result<Vec<Word>, ApiError> {
    let rows = words::table
        .filter(words::word.like(like_prefix(prefix)))
        .order(words::word.asc())
        .load::<WordDB>(conn)?;

    Ok(rows.iter().map(|w| w.to_word()).collect())
}

pub fn create_word(
    conn: &mut PgConnection,
    word: &str,
    pronunciation: &str,
    definition: &str,
    created_by: &str,
) -> Result<Word, ApiError> {
    let created = diesel::insert_into(words::table)
        .values(WordDB {
            id: Uuid::new_v4(),
            word: word.to_string(),
            pronunciation: pronunciation.to_string(),
            definition: definition.to_string(),
            created_by: created_by.to_string(),
            created_at: Utc::now().naive_utc(),
        })
        .get_result::<WordDB>(conn)?;

    info!("Created word {} ({}) by {}", created.word, created.id, created_by);
    Ok(created.to_word())
}

pub fn list_images_for_words(
    conn: &mut PgConnection,
    word_ids: &[Uuid],
) -> Result<Vec<WordImageDB>, ApiError> {
    let images = word_images::table
        .filter(word_images::word_id.eq_any(word_ids.to_vec()))
        .order(word_images::created_at.asc())
        .load::<WordImageDB>(conn)?;

    Ok(images)
}

/// Load a word page from one consistent snapshot.
pub fn get_word_page(conn: &mut PgConnection, word_id: Uuid) -> Result<WordPage, ApiError> {
    conn.build_transaction()
        .read_only()
        .repeatable_read()
        .run::<_, ApiError, _>(|conn| {
            let word = words::table
                .find(word_id)
                .first::<WordDB>(conn)
                .optional()?
                .ok_or_else(|| ApiError::not_found("Word not found"))?;

            let images = word_images::table
                .filter(word_images::word_id.eq(word_id))
                .order(word_images::created_at.asc())
                .load::<WordImageDB>(conn)?;

            let signs = list_word_signs(conn, word_id)?;

            Ok(WordPage {
                word: word.to_word(),
                images: images.iter().map(|i| i.to_word_image()).collect(),
                signs: rank_signs(signs),
            })
        })
}

pub fn add_word_image(
    conn: &mut PgConnection,
    word_id: Uuid,
    url: &str,
    created_by: &str,
) -> Result<WordImage, ApiError> {
    let image = diesel::insert_into(word_images::table)
        .values(WordImageDB {
            id: Uuid::new_v4(),
            word_id,
            url: url.to_string(),
            created_by: created_by.to_string(),
            created_at: Utc::now().naive_utc(),
        })
        .get_result::<WordImageDB>(conn)?;

    info!("Added image {} to word {}", image.id, word_id);
    Ok(image.to_word_image())
}

/// List all words with their signs and videos
#[get("/words")]
pub async fn list(pool: web::Data<DBPool>) -> Result<web::Json<WordListing>, ApiError> {
    let words = web::block(move || {
        let mut conn = pool.get()?;
        list_words(&mut conn)
    })
    .await??;

    Ok(web::Json(WordListing::from(&words)))
}

/// Words starting with `?word=`
#[get("/words/options")]
pub async fn options(
    query: web::Query<OptionsQuery>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<Words>, ApiError> {
    let prefix = query.into_inner().word;

    let words = web::block(move || {
        let mut conn = pool.get()?;
        list_word_options(&mut conn, &prefix)
    })
    .await??;

    Ok(web::Json(Words::from(&words)))
}

/// Create a new word
#[post("/words")]
pub async fn create(
    caller: Caller,
    json: Json<WordRequest>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<Word>, ApiError> {
    let request = json.into_inner();
    let word = request.word.unwrap_or_default();
    let pronunciation = request.pronunciation.unwrap_or_default();
    let definition = request.definition.unwrap_or_default();

    let created = web::block(move || {
        let mut conn = pool.get()?;
        create_word(&mut conn, &word, &pronunciation, &definition, &caller.user_id)
    })
    .await??;

    Ok(web::Json(created))
}

/// A word with its images and its signs ranked by score
#[get("/words/{word_id}")]
pub async fn get(
    path: web::Path<String>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<WordPage>, ApiError> {
    let word_id = parse_id(&path, "word")?;

    let page = web::block(move || {
        let mut conn = pool.get()?;
        get_word_page(&mut conn, word_id)
    })
    .await??;

    Ok(web::Json(page))
}

/// Attach an uploaded image to a word
#[post("/words/{word_id}/images")]
pub async fn add_image(
    caller: Caller,
    path: web::Path<String>,
    json: Json<ImageRequest>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<WordImage>, ApiError> {
    let word_id = parse_id(&path, "word")?;
    let url = json.into_inner().url;

    let image = web::block(move || {
        let mut conn = pool.get()?;
        add_word_image(&mut conn, word_id, &url, &caller.user_id)
    })
    .await??;

    Ok(web::Json(image))
}
