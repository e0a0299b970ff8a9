use actix_web::{get, post, web};
use actix_web_validator::Json;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::{Insertable, QueryDsl, Queryable, RunQueryDsl};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::identity::Caller;
use super::parse_id;
use super::vote::{list_votes_for_videos, Vote};
use crate::response::ApiError;
use crate::schema::videos;
use crate::DBPool;

/// An uploaded sign recording. Immutable once stored; only its votes change.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct Video {
    pub id: String,
    pub url: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub votes: Vec<Vote>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = videos)]
pub struct VideoDB {
    pub id: Uuid,
    pub url: String,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

impl VideoDB {
    pub fn new(url: &str, created_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.to_string(),
            created_by: created_by.to_string(),
            created_at: Utc::now().naive_utc(),
        }
    }

    pub fn to_video(&self) -> Video {
        Video {
            id: self.id.to_string(),
            url: self.url.clone(),
            created_by: self.created_by.clone(),
            created_at: DateTime::<Utc>::from_naive_utc_and_offset(self.created_at, Utc),
            votes: vec![],
        }
    }

    pub fn to_video_with_votes(&self, votes: Vec<Vote>) -> Video {
        Video {
            votes,
            ..self.to_video()
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct VideoRequest {
    #[validate(url)]
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreatedVideo {
    pub id: String,
}

pub fn create_video(
    conn: &mut PgConnection,
    url: &str,
    created_by: &str,
) -> Result<Video, ApiError> {
    let video = diesel::insert_into(videos::table)
        .values(VideoDB::new(url, created_by))
        .get_result::<VideoDB>(conn)?;

    info!("Stored video {} from {}", video.id, created_by);
    Ok(video.to_video())
}

pub fn get_video(conn: &mut PgConnection, video_id: Uuid) -> Result<Video, ApiError> {
    let video = videos::table.find(video_id).first::<VideoDB>(conn)?;
    let votes = list_votes_for_videos(conn, &[video.id])?;

    Ok(video.to_video_with_votes(votes))
}

/// Record a video that was uploaded to storage
#[post("/videos")]
pub async fn create(
    caller: Caller,
    json: Json<VideoRequest>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<CreatedVideo>, ApiError> {
    let url = json.into_inner().url;

    let video = web::block(move || {
        let mut conn = pool.get()?;
        create_video(&mut conn, &url, &caller.user_id)
    })
    .await??;

    Ok(web::Json(CreatedVideo { id: video.id }))
}

/// Find a video by id
#[get("/videos/{video_id}")]
pub async fn get(
    path: web::Path<String>,
    pool: web::Data<DBPool>,
) -> Result<web::Json<Video>, ApiError> {
    let video_id = parse_id(&path, "video")?;

    let video = web::block(move || {
        let mut conn = pool.get()?;
        get_video(&mut conn, video_id)
    })
    .await??;

    Ok(web::Json(video))
}
