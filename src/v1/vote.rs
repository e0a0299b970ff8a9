use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::{
    Connection, ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable,
    RunQueryDsl,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use uuid::Uuid;

use super::identity::{require_known_user, Caller};
use super::parse_id;
use super::score::{compute_score, format_score};
use crate::response::ApiError;
use crate::schema::{videos, votes};
use crate::DBPool;

/// One user's opinion of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Polarity {
    Down,
    Up,
}

impl Polarity {
    pub fn value(self) -> i32 {
        match self {
            Polarity::Down => -1,
            Polarity::Up => 1,
        }
    }
}

impl TryFrom<i32> for Polarity {
    type Error = ApiError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Polarity::Down),
            1 => Ok(Polarity::Up),
            other => Err(ApiError::InvalidArgument(format!(
                "polarity must be -1 or 1, got {}",
                other
            ))),
        }
    }
}

impl Polarity {
    /// Read a polarity from a request body. Anything but the integers -1 and 1 is rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ApiError> {
        match value.as_i64() {
            Some(-1) => Ok(Polarity::Down),
            Some(1) => Ok(Polarity::Up),
            _ => Err(ApiError::InvalidArgument(format!(
                "polarity must be -1 or 1, got {}",
                value
            ))),
        }
    }
}

impl From<Polarity> for i32 {
    fn from(polarity: Polarity) -> Self {
        polarity.value()
    }
}

/// What a vote-cast did to the caller's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    Created,
    Updated,
    Deleted,
}

/// Toggle protocol: no vote creates, the same vote retracts, the opposite vote flips.
pub fn toggle(existing: Option<Polarity>, requested: Polarity) -> VoteOutcome {
    match existing {
        None => VoteOutcome::Created,
        Some(current) if current == requested => VoteOutcome::Deleted,
        Some(_) => VoteOutcome::Updated,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct Vote {
    pub id: String,
    pub video_id: String,
    pub user_id: String,
    pub polarity: Polarity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = votes)]
pub struct VoteDB {
    pub id: Uuid,
    pub video_id: Uuid,
    pub user_id: String,
    pub value: i32,
    pub created_at: NaiveDateTime,
}

impl VoteDB {
    pub fn new(video_id: Uuid, user_id: &str, polarity: Polarity) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_id,
            user_id: user_id.to_string(),
            value: polarity.value(),
            created_at: Utc::now().naive_utc(),
        }
    }

    pub fn polarity(&self) -> Result<Polarity, ApiError> {
        Polarity::try_from(self.value)
    }

    pub fn to_vote(&self) -> Result<Vote, ApiError> {
        Ok(Vote {
            id: self.id.to_string(),
            video_id: self.video_id.to_string(),
            user_id: self.user_id.clone(),
            polarity: self.polarity()?,
            created_at: DateTime::<Utc>::from_naive_utc_and_offset(self.created_at, Utc),
        })
    }
}

/// Result of one vote-cast. `polarity` is the caller's standing vote afterwards.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct CastVote {
    pub vote_row_id: String,
    pub outcome: VoteOutcome,
    pub polarity: Option<Polarity>,
}

/// Apply the toggle protocol for `(video, user)` inside one transaction.
///
/// The caller's existing row is locked while we decide. Two first votes racing
/// on the same pair both see no row; the loser trips the unique index on
/// `(video_id, user_id)` and gets `Conflict`.
pub fn cast_vote(
    conn: &mut PgConnection,
    user_id: &str,
    video_id: Uuid,
    polarity: Polarity,
) -> Result<CastVote, ApiError> {
    conn.transaction::<_, ApiError, _>(|conn| {
        require_known_user(conn, user_id)?;

        videos::table
            .find(video_id)
            .select(videos::id)
            .for_share()
            .first::<Uuid>(conn)
            .optional()?
            .ok_or_else(|| ApiError::not_found("Video not found"))?;

        let existing = votes::table
            .filter(votes::video_id.eq(video_id))
            .filter(votes::user_id.eq(user_id))
            .for_update()
            .first::<VoteDB>(conn)
            .optional()?;

        let current = existing.as_ref().map(|v| v.polarity()).transpose()?;
        let outcome = toggle(current, polarity);

        let vote_row_id = match (outcome, existing) {
            (VoteOutcome::Created, _) => {
                let row = VoteDB::new(video_id, user_id, polarity);
                diesel::insert_into(votes::table)
                    .values(&row)
                    .execute(conn)?;
                row.id
            }
            (VoteOutcome::Updated, Some(row)) => {
                diesel::update(votes::table.find(row.id))
                    .set(votes::value.eq(polarity.value()))
                    .execute(conn)?;
                row.id
            }
            (VoteOutcome::Deleted, Some(row)) => {
                diesel::delete(votes::table.find(row.id)).execute(conn)?;
                row.id
            }
            (_, None) => return Err(ApiError::internal("vote row vanished under lock")),
        };

        info!(
            "Vote {} on video {} by {}: {:?}",
            vote_row_id, video_id, user_id, outcome
        );

        Ok(CastVote {
            vote_row_id: vote_row_id.to_string(),
            outcome,
            polarity: match outcome {
                VoteOutcome::Deleted => None,
                _ => Some(polarity),
            },
        })
    })
}

pub fn list_votes_for_videos(
    conn: &mut PgConnection,
    video_ids: &[Uuid],
) -> Result<Vec<Vote>, ApiError> {
    votes::table
        .filter(votes::video_id.eq_any(video_ids.to_vec()))
        .order(votes::created_at.asc())
        .load::<VoteDB>(conn)?
        .into_iter()
        .map(|v| v.to_vote())
        .collect()
}

pub fn list_video_votes(conn: &mut PgConnection, video_id: Uuid) -> Result<Vec<Vote>, ApiError> {
    videos::table
        .find(video_id)
        .select(videos::id)
        .first::<Uuid>(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    list_votes_for_videos(conn, &[video_id])
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub polarity: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct VoterPolarity {
    pub user_id: String,
    pub polarity: Polarity,
}

#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct VideoVotes {
    pub video_id: String,
    pub results: Vec<VoterPolarity>,
    pub count: i32,
    pub score: i64,
    pub score_display: String,
}

impl VideoVotes {
    pub fn from(video_id: Uuid, votes: &[Vote]) -> Self {
        let score = compute_score(votes);
        Self {
            video_id: video_id.to_string(),
            results: votes
                .iter()
                .map(|v| VoterPolarity {
                    user_id: v.user_id.clone(),
                    polarity: v.polarity,
                })
                .collect(),
            count: votes.len() as i32,
            score,
            score_display: format_score(score),
        }
    }
}

/// Cast, flip or retract the caller's vote on a video
#[post("/videos/{video_id}/votes")]
pub async fn cast(
    caller: Caller,
    path: web::Path<String>,
    web::Json(body): web::Json<VoteRequest>,
    pool: web::Data<DBPool>,
) -> Result<HttpResponse, ApiError> {
    let video_id = parse_id(&path, "video")?;
    let polarity = Polarity::from_json(&body.polarity)?;
    debug!(
        "Casting {:?} on video {} for {}",
        polarity, video_id, caller.user_id
    );

    let user_id = caller.user_id.clone();
    let result = web::block(move || {
        let mut conn = pool.get()?;
        cast_vote(&mut conn, &user_id, video_id, polarity)
    })
    .await?;

    match result {
        Ok(cast) => Ok(HttpResponse::Ok().json(cast)),
        Err(e) => {
            if e.is_retryable() {
                warn!(
                    "Concurrent vote on video {} by {} lost the race: {}",
                    video_id, caller.user_id, e
                );
            }
            Err(e)
        }
    }
}

/// List the votes on a video with its score
#[get("/videos/{video_id}/votes")]
pub async fn list(
    path: web::Path<String>,
    pool: web::Data<DBPool>,
) -> Result<HttpResponse, ApiError> {
    let video_id = parse_id(&path, "video")?;

    let votes = web::block(move || {
        let mut conn = pool.get()?;
        list_video_votes(&mut conn, video_id)
    })
    .await??;

    Ok(HttpResponse::Ok().json(VideoVotes::from(video_id, &votes)))
}
