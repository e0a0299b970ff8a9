use std::cmp::Reverse;

use super::sign::{RankedSign, SignDetail};
use super::vote::Vote;

/// Net score of a video: the sum of its vote polarities.
pub fn compute_score(votes: &[Vote]) -> i64 {
    votes.iter().map(|v| i64::from(v.polarity.value())).sum()
}

/// `0`, `+3`, `-2`.
pub fn format_score(score: i64) -> String {
    if score > 0 {
        format!("+{}", score)
    } else {
        score.to_string()
    }
}

/// Order signs best-first by the score of their video.
///
/// Equal scores keep their incoming order, so callers decide the tie-break by
/// how they load the signs (word pages load oldest first).
pub fn rank_signs(signs: Vec<SignDetail>) -> Vec<RankedSign> {
    let mut ranked: Vec<RankedSign> = signs.into_iter().map(RankedSign::new).collect();

    // sort_by_key is stable
    ranked.sort_by_key(|r| Reverse(r.score));
    ranked
}
