//! Listing relevance score.
//!
//! A fixed linear combination of four factors, each in `[0, 1]`:
//!
//! | Factor | Weight |
//! |--------|--------|
//! | Skill overlap | 0.45 |
//! | Availability | 0.30 |
//! | Rating | 0.15 |
//! | Language | 0.10 |

use chrono::{DateTime, Timelike, Utc};
use skillswap_core::types::Listing;
use std::cmp::Ordering;
use std::collections::HashSet;

const SKILL_WEIGHT: f64 = 0.45;
const AVAILABILITY_WEIGHT: f64 = 0.30;
const RATING_WEIGHT: f64 = 0.15;
const LANGUAGE_WEIGHT: f64 = 0.10;

/// First bookable hour (inclusive)
pub const FIRST_SLOT_HOUR: u32 = 9;
/// Last bookable hour (exclusive)
pub const LAST_SLOT_HOUR: u32 = 18;

/// What a learner is looking for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchRequest {
    /// Wanted skills
    pub skills: Vec<String>,
    /// Wanted start time
    pub at: Option<DateTime<Utc>>,
    /// Preferred language
    pub language: Option<String>,
}

/// Score of `listing` for `request`, in `[0, 1]`.
#[must_use]
pub fn score(request: &MatchRequest, listing: &Listing) -> f64 {
    let availability = match request.at {
        Some(at) if (FIRST_SLOT_HOUR..LAST_SLOT_HOUR).contains(&at.hour()) => 1.0,
        Some(_) => 0.0,
        None => 1.0,
    };
    let language = match (&request.language, &listing.expert.language) {
        (Some(wanted), Some(spoken)) if wanted.eq_ignore_ascii_case(spoken) => 1.0,
        (None, _) => 1.0,
        _ => 0.0,
    };
    let rating = (listing.expert.rating / 5.0).clamp(0.0, 1.0);

    SKILL_WEIGHT * skill_overlap(&request.skills, listing)
        + AVAILABILITY_WEIGHT * availability
        + RATING_WEIGHT * rating
        + LANGUAGE_WEIGHT * language
}

/// Share of requested skills the listing covers.
fn skill_overlap(wanted: &[String], listing: &Listing) -> f64 {
    let wanted: HashSet<String> = wanted
        .iter()
        .map(|skill| skill.trim().to_lowercase())
        .filter(|skill| !skill.is_empty())
        .collect();
    if wanted.is_empty() {
        return 0.0;
    }
    let offered: HashSet<String> = listing
        .expert
        .skills
        .iter()
        .chain(&listing.tags)
        .chain(std::iter::once(&listing.skill_name))
        .map(|skill| skill.trim().to_lowercase())
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let ratio = wanted.intersection(&offered).count() as f64 / wanted.len() as f64;
    ratio
}

/// Listings ordered by descending score; equal scores go cheapest first.
#[must_use]
pub fn rank_listings(request: &MatchRequest, listings: &[Listing]) -> Vec<(Listing, f64)> {
    let mut ranked: Vec<(Listing, f64)> = listings
        .iter()
        .map(|listing| (listing.clone(), score(request, listing)))
        .collect();
    ranked.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.credit_cost.cmp(&b.credit_cost))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;
    use chrono::TimeZone;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, hour, 0, 0)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn perfect_match_scores_one() {
        let listing = &seed::listings()[0];
        let request = MatchRequest {
            skills: vec!["system design".into()],
            at: Some(at_hour(10)),
            language: Some("English".into()),
        };
        assert!((score(&request, listing) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_hours_request_loses_availability() {
        let listing = &seed::listings()[0];
        let day = MatchRequest {
            skills: vec!["Go".into()],
            at: Some(at_hour(10)),
            language: None,
        };
        let night = MatchRequest {
            at: Some(at_hour(22)),
            ..day.clone()
        };
        let difference = score(&day, listing) - score(&night, listing);
        assert!((difference - AVAILABILITY_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn ranking_prefers_skill_then_cost() {
        let request = MatchRequest {
            skills: vec!["Spanish".into()],
            at: None,
            language: Some("Spanish".into()),
        };
        let ranked = rank_listings(&request, &seed::listings());
        assert_eq!(ranked[0].0.skill_name, "Conversational Spanish");
        assert!(ranked.windows(2).all(|pair| pair[0].1 >= pair[1].1));
    }
}
