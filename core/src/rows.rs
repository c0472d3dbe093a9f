//! Store rows and their mapping onto domain values.
//!
//! Rows use the store's snake_case column names. Listing rows written by
//! older clients used camelCase keys, so those are accepted as aliases. This
//! is the only place that knows about row shapes; store implementations
//! deserialize rows and call these conversions, and the engine only ever sees
//! [`crate::types`].

use crate::stores::StoreError;
use crate::types::{
    Account, Credits, ExpertProfile, Level, ListingId, ListingRecord, Origin, Role, SessionId,
    SessionRecord, SessionStatus, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A row of the `profiles` table
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileRow {
    /// Account id
    pub id: String,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: Option<String>,
    /// Avatar URL
    pub avatar: Option<String>,
    /// `learner`, `expert` or `admin`
    pub role: Option<String>,
    /// Headline
    pub title: Option<String>,
    /// Free-form biography
    pub bio: Option<String>,
    /// Credit balance; nullable in older rows
    pub credits: Option<i64>,
    /// Skills taught
    pub skills: Vec<String>,
    /// Average rating
    pub rating: Option<f64>,
    /// Number of reviews
    pub reviews: Option<i64>,
    /// Teaching language
    pub language: Option<String>,
}

/// A row of the `listings` table
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingRow {
    /// Listing id
    pub id: String,
    /// Owning expert
    #[serde(alias = "expertId")]
    pub expert_id: String,
    /// Skill taught
    #[serde(alias = "skillName")]
    pub skill_name: String,
    /// Description
    pub description: String,
    /// Difficulty tag
    pub level: Option<String>,
    /// Hourly cost
    #[serde(alias = "creditCost")]
    pub credit_cost: i64,
    /// Search tags
    pub tags: Vec<String>,
    /// Cover image
    #[serde(alias = "imageUrl")]
    pub image_url: Option<String>,
}

/// A row of the `sessions` table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRow {
    /// Session id
    pub id: String,
    /// Booked listing
    pub listing_id: Option<String>,
    /// Hosting expert
    pub expert_id: String,
    /// Booking learner
    pub learner_id: String,
    /// Lifecycle status
    pub status: String,
    /// RFC 3339 start time
    pub scheduled_at: String,
    /// Length in minutes
    pub duration_minutes: i64,
    /// Display topic
    #[serde(default)]
    pub topic: String,
}

fn credits_from_column(column: &str, value: i64) -> Result<Credits, StoreError> {
    u64::try_from(value)
        .map(Credits::new)
        .map_err(|_| StoreError::Malformed(format!("negative {column}: {value}")))
}

/// Encode a balance or cost for a signed 64-bit credits column.
///
/// # Errors
///
/// [`StoreError::Malformed`] if `credits` does not fit the column.
pub fn credits_to_column(column: &str, credits: Credits) -> Result<i64, StoreError> {
    i64::try_from(credits.amount())
        .map_err(|_| StoreError::Malformed(format!("{column} out of range: {credits}")))
}

impl TryFrom<ProfileRow> for Account {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let role = match row.role.as_deref() {
            Some(role) => role
                .parse::<Role>()
                .map_err(|e| StoreError::Malformed(e.to_string()))?,
            None => Role::Learner,
        };
        let balance = credits_from_column("credits", row.credits.unwrap_or(0))?;
        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email: row.email,
            role,
            balance,
            origin: Origin::Persisted,
        })
    }
}

impl From<ProfileRow> for ExpertProfile {
    fn from(row: ProfileRow) -> Self {
        let id = UserId::new(row.id);
        let placeholder = Self::placeholder(&id);
        Self {
            name: if row.name.is_empty() {
                placeholder.name
            } else {
                row.name
            },
            avatar: row.avatar.unwrap_or(placeholder.avatar),
            title: row.title.unwrap_or(placeholder.title),
            rating: row.rating.unwrap_or(0.0).clamp(0.0, 5.0),
            skills: row.skills,
            language: row.language,
            id,
        }
    }
}

impl TryFrom<ListingRow> for ListingRecord {
    type Error = StoreError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let level = match row.level.as_deref() {
            Some(level) => level
                .parse::<Level>()
                .map_err(|e| StoreError::Malformed(e.to_string()))?,
            None => Level::default(),
        };
        let credit_cost = credits_from_column("credit_cost", row.credit_cost)?;
        if credit_cost.is_zero() {
            return Err(StoreError::Malformed(format!(
                "listing {} has no credit cost",
                row.id
            )));
        }
        Ok(Self {
            id: ListingId::new(row.id),
            expert_id: UserId::new(row.expert_id),
            skill_name: row.skill_name,
            description: row.description,
            level,
            credit_cost,
            tags: row.tags,
        })
    }
}

impl TryFrom<&ListingRecord> for ListingRow {
    type Error = StoreError;

    fn try_from(record: &ListingRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id.to_string(),
            expert_id: record.expert_id.to_string(),
            skill_name: record.skill_name.clone(),
            description: record.description.clone(),
            level: Some(record.level.as_str().to_string()),
            credit_cost: credits_to_column("credit_cost", record.credit_cost)?,
            tags: record.tags.clone(),
            image_url: None,
        })
    }
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SessionStatus>()
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let scheduled_at = DateTime::parse_from_rfc3339(&row.scheduled_at)
            .map_err(|e| StoreError::Malformed(format!("scheduled_at: {e}")))?
            .with_timezone(&Utc);
        let duration_minutes = u32::try_from(row.duration_minutes).map_err(|_| {
            StoreError::Malformed(format!("duration_minutes: {}", row.duration_minutes))
        })?;
        Ok(Self {
            id: SessionId::new(row.id),
            listing_id: row.listing_id.map(ListingId::new),
            expert_id: UserId::new(row.expert_id),
            learner_id: UserId::new(row.learner_id),
            status,
            scheduled_at,
            duration_minutes,
            topic: row.topic,
        })
    }
}

impl From<&SessionRecord> for SessionRow {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            listing_id: record.listing_id.as_ref().map(ToString::to_string),
            expert_id: record.expert_id.to_string(),
            learner_id: record.learner_id.to_string(),
            status: record.status.as_str().to_string(),
            scheduled_at: record.scheduled_at.to_rfc3339(),
            duration_minutes: i64::from(record.duration_minutes),
            topic: record.topic.clone(),
        }
    }
}
