//! Domain types for the SkillSwap marketplace.
//!
//! Accounts hold integer credit balances, experts publish listings, and
//! learners book listings into sessions that move through a forward-only
//! lifecycle. Every account, listing and session carries an [`Origin`] tag
//! resolved once when it is loaded, so the engine never has to guess whether
//! a record has a backing store row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $local_prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an identifier issued by a store
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates an identifier for a record that only lives in the client cache
            #[must_use]
            pub fn local() -> Self {
                Self(format!("{}-{}", $local_prefix, Uuid::new_v4()))
            }

            /// Returns the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Unique identifier of a user account
    UserId,
    "user"
);
string_id!(
    /// Unique identifier of a skill listing
    ListingId,
    "listing"
);
string_id!(
    /// Unique identifier of a booked session
    SessionId,
    "session"
);

/// Whole credits, the marketplace's only currency.
///
/// Credits are never fractional and never negative; arithmetic that would
/// leave the range is reported instead of wrapping.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(u64);

impl Credits {
    /// Zero credits
    pub const ZERO: Self = Self(0);

    /// Creates an amount of credits
    #[must_use]
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// Returns the raw amount
    #[must_use]
    pub const fn amount(self) -> u64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtracts `other`, `None` if the result would be negative
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(rest) => Some(Self(rest)),
            None => None,
        }
    }

    /// Subtracts `other`, clamping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} credits", self.0)
    }
}

/// Where a record came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Backed by a store row; mutations must go through the stores
    #[default]
    Persisted,
    /// Seeded or demo data with no store row; mutations stay in the cache
    Synthetic,
}

impl Origin {
    /// Returns true for records without a backing store row
    #[must_use]
    pub const fn is_synthetic(self) -> bool {
        matches!(self, Self::Synthetic)
    }
}

/// Error returned when a stored enum value is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownValue {
    /// What was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

/// Role of an account on the marketplace
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Books sessions
    #[default]
    Learner,
    /// Publishes listings and hosts sessions
    Expert,
    /// Operates the marketplace
    Admin,
}

impl Role {
    /// Store representation of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Learner => "learner",
            Self::Expert => "expert",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "learner" => Ok(Self::Learner),
            "expert" => Ok(Self::Expert),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownValue {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// A user account with its credit balance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Email used to address transfers
    pub email: Option<String>,
    /// Marketplace role
    pub role: Role,
    /// Last known credit balance
    pub balance: Credits,
    /// Persisted account or local demo account
    pub origin: Origin,
}

/// Fields for creating a profile at first sign-in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    /// Identifier issued by the authentication provider
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: Option<String>,
    /// Initial role
    pub role: Role,
    /// Starting balance
    pub balance: Credits,
}

/// Public identity of an expert, as shown next to listings and sessions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpertProfile {
    /// Expert's account id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Avatar URL
    pub avatar: String,
    /// Headline
    pub title: String,
    /// Average rating between 0 and 5
    pub rating: f64,
    /// Skills the expert teaches
    pub skills: Vec<String>,
    /// Teaching language, when known
    pub language: Option<String>,
}

impl ExpertProfile {
    /// Placeholder identity for an expert whose profile could not be found
    #[must_use]
    pub fn placeholder(id: &UserId) -> Self {
        Self {
            id: id.clone(),
            name: "Unknown Expert".to_string(),
            avatar: format!("https://api.dicebear.com/7.x/avataaars/svg?seed={id}"),
            title: "Expert".to_string(),
            rating: 0.0,
            skills: Vec::new(),
            language: None,
        }
    }
}

/// Difficulty tag of a listing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    /// No prior knowledge needed
    #[default]
    Beginner,
    /// Some prior practice
    Intermediate,
    /// Solid working knowledge
    Advanced,
    /// Masterclass
    Expert,
}

impl Level {
    /// Store representation of the level
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
            Self::Expert => "Expert",
        }
    }
}

impl FromStr for Level {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Beginner" => Ok(Self::Beginner),
            "Intermediate" => Ok(Self::Intermediate),
            "Advanced" => Ok(Self::Advanced),
            "Expert" => Ok(Self::Expert),
            other => Err(UnknownValue {
                kind: "level",
                value: other.to_string(),
            }),
        }
    }
}

/// A listing as stored, before the expert identity is joined in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingRecord {
    /// Listing identifier
    pub id: ListingId,
    /// Owning expert
    pub expert_id: UserId,
    /// Skill being taught
    pub skill_name: String,
    /// Free-form description
    pub description: String,
    /// Difficulty tag
    pub level: Level,
    /// Cost of one hour, in credits
    pub credit_cost: Credits,
    /// Search tags
    pub tags: Vec<String>,
}

/// Fields for publishing a new listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewListing {
    /// Owning expert
    pub expert_id: UserId,
    /// Skill being taught
    pub skill_name: String,
    /// Free-form description
    pub description: String,
    /// Difficulty tag
    pub level: Level,
    /// Cost of one hour, in credits
    pub credit_cost: Credits,
    /// Search tags
    pub tags: Vec<String>,
}

/// A bookable skill listing with its expert identity joined in
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Listing identifier
    pub id: ListingId,
    /// Owning expert
    pub expert_id: UserId,
    /// Owning expert's public identity
    pub expert: ExpertProfile,
    /// Skill being taught
    pub skill_name: String,
    /// Free-form description
    pub description: String,
    /// Difficulty tag
    pub level: Level,
    /// Cost of one hour, in credits
    pub credit_cost: Credits,
    /// Search tags
    pub tags: Vec<String>,
    /// Catalog row or seeded listing
    pub origin: Origin,
}

impl Listing {
    /// Joins a stored listing with its expert identity
    #[must_use]
    pub fn from_record(record: ListingRecord, expert: ExpertProfile, origin: Origin) -> Self {
        Self {
            id: record.id,
            expert_id: record.expert_id,
            expert,
            skill_name: record.skill_name,
            description: record.description,
            level: record.level,
            credit_cost: record.credit_cost,
            tags: record.tags,
            origin,
        }
    }
}

/// Lifecycle status of a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Booked, not started
    #[default]
    Scheduled,
    /// Call in progress
    Live,
    /// Call ended
    Completed,
    /// Withdrawn before starting
    Cancelled,
}

impl SessionStatus {
    /// Store representation of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Statuses only move forward: scheduled → live → completed, and
    /// scheduled → cancelled.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Live | Self::Cancelled) | (Self::Live, Self::Completed)
        )
    }

    /// Completed and cancelled sessions never change again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(Self::Scheduled),
            "live" => Ok(Self::Live),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownValue {
                kind: "session status",
                value: other.to_string(),
            }),
        }
    }
}

/// Fields for inserting a session row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSession {
    /// Booked listing, absent for synthesized sessions
    pub listing_id: Option<ListingId>,
    /// Hosting expert
    pub expert_id: UserId,
    /// Booking learner
    pub learner_id: UserId,
    /// Initial status
    pub status: SessionStatus,
    /// Start time
    pub scheduled_at: DateTime<Utc>,
    /// Length of the session
    pub duration_minutes: u32,
    /// Display topic
    pub topic: String,
}

/// A session as stored, before listing and expert identities are joined in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session identifier
    pub id: SessionId,
    /// Booked listing, absent for synthesized sessions
    pub listing_id: Option<ListingId>,
    /// Hosting expert
    pub expert_id: UserId,
    /// Booking learner
    pub learner_id: UserId,
    /// Current status
    pub status: SessionStatus,
    /// Start time
    pub scheduled_at: DateTime<Utc>,
    /// Length of the session
    pub duration_minutes: u32,
    /// Display topic
    pub topic: String,
}

/// A booked session with its expert identity joined in
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier
    pub id: SessionId,
    /// Booked listing, absent for synthesized sessions
    pub listing_id: Option<ListingId>,
    /// Hosting expert
    pub expert_id: UserId,
    /// Hosting expert's public identity
    pub expert: ExpertProfile,
    /// Skill of the booked listing, when the listing is still known
    pub skill_name: Option<String>,
    /// Booking learner
    pub learner_id: UserId,
    /// Current status
    pub status: SessionStatus,
    /// Start time
    pub scheduled_at: DateTime<Utc>,
    /// Length of the session
    pub duration_minutes: u32,
    /// Display topic
    pub topic: String,
    /// Store row or local-only session
    pub origin: Origin,
}

impl Session {
    /// Joins a stored session with its expert identity and listing skill
    #[must_use]
    pub fn from_record(
        record: SessionRecord,
        expert: ExpertProfile,
        skill_name: Option<String>,
        origin: Origin,
    ) -> Self {
        Self {
            id: record.id,
            listing_id: record.listing_id,
            expert_id: record.expert_id,
            expert,
            skill_name,
            learner_id: record.learner_id,
            status: record.status,
            scheduled_at: record.scheduled_at,
            duration_minutes: record.duration_minutes,
            topic: record.topic,
            origin,
        }
    }

    /// Whether `user` takes part in this session as learner or expert
    #[must_use]
    pub fn involves(&self, user: &UserId) -> bool {
        &self.learner_id == user || &self.expert_id == user
    }
}

/// Filter for listing sessions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionFilter {
    /// Sessions where this user is the learner or the expert
    pub participant: UserId,
}

/// Ordering for listing sessions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionOrder {
    /// Earliest first
    #[default]
    ScheduledAsc,
    /// Latest first
    ScheduledDesc,
}

/// Identifier of a journaled two-step mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(Uuid);

impl IntentId {
    /// Creates a new random `IntentId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a journaled intent is about to do
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    /// Debit `from`, then credit `to`
    Transfer {
        /// Sender
        from: UserId,
        /// Recipient
        to: UserId,
        /// Amount moved
        amount: Credits,
    },
    /// Debit `learner`, then insert the session row
    Booking {
        /// Booking learner
        learner: UserId,
        /// Booked listing
        listing_id: ListingId,
        /// Amount charged
        amount: Credits,
        /// Chosen start time
        scheduled_at: DateTime<Utc>,
    },
}

/// Durable record written before the first step of a two-step mutation.
///
/// An intent still open after its sequence finished marks a partial failure
/// that needs reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIntent {
    /// Intent identifier
    pub id: IntentId,
    /// The mutation being attempted
    pub kind: IntentKind,
    /// When the intent was opened
    pub opened_at: DateTime<Utc>,
}
