//! Seeded marketplace data.
//!
//! Used for the demo account and as the catalog fallback when the listing
//! store is empty or unreachable. Everything here is [`Origin::Synthetic`].

use crate::inbox::{ChatMessage, Conversation, ConversationId, Participant};
use chrono::{DateTime, Duration, Utc};
use skillswap_core::types::{
    Account, Credits, ExpertProfile, Level, Listing, ListingId, ListingRecord, Origin, Role,
    Session, SessionId, SessionRecord, SessionStatus, UserId,
};

/// Id of the demo account
pub const DEMO_USER_ID: &str = "u1";

/// The local demo account
#[must_use]
pub fn demo_account() -> Account {
    Account {
        id: UserId::new(DEMO_USER_ID),
        name: "Alex Rivera".to_string(),
        email: None,
        role: Role::Learner,
        balance: Credits::new(12),
        origin: Origin::Synthetic,
    }
}

fn avatar(photo: &str) -> String {
    format!("https://images.unsplash.com/{photo}?auto=format&fit=crop&q=80&w=200")
}

/// Seeded experts
#[must_use]
pub fn experts() -> Vec<ExpertProfile> {
    vec![
        ExpertProfile {
            id: UserId::new("e1"),
            name: "Sarah Chen".to_string(),
            avatar: avatar("photo-1494790108377-be9c29b29330"),
            title: "Senior System Architect".to_string(),
            rating: 5.0,
            skills: vec!["System Design".into(), "Go".into(), "Kubernetes".into()],
            language: Some("English".to_string()),
        },
        ExpertProfile {
            id: UserId::new("e2"),
            name: "Marcus Johnson".to_string(),
            avatar: avatar("photo-1500648767791-00dcc994a43e"),
            title: "Guitar Virtuoso".to_string(),
            rating: 4.9,
            skills: vec!["Guitar".into(), "Music Theory".into()],
            language: Some("English".to_string()),
        },
        ExpertProfile {
            id: UserId::new("e3"),
            name: "Elena Rodriguez".to_string(),
            avatar: avatar("photo-1534528741775-53994a69daeb"),
            title: "Native Spanish Speaker".to_string(),
            rating: 4.7,
            skills: vec!["Spanish".into(), "Linguistics".into()],
            language: Some("Spanish".to_string()),
        },
    ]
}

/// Seeded expert by id
#[must_use]
pub fn expert(id: &UserId) -> Option<ExpertProfile> {
    experts().into_iter().find(|expert| &expert.id == id)
}

/// Seeded expert, else the placeholder identity
#[must_use]
pub fn expert_or_placeholder(id: &UserId) -> ExpertProfile {
    expert(id).unwrap_or_else(|| ExpertProfile::placeholder(id))
}

fn records() -> Vec<ListingRecord> {
    vec![
        ListingRecord {
            id: ListingId::new("l1"),
            expert_id: UserId::new("e1"),
            skill_name: "System Design Interview Prep".to_string(),
            description: "Master the architectural patterns needed to ace your tech interviews. \
                          We will cover scaling, sharding, and CAP theorem."
                .to_string(),
            level: Level::Advanced,
            credit_cost: Credits::new(3),
            tags: vec!["Tech".into(), "Career".into(), "Architecture".into()],
        },
        ListingRecord {
            id: ListingId::new("l2"),
            expert_id: UserId::new("e2"),
            skill_name: "Advanced Jazz Improvisation".to_string(),
            description: "Learn to navigate complex chord changes and build your own melodic \
                          voice on the guitar."
                .to_string(),
            level: Level::Expert,
            credit_cost: Credits::new(2),
            tags: vec!["Music".into(), "Creative".into(), "Guitar".into()],
        },
        ListingRecord {
            id: ListingId::new("l3"),
            expert_id: UserId::new("e3"),
            skill_name: "Conversational Spanish".to_string(),
            description: "Practice real-world scenarios in a relaxed environment. Perfect for \
                          travelers or business professionals."
                .to_string(),
            level: Level::Intermediate,
            credit_cost: Credits::new(1),
            tags: vec!["Language".into(), "Culture".into()],
        },
    ]
}

/// Seeded catalog
#[must_use]
pub fn listings() -> Vec<Listing> {
    records()
        .into_iter()
        .map(|record| {
            let expert = expert_or_placeholder(&record.expert_id);
            Listing::from_record(record, expert, Origin::Synthetic)
        })
        .collect()
}

/// Sessions of the demo account: one live now, one in two days.
#[must_use]
pub fn demo_sessions(now: DateTime<Utc>) -> Vec<Session> {
    let learner = UserId::new(DEMO_USER_ID);
    let session = |id: &str, listing: &str, expert: &str, status, at, minutes, topic: &str| {
        let expert_id = UserId::new(expert);
        let skill_name = records()
            .into_iter()
            .find(|record| record.id.as_str() == listing)
            .map(|record| record.skill_name);
        let record = SessionRecord {
            id: SessionId::new(id),
            listing_id: Some(ListingId::new(listing)),
            expert_id: expert_id.clone(),
            learner_id: learner.clone(),
            status,
            scheduled_at: at,
            duration_minutes: minutes,
            topic: topic.to_string(),
        };
        Session::from_record(
            record,
            expert_or_placeholder(&expert_id),
            skill_name,
            Origin::Synthetic,
        )
    };

    vec![
        session(
            "s1",
            "l1",
            "e1",
            SessionStatus::Live,
            now,
            60,
            "System Design Mock Interview",
        ),
        session(
            "s2",
            "l2",
            "e2",
            SessionStatus::Scheduled,
            now + Duration::days(2),
            45,
            "Jazz Scales and Modes",
        ),
    ]
}

/// Conversations of the demo account.
#[must_use]
pub fn demo_conversations(now: DateTime<Utc>) -> Vec<Conversation> {
    let me = UserId::new(DEMO_USER_ID);
    let participant = |expert: ExpertProfile| Participant {
        id: expert.id,
        name: expert.name,
        avatar: expert.avatar,
    };
    let sarah = participant(expert_or_placeholder(&UserId::new("e1")));
    let elena = participant(expert_or_placeholder(&UserId::new("e3")));
    let message = |id: &str, from: &Participant, text: &str, minutes_ago: i64| ChatMessage {
        id: id.to_string(),
        sender_id: from.id.clone(),
        sender_name: from.name.clone(),
        text: text.to_string(),
        sent_at: now - Duration::minutes(minutes_ago),
        is_system: false,
    };
    let me_as_sender = Participant {
        id: me,
        name: "Me".to_string(),
        avatar: String::new(),
    };

    vec![
        Conversation {
            id: ConversationId::new("c1"),
            participant: sarah.clone(),
            unread_count: 0,
            messages: vec![
                message("m1", &sarah, "Hi Alex! Thanks for booking.", 3),
                message("m2", &me_as_sender, "Looking forward to it.", 2),
                message("m3", &sarah, "Great, see you at the scheduled time!", 1),
            ],
        },
        Conversation {
            id: ConversationId::new("c2"),
            participant: elena.clone(),
            unread_count: 1,
            messages: vec![message(
                "m4",
                &elena,
                "Hola! Do you have any specific topics for Spanish?",
                24 * 60,
            )],
        },
    ]
}
