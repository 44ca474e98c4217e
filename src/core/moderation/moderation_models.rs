// Moderation domain models - data structures for the escrow-bypass detector.
//
// These are pure domain types with no storage or transport dependencies.
// The infra layer maps them to rows, the host layer maps them to JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type CaseId = u64;

/// Error returned when a stored enum value cannot be parsed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

// Small helper so every enum below gets the same as_str/Display/FromStr trio.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

/// Ordinal severity of a classification or a case.
///
/// Variant order matters: `Ord` is derived, so `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

string_enum!(RiskLevel {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl RiskLevel {
    /// Monotonic merge: never returns something lower than `self`.
    pub fn escalate(self, other: RiskLevel) -> RiskLevel {
        self.max(other)
    }
}

/// What kind of platform bypass a message looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ExternalCommunication,
    DirectPayment,
    PersonalMeeting,
    BypassPlatform,
    SuspiciousContact,
}

string_enum!(Category {
    ExternalCommunication => "external_communication",
    DirectPayment => "direct_payment",
    PersonalMeeting => "personal_meeting",
    BypassPlatform => "bypass_platform",
    SuspiciousContact => "suspicious_contact",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Resolved,
    Dismissed,
}

string_enum!(CaseStatus {
    Pending => "pending",
    Resolved => "resolved",
    Dismissed => "dismissed",
});

impl CaseStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CaseStatus::Pending)
    }
}

/// Consequence applied when a moderator resolves a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    BlockInitiator,
    BlockCounterparty,
    BlockBoth,
    WarningIssued,
}

string_enum!(ResolutionAction {
    BlockInitiator => "block_initiator",
    BlockCounterparty => "block_counterparty",
    BlockBoth => "block_both",
    WarningIssued => "warning_issued",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    User,
    System,
}

string_enum!(AuthorKind {
    User => "user",
    System => "system",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

string_enum!(UserRole {
    User => "user",
    Moderator => "moderator",
    Admin => "admin",
});

impl UserRole {
    pub fn can_moderate(&self) -> bool {
        matches!(self, UserRole::Moderator | UserRole::Admin)
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Outcome of classifying a single message.
///
/// Only ever constructed for suspicious messages; a clean message is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_suspicious: bool,
    /// Matched keywords plus `phone_pattern` / `email_pattern`, deduplicated.
    pub detected_keywords: Vec<String>,
    pub risk_level: RiskLevel,
    /// Highest-priority category that produced evidence.
    pub category: Category,
    /// Every category that produced evidence, in scan order.
    pub matched_categories: Vec<Category>,
}

// ============================================================================
// CONVERSATIONS (collaborator boundary)
// ============================================================================

/// A two-party chat thread scoped to one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: u64,
    pub listing_id: u64,
    pub initiator_id: u64,
    pub counterparty_id: u64,
    #[serde(default)]
    pub hidden_for_initiator: bool,
    #[serde(default)]
    pub hidden_for_counterparty: bool,
}

impl Conversation {
    /// The participant on the other side of `user_id`, if `user_id` is in this chat.
    pub fn other_participant(&self, user_id: u64) -> Option<u64> {
        if user_id == self.initiator_id {
            Some(self.counterparty_id)
        } else if user_id == self.counterparty_id {
            Some(self.initiator_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub conversation_id: u64,
    pub author_id: u64,
    pub author_kind: AuthorKind,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub conversation_id: u64,
    pub author_id: u64,
    pub author_kind: AuthorKind,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// ACCOUNTS & BLOCKS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub blocked_at: DateTime<Utc>,
    pub blocked_by: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnblockMetadata {
    pub unblocked_at: DateTime<Utc>,
    pub unblocked_by: u64,
}

/// The slice of a user profile this crate reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: u64,
    pub display_name: String,
    /// Storage key of the avatar image; turned into a URL on read.
    pub avatar_key: Option<String>,
    pub role: UserRole,
    pub is_blocked: bool,
    pub block: Option<BlockMetadata>,
    pub unblock: Option<UnblockMetadata>,
}

impl UserAccount {
    pub fn new(id: u64, display_name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            avatar_key: None,
            role,
            is_blocked: false,
            block: None,
            unblock: None,
        }
    }
}

/// A directed block: `blocker_id` blocks `target_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBlockRecord {
    pub blocker_id: u64,
    pub target_id: u64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: u64,
    pub title: String,
    pub image_key: Option<String>,
}

// ============================================================================
// CASES
// ============================================================================

/// How a closed case ended. `action` is `None` for dismissals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved_by: u64,
    pub resolved_at: DateTime<Utc>,
    pub action: Option<ResolutionAction>,
    pub reason: String,
    pub notes: Option<String>,
}

/// Rolling summary of the worst evidence seen in one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationCase {
    pub id: CaseId,
    pub conversation_id: u64,
    pub initiator_id: u64,
    pub counterparty_id: u64,
    pub listing_id: u64,
    /// Message that opened the case.
    pub message_id: u64,
    /// Content of the most recent suspicious message.
    pub message_content: String,
    pub detected_keywords: Vec<String>,
    pub risk_level: RiskLevel,
    pub category: Category,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolution: Option<Resolution>,
}

impl ModerationCase {
    /// Fold another suspicious message into this pending case.
    ///
    /// Returns `true` if the risk level went up.
    pub fn absorb(
        &mut self,
        message_text: &str,
        result: &ClassificationResult,
        now: DateTime<Utc>,
    ) -> bool {
        for keyword in &result.detected_keywords {
            if !self.detected_keywords.contains(keyword) {
                self.detected_keywords.push(keyword.clone());
            }
        }

        let escalated = result.risk_level > self.risk_level;
        if escalated {
            self.category = result.category;
        }
        self.risk_level = self.risk_level.escalate(result.risk_level);
        self.message_content = message_text.to_string();
        self.updated_at = now;
        escalated
    }

    /// The account ids an action applies to.
    pub fn block_targets(&self, action: ResolutionAction) -> Vec<u64> {
        match action {
            ResolutionAction::BlockInitiator => vec![self.initiator_id],
            ResolutionAction::BlockCounterparty => vec![self.counterparty_id],
            ResolutionAction::BlockBoth => vec![self.initiator_id, self.counterparty_id],
            ResolutionAction::WarningIssued => Vec::new(),
        }
    }
}

/// A case that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCase {
    pub conversation_id: u64,
    pub initiator_id: u64,
    pub counterparty_id: u64,
    pub listing_id: u64,
    pub message_id: u64,
    pub message_content: String,
    pub detected_keywords: Vec<String>,
    pub risk_level: RiskLevel,
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

impl NewCase {
    /// Open a case for `conversation`, triggered by `message_id`.
    pub fn open(
        conversation: &Conversation,
        message_id: u64,
        message_text: &str,
        result: &ClassificationResult,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation.id,
            initiator_id: conversation.initiator_id,
            counterparty_id: conversation.counterparty_id,
            listing_id: conversation.listing_id,
            message_id,
            message_content: message_text.to_string(),
            detected_keywords: result.detected_keywords.clone(),
            risk_level: result.risk_level,
            category: result.category,
            created_at: now,
        }
    }

    pub fn into_case(self, id: CaseId) -> ModerationCase {
        ModerationCase {
            id,
            conversation_id: self.conversation_id,
            initiator_id: self.initiator_id,
            counterparty_id: self.counterparty_id,
            listing_id: self.listing_id,
            message_id: self.message_id,
            message_content: self.message_content,
            detected_keywords: self.detected_keywords,
            risk_level: self.risk_level,
            category: self.category,
            status: CaseStatus::Pending,
            created_at: self.created_at,
            updated_at: self.created_at,
            resolution: None,
        }
    }
}

// ============================================================================
// REVIEW QUERIES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseFilter {
    pub status: Option<CaseStatus>,
    pub risk_level: Option<RiskLevel>,
}

impl CaseFilter {
    pub fn matches(&self, case: &ModerationCase) -> bool {
        self.status.map_or(true, |s| s == case.status)
            && self.risk_level.map_or(true, |r| r == case.risk_level)
    }
}

/// Zero-based page index plus an optional page size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    pub user_id: u64,
    pub display_name: String,
    pub image_url: Option<String>,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: u64,
    pub title: String,
    pub image_url: Option<String>,
}

/// A case joined with display data for the review surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDetails {
    #[serde(flatten)]
    pub case: ModerationCase,
    pub initiator: Option<ParticipantSummary>,
    pub counterparty: Option<ParticipantSummary>,
    pub listing: Option<ListingSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasePage {
    pub items: Vec<CaseDetails>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

// ============================================================================
// CONFIG
// ============================================================================

/// Tunables for the moderation services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Page size when the caller doesn't ask for one
    pub default_page_size: u32,
    /// Upper bound on any requested page size
    pub max_page_size: u32,
    /// Prefix for avatar and listing image URLs
    pub media_base_url: String,
    /// System message sent on `warning_issued`; `{reason}` is substituted
    pub warning_template: String,
}

pub const DEFAULT_WARNING_TEMPLATE: &str = "⚠️ Сообщение от модерации: {reason}. \
Обмен контактами и оплата в обход платформы запрещены. \
Сделки вне платформы не защищены безопасной сделкой.";

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            media_base_url: "/media".to_string(),
            warning_template: DEFAULT_WARNING_TEMPLATE.to_string(),
        }
    }
}

impl ModerationConfig {
    /// Clamp a page request to the configured sizes.
    pub fn paginate(&self, request: PageRequest) -> Pagination {
        let limit = request
            .page_size
            .filter(|size| *size > 0)
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
            .max(1);
        Pagination {
            offset: request.page as u64 * limit as u64,
            limit,
        }
    }

    pub fn media_url(&self, key: &str) -> String {
        format!("{}/{}", self.media_base_url.trim_end_matches('/'), key)
    }

    pub fn warning_text(&self, reason: &str) -> String {
        self.warning_template.replace("{reason}", reason)
    }
}
