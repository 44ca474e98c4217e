// Moderation service - core business logic for escrow-bypass cases.
//
// This service handles:
// - Aggregating suspicious messages into one pending case per conversation
// - Resolving cases (block one/both parties, or issue a warning)
// - Dismissing cases
// - Review queries with participant/listing enrichment
//
// NO storage details here - just domain logic over the ModerationStore port.

use super::blocking_service::{apply_block, AccountStore};
use super::classifier::classify;
use super::moderation_models::{
    AuthorKind, CaseDetails, CaseFilter, CaseId, CasePage, CaseStatus, ClassificationResult,
    Conversation, ListingRecord, ListingSummary, ModerationCase, ModerationConfig, NewCase,
    NewChatMessage, PageRequest, Pagination, ParticipantSummary, Resolution, ResolutionAction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Conversation {0} not found")]
    ConversationNotFound(u64),

    #[error("Moderation case {0} not found")]
    CaseNotFound(CaseId),

    #[error("User {0} not found")]
    UserNotFound(u64),

    #[error(
        "Sender {sender_id} and receiver {receiver_id} are not the participants of conversation {conversation_id}"
    )]
    ParticipantMismatch {
        conversation_id: u64,
        sender_id: u64,
        receiver_id: u64,
    },

    #[error("User {0} is not allowed to moderate")]
    Unauthorized(u64),

    #[error("Moderation case {case_id} is already {status}")]
    CaseClosed { case_id: CaseId, status: CaseStatus },

    #[error("User {0} cannot block themselves")]
    SelfBlock(u64),

    #[error("Conversation {0} already has a pending moderation case")]
    DuplicatePendingCase(u64),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for persisting cases and reading the conversation they belong to.
///
/// Account and block operations come from the `AccountStore` supertrait.
#[async_trait]
pub trait ModerationStore: AccountStore {
    /// The pending case for a conversation, if there is one.
    async fn find_pending_case(
        &self,
        conversation_id: u64,
    ) -> Result<Option<ModerationCase>, ModerationError>;

    /// Persist a new pending case and return its id.
    /// Fails with `DuplicatePendingCase` if the conversation already has one.
    async fn insert_case(&self, case: NewCase) -> Result<CaseId, ModerationError>;

    /// Overwrite a stored case with `case`.
    async fn save_case(&self, case: &ModerationCase) -> Result<(), ModerationError>;

    async fn get_case(&self, case_id: CaseId) -> Result<Option<ModerationCase>, ModerationError>;

    /// Cases matching `filter`, most recently updated first.
    async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: Pagination,
    ) -> Result<Vec<ModerationCase>, ModerationError>;

    async fn count_cases(&self, filter: &CaseFilter) -> Result<u64, ModerationError>;

    async fn get_conversation(
        &self,
        conversation_id: u64,
    ) -> Result<Option<Conversation>, ModerationError>;

    /// Append a message to a conversation feed. Returns the message id.
    async fn insert_message(&self, message: NewChatMessage) -> Result<u64, ModerationError>;

    /// Clear both participants' "hidden" flags on a conversation.
    async fn unhide_conversation(&self, conversation_id: u64) -> Result<(), ModerationError>;

    async fn get_listing(&self, listing_id: u64) -> Result<Option<ListingRecord>, ModerationError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

type LockMap = DashMap<u64, Arc<Mutex<()>>>;

/// Held while a conversation's cases are being changed.
///
/// On drop the lock entry is removed again unless another task still holds
/// or waits on it, so the map only contains conversations in use.
struct ConversationGuard<'a> {
    locks: &'a LockMap,
    conversation_id: u64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.conversation_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct ModerationService<S: ModerationStore> {
    store: S,
    config: ModerationConfig,
    // Serializes find-or-create and resolution per conversation.
    conversation_locks: LockMap,
}

impl<S: ModerationStore> ModerationService<S> {
    pub fn new(store: S, config: ModerationConfig) -> Self {
        Self {
            store,
            config,
            conversation_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    async fn lock_conversation(&self, conversation_id: u64) -> ConversationGuard<'_> {
        let lock = self
            .conversation_locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        ConversationGuard {
            locks: &self.conversation_locks,
            conversation_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Classify a freshly sent text message and fold it into the conversation's case.
    ///
    /// # Returns
    /// - `Ok(None)` if the message is not suspicious
    /// - `Ok(Some(case_id))` of the created or updated pending case
    /// - `Err(ParticipantMismatch)` if sender/receiver don't match the conversation
    pub async fn record_suspicious_message(
        &self,
        conversation_id: u64,
        message_id: u64,
        sender_id: u64,
        receiver_id: u64,
        message_text: &str,
    ) -> Result<Option<CaseId>, ModerationError> {
        let Some(result) = classify(message_text) else {
            return Ok(None);
        };

        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(ModerationError::ConversationNotFound(conversation_id))?;

        if sender_id == receiver_id
            || conversation.other_participant(sender_id) != Some(receiver_id)
        {
            tracing::warn!(
                conversation_id,
                sender_id,
                receiver_id,
                "Rejected suspicious message with mismatched participants"
            );
            return Err(ModerationError::ParticipantMismatch {
                conversation_id,
                sender_id,
                receiver_id,
            });
        }

        let _guard = self.lock_conversation(conversation_id).await;
        let now = Utc::now();

        if let Some(case) = self.store.find_pending_case(conversation_id).await? {
            return self.merge_into(case, message_text, &result, now).await;
        }

        let new_case = NewCase::open(&conversation, message_id, message_text, &result, now);
        match self.store.insert_case(new_case).await {
            Ok(case_id) => {
                tracing::info!(
                    case_id,
                    conversation_id,
                    risk = %result.risk_level,
                    category = %result.category,
                    "Moderation case opened"
                );
                Ok(Some(case_id))
            }
            Err(ModerationError::DuplicatePendingCase(_)) => {
                // Another writer sharing the store opened the case first.
                tracing::debug!(conversation_id, "Pending case appeared concurrently, merging");
                let case = self
                    .store
                    .find_pending_case(conversation_id)
                    .await?
                    .ok_or(ModerationError::DuplicatePendingCase(conversation_id))?;
                self.merge_into(case, message_text, &result, now).await
            }
            Err(e) => Err(e),
        }
    }

    async fn merge_into(
        &self,
        mut case: ModerationCase,
        message_text: &str,
        result: &ClassificationResult,
        now: DateTime<Utc>,
    ) -> Result<Option<CaseId>, ModerationError> {
        let previous_risk = case.risk_level;
        let escalated = case.absorb(message_text, result, now);
        self.store.save_case(&case).await?;

        if escalated {
            tracing::info!(
                case_id = case.id,
                conversation_id = case.conversation_id,
                from = %previous_risk,
                to = %case.risk_level,
                category = %case.category,
                "Moderation case escalated"
            );
        } else {
            tracing::debug!(
                case_id = case.id,
                conversation_id = case.conversation_id,
                "Moderation case updated"
            );
        }
        Ok(Some(case.id))
    }

    /// Close a pending case with a consequence.
    pub async fn resolve(
        &self,
        case_id: CaseId,
        resolver_id: u64,
        action: ResolutionAction,
        reason: &str,
        notes: Option<String>,
    ) -> Result<ModerationCase, ModerationError> {
        self.authorize(resolver_id).await?;

        let conversation_id = self.require_case(case_id).await?.conversation_id;
        let _guard = self.lock_conversation(conversation_id).await;

        // Re-read under the lock so a concurrent merge or resolution is visible.
        let mut case = self.require_pending(case_id).await?;
        let now = Utc::now();

        match action {
            ResolutionAction::WarningIssued => {
                self.store
                    .insert_message(NewChatMessage {
                        conversation_id: case.conversation_id,
                        author_id: resolver_id,
                        author_kind: AuthorKind::System,
                        body: self.config.warning_text(reason),
                        created_at: now,
                    })
                    .await?;
                self.store.unhide_conversation(case.conversation_id).await?;
            }
            _ => {
                for target in case.block_targets(action) {
                    apply_block(&self.store, resolver_id, target, reason, now).await?;
                }
            }
        }

        case.status = CaseStatus::Resolved;
        case.resolution = Some(Resolution {
            resolved_by: resolver_id,
            resolved_at: now,
            action: Some(action),
            reason: reason.to_string(),
            notes,
        });
        self.store.save_case(&case).await?;

        tracing::info!(
            case_id,
            resolver_id,
            action = %action,
            "Moderation case resolved"
        );
        Ok(case)
    }

    /// Close a pending case without consequences.
    pub async fn dismiss(
        &self,
        case_id: CaseId,
        resolver_id: u64,
        reason: &str,
    ) -> Result<ModerationCase, ModerationError> {
        self.authorize(resolver_id).await?;

        let conversation_id = self.require_case(case_id).await?.conversation_id;
        let _guard = self.lock_conversation(conversation_id).await;

        let mut case = self.require_pending(case_id).await?;
        case.status = CaseStatus::Dismissed;
        case.resolution = Some(Resolution {
            resolved_by: resolver_id,
            resolved_at: Utc::now(),
            action: None,
            reason: reason.to_string(),
            notes: None,
        });
        self.store.save_case(&case).await?;

        tracing::info!(case_id, resolver_id, "Moderation case dismissed");
        Ok(case)
    }

    /// One page of cases for the review surface.
    pub async fn list_cases(
        &self,
        filter: CaseFilter,
        request: PageRequest,
    ) -> Result<CasePage, ModerationError> {
        let page = self.config.paginate(request);
        let cases = self.store.list_cases(&filter, page).await?;
        let total = self.store.count_cases(&filter).await?;

        let mut items = Vec::with_capacity(cases.len());
        for case in cases {
            items.push(self.enrich(case).await?);
        }

        Ok(CasePage {
            items,
            total,
            page: request.page,
            page_size: page.limit,
        })
    }

    pub async fn get_case(&self, case_id: CaseId) -> Result<CaseDetails, ModerationError> {
        let case = self.require_case(case_id).await?;
        self.enrich(case).await
    }

    async fn authorize(&self, user_id: u64) -> Result<(), ModerationError> {
        match self.store.get_account(user_id).await? {
            Some(account) if account.role.can_moderate() => Ok(()),
            _ => {
                tracing::warn!(user_id, "Rejected moderation action from non-moderator");
                Err(ModerationError::Unauthorized(user_id))
            }
        }
    }

    async fn require_case(&self, case_id: CaseId) -> Result<ModerationCase, ModerationError> {
        self.store
            .get_case(case_id)
            .await?
            .ok_or(ModerationError::CaseNotFound(case_id))
    }

    async fn require_pending(&self, case_id: CaseId) -> Result<ModerationCase, ModerationError> {
        let case = self.require_case(case_id).await?;
        if case.status.is_terminal() {
            return Err(ModerationError::CaseClosed {
                case_id,
                status: case.status,
            });
        }
        Ok(case)
    }

    async fn enrich(&self, case: ModerationCase) -> Result<CaseDetails, ModerationError> {
        let initiator = self.participant_summary(case.initiator_id).await?;
        let counterparty = self.participant_summary(case.counterparty_id).await?;
        let listing = self
            .store
            .get_listing(case.listing_id)
            .await?
            .map(|listing| ListingSummary {
                id: listing.id,
                title: listing.title,
                image_url: listing.image_key.map(|key| self.config.media_url(&key)),
            });

        Ok(CaseDetails {
            case,
            initiator,
            counterparty,
            listing,
        })
    }

    async fn participant_summary(
        &self,
        user_id: u64,
    ) -> Result<Option<ParticipantSummary>, ModerationError> {
        Ok(self
            .store
            .get_account(user_id)
            .await?
            .map(|account| ParticipantSummary {
                user_id: account.id,
                display_name: account.display_name,
                image_url: account.avatar_key.map(|key| self.config.media_url(&key)),
                is_blocked: account.is_blocked,
            }))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{Category, RiskLevel, UserAccount, UserRole};
    use crate::infra::moderation::InMemoryModerationStore;
    use tokio::sync::Barrier;

    const CONVERSATION: u64 = 10;
    const LISTING: u64 = 20;
    const BUYER: u64 = 1;
    const SELLER: u64 = 2;
    const MODERATOR: u64 = 99;

    fn setup() -> (InMemoryModerationStore, ModerationService<InMemoryModerationStore>) {
        let store = InMemoryModerationStore::new();
        store.add_account(UserAccount::new(BUYER, "Buyer", UserRole::User));
        store.add_account(UserAccount::new(SELLER, "Seller", UserRole::User));
        store.add_account(UserAccount::new(MODERATOR, "Mod", UserRole::Moderator));
        store.add_listing(ListingRecord {
            id: LISTING,
            title: "Велосипед".to_string(),
            image_key: Some("listings/20.jpg".to_string()),
        });
        store.add_conversation(Conversation {
            id: CONVERSATION,
            listing_id: LISTING,
            initiator_id: BUYER,
            counterparty_id: SELLER,
            hidden_for_initiator: true,
            hidden_for_counterparty: false,
        });

        let service = ModerationService::new(store.clone(), ModerationConfig::default());
        (store, service)
    }

    async fn send(
        service: &ModerationService<InMemoryModerationStore>,
        message_id: u64,
        text: &str,
    ) -> Option<CaseId> {
        service
            .record_suspicious_message(CONVERSATION, message_id, BUYER, SELLER, text)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn clean_message_opens_no_case() {
        let (store, service) = setup();

        assert_eq!(send(&service, 1, "Добрый день, ещё продаёте?").await, None);
        assert!(store.find_pending_case(CONVERSATION).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_suspicious_message_opens_pending_case() {
        let (store, service) = setup();

        let case_id = send(&service, 7, "напиши мне в вотсап +79991234567")
            .await
            .unwrap();
        let case = store.get_case(case_id).await.unwrap().unwrap();

        assert_eq!(case.status, CaseStatus::Pending);
        assert_eq!(case.initiator_id, BUYER);
        assert_eq!(case.counterparty_id, SELLER);
        assert_eq!(case.listing_id, LISTING);
        assert_eq!(case.message_id, 7);
        assert_eq!(case.risk_level, RiskLevel::High);
        assert_eq!(case.category, Category::ExternalCommunication);
    }

    #[tokio::test]
    async fn later_messages_merge_and_escalate() {
        let (store, service) = setup();

        let first = send(&service, 1, "могу оплатить через сбербанк").await.unwrap();
        let case = store.get_case(first).await.unwrap().unwrap();
        assert_eq!(case.risk_level, RiskLevel::Medium);

        let second = send(&service, 2, "лучше пиши в телеграм").await.unwrap();
        assert_eq!(first, second);

        let case = store.get_case(first).await.unwrap().unwrap();
        assert_eq!(case.risk_level, RiskLevel::High);
        assert_eq!(case.detected_keywords, vec!["сбербанк", "телеграм"]);
        assert_eq!(case.message_content, "лучше пиши в телеграм");
        assert_eq!(case.message_id, 1);
        assert_eq!(case.category, Category::ExternalCommunication);
    }

    #[tokio::test]
    async fn risk_never_decreases_while_pending() {
        let (store, service) = setup();
        let messages = [
            "пиши в вотсап",
            "могу оплатить через сбербанк",
            "встретимся, отдам наличкой",
            "пиши на ivan@mail.ru",
        ];

        let mut seen = Vec::new();
        let mut case_id = None;
        for (i, text) in messages.iter().enumerate() {
            case_id = send(&service, i as u64, text).await.or(case_id);
            let case = store.get_case(case_id.unwrap()).await.unwrap().unwrap();
            assert_eq!(case.risk_level, RiskLevel::High, "after message {i}");
            seen.extend(classify(text).unwrap().detected_keywords);
        }

        let case = store.get_case(case_id.unwrap()).await.unwrap().unwrap();
        seen.dedup();
        for keyword in &seen {
            assert!(case.detected_keywords.contains(keyword));
        }
        let mut unique = case.detected_keywords.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), case.detected_keywords.len());
        assert_eq!(store.pending_cases_for(CONVERSATION), 1);
    }

    #[tokio::test]
    async fn mismatched_participants_are_rejected() {
        let (_, service) = setup();

        let stranger = service
            .record_suspicious_message(CONVERSATION, 1, 42, SELLER, "пиши в вотсап")
            .await;
        assert!(matches!(
            stranger,
            Err(ModerationError::ParticipantMismatch { sender_id: 42, .. })
        ));

        let self_addressed = service
            .record_suspicious_message(CONVERSATION, 1, BUYER, BUYER, "пиши в вотсап")
            .await;
        assert!(matches!(
            self_addressed,
            Err(ModerationError::ParticipantMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_conversation_is_an_error() {
        let (_, service) = setup();

        let result = service
            .record_suspicious_message(404, 1, BUYER, SELLER, "пиши в вотсап")
            .await;
        assert!(matches!(result, Err(ModerationError::ConversationNotFound(404))));
    }

    #[tokio::test]
    async fn block_both_blocks_both_parties() {
        let (store, service) = setup();
        let case_id = send(&service, 1, "пиши в вотсап").await.unwrap();

        let case = service
            .resolve(case_id, MODERATOR, ResolutionAction::BlockBoth, "evasion confirmed", None)
            .await
            .unwrap();

        assert_eq!(case.status, CaseStatus::Resolved);
        let resolution = case.resolution.unwrap();
        assert_eq!(resolution.action, Some(ResolutionAction::BlockBoth));
        assert_eq!(resolution.resolved_by, MODERATOR);
        assert_eq!(resolution.reason, "evasion confirmed");

        for user in [BUYER, SELLER] {
            let account = store.get_account(user).await.unwrap().unwrap();
            assert!(account.is_blocked);
            assert_eq!(account.block.unwrap().blocked_by, MODERATOR);
            assert!(store.find_block(MODERATOR, user).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn block_reasserts_flag_without_duplicate_record() {
        let (store, service) = setup();
        store
            .insert_block_if_absent(crate::core::moderation::UserBlockRecord {
                blocker_id: MODERATOR,
                target_id: SELLER,
                reason: "earlier".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let case_id = send(&service, 1, "пиши в вотсап").await.unwrap();
        service
            .resolve(case_id, MODERATOR, ResolutionAction::BlockCounterparty, "again", None)
            .await
            .unwrap();

        let record = store.find_block(MODERATOR, SELLER).await.unwrap().unwrap();
        assert_eq!(record.reason, "earlier");
        let account = store.get_account(SELLER).await.unwrap().unwrap();
        assert!(account.is_blocked);
        assert_eq!(account.block.unwrap().reason, "again");
        assert!(!store.get_account(BUYER).await.unwrap().unwrap().is_blocked);
    }

    #[tokio::test]
    async fn warning_posts_system_message_and_unhides_chat() {
        let (store, service) = setup();
        let case_id = send(&service, 1, "пиши в вотсап").await.unwrap();

        service
            .resolve(
                case_id,
                MODERATOR,
                ResolutionAction::WarningIssued,
                "обмен контактами",
                Some("first offence".to_string()),
            )
            .await
            .unwrap();

        let messages = store.messages_for(CONVERSATION);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].author_kind, AuthorKind::System);
        assert_eq!(messages[0].author_id, MODERATOR);
        assert!(messages[0].body.contains("обмен контактами"));

        let conversation = store.get_conversation(CONVERSATION).await.unwrap().unwrap();
        assert!(!conversation.hidden_for_initiator);
        assert!(!conversation.hidden_for_counterparty);

        for user in [BUYER, SELLER] {
            assert!(!store.get_account(user).await.unwrap().unwrap().is_blocked);
        }

        let case = store.get_case(case_id).await.unwrap().unwrap();
        assert_eq!(case.resolution.unwrap().notes.as_deref(), Some("first offence"));
    }

    #[tokio::test]
    async fn dismiss_has_no_side_effects() {
        let (store, service) = setup();
        let case_id = send(&service, 1, "пиши в вотсап").await.unwrap();

        let case = service.dismiss(case_id, MODERATOR, "joke").await.unwrap();

        assert_eq!(case.status, CaseStatus::Dismissed);
        assert_eq!(case.resolution.unwrap().action, None);
        assert_eq!(case.risk_level, RiskLevel::High);
        assert!(store.messages_for(CONVERSATION).is_empty());
        assert!(!store.get_account(BUYER).await.unwrap().unwrap().is_blocked);
    }

    #[tokio::test]
    async fn closed_cases_are_immutable() {
        let (store, service) = setup();
        let first = send(&service, 1, "пиши в вотсап").await.unwrap();
        service.dismiss(first, MODERATOR, "joke").await.unwrap();

        let second = send(&service, 2, "могу оплатить через сбербанк").await.unwrap();
        assert_ne!(first, second);

        let old = store.get_case(first).await.unwrap().unwrap();
        assert_eq!(old.status, CaseStatus::Dismissed);
        assert_eq!(old.detected_keywords, vec!["вотсап"]);
        assert_eq!(store.pending_cases_for(CONVERSATION), 1);

        let again = service
            .resolve(first, MODERATOR, ResolutionAction::BlockBoth, "late", None)
            .await;
        assert!(matches!(
            again,
            Err(ModerationError::CaseClosed {
                status: CaseStatus::Dismissed,
                ..
            })
        ));
        assert!(!store.get_account(BUYER).await.unwrap().unwrap().is_blocked);
    }

    #[tokio::test]
    async fn only_moderators_can_close_cases() {
        let (_, service) = setup();
        let case_id = send(&service, 1, "пиши в вотсап").await.unwrap();

        let result = service.dismiss(case_id, BUYER, "mine").await;
        assert!(matches!(result, Err(ModerationError::Unauthorized(BUYER))));

        let result = service
            .resolve(case_id, 12345, ResolutionAction::BlockBoth, "x", None)
            .await;
        assert!(matches!(result, Err(ModerationError::Unauthorized(12345))));
    }

    #[tokio::test]
    async fn unknown_case_is_not_found() {
        let (_, service) = setup();

        let result = service.dismiss(777, MODERATOR, "x").await;
        assert!(matches!(result, Err(ModerationError::CaseNotFound(777))));
        assert!(matches!(
            service.get_case(777).await,
            Err(ModerationError::CaseNotFound(777))
        ));
    }

    #[tokio::test]
    async fn review_queries_are_enriched_and_filtered() {
        let (store, service) = setup();
        store.add_conversation(Conversation {
            id: 11,
            listing_id: 404,
            initiator_id: SELLER,
            counterparty_id: BUYER,
            hidden_for_initiator: false,
            hidden_for_counterparty: false,
        });

        let high = send(&service, 1, "пиши в вотсап").await.unwrap();
        let medium = service
            .record_suspicious_message(11, 2, SELLER, BUYER, "могу оплатить через сбербанк")
            .await
            .unwrap()
            .unwrap();

        let all = service
            .list_cases(CaseFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.page_size, 20);

        let only_high = service
            .list_cases(
                CaseFilter {
                    status: Some(CaseStatus::Pending),
                    risk_level: Some(RiskLevel::High),
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(only_high.total, 1);
        assert_eq!(only_high.items[0].case.id, high);

        let details = service.get_case(high).await.unwrap();
        let initiator = details.initiator.unwrap();
        assert_eq!(initiator.display_name, "Buyer");
        assert!(!initiator.is_blocked);
        assert_eq!(
            details.listing.unwrap().image_url.as_deref(),
            Some("/media/listings/20.jpg")
        );

        let orphan = service.get_case(medium).await.unwrap();
        assert!(orphan.listing.is_none());
    }

    #[tokio::test]
    async fn pages_are_clamped() {
        let (store, service) = setup();
        for id in 100..105 {
            store.add_conversation(Conversation {
                id,
                listing_id: LISTING,
                initiator_id: BUYER,
                counterparty_id: SELLER,
                hidden_for_initiator: false,
                hidden_for_counterparty: false,
            });
            service
                .record_suspicious_message(id, id, BUYER, SELLER, "пиши в вотсап")
                .await
                .unwrap();
        }

        let page = service
            .list_cases(
                CaseFilter::default(),
                PageRequest {
                    page: 1,
                    page_size: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.page, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_messages_share_one_case() {
        let (store, service) = setup();
        let service = Arc::new(service);
        let start = Arc::new(Barrier::new(16));

        let mut handles = Vec::new();
        for i in 0..16u64 {
            let service = Arc::clone(&service);
            let start = Arc::clone(&start);
            handles.push(tokio::spawn(async move {
                start.wait().await;
                service
                    .record_suspicious_message(CONVERSATION, i, BUYER, SELLER, "пиши в вотсап")
                    .await
                    .unwrap()
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.pending_cases_for(CONVERSATION), 1);
        // The conversation lock serializes find-or-create, so no insert collides
        assert_eq!(store.rejected_inserts(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn services_sharing_a_store_merge_instead_of_failing() {
        let (store, first) = setup();
        let second = ModerationService::new(store.clone(), ModerationConfig::default());
        let services = [Arc::new(first), Arc::new(second)];
        let start = Arc::new(Barrier::new(8));

        let mut handles = Vec::new();
        for i in 0..8u64 {
            let service = Arc::clone(&services[(i % 2) as usize]);
            let start = Arc::clone(&start);
            handles.push(tokio::spawn(async move {
                start.wait().await;
                service
                    .record_suspicious_message(CONVERSATION, i, BUYER, SELLER, "пиши в телеграм")
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.pending_cases_for(CONVERSATION), 1);
    }

    #[tokio::test]
    async fn conversation_locks_are_released() {
        let (store, service) = setup();

        for id in 1000..1100 {
            store.add_conversation(Conversation {
                id,
                listing_id: LISTING,
                initiator_id: BUYER,
                counterparty_id: SELLER,
                hidden_for_initiator: false,
                hidden_for_counterparty: false,
            });
            let case_id = service
                .record_suspicious_message(id, id, BUYER, SELLER, "пиши в вотсап")
                .await
                .unwrap()
                .unwrap();
            service.dismiss(case_id, MODERATOR, "joke").await.unwrap();
        }

        // Failed actions release their lock too
        let case_id = send(&service, 1, "пиши в вотсап").await.unwrap();
        service.dismiss(case_id, MODERATOR, "joke").await.unwrap();
        assert!(service.dismiss(case_id, MODERATOR, "again").await.is_err());

        assert_eq!(service.conversation_locks.len(), 0);
    }

    #[tokio::test]
    async fn held_lock_stays_registered() {
        let (_, service) = setup();

        let guard = service.lock_conversation(CONVERSATION).await;
        let waiter = service.conversation_locks.get(&CONVERSATION).map(|l| Arc::clone(&l));
        drop(guard);
        assert_eq!(service.conversation_locks.len(), 1);

        drop(waiter);
        let guard = service.lock_conversation(CONVERSATION).await;
        drop(guard);
        assert_eq!(service.conversation_locks.len(), 0);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let closed = ModerationError::CaseClosed {
            case_id: 5,
            status: CaseStatus::Resolved,
        };
        assert_eq!(closed.to_string(), "Moderation case 5 is already resolved");

        let storage = ModerationError::StorageError("db down".into());
        assert!(storage.to_string().contains("db down"));
    }
}
