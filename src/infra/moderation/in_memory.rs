// In-memory implementation of the moderation ports.
//
// Used by the core service tests and handy for running the host without a
// database. Everything lives in DashMaps, so the store is safe to share
// between tasks; cloning it shares the same data. Case reads and writes
// yield to the scheduler the way a database round-trip would.

use crate::core::moderation::{
    AccountStore, BlockMetadata, CaseFilter, CaseId, CaseStatus, ChatMessage, Conversation,
    ListingRecord, ModerationCase, ModerationError, ModerationStore, NewCase, NewChatMessage,
    Pagination, UnblockMetadata, UserAccount, UserBlockRecord,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Directed (blocker, target) pair.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct BlockKey {
    blocker_id: u64,
    target_id: u64,
}

#[derive(Default)]
struct Tables {
    cases: DashMap<CaseId, ModerationCase>,
    // conversation id -> its pending case, the one-pending-case index
    pending: DashMap<u64, CaseId>,
    conversations: DashMap<u64, Conversation>,
    messages: DashMap<u64, Vec<ChatMessage>>,
    accounts: DashMap<u64, UserAccount>,
    listings: DashMap<u64, ListingRecord>,
    blocks: DashMap<BlockKey, UserBlockRecord>,
    next_case_id: AtomicU64,
    next_message_id: AtomicU64,
    rejected_inserts: AtomicU64,
}

#[derive(Clone, Default)]
pub struct InMemoryModerationStore {
    tables: Arc<Tables>,
}

impl InMemoryModerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, account: UserAccount) {
        self.tables.accounts.insert(account.id, account);
    }

    pub fn add_conversation(&self, conversation: Conversation) {
        self.tables.conversations.insert(conversation.id, conversation);
    }

    pub fn add_listing(&self, listing: ListingRecord) {
        self.tables.listings.insert(listing.id, listing);
    }

    /// Messages posted into a conversation, oldest first.
    pub fn messages_for(&self, conversation_id: u64) -> Vec<ChatMessage> {
        self.tables
            .messages
            .get(&conversation_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// How many `insert_case` calls hit an existing pending case.
    pub fn rejected_inserts(&self) -> u64 {
        self.tables.rejected_inserts.load(Ordering::SeqCst)
    }

    pub fn pending_cases_for(&self, conversation_id: u64) -> usize {
        self.tables
            .cases
            .iter()
            .filter(|c| c.conversation_id == conversation_id && c.status == CaseStatus::Pending)
            .count()
    }
}

#[async_trait]
impl AccountStore for InMemoryModerationStore {
    async fn get_account(&self, user_id: u64) -> Result<Option<UserAccount>, ModerationError> {
        Ok(self.tables.accounts.get(&user_id).map(|a| a.clone()))
    }

    async fn mark_blocked(
        &self,
        user_id: u64,
        block: BlockMetadata,
    ) -> Result<(), ModerationError> {
        let mut account = self
            .tables
            .accounts
            .get_mut(&user_id)
            .ok_or(ModerationError::UserNotFound(user_id))?;
        account.is_blocked = true;
        account.block = Some(block);
        Ok(())
    }

    async fn mark_unblocked(
        &self,
        user_id: u64,
        unblock: UnblockMetadata,
    ) -> Result<(), ModerationError> {
        let mut account = self
            .tables
            .accounts
            .get_mut(&user_id)
            .ok_or(ModerationError::UserNotFound(user_id))?;
        account.is_blocked = false;
        account.unblock = Some(unblock);
        Ok(())
    }

    async fn insert_block_if_absent(
        &self,
        record: UserBlockRecord,
    ) -> Result<bool, ModerationError> {
        let key = BlockKey {
            blocker_id: record.blocker_id,
            target_id: record.target_id,
        };

        // entry() holds the shard lock, so check and insert are one step
        match self.tables.blocks.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(true)
            }
        }
    }

    async fn find_block(
        &self,
        blocker_id: u64,
        target_id: u64,
    ) -> Result<Option<UserBlockRecord>, ModerationError> {
        let key = BlockKey {
            blocker_id,
            target_id,
        };
        Ok(self.tables.blocks.get(&key).map(|r| r.clone()))
    }

    async fn delete_block(&self, blocker_id: u64, target_id: u64) -> Result<bool, ModerationError> {
        let key = BlockKey {
            blocker_id,
            target_id,
        };
        Ok(self.tables.blocks.remove(&key).is_some())
    }

    async fn count_blocks_targeting(&self, target_id: u64) -> Result<u64, ModerationError> {
        Ok(self
            .tables
            .blocks
            .iter()
            .filter(|entry| entry.key().target_id == target_id)
            .count() as u64)
    }
}

#[async_trait]
impl ModerationStore for InMemoryModerationStore {
    async fn find_pending_case(
        &self,
        conversation_id: u64,
    ) -> Result<Option<ModerationCase>, ModerationError> {
        tokio::task::yield_now().await;
        let case_id = match self.tables.pending.get(&conversation_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.tables.cases.get(&case_id).map(|c| c.clone()))
    }

    async fn insert_case(&self, case: NewCase) -> Result<CaseId, ModerationError> {
        tokio::task::yield_now().await;
        let conversation_id = case.conversation_id;

        // entry() holds the shard lock, so check and insert are one step
        match self.tables.pending.entry(conversation_id) {
            Entry::Occupied(_) => {
                self.tables.rejected_inserts.fetch_add(1, Ordering::SeqCst);
                Err(ModerationError::DuplicatePendingCase(conversation_id))
            }
            Entry::Vacant(slot) => {
                let id = self.tables.next_case_id.fetch_add(1, Ordering::SeqCst) + 1;
                self.tables.cases.insert(id, case.into_case(id));
                slot.insert(id);
                Ok(id)
            }
        }
    }

    async fn save_case(&self, case: &ModerationCase) -> Result<(), ModerationError> {
        tokio::task::yield_now().await;
        match self.tables.cases.get_mut(&case.id) {
            Some(mut stored) => *stored = case.clone(),
            None => return Err(ModerationError::CaseNotFound(case.id)),
        }

        if case.status.is_terminal() {
            self.tables.pending.remove_if(&case.conversation_id, |_, id| *id == case.id);
        }
        Ok(())
    }

    async fn get_case(&self, case_id: CaseId) -> Result<Option<ModerationCase>, ModerationError> {
        Ok(self.tables.cases.get(&case_id).map(|c| c.clone()))
    }

    async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: Pagination,
    ) -> Result<Vec<ModerationCase>, ModerationError> {
        let mut cases: Vec<ModerationCase> = self
            .tables
            .cases
            .iter()
            .filter(|c| filter.matches(c.value()))
            .map(|c| c.clone())
            .collect();

        // Newest first; id breaks ties between cases touched in the same instant
        cases.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        Ok(cases
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn count_cases(&self, filter: &CaseFilter) -> Result<u64, ModerationError> {
        Ok(self
            .tables
            .cases
            .iter()
            .filter(|c| filter.matches(c.value()))
            .count() as u64)
    }

    async fn get_conversation(
        &self,
        conversation_id: u64,
    ) -> Result<Option<Conversation>, ModerationError> {
        Ok(self
            .tables
            .conversations
            .get(&conversation_id)
            .map(|c| c.clone()))
    }

    async fn insert_message(&self, message: NewChatMessage) -> Result<u64, ModerationError> {
        let id = self.tables.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.tables
            .messages
            .entry(message.conversation_id)
            .or_default()
            .push(ChatMessage {
                id,
                conversation_id: message.conversation_id,
                author_id: message.author_id,
                author_kind: message.author_kind,
                body: message.body,
                created_at: message.created_at,
            });
        Ok(id)
    }

    async fn unhide_conversation(&self, conversation_id: u64) -> Result<(), ModerationError> {
        let mut conversation = self
            .tables
            .conversations
            .get_mut(&conversation_id)
            .ok_or(ModerationError::ConversationNotFound(conversation_id))?;
        conversation.hidden_for_initiator = false;
        conversation.hidden_for_counterparty = false;
        Ok(())
    }

    async fn get_listing(&self, listing_id: u64) -> Result<Option<ListingRecord>, ModerationError> {
        Ok(self.tables.listings.get(&listing_id).map(|l| l.clone()))
    }
}
