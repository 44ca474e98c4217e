// Blocking - directed user blocks and the account-level blocked flag.
//
// Shared by two callers: case resolution (moderator blocks a participant) and
// peer-to-peer block/unblock between users.

use super::moderation_models::{BlockMetadata, UnblockMetadata, UserAccount, UserBlockRecord};
use super::moderation_service::ModerationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Trait for account flags and block records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, user_id: u64) -> Result<Option<UserAccount>, ModerationError>;

    /// Set the blocked flag and overwrite block metadata.
    /// Fails with `UserNotFound` if the account doesn't exist.
    async fn mark_blocked(&self, user_id: u64, block: BlockMetadata)
        -> Result<(), ModerationError>;

    /// Clear the blocked flag and record who lifted it.
    async fn mark_unblocked(
        &self,
        user_id: u64,
        unblock: UnblockMetadata,
    ) -> Result<(), ModerationError>;

    /// Insert a block record unless one already exists for the same
    /// (blocker, target) pair. Must be atomic. Returns `true` if inserted.
    async fn insert_block_if_absent(
        &self,
        record: UserBlockRecord,
    ) -> Result<bool, ModerationError>;

    async fn find_block(
        &self,
        blocker_id: u64,
        target_id: u64,
    ) -> Result<Option<UserBlockRecord>, ModerationError>;

    /// Remove a block record. Returns `true` if one existed.
    async fn delete_block(&self, blocker_id: u64, target_id: u64)
        -> Result<bool, ModerationError>;

    /// How many actors currently block `target_id`.
    async fn count_blocks_targeting(&self, target_id: u64) -> Result<u64, ModerationError>;
}

/// Record a block and (re)assert the target's account flag.
///
/// The record insert is skipped if one exists; the flag is always written.
pub(crate) async fn apply_block<S: AccountStore + ?Sized>(
    store: &S,
    blocker_id: u64,
    target_id: u64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<bool, ModerationError> {
    let inserted = store
        .insert_block_if_absent(UserBlockRecord {
            blocker_id,
            target_id,
            reason: reason.to_string(),
            created_at: now,
        })
        .await?;

    store
        .mark_blocked(
            target_id,
            BlockMetadata {
                blocked_at: now,
                blocked_by: blocker_id,
                reason: reason.to_string(),
            },
        )
        .await?;

    tracing::info!(blocker_id, target_id, new_record = inserted, "User blocked");
    Ok(inserted)
}

/// Peer-to-peer block/unblock service.
pub struct BlockingService<S: AccountStore> {
    store: S,
}

impl<S: AccountStore> BlockingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Block `target_id` on behalf of `blocker_id`.
    ///
    /// Returns `true` if a new block record was created.
    pub async fn block_user(
        &self,
        blocker_id: u64,
        target_id: u64,
        reason: &str,
    ) -> Result<bool, ModerationError> {
        if blocker_id == target_id {
            return Err(ModerationError::SelfBlock(blocker_id));
        }
        if self.store.get_account(target_id).await?.is_none() {
            return Err(ModerationError::UserNotFound(target_id));
        }

        apply_block(&self.store, blocker_id, target_id, reason, Utc::now()).await
    }

    /// Lift `blocker_id`'s block on `target_id`.
    ///
    /// The account flag is cleared only once nobody else blocks the target.
    pub async fn unblock_user(
        &self,
        blocker_id: u64,
        target_id: u64,
    ) -> Result<bool, ModerationError> {
        let removed = self.store.delete_block(blocker_id, target_id).await?;
        if !removed {
            return Ok(false);
        }

        let remaining = self.store.count_blocks_targeting(target_id).await?;
        if remaining == 0 {
            self.store
                .mark_unblocked(
                    target_id,
                    UnblockMetadata {
                        unblocked_at: Utc::now(),
                        unblocked_by: blocker_id,
                    },
                )
                .await?;
        }

        tracing::info!(blocker_id, target_id, remaining, "User unblocked");
        Ok(true)
    }

    pub async fn is_blocked(&self, user_id: u64) -> Result<bool, ModerationError> {
        Ok(self
            .store
            .get_account(user_id)
            .await?
            .map(|account| account.is_blocked)
            .unwrap_or(false))
    }

    pub async fn find_block(
        &self,
        blocker_id: u64,
        target_id: u64,
    ) -> Result<Option<UserBlockRecord>, ModerationError> {
        self.store.find_block(blocker_id, target_id).await
    }
}
