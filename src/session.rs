//! In-memory per-user conversation history and credit balance.
//!
//! Every user owns one `tokio::sync::Mutex<Session>`. Store-level operations lock it briefly;
//! the pipeline holds the owned guard returned by [`SessionStore::lock`] for a whole run, which
//! serializes concurrent messages from the same user. The balance is also published to an
//! atomic so `/balance` can answer without waiting for an in-flight run.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::foundation::error::{TalkreelError, TalkreelResult};

/// Opaque user identifier (the Telegram user id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One user's conversation state.
#[derive(Clone, Debug)]
pub struct Session {
    user_id: UserId,
    history: VecDeque<ConversationTurn>,
    history_limit: usize,
    credit_balance: u64,
    published_balance: Arc<AtomicU64>,
}

impl Session {
    fn new(user_id: UserId, starting_credits: u64, history_limit: usize) -> Self {
        Self {
            user_id,
            history: VecDeque::new(),
            history_limit,
            credit_balance: starting_credits,
            published_balance: Arc::new(AtomicU64::new(starting_credits)),
        }
    }

    fn set_balance(&mut self, balance: u64) {
        self.credit_balance = balance;
        self.published_balance.store(balance, Ordering::Release);
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Turns in conversation order, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &ConversationTurn> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn balance(&self) -> u64 {
        self.credit_balance
    }

    /// Append a turn, evicting the oldest turns beyond the history limit.
    pub fn append_turn(&mut self, turn: ConversationTurn) {
        self.history.push_back(turn);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// Spend one credit. At zero the balance is left unchanged.
    pub fn decrement_balance(&mut self) -> TalkreelResult<u64> {
        if self.credit_balance == 0 {
            return Err(TalkreelError::InsufficientCredit);
        }
        self.set_balance(self.credit_balance - 1);
        Ok(self.credit_balance)
    }

    pub fn grant(&mut self, credits: u64) -> u64 {
        self.set_balance(self.credit_balance.saturating_add(credits));
        self.credit_balance
    }
}

/// Exclusive access to one user's session, held across `.await` points.
pub type SessionGuard = OwnedMutexGuard<Session>;

#[derive(Clone, Copy, Debug)]
pub struct SessionStoreOpts {
    /// Credits a brand-new session starts with.
    pub starting_credits: u64,
    /// Maximum turns retained per user.
    pub history_limit: usize,
}

impl Default for SessionStoreOpts {
    fn default() -> Self {
        Self {
            starting_credits: 5,
            history_limit: 20,
        }
    }
}

#[derive(Clone, Debug)]
struct SessionSlot {
    session: Arc<Mutex<Session>>,
    balance: Arc<AtomicU64>,
}

/// Concurrency-safe map of sessions keyed by user.
#[derive(Debug, Default)]
pub struct SessionStore {
    opts: SessionStoreOpts,
    sessions: DashMap<UserId, SessionSlot>,
}

impl SessionStore {
    pub fn new(opts: SessionStoreOpts) -> Self {
        Self {
            opts,
            sessions: DashMap::new(),
        }
    }

    pub fn opts(&self) -> SessionStoreOpts {
        self.opts
    }

    fn entry(&self, user_id: UserId) -> SessionSlot {
        // The shard lock is released before any await on the session mutex.
        self.sessions
            .entry(user_id)
            .or_insert_with(|| {
                let session =
                    Session::new(user_id, self.opts.starting_credits, self.opts.history_limit);
                SessionSlot {
                    balance: Arc::clone(&session.published_balance),
                    session: Arc::new(Mutex::new(session)),
                }
            })
            .clone()
    }

    fn slot(&self, user_id: UserId) -> Arc<Mutex<Session>> {
        self.entry(user_id).session
    }

    /// Snapshot of the user's session, creating it on first contact.
    pub async fn get_or_create(&self, user_id: UserId) -> Session {
        self.slot(user_id).lock().await.clone()
    }

    /// Lock the user's session for the duration of a pipeline run.
    pub async fn lock(&self, user_id: UserId) -> SessionGuard {
        self.slot(user_id).lock_owned().await
    }

    pub async fn append_turn(&self, user_id: UserId, turn: ConversationTurn) {
        self.slot(user_id).lock().await.append_turn(turn);
    }

    pub async fn get_balance(&self, user_id: UserId) -> u64 {
        self.slot(user_id).lock().await.balance()
    }

    /// Last committed balance, read without waiting for the session lock.
    pub fn current_balance(&self, user_id: UserId) -> u64 {
        self.entry(user_id).balance.load(Ordering::Acquire)
    }

    pub async fn decrement_balance(&self, user_id: UserId) -> TalkreelResult<u64> {
        self.slot(user_id).lock().await.decrement_balance()
    }

    pub async fn grant(&self, user_id: UserId, credits: u64) -> u64 {
        self.slot(user_id).lock().await.grant(credits)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(starting_credits: u64, history_limit: usize) -> SessionStore {
        SessionStore::new(SessionStoreOpts {
            starting_credits,
            history_limit,
        })
    }

    #[tokio::test]
    async fn first_contact_creates_session_with_starting_credits() {
        let store = store(3, 10);
        assert!(store.is_empty());

        let session = store.get_or_create(UserId(7)).await;
        assert_eq!(session.user_id(), UserId(7));
        assert_eq!(session.balance(), 3);
        assert_eq!(session.history_len(), 0);
        assert_eq!(store.len(), 1);

        store.get_or_create(UserId(7)).await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn decrement_never_goes_below_zero() {
        let store = store(1, 10);
        let user = UserId(1);

        assert_eq!(store.decrement_balance(user).await.unwrap(), 0);
        let err = store.decrement_balance(user).await.unwrap_err();
        assert!(matches!(err, TalkreelError::InsufficientCredit));
        assert_eq!(store.get_balance(user).await, 0);
    }

    #[tokio::test]
    async fn history_is_ordered_and_capped() {
        let store = store(1, 3);
        let user = UserId(2);
        for i in 0..5 {
            store
                .append_turn(user, ConversationTurn::user(format!("m{i}")))
                .await;
        }

        let session = store.get_or_create(user).await;
        let contents: Vec<_> = session.history().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn grant_adds_credits() {
        let store = store(0, 3);
        assert_eq!(store.grant(UserId(3), 2).await, 2);
        assert_eq!(store.get_balance(UserId(3)).await, 2);
    }

    #[tokio::test]
    async fn lock_serializes_same_user_but_not_others() {
        let store = Arc::new(store(5, 10));
        let guard = store.lock(UserId(1)).await;

        // A different user is not blocked.
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            store.get_balance(UserId(2)),
        )
        .await;
        assert_eq!(other.unwrap(), 5);

        // The same user waits until the guard is released.
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.get_balance(UserId(1)),
        )
        .await;
        assert!(blocked.is_err());

        drop(guard);
        assert_eq!(store.get_balance(UserId(1)).await, 5);
    }

    #[tokio::test]
    async fn current_balance_does_not_wait_for_a_running_reply() {
        let store = store(2, 10);
        let user = UserId(4);
        assert_eq!(store.current_balance(user), 2);

        let mut guard = store.lock(user).await;
        assert_eq!(store.current_balance(user), 2);
        guard.decrement_balance().unwrap();
        assert_eq!(store.current_balance(user), 1);
        guard.grant(3);
        assert_eq!(store.current_balance(user), 4);

        drop(guard);
        assert_eq!(store.get_balance(user).await, 4);
    }

    #[tokio::test]
    async fn concurrent_decrements_spend_each_credit_once() {
        let store = Arc::new(store(10, 10));
        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.decrement_balance(UserId(9)).await.is_ok()
            }));
        }

        let mut spent = 0;
        for h in handles {
            if h.await.unwrap() {
                spent += 1;
            }
        }
        assert_eq!(spent, 10);
        assert_eq!(store.get_balance(UserId(9)).await, 0);
    }
}
