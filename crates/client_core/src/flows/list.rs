use std::sync::Arc;

use shared::domain::{UserId, UserRecord};
use tokio::sync::watch;
use tracing::info;

use crate::{
    api::{QueryData, QueryKey},
    cache::{Mutation, QueryEntry, Subscription},
    error::ClientError,
};

use super::{FlowContext, Notice, Route};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListState {
    Loading,
    Populated(Vec<UserRecord>),
    Empty,
    Error(String),
}

impl ListState {
    fn from_entry(entry: &QueryEntry) -> Self {
        if entry.is_loading {
            return Self::Loading;
        }
        if let Some(err) = &entry.error {
            return Self::Error(err.user_message());
        }
        match entry.data.as_ref().and_then(QueryData::as_users) {
            Some([]) => Self::Empty,
            Some(users) => Self::Populated(users.to_vec()),
            None => Self::Loading,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// One table row; `index` counts from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub index: usize,
    pub user: UserRecord,
}

/// Revision of the entry the state was derived from, `None` before the first.
type Versioned = (Option<u64>, ListState);

/// The user table. Follows the `users` entry for as long as it is mounted.
pub struct ListFlow {
    ctx: FlowContext,
    state: watch::Receiver<Versioned>,
    _subscription: Subscription,
}

impl ListFlow {
    pub fn mount(ctx: FlowContext) -> Self {
        let (tx, rx) = watch::channel((None, ListState::Loading));
        let tx = Arc::new(tx);

        let subscriber = Arc::clone(&tx);
        let subscription = ctx
            .cache
            .subscribe(&QueryKey::Users, move |_key, entry| publish(&subscriber, entry));
        let entry = ctx.cache.read(&QueryKey::Users);
        publish(&tx, &entry);

        Self {
            ctx,
            state: rx,
            _subscription: subscription,
        }
    }

    pub fn state(&self) -> ListState {
        self.state.borrow().1.clone()
    }

    pub fn rows(&self) -> Vec<ListRow> {
        match self.state() {
            ListState::Populated(users) => users
                .into_iter()
                .enumerate()
                .map(|(offset, user)| ListRow {
                    index: offset + 1,
                    user,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Waits until the table leaves the loading state.
    pub async fn settled(&self) -> ListState {
        let mut rx = self.state.clone();
        let settled = rx.wait_for(|(_, state)| !state.is_loading()).await;
        match settled {
            Ok(current) => current.1.clone(),
            Err(_) => self.state(),
        }
    }

    /// Re-fetches the list even when the cached copy is fresh.
    pub fn reload(&self) {
        self.ctx.cache.invalidate(&[QueryKey::Users]);
    }

    /// Deletes `id`. The table refreshes from the invalidated `users` entry;
    /// a failure is reported through the notifier.
    pub async fn delete(&self, id: UserId) -> Result<(), ClientError> {
        info!(user_id = %id, "deleting user");
        match self.ctx.cache.mutate(Mutation::delete(id)).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.ctx.notify(Notice::error(err.user_message()));
                Err(err)
            }
        }
    }

    pub fn open_create(&self) {
        self.ctx.navigate(Route::CreateUser);
    }

    pub fn open_update(&self, id: UserId) {
        self.ctx.navigate(Route::UpdateUser(id));
    }
}

fn publish(tx: &watch::Sender<Versioned>, entry: &QueryEntry) {
    tx.send_if_modified(|current| {
        if current.0.is_some_and(|seen| entry.revision <= seen) {
            return false;
        }
        *current = (Some(entry.revision), ListState::from_entry(entry));
        true
    });
}
