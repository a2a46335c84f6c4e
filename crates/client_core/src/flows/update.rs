use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use shared::domain::UserId;
use tracing::{debug, info};

use crate::{
    api::QueryKey,
    cache::{Mutation, MutationOutput},
    form::{FormController, SubmitOutcome},
    validation::{user_values, ValidUser},
};

use super::{FlowContext, Notice, Route, USER_NOT_FOUND_MESSAGE, USER_UPDATED_MESSAGE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    LoadingUser,
    /// The record is loaded and the form seeded.
    Ready,
    Submitting,
    Done,
    /// The last submission was rejected; the form keeps the entered values.
    Failed(String),
    LoadFailed(String),
    NotFound,
}

impl UpdateState {
    fn accepts_submit(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadingUser => f.write_str("Loading..."),
            Self::Ready => f.write_str("Ready"),
            Self::Submitting => f.write_str("Submitting..."),
            Self::Done => f.write_str(USER_UPDATED_MESSAGE),
            Self::Failed(message) | Self::LoadFailed(message) => f.write_str(message),
            Self::NotFound => f.write_str(USER_NOT_FOUND_MESSAGE),
        }
    }
}

/// The "edit user" screen for one record.
pub struct UpdateFlow {
    ctx: FlowContext,
    id: UserId,
    form: FormController<ValidUser>,
    state: Mutex<UpdateState>,
}

impl UpdateFlow {
    pub fn mount(ctx: FlowContext, id: UserId) -> Self {
        Self {
            ctx,
            id,
            form: FormController::new(),
            state: Mutex::new(UpdateState::LoadingUser),
        }
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn form(&self) -> &FormController<ValidUser> {
        &self.form
    }

    pub fn state(&self) -> UpdateState {
        self.lock().clone()
    }

    /// Fetches the record and seeds the form from it. Only the first
    /// successful load seeds; later loads leave the operator's edits alone.
    pub async fn load(&self) -> UpdateState {
        let key = QueryKey::User(self.id.clone());
        let next = match self.ctx.cache.fetch(&key).await {
            Ok(data) => match data.as_user() {
                Some(user) => {
                    if self.form.seed(user_values(&user.fields)) {
                        debug!(user_id = %self.id, "seeded update form");
                    }
                    UpdateState::Ready
                }
                None => UpdateState::LoadFailed(format!("unexpected data for {key}")),
            },
            Err(err) if err.is_not_found() => UpdateState::NotFound,
            Err(err) => UpdateState::LoadFailed(err.user_message()),
        };

        let mut state = self.lock();
        if matches!(*state, UpdateState::Submitting | UpdateState::Done) {
            return state.clone();
        }
        if matches!(*state, UpdateState::Failed(_)) && next == UpdateState::Ready {
            return state.clone();
        }
        *state = next.clone();
        next
    }

    /// Validates the form and sends the update. Allowed only once the record
    /// has loaded.
    pub async fn submit(&self) -> SubmitOutcome<MutationOutput> {
        if !self.lock().accepts_submit() {
            return SubmitOutcome::Blocked;
        }
        let cache = self.ctx.cache.clone();
        let id = self.id.clone();
        let outcome = self
            .form
            .submit(|user| {
                self.set_state(UpdateState::Submitting);
                async move { cache.mutate(Mutation::update(id, user)).await }
            })
            .await;

        match &outcome {
            SubmitOutcome::Submitted(_) => {
                info!(user_id = %self.id, "user updated");
                self.set_state(UpdateState::Done);
                self.ctx.notify(Notice::success(USER_UPDATED_MESSAGE));
                self.ctx.navigate(Route::UserList);
            }
            SubmitOutcome::Rejected(err) => {
                let message = err.user_message();
                self.set_state(UpdateState::Failed(message.clone()));
                self.ctx.notify(Notice::error(message));
            }
            SubmitOutcome::Invalid(_) | SubmitOutcome::Blocked => {}
        }
        outcome
    }

    fn set_state(&self, next: UpdateState) {
        *self.lock() = next;
    }

    fn lock(&self) -> MutexGuard<'_, UpdateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
