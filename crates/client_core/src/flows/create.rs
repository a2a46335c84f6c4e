use tracing::info;

use crate::{
    cache::{Mutation, MutationOutput},
    form::{FormController, SubmitOutcome},
    validation::ValidUser,
};

use super::{FlowContext, Notice, Route, USER_CREATED_MESSAGE};

/// The "new user" screen.
pub struct CreateFlow {
    ctx: FlowContext,
    form: FormController<ValidUser>,
}

impl CreateFlow {
    pub fn mount(ctx: FlowContext) -> Self {
        Self {
            ctx,
            form: FormController::new(),
        }
    }

    pub fn form(&self) -> &FormController<ValidUser> {
        &self.form
    }

    /// Validates the draft and posts it. On success the draft is cleared and
    /// the list is shown; on failure the draft stays as entered.
    pub async fn submit(&self) -> SubmitOutcome<MutationOutput> {
        let cache = self.ctx.cache.clone();
        let outcome = self
            .form
            .submit(|user| async move { cache.mutate(Mutation::create(user)).await })
            .await;

        match &outcome {
            SubmitOutcome::Submitted(_) => {
                info!("user created");
                self.ctx.notify(Notice::success(USER_CREATED_MESSAGE));
                self.ctx.navigate(Route::UserList);
            }
            SubmitOutcome::Rejected(err) => {
                self.ctx.notify(Notice::error(err.user_message()));
            }
            SubmitOutcome::Invalid(_) | SubmitOutcome::Blocked => {}
        }
        outcome
    }
}
