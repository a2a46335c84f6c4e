//! Use-case controllers for the three user screens.
//!
//! Each flow drives the [`QueryCache`](crate::cache::QueryCache) and reports
//! back through two collaborators the host supplies: a [`Navigator`] that
//! switches screens and a [`Notifier`] that shows transient messages.

use std::{fmt, sync::Arc};

use shared::domain::UserId;

use crate::cache::CacheHandle;

mod create;
mod list;
mod update;

pub use create::CreateFlow;
pub use list::{ListFlow, ListRow, ListState};
pub use update::{UpdateFlow, UpdateState};

pub const USER_CREATED_MESSAGE: &str = "User info submitted!";
pub const USER_UPDATED_MESSAGE: &str = "User info updated!";
pub const USER_NOT_FOUND_MESSAGE: &str = "User not found.";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    UserList,
    CreateUser,
    UpdateUser(UserId),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Self::UserList => "/users".to_string(),
            Self::CreateUser => "/users/create".to_string(),
            Self::UpdateUser(id) => format!("/users/update/{id}"),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient message for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Collaborators shared by every flow of one front end.
#[derive(Clone)]
pub struct FlowContext {
    pub cache: CacheHandle,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
}

impl FlowContext {
    pub fn new(
        cache: CacheHandle,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            cache,
            navigator,
            notifier,
        }
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    pub(crate) fn navigate(&self, route: Route) {
        tracing::debug!(route = %route, "navigating");
        self.navigator.navigate(route);
    }
}

#[cfg(test)]
#[path = "../tests/flows_tests.rs"]
mod tests;
