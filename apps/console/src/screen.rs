use std::sync::{Mutex, PoisonError};

use client_core::{
    flows::ListRow, FieldErrors, ListState, Navigator, Notice, NoticeLevel, Notifier, Route,
};
use shared::domain::UserRecord;
use tracing::debug;

/// Terminal stand-in for the browser: notices go to stdout/stderr and the
/// last requested route is kept for `main` to act on.
#[derive(Default)]
pub struct ConsoleScreen {
    route: Mutex<Option<Route>>,
}

impl ConsoleScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_route(&self) -> Option<Route> {
        self.route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Navigator for ConsoleScreen {
    fn navigate(&self, route: Route) {
        debug!(%route, "route requested");
        *self.route.lock().unwrap_or_else(PoisonError::into_inner) = Some(route);
    }
}

impl Notifier for ConsoleScreen {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => println!("{}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
}

pub fn render_list(state: &ListState, rows: &[ListRow]) -> String {
    match state {
        ListState::Loading => "Loading...".to_string(),
        ListState::Empty => "No users yet. Add one with `create`.".to_string(),
        ListState::Error(message) => format!("Could not load users: {message}"),
        ListState::Populated(_) => {
            let mut out = format!(
                "{:>3}  {:<24}  {:<28}  {:<10}  {}",
                "#", "Name", "Email", "Phone", "Id"
            );
            for row in rows {
                out.push('\n');
                out.push_str(&format!(
                    "{:>3}  {:<24}  {:<28}  {:<10}  {}",
                    row.index,
                    row.user.full_name(),
                    row.user.fields.email,
                    row.user.fields.phone,
                    row.user.id
                ));
            }
            out
        }
    }
}

pub fn render_user(user: &UserRecord) -> String {
    format!(
        "id:         {}\nfirst name: {}\nlast name:  {}\nemail:      {}\nphone:      {}",
        user.id, user.fields.first_name, user.fields.last_name, user.fields.email, user.fields.phone
    )
}

pub fn render_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("  {field}: {message}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "tests/screen_tests.rs"]
mod tests;
