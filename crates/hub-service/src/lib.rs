//! Validation, authorization and orchestration over the community store.
//!
//! Every operation is synchronous and runs its store work to completion
//! before returning; async callers wrap calls in `spawn_blocking`.

mod bots;
mod communities;
mod dms;
mod emojis;
mod error;
mod invites;
mod messages;
mod permissions;
mod pins;
mod polls;
mod reactions;
mod scheduled;
mod threads;

use std::sync::Arc;

use hub_db::Database;

pub use bots::hash_api_key;
pub use error::{ServiceError, ServiceResult};

/// Who is performing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub user_id: String,
    pub username: String,
}

impl Author {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// Longest accepted message, thread reply or DM body, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;
/// Upper bound for one page of channel history.
pub const MAX_PAGE: u32 = 200;

#[derive(Clone)]
pub struct MessageService {
    db: Arc<Database>,
}

impl MessageService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

/// Trimmed, non-empty, at most `max` characters.
pub(crate) fn required_text(field: &str, value: &str, max: usize) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid(format!("{field} is required")));
    }
    if trimmed.chars().count() > max {
        return Err(ServiceError::invalid(format!(
            "{field} is longer than {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}
