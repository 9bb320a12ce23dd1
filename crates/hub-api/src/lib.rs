pub mod auth;
pub mod bots;
pub mod communities;
pub mod dms;
pub mod error;
pub mod invites;
pub mod messages;
pub mod middleware;
pub mod polls;
pub mod reactions;
pub mod roles;
pub mod router;
pub mod scheduled;

pub use auth::{AppState, AppStateInner};
pub use router::build_router;
