//! Domain model shared by discovery, extraction and persistence
//!
//! This module defines accounts on the tracked roster, extracted posts,
//! session credentials and the per-cycle summary.

mod account;
mod credential;
mod post;

pub use account::{Account, InaccessibleKind, ACCOUNT_NOT_ACCESSIBLE};
pub use credential::{Credential, SessionCredential};
pub use post::{Author, Metrics, Post, PostId};
