//! postwatch: watches the ETS job portal for new postings.
//!
//! The poll loop ([`monitor`]) and the user-triggered apply action ([`apply`])
//! share one portal session, owned by [`session::SessionCoordinator`]. When the
//! portal rejects the cookie, the coordinator re-authenticates through
//! [`reauth`] under a cooldown.

pub mod apply;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod portal;
pub mod reauth;
pub mod scoring;
pub mod session;
pub mod store;
pub mod utils;

pub use error::{Error, Result};
