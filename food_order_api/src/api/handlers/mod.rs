//! HTTP request handlers for all API endpoints.
//!
//! Each handler validates its input, checks the caller's permission class through the
//! [`crate::auth::permissions::RequiresPermission`] extractor, calls into
//! [`crate::db::storage::Storage`] and serializes the response. Emails and bulk imports are
//! handed to the task queue rather than run inline.
//!
//! - [`auth`]: login and token refresh
//! - [`users`]: registration, listing, profile updates and soft delete
//! - [`products`]: product catalogue CRUD
//! - [`orders`]: order placement, delivery status changes and OTP verification
//! - [`tasks`]: bulk product import and task progress polling
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching status code and
//! JSON body.

pub mod auth;
pub mod orders;
pub mod products;
pub mod tasks;
pub mod users;
