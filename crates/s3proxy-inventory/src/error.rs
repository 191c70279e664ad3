//! Inventory store errors.

use thiserror::Error;

/// Errors surfaced by [`crate::InventoryStore`].
///
/// These never cross the dispatcher boundary as an HTTP response — the
/// dispatcher only logs them (spec: "recovery is local to the async
/// continuation").
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory database error: {0}")]
    Database(#[from] sqlx::Error),
}
