//! Ingest gate — atomic identity-key reservation against the durable store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::ingest::types::{DuplicateKind, IngestOutcome, Message, RawMessage};
use crate::store::Database;

/// Deduplicating ingest gate.
///
/// Reservation is a single conditional insert on the store, so concurrent
/// ingestion of the same key from multiple fetch sources resolves to exactly
/// one accepted message — there is no read-then-write window.
pub struct IngestGate {
    store: Arc<dyn Database>,
}

impl IngestGate {
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self { store }
    }

    /// Ingest a raw message.
    ///
    /// Returns `Accepted` with the stored message, or `Duplicate` when the
    /// identity key is already reserved. A duplicate bumps the key's
    /// seen-again counter and has no other side effect.
    pub async fn ingest(&self, raw: RawMessage) -> Result<IngestOutcome, DatabaseError> {
        let key = raw.identity_key();
        let kind = if raw.provider_message_id.as_deref().is_some_and(|id| !id.trim().is_empty()) {
            DuplicateKind::ProviderId
        } else {
            DuplicateKind::ContentKey
        };

        let reserved = self.store.reserve_identity_key(&key).await?;
        if !reserved {
            debug!(key = %key, sender = %raw.sender, "Duplicate message ignored");
            return Ok(IngestOutcome::Duplicate(kind));
        }

        let message = Message::from_raw(raw);
        if let Err(e) = self.store.insert_message(&message).await {
            // Hand the key back so a redelivery of this email is accepted
            // instead of reported as a duplicate of a message that was
            // never stored.
            if let Err(release_err) = self.store.release_identity_key(&key).await {
                warn!(key = %key, error = %release_err, "Failed to release key after insert error");
            }
            return Err(e);
        }

        info!(
            id = %message.id,
            sender = %message.sender,
            subject = %message.subject,
            "Message accepted"
        );
        Ok(IngestOutcome::Accepted(message))
    }
}
