//! # Audit Log
use crate::cursor::Cursor;
use crate::error::AuditError;
use crate::event::{DeliveryEvent, DeliveryEventDraft};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 20;

// ============================================================================
// EventPage
// ============================================================================

/// One page of delivery events plus the token for the next page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    pub data: Vec<DeliveryEvent>,
    pub cursor: Option<String>,
}

// ============================================================================
// AuditStore trait
// ============================================================================
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a new record. Records are never overwritten.
    async fn insert(&self, event: &DeliveryEvent) -> Result<(), AuditError>;

    /// Return up to `limit` records of one subscription strictly after `after`,
    /// ordered by `(created_at, event_id)`.
    async fn scan(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        after: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<DeliveryEvent>, AuditError>;

    /// Fetch a single record.
    async fn get(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        event_id: &str,
    ) -> Result<Option<DeliveryEvent>, AuditError>;
}

// ============================================================================
// InMemoryAuditStore
// ============================================================================
type Partition = BTreeMap<(OffsetDateTime, String), DeliveryEvent>;

#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditStore {
    partitions: Arc<Mutex<HashMap<(String, String), Partition>>>,
}

impl InMemoryAuditStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of all stored records (for test assertions).
    pub fn snapshot(&self) -> Vec<DeliveryEvent> {
        self.partitions
            .lock()
            .map(|partitions| {
                partitions
                    .values()
                    .flat_map(|p| p.values().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), Partition>>, AuditError> {
        self.partitions
            .lock()
            .map_err(|e| AuditError::Store(format!("InMemoryAuditStore lock poisoned: {e}")))
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, event: &DeliveryEvent) -> Result<(), AuditError> {
        let mut partitions = self.lock()?;
        let partition = partitions
            .entry((event.tenant_id.clone(), event.webhook_id.clone()))
            .or_default();

        if partition.values().any(|e| e.event_id == event.event_id) {
            return Err(AuditError::Duplicate(event.event_id.clone()));
        }

        partition.insert(Cursor::key_of(event), event.clone());
        Ok(())
    }

    async fn scan(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        after: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<DeliveryEvent>, AuditError> {
        let partitions = self.lock()?;
        let Some(partition) = partitions.get(&(tenant_id.to_string(), webhook_id.to_string()))
        else {
            return Ok(Vec::new());
        };

        let lower = match after {
            Some(c) => Bound::Excluded((c.created_at, c.event_id.clone())),
            None => Bound::Unbounded,
        };

        Ok(partition
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn get(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        event_id: &str,
    ) -> Result<Option<DeliveryEvent>, AuditError> {
        let partitions = self.lock()?;
        Ok(partitions
            .get(&(tenant_id.to_string(), webhook_id.to_string()))
            .and_then(|p| p.values().find(|e| e.event_id == event_id).cloned()))
    }
}

// ============================================================================
// AuditLog
// ============================================================================

/// Append-only log of delivery outcomes with cursor pagination.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Record an outcome, generating `event_id` when the draft has none.
    pub async fn append(&self, draft: DeliveryEventDraft) -> Result<DeliveryEvent, AuditError> {
        let event = draft.into_event();
        self.store.insert(&event).await?;
        debug!(
            tenant_id = %event.tenant_id,
            webhook_id = %event.webhook_id,
            event_id = %event.event_id,
            status = %event.status,
            "Delivery event recorded"
        );
        Ok(event)
    }

    /// List a subscription's events oldest first.
    ///
    /// `limit` defaults to [`DEFAULT_PAGE_SIZE`]; a page never holds more than `limit` events.
    /// The returned cursor is `None` once the last page has been served.
    pub async fn list(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<EventPage, AuditError> {
        let limit = match limit {
            Some(0) => return Err(AuditError::InvalidLimit(0)),
            Some(n) => n,
            None => DEFAULT_PAGE_SIZE,
        };

        let after = cursor
            .filter(|c| !c.is_empty())
            .map(Cursor::decode)
            .transpose()?;

        // One extra row tells us whether another page exists.
        let mut data = self
            .store
            .scan(tenant_id, webhook_id, after.as_ref(), limit.saturating_add(1))
            .await?;

        let cursor = if data.len() > limit {
            data.truncate(limit);
            data.last().map(Cursor::after).map(|c| c.encode()).transpose()?
        } else {
            None
        };

        Ok(EventPage { data, cursor })
    }

    pub async fn get_by_id(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        event_id: &str,
    ) -> Result<DeliveryEvent, AuditError> {
        self.store
            .get(tenant_id, webhook_id, event_id)
            .await?
            .ok_or_else(|| AuditError::NotFound(event_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DeliveryEventStatus;
    use serde_json::json;
    use time::Duration;
    use time::macros::datetime;

    fn log_with_store() -> (AuditLog, InMemoryAuditStore) {
        let store = InMemoryAuditStore::new();
        (AuditLog::new(Arc::new(store.clone())), store)
    }

    fn draft(webhook_id: &str, n: i64) -> DeliveryEventDraft {
        DeliveryEventDraft::new(
            "tenant-1",
            webhook_id,
            format!("msg_{n}"),
            "user.created",
            DeliveryEventStatus::Success,
            json!({"n": n}),
        )
        .with_created_at(datetime!(2025-03-01 00:00:00 UTC) + Duration::seconds(n))
    }

    async fn seed(log: &AuditLog, webhook_id: &str, count: i64) -> Vec<DeliveryEvent> {
        let mut events = Vec::new();
        for n in 0..count {
            events.push(log.append(draft(webhook_id, n)).await.unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_append_generates_event_id() {
        let (log, store) = log_with_store();
        let event = log.append(draft("wh-1", 0)).await.unwrap();

        assert!(!event.event_id.is_empty());
        assert_eq!(store.snapshot(), vec![event]);
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_event_id() {
        let (log, _) = log_with_store();
        log.append(draft("wh-1", 0).with_event_id("evt-1"))
            .await
            .unwrap();

        let again = log.append(draft("wh-1", 1).with_event_id("evt-1")).await;
        assert!(matches!(again, Err(AuditError::Duplicate(id)) if id == "evt-1"));
    }

    #[tokio::test]
    async fn test_list_orders_by_creation_time() {
        let (log, _) = log_with_store();
        // Appended out of order on purpose.
        for n in [3, 1, 2, 0] {
            log.append(draft("wh-1", n)).await.unwrap();
        }

        let page = log.list("tenant-1", "wh-1", None, None).await.unwrap();
        let ids: Vec<_> = page.data.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(ids, vec!["msg_0", "msg_1", "msg_2", "msg_3"]);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn test_default_page_size() {
        let (log, _) = log_with_store();
        seed(&log, "wh-1", 25).await;

        let page = log.list("tenant-1", "wh-1", None, None).await.unwrap();
        assert_eq!(page.data.len(), DEFAULT_PAGE_SIZE);
        assert!(page.cursor.is_some());
    }

    #[tokio::test]
    async fn test_cursor_chaining_matches_single_page() {
        let (log, _) = log_with_store();
        let seeded = seed(&log, "wh-1", 150).await;

        let full = log.list("tenant-1", "wh-1", Some(150), None).await.unwrap();
        assert_eq!(full.data.len(), 150);
        assert!(full.cursor.is_none());

        let mut chained = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = log
                .list("tenant-1", "wh-1", Some(1), cursor.as_deref())
                .await
                .unwrap();
            chained.extend(page.data);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(chained, full.data);
        assert_eq!(chained, seeded);
    }

    #[tokio::test]
    async fn test_same_timestamp_events_are_not_skipped() {
        let (log, _) = log_with_store();
        let at = datetime!(2025-03-01 00:00:00 UTC);
        for id in ["b", "a", "c"] {
            log.append(draft("wh-1", 0).with_event_id(id).with_created_at(at))
                .await
                .unwrap();
        }

        let first = log.list("tenant-1", "wh-1", Some(2), None).await.unwrap();
        let second = log
            .list("tenant-1", "wh-1", Some(2), first.cursor.as_deref())
            .await
            .unwrap();

        let ids: Vec<_> = first
            .data
            .iter()
            .chain(second.data.iter())
            .map(|e| e.event_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_subscription_and_tenant() {
        let (log, _) = log_with_store();
        seed(&log, "wh-1", 2).await;
        seed(&log, "wh-2", 3).await;

        let page = log.list("tenant-1", "wh-2", None, None).await.unwrap();
        assert_eq!(page.data.len(), 3);

        let other_tenant = log.list("tenant-2", "wh-2", None, None).await.unwrap();
        assert!(other_tenant.data.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let (log, _) = log_with_store();
        let result = log.list("tenant-1", "wh-1", Some(0), None).await;
        assert!(matches!(result, Err(AuditError::InvalidLimit(0))));
    }

    #[tokio::test]
    async fn test_invalid_cursor_rejected() {
        let (log, _) = log_with_store();
        let result = log.list("tenant-1", "wh-1", None, Some("%%%")).await;
        assert!(matches!(result, Err(AuditError::InvalidCursor(_))));
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let (log, _) = log_with_store();
        let event = log.append(draft("wh-1", 0)).await.unwrap();

        let found = log
            .get_by_id("tenant-1", "wh-1", &event.event_id)
            .await
            .unwrap();
        assert_eq!(found, event);

        let missing = log.get_by_id("tenant-1", "wh-1", "nope").await;
        assert!(matches!(missing, Err(AuditError::NotFound(_))));

        let wrong_webhook = log.get_by_id("tenant-1", "wh-2", &event.event_id).await;
        assert!(matches!(wrong_webhook, Err(AuditError::NotFound(_))));
    }
}
