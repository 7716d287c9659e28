use chrono::{DateTime, Utc};
use serde_json::json;

use super::{RecordStore, SyncReport, Transport, WriteOutcome};
use crate::cache::SqliteCache;
use crate::config::{proving_store_key, Config};
use crate::entity::{Batch, MethodStatus, ProvingKind, ProvingMethod, SheetRecord};
use crate::error::{Result, TaqueroError};

/// Client mirror of one proving kind: methods with their batches embedded.
pub struct ProvingStore<X: Transport> {
    kind: ProvingKind,
    inner: RecordStore<ProvingMethod, X>,
}

impl<X: Transport> ProvingStore<X> {
    pub fn open(kind: ProvingKind, url: &str, transport: X, cache: SqliteCache) -> Result<Self> {
        let base = url.trim_end_matches('/');
        let write_url = if base.is_empty() {
            String::new()
        } else {
            format!("{}/methods", base)
        };
        let inner = RecordStore::open_with_write_url(
            &proving_store_key(kind),
            base,
            &write_url,
            transport,
            cache,
        )?;
        Ok(Self { kind, inner })
    }

    pub fn for_kind(kind: ProvingKind, config: &Config, transport: X, cache: SqliteCache) -> Result<Self> {
        let url = config.endpoint(&proving_store_key(kind)).to_string();
        Self::open(kind, &url, transport, cache)
    }

    pub fn kind(&self) -> ProvingKind {
        self.kind
    }

    pub fn fetch_from_remote(&mut self) -> Result<usize> {
        self.inner.fetch_from_remote()
    }

    pub fn methods(&self) -> Vec<&ProvingMethod> {
        self.inner.records()
    }

    pub fn get(&self, id: &str) -> Option<&ProvingMethod> {
        self.inner.get(id)
    }

    pub fn methods_with_status(&self, status: MethodStatus) -> Vec<&ProvingMethod> {
        self.inner.find(|m| m.status == status)
    }

    pub fn create_method(&mut self, method: ProvingMethod) -> Result<WriteOutcome> {
        self.inner.add(method)
    }

    pub fn delete_method(&mut self, id: &str) -> Result<WriteOutcome> {
        self.inner.delete(id)
    }

    /// Record a batch against a cached method. The local copy is promoted
    /// the same way the endpoint promotes it, so a queued batch still shows
    /// its effect on the method.
    pub fn add_batch(&mut self, batch: Batch) -> Result<WriteOutcome> {
        self.inner.ensure_configured()?;
        let method_id = batch.method_id.clone();
        let index = self.method_index(&method_id)?;

        let snapshot = self.inner.records_mut().clone();
        let body = serde_json::to_value(&batch)?;
        self.inner.records_mut()[index].record_batch(batch, Utc::now());

        let url = format!("{}/batches", self.inner.read_url());
        self.inner.commit(&url, body, snapshot)
    }

    pub fn reset_method(&mut self, id: &str) -> Result<WriteOutcome> {
        self.inner.ensure_configured()?;
        let index = self.method_index(id)?;

        let snapshot = self.inner.records_mut().clone();
        self.inner.records_mut()[index].reset(Utc::now());

        let url = format!("{}/methods/{}/reset", self.inner.read_url(), id);
        self.inner.commit(&url, json!({ "id": id }), snapshot)
    }

    pub fn sync_pending(&mut self) -> Result<SyncReport> {
        self.inner.sync_pending()
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.inner.pending_count()
    }

    pub fn fetch_error(&self) -> Option<&str> {
        self.inner.fetch_error()
    }

    pub fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
        self.inner.last_fetch_time()
    }

    fn method_index(&mut self, id: &str) -> Result<usize> {
        self.inner
            .records_mut()
            .iter()
            .position(|m| m.id() == id && !m.is_deleted())
            .ok_or_else(|| TaqueroError::MethodNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeTransport;

    const URL: &str = "http://sheets.test/api/proving/cooling";

    fn store(transport: &FakeTransport) -> ProvingStore<FakeTransport> {
        ProvingStore::open(
            ProvingKind::Cooling,
            URL,
            transport.clone(),
            SqliteCache::open_in_memory().unwrap(),
        )
        .unwrap()
    }

    fn with_method(transport: &FakeTransport) -> (ProvingStore<FakeTransport>, String) {
        let mut s = store(transport);
        let method = ProvingMethod::new(
            "Chili".to_string(),
            "Ice bath then blast chiller".to_string(),
            "Chef".to_string(),
        );
        let id = method.id.clone();
        transport.reply(200, json!({"success": true}));
        s.create_method(method).unwrap();
        (s, id)
    }

    fn batch(method_id: &str, number: u32) -> Batch {
        let mut b = Batch::new(method_id.to_string(), number, "Sam".to_string());
        b.end_temp = 5.0;
        b
    }

    #[test]
    fn test_methods_posted_to_methods_url() {
        let transport = FakeTransport::default();
        let (s, _) = with_method(&transport);

        assert_eq!(s.methods().len(), 1);
        assert_eq!(transport.requests.borrow()[0].1, format!("{}/methods", URL));
    }

    #[test]
    fn test_third_batch_proves_method_locally() {
        let transport = FakeTransport::default();
        let (mut s, id) = with_method(&transport);

        for n in 1..=3 {
            transport.reply(200, json!({"success": true}));
            s.add_batch(batch(&id, n)).unwrap();
        }

        let method = s.get(&id).unwrap();
        assert_eq!(method.status, MethodStatus::Proven);
        assert!(method.proven_at.is_some());
        assert_eq!(s.methods_with_status(MethodStatus::Proven).len(), 1);
        assert_eq!(transport.requests.borrow()[1].1, format!("{}/batches", URL));
    }

    #[test]
    fn test_rejected_batch_rolls_back() {
        let transport = FakeTransport::default();
        let (mut s, id) = with_method(&transport);

        transport.reply(404, json!({"success": false, "error": "Method not found"}));
        let result = s.add_batch(batch(&id, 1));

        assert!(matches!(result, Err(TaqueroError::Rejected(_))));
        assert!(s.get(&id).unwrap().batches.is_empty());
    }

    #[test]
    fn test_batch_for_unknown_method() {
        let transport = FakeTransport::default();
        let mut s = store(&transport);

        let result = s.add_batch(batch("nope", 1));
        assert!(matches!(result, Err(TaqueroError::MethodNotFound(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_reset_posts_to_method_reset_url() {
        let transport = FakeTransport::default();
        let (mut s, id) = with_method(&transport);

        for n in 1..=3 {
            transport.reply(200, json!({"success": true}));
            s.add_batch(batch(&id, n)).unwrap();
        }
        transport.reply(200, json!({"success": true}));
        s.reset_method(&id).unwrap();

        let method = s.get(&id).unwrap();
        assert_eq!(method.status, MethodStatus::InProgress);
        assert!(method.batches.is_empty());
        let requests = transport.requests.borrow();
        assert_eq!(requests.last().unwrap().1, format!("{}/methods/{}/reset", URL, id));
    }

    #[test]
    fn test_queued_batch_still_counts_locally() {
        let transport = FakeTransport::default();
        let (mut s, id) = with_method(&transport);

        transport.fail("offline");
        let outcome = s.add_batch(batch(&id, 1)).unwrap();

        assert!(matches!(outcome, WriteOutcome::Queued { .. }));
        assert_eq!(s.get(&id).unwrap().batches.len(), 1);
        assert_eq!(s.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_unconfigured_kind() {
        let transport = FakeTransport::default();
        let mut s = ProvingStore::open(
            ProvingKind::Cooking,
            "",
            transport.clone(),
            SqliteCache::open_in_memory().unwrap(),
        )
        .unwrap();

        assert!(matches!(
            s.fetch_from_remote(),
            Err(TaqueroError::EndpointNotConfigured(_))
        ));
        assert_eq!(transport.request_count(), 0);
    }
}
