use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{classify, Delivery, Transport, WriteOutcome};
use crate::cache::{Bucket, SqliteCache};
use crate::config::Config;
use crate::endpoint::ReadResponse;
use crate::entity::{Module, SheetRecord};
use crate::error::{Result, TaqueroError};

/// Outcome of replaying the outbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sent: usize,
    pub dropped: usize,
    pub remaining: usize,
}

/// Client-side mirror of one module's sheet.
///
/// Reads degrade to the last-known-good records; writes are applied locally
/// first and then sent, and the caller learns whether each one was saved,
/// queued or rejected.
pub struct RecordStore<T: SheetRecord, X: Transport> {
    name: String,
    read_url: String,
    write_url: String,
    transport: X,
    cache: SqliteCache,
    records: Vec<T>,
    last_fetch_time: Option<DateTime<Utc>>,
    fetch_error: Option<String>,
}

impl<T: SheetRecord, X: Transport> RecordStore<T, X> {
    /// Open a store backed by the named cache bucket
    pub fn open(name: &str, url: &str, transport: X, cache: SqliteCache) -> Result<Self> {
        Self::open_with_write_url(name, url, url, transport, cache)
    }

    pub fn for_module(module: Module, config: &Config, transport: X, cache: SqliteCache) -> Result<Self> {
        Self::open(module.slug(), config.endpoint(module.slug()), transport, cache)
    }

    pub(crate) fn open_with_write_url(
        name: &str,
        read_url: &str,
        write_url: &str,
        transport: X,
        cache: SqliteCache,
    ) -> Result<Self> {
        let bucket = cache
            .load_bucket(name)?
            .unwrap_or_else(|| Bucket::empty(name));

        let mut records = Vec::with_capacity(bucket.records.len());
        for value in bucket.records {
            match serde_json::from_value::<T>(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(store = name, error = %e, "skipping unreadable cached record"),
            }
        }

        Ok(Self {
            name: name.to_string(),
            read_url: read_url.to_string(),
            write_url: write_url.to_string(),
            transport,
            cache,
            records,
            last_fetch_time: bucket.last_fetch_time,
            fetch_error: bucket.fetch_error,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
        self.last_fetch_time
    }

    pub fn fetch_error(&self) -> Option<&str> {
        self.fetch_error.as_deref()
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.cache.pending_count(&self.name)
    }

    /// Replace the cached records with the endpoint's current rows.
    ///
    /// On any failure the previous records stay in place and the error is
    /// kept in `fetch_error`.
    pub fn fetch_from_remote(&mut self) -> Result<usize> {
        match self.try_fetch() {
            Ok(records) => {
                let count = records.len();
                self.records = records;
                self.last_fetch_time = Some(Utc::now());
                self.fetch_error = None;
                self.persist()?;
                info!(store = %self.name, count, "fetched records");
                Ok(count)
            }
            Err(e) => {
                warn!(store = %self.name, error = %e, "fetch failed, keeping cached records");
                self.fetch_error = Some(e.to_string());
                self.persist()?;
                Err(e)
            }
        }
    }

    fn try_fetch(&self) -> Result<Vec<T>> {
        self.ensure_configured()?;

        let reply = self.transport.get(&self.read_url)?;
        let response: ReadResponse = serde_json::from_value(reply.body)
            .map_err(|e| TaqueroError::Transport(format!("unexpected read reply: {}", e)))?;

        if !response.success {
            return Err(TaqueroError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| format!("HTTP {}", reply.status)),
            ));
        }

        let mut records = Vec::new();
        for value in response.data.unwrap_or_default() {
            match serde_json::from_value::<T>(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(store = %self.name, error = %e, "skipping malformed row"),
            }
        }
        Ok(records)
    }

    /// Cached records, excluding soft-deleted ones
    pub fn records(&self) -> Vec<&T> {
        self.records.iter().filter(|r| !r.is_deleted()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records
            .iter()
            .find(|r| r.id() == id && !r.is_deleted())
    }

    pub fn find<P>(&self, predicate: P) -> Vec<&T>
    where
        P: Fn(&T) -> bool,
    {
        self.records
            .iter()
            .filter(|r| !r.is_deleted() && predicate(r))
            .collect()
    }

    /// Records created on a given (UTC) date
    pub fn records_on(&self, date: NaiveDate) -> Vec<&T> {
        self.find(|r| r.created_at().date_naive() == date)
    }

    /// Add a new record. Ids are checked for uniqueness against the cache.
    pub fn add(&mut self, record: T) -> Result<WriteOutcome> {
        self.ensure_configured()?;
        if self.records.iter().any(|r| r.id() == record.id()) {
            return Err(TaqueroError::DuplicateId(record.id().to_string()));
        }

        let snapshot = self.records.clone();
        let body = serde_json::to_value(&record)?;
        self.records.push(record);
        let url = self.write_url.clone();
        self.commit(&url, body, snapshot)
    }

    /// Replace an existing record by id
    pub fn update(&mut self, mut record: T) -> Result<WriteOutcome> {
        self.ensure_configured()?;
        let index = self.position(record.id())?;

        let snapshot = self.records.clone();
        record.touch(Utc::now());
        let body = serde_json::to_value(&record)?;
        self.records[index] = record;
        let url = self.write_url.clone();
        self.commit(&url, body, snapshot)
    }

    /// Soft-delete a record by id
    pub fn delete(&mut self, id: &str) -> Result<WriteOutcome> {
        self.ensure_configured()?;
        let index = self.position(id)?;

        let snapshot = self.records.clone();
        self.records[index].mark_deleted(Utc::now());
        let body = serde_json::to_value(&self.records[index])?;
        let url = self.write_url.clone();
        self.commit(&url, body, snapshot)
    }

    /// Replay queued writes in order. Stops at the first write that still
    /// cannot be delivered; writes the endpoint refuses are dropped.
    pub fn sync_pending(&mut self) -> Result<SyncReport> {
        self.ensure_configured()?;
        let mut report = SyncReport::default();

        for pending in self.cache.pending_writes(&self.name)? {
            match classify(self.transport.post(&pending.url, &pending.body)) {
                Delivery::Accepted(_) => {
                    self.cache.remove_pending(pending.seq)?;
                    report.sent += 1;
                }
                Delivery::Rejected(reason) => {
                    warn!(store = %self.name, seq = pending.seq, reason = %reason, "dropping rejected write");
                    self.cache.remove_pending(pending.seq)?;
                    report.dropped += 1;
                }
                Delivery::Retry(reason) => {
                    debug!(store = %self.name, seq = pending.seq, reason = %reason, "endpoint still unavailable");
                    break;
                }
            }
        }

        report.remaining = self.cache.pending_count(&self.name)?;
        info!(store = %self.name, sent = report.sent, dropped = report.dropped, remaining = report.remaining, "outbox synced");
        Ok(report)
    }

    /// Send a write whose optimistic change is already applied. A refused
    /// write restores `snapshot`; an undeliverable one is queued.
    pub(crate) fn commit(&mut self, url: &str, body: Value, snapshot: Vec<T>) -> Result<WriteOutcome> {
        match classify(self.transport.post(url, &body)) {
            Delivery::Accepted(message) => {
                self.persist()?;
                debug!(store = %self.name, "write saved");
                Ok(WriteOutcome::Saved { message })
            }
            Delivery::Retry(reason) => {
                let seq = self.cache.queue_write(&self.name, url, &body)?;
                self.persist()?;
                warn!(store = %self.name, seq, reason = %reason, "write queued");
                Ok(WriteOutcome::Queued { seq })
            }
            Delivery::Rejected(reason) => {
                self.records = snapshot;
                self.persist()?;
                warn!(store = %self.name, reason = %reason, "write rejected, local change rolled back");
                Err(TaqueroError::Rejected(reason))
            }
        }
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<T> {
        &mut self.records
    }

    pub(crate) fn read_url(&self) -> &str {
        &self.read_url
    }

    pub(crate) fn ensure_configured(&self) -> Result<()> {
        if self.read_url.trim().is_empty() {
            return Err(TaqueroError::EndpointNotConfigured(self.name.clone()));
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.records
            .iter()
            .position(|r| r.id() == id && !r.is_deleted())
            .ok_or_else(|| TaqueroError::RecordNotFound(id.to_string()))
    }

    fn persist(&self) -> Result<()> {
        let records = self
            .records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.cache.save_bucket(&Bucket {
            name: self.name.clone(),
            records,
            last_fetch_time: self.last_fetch_time,
            fetch_error: self.fetch_error.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeTransport;
    use crate::entity::{TemperatureLog, UnitKind};
    use serde_json::json;

    const URL: &str = "http://sheets.test/temperature-logs";

    fn log(temp: f64) -> TemperatureLog {
        TemperatureLog::new(UnitKind::Fridge, "Walk-in".to_string(), temp, "Ana".to_string())
    }

    fn store(transport: &FakeTransport) -> RecordStore<TemperatureLog, FakeTransport> {
        RecordStore::open(
            "temperature-logs",
            URL,
            transport.clone(),
            SqliteCache::open_in_memory().unwrap(),
        )
        .unwrap()
    }

    fn seeded(transport: &FakeTransport, count: usize) -> RecordStore<TemperatureLog, FakeTransport> {
        let rows: Vec<Value> = (0..count)
            .map(|i| serde_json::to_value(log(i as f64)).unwrap())
            .collect();
        transport.reply(200, json!({"success": true, "data": rows, "count": count}));

        let mut s = store(transport);
        s.fetch_from_remote().unwrap();
        s
    }

    #[test]
    fn test_fetch_replaces_records() {
        let transport = FakeTransport::default();
        let s = seeded(&transport, 3);

        assert_eq!(s.records().len(), 3);
        assert!(s.last_fetch_time().is_some());
        assert!(s.fetch_error().is_none());
    }

    #[test]
    fn test_failed_fetch_keeps_last_known_good() {
        let transport = FakeTransport::default();
        let mut s = seeded(&transport, 3);

        transport.fail("connection reset");
        let result = s.fetch_from_remote();

        assert!(result.is_err());
        assert_eq!(s.records().len(), 3);
        assert!(s.fetch_error().unwrap().contains("connection reset"));
    }

    #[test]
    fn test_failed_read_reply_keeps_records() {
        let transport = FakeTransport::default();
        let mut s = seeded(&transport, 2);

        transport.reply(500, json!({"success": false, "error": "Sheet not found"}));
        assert!(s.fetch_from_remote().is_err());
        assert_eq!(s.records().len(), 2);
        assert_eq!(s.fetch_error(), Some("Rejected by server: Sheet not found"));
    }

    #[test]
    fn test_missing_endpoint_short_circuits() {
        let transport = FakeTransport::default();
        let mut s: RecordStore<TemperatureLog, _> = RecordStore::open(
            "temperature-logs",
            "",
            transport.clone(),
            SqliteCache::open_in_memory().unwrap(),
        )
        .unwrap();

        assert!(matches!(
            s.fetch_from_remote(),
            Err(TaqueroError::EndpointNotConfigured(_))
        ));
        assert!(matches!(s.add(log(3.0)), Err(TaqueroError::EndpointNotConfigured(_))));
        assert_eq!(transport.request_count(), 0);
        assert!(s.fetch_error().is_some());
    }

    #[test]
    fn test_add_is_saved() {
        let transport = FakeTransport::default();
        let mut s = store(&transport);

        transport.reply(200, json!({"success": true, "message": "Created"}));
        let outcome = s.add(log(4.0)).unwrap();

        assert_eq!(outcome, WriteOutcome::Saved { message: Some("Created".to_string()) });
        assert_eq!(s.records().len(), 1);
        let requests = transport.requests.borrow();
        assert_eq!(requests[0].0, "POST");
        assert_eq!(requests[0].1, URL);
    }

    #[test]
    fn test_add_duplicate_id_rejected_locally() {
        let transport = FakeTransport::default();
        let mut s = store(&transport);
        let record = log(4.0);

        transport.reply(200, json!({"success": true}));
        s.add(record.clone()).unwrap();

        let result = s.add(record);
        assert!(matches!(result, Err(TaqueroError::DuplicateId(_))));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_rejected_add_rolls_back() {
        let transport = FakeTransport::default();
        let mut s = store(&transport);

        transport.reply(400, json!({"success": false, "error": "Missing required fields: location"}));
        let result = s.add(log(4.0));

        assert!(matches!(result, Err(TaqueroError::Rejected(_))));
        assert!(s.records().is_empty());
        assert_eq!(s.pending_count().unwrap(), 0);
    }

    #[test]
    fn test_unreachable_write_is_queued_then_synced() {
        let transport = FakeTransport::default();
        let mut s = store(&transport);

        transport.fail("offline");
        let outcome = s.add(log(4.0)).unwrap();
        assert!(matches!(outcome, WriteOutcome::Queued { .. }));
        assert_eq!(s.records().len(), 1);
        assert_eq!(s.pending_count().unwrap(), 1);

        transport.reply(200, json!({"success": true}));
        let report = s.sync_pending().unwrap();
        assert_eq!(report, SyncReport { sent: 1, dropped: 0, remaining: 0 });
    }

    #[test]
    fn test_sync_stops_at_first_undeliverable_write() {
        let transport = FakeTransport::default();
        let mut s = store(&transport);

        transport.fail("offline");
        s.add(log(1.0)).unwrap();
        transport.fail("offline");
        s.add(log(2.0)).unwrap();

        transport.reply(400, json!({"success": false, "error": "bad"}));
        transport.fail("still offline");
        let report = s.sync_pending().unwrap();

        assert_eq!(report, SyncReport { sent: 0, dropped: 1, remaining: 1 });
    }

    #[test]
    fn test_update_overwrites_in_place() {
        let transport = FakeTransport::default();
        let mut s = store(&transport);
        let mut record = log(4.0);

        transport.reply(200, json!({"success": true}));
        s.add(record.clone()).unwrap();

        record.temperature = 6.0;
        transport.reply(200, json!({"success": true}));
        s.update(record.clone()).unwrap();

        assert_eq!(s.records().len(), 1);
        assert_eq!(s.get(&record.base.id).unwrap().temperature, 6.0);
    }

    #[test]
    fn test_update_unknown_record_fails() {
        let transport = FakeTransport::default();
        let mut s = store(&transport);

        let result = s.update(log(4.0));
        assert!(matches!(result, Err(TaqueroError::RecordNotFound(_))));
    }

    #[test]
    fn test_soft_deleted_records_hidden() {
        let transport = FakeTransport::default();
        let mut s = seeded(&transport, 3);
        let id = s.records()[0].base.id.clone();

        transport.reply(200, json!({"success": true}));
        s.delete(&id).unwrap();

        assert_eq!(s.records().len(), 2);
        assert!(s.get(&id).is_none());
        let body = transport.requests.borrow()[1].2.clone().unwrap();
        assert_eq!(body["status"], "deleted");
    }

    #[test]
    fn test_cache_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transport = FakeTransport::default();
        {
            let mut s: RecordStore<TemperatureLog, _> = RecordStore::open(
                "temperature-logs",
                URL,
                transport.clone(),
                SqliteCache::open(tmp.path()).unwrap(),
            )
            .unwrap();
            transport.reply(200, json!({"success": true}));
            s.add(log(2.0)).unwrap();
        }

        let s: RecordStore<TemperatureLog, _> = RecordStore::open(
            "temperature-logs",
            URL,
            transport,
            SqliteCache::open(tmp.path()).unwrap(),
        )
        .unwrap();
        assert_eq!(s.records().len(), 1);
    }

    #[test]
    fn test_records_on_date() {
        let transport = FakeTransport::default();
        let s = seeded(&transport, 2);
        let today = Utc::now().date_naive();

        assert_eq!(s.records_on(today).len(), 2);
        assert!(s.records_on(today.pred_opt().unwrap()).is_empty());
    }
}
