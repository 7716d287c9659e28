use std::env;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cache::SqliteCache;
use crate::client::{HttpTransport, ProvingStore, RecordStore, SyncReport, WriteOutcome};
use crate::config::{proving_store_key, Config};
use crate::endpoint::{self, proving};
use crate::entity::{
    new_record_id, Batch, CleaningTask, IncidentReport, MethodStatus, Module, ProvingKind,
    SheetRecord, StaffSickness, Supplier, TemperatureLog, PROVING_BATCH_COUNT,
};
use crate::error::{Result, TaqueroError};
use crate::server;
use crate::storage::{LoroSheetStore, TAQUERO_DIR};

/// Find the project root by looking for .taquero/ or .git/
fn find_project_root() -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut current = cwd.as_path();
    loop {
        if current.join(TAQUERO_DIR).exists() || current.join(".git").exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return cwd,
        }
    }
}

fn parse_module(s: &str) -> Result<Module> {
    s.parse()
        .map_err(|_| TaqueroError::UnknownModule(s.to_string()))
}

fn parse_kind(s: &str) -> Result<ProvingKind> {
    s.parse()
        .map_err(|_| TaqueroError::UnknownModule(format!("proving/{}", s)))
}

pub fn handle_init(bind: Option<String>) -> Result<()> {
    let root = env::current_dir()?;

    let store = LoroSheetStore::init(&root)?;
    let bind = bind.unwrap_or_else(|| crate::config::DEFAULT_BIND.to_string());
    let config = Config::for_local_server(&bind);
    if let Some(data_dir) = store.data_dir() {
        config.save(data_dir)?;
    }

    println!("Initialized taquero project in {}", root.display());
    println!("  record service address: {}", bind);

    Ok(())
}

pub fn handle_serve(bind: Option<String>) -> Result<()> {
    let root = find_project_root();
    let store = LoroSheetStore::open(&root)?;
    let mut config = Config::load(&root.join(TAQUERO_DIR))?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::start_server(&config, store))
}

pub fn handle_modules(json: bool) -> Result<()> {
    if json {
        let modules: Vec<Value> = Module::ALL
            .iter()
            .map(|m| {
                json!({
                    "slug": m.slug(),
                    "sheet": m.sheet_name(),
                    "requiredFields": m.required_fields(),
                })
            })
            .collect();
        let kinds: Vec<&str> = ProvingKind::ALL.iter().map(|k| k.slug()).collect();
        let output = json!({ "modules": modules, "proving": kinds });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Modules:\n");
    for m in Module::ALL {
        println!("  {:<20} sheet {:<18} requires {}", m.slug(), m.sheet_name(), m.required_fields().join(", "));
    }
    println!("\nProving:\n");
    for k in ProvingKind::ALL {
        println!("  {:<20} sheets {} / {}", k.slug(), k.methods_sheet(), k.batches_sheet());
    }

    Ok(())
}

pub fn handle_list(module: String, json: bool) -> Result<()> {
    let module = parse_module(&module)?;
    let root = find_project_root();
    let store = LoroSheetStore::open(&root)?;

    let rows = endpoint::read_rows(&store, module.sheet_name(), module.sort_key())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No {} found.", module);
    } else {
        println!("{}:\n", module);
        for row in &rows {
            println!("  {}", summarize(row, module.required_fields()));
        }
    }

    Ok(())
}

/// One line per row: id followed by the module's other required columns.
fn summarize(row: &Map<String, Value>, fields: &[&str]) -> String {
    let id = row.get("id").map(display_value).unwrap_or_default();
    let rest: Vec<String> = fields
        .iter()
        .filter(|f| **f != "id")
        .map(|f| row.get(*f).map(display_value).unwrap_or_else(|| "-".to_string()))
        .collect();
    format!("{} | {}", id, rest.join(" | "))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn handle_add(
    module: String,
    fields: Vec<String>,
    stdin: bool,
    remote: bool,
    json: bool,
) -> Result<()> {
    let module = parse_module(&module)?;
    let mut row = Map::new();

    if stdin {
        if atty::is(atty::Stream::Stdin) {
            return Err(TaqueroError::InvalidRow(
                "--stdin expects a JSON object piped in".to_string(),
            ));
        }
        let mut content = String::new();
        io::stdin().read_to_string(&mut content)?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(obj) => row.extend(obj),
            _ => {
                return Err(TaqueroError::InvalidRow(
                    "stdin must hold a JSON object".to_string(),
                ))
            }
        }
    }

    for field in &fields {
        let (key, value) = parse_field(field)?;
        row.insert(key, value);
    }

    if !row.contains_key("id") {
        row.insert("id".to_string(), Value::String(new_record_id()));
    }

    if remote {
        return add_remote(module, row, json);
    }

    let root = find_project_root();
    let store = LoroSheetStore::open(&root)?;

    let receipt = endpoint::write(&store, module, Value::Object(row))?;
    store.save()?;

    let stored = store
        .get(module.sheet_name(), &receipt.id)?
        .map(|s| Value::Object(s.row))
        .unwrap_or(Value::Null);
    if module == Module::TemperatureLogs {
        warn_if_unsafe(&stored);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else {
        println!("{}", receipt.message);
    }

    Ok(())
}

fn warn_if_unsafe(reading: &Value) {
    if let Ok(log) = serde_json::from_value::<TemperatureLog>(reading.clone()) {
        if !log.is_safe() && log.corrective_action.is_none() {
            eprintln!(
                "Warning: {:.1}C is outside the safe range for a {} with no corrective action recorded",
                log.temperature, log.unit
            );
        }
    }
}

/// Parse `key=value`. Numbers, booleans and null are taken as JSON; anything
/// else is a string.
pub(crate) fn parse_field(s: &str) -> Result<(String, Value)> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| TaqueroError::InvalidRow(format!("Invalid field format: {} (expected key=value)", s)))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(TaqueroError::InvalidRow(format!("Empty field name in: {}", s)));
    }

    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
        _ => Value::String(raw.to_string()),
    };

    Ok((key.to_string(), value))
}

pub fn handle_delete(module: String, id: String, force: bool, remote: bool) -> Result<()> {
    let module = parse_module(&module)?;

    if remote {
        return delete_remote(module, id, force);
    }

    let root = find_project_root();
    let store = LoroSheetStore::open(&root)?;

    let existing = store
        .get(module.sheet_name(), &id)?
        .filter(|s| !endpoint::is_deleted(&s.row))
        .ok_or_else(|| TaqueroError::RecordNotFound(id.clone()))?;

    if !force && !confirm_delete(module, &existing.row)? {
        println!("Cancelled.");
        return Ok(());
    }

    let mut row = existing.row;
    row.insert("status".to_string(), Value::String("deleted".to_string()));
    let receipt = endpoint::write(&store, module, Value::Object(row))?;
    store.save()?;

    println!("{}", receipt.message);
    Ok(())
}

/// Prompt on a terminal; refuse outright when nobody can answer.
fn confirm_delete(module: Module, row: &Map<String, Value>) -> Result<bool> {
    eprintln!(
        "Delete {} {}? [y/N] ",
        module,
        summarize(row, module.required_fields())
    );

    if !atty::is(atty::Stream::Stdin) {
        return Err(TaqueroError::InvalidRow(
            "Use --force to delete in non-interactive mode".to_string(),
        ));
    }

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

pub fn handle_proving_list(kind: String, status: Option<String>, json: bool) -> Result<()> {
    let kind = parse_kind(&kind)?;
    let status = status
        .map(|s| s.parse::<MethodStatus>().map_err(TaqueroError::InvalidRow))
        .transpose()?;
    let root = find_project_root();
    let store = LoroSheetStore::open(&root)?;

    let methods: Vec<_> = proving::load_methods(&store, kind)?
        .into_iter()
        .filter(|m| status.map_or(true, |s| m.status == s))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&methods)?);
    } else if methods.is_empty() {
        println!("No {} methods found.", kind);
    } else {
        println!("{} methods:\n", kind);
        for m in &methods {
            println!(
                "  {} [{}] {} ({}/{} batches)",
                &m.id, m.status, m.food_item, m.batches.len(), PROVING_BATCH_COUNT
            );
            if let Some(proven_at) = m.proven_at {
                println!("      proven {}", proven_at.format("%Y-%m-%d %H:%M"));
            }
        }
    }

    Ok(())
}

pub fn handle_proving_create(
    kind: String,
    food_item: String,
    description: String,
    by: String,
    json: bool,
) -> Result<()> {
    let kind = parse_kind(&kind)?;
    let root = find_project_root();
    let store = LoroSheetStore::open(&root)?;

    let body = json!({
        "id": new_record_id(),
        "foodItem": food_item,
        "description": description,
        "createdBy": by,
    });
    let receipt = proving::write_method(&store, kind, body)?;
    store.save()?;

    if json {
        let method = proving::load_method(&store, kind, &receipt.id)?;
        println!("{}", serde_json::to_string_pretty(&method)?);
    } else {
        println!("{}", receipt.message);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn handle_proving_batch(
    kind: String,
    method_id: String,
    end_temp: f64,
    by: String,
    number: Option<u32>,
    date: Option<String>,
    start_time: Option<String>,
    start_temp: Option<f64>,
    end_time: Option<String>,
    notes: Option<String>,
    remote: bool,
    json: bool,
) -> Result<()> {
    let kind = parse_kind(&kind)?;
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map_err(|e| TaqueroError::InvalidRow(format!("Invalid date '{}': {}", d, e)))?,
        None => Utc::now().date_naive(),
    };

    let make_batch = |next_number: u32| {
        let mut batch = Batch::new(method_id.clone(), number.unwrap_or(next_number), by);
        batch.date = date;
        batch.end_temp = end_temp;
        batch.start_time = start_time.unwrap_or_default();
        batch.start_temp = start_temp.unwrap_or_default();
        batch.end_time = end_time.unwrap_or_default();
        batch.notes = notes;
        batch
    };

    if remote {
        return batch_remote(kind, &method_id, make_batch, json);
    }

    let root = find_project_root();
    let store = LoroSheetStore::open(&root)?;

    let method = proving::load_method(&store, kind, &method_id)?;
    let batch = make_batch(method.next_batch_number());
    let receipt = proving::record_batch(&store, kind, serde_json::to_value(&batch)?)?;
    store.save()?;
    warn_if_target_missed(kind, &batch);

    if json {
        let method = proving::load_method(&store, kind, &receipt.method_id)?;
        println!("{}", serde_json::to_string_pretty(&method)?);
    } else {
        println!("{}", receipt.message);
    }

    Ok(())
}

fn warn_if_target_missed(kind: ProvingKind, batch: &Batch) {
    if !kind.target_met(batch) {
        eprintln!(
            "Warning: end temperature {:.1}C misses the {} target",
            batch.end_temp, kind
        );
    }
}

pub fn handle_proving_reset(kind: String, method_id: String) -> Result<()> {
    let kind = parse_kind(&kind)?;
    let root = find_project_root();
    let store = LoroSheetStore::open(&root)?;

    let receipt = proving::reset_method(&store, kind, &method_id)?;
    store.save()?;

    println!("{}", receipt.message);
    Ok(())
}

/// A client cache target: a record module or a proving kind
enum StoreTarget {
    Module(Module),
    Proving(ProvingKind),
}

fn parse_target(s: &str) -> Result<StoreTarget> {
    if let Some(kind) = s.strip_prefix("proving-") {
        return parse_kind(kind).map(StoreTarget::Proving);
    }
    if let Ok(module) = s.parse::<Module>() {
        return Ok(StoreTarget::Module(module));
    }
    match s.parse::<ProvingKind>() {
        Ok(kind) => Ok(StoreTarget::Proving(kind)),
        Err(_) => Err(TaqueroError::UnknownModule(s.to_string())),
    }
}

/// Everything a client command needs: config, transport and cache.
struct ClientContext {
    config: Config,
    transport: HttpTransport,
    cache: SqliteCache,
}

impl ClientContext {
    fn open() -> Result<Self> {
        let root = find_project_root();
        let data_dir = root.join(TAQUERO_DIR);
        if !data_dir.exists() {
            return Err(TaqueroError::NotInitialized);
        }
        Self::open_in(&data_dir)
    }

    fn open_in(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        let transport = HttpTransport::new(
            Duration::from_secs(config.client.request_timeout_secs),
            config.server.api_key.clone(),
        );
        let cache = SqliteCache::open(data_dir)?;
        debug!(data_dir = %data_dir.display(), "client context opened");
        Ok(Self {
            config,
            transport,
            cache,
        })
    }

    fn records<T: SheetRecord>(self, module: Module) -> Result<RecordStore<T, HttpTransport>> {
        RecordStore::for_module(module, &self.config, self.transport, self.cache)
    }

    fn proving(self, kind: ProvingKind) -> Result<ProvingStore<HttpTransport>> {
        ProvingStore::for_kind(kind, &self.config, self.transport, self.cache)
    }
}

/// Run a generic client operation with the record type of a module.
macro_rules! with_record_type {
    ($module:expr, $f:ident ( $($arg:expr),* )) => {
        match $module {
            Module::TemperatureLogs => $f::<TemperatureLog>($($arg),*),
            Module::CleaningChecklists => $f::<CleaningTask>($($arg),*),
            Module::IncidentReports => $f::<IncidentReport>($($arg),*),
            Module::Suppliers => $f::<Supplier>($($arg),*),
            Module::StaffSickness => $f::<StaffSickness>($($arg),*),
        }
    };
}

pub fn handle_fetch(store: String) -> Result<()> {
    let target = parse_target(&store)?;
    let ctx = ClientContext::open()?;

    let count = match target {
        StoreTarget::Module(module) => with_record_type!(module, fetch_module(ctx, module))?,
        StoreTarget::Proving(kind) => ctx.proving(kind)?.fetch_from_remote()?,
    };

    println!("Fetched {} records into {}", count, store);
    Ok(())
}

fn fetch_module<T: SheetRecord>(ctx: ClientContext, module: Module) -> Result<usize> {
    ctx.records::<T>(module)?.fetch_from_remote()
}

pub fn handle_cached(store: String, json: bool) -> Result<()> {
    let target = parse_target(&store)?;
    let ctx = ClientContext::open()?;

    let view = match target {
        StoreTarget::Module(module) => with_record_type!(module, cached_module(ctx, module))?,
        StoreTarget::Proving(kind) => {
            let s = ctx.proving(kind)?;
            CachedView {
                name: proving_store_key(kind),
                records: s
                    .methods()
                    .into_iter()
                    .map(serde_json::to_value)
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                last_fetch_time: s.last_fetch_time().map(|t| t.to_rfc3339()),
                fetch_error: s.fetch_error().map(str::to_string),
                pending: s.pending_count()?,
            }
        }
    };

    if json {
        let output = json!({
            "store": view.name,
            "lastFetchTime": view.last_fetch_time,
            "fetchError": view.fetch_error,
            "pending": view.pending,
            "records": view.records,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} ({} cached records)", view.name, view.records.len());
    println!(
        "  last fetch: {}",
        view.last_fetch_time.as_deref().unwrap_or("never")
    );
    if let Some(err) = &view.fetch_error {
        println!("  fetch error: {}", err);
    }
    if view.pending > 0 {
        println!("  pending writes: {}", view.pending);
    }
    for record in &view.records {
        let id = record.get("id").map(display_value).unwrap_or_default();
        let created = record.get("createdAt").map(display_value).unwrap_or_default();
        println!("  {} ({})", id, created);
    }

    Ok(())
}

struct CachedView {
    name: String,
    records: Vec<Value>,
    last_fetch_time: Option<String>,
    fetch_error: Option<String>,
    pending: usize,
}

fn cached_module<T: SheetRecord>(ctx: ClientContext, module: Module) -> Result<CachedView> {
    let s = ctx.records::<T>(module)?;
    Ok(CachedView {
        name: module.slug().to_string(),
        records: s
            .records()
            .into_iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        last_fetch_time: s.last_fetch_time().map(|t| t.to_rfc3339()),
        fetch_error: s.fetch_error().map(str::to_string),
        pending: s.pending_count()?,
    })
}

pub fn handle_sync(store: String) -> Result<()> {
    let target = parse_target(&store)?;
    let ctx = ClientContext::open()?;

    let report = match target {
        StoreTarget::Module(module) => with_record_type!(module, sync_module(ctx, module))?,
        StoreTarget::Proving(kind) => ctx.proving(kind)?.sync_pending()?,
    };

    println!(
        "Sent {}, dropped {}, {} still queued",
        report.sent, report.dropped, report.remaining
    );
    Ok(())
}

fn sync_module<T: SheetRecord>(ctx: ClientContext, module: Module) -> Result<SyncReport> {
    ctx.records::<T>(module)?.sync_pending()
}

fn print_outcome(id: &str, outcome: &WriteOutcome) {
    match outcome {
        WriteOutcome::Saved { .. } => println!("Saved {}", id),
        WriteOutcome::Queued { seq } => println!(
            "Queued {} as pending write {}; run `taquero sync` once the endpoint is reachable",
            id, seq
        ),
    }
}

fn add_remote(module: Module, row: Map<String, Value>, json: bool) -> Result<()> {
    let ctx = ClientContext::open()?;
    let (record, outcome) = with_record_type!(module, add_through_client(ctx, module, row))?;
    if module == Module::TemperatureLogs {
        warn_if_unsafe(&record);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        let id = record.get("id").map(display_value).unwrap_or_default();
        print_outcome(&id, &outcome);
    }
    Ok(())
}

/// Stamp the row the way the endpoint would, then add it to the cache, or
/// replace the cached record with the same id.
fn add_through_client<T: SheetRecord>(
    ctx: ClientContext,
    module: Module,
    mut row: Map<String, Value>,
) -> Result<(Value, WriteOutcome)> {
    endpoint::check_required(&row, module.required_fields())?;
    let id = endpoint::row_id(&row, "id")?;
    let mut store = ctx.records::<T>(module)?;

    let existing = match store.get(&id) {
        Some(record) => Some(endpoint::into_row(serde_json::to_value(record)?)?),
        None => None,
    };
    endpoint::stamp_row(&mut row, existing.as_ref(), Utc::now());
    let record: T = endpoint::typed_row(&row)?;
    let value = serde_json::to_value(&record)?;

    let outcome = if existing.is_some() {
        store.update(record)?
    } else {
        store.add(record)?
    };
    Ok((value, outcome))
}

fn delete_remote(module: Module, id: String, force: bool) -> Result<()> {
    let ctx = ClientContext::open()?;
    match with_record_type!(module, delete_through_client(ctx, module, &id, force))? {
        Some(outcome) => print_outcome(&id, &outcome),
        None => println!("Cancelled."),
    }
    Ok(())
}

fn delete_through_client<T: SheetRecord>(
    ctx: ClientContext,
    module: Module,
    id: &str,
    force: bool,
) -> Result<Option<WriteOutcome>> {
    let mut store = ctx.records::<T>(module)?;
    let record = store
        .get(id)
        .ok_or_else(|| TaqueroError::RecordNotFound(id.to_string()))?;
    let row = endpoint::into_row(serde_json::to_value(record)?)?;

    if !force && !confirm_delete(module, &row)? {
        return Ok(None);
    }
    store.delete(id).map(Some)
}

fn batch_remote(
    kind: ProvingKind,
    method_id: &str,
    make_batch: impl FnOnce(u32) -> Batch,
    json: bool,
) -> Result<()> {
    let mut store = ClientContext::open()?.proving(kind)?;
    let next_number = store
        .get(method_id)
        .map(|m| m.next_batch_number())
        .ok_or_else(|| TaqueroError::MethodNotFound(method_id.to_string()))?;

    let batch = make_batch(next_number);
    let batch_id = batch.id.clone();
    warn_if_target_missed(kind, &batch);
    let outcome = store.add_batch(batch)?;

    match store.get(method_id) {
        Some(method) if json => println!("{}", serde_json::to_string_pretty(method)?),
        _ => print_outcome(&batch_id, &outcome),
    }
    Ok(())
}
