use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::{BridgeConfig, ConfigError};
use crate::deferred::Deferred;
use crate::failure::StorageFailure;
use crate::logging::Logger;
use crate::notice::LoggingNoticeSink;
use crate::session::{SessionError, StorageSession};
use crate::turns::TurnQueue;
use crate::txn::TxnMode;
use crate::wire::OpKind;

#[derive(Debug)]
pub enum ConnectError {
    Config(ConfigError),
    Session(SessionError),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(source) => write!(f, "invalid bridge configuration: {source}"),
            Self::Session(source) => write!(f, "failed to open storage session: {source}"),
        }
    }
}

impl std::error::Error for ConnectError {}

impl From<ConfigError> for ConnectError {
    fn from(source: ConfigError) -> Self {
        Self::Config(source)
    }
}

impl From<SessionError> for ConnectError {
    fn from(source: SessionError) -> Self {
        Self::Session(source)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseSummary {
    pub name: String,
    pub version: u64,
}

#[derive(Debug)]
struct DbRecord {
    version: u64,
    store_names: Vec<String>,
}

type Registry = Rc<RefCell<BTreeMap<String, DbRecord>>>;

/// Resolves a deferred with a locally known value on a later turn, keeping
/// the façade's no-synchronous-completion rule without touching the wire.
fn resolve_later<T: Clone + 'static>(turns: &TurnQueue, value: T) -> Deferred<T> {
    let deferred: Deferred<T> = Deferred::new(turns.clone());
    let resolved = deferred.clone();
    turns.schedule(move || drop(resolved.resolve(value)));
    deferred
}

/// Host-facing entry point, a drop-in substitute for the platform's
/// asynchronous transactional storage API. Databases and their store names
/// are local bookkeeping; only put/get/delete travel to the remote.
#[derive(Clone, Debug)]
pub struct RemoteStorage {
    session: StorageSession,
    registry: Registry,
}

impl RemoteStorage {
    pub fn new(session: StorageSession) -> Self {
        Self {
            session,
            registry: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Builds the whole stack from configuration: logger, notice sink and
    /// connected session.
    pub fn connect(config: &BridgeConfig) -> Result<Self, ConnectError> {
        let logger = Rc::new(Logger::new(config.logger_config()?));
        let notice_sink = Rc::new(LoggingNoticeSink::new(Rc::clone(&logger)));
        let session = StorageSession::connect(
            &config.link_uri(),
            config.heartbeat_config(),
            logger,
            notice_sink,
        )?;
        Ok(Self::new(session))
    }

    pub fn session(&self) -> &StorageSession {
        &self.session
    }

    /// Opens (or reopens) a database. Always resolves asynchronously even
    /// though no round trip is involved.
    pub fn open(&self, name: &str, version: u64) -> Deferred<DatabaseHandle> {
        {
            let mut registry = self.registry.borrow_mut();
            let record = registry.entry(name.to_owned()).or_insert(DbRecord {
                version,
                store_names: Vec::new(),
            });
            if version > record.version {
                record.version = version;
            }
        }

        let handle = DatabaseHandle {
            name: name.to_owned(),
            version: self
                .registry
                .borrow()
                .get(name)
                .map(|record| record.version)
                .unwrap_or(version),
            session: self.session.clone(),
            registry: Rc::clone(&self.registry),
            closed: Rc::new(Cell::new(false)),
        };
        resolve_later(&self.session.turns(), handle)
    }

    /// Local-only deletion, no remote confirmation.
    pub fn delete_database(&self, name: &str) -> Deferred<Value> {
        self.registry.borrow_mut().remove(name);
        resolve_later(&self.session.turns(), Value::Null)
    }

    pub fn databases(&self) -> Deferred<Vec<DatabaseSummary>> {
        let summaries: Vec<DatabaseSummary> = self
            .registry
            .borrow()
            .iter()
            .map(|(name, record)| DatabaseSummary {
                name: name.clone(),
                version: record.version,
            })
            .collect();
        resolve_later(&self.session.turns(), summaries)
    }

    /// Synchronous key comparison over JSON keys.
    pub fn cmp(&self, a: &Value, b: &Value) -> Result<Ordering, StorageFailure> {
        compare_keys(a, b)
    }
}

/// Key ordering: numbers sort before strings, strings before arrays; arrays
/// compare element-wise with the shorter array first on a common prefix.
/// Null, booleans and objects are not valid keys.
pub fn compare_keys(a: &Value, b: &Value) -> Result<Ordering, StorageFailure> {
    let rank_a = key_rank(a)?;
    let rank_b = key_rank(b)?;
    if rank_a != rank_b {
        return Ok(rank_a.cmp(&rank_b));
    }

    match (a, b) {
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(0.0);
            let fb = nb.as_f64().unwrap_or(0.0);
            Ok(fa.partial_cmp(&fb).unwrap_or(Ordering::Equal))
        }
        (Value::String(sa), Value::String(sb)) => Ok(sa.cmp(sb)),
        (Value::Array(va), Value::Array(vb)) => {
            for (ea, eb) in va.iter().zip(vb.iter()) {
                let ordering = compare_keys(ea, eb)?;
                if ordering != Ordering::Equal {
                    return Ok(ordering);
                }
            }
            Ok(va.len().cmp(&vb.len()))
        }
        _ => Ok(Ordering::Equal),
    }
}

fn key_rank(value: &Value) -> Result<u8, StorageFailure> {
    match value {
        Value::Number(_) => Ok(0),
        Value::String(_) => Ok(1),
        Value::Array(_) => Ok(2),
        other => Err(StorageFailure::data(format!(
            "value of type {} is not a valid key",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One opened database. Clones share the closed flag; closing any clone
/// closes the handle for all of them.
#[derive(Clone, Debug)]
pub struct DatabaseHandle {
    name: String,
    version: u64,
    session: StorageSession,
    registry: Registry,
    closed: Rc<Cell<bool>>,
}

impl DatabaseHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn object_store_names(&self) -> Vec<String> {
        self.registry
            .borrow()
            .get(&self.name)
            .map(|record| record.store_names.clone())
            .unwrap_or_default()
    }

    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Creates an object store under an implicit readwrite transaction scoped
    /// to the new store. The transaction seeds no requests, so it completes
    /// on a later turn. Duplicate names fail synchronously.
    pub fn create_object_store(&self, store_name: &str) -> Result<StoreHandle, StorageFailure> {
        self.ensure_open()?;

        {
            let mut registry = self.registry.borrow_mut();
            let record = registry.get_mut(&self.name).ok_or_else(|| {
                StorageFailure::not_found(format!("database '{}' was deleted", self.name))
            })?;
            if record.store_names.iter().any(|name| name == store_name) {
                return Err(StorageFailure::constraint(format!(
                    "object store '{store_name}' already exists"
                )));
            }
            record.store_names.push(store_name.to_owned());
        }

        let (txn, _completion) = self
            .session
            .tracker()
            .create(TxnMode::ReadWrite, vec![store_name.to_owned()]);
        Ok(StoreHandle {
            name: store_name.to_owned(),
            txn,
            session: self.session.clone(),
        })
    }

    pub fn delete_object_store(&self, store_name: &str) -> Result<(), StorageFailure> {
        self.ensure_open()?;

        let mut registry = self.registry.borrow_mut();
        let record = registry.get_mut(&self.name).ok_or_else(|| {
            StorageFailure::not_found(format!("database '{}' was deleted", self.name))
        })?;
        let position = record
            .store_names
            .iter()
            .position(|name| name == store_name)
            .ok_or_else(|| {
                StorageFailure::not_found(format!("object store '{store_name}' was not found"))
            })?;
        record.store_names.remove(position);
        Ok(())
    }

    /// Opens a transaction over the named stores. Scope problems fail
    /// synchronously; the handle is live immediately.
    pub fn transaction(
        &self,
        store_names: &[&str],
        mode: TxnMode,
    ) -> Result<TransactionHandle, StorageFailure> {
        self.ensure_open()?;
        if store_names.is_empty() {
            return Err(StorageFailure::invalid_access(
                "transaction scope must name at least one object store",
            ));
        }

        let known = self.object_store_names();
        let mut scope: Vec<String> = Vec::new();
        for name in store_names {
            if !known.iter().any(|existing| existing == name) {
                return Err(StorageFailure::not_found(format!(
                    "object store '{name}' was not found"
                )));
            }
            if !scope.iter().any(|existing| existing == name) {
                scope.push((*name).to_owned());
            }
        }

        let (id, completion) = self.session.tracker().create(mode, scope.clone());
        Ok(TransactionHandle {
            id,
            mode,
            store_names: scope,
            session: self.session.clone(),
            completion,
        })
    }

    fn ensure_open(&self) -> Result<(), StorageFailure> {
        if self.closed.get() {
            return Err(StorageFailure::invalid_state(format!(
                "database handle '{}' is closed",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct TransactionHandle {
    id: Uuid,
    mode: TxnMode,
    store_names: Vec<String>,
    session: StorageSession,
    // Captured at creation; the tracker unregisters the record once the
    // transaction reaches a terminal state, and late listeners still need
    // the settled outcome.
    completion: Deferred<()>,
}

impl TransactionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn store_names(&self) -> &[String] {
        &self.store_names
    }

    pub fn object_store(&self, store_name: &str) -> Result<StoreHandle, StorageFailure> {
        if !self.store_names.iter().any(|name| name == store_name) {
            return Err(StorageFailure::not_found(format!(
                "object store '{store_name}' is not in this transaction's scope"
            )));
        }
        Ok(StoreHandle {
            name: store_name.to_owned(),
            txn: self.id,
            session: self.session.clone(),
        })
    }

    pub fn abort(&self) {
        self.session
            .abort_transaction(self.id, StorageFailure::aborted());
    }

    /// Assigns the single completion slot. Works even after the transaction
    /// settled; the stored outcome arrives on a later turn.
    pub fn on_complete(&self, listener: impl Fn() + 'static) {
        self.completion.on_success(move |()| listener());
    }

    /// Assigns the single abort slot.
    pub fn on_abort(&self, listener: impl Fn(&StorageFailure) + 'static) {
        self.completion.on_failure(listener);
    }

    pub fn subscribe_complete(&self, listener: impl Fn() + 'static) {
        self.completion.subscribe_success(move |()| listener());
    }

    pub fn subscribe_abort(&self, listener: impl Fn(&StorageFailure) + 'static) {
        self.completion.subscribe_failure(listener);
    }
}

/// One object store within a transaction's scope. put/get/delete travel to
/// the remote; the remaining operations are inert local stand-ins that
/// resolve on a later turn without touching the wire.
#[derive(Clone, Debug)]
pub struct StoreHandle {
    name: String,
    txn: Uuid,
    session: StorageSession,
}

impl StoreHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transaction_id(&self) -> Uuid {
        self.txn
    }

    pub fn put(&self, value: Value, key: Value) -> Deferred<Value> {
        self.session
            .issue(OpKind::Put, key, Some(value), Some(self.txn))
    }

    pub fn get(&self, key: Value) -> Deferred<Value> {
        self.session.issue(OpKind::Get, key, None, Some(self.txn))
    }

    pub fn delete(&self, key: Value) -> Deferred<Value> {
        self.session
            .issue(OpKind::Delete, key, None, Some(self.txn))
    }

    pub fn clear(&self) -> Deferred<Value> {
        resolve_later(&self.session.turns(), Value::Null)
    }

    pub fn get_all(&self) -> Deferred<Value> {
        resolve_later(&self.session.turns(), json!([]))
    }

    pub fn count(&self) -> Deferred<Value> {
        resolve_later(&self.session.turns(), json!(0))
    }

    pub fn open_cursor(&self) -> Deferred<Value> {
        resolve_later(&self.session.turns(), Value::Null)
    }

    pub fn index(&self, index_name: &str) -> Deferred<IndexHandle> {
        let handle = IndexHandle {
            name: index_name.to_owned(),
            turns: self.session.turns(),
        };
        resolve_later(&self.session.turns(), handle)
    }
}

/// Inert stand-in for a remote index; every lookup resolves empty.
#[derive(Clone, Debug)]
pub struct IndexHandle {
    name: String,
    turns: TurnQueue,
}

impl IndexHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, _key: Value) -> Deferred<Value> {
        resolve_later(&self.turns, Value::Null)
    }

    pub fn count(&self) -> Deferred<Value> {
        resolve_later(&self.turns, json!(0))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::cmp::Ordering;
    use std::rc::Rc;

    use serde_json::{json, Value};

    use crate::failure::{
        CONSTRAINT_ERROR_NAME, DATA_ERROR_NAME, INVALID_ACCESS_ERROR_NAME,
        INVALID_STATE_ERROR_NAME, NOT_FOUND_ERROR_NAME,
    };
    use crate::session::harness::{connect, kv_remote, long_heartbeat, pump_until, scripted_remote};
    use crate::session::StorageSession;
    use crate::txn::TxnMode;

    use super::{compare_keys, DatabaseHandle, DatabaseSummary, RemoteStorage};

    fn open_database(storage: &RemoteStorage, session: &StorageSession) -> DatabaseHandle {
        let opened = Rc::new(RefCell::new(None));
        let opened_clone = Rc::clone(&opened);
        storage
            .open("game", 1)
            .on_success(move |handle| *opened_clone.borrow_mut() = Some(handle.clone()));
        session.turns().run_until_idle();
        let handle = opened.borrow().clone();
        handle.expect("database handle should be delivered")
    }

    #[test]
    fn open_delivers_the_handle_asynchronously() {
        let (uri, remote) = kv_remote();
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());

        let opened = Rc::new(RefCell::new(None));
        let opened_clone = Rc::clone(&opened);
        storage
            .open("game", 3)
            .on_success(move |handle| *opened_clone.borrow_mut() = Some(handle.clone()));

        // Never synchronously, even though no round trip is involved.
        assert!(opened.borrow().is_none());
        session.turns().run_until_idle();

        let handle = opened.borrow().clone().expect("handle should arrive");
        assert_eq!(handle.name(), "game");
        assert_eq!(handle.version(), 3);

        session.close();
        drop(remote.join().expect("remote should finish"));
    }

    #[test]
    fn duplicate_store_creation_fails_synchronously_with_constraint_error() {
        let (uri, remote) = kv_remote();
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());
        let database = open_database(&storage, &session);

        let store = database
            .create_object_store("save")
            .expect("first creation should succeed");
        let error = database
            .create_object_store("save")
            .expect_err("duplicate creation should fail");

        assert_eq!(error.name, CONSTRAINT_ERROR_NAME);
        assert_eq!(database.object_store_names(), vec!["save".to_owned()]);

        // The implicit store-creation transaction carries no requests; it
        // completes on a later turn and is then unregistered.
        let tracker = session.tracker();
        let completed = Rc::new(RefCell::new(false));
        let completed_clone = Rc::clone(&completed);
        tracker
            .completion(store.transaction_id())
            .expect("implicit transaction should be registered")
            .on_success(move |()| *completed_clone.borrow_mut() = true);
        session.turns().run_until_idle();
        assert!(*completed.borrow());
        assert!(tracker.state(store.transaction_id()).is_none());

        session.close();
        drop(remote.join().expect("remote should finish"));
    }

    #[test]
    fn transaction_scope_is_validated_synchronously() {
        let (uri, remote) = kv_remote();
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());
        let database = open_database(&storage, &session);
        database
            .create_object_store("save")
            .expect("store creation should succeed");

        let empty = database
            .transaction(&[], TxnMode::ReadOnly)
            .expect_err("empty scope should fail");
        assert_eq!(empty.name, INVALID_ACCESS_ERROR_NAME);

        let unknown = database
            .transaction(&["missing"], TxnMode::ReadOnly)
            .expect_err("unknown store should fail");
        assert_eq!(unknown.name, NOT_FOUND_ERROR_NAME);

        let txn = database
            .transaction(&["save"], TxnMode::ReadWrite)
            .expect("valid scope should succeed");
        let outside = txn
            .object_store("other")
            .expect_err("store outside the scope should fail");
        assert_eq!(outside.name, NOT_FOUND_ERROR_NAME);

        database.close();
        let closed = database
            .transaction(&["save"], TxnMode::ReadOnly)
            .expect_err("closed handle should fail");
        assert_eq!(closed.name, INVALID_STATE_ERROR_NAME);

        session.close();
        drop(remote.join().expect("remote should finish"));
    }

    #[test]
    fn put_then_get_round_trips_the_stored_value() {
        let (uri, remote) = kv_remote();
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());
        let database = open_database(&storage, &session);
        database
            .create_object_store("save")
            .expect("store creation should succeed");

        let txn = database
            .transaction(&["save"], TxnMode::ReadWrite)
            .expect("transaction should open");
        let store = txn.object_store("save").expect("store should be in scope");

        let fetched = Rc::new(RefCell::new(None));
        store.put(json!({ "gold": 42 }), json!("slot1"));
        let fetched_clone = Rc::clone(&fetched);
        store
            .get(json!("slot1"))
            .on_success(move |value| *fetched_clone.borrow_mut() = Some(value.clone()));

        pump_until(&session, || fetched.borrow().is_some());
        assert_eq!(*fetched.borrow(), Some(json!({ "gold": 42 })));

        session.close();
        drop(remote.join().expect("remote should finish"));
    }

    #[test]
    fn deleting_an_absent_key_still_succeeds() {
        let (uri, remote) = kv_remote();
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());
        let database = open_database(&storage, &session);
        database
            .create_object_store("save")
            .expect("store creation should succeed");

        let txn = database
            .transaction(&["save"], TxnMode::ReadWrite)
            .expect("transaction should open");
        let store = txn.object_store("save").expect("store should be in scope");

        let completions = Rc::new(RefCell::new(0_u32));
        for _ in 0..2 {
            let completions_clone = Rc::clone(&completions);
            store
                .delete(json!("slot1"))
                .on_success(move |_| *completions_clone.borrow_mut() += 1);
        }

        pump_until(&session, || *completions.borrow() == 2);
        assert_eq!(*completions.borrow(), 2);

        session.close();
        drop(remote.join().expect("remote should finish"));
    }

    #[test]
    fn inert_operations_resolve_locally_without_wire_traffic() {
        let (uri, remote) = scripted_remote(|_| Some(Vec::new()));
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());
        let database = open_database(&storage, &session);
        database
            .create_object_store("save")
            .expect("store creation should succeed");

        let txn = database
            .transaction(&["save"], TxnMode::ReadOnly)
            .expect("transaction should open");
        let store = txn.object_store("save").expect("store should be in scope");

        let results = Rc::new(RefCell::new(Vec::new()));
        for (label, deferred) in [
            ("clear", store.clear()),
            ("get_all", store.get_all()),
            ("count", store.count()),
            ("cursor", store.open_cursor()),
        ] {
            let results_clone = Rc::clone(&results);
            deferred.on_success(move |value| {
                results_clone.borrow_mut().push((label, value.clone()));
            });
        }
        assert!(results.borrow().is_empty());
        session.turns().run_until_idle();

        assert_eq!(
            *results.borrow(),
            vec![
                ("clear", Value::Null),
                ("get_all", json!([])),
                ("count", json!(0)),
                ("cursor", Value::Null),
            ]
        );

        session.close();
        let received = remote.join().expect("remote should finish");
        assert!(received.is_empty(), "inert operations must stay local");
    }

    #[test]
    fn databases_reflects_open_and_delete() {
        let (uri, remote) = kv_remote();
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());

        storage.open("game", 2);
        storage.open("settings", 1);
        storage.delete_database("settings");

        let listed = Rc::new(RefCell::new(None));
        let listed_clone = Rc::clone(&listed);
        storage
            .databases()
            .on_success(move |summaries| *listed_clone.borrow_mut() = Some(summaries.clone()));
        session.turns().run_until_idle();

        assert_eq!(
            listed.borrow().clone(),
            Some(vec![DatabaseSummary {
                name: "game".to_owned(),
                version: 2,
            }])
        );

        session.close();
        drop(remote.join().expect("remote should finish"));
    }

    #[test]
    fn completion_listener_attached_after_settlement_still_fires() {
        let (uri, remote) = kv_remote();
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());
        let database = open_database(&storage, &session);
        database
            .create_object_store("save")
            .expect("store creation should succeed");

        let txn = database
            .transaction(&["save"], TxnMode::ReadOnly)
            .expect("transaction should open");
        session.turns().run_until_idle();
        // The zero-request transaction has completed and been unregistered.
        assert!(session.tracker().state(txn.id()).is_none());

        let completed = Rc::new(RefCell::new(false));
        let completed_clone = Rc::clone(&completed);
        txn.on_complete(move || *completed_clone.borrow_mut() = true);
        assert!(!*completed.borrow());
        session.turns().run_until_idle();
        assert!(*completed.borrow());

        session.close();
        drop(remote.join().expect("remote should finish"));
    }

    #[test]
    fn handles_render_debug_output() {
        let (uri, remote) = kv_remote();
        let (session, _notices) = connect(&uri, long_heartbeat());
        let storage = RemoteStorage::new(session.clone());
        let database = open_database(&storage, &session);
        database
            .create_object_store("save")
            .expect("store creation should succeed");
        let txn = database
            .transaction(&["save"], TxnMode::ReadWrite)
            .expect("transaction should open");
        let store = txn.object_store("save").expect("store should be in scope");

        assert!(format!("{database:?}").contains("DatabaseHandle"));
        assert!(format!("{txn:?}").contains("TransactionHandle"));
        assert!(format!("{store:?}").contains("StoreHandle"));

        session.close();
        drop(remote.join().expect("remote should finish"));
    }

    #[test]
    fn key_comparison_orders_numbers_strings_then_arrays() {
        assert_eq!(
            compare_keys(&json!(5), &json!(10)).expect("numbers should compare"),
            Ordering::Less
        );
        assert_eq!(
            compare_keys(&json!(99), &json!("a")).expect("mixed types should compare"),
            Ordering::Less
        );
        assert_eq!(
            compare_keys(&json!("zzz"), &json!([0])).expect("mixed types should compare"),
            Ordering::Less
        );
        assert_eq!(
            compare_keys(&json!([1, 2]), &json!([1, 2, 0])).expect("arrays should compare"),
            Ordering::Less
        );
        assert_eq!(
            compare_keys(&json!([1, "b"]), &json!([1, "a"])).expect("arrays should compare"),
            Ordering::Greater
        );
        assert_eq!(
            compare_keys(&json!("save"), &json!("save")).expect("strings should compare"),
            Ordering::Equal
        );
    }

    #[test]
    fn non_key_types_fail_comparison_with_data_error() {
        for invalid in [json!(null), json!(true), json!({ "a": 1 })] {
            let error = compare_keys(&invalid, &json!(1))
                .expect_err("non-key type should fail comparison");
            assert_eq!(error.name, DATA_ERROR_NAME);
        }
        // Invalid keys nested in arrays fail too.
        let error = compare_keys(&json!([1, null]), &json!([1, 2]))
            .expect_err("nested non-key should fail comparison");
        assert_eq!(error.name, DATA_ERROR_NAME);
    }
}
