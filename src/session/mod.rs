use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::correlator::{PendingRequest, RequestCorrelator};
use crate::deferred::Deferred;
use crate::failure::StorageFailure;
use crate::heartbeat::{HeartbeatConfig, HeartbeatError, HeartbeatSchedule};
use crate::link::{
    LinkError, LinkUri, StorageLink, ABNORMAL_CLOSE_CODE, NORMAL_CLOSE_CODE, POLICY_CLOSE_CODE,
};
use crate::logging::Logger;
use crate::notice::{should_raise, BlockingNotice, NoticeSink};
use crate::turns::TurnQueue;
use crate::txn::TransactionTracker;
use crate::wire::{self, InboundFrame, OpKind};

const LOG_CONTEXT: &str = "session";

#[derive(Debug)]
pub enum SessionError {
    Link(LinkError),
    Heartbeat(HeartbeatError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(source) => write!(f, "session link error: {source}"),
            Self::Heartbeat(source) => write!(f, "session heartbeat error: {source}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<LinkError> for SessionError {
    fn from(source: LinkError) -> Self {
        Self::Link(source)
    }
}

impl From<HeartbeatError> for SessionError {
    fn from(source: HeartbeatError) -> Self {
        Self::Heartbeat(source)
    }
}

enum LinkState {
    Open,
    Closed { close_code: u16 },
}

struct SessionInner {
    link: Option<StorageLink>,
    state: LinkState,
    correlator: RequestCorrelator,
    heartbeat: HeartbeatSchedule,
}

/// One persistent connection to the remote storage endpoint, owning request
/// correlation, transaction tracking, the keepalive schedule and terminal
/// teardown.
///
/// Single-threaded by design: the host drives `pump` from its own loop, and
/// all callbacks fire on that thread, so no locking is required.
#[derive(Clone)]
pub struct StorageSession {
    inner: Rc<RefCell<SessionInner>>,
    tracker: TransactionTracker,
    turns: TurnQueue,
    logger: Rc<Logger>,
    notice_sink: Rc<dyn NoticeSink>,
}

impl fmt::Debug for StorageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSession")
            .field("open", &self.is_open())
            .field("notice_sink", &"<dyn NoticeSink>")
            .finish_non_exhaustive()
    }
}

impl StorageSession {
    pub fn connect(
        uri: &LinkUri,
        heartbeat_config: HeartbeatConfig,
        logger: Rc<Logger>,
        notice_sink: Rc<dyn NoticeSink>,
    ) -> Result<Self, SessionError> {
        let mut heartbeat = HeartbeatSchedule::new(heartbeat_config)?;
        logger.info(
            Some(LOG_CONTEXT),
            &format!("connecting to {}", uri.redacted()),
        );
        let link = StorageLink::connect(uri)?;
        heartbeat.arm(Instant::now());

        let turns = TurnQueue::new();
        Ok(Self {
            inner: Rc::new(RefCell::new(SessionInner {
                link: Some(link),
                state: LinkState::Open,
                correlator: RequestCorrelator::new(),
                heartbeat,
            })),
            tracker: TransactionTracker::new(turns.clone()),
            turns,
            logger,
            notice_sink,
        })
    }

    pub fn turns(&self) -> TurnQueue {
        self.turns.clone()
    }

    pub fn tracker(&self) -> TransactionTracker {
        self.tracker.clone()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.borrow().state, LinkState::Open)
    }

    /// Sends one operation and returns its deferred result. While the
    /// connection is down the deferred is rejected on a later turn, never
    /// synchronously.
    pub fn issue(
        &self,
        kind: OpKind,
        key: Value,
        value: Option<Value>,
        txn: Option<Uuid>,
    ) -> Deferred<Value> {
        let deferred: Deferred<Value> = Deferred::new(self.turns.clone());

        let send_result = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, LinkState::Open) {
                let rejected = deferred.clone();
                self.turns
                    .schedule(move || drop(rejected.reject(StorageFailure::not_connected())));
                return deferred;
            }

            let id = inner.correlator.assign_id();
            let line = wire::encode_request(id, kind, &key, value.as_ref());
            inner.correlator.register(PendingRequest {
                id,
                kind,
                txn,
                deferred: deferred.clone(),
            });
            if let Some(txn) = txn {
                self.tracker.link(txn, id);
            }

            match inner.link.as_mut() {
                Some(link) => link.send_line(&line).map_err(Some),
                None => Err(None),
            }
        };

        if let Err(error) = send_result {
            if let Some(error) = error {
                self.logger.error(
                    Some(LOG_CONTEXT),
                    &format!("outbound write failed: {error}"),
                );
            }
            self.teardown(
                ABNORMAL_CLOSE_CODE,
                "outbound write failed",
                false,
                StorageFailure::connection_lost(ABNORMAL_CLOSE_CODE, "outbound write failed"),
            );
        }

        deferred
    }

    /// One pump cycle: drain inbound frames, send a due keepalive, detect
    /// peer close and run the scheduled turns. The host calls this from its
    /// event loop.
    pub fn pump(&self) {
        let mut peer_closed = false;
        let mut write_failed = false;
        let mut lines = Vec::new();

        {
            let mut inner = self.inner.borrow_mut();
            if let Some(link) = inner.link.as_mut() {
                match link.poll() {
                    Ok(poll) => {
                        lines = poll.lines;
                        peer_closed = poll.closed;
                    }
                    Err(error) => {
                        self.logger
                            .error(Some(LOG_CONTEXT), &format!("socket read failed: {error}"));
                        peer_closed = true;
                    }
                }

                let now = Instant::now();
                if !peer_closed && inner.heartbeat.is_due(now) {
                    let keepalive = wire::encode_keepalive(Utc::now().timestamp_millis());
                    let sent = match inner.link.as_mut() {
                        Some(link) => link.send_line(&keepalive).is_ok(),
                        None => false,
                    };
                    if sent {
                        inner.heartbeat.mark_sent(now);
                    } else {
                        write_failed = true;
                    }
                }
            }
        }

        for line in lines {
            self.dispatch_line(&line);
        }

        if peer_closed {
            self.teardown(
                ABNORMAL_CLOSE_CODE,
                "socket closed by peer",
                false,
                StorageFailure::connection_lost(ABNORMAL_CLOSE_CODE, "socket closed by peer"),
            );
        } else if write_failed {
            self.teardown(
                ABNORMAL_CLOSE_CODE,
                "keepalive write failed",
                false,
                StorageFailure::connection_lost(ABNORMAL_CLOSE_CODE, "keepalive write failed"),
            );
        }

        self.turns.run_until_idle();
    }

    /// Pumps repeatedly until the deadline, yielding the thread briefly
    /// between cycles. Embedding loops and tests use this; a host with its
    /// own event loop calls `pump` directly.
    pub fn pump_until(&self, deadline: Instant) {
        while Instant::now() < deadline {
            self.pump();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Explicit transaction abort: the completion rejects, but member
    /// requests already sent keep their pending entries and run to their own
    /// completions when the remote answers. Only connection loss rejects
    /// in-flight requests.
    pub fn abort_transaction(&self, txn: Uuid, failure: StorageFailure) {
        self.tracker.abort(txn, failure);
    }

    /// The host regained visibility after a background period; probe the link
    /// immediately instead of waiting out the interval.
    pub fn notify_visibility_regained(&self) {
        self.inner.borrow_mut().heartbeat.trigger_now(Instant::now());
    }

    /// Deliberate local shutdown. Never raises a blocking notice.
    pub fn close(&self) {
        self.teardown(
            NORMAL_CLOSE_CODE,
            "closed by host",
            true,
            StorageFailure::connection_lost(NORMAL_CLOSE_CODE, "closed by host"),
        );
        self.turns.run_until_idle();
    }

    fn dispatch_line(&self, line: &str) {
        match wire::classify(line) {
            Ok(InboundFrame::Response {
                id,
                result,
                failure,
            }) => self.handle_response(id, result, failure),
            Ok(InboundFrame::KeepaliveAck) => {
                self.logger.debug(Some(LOG_CONTEXT), "keepalive acknowledged");
            }
            Ok(InboundFrame::SecurityFailure(failure)) => self.handle_security_failure(failure),
            Err(error) => {
                self.logger.log(
                    crate::logging::LogLevel::Warn,
                    Some(LOG_CONTEXT),
                    "discarding malformed inbound frame",
                    Some(json!({ "detail": error.to_string() })),
                );
            }
        }
    }

    /// Correlated response: the request is unlinked from its transaction
    /// before its own completion fires, so a drained transaction's completion
    /// (scheduled on a later turn) lands strictly after the last request's
    /// callbacks.
    fn handle_response(&self, id: u64, result: Value, failure: Option<StorageFailure>) {
        let pending = self.inner.borrow_mut().correlator.take(id);
        let Some(pending) = pending else {
            self.logger.warn(
                Some(LOG_CONTEXT),
                &format!("discarding response for unknown request id {id}"),
            );
            return;
        };

        if let Some(txn) = pending.txn {
            self.tracker.unlink(txn, id);
        }

        match failure {
            Some(failure) => {
                self.logger.log(
                    crate::logging::LogLevel::Debug,
                    Some(LOG_CONTEXT),
                    &format!("request {id} ({}) failed", pending.kind),
                    Some(failure.log_payload()),
                );
                pending.deferred.reject(failure);
            }
            None => {
                pending.deferred.resolve(result);
            }
        }
    }

    /// Global authentication failure: every outstanding request and
    /// transaction fails with the reported error, then the connection severs.
    fn handle_security_failure(&self, failure: StorageFailure) {
        self.logger.log(
            crate::logging::LogLevel::Error,
            Some(LOG_CONTEXT),
            "remote rejected the session credential",
            Some(failure.log_payload()),
        );
        let reason = failure.message.clone();
        self.teardown(POLICY_CLOSE_CODE, &reason, false, failure);
    }

    /// Terminal teardown, idempotent. Outstanding requests are rejected, open
    /// transactions aborted and the notice raised at most once; a second
    /// close signal finds the session already closed and does nothing.
    fn teardown(&self, close_code: u16, reason: &str, locally_initiated: bool, failure: StorageFailure) {
        let drained = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, LinkState::Open) {
                return;
            }
            inner.state = LinkState::Closed { close_code };
            inner.heartbeat.disarm();
            if let Some(link) = inner.link.take() {
                link.shutdown();
            }
            inner.correlator.drain_all()
        };

        self.logger.log(
            crate::logging::LogLevel::Info,
            Some(LOG_CONTEXT),
            &format!("connection closed (code {close_code}): {reason}"),
            Some(json!({
                "rejected_requests": drained.len(),
                "locally_initiated": locally_initiated,
            })),
        );

        for pending in drained {
            pending.deferred.reject(failure.clone());
        }
        self.tracker.fail_all(&failure);

        if should_raise(close_code) {
            self.notice_sink
                .raise(&BlockingNotice::new(close_code, reason));
        }
    }
}

/// Loopback test fixtures shared by the session and facade tests.
#[cfg(test)]
pub(crate) mod harness {
    use std::cell::RefCell;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::rc::Rc;
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    use serde_json::{json, Value};

    use crate::heartbeat::HeartbeatConfig;
    use crate::link::LinkUri;
    use crate::logging::{LogLevel, Logger, LoggerConfig};
    use crate::notice::{BlockingNotice, NoticeSink};

    use super::StorageSession;

    #[derive(Default)]
    pub struct MemoryNoticeSink {
        pub raised: RefCell<Vec<BlockingNotice>>,
    }

    impl NoticeSink for MemoryNoticeSink {
        fn raise(&self, notice: &BlockingNotice) {
            self.raised.borrow_mut().push(notice.clone());
        }
    }

    pub fn quiet_logger() -> Rc<Logger> {
        Rc::new(Logger::new(LoggerConfig {
            min_level: LogLevel::Error,
            human_friendly: false,
        }))
    }

    pub fn long_heartbeat() -> HeartbeatConfig {
        HeartbeatConfig {
            interval_ms: 120_000,
            early_beat_ms: 120_000,
        }
    }

    /// Scripted remote: accepts one connection, consumes the URI preamble and
    /// hands each subsequent request line to the script, writing back
    /// whatever lines it returns. The script returning None ends the remote,
    /// dropping its socket.
    pub fn scripted_remote(
        script: impl Fn(&str) -> Option<Vec<String>> + Send + 'static,
    ) -> (LinkUri, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener addr should exist");

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept should succeed");
            let mut writer: TcpStream = stream.try_clone().expect("clone should succeed");
            let mut reader = BufReader::new(stream);

            let mut preamble = String::new();
            reader
                .read_line(&mut preamble)
                .expect("preamble should arrive");

            let mut received = Vec::new();
            let mut line = String::new();
            loop {
                line.clear();
                let read = reader.read_line(&mut line).unwrap_or(0);
                if read == 0 {
                    break;
                }
                let trimmed = line.trim_end().to_owned();
                received.push(trimmed.clone());
                match script(&trimmed) {
                    Some(replies) => {
                        for reply in replies {
                            writer
                                .write_all(format!("{reply}\n").as_bytes())
                                .expect("reply should write");
                        }
                    }
                    None => break,
                }
            }
            received
        });

        (LinkUri::new("127.0.0.1", addr.port(), "test-token"), handle)
    }

    pub fn connect(
        uri: &LinkUri,
        heartbeat: HeartbeatConfig,
    ) -> (StorageSession, Rc<MemoryNoticeSink>) {
        let notices = Rc::new(MemoryNoticeSink::default());
        let session = StorageSession::connect(uri, heartbeat, quiet_logger(), notices.clone())
            .expect("session should connect");
        (session, notices)
    }

    pub fn pump_until(session: &StorageSession, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !done() {
            assert!(Instant::now() < deadline, "condition never became true");
            session.pump();
            thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn echo_ok(line: &str) -> Option<Vec<String>> {
        let frame: Value = serde_json::from_str(line).expect("request should be JSON");
        if frame.get("type").is_some() {
            return Some(Vec::new());
        }
        let id = frame["id"].as_u64().expect("request should carry an id");
        Some(vec![json!({ "id": id, "result": null }).to_string()])
    }

    /// Stateful remote: an in-memory key-value store speaking the wire
    /// protocol, for end-to-end put/get/delete coverage.
    pub fn kv_remote() -> (LinkUri, JoinHandle<Vec<String>>) {
        let store = std::sync::Mutex::new(std::collections::HashMap::<String, Value>::new());
        scripted_remote(move |line| {
            let frame: Value = serde_json::from_str(line).expect("request should be JSON");
            if frame.get("type").is_some() {
                return Some(Vec::new());
            }
            let id = frame["id"].as_u64().expect("request should carry an id");
            let key = frame["key"].to_string();
            let mut store = store.lock().expect("kv store mutex poisoned");
            let result = match frame["op"].as_str() {
                Some("put") => {
                    store.insert(key, frame["value"].clone());
                    Value::Null
                }
                Some("get") => store.get(&key).cloned().unwrap_or(Value::Null),
                Some("delete") => {
                    store.remove(&key);
                    Value::Null
                }
                _ => {
                    return Some(vec![json!({
                        "id": id,
                        "error": "Unrecognized operation",
                        "errorName": "SyntaxError",
                    })
                    .to_string()])
                }
            };
            Some(vec![json!({ "id": id, "result": result }).to_string()])
        })
    }
}
