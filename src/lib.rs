//! Bridges a host's asynchronous transactional key-value storage calls to a
//! remote service over one persistent duplex connection.

pub mod config;
pub mod correlator;
pub mod deferred;
pub mod facade;
pub mod failure;
pub mod heartbeat;
pub mod link;
pub mod logging;
pub mod notice;
pub mod session;
pub mod turns;
pub mod txn;
pub mod wire;

pub use config::BridgeConfig;
pub use deferred::Deferred;
pub use facade::{
    ConnectError, DatabaseHandle, DatabaseSummary, IndexHandle, RemoteStorage, StoreHandle,
    TransactionHandle,
};
pub use failure::StorageFailure;
pub use link::LinkUri;
pub use notice::{BlockingNotice, LoggingNoticeSink, NoticeSink};
pub use session::StorageSession;
pub use txn::TxnMode;
