use std::fmt;
use std::rc::Rc;

use serde_json::json;

use crate::link::NORMAL_CLOSE_CODE;
use crate::logging::Logger;

/// User-facing notice raised when the connection closes with anything other
/// than the normal close code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockingNotice {
    pub close_code: u16,
    pub reason: String,
}

impl BlockingNotice {
    pub fn new(close_code: u16, reason: impl Into<String>) -> Self {
        Self {
            close_code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BlockingNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "remote storage connection closed (code {}): {}",
            self.close_code, self.reason
        )
    }
}

/// Where the notice is surfaced. The host embedding decides how to render it;
/// the default sink writes a warning line.
pub trait NoticeSink {
    fn raise(&self, notice: &BlockingNotice);
}

pub struct LoggingNoticeSink {
    logger: Rc<Logger>,
}

impl LoggingNoticeSink {
    pub fn new(logger: Rc<Logger>) -> Self {
        Self { logger }
    }
}

impl NoticeSink for LoggingNoticeSink {
    fn raise(&self, notice: &BlockingNotice) {
        self.logger.log(
            crate::logging::LogLevel::Warn,
            Some("notice"),
            &notice.to_string(),
            Some(json!({
                "close_code": notice.close_code,
                "reason": notice.reason,
            })),
        );
    }
}

/// True when a close should surface a notice. The rule keys on the close code
/// alone: a normal close is silent cleanup no matter which side asked for it.
pub fn should_raise(close_code: u16) -> bool {
    close_code != NORMAL_CLOSE_CODE
}
