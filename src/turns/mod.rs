use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Turn = Box<dyn FnOnce()>;

/// Cooperative turn queue for the single-threaded session loop.
///
/// Host-facing calls and inbound-message handling interleave on one thread;
/// anything that must complete "later" (deferred resolutions, transaction
/// drain checks) is parked here and drained by the session pump. Scheduling
/// never runs a turn synchronously.
#[derive(Clone, Default)]
pub struct TurnQueue {
    queued: Rc<RefCell<VecDeque<Turn>>>,
}

impl fmt::Debug for TurnQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnQueue")
            .field("queued", &self.queued.borrow().len())
            .finish()
    }
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, turn: impl FnOnce() + 'static) {
        self.queued.borrow_mut().push_back(Box::new(turn));
    }

    pub fn len(&self) -> usize {
        self.queued.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.borrow().is_empty()
    }

    /// Runs a single queued turn. The borrow is released before the turn
    /// executes so turns may schedule further turns.
    pub fn run_one(&self) -> bool {
        let turn = self.queued.borrow_mut().pop_front();
        match turn {
            Some(turn) => {
                turn();
                true
            }
            None => false,
        }
    }

    /// Drains the queue, including turns scheduled by turns already run.
    pub fn run_until_idle(&self) -> usize {
        let mut executed = 0;
        while self.run_one() {
            executed += 1;
        }
        executed
    }
}
