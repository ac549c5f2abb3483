use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::failure::StorageFailure;
use crate::turns::TurnQueue;

type Listener<A> = Rc<dyn Fn(&A)>;

/// One outcome kind of a deferred result: an internal subscriber list with a
/// reserved primary entry. "Set the completion handler" is sugar that replaces
/// the primary entry; `subscribe` appends an additional listener.
struct Observable<A> {
    listeners: Vec<Listener<A>>,
    primary: Option<usize>,
}

impl<A> Observable<A> {
    fn new() -> Self {
        Self {
            listeners: Vec::new(),
            primary: None,
        }
    }

    fn set_primary(&mut self, listener: Listener<A>) {
        match self.primary {
            Some(index) => self.listeners[index] = listener,
            None => {
                self.listeners.push(listener);
                self.primary = Some(self.listeners.len() - 1);
            }
        }
    }

    fn subscribe(&mut self, listener: Listener<A>) {
        self.listeners.push(listener);
    }

    fn snapshot(&self) -> Vec<Listener<A>> {
        self.listeners.clone()
    }
}

#[derive(Clone)]
enum Outcome<T> {
    Success(T),
    Failure(StorageFailure),
}

struct DeferredInner<T> {
    success: Observable<T>,
    failure: Observable<StorageFailure>,
    outcome: Option<Outcome<T>>,
}

/// Handle returned synchronously to the caller; its success or failure
/// outcome is determined later and delivered exactly once.
///
/// Listeners attached after settlement receive the stored outcome on a later
/// turn, never synchronously, so attaching right after the issuing call can
/// never race a same-tick resolution.
pub struct Deferred<T> {
    inner: Rc<RefCell<DeferredInner<T>>>,
    turns: TurnQueue,
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.inner.borrow().outcome.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            turns: self.turns.clone(),
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    pub fn new(turns: TurnQueue) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredInner {
                success: Observable::new(),
                failure: Observable::new(),
                outcome: None,
            })),
            turns,
        }
    }

    /// Assigns the single success-completion slot, replacing any previous one.
    pub fn on_success(&self, listener: impl Fn(&T) + 'static) {
        let listener: Listener<T> = Rc::new(listener);
        self.inner.borrow_mut().success.set_primary(Rc::clone(&listener));
        self.deliver_late_success(listener);
    }

    /// Registers an additional success listener.
    pub fn subscribe_success(&self, listener: impl Fn(&T) + 'static) {
        let listener: Listener<T> = Rc::new(listener);
        self.inner.borrow_mut().success.subscribe(Rc::clone(&listener));
        self.deliver_late_success(listener);
    }

    /// Assigns the single failure-completion slot, replacing any previous one.
    pub fn on_failure(&self, listener: impl Fn(&StorageFailure) + 'static) {
        let listener: Listener<StorageFailure> = Rc::new(listener);
        self.inner.borrow_mut().failure.set_primary(Rc::clone(&listener));
        self.deliver_late_failure(listener);
    }

    /// Registers an additional failure listener.
    pub fn subscribe_failure(&self, listener: impl Fn(&StorageFailure) + 'static) {
        let listener: Listener<StorageFailure> = Rc::new(listener);
        self.inner.borrow_mut().failure.subscribe(Rc::clone(&listener));
        self.deliver_late_failure(listener);
    }

    /// Settles the success path. Returns false if already settled; a settled
    /// deferred never fires again.
    pub fn resolve(&self, value: T) -> bool {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return false;
            }
            inner.outcome = Some(Outcome::Success(value.clone()));
            inner.success.snapshot()
        };

        for listener in listeners {
            listener(&value);
        }
        true
    }

    /// Settles the failure path. Returns false if already settled.
    pub fn reject(&self, failure: StorageFailure) -> bool {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return false;
            }
            inner.outcome = Some(Outcome::Failure(failure.clone()));
            inner.failure.snapshot()
        };

        for listener in listeners {
            listener(&failure);
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }

    fn deliver_late_success(&self, listener: Listener<T>) {
        let inner = Rc::clone(&self.inner);
        if matches!(self.inner.borrow().outcome, Some(Outcome::Success(_))) {
            self.turns.schedule(move || {
                let value = match &inner.borrow().outcome {
                    Some(Outcome::Success(value)) => value.clone(),
                    _ => return,
                };
                listener(&value);
            });
        }
    }

    fn deliver_late_failure(&self, listener: Listener<StorageFailure>) {
        let inner = Rc::clone(&self.inner);
        if matches!(self.inner.borrow().outcome, Some(Outcome::Failure(_))) {
            self.turns.schedule(move || {
                let failure = match &inner.borrow().outcome {
                    Some(Outcome::Failure(failure)) => failure.clone(),
                    _ => return,
                };
                listener(&failure);
            });
        }
    }
}
