//! Operation dispatcher
//!
//! Inline operations run on the caller's thread and come back as an
//! already-settled [`AsyncResult`]. Offloaded operations (signing,
//! verification) run on a small blocking pool and settle the result through
//! a oneshot channel. Dispatched work always runs to completion; dropping the
//! result only discards interest in it.

use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{mpsc, Arc};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Where an operation executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Caller's thread
    Inline,
    /// Worker pool
    Offloaded,
}

/// Every operation exposed through the account facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Generate a private key
    CreatePrivateKey,
    /// Parse text into material
    Parse,
    /// Text form of material
    ToString,
    /// Private key or view key to address
    DeriveAddress,
    /// Private key to view key
    DeriveViewKey,
    /// Sign a message
    Sign,
    /// Verify a signature
    Verify,
}

impl Operation {
    /// Execution class of the operation.
    pub fn class(self) -> OperationClass {
        match self {
            Operation::Sign | Operation::Verify => OperationClass::Offloaded,
            _ => OperationClass::Inline,
        }
    }

    /// Name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Operation::CreatePrivateKey => "create_private_key",
            Operation::Parse => "parse",
            Operation::ToString => "to_string",
            Operation::DeriveAddress => "derive_address",
            Operation::DeriveViewKey => "derive_view_key",
            Operation::Sign => "sign",
            Operation::Verify => "verify",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observable state of an [`AsyncResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState {
    /// Work still running
    Pending,
    /// Settled with a value
    Resolved,
    /// Settled with an error
    Rejected,
}

/// Where a pending outcome goes once the work finishes
enum Listener<T> {
    Channel(oneshot::Sender<Result<T>>),
    Callback(Box<dyn FnOnce(Result<T>) + Send>),
    Delivered,
}

type SharedListener<T> = Arc<Mutex<Listener<T>>>;

/// Worker-side end of an offloaded operation.
///
/// Travels inside the blocking task. If the task is dropped before it runs
/// (pool shutdown), the listener still receives a rejection.
struct Completion<T> {
    operation: Operation,
    listener: SharedListener<T>,
}

impl<T> Completion<T> {
    fn deliver(&self, outcome: Result<T>) {
        let listener = std::mem::replace(&mut *self.listener.lock(), Listener::Delivered);
        match listener {
            Listener::Channel(sender) => {
                if sender.send(outcome).is_err() {
                    debug!(operation = self.operation.name(), "Result discarded by caller");
                }
            }
            Listener::Callback(callback) => callback(outcome),
            Listener::Delivered => {}
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if !matches!(*self.listener.lock(), Listener::Delivered) {
            self.deliver(Err(worker_lost(self.operation)));
        }
    }
}

enum Inner<T> {
    Settled(Result<T>),
    Pending {
        receiver: oneshot::Receiver<Result<T>>,
        listener: SharedListener<T>,
    },
    Consumed(ResultState),
}

/// Outcome of a dispatched operation
pub struct AsyncResult<T> {
    operation: Operation,
    inner: Inner<T>,
}

// No structural pinning: `T` is only ever moved out by value.
impl<T> Unpin for AsyncResult<T> {}

impl<T> AsyncResult<T> {
    /// Result that is settled at creation.
    pub fn settled(operation: Operation, outcome: Result<T>) -> Self {
        Self {
            operation,
            inner: Inner::Settled(outcome),
        }
    }

    /// Operation that produced this result.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Current state, without blocking.
    pub fn state(&mut self) -> ResultState {
        if let Inner::Pending { receiver, .. } = &mut self.inner {
            match receiver.try_recv() {
                Ok(outcome) => self.inner = Inner::Settled(outcome),
                Err(oneshot::error::TryRecvError::Empty) => return ResultState::Pending,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.inner = Inner::Settled(Err(worker_lost(self.operation)))
                }
            }
        }
        match &self.inner {
            Inner::Settled(Ok(_)) => ResultState::Resolved,
            Inner::Settled(Err(_)) => ResultState::Rejected,
            Inner::Pending { .. } => ResultState::Pending,
            Inner::Consumed(state) => *state,
        }
    }

    /// Block the current thread until the result settles.
    ///
    /// Panics if called from inside an async context; `.await` the result
    /// there instead.
    pub fn wait(self) -> Result<T> {
        match self.inner {
            Inner::Settled(outcome) => outcome,
            Inner::Pending { receiver, .. } => receiver
                .blocking_recv()
                .unwrap_or_else(|_| Err(worker_lost(self.operation))),
            Inner::Consumed(_) => Err(already_consumed(self.operation)),
        }
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// On timeout the work still runs to completion and its outcome is
    /// dropped. Does not need a runtime, so it is safe to call from async
    /// code, where it blocks the calling thread for up to `timeout`.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T>
    where
        T: Send + 'static,
    {
        let operation = self.operation;
        let (sender, receiver) = mpsc::sync_channel(1);
        self.on_settled(move |outcome| {
            let _ = sender.send(outcome);
        });
        match receiver.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                debug!(operation = operation.name(), ?timeout, "Stopped waiting for result");
                Err(Error::Dispatch(format!(
                    "{operation} did not complete within {timeout:?}"
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(worker_lost(operation)),
        }
    }

    /// Hand the outcome to `callback` once the result settles.
    ///
    /// `callback` runs exactly once. A settled result invokes it on the
    /// calling thread before this returns; a pending one invokes it on the
    /// blocking thread that ran the work, so a slow callback only holds up
    /// its own operation.
    pub fn on_settled<F>(self, callback: F)
    where
        T: Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let operation = self.operation;
        match self.inner {
            Inner::Settled(outcome) => callback(outcome),
            Inner::Pending {
                mut receiver,
                listener,
            } => {
                let mut slot = listener.lock();
                if matches!(*slot, Listener::Channel(_)) {
                    *slot = Listener::Callback(Box::new(callback));
                    return;
                }
                drop(slot);
                // The worker finished before the callback was registered.
                let outcome = receiver
                    .try_recv()
                    .unwrap_or_else(|_| Err(worker_lost(operation)));
                callback(outcome);
            }
            Inner::Consumed(_) => callback(Err(already_consumed(operation))),
        }
    }
}

impl<T> Future for AsyncResult<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match std::mem::replace(&mut this.inner, Inner::Consumed(ResultState::Rejected)) {
            Inner::Settled(outcome) => outcome,
            Inner::Pending {
                mut receiver,
                listener,
            } => match Pin::new(&mut receiver).poll(cx) {
                Poll::Pending => {
                    this.inner = Inner::Pending { receiver, listener };
                    return Poll::Pending;
                }
                Poll::Ready(Ok(outcome)) => outcome,
                Poll::Ready(Err(_)) => Err(worker_lost(this.operation)),
            },
            Inner::Consumed(state) => {
                this.inner = Inner::Consumed(state);
                return Poll::Ready(Err(already_consumed(this.operation)));
            }
        };

        let state = if outcome.is_ok() {
            ResultState::Resolved
        } else {
            ResultState::Rejected
        };
        this.inner = Inner::Consumed(state);
        Poll::Ready(outcome)
    }
}

impl<T> fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            Inner::Settled(Ok(_)) => ResultState::Resolved,
            Inner::Settled(Err(_)) => ResultState::Rejected,
            Inner::Pending { .. } => ResultState::Pending,
            Inner::Consumed(state) => *state,
        };
        f.debug_struct("AsyncResult")
            .field("operation", &self.operation)
            .field("state", &state)
            .finish()
    }
}

fn worker_lost(operation: Operation) -> Error {
    Error::Dispatch(format!("{operation} worker terminated before reporting a result"))
}

fn already_consumed(operation: Operation) -> Error {
    Error::Dispatch(format!("{operation} result was already taken"))
}

/// Routes operations to the caller's thread or the worker pool
pub struct Dispatcher {
    handle: Handle,
    /// Present when the pool belongs to this dispatcher
    runtime: Option<Runtime>,
}

impl Dispatcher {
    /// Dispatcher with its own worker pool.
    pub fn new(config: &DispatcherConfig) -> Result<Self> {
        let threads = config.worker_threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| Error::Dispatch(format!("failed to start worker pool: {e}")))?;
        info!(threads, name = %config.thread_name, "Worker pool started");
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Dispatcher that offloads onto an existing runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
        }
    }

    /// Run `work` now, on this thread.
    pub fn inline<T>(&self, operation: Operation, work: impl FnOnce() -> Result<T>) -> AsyncResult<T> {
        debug_assert_eq!(operation.class(), OperationClass::Inline);
        AsyncResult::settled(operation, work())
    }

    /// Run `work` on the worker pool.
    ///
    /// Anything `work` needs must be moved into it; the caller's borrows do
    /// not outlive this call. A panic in `work` rejects the result.
    pub fn offload<T, F>(&self, operation: Operation, work: F) -> AsyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        debug_assert_eq!(operation.class(), OperationClass::Offloaded);
        let (sender, receiver) = oneshot::channel();
        let listener = Arc::new(Mutex::new(Listener::Channel(sender)));
        let completion = Completion {
            operation,
            listener: Arc::clone(&listener),
        };

        self.handle.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
                Err(Error::Dispatch(format!("{operation} worker panicked")))
            });
            if let Err(e) = &outcome {
                warn!(operation = operation.name(), category = %e.category(), "Offloaded operation failed: {e}");
            }
            completion.deliver(outcome);
        });

        AsyncResult {
            operation,
            inner: Inner::Pending { receiver, listener },
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Started blocking work keeps running and still reports its outcome.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("Worker pool shut down");
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pool = if self.runtime.is_some() { "owned" } else { "borrowed" };
        f.debug_struct("Dispatcher").field("pool", &pool).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&DispatcherConfig {
            worker_threads: 2,
            thread_name: "dispatcher-test".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_operation_classes() {
        assert_eq!(Operation::Sign.class(), OperationClass::Offloaded);
        assert_eq!(Operation::Verify.class(), OperationClass::Offloaded);
        assert_eq!(Operation::ToString.class(), OperationClass::Inline);
        assert_eq!(Operation::DeriveViewKey.class(), OperationClass::Inline);
    }

    #[test]
    fn test_inline_is_settled_immediately() {
        let dispatcher = dispatcher();
        let mut ok = dispatcher.inline(Operation::ToString, || Ok(7));
        assert_eq!(ok.state(), ResultState::Resolved);
        assert_eq!(ok.wait().unwrap(), 7);

        let mut failed: AsyncResult<()> =
            dispatcher.inline(Operation::Parse, || Err(Error::Config("x".to_string())));
        assert_eq!(failed.state(), ResultState::Rejected);
    }

    #[test]
    fn test_offloaded_runs_off_thread() {
        let dispatcher = dispatcher();
        let caller = std::thread::current().id();
        let result = dispatcher.offload(Operation::Sign, move || Ok(std::thread::current().id()));
        assert_ne!(result.wait().unwrap(), caller);
    }

    #[test]
    fn test_pending_until_work_finishes() {
        let dispatcher = dispatcher();
        let (release, gate) = mpsc::channel::<()>();
        let mut result = dispatcher.offload(Operation::Verify, move || {
            gate.recv().map_err(|e| Error::Dispatch(e.to_string()))?;
            Ok(true)
        });
        assert_eq!(result.state(), ResultState::Pending);

        release.send(()).unwrap();
        assert!(result.wait().unwrap());
    }

    #[test]
    fn test_timeout_does_not_cancel_work() {
        let dispatcher = dispatcher();
        let (done_tx, done_rx) = mpsc::channel();
        let (release, gate) = mpsc::channel::<()>();
        let result = dispatcher.offload(Operation::Sign, move || {
            let _ = gate.recv();
            let _ = done_tx.send(());
            Ok(())
        });

        let outcome = result.wait_timeout(Duration::from_millis(20));
        assert!(matches!(outcome, Err(Error::Dispatch(_))));

        release.send(()).unwrap();
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("work completes after the caller gave up");
    }

    #[test]
    fn test_on_settled_callbacks() {
        let dispatcher = dispatcher();
        let (tx, rx) = mpsc::channel();

        let inline_tx = tx.clone();
        dispatcher
            .inline(Operation::ToString, || Ok(1))
            .on_settled(move |outcome| inline_tx.send(outcome).unwrap());
        assert_eq!(rx.try_recv().unwrap(), Ok(1));

        dispatcher
            .offload(Operation::Sign, || Ok(2))
            .on_settled(move |outcome| tx.send(outcome).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(2));
    }

    #[test]
    fn test_panicking_work_rejects() {
        let dispatcher = dispatcher();
        let result: AsyncResult<()> = dispatcher.offload(Operation::Sign, || panic!("boom"));
        assert!(matches!(result.wait(), Err(Error::Dispatch(_))));
    }

    #[tokio::test]
    async fn test_owned_pool_dropped_inside_runtime() {
        let dispatcher = dispatcher();
        let value = dispatcher.offload(Operation::Sign, || Ok(3)).await;
        assert_eq!(value.unwrap(), 3);
        drop(dispatcher);
    }

    #[test]
    fn test_callback_delivered_after_shutdown() {
        let dispatcher = dispatcher();
        let (started_tx, started) = mpsc::channel();
        let (release, gate) = mpsc::channel::<()>();
        let (tx, rx) = mpsc::channel();

        dispatcher
            .offload(Operation::Sign, move || {
                started_tx.send(()).unwrap();
                let _ = gate.recv();
                Ok("signed")
            })
            .on_settled(move |outcome| tx.send(outcome).unwrap());
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        drop(dispatcher);
        release.send(()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok("signed"));
    }

    #[test]
    fn test_queued_work_settles_once_on_shutdown() {
        let dispatcher = Dispatcher::new(&DispatcherConfig {
            worker_threads: 1,
            thread_name: "dispatcher-queue".to_string(),
        })
        .unwrap();
        let (started_tx, started) = mpsc::channel();
        let (release, gate) = mpsc::channel::<()>();
        let busy = dispatcher.offload(Operation::Sign, move || {
            started_tx.send(()).unwrap();
            let _ = gate.recv();
            Ok(0)
        });
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        let (tx, rx) = mpsc::channel();
        dispatcher
            .offload(Operation::Verify, || Ok(1))
            .on_settled(move |outcome| tx.send(outcome).unwrap());
        drop(dispatcher);
        release.send(()).unwrap();

        // Either it ran or it was discarded with the pool; the callback fires once.
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(busy);
    }

    #[test]
    fn test_slow_callback_does_not_stall_others() {
        let dispatcher = dispatcher();
        let (release_first, first_gate) = mpsc::channel::<()>();
        let (release_callback, callback_gate) = mpsc::channel::<()>();
        let (entered_tx, entered) = mpsc::channel();

        dispatcher
            .offload(Operation::Sign, move || {
                let _ = first_gate.recv();
                Ok(())
            })
            .on_settled(move |_| {
                entered_tx.send(()).unwrap();
                let _ = callback_gate.recv();
            });
        release_first.send(()).unwrap();
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        let (tx, rx) = mpsc::channel();
        dispatcher
            .offload(Operation::Verify, || Ok(true))
            .on_settled(move |outcome| tx.send(outcome).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Ok(true));
        release_callback.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_wait_timeout_inside_runtime() {
        let dispatcher = Dispatcher::with_handle(Handle::current());
        let value = dispatcher
            .offload(Operation::Verify, || Ok(5))
            .wait_timeout(Duration::from_secs(5));
        assert_eq!(value.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_await_on_borrowed_runtime() {
        let dispatcher = Dispatcher::with_handle(Handle::current());
        let value = dispatcher.offload(Operation::Verify, || Ok(41 + 1)).await;
        assert_eq!(value.unwrap(), 42);

        let mut settled = dispatcher.inline(Operation::Parse, || Ok("x"));
        assert_eq!((&mut settled).await.unwrap(), "x");
        assert_eq!(settled.state(), ResultState::Resolved);
    }
}
