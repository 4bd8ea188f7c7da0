//! The message bus.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codebus_core::{Bus, Subscriber, Subscriptions, CURRENT_THREAD};
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     fn greet(&self, name: String) {
//!         println!("hello, {name}");
//!     }
//! }
//!
//! impl Subscriber for Greeter {
//!     fn subscriptions(subs: &mut Subscriptions<Self>) {
//!         subs.method("greet", 1, CURRENT_THREAD, Self::greet);
//!     }
//! }
//!
//! let bus = Bus::new();
//! let greeter = Arc::new(Greeter);
//! bus.register_immediate(&greeter)?;
//! bus.post(1, ("world",))?;
//! bus.unregister_immediate(&greeter)?;
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::args::{IntoArgs, PostedMessage, TypedArg, Value};
use crate::cache::HandlerCache;
use crate::config::BusConfig;
use crate::error::{BusError, BusResult, InvokeError};
use crate::handler::Subscriber;
use crate::matcher::matches;
use crate::registry::{Delivery, Registry, subscriber_id};
use crate::scheduler::{Scheduler, SchedulerTable};

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Bus`].
#[derive(Debug, Default)]
pub struct BusBuilder {
    config: BusConfig,
    cache: Option<Arc<HandlerCache>>,
}

impl BusBuilder {
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a discovery cache with other buses. The cache keeps its own
    /// capacity; `cache_capacity` from the config is ignored.
    pub fn cache(mut self, cache: Arc<HandlerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Bus {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(HandlerCache::new(self.config.cache_capacity)));
        Bus {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                cache,
                validate: AtomicBool::new(self.config.validate_arguments),
                shut_down: AtomicBool::new(false),
                schedulers: SchedulerTable::new(self.config),
            }),
        }
    }
}

// ============================================================================
// Bus
// ============================================================================

/// An in-process message bus.
///
/// Cloning is cheap; clones share registrations and schedulers.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    registry: Mutex<Registry>,
    cache: Arc<HandlerCache>,
    schedulers: SchedulerTable,
    validate: AtomicBool,
    shut_down: AtomicBool,
}

impl Bus {
    /// Creates a bus with default settings.
    ///
    /// Every bus owns its I/O and compute pools, built on first use and
    /// stopped by [`shutdown`](Self::shutdown) or when the last clone drops.
    /// Share one bus (or the facade's `codebus::global()`) rather than
    /// creating many.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> BusBuilder {
        BusBuilder::default()
    }

    // ─── Posting ────────────────────────────────────────────────────────────

    /// Posts plain arguments to every handler of `code`.
    ///
    /// Handlers on [`CURRENT_THREAD`](crate::CURRENT_THREAD) have run by the
    /// time this returns. Handlers whose parameters do not fit are skipped
    /// silently. Fails if a handler names an unknown scheduler; every other
    /// handler of `code` is still scheduled.
    pub fn post(&self, code: i32, args: impl IntoArgs) -> BusResult<()> {
        self.inner.dispatch(Arc::new(PostedMessage::plain(code, args)))
    }

    /// Posts explicitly typed arguments. The only way to deliver a null.
    pub fn post_typed(
        &self,
        code: i32,
        args: impl IntoIterator<Item = TypedArg>,
    ) -> BusResult<()> {
        self.inner.dispatch(Arc::new(PostedMessage::typed(code, args)))
    }

    /// Like [`post`](Self::post), with the dispatch itself run on the I/O pool.
    pub fn post_async(&self, code: i32, args: impl IntoArgs) -> BusResult<()> {
        self.dispatch_async(PostedMessage::plain(code, args))
    }

    /// Like [`post_typed`](Self::post_typed), with the dispatch itself run on
    /// the I/O pool.
    pub fn post_typed_async(
        &self,
        code: i32,
        args: impl IntoIterator<Item = TypedArg>,
    ) -> BusResult<()> {
        self.dispatch_async(PostedMessage::typed(code, args))
    }

    fn dispatch_async(&self, message: PostedMessage) -> BusResult<()> {
        let io = self.inner.schedulers.io()?;
        let inner = Arc::clone(&self.inner);
        io.schedule(Box::new(move || {
            let code = message.code();
            if let Err(e) = inner.dispatch(Arc::new(message)) {
                error!(code, error = %e, "Async post failed");
            }
        }));
        Ok(())
    }

    // ─── Registration ───────────────────────────────────────────────────────

    /// Registers a subscriber on the I/O pool.
    ///
    /// Returns once the registration is queued. A post issued right after may
    /// not reach the subscriber yet; use
    /// [`register_immediate`](Self::register_immediate) when that matters.
    pub fn register<S: Subscriber>(&self, subscriber: &Arc<S>) -> BusResult<()> {
        self.inner.ensure_open()?;
        let io = self.inner.schedulers.io()?;
        let inner = Arc::clone(&self.inner);
        let subscriber = Arc::clone(subscriber);
        io.schedule(Box::new(move || {
            if let Err(e) = inner.register(&subscriber) {
                warn!(subscriber = type_name::<S>(), error = %e, "Async register failed");
            }
        }));
        Ok(())
    }

    /// Registers a subscriber before returning.
    ///
    /// Registering the same instance twice is a no-op.
    pub fn register_immediate<S: Subscriber>(&self, subscriber: &Arc<S>) -> BusResult<()> {
        self.inner.register(subscriber)
    }

    /// Unregisters a subscriber on the I/O pool.
    pub fn unregister<S: Subscriber>(&self, subscriber: &Arc<S>) -> BusResult<()> {
        if self.inner.is_shut_down() {
            return Ok(());
        }
        let io = self.inner.schedulers.io()?;
        let inner = Arc::clone(&self.inner);
        let subscriber = Arc::clone(subscriber);
        io.schedule(Box::new(move || inner.unregister(&subscriber)));
        Ok(())
    }

    /// Unregisters a subscriber before returning. No-op if not registered.
    pub fn unregister_immediate<S: Subscriber>(&self, subscriber: &Arc<S>) -> BusResult<()> {
        self.inner.unregister(subscriber);
        Ok(())
    }

    pub fn is_registered<S: Subscriber>(&self, subscriber: &Arc<S>) -> bool {
        self.inner
            .registry
            .lock()
            .is_registered(subscriber_id(subscriber))
    }

    /// Number of invocations a post to `code` would schedule.
    pub fn handler_count(&self, code: i32) -> usize {
        self.inner.registry.lock().delivery_count(code)
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().subscriber_count()
    }

    // ─── Schedulers ─────────────────────────────────────────────────────────

    /// Adds (or replaces) a custom scheduler. `id` must be at least
    /// [`FIRST_CUSTOM`](crate::FIRST_CUSTOM).
    pub fn add_scheduler(&self, id: i32, scheduler: Arc<dyn Scheduler>) -> BusResult<()> {
        self.inner.schedulers.add(id, scheduler)?;
        debug!(id, "Added custom scheduler");
        Ok(())
    }

    /// Removes a custom scheduler without shutting it down.
    pub fn remove_scheduler(&self, id: i32) -> Option<Arc<dyn Scheduler>> {
        self.inner.schedulers.remove(id)
    }

    // ─── Settings ───────────────────────────────────────────────────────────

    /// Enables or disables argument validation for subsequent posts.
    pub fn set_validation(&self, enabled: bool) {
        self.inner.validate.store(enabled, Ordering::Relaxed);
    }

    pub fn validation(&self) -> bool {
        self.inner.validate.load(Ordering::Relaxed)
    }

    pub fn set_cache_capacity(&self, capacity: usize) {
        self.inner.cache.set_capacity(capacity);
    }

    pub fn cache(&self) -> &Arc<HandlerCache> {
        &self.inner.cache
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Clears every registration and stops the owned schedulers.
    ///
    /// Custom schedulers are forgotten, not shut down. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.close() {
            debug!("Bus shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("subscribers", &self.subscriber_count())
            .field("validation", &self.validation())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// ============================================================================
// Dispatch internals
// ============================================================================

impl BusInner {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.is_shut_down() {
            Err(BusError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn register<S: Subscriber>(&self, subscriber: &Arc<S>) -> BusResult<()> {
        self.ensure_open()?;
        let id = subscriber_id(subscriber);
        if self.registry.lock().is_registered(id) {
            return Ok(());
        }

        let templates = self.cache.resolve::<S>();
        let target: Value = Arc::clone(subscriber) as Value;

        let mut registry = self.registry.lock();
        // Shutdown flips the flag under this lock.
        self.ensure_open()?;
        if registry.insert(id, target, &templates) {
            debug!(
                subscriber = type_name::<S>(),
                handlers = templates.len(),
                "Registered subscriber"
            );
        }
        Ok(())
    }

    fn unregister<S: Subscriber>(&self, subscriber: &Arc<S>) {
        if self.registry.lock().remove(subscriber_id(subscriber)) {
            debug!(subscriber = type_name::<S>(), "Unregistered subscriber");
        }
    }

    fn dispatch(&self, message: Arc<PostedMessage>) -> BusResult<()> {
        let code = message.code();
        let deliveries = self.registry.lock().snapshot(code);
        if deliveries.is_empty() {
            trace!(code, "No handlers for code");
            return Ok(());
        }

        let validate = self.validate.load(Ordering::Relaxed);
        let mut first_error = None;
        for delivery in deliveries {
            let scheduler = match self.schedulers.resolve(delivery.template.scheduler()) {
                Ok(scheduler) => scheduler,
                Err(e) => {
                    warn!(
                        code,
                        handler = delivery.template.signature(),
                        error = %e,
                        "Skipped handler with unusable scheduler"
                    );
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            let message = Arc::clone(&message);
            scheduler.schedule(Box::new(move || deliver(&delivery, &message, validate)));
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Returns true if this call performed the shutdown.
    fn close(&self) -> bool {
        {
            let mut registry = self.registry.lock();
            if self.shut_down.swap(true, Ordering::AcqRel) {
                return false;
            }
            registry.clear();
        }
        self.schedulers.shutdown();
        true
    }
}

impl Drop for BusInner {
    fn drop(&mut self) {
        self.schedulers.shutdown();
    }
}

/// Validates and invokes one delivery. Failures are logged, never raised.
fn deliver(delivery: &Delivery, message: &PostedMessage, validate: bool) {
    let template = &delivery.template;
    if validate && !matches(template.params(), message) {
        trace!(
            code = message.code(),
            handler = template.signature(),
            "Dropped message: arguments do not fit"
        );
        return;
    }

    let values = message.values();
    let target = delivery.target.as_deref();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| template.invoke(target, &values)))
        .unwrap_or_else(|payload| Err(InvokeError::Panicked(panic_message(payload.as_ref()))));

    if let Err(e) = outcome {
        error!(
            code = message.code(),
            handler = template.signature(),
            error = %e,
            "Handler invocation failed"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Arg, Args};
    use crate::handler::Subscriptions;
    use crate::scheduler::{
        CURRENT_THREAD, FnExecutor, IO_POOL, Job, NEW_THREAD, COMPUTE_POOL, from_executor,
    };
    use std::sync::atomic::{AtomicI64, AtomicUsize};
    use std::sync::mpsc::{self, Sender};
    use std::thread;
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(5);

    // ─── Fixtures ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Counter {
        strings: AtomicUsize,
        integers: AtomicUsize,
        pairs: AtomicUsize,
        total: AtomicI64,
    }

    impl Counter {
        fn on_string(&self, _s: String) {
            self.strings.fetch_add(1, Ordering::SeqCst);
        }

        fn on_integer(&self, _n: Box<i32>) {
            self.integers.fetch_add(1, Ordering::SeqCst);
        }

        fn on_pair(&self, first: Option<String>, second: String) {
            assert!(first.is_none());
            assert_eq!(second, "Lee");
            self.pairs.fetch_add(1, Ordering::SeqCst);
        }

        fn on_panic(&self) {
            panic!("boom");
        }

        fn on_amount(&self, amount: i32) {
            self.total.fetch_add(i64::from(amount), Ordering::SeqCst);
        }
    }

    impl Subscriber for Counter {
        fn subscriptions(subs: &mut Subscriptions<Self>) {
            subs.method("on_string", -99, CURRENT_THREAD, Self::on_string)
                .method("on_integer", -99, CURRENT_THREAD, Self::on_integer)
                .method("on_pair", -999, CURRENT_THREAD, Self::on_pair)
                .method("on_panic", 7, CURRENT_THREAD, Self::on_panic)
                .method("on_string", 7, CURRENT_THREAD, Self::on_string)
                .method("on_amount", 8, CURRENT_THREAD, Self::on_amount);
        }
    }

    struct Event(u32);

    #[derive(Default)]
    struct EventSink {
        seen: AtomicUsize,
        detached: AtomicUsize,
    }

    impl EventSink {
        fn on_event(&self, event: Arc<Event>) {
            self.seen.fetch_add(event.0 as usize, Ordering::SeqCst);
        }

        fn on_detached(&self, _event: Arc<Event>) {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Subscriber for EventSink {
        fn subscriptions(subs: &mut Subscriptions<Self>) {
            subs.method("on_event", 40, CURRENT_THREAD, Self::on_event)
                .method("on_detached", 40, 4096, Self::on_detached);
        }
    }

    struct Relay {
        tx: Mutex<Sender<(String, Option<String>)>>,
    }

    impl Relay {
        fn new() -> (Arc<Self>, mpsc::Receiver<(String, Option<String>)>) {
            let (tx, rx) = mpsc::channel();
            (Arc::new(Self { tx: Mutex::new(tx) }), rx)
        }

        fn forward(&self, message: String) {
            let name = thread::current().name().map(str::to_owned);
            let _ = self.tx.lock().send((message, name));
        }
    }

    impl Subscriber for Relay {
        fn subscriptions(subs: &mut Subscriptions<Self>) {
            subs.method("forward", 1, CURRENT_THREAD, Self::forward)
                .method("forward", 2, NEW_THREAD, Self::forward)
                .method("forward", 3, IO_POOL, Self::forward)
                .method("forward", 4, COMPUTE_POOL, Self::forward)
                .method("forward", 5, 2048, Self::forward);
        }
    }

    static STATIC_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct StaticCatcher;

    impl StaticCatcher {
        fn on_any(_value: i64) {
            STATIC_CALLS.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Subscriber for StaticCatcher {
        fn subscriptions(subs: &mut Subscriptions<Self>) {
            subs.function("on_any", 31, CURRENT_THREAD, Self::on_any);
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    // ─── Tests ──────────────────────────────────────────────────────────────

    #[test]
    fn test_post_reaches_current_thread_handler() {
        let bus = Bus::new();
        let (relay, rx) = Relay::new();
        bus.register_immediate(&relay).unwrap();

        bus.post(1, ("Hello",)).unwrap();
        let (message, name) = rx.try_recv().unwrap();
        assert_eq!(message, "Hello");
        assert_eq!(name, thread::current().name().map(str::to_owned));
    }

    #[test]
    fn test_post_reaches_each_builtin_scheduler() {
        let bus = Bus::new();
        let (relay, rx) = Relay::new();
        bus.register_immediate(&relay).unwrap();

        bus.post(2, ("thread",)).unwrap();
        let (_, name) = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(name.unwrap().starts_with("codebus-thread-"));

        bus.post(3, ("io",)).unwrap();
        let (_, name) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(name.as_deref(), Some("codebus-io"));

        bus.post(4, ("compute",)).unwrap();
        let (_, name) = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(name.unwrap().starts_with("codebus-compute-"));

        bus.shutdown();
    }

    #[test]
    fn test_unknown_scheduler_fails_the_post() {
        let bus = Bus::new();
        let (relay, rx) = Relay::new();
        bus.register_immediate(&relay).unwrap();

        assert_eq!(bus.post(5, ("x",)), Err(BusError::UnsupportedScheduler(2048)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_scheduler_does_not_block_siblings() {
        let bus = Bus::new();
        let sink = Arc::new(EventSink::default());
        bus.register_immediate(&sink).unwrap();

        let result = bus.post(40, (Arc::new(Event(3)),));
        assert_eq!(result, Err(BusError::UnsupportedScheduler(4096)));
        assert_eq!(sink.seen.load(Ordering::SeqCst), 3);
        assert_eq!(sink.detached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shared_payload_posted_as_value_or_shared_arg() {
        let bus = Bus::new();
        let sink = Arc::new(EventSink::default());
        bus.register_immediate(&sink).unwrap();
        let inline = from_executor(FnExecutor(|job: Job| job()));
        bus.add_scheduler(4096, inline).unwrap();

        bus.post(40, (Arc::new(Event(2)),)).unwrap();
        bus.post(40, Args::new().arg(Arg::shared(Arc::new(Event(5)))))
            .unwrap();
        bus.post(40, (Event(11),)).unwrap();
        bus.post(40, (Box::new(Event(100)),)).unwrap();

        assert_eq!(sink.seen.load(Ordering::SeqCst), 18);
        assert_eq!(sink.detached.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_primitive_param_takes_boxed_value() {
        let bus = Bus::new();
        let counter = Arc::new(Counter::default());
        bus.register_immediate(&counter).unwrap();

        bus.post(8, (Box::new(3_i32),)).unwrap();
        bus.post(8, (4_i32,)).unwrap();
        bus.post(8, (Box::new(50_i64),)).unwrap();
        bus.post(8, (60_u32,)).unwrap();

        assert_eq!(counter.total.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_custom_scheduler_receives_jobs() {
        let bus = Bus::new();
        let (relay, rx) = Relay::new();
        bus.register_immediate(&relay).unwrap();

        let jobs = Arc::new(AtomicUsize::new(0));
        let counter = jobs.clone();
        let inline = from_executor(FnExecutor(move |job: Job| {
            counter.fetch_add(1, Ordering::SeqCst);
            job();
        }));
        assert!(bus.add_scheduler(1, inline.clone()).is_err());
        bus.add_scheduler(2048, inline).unwrap();

        bus.post(5, ("custom",)).unwrap();
        assert_eq!(rx.try_recv().unwrap().0, "custom");
        assert_eq!(jobs.load(Ordering::SeqCst), 1);

        assert!(bus.remove_scheduler(2048).is_some());
        assert!(bus.post(5, ("custom",)).is_err());
    }

    #[test]
    fn test_duplicate_register_is_noop() {
        let bus = Bus::new();
        let counter = Arc::new(Counter::default());
        bus.register_immediate(&counter).unwrap();
        bus.register_immediate(&counter).unwrap();

        bus.post(-99, ("Hello",)).unwrap();
        assert_eq!(counter.strings.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_unregister_removes_only_that_instance() {
        let bus = Bus::new();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        bus.register_immediate(&a).unwrap();
        bus.register_immediate(&b).unwrap();
        assert_eq!(bus.handler_count(-99), 4);

        bus.unregister_immediate(&a).unwrap();
        bus.unregister_immediate(&a).unwrap();
        bus.post(-99, ("Hello",)).unwrap();

        assert_eq!(a.strings.load(Ordering::SeqCst), 0);
        assert_eq!(b.strings.load(Ordering::SeqCst), 1);
        assert!(!bus.is_registered(&a));
        assert!(bus.is_registered(&b));
    }

    #[test]
    fn test_ambiguous_overloads() {
        let bus = Bus::new();
        let counter = Arc::new(Counter::default());
        bus.register_immediate(&counter).unwrap();

        bus.post(-99, ("Hello",)).unwrap();
        bus.post(-99, (1_i32,)).unwrap();
        bus.post(-99, (2.5_f64,)).unwrap();
        bus.post(-99, Args::new().null()).unwrap();

        assert_eq!(counter.strings.load(Ordering::SeqCst), 1);
        assert_eq!(counter.integers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_plain_null_dropped_typed_null_delivered() {
        let bus = Bus::new();
        let counter = Arc::new(Counter::default());
        bus.register_immediate(&counter).unwrap();

        bus.post(-999, Args::new().null().push("Lee")).unwrap();
        assert_eq!(counter.pairs.load(Ordering::SeqCst), 0);

        bus.post_typed(-999, [TypedArg::null::<String>(), TypedArg::of("Lee")])
            .unwrap();
        assert_eq!(counter.pairs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = Bus::new();
        let counter = Arc::new(Counter::default());
        bus.register_immediate(&counter).unwrap();

        bus.post(7, ()).unwrap();
        bus.post(7, ("after",)).unwrap();
        assert_eq!(counter.strings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_validation_reports_instead_of_dropping() {
        let bus = Bus::new();
        let counter = Arc::new(Counter::default());
        bus.register_immediate(&counter).unwrap();

        bus.set_validation(false);
        assert!(!bus.validation());
        bus.post(-99, ("Hello",)).unwrap();

        assert_eq!(counter.strings.load(Ordering::SeqCst), 1);
        assert_eq!(counter.integers.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_static_handler_runs_once_per_post() {
        let bus = Bus::new();
        let a = Arc::new(StaticCatcher);
        let b = Arc::new(StaticCatcher);
        bus.register_immediate(&a).unwrap();
        bus.register_immediate(&b).unwrap();
        assert_eq!(bus.handler_count(31), 1);

        let before = STATIC_CALLS.load(Ordering::SeqCst);
        bus.post(31, (9_i64,)).unwrap();
        assert_eq!(STATIC_CALLS.load(Ordering::SeqCst), before + 1);

        bus.unregister_immediate(&a).unwrap();
        assert_eq!(bus.handler_count(31), 1);
        bus.unregister_immediate(&b).unwrap();
        assert_eq!(bus.handler_count(31), 0);
    }

    #[test]
    fn test_async_register_eventually_visible() {
        let bus = Bus::new();
        let counter = Arc::new(Counter::default());
        bus.register(&counter).unwrap();
        assert!(wait_until(|| bus.is_registered(&counter)));

        bus.unregister(&counter).unwrap();
        assert!(wait_until(|| !bus.is_registered(&counter)));
        bus.shutdown();
    }

    #[test]
    fn test_post_async_dispatches_on_io_pool() {
        let bus = Bus::new();
        let (relay, rx) = Relay::new();
        bus.register_immediate(&relay).unwrap();

        bus.post_async(1, ("later",)).unwrap();
        let (message, name) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(message, "later");
        assert_eq!(name.as_deref(), Some("codebus-io"));
        bus.shutdown();
    }

    #[test]
    fn test_post_typed_async_dispatches_on_io_pool() {
        let bus = Bus::new();
        let (relay, rx) = Relay::new();
        bus.register_immediate(&relay).unwrap();

        bus.post_typed_async(1, [TypedArg::of(String::from("typed later"))])
            .unwrap();
        let (message, name) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(message, "typed later");
        assert_eq!(name.as_deref(), Some("codebus-io"));

        bus.post_typed_async(1, [TypedArg::null::<String>()]).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        bus.shutdown();
    }

    #[test]
    fn test_shutdown() {
        let bus = Bus::new();
        let counter = Arc::new(Counter::default());
        bus.register_immediate(&counter).unwrap();

        bus.shutdown();
        bus.shutdown();
        assert!(bus.is_shut_down());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.register_immediate(&counter), Err(BusError::ShutDown));
        assert_eq!(bus.register(&counter), Err(BusError::ShutDown));

        bus.post(-99, ("Hello",)).unwrap();
        assert_eq!(counter.strings.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shared_cache_scans_once() {
        let cache = Arc::new(HandlerCache::default());
        let first = Bus::builder().cache(cache.clone()).build();
        let second = Bus::builder().cache(cache.clone()).build();

        first.register_immediate(&Arc::new(Counter::default())).unwrap();
        second.register_immediate(&Arc::new(Counter::default())).unwrap();
        assert_eq!(cache.scan_count(), 1);
    }
}
