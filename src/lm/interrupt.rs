//! Cooperative interruption of a running fit.
//!
//! An interrupt is only a request: the driver polls it at the top of each loop
//! pass, never in the middle of a step. Signal handlers or UI threads set an
//! [`AbortFlag`]; the driver asks the [`InterruptSource`] how to proceed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::report::IterationReport;

/// What to do about a pending interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// End the fit with `UserAborted`
    Stop,
    /// Ignore the request and keep iterating
    Continue,
    /// Run the recovery hook, then keep iterating
    RunRecovery,
}

/// Source of abort requests polled by the driver.
pub trait InterruptSource {
    /// Called once when a fit starts.
    fn install(&mut self) {}

    /// Called once when the fit ends, on every path.
    fn restore(&mut self) {}

    fn is_requested(&self) -> bool;

    fn clear(&mut self);

    /// Decides how to handle a pending request given the current state.
    fn resolve(&mut self, _report: &IterationReport) -> InterruptAction {
        InterruptAction::Stop
    }

    fn run_recovery(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<I: InterruptSource + ?Sized> InterruptSource for &mut I {
    fn install(&mut self) {
        (**self).install()
    }

    fn restore(&mut self) {
        (**self).restore()
    }

    fn is_requested(&self) -> bool {
        (**self).is_requested()
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn resolve(&mut self, report: &IterationReport) -> InterruptAction {
        (**self).resolve(report)
    }

    fn run_recovery(&mut self) -> Result<()> {
        (**self).run_recovery()
    }
}

/// Thread-safe abort request, cheap to clone into a signal handler.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

type Resolver = Box<dyn FnMut(&IterationReport) -> InterruptAction>;
type Recovery = Box<dyn FnMut() -> Result<()>>;

/// Interrupt source backed by an [`AbortFlag`].
///
/// Without a resolver every request stops the fit.
#[derive(Default)]
pub struct FlagInterrupt {
    flag: AbortFlag,
    resolver: Option<Resolver>,
    recovery: Option<Recovery>,
    active: Arc<AtomicUsize>,
}

impl FlagInterrupt {
    pub fn new(flag: AbortFlag) -> Self {
        Self {
            flag,
            ..Self::default()
        }
    }

    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: FnMut(&IterationReport) -> InterruptAction + 'static,
    {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn with_recovery<F>(mut self, recovery: F) -> Self
    where
        F: FnMut() -> Result<()> + 'static,
    {
        self.recovery = Some(Box::new(recovery));
        self
    }

    pub fn flag(&self) -> &AbortFlag {
        &self.flag
    }

    /// Number of fits currently holding this source installed.
    pub fn active_installs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FlagInterrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagInterrupt")
            .field("flag", &self.flag)
            .field("has_resolver", &self.resolver.is_some())
            .field("has_recovery", &self.recovery.is_some())
            .field("active", &self.active_installs())
            .finish()
    }
}

impl InterruptSource for FlagInterrupt {
    fn install(&mut self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn restore(&mut self) {
        // saturating: restore without install is a no-op
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn is_requested(&self) -> bool {
        self.flag.is_requested()
    }

    fn clear(&mut self) {
        self.flag.clear();
    }

    fn resolve(&mut self, report: &IterationReport) -> InterruptAction {
        match self.resolver.as_mut() {
            Some(resolver) => resolver(report),
            None => InterruptAction::Stop,
        }
    }

    fn run_recovery(&mut self) -> Result<()> {
        match self.recovery.as_mut() {
            Some(recovery) => recovery(),
            None => Ok(()),
        }
    }
}

/// Never interrupts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterrupt;

impl InterruptSource for NoInterrupt {
    fn is_requested(&self) -> bool {
        false
    }

    fn clear(&mut self) {}
}

/// Installs an interrupt source for the lifetime of the guard.
pub struct InterruptGuard<'a> {
    source: &'a mut dyn InterruptSource,
}

impl<'a> InterruptGuard<'a> {
    pub fn new(source: &'a mut dyn InterruptSource) -> Self {
        source.install();
        Self { source }
    }

    pub fn source(&mut self) -> &mut dyn InterruptSource {
        &mut *self.source
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.source.restore();
    }
}
