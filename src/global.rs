//! Global kernel — one `Kernel` behind a critical section
//!
//! Tasks and interrupt handlers share a static `KernelCell`.
//!
//! Author: Tern-RTOS contributors
//!
//! ```ignore
//! static KERNEL: KernelCell<MyPort> = KernelCell::new();
//!
//! fn systick_handler() {
//!     let _ = KERNEL.with(|k| k.tick());
//! }
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::port::Port;

/// Slot for the single kernel instance, filled once by `init`
pub struct KernelCell<P: Port> {
    inner: Mutex<RefCell<Option<Kernel<P>>>>,
}

impl<P: Port> KernelCell<P> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the kernel; a second call fails with `AlreadyStarted`
    pub fn init(&self, kernel: Kernel<P>) -> Result<(), KernelError> {
        critical_section::with(|cs| {
            let mut slot = self.inner.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(KernelError::AlreadyStarted);
            }
            *slot = Some(kernel);
            Ok(())
        })
    }

    pub fn is_initialized(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).is_some())
    }

    /// Run `f` on the kernel inside a critical section
    ///
    /// Fails with `NotStarted` before `init`, and with `WouldBlock` when
    /// called again from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut Kernel<P>) -> R) -> Result<R, KernelError> {
        critical_section::with(|cs| {
            let mut slot = self
                .inner
                .borrow(cs)
                .try_borrow_mut()
                .map_err(|_| KernelError::WouldBlock)?;
            let kernel = slot.as_mut().ok_or(KernelError::NotStarted)?;
            Ok(f(kernel))
        })
    }

    /// Remove the kernel, leaving the cell empty
    pub fn take(&self) -> Option<Kernel<P>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take())
    }
}

impl<P: Port> Default for KernelCell<P> {
    fn default() -> Self {
        Self::new()
    }
}
