//! `ScopedExpr`: a codegen value paired with an optional teardown action.
//!
//! Many codegen helpers allocate a scratch slot (a stack alloca, a per-CPU
//! scratch-map claim) that must be released exactly once when the
//! surrounding expression is done with it. The original models this as a
//! `(value, deleter)` pair with an explicit "disarm" escape hatch for
//! transferring ownership out without running the deleter; this port keeps
//! the pairing but drops disarm — every `ScopedExpr` that reaches end of
//! scope here runs its deleter via `Drop`, full stop. New code should never
//! need to suppress that.

/// A BPF-side value (an `IrBuilder` value handle, e.g. a register or stack
/// slot id) bundled with the teardown it owns.
pub struct ScopedExpr<T> {
    value: T,
    teardown: Option<Box<dyn FnOnce(&T)>>,
}

impl<T> ScopedExpr<T> {
    /// Wrap a value that owns nothing extra to clean up.
    pub fn bare(value: T) -> Self {
        Self { value, teardown: None }
    }

    /// Wrap a value together with the action that must run when it goes out
    /// of scope (e.g. releasing a scratch-map slot).
    pub fn with_teardown(value: T, teardown: impl FnOnce(&T) + 'static) -> Self {
        Self { value, teardown: Some(Box::new(teardown)) }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for ScopedExpr<T> {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown(&self.value);
        }
    }
}
