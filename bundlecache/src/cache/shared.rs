//! Reference-counted sharing of one long-lived resource.
//!
//! [`SharedHandle`] wraps a lazily opened resource (here: the persistent
//! store) so that any number of concurrent callers share a single physical
//! open. The resource is opened when the first caller arrives and closed
//! exactly once, when the last concurrent caller finishes, independent of
//! call ordering or failures.
//!
//! The mutex guards only the open/close decision; the caller's body runs
//! outside it, so queries proceed fully in parallel once the resource is
//! open.

use std::sync::Arc;

use parking_lot::Mutex;

use super::error::CacheError;

type OpenFn<T> = Box<dyn Fn() -> Result<T, CacheError> + Send + Sync>;
type CloseFn<T> = Box<dyn Fn(&T) -> Result<(), CacheError> + Send + Sync>;

struct HandleState<T> {
    resource: Option<Arc<T>>,
    users: u64,
}

/// A reference-counted handle to a lazily opened resource.
pub struct SharedHandle<T> {
    open: OpenFn<T>,
    close: CloseFn<T>,
    state: Mutex<HandleState<T>>,
}

impl<T> SharedHandle<T> {
    /// Create a handle from `open`/`close` callbacks. Nothing is opened
    /// until the first [`with`](Self::with) call.
    pub fn new<O, C>(open: O, close: C) -> Self
    where
        O: Fn() -> Result<T, CacheError> + Send + Sync + 'static,
        C: Fn(&T) -> Result<(), CacheError> + Send + Sync + 'static,
    {
        Self {
            open: Box::new(open),
            close: Box::new(close),
            state: Mutex::new(HandleState {
                resource: None,
                users: 0,
            }),
        }
    }

    /// Run `f` against the shared resource.
    ///
    /// Opens the resource if no caller currently holds it; open failures
    /// propagate directly and leave the usage count untouched. The resource
    /// is released on every exit path, including panics, and is closed when
    /// the count reaches zero. An error from `f` is aggregated with any
    /// close error so neither is swallowed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> Result<R, CacheError>) -> Result<R, CacheError> {
        let resource = self.acquire()?;
        let guard = ReleaseGuard {
            handle: self,
            armed: true,
        };
        let result = f(&resource);
        drop(resource);
        let released = guard.finish();
        combine(result, released)
    }

    fn acquire(&self) -> Result<Arc<T>, CacheError> {
        let mut state = self.state.lock();
        let resource = match &state.resource {
            Some(resource) => Arc::clone(resource),
            None => {
                let resource = Arc::new((self.open)()?);
                state.resource = Some(Arc::clone(&resource));
                resource
            }
        };
        state.users += 1;
        Ok(resource)
    }

    fn release(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock();
        state.users -= 1;
        if state.users == 0 {
            if let Some(resource) = state.resource.take() {
                (self.close)(&resource)?;
            }
        }
        Ok(())
    }
}

/// Releases the caller's reference when dropped, so unwinding out of the
/// caller's body still decrements the count and closes the resource.
struct ReleaseGuard<'a, T> {
    handle: &'a SharedHandle<T>,
    armed: bool,
}

impl<T> ReleaseGuard<'_, T> {
    /// Normal-path release: disarm the guard and surface the close error.
    fn finish(mut self) -> Result<(), CacheError> {
        self.armed = false;
        self.handle.release()
    }
}

impl<T> Drop for ReleaseGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.handle.release() {
                tracing::warn!(%err, "failed to close shared resource during unwind");
            }
        }
    }
}

fn combine<R>(
    result: Result<R, CacheError>,
    released: Result<(), CacheError>,
) -> Result<R, CacheError> {
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => Err(CacheError::Aggregate(vec![err, close_err])),
    }
}
