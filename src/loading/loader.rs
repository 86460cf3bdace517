//! The module loader capability consumed by every wrapper

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use crate::loading::error::LoadResult;

/// Boxed in-flight load
pub type LoadFuture<T> = BoxFuture<'static, LoadResult<T>>;

/// Zero-argument async operation producing a renderable unit or failing.
///
/// Implemented for any `Fn() -> impl Future<Output = LoadResult<T>>`, so
/// closures and async fns can be passed directly.
pub trait ModuleLoader<T>: Send + Sync {
    fn load(&self) -> LoadFuture<T>;
}

impl<T, F, Fut> ModuleLoader<T> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = LoadResult<T>> + Send + 'static,
{
    fn load(&self) -> LoadFuture<T> {
        Box::pin(self())
    }
}

/// Loader shared between wrappers and schedulers
pub type SharedLoader<T> = Arc<dyn ModuleLoader<T>>;

/// Erase a loader into a [`SharedLoader`]
pub fn shared<T, L>(loader: L) -> SharedLoader<T>
where
    L: ModuleLoader<T> + 'static,
{
    Arc::new(loader)
}
