//! Lazily-constructed shared instances

use std::fmt::{self, Display};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Async constructor stored by a [`LazySingleton`]
pub type SingletonFactory<T, E> = Box<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Holder for one shared instance that is built on first use.
///
/// Construction runs at most once at a time and never again after it succeeds,
/// no matter how many tasks ask for the instance concurrently. A failed
/// construction leaves the holder empty so the next caller tries again.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use sqlx_any_conn_mgr::{Database, LazySingleton};
///
/// # async fn example() -> Result<(), sqlx_any_conn_mgr::Error> {
/// let database = LazySingleton::new("database", || async {
///    Database::connect_url("sqlite://app.db?mode=rwc", None).await
/// });
///
/// let first = database.get_instance().await?;
/// let second = database.get_instance().await?;
/// assert!(Arc::ptr_eq(&first, &second));
/// # Ok(())
/// # }
/// ```
pub struct LazySingleton<T, E> {
   name: String,
   factory: SingletonFactory<T, E>,
   instance: RwLock<Option<Arc<T>>>,
   init_lock: Mutex<()>,
}

impl<T, E> LazySingleton<T, E>
where
   T: Send + Sync + 'static,
   E: Display + 'static,
{
   /// Create an empty holder. `factory` is not called until the first
   /// [`get_instance`](Self::get_instance).
   pub fn new<F, Fut>(name: impl Into<String>, factory: F) -> Self
   where
      F: Fn() -> Fut + Send + Sync + 'static,
      Fut: Future<Output = Result<T, E>> + Send + 'static,
   {
      Self {
         name: name.into(),
         factory: Box::new(move || factory().boxed()),
         instance: RwLock::new(None),
         init_lock: Mutex::new(()),
      }
   }

   /// Return the shared instance, constructing it if needed.
   ///
   /// The fast path reads the cached instance without touching the
   /// construction lock. Otherwise the caller waits for the lock, checks again
   /// and only then runs the factory.
   pub async fn get_instance(&self) -> Result<Arc<T>, E> {
      if let Some(instance) = self.get() {
         return Ok(instance);
      }

      let _guard = self.init_lock.lock().await;

      // Another caller may have finished construction while we waited
      if let Some(instance) = self.get() {
         return Ok(instance);
      }

      info!("Initializing {}", self.name);
      match (self.factory)().await {
         Ok(value) => {
            let instance = Arc::new(value);
            *self.instance.write().unwrap_or_else(PoisonError::into_inner) =
               Some(Arc::clone(&instance));
            info!("{} initialized", self.name);
            Ok(instance)
         }
         Err(e) => {
            error!("Failed to initialize {}: {}", self.name, e);
            Err(e)
         }
      }
   }

   /// Peek at the instance without constructing it.
   pub fn get(&self) -> Option<Arc<T>> {
      self
         .instance
         .read()
         .unwrap_or_else(PoisonError::into_inner)
         .clone()
   }

   pub fn is_initialized(&self) -> bool {
      self.get().is_some()
   }

   /// Forget the cached instance.
   ///
   /// Nothing is disposed: callers still holding the old `Arc` keep using it,
   /// and the next [`get_instance`](Self::get_instance) builds a fresh one.
   pub fn reset_instance(&self) {
      let previous = self
         .instance
         .write()
         .unwrap_or_else(PoisonError::into_inner)
         .take();
      if previous.is_some() {
         debug!("Reset {}", self.name);
      }
   }

   pub fn name(&self) -> &str {
      &self.name
   }
}

impl<T, E> fmt::Debug for LazySingleton<T, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let initialized = self
         .instance
         .read()
         .unwrap_or_else(PoisonError::into_inner)
         .is_some();
      f.debug_struct("LazySingleton")
         .field("name", &self.name)
         .field("initialized", &initialized)
         .finish()
   }
}
