use crate::store::{ActorResolver, IdAllocator, StoreResult};
use async_trait::async_trait;
use std::future::Future;
use uuid::Uuid;

/// Attributes every change to one fixed user name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticActor(String);

impl StaticActor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl ActorResolver for StaticActor {
    async fn resolve_actor(&self) -> StoreResult<String> {
        Ok(self.0.clone())
    }
}

/// Resolves the actor by calling an async function, e.g. a session lookup.
///
/// ```ignore
/// let actor = ActorFn::new(|| async { Ok("alice".to_string()) });
/// ```
pub struct ActorFn<F>(F);

impl<F, Fut> ActorFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = StoreResult<String>> + Send + 'static,
{
    pub fn new(resolve: F) -> Self {
        Self(resolve)
    }
}

#[async_trait]
impl<F, Fut> ActorResolver for ActorFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = StoreResult<String>> + Send + 'static,
{
    async fn resolve_actor(&self) -> StoreResult<String> {
        (self.0)().await
    }
}

/// Mints random v4 UUIDs in their 32-digit hex form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAllocator;

#[async_trait]
impl IdAllocator for UuidAllocator {
    async fn allocate(&self, count: usize) -> StoreResult<Vec<String>> {
        Ok((0..count)
            .map(|_| Uuid::new_v4().simple().to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StoreError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_static_actor() {
        let actor = StaticActor::new("someuser");
        assert_eq!(actor.resolve_actor().await.unwrap(), "someuser");
        assert_eq!(actor.name(), "someuser");
    }

    #[tokio::test]
    async fn test_actor_fn_is_called_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let actor = ActorFn::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("session-user".to_string())
            }
        });

        assert_eq!(actor.resolve_actor().await.unwrap(), "session-user");
        assert_eq!(actor.resolve_actor().await.unwrap(), "session-user");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_actor_fn_propagates_failure() {
        let actor =
            ActorFn::new(|| async { Err(StoreError::Unavailable("session expired".into())) });
        assert_eq!(
            actor.resolve_actor().await.unwrap_err(),
            StoreError::Unavailable("session expired".into())
        );
    }

    #[tokio::test]
    async fn test_uuid_allocator_mints_distinct_ids() {
        let ids = UuidAllocator.allocate(3).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| id.len() == 32));
        assert_ne!(ids[0], ids[1]);
    }
}
