use super::repository::RepositoryProvider;
use crate::work::{WorkResult, Worker, WorkerContext};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Refreshes the local video cache from the playlist endpoint.
pub struct RefreshDataWorker {
    provider: Arc<dyn RepositoryProvider>,
}

impl RefreshDataWorker {
    pub const NAME: &'static str = "RefreshDataWorker";

    pub fn new(provider: Arc<dyn RepositoryProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Worker for RefreshDataWorker {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Download the DevByte playlist and store it locally"
    }

    async fn do_work(&self, ctx: &WorkerContext) -> WorkResult {
        let repository = match self.provider.open() {
            Ok(repository) => repository,
            Err(e) => {
                error!("Could not open video repository: {}", e);
                ctx.set_error_message(e.to_string());
                return WorkResult::Failure;
            }
        };

        match repository.refresh_videos().await {
            Ok(count) => {
                info!(
                    "Refreshed {} videos (attempt {})",
                    count, ctx.run_attempt_count
                );
                WorkResult::Success
            }
            Err(e) if e.is_transient() => {
                warn!("Video refresh failed, will retry: {}", e);
                ctx.set_error_message(e.to_string());
                WorkResult::Retry
            }
            Err(e) => {
                error!("Video refresh failed: {}", e);
                ctx.set_error_message(e.to_string());
                WorkResult::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::repository::{RefreshError, VideosRepository};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct FakeRepository {
        result: Mutex<Option<Result<usize, RefreshError>>>,
    }

    #[async_trait]
    impl VideosRepository for FakeRepository {
        async fn refresh_videos(&self) -> Result<usize, RefreshError> {
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(0))
        }
    }

    struct FakeProvider {
        result: Mutex<Option<Result<usize, RefreshError>>>,
        fail_open: bool,
        opened: AtomicUsize,
    }

    impl FakeProvider {
        fn returning(result: Result<usize, RefreshError>) -> Self {
            Self {
                result: Mutex::new(Some(result)),
                fail_open: false,
                opened: AtomicUsize::new(0),
            }
        }

        fn failing_open() -> Self {
            Self {
                result: Mutex::new(None),
                fail_open: true,
                opened: AtomicUsize::new(0),
            }
        }
    }

    impl RepositoryProvider for FakeProvider {
        fn open(&self) -> Result<Arc<dyn VideosRepository>, RefreshError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(RefreshError::Storage(anyhow::anyhow!("database locked")));
            }
            Ok(Arc::new(FakeRepository {
                result: Mutex::new(self.result.lock().unwrap().take()),
            }))
        }
    }

    fn make_ctx() -> WorkerContext {
        WorkerContext::new(CancellationToken::new(), "sync", 0)
    }

    async fn run_with(provider: FakeProvider) -> (WorkResult, WorkerContext, Arc<FakeProvider>) {
        let provider = Arc::new(provider);
        let worker = RefreshDataWorker::new(provider.clone());
        let ctx = make_ctx();
        let result = worker.do_work(&ctx).await;
        (result, ctx, provider)
    }

    #[test]
    fn test_worker_metadata() {
        let worker = RefreshDataWorker::new(Arc::new(FakeProvider::returning(Ok(0))));
        assert_eq!(worker.name(), "RefreshDataWorker");
        assert!(!worker.description().is_empty());
    }

    #[tokio::test]
    async fn test_successful_refresh_is_success() {
        let (result, ctx, provider) = run_with(FakeProvider::returning(Ok(12))).await;

        assert_eq!(result, WorkResult::Success);
        assert!(ctx.error_message().is_none());
        assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_error_is_retry() {
        let (result, ctx, _) = run_with(FakeProvider::returning(Err(RefreshError::Status(503)))).await;

        assert_eq!(result, WorkResult::Retry);
        assert_eq!(ctx.error_message().as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn test_transport_error_is_retry() {
        let (result, _, _) = run_with(FakeProvider::returning(Err(RefreshError::Transport(
            "connection reset".to_string(),
        ))))
        .await;

        assert_eq!(result, WorkResult::Retry);
    }

    #[tokio::test]
    async fn test_malformed_playlist_is_failure() {
        let (result, ctx, _) = run_with(FakeProvider::returning(Err(RefreshError::Decode(
            "expected value at line 1".to_string(),
        ))))
        .await;

        assert_eq!(result, WorkResult::Failure);
        assert!(ctx.error_message().unwrap().contains("Malformed playlist"));
    }

    #[tokio::test]
    async fn test_unopenable_store_is_failure() {
        let (result, ctx, _) = run_with(FakeProvider::failing_open()).await;

        assert_eq!(result, WorkResult::Failure);
        assert!(ctx.error_message().unwrap().contains("database locked"));
    }
}
