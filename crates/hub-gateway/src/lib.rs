pub mod connection;
pub mod dispatcher;
pub mod presence;
pub mod scheduler;

use hub_service::{MessageService, ServiceError, ServiceResult};

/// Runs a synchronous service call on the blocking pool.
pub async fn run_blocking<T, F>(service: &MessageService, f: F) -> ServiceResult<T>
where
    F: FnOnce(&MessageService) -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ServiceError::Store(anyhow::anyhow!("blocking task failed: {e}")))?
}
