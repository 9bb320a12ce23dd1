use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use hub_service::{MessageService, ServiceResult};
use hub_types::events::ServerEvent;

use crate::dispatcher::Dispatcher;
use crate::run_blocking;

/// Background task that posts scheduled messages once they fall due.
///
/// Each sweep claims every due message, posts it, and broadcasts it to its
/// channel exactly like a live `new_message`.
pub async fn run_scheduler_loop(service: MessageService, dispatcher: Dispatcher, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        match sweep(&service, &dispatcher).await {
            Ok(count) => {
                if count > 0 {
                    info!("Scheduler: posted {} scheduled messages", count);
                }
            }
            Err(e) => {
                warn!("Scheduler error: {}", e);
            }
        }
    }
}

/// One pass: post everything due now and fan it out. Returns how many were posted.
pub async fn sweep(service: &MessageService, dispatcher: &Dispatcher) -> ServiceResult<usize> {
    let posted = run_blocking(service, |svc| svc.process_scheduled_messages(Utc::now())).await?;
    let count = posted.len();
    for view in posted {
        let channel_id = view.message.channel_id.clone();
        dispatcher
            .broadcast_to_channel(&channel_id, &ServerEvent::NewMessage { message: view }, None)
            .await;
    }
    Ok(count)
}
