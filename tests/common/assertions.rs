//! Event helpers

use std::time::Duration;
use stockfetch::Event;
use tokio::sync::broadcast;

/// Collect events until `RunFinished` arrives or `timeout` passes
pub async fn collect_until_finished(
    rx: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> Vec<Event> {
    let mut events = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = matches!(event, Event::RunFinished { .. });
                    events.push(event);
                    if done {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await;
    events
}

/// Names of channels that delivered the report
pub fn sent_channels(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::NotificationSent { channel } => Some(channel.clone()),
            _ => None,
        })
        .collect()
}
