use crate::broadcast::registry::Subscriber;
use crate::core::error::DeliveryError;
use tokio::sync::mpsc::{self, error::TrySendError};

/// One event queued for a stream connection
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    pub event: String,
    pub data: String,
}

/// Subscriber backed by a bounded queue drained by the connection task.
///
/// When the queue is full the new event is dropped for this subscriber only.
pub struct ChannelSubscriber {
    sender: mpsc::Sender<StreamEvent>,
}

impl ChannelSubscriber {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Subscriber for ChannelSubscriber {
    fn deliver(&self, event: &str, payload: &str) -> Result<(), DeliveryError> {
        self.sender
            .try_send(StreamEvent {
                event: event.to_string(),
                data: payload.to_string(),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::QueueFull,
                TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (subscriber, mut receiver) = ChannelSubscriber::channel(4);

        subscriber.deliver("heartbeat", "1").unwrap();
        subscriber.deliver("heartbeat", "2").unwrap();

        assert_eq!(receiver.recv().await.unwrap().data, "1");
        assert_eq!(receiver.recv().await.unwrap().data, "2");
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (subscriber, mut receiver) = ChannelSubscriber::channel(1);

        subscriber.deliver("message", "kept").unwrap();
        assert_eq!(
            subscriber.deliver("message", "dropped"),
            Err(DeliveryError::QueueFull)
        );

        assert_eq!(receiver.try_recv().unwrap().data, "kept");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver() {
        let (subscriber, receiver) = ChannelSubscriber::channel(1);
        drop(receiver);

        assert_eq!(
            subscriber.deliver("message", "x"),
            Err(DeliveryError::Closed)
        );
    }
}
