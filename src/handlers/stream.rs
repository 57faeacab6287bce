use crate::broadcast::channel::ChannelSubscriber;
use crate::broadcast::registry::{BroadcastRegistry, SubscriberId};
use crate::core::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::info;

/// Unregisters its subscriber when the connection's stream is dropped
struct SubscriptionGuard {
    id: SubscriberId,
    registry: Arc<BroadcastRegistry>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
        info!(subscriber_id = %self.id, "Stream client disconnected");
    }
}

fn new_subscriber_id() -> SubscriberId {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Live event stream
///
/// GET|POST /api/v1/stream
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = new_subscriber_id();
    let (subscriber, receiver) = ChannelSubscriber::channel(state.config.stream.channel_capacity);

    state.broadcast.register(id.clone(), Arc::new(subscriber));
    info!(
        subscriber_id = %id,
        subscribers = state.broadcast.len(),
        "Stream client connected"
    );

    let guard = SubscriptionGuard {
        id,
        registry: Arc::clone(&state.broadcast),
    };

    let stream = ReceiverStream::new(receiver).map(move |event| {
        let _ = &guard;
        Ok::<_, Infallible>(Event::default().event(event.event).data(event.data))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.config.stream.keep_alive())
            .text("keep-alive"),
    )
}
