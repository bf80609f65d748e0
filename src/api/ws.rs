use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::{dto::SubmitReadingRequest, AppState};

/// Upgrade to the realtime event stream.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection task: forward every broadcast envelope to the socket and
/// accept inbound readings pushed by the sensing unit over the same
/// connection.
///
/// The subscription's buffered channel is the only coupling to the rest of
/// the system — if this client stalls, the broadcaster drops the channel and
/// the forward loop ends; writers and other subscribers never notice.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let subscription = state.broadcaster.subscribe().await;
    let subscriber_id = subscription.id;
    let mut events = subscription.events;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = events.recv() => {
                let Some(envelope) = outbound else {
                    // Channel closed: the broadcaster disconnected us.
                    debug!(subscriber = %subscriber_id, "Event channel closed, ending session");
                    break;
                };
                let json = match serde_json::to_string(&envelope) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize envelope");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound_frame(&state, &text).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(subscriber = %subscriber_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.broadcaster.unsubscribe(subscriber_id).await;
    debug!(subscriber = %subscriber_id, "WebSocket session ended");
}

/// The sensing unit may push readings over the socket instead of HTTP. Bad
/// frames are logged and dropped; they never end the session.
async fn handle_inbound_frame(state: &AppState, text: &str) {
    let request = match serde_json::from_str::<SubmitReadingRequest>(text) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognized websocket frame");
            return;
        }
    };

    let reading = match request.validate() {
        Ok(reading) => reading,
        Err(e) => {
            warn!(error = %e, "Rejected out-of-range reading from websocket");
            return;
        }
    };

    if let Err(e) = state.store.append_reading(reading).await {
        warn!(error = %e, "Failed to persist websocket reading");
    }
}
