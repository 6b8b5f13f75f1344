use crate::sse::connection::LiveConnection;
use crate::sse::models::{ChannelReceiver, KEEPALIVE_COMMENT};
use crate::startup::AppState;
use axum::{
    extract::Extension,
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::Stream;
use std::convert::Infallible;

/// Opens a live stream of the current poll's tally.
pub async fn poll_updates_sse(Extension(app_state): Extension<AppState>) -> Response {
    let mut conn = LiveConnection::accept(app_state.registry.clone());
    let Some((handle, rx)) = conn.open(app_state.sse.channel_capacity) else {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    };

    // Viewers get the current tally without waiting for the next vote
    app_state.broadcaster.push_initial(&handle).await;
    drop(handle);

    (
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Cache-Control"),
        ],
        Sse::new(live_stream(conn, rx)).keep_alive(
            KeepAlive::new()
                .interval(app_state.sse.keepalive_interval)
                .text(KEEPALIVE_COMMENT),
        ),
    )
        .into_response()
}

/// The stream owns the connection guard, so dropping the response body deregisters the
/// viewer along with its keep-alive timer.
fn live_stream(
    conn: LiveConnection,
    mut rx: ChannelReceiver,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _conn = conn;

        // ends once the registry drops the handle: failed push or shutdown
        while let Some(payload) = rx.recv().await {
            yield Ok(Event::default().data(&*payload));
        }
    }
}
