//! Server-Sent-Events endpoint for live download progress

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use grabcore::core::validation::validate_job_id;
use grabcore::download::PushMessage;
use tokio_stream::StreamExt;

use crate::web::error::ApiError;
use crate::web::state::AppState;

/// Keep-alive comment interval, below common proxy idle timeouts
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn to_event(message: PushMessage) -> Event {
    match message {
        PushMessage::Progress(progress) => match serde_json::to_string(&progress) {
            Ok(json) => Event::default().data(json),
            Err(e) => {
                log::warn!("Failed to serialize progress event: {}", e);
                Event::default().comment("serialization error")
            }
        },
        PushMessage::Done => Event::default().event("done").data("{}"),
    }
}

/// GET /api/progress/{job_id}
///
/// Registers the connection as the progress listener for `job_id`. The stream
/// ends after the `done` event; a client disconnect drops the subscription,
/// which unregisters it.
pub async fn progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, ApiError> {
    validate_job_id(&job_id)?;

    let subscription = state.registry.subscribe(job_id);
    let stream = subscription.map(|message| Ok(to_event(message)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping")))
}
