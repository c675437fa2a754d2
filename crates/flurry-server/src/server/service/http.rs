//! HTTP front end: one batch per `POST /g`.
//!
//! The request body carries the one-byte count of the batch protocol and the
//! response body is the same big-endian ID encoding. The body is read only
//! up to its first byte, so whatever follows is neither buffered nor subject
//! to a size limit. Only the IDs are counted in the stats registry.

use super::IdService;
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use bytes::BytesMut;
use flurry_proto::{
    Error,
    batch::{BatchRequest, encode_ids},
};
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub fn router(service: IdService) -> Router {
    Router::new()
        .route("/g", any(generate))
        .with_state(service)
}

pub async fn serve(
    listener: TcpListener,
    service: IdService,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn generate(State(service): State<IdService>, method: Method, body: Body) -> Response {
    if method != Method::POST {
        return StatusCode::NOT_FOUND.into_response();
    }
    let count = match first_byte(body).await {
        Ok(Some(count)) => count,
        Ok(None) => return (StatusCode::BAD_REQUEST, "missing batch size\n").into_response(),
        Err(e) => {
            tracing::debug!("failed to read request body: {e}");
            return (StatusCode::BAD_REQUEST, "unreadable body\n").into_response();
        }
    };

    match service.generate(count as usize) {
        Ok(ids) => {
            let mut buf = BytesMut::with_capacity(BatchRequest { count }.response_len());
            encode_ids(&ids, &mut buf);
            service.stats().record_ids(u64::from(count));
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                buf.freeze(),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("failed to generate {count} IDs: {e}");
            (status_for(&e), format!("{e}\n")).into_response()
        }
    }
}

/// Reads frames until one carries data and returns its first byte.
async fn first_byte(body: Body) -> Result<Option<u8>, axum::Error> {
    let mut frames = body.into_data_stream();
    while let Some(frame) = frames.next().await {
        if let Some(&byte) = frame?.first() {
            return Ok(Some(byte));
        }
    }
    Ok(None)
}

fn status_for(err: &Error) -> StatusCode {
    if err.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
