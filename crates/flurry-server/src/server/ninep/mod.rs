//! 9P2000 front end.
//!
//! Each connection gets its own [`Session`] (fid table and negotiated
//! `msize`) over a shared [`Namespace`]. The same loop serves the main tree
//! and the stats-only tree of the secondary listener.

mod session;

use session::Session;

use crate::server::fs::Namespace;
use flurry_proto::{
    Result,
    ninep::{RequestBody, Response, ServerCodec},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};

pub async fn serve(
    listener: TcpListener,
    ns: Arc<Namespace>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut incoming = TcpListenerStream::new(listener);
    let tracker = TaskTracker::new();

    loop {
        let conn = tokio::select! {
            () = shutdown.cancelled() => break,
            conn = incoming.next() => conn,
        };
        match conn {
            Some(Ok(stream)) => {
                let ns = Arc::clone(&ns);
                let shutdown = shutdown.child_token();
                tracker.spawn(async move {
                    let peer = stream.peer_addr().ok();
                    tracing::debug!(?peer, "9P connection accepted");
                    match handle_connection(stream, ns, shutdown).await {
                        Ok(()) => tracing::debug!(?peer, "9P connection closed"),
                        Err(e) if e.is_disconnect() => {
                            tracing::debug!(?peer, "9P connection dropped by peer")
                        }
                        Err(e) => tracing::warn!(?peer, "9P connection failed: {e}"),
                    }
                });
            }
            Some(Err(e)) => tracing::warn!("accept failed: {e}"),
            None => break,
        }
    }

    tracker.close();
    tracker.wait().await;
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    ns: Arc<Namespace>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut framed = Framed::new(stream, ServerCodec::new());
    let mut session = Session::new(ns);

    loop {
        let request = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            request = framed.next() => request,
        };
        let Some(request) = request else {
            return Ok(());
        };
        let request = request?;

        let tag = request.tag;
        let negotiates = matches!(request.body, RequestBody::Version { .. });
        let body = session.handle(request).await;
        framed.send(Response { tag, body }).await?;

        if negotiates {
            framed.codec_mut().set_max_size(session.msize());
        }
    }
}
