//! Raw TCP front end for the one-byte batch protocol.
//!
//! Each accepted connection counts as one request in the stats registry, no
//! matter how many batches it asks for. Batches are answered in order until
//! the peer closes its side; a generator failure drops the connection.

use super::IdService;
use flurry_proto::{
    Result,
    batch::{BatchCodec, BatchRequest},
};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::{codec::Framed, sync::CancellationToken, task::TaskTracker};

/// Accepts connections until `shutdown` fires, then waits for the open ones
/// to finish their current batch.
pub async fn serve(
    listener: TcpListener,
    service: IdService,
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
                service.stats().record_request();
                let service = service.clone();
                let shutdown = shutdown.child_token();
                tracker.spawn(async move {
                    let peer = stream.peer_addr().ok();
                    tracing::debug!(?peer, "connection accepted");
                    match handle_connection(stream, &service, shutdown).await {
                        Ok(()) => tracing::debug!(?peer, "connection closed"),
                        Err(e) if e.is_disconnect() => {
                            tracing::debug!(?peer, "connection dropped by peer")
                        }
                        Err(e) => tracing::warn!(?peer, "connection failed: {e}"),
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
    service: &IdService,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut framed = Framed::new(stream, BatchCodec);

    loop {
        let request = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            request = framed.next() => request,
        };
        let Some(request) = request else {
            return Ok(());
        };
        let request = request?;
        let BatchRequest { count } = request;

        let ids = service.generate(count as usize).inspect_err(|e| {
            tracing::error!("failed to generate {count} IDs: {e}");
        })?;
        framed.send(&ids[..]).await?;
        service.stats().record_ids(u64::from(count));
        tracing::trace!(count, bytes = request.response_len(), "batch served");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::service::tests::{rewound_service, test_service};
    use flurry_proto::{SnowflakeId, batch::decode_ids};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Sends one batch request, half-closes, and collects everything the
    /// server writes before closing its side.
    async fn request_batch(addr: SocketAddr, count: u8) -> Vec<SnowflakeId> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[count]).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len(), count as usize * 8);
        decode_ids(&buf)
    }

    async fn start(service: IdService) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(serve(listener, service, shutdown.clone()));
        (addr, shutdown)
    }

    #[tokio::test]
    async fn three_ids_for_a_single_byte() {
        let service = test_service();
        let (addr, shutdown) = start(service.clone()).await;

        let ids = request_batch(addr, 3).await;
        assert_eq!(ids.len(), 3);
        assert!(ids[0] < ids[1] && ids[1] < ids[2]);
        assert!(ids.iter().all(|id| id.worker_id() == 5));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn connection_serves_batches_until_closed() {
        let service = test_service();
        let (addr, shutdown) = start(service.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[2, 0, 4]).await.unwrap();
        let mut buf = vec![0u8; 6 * 8];
        stream.read_exact(&mut buf).await.unwrap();
        let ids = decode_ids(&buf);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        stream.shutdown().await.unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let stats = service.stats().snapshot();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.ids, 6);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn each_connection_counts_once() {
        let service = test_service();
        let (addr, shutdown) = start(service.clone()).await;

        for _ in 0..3 {
            request_batch(addr, 1).await;
        }

        let stats = service.stats().snapshot();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.ids, 3);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn rewind_closes_the_connection() {
        let service = rewound_service();
        let (addr, shutdown) = start(service.clone()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[1]).await.unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(service.stats().snapshot().ids, 0);

        shutdown.cancel();
    }
}
