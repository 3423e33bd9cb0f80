//! Serving with a bounded graceful shutdown

use axum::Router;
use std::future::{Future, IntoFuture};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Serve `app` until `shutdown` resolves, then wait at most `drain` for
/// in-flight requests to finish.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    drain: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = shutdown => {},
    }

    let _ = stop_tx.send(());
    info!("Waiting up to {} seconds for connections to close", drain.as_secs());

    match tokio::time::timeout(drain, &mut server).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Connections still open after {:?}; shutting down anyway", drain);
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::sync::Notify;

    async fn listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_idle_server_stops_on_signal() {
        let listener = listener().await;
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            Router::new(),
            async move {
                let _ = rx.await;
            },
            Duration::from_secs(30),
        ));

        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stuck_request_does_not_hold_shutdown_past_drain() {
        let entered = Arc::new(Notify::new());
        let app = Router::new().route(
            "/slow",
            get({
                let entered = Arc::clone(&entered);
                move || async move {
                    entered.notify_one();
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    "late"
                }
            }),
        );

        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            app,
            async move {
                let _ = rx.await;
            },
            Duration::from_millis(200),
        ));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        entered.notified().await;

        let started = Instant::now();
        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("shutdown waited for the stuck request")
            .unwrap();

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
