//! Hyper accept loop wrapping a [`Router`].

use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc, time::Duration};

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{
    body::{Bytes, Incoming},
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::{
    error::RouterError,
    response::{self, Body},
    Router,
};

/// How long open connections may keep running once shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Arc<Router>, max_body_bytes: usize, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut shutdown = std::pin::pin!(shutdown);
    let mut conns = JoinSet::new();

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "sandbox listening");
    }

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown requested, closing listener");
                break;
            }
            Some(_) = conns.join_next(), if !conns.is_empty() => {}
            res = listener.accept() => {
                match res {
                    Ok((stream, addr)) => {
                        let router = router.clone();
                        conns.spawn(serve_connection(stream, addr, router, max_body_bytes));
                    }
                    Err(e) => error!("accept error: {e}"),
                }
            }
        }
    }
    drop(listener);

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while conns.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(open = conns.len(), "aborting connections still open after drain timeout");
        conns.shutdown().await;
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    router: Arc<Router>,
    max_body_bytes: usize,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let router = router.clone();
        async move { Ok::<_, Infallible>(handle_incoming(&router, req, max_body_bytes).await) }
    });

    let builder = Builder::new(TokioExecutor::new());
    if let Err(e) = builder.serve_connection(io, service).await {
        debug!("connection from {addr} ended: {e}");
    }
}

/// Buffer the body (bounded by `max_body_bytes`) and hand the request to the router.
pub async fn handle_incoming(
    router: &Router,
    req: Request<Incoming>,
    max_body_bytes: usize,
) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let bytes: Bytes = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            debug!(limit = max_body_bytes, "request body over limit");
            return response::error(&RouterError::BodyTooLarge);
        }
        Err(e) => {
            debug!("failed to read request body: {e}");
            return response::text(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };
    router.handle(Request::from_parts(parts, bytes)).await
}

#[cfg(test)]
mod tests {
    use sandbox_convert::presentation3::ManifestUpgrader;
    use sandbox_core::storage::InMemoryObjectStore;
    use serde_json::{json, Value};
    use tokio::sync::oneshot;

    use super::*;
    use crate::{SandboxConfig, EXPIRES_IN_HEADER};

    async fn spawn_server(max_body_bytes: usize) -> (String, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let router = Arc::new(Router::new(
            SandboxConfig::default(),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(ManifestUpgrader),
        ));
        let (tx, rx) = oneshot::channel();
        tokio::spawn(serve(listener, router, max_body_bytes, async {
            let _ = rx.await;
        }));
        (format!("http://{addr}"), tx)
    }

    #[tokio::test]
    async fn serves_create_and_read_over_http() {
        let (base, _shutdown) = spawn_server(64 * 1024).await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{base}/store"))
            .json(&json!({ "id": "https://example.org/m", "type": "Manifest" }))
            .send()
            .await
            .expect("create")
            .json()
            .await
            .expect("create body");
        let location = created["location"].as_str().expect("location");
        assert!(location.starts_with(&format!("{base}/p3/")));

        let read = client.get(location).send().await.expect("read");
        assert_eq!(read.status(), reqwest::StatusCode::OK);
        assert_eq!(read.headers()["access-control-allow-origin"], "*");
        assert!(read.headers().contains_key(EXPIRES_IN_HEADER));
        let doc: Value = read.json().await.expect("read body");
        assert_eq!(doc["id"], json!("https://example.org/m"));
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused() {
        let (base, _shutdown) = spawn_server(128).await;
        let body = json!({ "id": "x".repeat(512), "type": "Manifest" });

        let resp = reqwest::Client::new()
            .post(format!("{base}/store"))
            .json(&body)
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn stops_accepting_after_shutdown() {
        let (base, shutdown) = spawn_server(1024).await;
        let client = reqwest::Client::new();
        let landing = client.get(&base).send().await.expect("landing");
        assert_eq!(landing.text().await.expect("text"), "IIIF Preview");

        shutdown.send(()).expect("server running");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fresh = reqwest::Client::new();
        assert!(fresh.get(&base).send().await.is_err());
    }
}
