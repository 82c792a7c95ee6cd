//! Local HTTP server exposing the gateway.
//!
//! `GET /<scheme>/<rest>?<query>` is answered as the virtual request
//! `<scheme>://<rest>?<query>`. `GET /_stats` returns cache counters.

use std::{
    convert::Infallible,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use atlasgate_proxy::Origin;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode,
    body::Incoming,
    header::{self, HeaderValue},
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{gateway::Gateway, response};

const STATS_PATH: &str = "/_stats";

/// How long `stop` waits for open connections to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 0 lets the OS pick a free port.
    pub port: u16,
    pub bind_address: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

/// Handle to a gateway listening on a local socket. Dropping it aborts the
/// accept loop; [`GatewayServer::stop`] drains open connections first.
pub struct GatewayServer {
    pub addr: SocketAddr,
    stop_signal: Option<oneshot::Sender<()>>,
    accept_task: Option<JoinHandle<()>>,
}

impl GatewayServer {
    pub async fn start<O: Origin>(
        gateway: Arc<Gateway<O>>,
        config: ServerConfig,
    ) -> std::io::Result<Self> {
        let listener =
            TcpListener::bind(SocketAddr::new(config.bind_address, config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "Gateway listening");

        let (stop_signal, stopped) = oneshot::channel();
        let accept_task = tokio::spawn(accept_loop(listener, gateway, stopped));

        Ok(Self {
            addr,
            stop_signal: Some(stop_signal),
            accept_task: Some(accept_task),
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn stop(mut self) {
        if let Some(signal) = self.stop_signal.take() {
            let _ = signal.send(());
        }
        if let Some(task) = self.accept_task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Accept loop ended abnormally");
        }
        info!(addr = %self.addr, "Gateway stopped");
    }
}

impl Drop for GatewayServer {
    fn drop(&mut self) {
        self.stop_signal.take();
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop<O: Origin>(
    listener: TcpListener,
    gateway: Arc<Gateway<O>>,
    mut stopped: oneshot::Receiver<()>,
) {
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
            },
            _ = &mut stopped => break,
        };

        let gateway = Arc::clone(&gateway);
        let service = service_fn(move |req: Request<Incoming>| {
            let gateway = Arc::clone(&gateway);
            async move { Ok::<_, Infallible>(route(&gateway, &req).await) }
        });
        let conn = builder.serve_connection(TokioIo::new(stream), service);
        let conn = graceful.watch(conn.into_owned());
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(%peer, error = %e, "Connection closed with error");
            }
        });
    }

    debug!("Draining open connections");
    if tokio::time::timeout(DRAIN_TIMEOUT, graceful.shutdown())
        .await
        .is_err()
    {
        warn!("Connections still open after drain timeout");
    }
}

async fn route<O: Origin, B>(gateway: &Gateway<O>, req: &Request<B>) -> Response<Full<Bytes>> {
    let method = req.method();
    if method != Method::GET && method != Method::HEAD {
        let mut response = response::text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        return response.map(Full::new);
    }

    let response = if req.uri().path() == STATS_PATH {
        response::json(&gateway.stats())
    } else {
        match virtual_url(req.uri().path(), req.uri().query()) {
            Some(url) => gateway.handle(&url).await,
            None => response::text(StatusCode::BAD_REQUEST, "Expected /<scheme>/<path>"),
        }
    };

    // hyper drops the body of HEAD responses and keeps Content-Length.
    response.map(Full::new)
}

/// Map `/<scheme>/<rest>` plus query to `<scheme>://<rest>?<query>`.
pub fn virtual_url(path: &str, query: Option<&str>) -> Option<String> {
    let (scheme, rest) = path.strip_prefix('/')?.split_once('/')?;
    if scheme.is_empty() || rest.is_empty() {
        return None;
    }
    Some(match query {
        Some(q) => format!("{scheme}://{rest}?{q}"),
        None => format!("{scheme}://{rest}"),
    })
}
