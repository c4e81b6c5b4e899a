//! Dual-transport accept loop
//!
//! Both transports carry one fixed-layout request and one reply per
//! connection: `accept -> read request -> dispatch -> write reply ->
//! close`. There is no keep-alive; clients send the full frame before
//! listening for the reply, so the read is a header followed by the
//! remainder the command tag dictates.

use std::future::Future;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};
use vibrad_ff::FfBackend;
use vibrad_proto::wire::{self, Request};
use vibrad_proto::{status, CommandKind};

use crate::config::ServiceConfig;
use crate::dispatch::{Dispatcher, Response};
use crate::rpmsg;

/// The bound listening sockets; either transport may be missing when its
/// family is unavailable, but never both.
pub struct Listeners {
    local: Option<UnixListener>,
    remote: Option<UnixListener>,
}

/// Bind the local and cross-core listeners. A transport that cannot bind
/// is logged and skipped; at least one must survive.
pub fn bind_listeners(config: &ServiceConfig) -> Result<Listeners> {
    let local = match bind_local(&config.socket_path) {
        Ok(listener) => {
            info!("listening on {}", config.socket_path.display());
            Some(listener)
        }
        Err(err) => {
            warn!("local transport unavailable: {err:#}");
            None
        }
    };
    let remote = match rpmsg::bind(&config.rpmsg_name, config.accept_backlog) {
        Ok(listener) => {
            info!("listening on rpmsg endpoint {}", config.rpmsg_name);
            Some(listener)
        }
        Err(err) => {
            warn!("cross-core transport unavailable: {err}");
            None
        }
    };
    if local.is_none() && remote.is_none() {
        bail!("no transport could be bound");
    }
    Ok(Listeners { local, remote })
}

fn bind_local(path: &Path) -> Result<UnixListener> {
    // A stale socket file from a previous run would fail the bind.
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    let listener = std::os::unix::net::UnixListener::bind(path)
        .with_context(|| format!("binding {}", path.display()))?;
    listener
        .set_nonblocking(true)
        .context("setting local listener nonblocking")?;
    UnixListener::from_std(listener).context("registering local listener")
}

/// Run the accept loop until `shutdown` resolves, then stop playback and
/// quiesce the motor.
pub async fn serve<B, F>(
    mut dispatcher: Dispatcher<B>,
    listeners: Listeners,
    shutdown: F,
) -> Result<()>
where
    B: FfBackend + Send + 'static,
    F: Future<Output = ()>,
{
    let Listeners { local, remote } = listeners;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
            accepted = accept_on(local.as_ref()) => match accepted {
                Ok(stream) => handle_client(&mut dispatcher, stream, "local").await,
                Err(err) => warn!("local accept failed: {err}"),
            },
            accepted = accept_on(remote.as_ref()) => match accepted {
                Ok(stream) => handle_client(&mut dispatcher, stream, "cross-core").await,
                Err(err) => warn!("cross-core accept failed: {err}"),
            },
        }
    }

    dispatcher.shutdown();
    Ok(())
}

async fn accept_on(listener: Option<&UnixListener>) -> std::io::Result<UnixStream> {
    match listener {
        Some(listener) => listener.accept().await.map(|(stream, _)| stream),
        None => std::future::pending().await,
    }
}

async fn handle_client<B: FfBackend + Send + 'static>(
    dispatcher: &mut Dispatcher<B>,
    mut stream: UnixStream,
    transport: &'static str,
) {
    let mut buf = [0u8; wire::FRAME_MAX];
    let (kind, response) = match read_request(&mut stream, &mut buf).await {
        Ok(request) => {
            let kind = request.kind();
            debug!("{transport} request: {kind:?}");
            (Some(kind), dispatcher.handle(request))
        }
        Err(err) => {
            debug!("{transport} rejected request: {err:#}");
            (None, Response::result(status::INVALID_ARGUMENT))
        }
    };

    let mut out = [0u8; wire::FRAME_MAX];
    let len = match kind {
        Some(kind) => wire::encode_reply(kind, response.result, &response.reply, &mut out),
        // The tag never decoded, so no length table applies; answer with
        // the bare result.
        None => wire::encode_result(response.result, &mut out),
    };
    if let Err(err) = stream.write_all(&out[..len]).await {
        warn!("{transport} reply write failed: {err}");
    }
}

/// Read the header, then exactly the remainder the command tag requires.
async fn read_request(
    stream: &mut UnixStream,
    buf: &mut [u8; wire::FRAME_MAX],
) -> Result<Request> {
    stream
        .read_exact(&mut buf[..wire::MSG_HEADER])
        .await
        .context("reading request header")?;
    let kind = CommandKind::from_wire(buf[wire::OFF_TYPE])?;
    let total = kind.request_len();
    if total > wire::MSG_HEADER {
        stream
            .read_exact(&mut buf[wire::MSG_HEADER..total])
            .await
            .context("reading request payload")?;
    }
    Ok(wire::decode_request(&buf[..total])?)
}
