//! NIP-01 WebSocket endpoint for ephemeral events.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    hub::Hub,
    session::{Session, OUTBOUND_CAPACITY},
    validate::Validator,
};

/// State shared by every connection.
pub struct Relay {
    pub hub: Hub,
    pub validator: Validator,
}

impl Relay {
    pub fn new(validator: Validator) -> Self {
        Self {
            hub: Hub::new(),
            validator,
        }
    }
}

/// Start a WebSocket server speaking the EVENT/REQ/CLOSE subset of NIP-01.
pub async fn serve_ws(
    addr: SocketAddr,
    relay: Arc<Relay>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("websocket listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router(relay).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

fn router(relay: Arc<Relay>) -> Router {
    Router::new().route("/", get(handler)).with_state(relay)
}

/// Handle the HTTP upgrade and spawn the connection processor.
async fn handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(relay): State<Arc<Relay>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move { process(socket, relay, remote.to_string()).await })
}

/// Run one connection: register a session, feed it inbound frames in order,
/// and tear it down when the socket closes or fails, or when the session
/// closes itself because the client stopped reading.
async fn process(socket: WebSocket, relay: Arc<Relay>, remote: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let session = Arc::new(Session::new(remote.clone(), tx));
    relay.hub.register(session.clone());
    info!(%remote, sessions = relay.hub.len(), "websocket opened");

    // Single writer: responses and deliveries from other sessions are
    // serialized here.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(Message::Text(msg.encode())).await.is_err() {
                break;
            }
        }
    });

    while !session.is_closed() {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            _ = session.closed() => break,
        };
        match msg {
            Some(Ok(Message::Text(txt))) => session.handle(&txt, &relay.hub, &relay.validator),
            Some(Ok(Message::Close(frame))) => {
                debug!(%remote, ?frame, "close frame received");
                break;
            }
            // binary frames are not part of the protocol; ping/pong is answered by axum
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                info!(%remote, "websocket error: {e}");
                break;
            }
            None => break,
        }
    }

    relay.hub.deregister(session.id());
    let subscriptions = session.subscription_count();
    session.close();
    writer.abort();
    info!(
        %remote,
        subscriptions,
        sessions = relay.hub.len(),
        "websocket closed"
    );
}
