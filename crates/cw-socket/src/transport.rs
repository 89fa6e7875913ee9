use cw_core::socket_frame::{DEFAULT_MAX_FRAME_BYTES, ROOT_NAMESPACE};
use cw_core::{ClientMessage, EnginePacket, ServerMessage, SocketPacket};
use futures_util::{Sink, SinkExt, StreamExt};
use std::{sync::Mutex, time::Duration};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{interval, sleep, timeout, Interval, MissedTickBehavior},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::ChannelError;

const ENGINE_PATH: &str = "/socket.io/";
const ENGINE_QUERY: &str = "EIO=3&transport=websocket";
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
}

/// Outbound half of the duplex link. Inbound traffic arrives as
/// [`TransportEvent`]s on the receiver handed out at construction.
pub trait Transport: Send + Sync {
    fn emit(&self, message: ClientMessage) -> Result<(), ChannelError>;

    /// After this returns no further events are produced.
    fn close(&self);
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_frame_bytes: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Where to open the websocket and which namespace to join once it is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEndpoint {
    pub ws_url: Url,
    pub namespace: String,
}

impl SocketEndpoint {
    pub fn from_channel_uri(uri: &Url) -> Result<Self, ChannelError> {
        let scheme = match uri.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ChannelError::UnsupportedScheme(other.to_string())),
        };
        let trimmed = uri.path().trim_end_matches('/');
        let namespace = if trimmed.is_empty() {
            ROOT_NAMESPACE.to_string()
        } else {
            trimmed.to_string()
        };

        let mut ws_url = uri.clone();
        ws_url
            .set_scheme(scheme)
            .map_err(|_| ChannelError::UnsupportedScheme(uri.scheme().to_string()))?;
        ws_url.set_path(ENGINE_PATH);
        ws_url.set_query(Some(ENGINE_QUERY));
        ws_url.set_fragment(None);
        Ok(Self { ws_url, namespace })
    }
}

/// Socket.IO client over a reconnecting websocket.
pub struct SocketIoTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SocketIoTransport {
    /// Must be called from within a tokio runtime.
    pub fn connect(
        uri: &Url,
        options: TransportOptions,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), ChannelError> {
        let endpoint = SocketEndpoint::from_channel_uri(uri)?;
        let (event_tx, event_rx) = mpsc::channel(256);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(socket_loop(endpoint, options, event_tx, out_rx));
        Ok((
            Self {
                outbound: Mutex::new(Some(out_tx)),
                task: Mutex::new(Some(task)),
            },
            event_rx,
        ))
    }
}

impl Transport for SocketIoTransport {
    fn emit(&self, message: ClientMessage) -> Result<(), ChannelError> {
        let outbound = self.outbound.lock().unwrap_or_else(|err| err.into_inner());
        match outbound.as_ref() {
            Some(tx) => tx.send(message).map_err(|_| ChannelError::TransportClosed),
            None => Err(ChannelError::TransportClosed),
        }
    }

    fn close(&self) {
        // Dropping the sender lets an open session send its close frame.
        self.outbound
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take()
        {
            tokio::spawn(async move {
                sleep(Duration::from_millis(500)).await;
                task.abort();
            });
        }
    }
}

enum SessionEnd {
    Lost,
    Shutdown,
}

async fn socket_loop(
    endpoint: SocketEndpoint,
    options: TransportOptions,
    events: mpsc::Sender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
) {
    let mut backoff = options.initial_backoff;
    loop {
        debug!("socket_connecting: {}", endpoint.ws_url);
        let connect = timeout(options.connect_timeout, connect_async(endpoint.ws_url.as_str())).await;
        let ws = match connect {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(err)) => {
                warn!("socket_connect_error: {err}");
                if events.is_closed() {
                    return;
                }
                sleep(backoff).await;
                backoff = next_backoff(backoff, options.max_backoff);
                continue;
            }
            Err(_) => {
                warn!(
                    "socket_connect_timeout: no response within {:?}",
                    options.connect_timeout
                );
                if events.is_closed() {
                    return;
                }
                sleep(backoff).await;
                backoff = next_backoff(backoff, options.max_backoff);
                continue;
            }
        };
        backoff = options.initial_backoff;

        match run_session(&endpoint, &options, ws, &events, &mut outbound).await {
            SessionEnd::Shutdown => return,
            SessionEnd::Lost => {
                info!("socket_session_lost: {}", endpoint.ws_url);
                sleep(backoff).await;
                backoff = next_backoff(backoff, options.max_backoff);
            }
        }
    }
}

async fn run_session(
    endpoint: &SocketEndpoint,
    options: &TransportOptions,
    ws: SocketStream,
    events: &mpsc::Sender<TransportEvent>,
    outbound: &mut mpsc::UnboundedReceiver<ClientMessage>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();
    let mut ticker: Option<Interval> = None;
    let mut joined = false;
    let mut queued: Vec<ClientMessage> = Vec::new();

    let end = loop {
        tokio::select! {
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break SessionEnd::Lost,
                    Some(Ok(_)) => continue,
                };
                let packet = match EnginePacket::decode(&text, options.max_frame_bytes) {
                    Ok(packet) => packet,
                    Err(err) => {
                        warn!("socket_frame_error: {err}");
                        continue;
                    }
                };
                match packet {
                    EnginePacket::Open(handshake) => {
                        let period = Duration::from_millis(if handshake.ping_interval == 0 {
                            DEFAULT_PING_INTERVAL_MS
                        } else {
                            handshake.ping_interval
                        });
                        let mut next = interval(period);
                        next.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        next.reset();
                        ticker = Some(next);
                        if endpoint.namespace != ROOT_NAMESPACE {
                            let join = SocketPacket::Connect {
                                namespace: endpoint.namespace.clone(),
                            };
                            let frame = EnginePacket::Message(join.encode()).encode();
                            if sink.send(Message::Text(frame)).await.is_err() {
                                break SessionEnd::Lost;
                            }
                        }
                    }
                    EnginePacket::Ping(probe) => {
                        let frame = EnginePacket::Pong(probe).encode();
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break SessionEnd::Lost;
                        }
                    }
                    EnginePacket::Message(body) => {
                        let packet = match SocketPacket::decode(&body, options.max_frame_bytes) {
                            Ok(packet) => packet,
                            Err(err) => {
                                warn!("socket_packet_error: {err}");
                                continue;
                            }
                        };
                        if packet.namespace() != endpoint.namespace {
                            continue;
                        }
                        match packet {
                            SocketPacket::Connect { .. } => {
                                joined = true;
                                if events.send(TransportEvent::Connected).await.is_err() {
                                    break SessionEnd::Shutdown;
                                }
                                let mut flush_failed = false;
                                for message in queued.drain(..) {
                                    if !send_client_message(&mut sink, &endpoint.namespace, &message).await {
                                        flush_failed = true;
                                        break;
                                    }
                                }
                                if flush_failed {
                                    break SessionEnd::Lost;
                                }
                            }
                            SocketPacket::Disconnect { .. } => break SessionEnd::Lost,
                            SocketPacket::Event { ref name, .. } => {
                                match ServerMessage::from_named(name, packet.first_arg()) {
                                    Ok(Some(message)) => {
                                        if events.send(TransportEvent::Message(message)).await.is_err() {
                                            break SessionEnd::Shutdown;
                                        }
                                    }
                                    Ok(None) => debug!("socket_event_ignored: {name}"),
                                    Err(err) => warn!("socket_event_decode_error: {err}"),
                                }
                            }
                            SocketPacket::Error { ref data, .. } => {
                                warn!("socket_error_packet: {data}");
                            }
                            SocketPacket::Ack { .. } => {}
                        }
                    }
                    EnginePacket::Close => break SessionEnd::Lost,
                    EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
                }
            }
            _ = next_tick(&mut ticker) => {
                let frame = EnginePacket::Ping(None).encode();
                if sink.send(Message::Text(frame)).await.is_err() {
                    break SessionEnd::Lost;
                }
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    let _ = sink.send(Message::Text(EnginePacket::Close.encode())).await;
                    let _ = sink.close().await;
                    break SessionEnd::Shutdown;
                };
                if !joined {
                    queued.push(message);
                    continue;
                }
                if !send_client_message(&mut sink, &endpoint.namespace, &message).await {
                    break SessionEnd::Lost;
                }
            }
        }
    };

    if joined && matches!(end, SessionEnd::Lost) && events.send(TransportEvent::Disconnected).await.is_err() {
        return SessionEnd::Shutdown;
    }
    end
}

async fn send_client_message<S>(sink: &mut S, namespace: &str, message: &ClientMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    let packet = SocketPacket::event(namespace, message.name(), message.payload());
    let frame = EnginePacket::Message(packet.encode()).encode();
    sink.send(Message::Text(frame)).await.is_ok()
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}
