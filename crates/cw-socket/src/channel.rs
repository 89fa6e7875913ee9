use cw_core::{ClientMessage, ServerMessage};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::collaborators::{Connection, Host};
use crate::onboarding::Onboarding;
use crate::prefs::Preferences;
use crate::resolver::ProjectResolver;
use crate::transport::{SocketIoTransport, Transport, TransportEvent, TransportOptions};
use crate::ChannelError;

/// Why a pending handshake did not complete.
#[derive(Debug, Clone)]
enum AuthFailure {
    Rejected(String),
    Interrupted,
}

type AuthWaiter = oneshot::Sender<Result<(), AuthFailure>>;

/// Channel endpoint for `namespace` under the connection's base url.
pub fn channel_uri(base: &Url, namespace: &str) -> Result<Url, ChannelError> {
    if namespace.starts_with('/') {
        return Err(ChannelError::InvalidNamespace(namespace.to_string()));
    }
    if namespace.is_empty() {
        return Ok(base.clone());
    }
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(namespace)
        .map_err(|err| ChannelError::InvalidUrl(err.to_string()))
}

/// Per-connection realtime channel. Receives control-plane events and
/// routes them to the project they name.
pub struct EventChannel {
    uri: Url,
    pub(crate) connection: Arc<dyn Connection>,
    transport: Arc<dyn Transport>,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) resolver: ProjectResolver,
    pub(crate) onboarding: Onboarding,
    connected: AtomicBool,
    authorized: AtomicBool,
    disposed: AtomicBool,
    auth_waiters: Mutex<Vec<AuthWaiter>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl EventChannel {
    /// Opens a Socket.IO transport for the connection and starts the event pump.
    pub fn open(
        connection: Arc<dyn Connection>,
        namespace: &str,
        host: Arc<dyn Host>,
        prefs: Preferences,
        options: TransportOptions,
    ) -> Result<Arc<Self>, ChannelError> {
        let uri = channel_uri(connection.url(), namespace)?;
        info!("creating event channel @ {uri}");
        let (transport, events) = SocketIoTransport::connect(&uri, options)?;
        let channel = Self::with_transport(connection, uri, Arc::new(transport), host, prefs);
        channel.spawn_pump(events);
        Ok(channel)
    }

    /// Builds a channel around an existing transport. Events are delivered
    /// through [`EventChannel::on_transport_event`] or a receiver handed to
    /// [`EventChannel::spawn_pump`].
    pub fn with_transport(
        connection: Arc<dyn Connection>,
        uri: Url,
        transport: Arc<dyn Transport>,
        host: Arc<dyn Host>,
        prefs: Preferences,
    ) -> Arc<Self> {
        let trusted = !connection.is_remote();
        if trusted {
            debug!("{uri} is local, skipping socket authentication");
        }
        Arc::new(Self {
            uri,
            resolver: ProjectResolver::new(Arc::clone(&connection)),
            onboarding: Onboarding::new(Arc::clone(&host), prefs),
            connection,
            transport,
            host,
            connected: AtomicBool::new(false),
            authorized: AtomicBool::new(trusted),
            disposed: AtomicBool::new(false),
            auth_waiters: Mutex::new(Vec::new()),
            pump: Mutex::new(None),
        })
    }

    pub fn spawn_pump(self: &Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(channel) = weak.upgrade() else {
                    break;
                };
                channel.on_transport_event(event);
            }
        });
        let previous = self
            .pump
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn on_transport_event(self: &Arc<Self>, event: TransportEvent) {
        if self.is_disposed() {
            return;
        }
        match event {
            TransportEvent::Connected => {
                info!("event channel connected @ {}", self.uri);
                self.connected.store(true, Ordering::SeqCst);
                self.connection.on_connect();
            }
            TransportEvent::Disconnected => {
                info!("event channel disconnected @ {}", self.uri);
                self.connected.store(false, Ordering::SeqCst);
                if self.connection.is_remote() {
                    self.authorized.store(false, Ordering::SeqCst);
                    self.settle_auth(Err(AuthFailure::Interrupted));
                }
                self.connection.on_disconnect();
            }
            TransportEvent::Message(ServerMessage::Authenticated) => {
                info!("event channel authenticated @ {}", self.uri);
                self.authorized.store(true, Ordering::SeqCst);
                self.settle_auth(Ok(()));
            }
            TransportEvent::Message(ServerMessage::Unauthorized { message }) => {
                warn!("event channel unauthorized @ {}: {message}", self.uri);
                if self.connection.is_remote() {
                    self.authorized.store(false, Ordering::SeqCst);
                }
                self.settle_auth(Err(AuthFailure::Rejected(message)));
            }
            TransportEvent::Message(ServerMessage::Event(event)) => {
                let channel = Arc::clone(self);
                tokio::spawn(async move {
                    channel.handle_event(event).await;
                });
            }
        }
    }

    /// Sends the token and waits for the server's verdict. There is no
    /// deadline; a disconnect or dispose fails any pending call.
    pub async fn authenticate(&self, token: &str) -> Result<(), ChannelError> {
        if self.is_disposed() {
            return Err(ChannelError::Disposed);
        }
        debug!("authenticating event channel @ {}", self.uri);
        let (tx, rx) = oneshot::channel();
        self.auth_waiters
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(tx);
        self.transport.emit(ClientMessage::Authentication {
            token: token.to_string(),
        })?;
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(AuthFailure::Rejected(message))) => Err(ChannelError::Unauthorized(message)),
            Ok(Err(AuthFailure::Interrupted)) => Err(ChannelError::Disconnected),
            Err(_) => Err(ChannelError::Disposed),
        }
    }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("disposing event channel @ {}", self.uri);
        self.connected.store(false, Ordering::SeqCst);
        self.connection.on_disconnect();
        self.transport.close();
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take()
        {
            pump.abort();
        }
        self.auth_waiters
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clear();
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    /// Connected and, for remote connections, authenticated.
    pub fn is_ready(&self) -> bool {
        self.is_connected() && self.is_authorized()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn settle_auth(&self, outcome: Result<(), AuthFailure>) {
        let waiters: Vec<AuthWaiter> = self
            .auth_waiters
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .drain(..)
            .collect();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventChannel @ {}", self.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_uri_appends_namespace() {
        let base = Url::parse("http://localhost:9090").expect("url");
        let uri = channel_uri(&base, "default").expect("uri");
        assert_eq!(uri.as_str(), "http://localhost:9090/default");
    }

    #[test]
    fn channel_uri_keeps_base_path() {
        let base = Url::parse("https://gateway.example.com/cw/tenant").expect("url");
        let uri = channel_uri(&base, "default").expect("uri");
        assert_eq!(uri.as_str(), "https://gateway.example.com/cw/tenant/default");
    }

    #[test]
    fn channel_uri_empty_namespace_is_base() {
        let base = Url::parse("http://localhost:9090/").expect("url");
        assert_eq!(channel_uri(&base, "").expect("uri"), base);
    }

    #[test]
    fn channel_uri_rejects_leading_slash() {
        let base = Url::parse("http://localhost:9090/").expect("url");
        assert!(matches!(
            channel_uri(&base, "/default"),
            Err(ChannelError::InvalidNamespace(ns)) if ns == "/default"
        ));
    }
}
