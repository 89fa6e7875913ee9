mod config;
mod console_host;
mod http_directory;
mod logging;

use anyhow::Context;
use clap::Parser;
use cw_socket::{Connection, EventChannel, FilePreferenceStore, Preferences, TransportOptions};
use std::{env, path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use url::Url;

use crate::config::{
    config_path, default_prefs_path, load_config, resolve_log_dir, resolve_log_stdout,
    resolve_url, save_config,
};
use crate::console_host::ConsoleHost;
use crate::http_directory::HttpConnection;

const REAUTH_POLL: Duration = Duration::from_secs(1);
/// A handshake with no verdict by then is retried on a later tick.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "cw-agent", about = "Follow project events from a control plane")]
struct Args {
    /// Control plane base url.
    #[arg(long)]
    url: Option<String>,
    /// Socket namespace, without a leading slash.
    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    label: Option<String>,
    /// Require token authentication on the event channel.
    #[arg(long)]
    remote: bool,
    #[arg(long, env = "CW_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    log_dir: Option<String>,
    /// Preferences file for one-time prompts and onboarding toggles.
    #[arg(long)]
    prefs: Option<PathBuf>,
    /// Write the effective config file and exit.
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_file = config_path(args.config.as_deref());
    let mut config = load_config(&config_file)?;

    if args.init_config {
        if let Some(url) = args.url.clone() {
            config.connection.url = url;
        }
        if let Some(namespace) = args.namespace.clone() {
            config.connection.namespace = namespace;
        }
        if let Some(label) = args.label.clone() {
            config.connection.label = label;
        }
        config.connection.remote |= args.remote;
        save_config(&config_file, &config)
            .with_context(|| format!("failed to write {}", config_file.display()))?;
        println!("{}", config_file.display());
        return Ok(());
    }

    let label = args
        .label
        .clone()
        .unwrap_or_else(|| config.connection.label.clone());
    let log_dir = resolve_log_dir(args.log_dir.as_deref(), &config);
    let _log_guard = logging::init_logging(&log_dir, &label, resolve_log_stdout());
    info!("config: {}", config_file.display());

    let url = resolve_url(args.url.as_deref(), &config.connection);
    let url = Url::parse(&url).with_context(|| format!("invalid control plane url {url}"))?;
    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| config.connection.namespace.clone());
    let remote = args.remote || config.connection.remote;
    let token = args.token.clone().filter(|token| !token.trim().is_empty());
    if remote && token.is_none() {
        anyhow::bail!("remote connections need a token (--token or CW_TOKEN)");
    }

    let workspace = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let connection = Arc::new(HttpConnection::new(
        url,
        label,
        remote,
        token.clone(),
        workspace,
    )?);
    if let Err(err) = connection.update_projects().await {
        warn!("initial project list unavailable: {err}");
    }
    info!(
        "{} projects known on {}",
        connection.project_count(),
        connection.url()
    );

    let prefs_path = args
        .prefs
        .clone()
        .or_else(|| config.prefs_path.clone())
        .unwrap_or_else(default_prefs_path);
    let prefs = Preferences::new(
        Arc::new(FilePreferenceStore::open(prefs_path)),
        config.onboarding,
    );

    let channel = EventChannel::open(
        connection,
        &namespace,
        Arc::new(ConsoleHost),
        prefs,
        TransportOptions::default(),
    )?;
    info!("listening on {channel}");

    let auth_task =
        token.map(|token| tokio::spawn(keep_authenticated(Arc::clone(&channel), token)));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    channel.dispose();
    if let Some(task) = auth_task {
        task.abort();
    }
    Ok(())
}

/// Remote channels lose authorization on every disconnect, so the handshake
/// is repeated whenever the channel is connected but not authorized.
async fn keep_authenticated(channel: Arc<EventChannel>, token: String) {
    let mut ticker = tokio::time::interval(REAUTH_POLL);
    loop {
        ticker.tick().await;
        if channel.is_disposed() {
            return;
        }
        if !channel.is_connected() || channel.is_authorized() {
            continue;
        }
        try_authenticate(&channel, &token, AUTH_TIMEOUT).await;
    }
}

async fn try_authenticate(channel: &EventChannel, token: &str, limit: Duration) -> bool {
    match tokio::time::timeout(limit, channel.authenticate(token)).await {
        Ok(Ok(())) => {
            info!("authenticated {channel}");
            true
        }
        Ok(Err(err)) => {
            error!("authentication failed for {channel}: {err}");
            false
        }
        Err(_) => {
            warn!("no authentication verdict for {channel} after {limit:?}, retrying");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_core::{ClientMessage, ServerMessage};
    use cw_socket::{ChannelError, OnboardingSettings, Transport, TransportEvent};

    /// Accepts every message and never answers.
    struct SilentTransport;

    impl Transport for SilentTransport {
        fn emit(&self, _message: ClientMessage) -> Result<(), ChannelError> {
            Ok(())
        }

        fn close(&self) {}
    }

    fn remote_channel() -> Arc<EventChannel> {
        let url = Url::parse("https://cw.example.com").expect("url");
        let connection = HttpConnection::new(
            url.clone(),
            "remote",
            true,
            Some("t".to_string()),
            PathBuf::from("/workspace"),
        )
        .expect("connection");
        EventChannel::with_transport(
            Arc::new(connection),
            url,
            Arc::new(SilentTransport),
            Arc::new(ConsoleHost),
            Preferences::in_memory(OnboardingSettings::default()),
        )
    }

    #[tokio::test]
    async fn unanswered_handshake_times_out() {
        let channel = remote_channel();
        channel.on_transport_event(TransportEvent::Connected);

        assert!(!try_authenticate(&channel, "t", Duration::from_millis(50)).await);
        assert!(channel.is_connected());
        assert!(!channel.is_authorized());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn answered_handshake_authorizes() {
        let channel = remote_channel();
        channel.on_transport_event(TransportEvent::Connected);

        let acker = Arc::clone(&channel);
        let ack = async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            acker.on_transport_event(TransportEvent::Message(ServerMessage::Authenticated));
        };
        let (authorized, ()) =
            tokio::join!(try_authenticate(&channel, "t", Duration::from_secs(5)), ack);
        assert!(authorized);
        assert!(channel.is_ready());
    }
}
