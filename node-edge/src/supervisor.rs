use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::dispatcher::{self, DispatchEvent};
use crate::env::EnvProvisioner;
use crate::error::BridgeError;
use crate::handle::EngineContext;
use crate::transport;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_QUEUE_CAPACITY: usize = 1000;

/// Everything the child supervisor's `start()` hands back to the engine:
/// the shared context proxies submit work through and report frees into,
/// the child process itself, and the background tasks' join handles so
/// `stop()` can tear them down in order.
pub(crate) struct RunningEngine {
    pub(crate) context: Arc<EngineContext>,
    pub(crate) env_dir: PathBuf,
    events: mpsc::Sender<DispatchEvent>,
    child: Child,
    reader_handle: JoinHandle<()>,
    dispatcher_handle: JoinHandle<()>,
    free_forwarder_handle: JoinHandle<()>,
}

/// Runs the five-step startup sequence from spec.md §4.2 over
/// `tokio::net`/`tokio::process` instead of raw OS threads, matching how the
/// teacher's `execution.rs` supervises its own proxy child.
#[instrument(skip(provisioner), fields(installer = %installer_bin))]
pub(crate) async fn start(
    provisioner: &EnvProvisioner,
    installer_bin: &str,
    debug: bool,
) -> Result<RunningEngine, BridgeError> {
    let env_dir = provisioner.create_env().await?;

    let listener = TcpListener::bind("[::1]:0").await.map_err(|err| {
        tracing::warn!(%err, "could not bind loopback listener");
        BridgeError::EngineStart(CONNECT_TIMEOUT)
    })?;
    let port = listener
        .local_addr()
        .map_err(|err| {
            tracing::warn!(%err, "could not read bound listener's port");
            BridgeError::EngineStart(CONNECT_TIMEOUT)
        })?
        .port();

    let stdio = || if debug { Stdio::inherit() } else { Stdio::null() };
    let child = Command::new(installer_bin)
        .args(["run", "node_edge_runtime", "--", &port.to_string()])
        .current_dir(&env_dir)
        .stdin(stdio())
        .stdout(stdio())
        .stderr(stdio())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            tracing::warn!(%err, "could not spawn child process");
            BridgeError::EngineStart(CONNECT_TIMEOUT)
        })?;

    debug!(port, env_dir = %env_dir.display(), "child spawned, waiting for connect-back");

    let (stream, _addr) = tokio::time::timeout(CONNECT_TIMEOUT, listener.accept())
        .await
        .map_err(|_| BridgeError::EngineStart(CONNECT_TIMEOUT))?
        .map_err(|err| {
            tracing::warn!(%err, "accept failed while waiting for child connect-back");
            BridgeError::EngineStart(CONNECT_TIMEOUT)
        })?;
    drop(listener);

    let (read_half, write_half) = stream.into_split();

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let reader_handle = transport::spawn_reader(read_half, events_tx.clone());
    let dispatcher_handle = tokio::spawn(dispatcher::run(write_half, events_rx));

    let (context, mut free_rx) = EngineContext::new(events_tx.clone());
    let forwarder_events = events_tx.clone();
    let free_forwarder_handle = tokio::spawn(async move {
        while let Some(pointer_id) = free_rx.recv().await {
            if forwarder_events
                .send(DispatchEvent::Free(pointer_id))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    Ok(RunningEngine {
        context,
        env_dir,
        events: events_tx,
        child,
        reader_handle,
        dispatcher_handle,
        free_forwarder_handle,
    })
}

/// Runs the four-step shutdown sequence from spec.md §4.2.
#[instrument(skip(running))]
pub(crate) async fn stop(mut running: RunningEngine) -> Result<(), BridgeError> {
    running.context.close();
    running.reader_handle.abort();
    let _ = running.events.send(DispatchEvent::Finish).await;
    let _ = running.dispatcher_handle.await;
    running.free_forwarder_handle.abort();

    let status = running
        .child
        .wait()
        .await
        .map_err(|err| BridgeError::EnvSetup(format!("could not wait on child: {err}")))?;
    debug!(?status, "child exited");

    Ok(())
}
