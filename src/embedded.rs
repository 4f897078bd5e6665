//! Embedded-server bootstrap: choose a free ephemeral port, spawn
//! `ktserver` as a child process, supervise and restart it, reap it on
//! exit, and connect a [`KtClient`] to it once it's accepting connections.

use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex as StdMutex, Once};
use std::time::Duration;

use log::{debug, error, info, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::OnceCell;

use crate::client::KtClient;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::{MAX_CONNECTIONS, RANGE_FROM, RANGE_TO};

static EMBEDDED_CLIENT: OnceCell<KtClient> = OnceCell::const_new();
static SIGNAL_HANDLER_INSTALLED: Once = Once::new();

/// pid of whichever `ktserver` child is currently alive, so the
/// once-installed signal watcher always terminates the live process rather
/// than one already reaped by a previous restart.
static CURRENT_CHILD: Mutex<Option<Pid>> = parking_lot::const_mutex(None);
static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Signaled by the supervisor thread once `child.wait()` returns during a
/// shutdown, so the signal watcher can block until the child is actually
/// reaped before re-raising the signal's default disposition on itself.
static CHILD_REAPED: (StdMutex<bool>, Condvar) = (StdMutex::new(false), Condvar::new());

/// Start (or return the already-started) embedded Kyoto Tycoon server and a
/// client connected to it. The embedded client is a process-wide singleton:
/// once any caller has successfully bootstrapped one, every later call to
/// `embedded` returns the same [`KtClient`], regardless of the arguments
/// passed.
pub async fn embedded(
    args: Vec<String>,
    timeout: Option<Duration>,
    max_connections: usize,
    range_from: u16,
    range_to: u16,
) -> Result<KtClient> {
    if let Some(client) = EMBEDDED_CLIENT.get() {
        return Ok(client.clone());
    }

    let port = select_free_port(range_from, range_to)?;
    spawn_supervisor(port, args);

    let config = ClientConfig::new("127.0.0.1", port)
        .with_max_connections(max_connections)
        .with_timeout(timeout.unwrap_or(Duration::from_secs(5)));

    let client = connect_with_retries(config).await?;

    match EMBEDDED_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        // Lost a race with another caller; their instance is authoritative.
        Err(_) => Ok(EMBEDDED_CLIENT
            .get()
            .expect("just lost the race to set it, so it must be set now")
            .clone()),
    }
}

/// Start an embedded server with library defaults for range and connection
/// limits.
pub async fn embedded_default() -> Result<KtClient> {
    embedded(Vec::new(), None, MAX_CONNECTIONS, RANGE_FROM, RANGE_TO).await
}

/// Probe `127.0.0.1:<port>` for `port` in `[range_from, range_to]`, binding
/// and immediately releasing each candidate, up to 20 attempts. The first
/// successful bind is the port returned — earlier Python implementations of
/// this client kept looping and used only the *last* successful probe,
/// which silently discarded all but one candidate for no documented reason;
/// this implementation stops at the first success instead.
fn select_free_port(range_from: u16, range_to: u16) -> Result<u16> {
    let mut rng = rand::thread_rng();
    for attempt in 0..20 {
        let candidate = rng.gen_range(range_from..=range_to);
        match TcpListener::bind(("127.0.0.1", candidate)) {
            Ok(listener) => {
                drop(listener);
                debug!("selected port {} on attempt {}", candidate, attempt + 1);
                std::thread::sleep(Duration::from_millis(200));
                return Ok(candidate);
            }
            Err(_) => {
                std::thread::sleep(Duration::from_millis(200));
                continue;
            }
        }
    }
    Err(Error::EmbeddedStartupError(format!(
        "no free port found in [{}, {}] after 20 attempts",
        range_from, range_to
    )))
}

/// Spawn the detached background supervisor thread. It owns the `ktserver`
/// child process: on every unexpected exit it restarts after a 10 second
/// cooldown and logs a critical error; on a deliberate shutdown signal
/// delivered to this process it terminates the child and lets the signal
/// proceed to its default disposition.
fn spawn_supervisor(port: u16, args: Vec<String>) {
    install_signal_forwarder();

    std::thread::spawn(move || loop {
        if SHUTTING_DOWN.load(Ordering::SeqCst) {
            break;
        }

        let mut child = match Command::new("ktserver")
            .arg("-le")
            .arg("-host")
            .arg("127.0.0.1")
            .arg("-port")
            .arg(port.to_string())
            .args(&args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                error!("failed to spawn ktserver: {}", err);
                std::thread::sleep(Duration::from_secs(10));
                continue;
            }
        };

        *CURRENT_CHILD.lock() = Some(Pid::from_raw(child.id() as i32));

        match child.wait() {
            Ok(status) => {
                *CURRENT_CHILD.lock() = None;
                if SHUTTING_DOWN.load(Ordering::SeqCst) {
                    debug!("ktserver exited during process shutdown: {}", status);
                    let (lock, cvar) = &CHILD_REAPED;
                    *lock.lock().expect("child-reaped mutex poisoned") = true;
                    cvar.notify_all();
                    break;
                }
                error!("ktserver died!");
            }
            Err(err) => {
                *CURRENT_CHILD.lock() = None;
                if SHUTTING_DOWN.load(Ordering::SeqCst) {
                    let (lock, cvar) = &CHILD_REAPED;
                    *lock.lock().expect("child-reaped mutex poisoned") = true;
                    cvar.notify_all();
                    break;
                }
                error!("failed to wait on ktserver: {}", err);
            }
        }

        std::thread::sleep(Duration::from_secs(10));
    });
}

/// Install (once, process-wide) a background thread that watches for
/// termination signals and, on receipt, sends `SIGTERM` to whichever
/// `ktserver` child is currently alive and waits for it — the Rust
/// equivalent of the Python client's `atexit.register`-based cleanup.
fn install_signal_forwarder() {
    SIGNAL_HANDLER_INSTALLED.call_once(|| {
        std::thread::spawn(move || {
            use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
            use signal_hook::iterator::Signals;

            let mut signals = match Signals::new([SIGTERM, SIGINT, SIGQUIT]) {
                Ok(signals) => signals,
                Err(err) => {
                    error!("failed to install signal handler: {}", err);
                    return;
                }
            };

            if let Some(signal) = signals.forever().next() {
                SHUTTING_DOWN.store(true, Ordering::SeqCst);
                info!("received signal {}, terminating ktserver", signal);
                let pid = *CURRENT_CHILD.lock();
                if let Some(pid) = pid {
                    let _ = kill(pid, Signal::SIGTERM);
                }

                if pid.is_some() {
                    let (lock, cvar) = &CHILD_REAPED;
                    let mut reaped = lock.lock().expect("child-reaped mutex poisoned");
                    while !*reaped {
                        let (guard, result) = cvar
                            .wait_timeout(reaped, Duration::from_secs(5))
                            .expect("child-reaped mutex poisoned");
                        reaped = guard;
                        if result.timed_out() {
                            warn!("timed out waiting for ktserver to exit; terminating anyway");
                            break;
                        }
                    }
                }

                signal_hook::low_level::emulate_default_handler(signal).ok();
            }
        });
    });
}

async fn connect_with_retries(config: ClientConfig) -> Result<KtClient> {
    let mut last_err = None;
    for _ in 0..20 {
        match KtClient::connect(config.clone()).await {
            Ok(client) => return Ok(client),
            Err(err) => {
                last_err = Some(err);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
    Err(Error::EmbeddedStartupError(format!(
        "embedded server never started accepting connections: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}
