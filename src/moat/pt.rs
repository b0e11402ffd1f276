//! Managed pluggable-transport client process.
//!
//! Speaks the client side of the PT 1.0 managed-proxy protocol: the
//! transport is configured through `TOR_PT_*` environment variables and
//! reports its SOCKS listener on stdout.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::transport::MeekClient;
use super::{MoatError, MoatResult};

/// One line of PT stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtMessage {
    Version(String),
    VersionError(String),
    EnvError(String),
    ProxyDone,
    ProxyError(String),
    CMethod { transport: String, addr: SocketAddr },
    CMethodError { transport: String, message: String },
    CMethodsDone,
    /// Anything else, including LOG/STATUS lines.
    Other(String),
}

/// Parse one line of managed-transport output.
pub fn parse_pt_line(line: &str) -> PtMessage {
    let line = line.trim();
    let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match keyword {
        "VERSION" => PtMessage::Version(rest.to_string()),
        "VERSION-ERROR" => PtMessage::VersionError(rest.to_string()),
        "ENV-ERROR" => PtMessage::EnvError(rest.to_string()),
        "PROXY" if rest == "DONE" => PtMessage::ProxyDone,
        "PROXY-ERROR" => PtMessage::ProxyError(rest.to_string()),
        "CMETHODS" if rest == "DONE" => PtMessage::CMethodsDone,
        "CMETHOD" => {
            // CMETHOD <transport> socks5 <addr:port> [options]
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            match tokens.as_slice() {
                [transport, "socks5", addr, ..] => match addr.parse() {
                    Ok(addr) => PtMessage::CMethod {
                        transport: transport.to_string(),
                        addr,
                    },
                    Err(_) => PtMessage::Other(line.to_string()),
                },
                _ => PtMessage::Other(line.to_string()),
            }
        }
        "CMETHOD-ERROR" => {
            let (transport, message) = rest.split_once(' ').unwrap_or((rest, ""));
            PtMessage::CMethodError {
                transport: transport.to_string(),
                message: message.to_string(),
            }
        }
        _ => PtMessage::Other(line.to_string()),
    }
}

/// A running managed transport and the SOCKS listener it reported.
pub struct ManagedTransport {
    child: Child,
    stdin: Option<ChildStdin>,
    // Held so the child never writes into a closed pipe.
    _stdout: Lines<BufReader<ChildStdout>>,
    transport: String,
    socks_addr: SocketAddr,
}

impl ManagedTransport {
    /// Spawn `meek` and wait until it reports a SOCKS listener.
    pub async fn launch(
        meek: &MeekClient,
        state_dir: &Path,
        proxy_uri: Option<&str>,
        timeout: Duration,
    ) -> MoatResult<Self> {
        tokio::fs::create_dir_all(state_dir).await?;

        let executable = resolve_executable(&meek.executable);
        let mut command = Command::new(&executable);
        command
            .args(&meek.args)
            .env("TOR_PT_MANAGED_TRANSPORT_VER", "1")
            .env("TOR_PT_CLIENT_TRANSPORTS", &meek.transport)
            .env("TOR_PT_STATE_LOCATION", state_dir)
            .env("TOR_PT_EXIT_ON_STDIN_CLOSE", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(uri) = proxy_uri {
            command.env("TOR_PT_PROXY", uri);
        }

        info!("Starting {} client: {}", meek.transport, executable.display());
        let mut child = command.spawn().map_err(|e| {
            MoatError::Transport(format!(
                "failed to start {}: {}",
                executable.display(),
                e
            ))
        })?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MoatError::Transport("no stdout from transport".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let socks_addr = tokio::time::timeout(
            timeout,
            wait_for_cmethod(&mut lines, &meek.transport, proxy_uri.is_some()),
        )
        .await
        .map_err(|_| {
            MoatError::Transport(format!(
                "{} did not start within {} seconds",
                meek.transport,
                timeout.as_secs()
            ))
        })??;

        info!("{} listening on {}", meek.transport, socks_addr);
        Ok(Self {
            child,
            stdin,
            _stdout: lines,
            transport: meek.transport.clone(),
            socks_addr,
        })
    }

    pub fn socks_addr(&self) -> SocketAddr {
        self.socks_addr
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Close stdin so the transport exits, then make sure it is gone.
    pub async fn shutdown(&mut self) {
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            debug!("Transport already exited: {}", e);
        }
    }
}

/// Bare program names are looked up in `PATH`.
fn resolve_executable(path: &Path) -> PathBuf {
    if path.components().count() == 1 {
        which::which(path).unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

async fn wait_for_cmethod(
    lines: &mut Lines<BufReader<ChildStdout>>,
    transport: &str,
    expect_proxy: bool,
) -> MoatResult<SocketAddr> {
    let mut socks_addr = None;
    let mut proxy_done = false;

    while let Some(line) = lines.next_line().await? {
        debug!("PT: {}", line);
        match parse_pt_line(&line) {
            PtMessage::Version(version) if version != "1" => {
                return Err(MoatError::Transport(format!(
                    "unsupported PT version {}",
                    version
                )));
            }
            PtMessage::VersionError(msg) | PtMessage::EnvError(msg) => {
                return Err(MoatError::Transport(msg));
            }
            PtMessage::ProxyError(msg) => {
                return Err(MoatError::Transport(format!("proxy rejected: {}", msg)));
            }
            PtMessage::ProxyDone => proxy_done = true,
            PtMessage::CMethod {
                transport: name,
                addr,
            } if name == transport => socks_addr = Some(addr),
            PtMessage::CMethodError {
                transport: name,
                message,
            } if name == transport => {
                return Err(MoatError::Transport(message));
            }
            PtMessage::CMethodsDone => {
                if expect_proxy && !proxy_done {
                    return Err(MoatError::Transport(
                        "transport does not support an upstream proxy".to_string(),
                    ));
                }
                return socks_addr.ok_or_else(|| {
                    MoatError::Transport(format!("no CMETHOD reported for {}", transport))
                });
            }
            PtMessage::Other(other) => warn!("Unexpected PT output: {}", other),
            _ => {}
        }
    }

    Err(MoatError::Transport(
        "transport exited before reporting a listener".to_string(),
    ))
}
