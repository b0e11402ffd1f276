//! Control port client over TCP.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::protocol::{format_setconf, quote_value, split_status_line, ControlReply};
use super::{ConfSetting, ControlError, ControlResult, TorDaemon};

/// Upper bound on establishing the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How to authenticate to the control port.
#[derive(Debug, Clone, Default)]
pub enum ControlAuth {
    /// `CookieAuthentication 0` and no password.
    #[default]
    Null,
    /// `HashedControlPassword`.
    Password(String),
    /// `CookieAuthentication 1`; the path to `control_auth_cookie`.
    Cookie(PathBuf),
}

/// Authenticated connection to a Tor control port.
pub struct TorControlPort {
    stream: Mutex<BufStream<TcpStream>>,
    address: String,
}

impl TorControlPort {
    /// Connect to `address` (e.g. `127.0.0.1:9151`) and authenticate.
    pub async fn connect(address: &str, auth: &ControlAuth) -> ControlResult<Self> {
        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
            .await
            .map_err(|_| {
                ControlError::Connection(format!("timed out connecting to {}", address))
            })?
            .map_err(|e| ControlError::Connection(format!("{}: {}", address, e)))?;

        let mut stream = BufStream::new(tcp);
        let command = authenticate_command(auth).await?;
        let reply = send_command(&mut stream, &command).await?;
        if !reply.is_ok() {
            return Err(ControlError::Authentication(reply.lines.join(" ")));
        }
        info!("Authenticated to Tor control port at {}", address);

        Ok(Self {
            stream: Mutex::new(stream),
            address: address.to_string(),
        })
    }

    /// Address this client is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn command(&self, command: &str) -> ControlResult<ControlReply> {
        let mut stream = self.stream.lock().await;
        send_command(&mut *stream, command).await?.into_result()
    }
}

#[async_trait]
impl TorDaemon for TorControlPort {
    async fn get_conf(&self, key: &str) -> ControlResult<Vec<String>> {
        let reply = self.command(&format!("GETCONF {}", key)).await?;
        Ok(reply.values_for(key))
    }

    async fn set_conf(&self, settings: &[ConfSetting]) -> ControlResult<()> {
        if settings.is_empty() {
            return Ok(());
        }
        let keys: Vec<&str> = settings.iter().map(|s| s.key.as_str()).collect();
        debug!("SETCONF {}", keys.join(" "));
        self.command(&format_setconf(settings)).await?;
        Ok(())
    }
}

async fn authenticate_command(auth: &ControlAuth) -> ControlResult<String> {
    match auth {
        ControlAuth::Null => Ok("AUTHENTICATE".to_string()),
        ControlAuth::Password(password) => Ok(format!("AUTHENTICATE {}", quote_value(password))),
        ControlAuth::Cookie(path) => {
            let cookie = tokio::fs::read(path).await.map_err(|e| {
                ControlError::Authentication(format!(
                    "cannot read cookie file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Ok(format!("AUTHENTICATE {}", hex::encode(cookie)))
        }
    }
}

/// Write one command and read its complete reply.
pub(crate) async fn send_command<S>(stream: &mut S, command: &str) -> ControlResult<ControlReply>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    stream.write_all(command.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    read_reply(stream).await
}

/// Read one (possibly multi-line) reply.
pub(crate) async fn read_reply<R>(reader: &mut R) -> ControlResult<ControlReply>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let line = read_line(reader).await?;
        let (code, sep, text) = split_status_line(&line)?;
        match sep {
            '-' => lines.push(text.to_string()),
            '+' => {
                let mut data = text.to_string();
                loop {
                    let data_line = read_line(reader).await?;
                    if data_line == "." {
                        break;
                    }
                    data.push('\n');
                    // leading dots are escaped by doubling
                    data.push_str(data_line.strip_prefix('.').unwrap_or(&data_line));
                }
                lines.push(data);
            }
            _ => {
                lines.push(text.to_string());
                return Ok(ControlReply { code, lines });
            }
        }
    }
}

async fn read_line<R>(reader: &mut R) -> ControlResult<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ControlError::Connection(
            "control port closed the connection".into(),
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
