//! Control port client against a scripted TCP server.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use torbridge::control::{ControlAuth, ControlError, TorControlPort, TorDaemon};
use torbridge::prefs::Preferences;
use torbridge::{BridgeConfigResolver, BridgeConfiguration, BridgeError, BridgeSource};

/// Accept one connection and answer each command with `reply(command)`.
async fn spawn_control_port<F>(reply: F) -> (String, Arc<Mutex<Vec<String>>>)
where
    F: Fn(&str) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let commands = Arc::new(Mutex::new(Vec::new()));
    let seen = commands.clone();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.lock().unwrap().push(line.clone());
            let response = reply(&line);
            if write.write_all(response.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    (addr, commands)
}

fn tor(command: &str) -> String {
    match command {
        c if c.starts_with("AUTHENTICATE") => "250 OK\r\n".into(),
        "GETCONF Bridge" => "250-Bridge=obfs4 192.0.2.1:443 AAAA\r\n250 Bridge=\"obfs4 192.0.2.2:443 BBBB\"\r\n".into(),
        c if c.starts_with("GETCONF ") => format!("250 {}\r\n", &c[8..]),
        c if c.starts_with("SETCONF") => "250 OK\r\n".into(),
        _ => "510 Unrecognized command\r\n".into(),
    }
}

#[tokio::test]
async fn test_read_and_write_through_control_port() {
    let (addr, commands) = spawn_control_port(tor).await;
    let daemon = TorControlPort::connect(&addr, &ControlAuth::Password("secret".into()))
        .await
        .unwrap();
    let resolver =
        BridgeConfigResolver::new(Arc::new(Preferences::in_memory()), Arc::new(daemon));

    let config = resolver.read_settings().await.unwrap();
    assert_eq!(config.source(), BridgeSource::UserProvided);
    assert_eq!(
        config.bridge_lines(),
        ["obfs4 192.0.2.1:443 AAAA", "obfs4 192.0.2.2:443 BBBB"]
    );

    resolver
        .write_settings(&BridgeConfiguration::none())
        .await
        .unwrap();

    let commands = commands.lock().unwrap();
    assert_eq!(commands[0], "AUTHENTICATE \"secret\"");
    assert_eq!(commands.last().unwrap(), "SETCONF UseBridges Bridge");
}

#[tokio::test]
async fn test_unset_key_reads_as_empty() {
    let (addr, _) = spawn_control_port(tor).await;
    let daemon = TorControlPort::connect(&addr, &ControlAuth::Null)
        .await
        .unwrap();
    assert!(daemon.get_conf("Socks5Proxy").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_setconf_is_write_error() {
    let (addr, _) = spawn_control_port(|command: &str| {
        if command.starts_with("SETCONF") {
            "552 Unrecognized option: Unknown option 'Bridge'\r\n".to_string()
        } else {
            tor(command)
        }
    })
    .await;
    let daemon = TorControlPort::connect(&addr, &ControlAuth::Null)
        .await
        .unwrap();
    let resolver =
        BridgeConfigResolver::new(Arc::new(Preferences::in_memory()), Arc::new(daemon));

    let err = resolver
        .write_settings(&BridgeConfiguration::user_provided(vec!["bridge A".into()]))
        .await
        .unwrap_err();
    match err {
        BridgeError::ConfigWrite(message) => assert!(message.contains("552")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_authentication_failure() {
    let (addr, _) = spawn_control_port(|_: &str| "515 Authentication failed\r\n".to_string()).await;
    let result = TorControlPort::connect(&addr, &ControlAuth::Null).await;
    assert!(matches!(result, Err(ControlError::Authentication(_))));
}
