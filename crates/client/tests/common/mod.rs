//! In-process job-channel server for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tellmemo_client::channel::ChannelConfig;
use tellmemo_client::messages::ClientCommand;
use tellmemo_client::reconnect::ReconnectConfig;
use tellmemo_core::job::JobUpdate;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Control {
    Frame(String),
    Kick,
}

/// Accepts any number of connections, records the commands they send
/// (heartbeats are counted separately), and pushes frames to all of them.
pub struct MockJobServer {
    addr: SocketAddr,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    control: broadcast::Sender<Control>,
    connections: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockJobServer {
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap()).await
    }

    /// Listen on a fixed address, e.g. one a client is already retrying.
    pub async fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));
        let pings = Arc::new(AtomicUsize::new(0));

        let task = {
            let control = control.clone();
            let connections = Arc::clone(&connections);
            let pings = Arc::clone(&pings);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(handle_connection(
                        stream,
                        command_tx.clone(),
                        control.subscribe(),
                        Arc::clone(&pings),
                    ));
                }
            })
        };

        Self {
            addr,
            commands,
            control,
            connections,
            pings,
            task,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Channel config pointing at this server with fast reconnects and no
    /// heartbeat noise.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            ws_url: self.ws_url(),
            token: Some("test-token".into()),
            connect_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(3600),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(200),
                multiplier: 2.0,
            },
        }
    }

    pub async fn next_command(&mut self) -> ClientCommand {
        tokio::time::timeout(COMMAND_TIMEOUT, self.commands.recv())
            .await
            .expect("timed out waiting for a client command")
            .expect("server command channel closed")
    }

    pub async fn try_next_command(&mut self, wait: Duration) -> Option<ClientCommand> {
        tokio::time::timeout(wait, self.commands.recv()).await.ok().flatten()
    }

    pub fn push_update(&self, update: &JobUpdate) {
        let frame = serde_json::json!({ "type": "job_update", "data": update });
        let _ = self.control.send(Control::Frame(frame.to_string()));
    }

    pub fn push_raw(&self, frame: &str) {
        let _ = self.control.send(Control::Frame(frame.to_string()));
    }

    /// Close every open connection from the server side.
    pub fn kick_all(&self) {
        let _ = self.control.send(Control::Kick);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

impl Drop for MockJobServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    mut control: broadcast::Receiver<Control>,
    pings: Arc<AtomicUsize>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            ctrl = control.recv() => match ctrl {
                Ok(Control::Frame(text)) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Control::Kick) | Err(_) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(command) = serde_json::from_str::<ClientCommand>(&text) else {
                        continue;
                    };
                    if command == ClientCommand::Ping {
                        pings.fetch_add(1, Ordering::SeqCst);
                        let _ = sink.send(Message::Text(r#"{"type":"pong"}"#.to_string())).await;
                    } else {
                        let _ = command_tx.send(command);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
