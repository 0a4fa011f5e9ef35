//! The box-connection multiplexer: the TCP listener and per-peer task pair
//! that let smsbox/wapbox processes attach to bearerbox as a second class
//! of message source/sink alongside the SMSC pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::BoxError;
use crate::message::{self, Admin, AdminCommand, Message};
use crate::queue::Queue;

pub type BoxcId = u64;

/// A registered box peer: its identity, and the queue its writer task drains
/// to deliver messages toward it (downstream traffic: MT pushes, WDP
/// datagrams, acks).
pub struct BoxConn {
    pub id: BoxcId,
    pub name: String,
    pub outbound: Queue<Message>,
}

/// The multiplexer's shared state: the live peer registry and the queue
/// every inbound message (regardless of which peer sent it) is funneled
/// into for the admission/router pipeline to consume.
pub struct BoxConnMux {
    listener_addr: String,
    connections: RwLock<HashMap<BoxcId, Arc<BoxConn>>>,
    next_id: AtomicU64,
    pub inbound: Queue<Message>,
}

impl BoxConnMux {
    pub fn new(listener_addr: impl Into<String>) -> Self {
        BoxConnMux {
            listener_addr: listener_addr.into(),
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            inbound: Queue::new(),
        }
    }

    pub async fn connection_ids(&self) -> Vec<BoxcId> {
        self.connections.read().await.keys().copied().collect()
    }

    /// Look up a peer's outbound queue by name, for the router/store to
    /// deliver an MT push or ack to a specific smsbox/wapbox.
    pub async fn find_by_name(&self, name: &str) -> Option<Arc<BoxConn>> {
        self.connections
            .read()
            .await
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Bind the listener and spawn the accept loop. Returns once bound;
    /// the accept loop itself runs for the lifetime of the returned task.
    pub async fn start(self: Arc<Self>) -> Result<tokio::task::JoinHandle<()>, BoxError> {
        let listener = TcpListener::bind(&self.listener_addr).await?;
        info!(addr = %self.listener_addr, "box connection listener bound");

        let mux = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        tune_socket(&stream);
                        let mux = mux.clone();
                        tokio::spawn(async move {
                            if let Err(err) = mux.handle_connection(stream).await {
                                warn!(%peer_addr, %err, "box connection ended with error");
                            }
                        });
                    }
                    Err(err) => {
                        warn!(%err, "accept failed on box listener");
                    }
                }
            }
        });
        Ok(handle)
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> Result<(), BoxError> {
        let (mut read_half, mut write_half) = tokio::io::split(stream);

        let body = message::read_frame(&mut read_half).await?;
        let first = Message::decode_body(&body)?;
        let name = match first {
            Message::Admin(Admin {
                command: AdminCommand::Identify,
                boxc_id: Some(name),
            }) => String::from_utf8_lossy(&name).to_string(),
            _ => return Err(BoxError::NoIdentify),
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(BoxConn {
            id,
            name: name.clone(),
            outbound: Queue::new(),
        });
        self.connections.write().await.insert(id, conn.clone());
        info!(boxc_id = id, %name, "box peer identified");

        let writer_producer = conn.outbound.producer();
        let writer_conn = conn.clone();
        let writer_task = tokio::spawn(async move {
            let _producer = writer_producer;
            run_writer(&mut write_half, &writer_conn.outbound).await;
        });

        let result = self.run_reader(&mut read_half, id).await;

        self.connections.write().await.remove(&id);
        writer_task.abort();
        info!(boxc_id = id, %name, "box peer disconnected");
        result
    }

    async fn run_reader(
        &self,
        read_half: &mut ReadHalf<TcpStream>,
        boxc_id: BoxcId,
    ) -> Result<(), BoxError> {
        let producer = self.inbound.producer();
        loop {
            let body = match message::read_frame(read_half).await {
                Ok(body) => body,
                Err(crate::message::CodecError::Io(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(err) => {
                    warn!(boxc_id, %err, "dropping malformed frame from box peer");
                    continue;
                }
            };
            match Message::decode_body(&body) {
                Ok(msg) => self.inbound.produce(msg).await,
                Err(err) => warn!(boxc_id, %err, "dropping malformed message from box peer"),
            }
        }
        drop(producer);
        Ok(())
    }
}

async fn run_writer(write_half: &mut WriteHalf<TcpStream>, outbound: &Queue<Message>) {
    while let Some(msg) = outbound.consume().await {
        let frame = msg.encode();
        if let Err(err) = write_half.write_all(&frame).await {
            warn!(%err, "failed writing to box peer, closing connection");
            break;
        }
        let _ = write_half.flush().await;
    }
}

fn tune_socket(stream: &TcpStream) {
    let sock = SockRef::from(stream);
    let _ = sock.set_tcp_nodelay(true);
    let keepalive = TcpKeepalive::new().with_time(std::time::Duration::from_secs(30));
    let _ = sock.set_tcp_keepalive(&keepalive);
}
