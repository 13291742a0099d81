//! Loopback UDP server for exercising STUN clients.
//!
//! A handler decides what the simulated server does with each request:
//! return a reply, return `None` to stay silent, or fail. The first failure
//! (handler, decode or socket) stops the server and is reported by
//! [`UdpTestServer::close`].

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::nat::error::{NatError, NatResult};
use super::protocol::Message;

/// Decides the reply for one request from `from`
pub type Handler = Arc<dyn Fn(&Message, SocketAddr) -> NatResult<Option<Message>> + Send + Sync>;

/// Simulated STUN server on 127.0.0.1 or [::1]
pub struct UdpTestServer {
    addr: SocketAddr,
    task: Option<JoinHandle<NatResult<()>>>,
}

impl UdpTestServer {
    /// Bind an ephemeral loopback port. `network` is `"udp4"` or `"udp6"`.
    pub async fn bind<F>(network: &str, max_message_size: usize, handler: F) -> NatResult<Self>
    where
        F: Fn(&Message, SocketAddr) -> NatResult<Option<Message>> + Send + Sync + 'static,
    {
        let bind_addr: SocketAddr = match network {
            "udp4" => (Ipv4Addr::LOCALHOST, 0).into(),
            "udp6" => (Ipv6Addr::LOCALHOST, 0).into(),
            other => {
                return Err(NatError::Configuration(format!("unsupported network: {}", other)));
            }
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        let addr = socket.local_addr()?;
        let handler: Handler = Arc::new(handler);

        let task = tokio::spawn(serve(socket, max_message_size, handler));

        Ok(Self { addr, task: Some(task) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop serving. Returns the error that stopped the server early, if any.
    pub async fn close(&mut self) -> NatResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        if task.is_finished() {
            return match task.await {
                Ok(result) => result,
                Err(e) => Err(NatError::Configuration(format!("test server task failed: {}", e))),
            };
        }

        task.abort();
        let _ = task.await;
        Ok(())
    }
}

impl Drop for UdpTestServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn serve(socket: UdpSocket, max_message_size: usize, handler: Handler) -> NatResult<()> {
    let mut buf = vec![0u8; max_message_size];

    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        let request = Message::decode(BytesMut::from(&buf[..len]))?;

        if let Some(reply) = handler(&request, from)? {
            socket.send_to(&reply.encode()?, from).await?;
        }
    }
}
