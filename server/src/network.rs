//! Server control loop tying transport, dispatch, systems and teardown together

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::error::ServerError;
use crate::handlers::register_default_handlers;
use crate::login::InMemoryLogins;
use crate::router::MessageRouter;
use crate::scheduler::TickScheduler;
use crate::shell::Shell;
use crate::store::{FileStore, MemoryStore, PlayerStore};
use crate::systems::register_default_systems;
use crate::transport::{TransportEvent, TransportMultiplexer};
use log::info;
use shared::cipher_for_key;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Authoritative server: one task owns every socket, the session table and
/// the world
pub struct Server {
    transport: TransportMultiplexer,
    ctx: ServerContext,
    router: MessageRouter,
    scheduler: TickScheduler,
    shell: Shell,
    console: Option<mpsc::UnboundedReceiver<String>>,
    next_wait: Duration,
}

impl Server {
    /// Binds both sockets and opens the player store. Failing to bind is the
    /// only fatal transport error.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let store: Box<dyn PlayerStore + Send> = match &config.store_path {
            Some(path) => Box::new(FileStore::open(path)?),
            None => Box::new(MemoryStore::new()),
        };
        let logins = Box::new(InMemoryLogins::new(config.accounts.clone()));
        let cipher = cipher_for_key(config.cipher_key.as_deref());
        let transport = TransportMultiplexer::bind(&config, cipher).await?;

        let mut router = MessageRouter::new();
        register_default_handlers(&mut router);

        let mut scheduler = TickScheduler::new(config.min_update_interval);
        register_default_systems(&mut scheduler);

        Ok(Self {
            transport,
            ctx: ServerContext::new(config.max_clients, store, logins),
            router,
            scheduler,
            shell: Shell::with_builtins(),
            console: None,
            next_wait: config.min_update_interval,
        })
    }

    /// Feeds admin command lines, typically read from stdin
    pub fn with_console(mut self, console: mpsc::UnboundedReceiver<String>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn tcp_addr(&self) -> io::Result<SocketAddr> {
        self.transport.tcp_addr()
    }

    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.transport.udp_addr()
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.ctx.running
    }

    /// One iteration: wait for I/O, dispatch, run systems and commands,
    /// send, then tear down whoever left
    pub async fn step(&mut self) {
        let events = self
            .transport
            .poll(self.next_wait, &mut self.ctx.sessions)
            .await;

        let mut inbound = Vec::with_capacity(events.len());
        for event in events {
            match event {
                TransportEvent::Message(message) => inbound.push(message),
                TransportEvent::Disconnected(id) => self.ctx.request_disconnect(id),
            }
        }

        self.next_wait = self
            .scheduler
            .update(Instant::now(), &self.router, inbound, &mut self.ctx);

        self.read_console();
        self.shell.run_pending(&mut self.ctx);

        for id in self.transport.flush(&mut self.ctx).await {
            self.ctx.request_disconnect(id);
        }
        self.teardown_pending();
    }

    /// Steps until a `terminate` command, then persists every entity
    pub async fn run(mut self) {
        info!("Server running");
        while self.ctx.running {
            self.step().await;
        }
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        info!("Shutting down");
        self.ctx.persist_all();
        self.transport.flush(&mut self.ctx).await;
    }

    fn read_console(&mut self) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        while let Ok(line) = console.try_recv() {
            self.ctx.console.push(line);
        }
    }

    fn teardown_pending(&mut self) {
        for session in self.ctx.sessions.drain_pending_disconnects() {
            self.ctx.teardown(&session);
            self.transport.close(session.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{frame, ClientId, FrameBuffer, Header, Message, MessageType, Payload};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_test::assert_ok;

    fn config() -> ServerConfig {
        ServerConfig {
            tcp_port: 0,
            udp_port: 0,
            accounts: vec![("gary".to_string(), "password".to_string())],
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_handshake_over_the_loop() {
        let mut server = assert_ok!(Server::bind(config()).await);
        let mut client = TcpStream::connect(server.tcp_addr().unwrap())
            .await
            .unwrap();
        server.step().await;

        let mut payload = Payload::new();
        payload.write_u16(5000);
        let bytes = Message::new(
            Header::new(ClientId::UNASSIGNED, 0, MessageType::Connect),
            payload,
        )
        .encode()
        .unwrap();
        client.write_all(&frame(&bytes).unwrap()).await.unwrap();

        let mut buffer = FrameBuffer::new();
        let mut chunk = [0u8; 128];
        let reply = loop {
            server.step().await;
            if let Ok(Ok(n)) =
                tokio::time::timeout(Duration::from_millis(10), client.read(&mut chunk)).await
            {
                buffer.extend(&chunk[..n]);
            }
            if let Some(bytes) = buffer.next_frame().unwrap() {
                break Message::decode(&bytes).unwrap();
            }
        };

        assert_eq!(reply.kind(), Some(MessageType::Connect));
        let mut payload = reply.payload.clone();
        assert_eq!(payload.read_id().unwrap(), ClientId(1));
        let endpoint = SocketAddr::new(client.local_addr().unwrap().ip(), 5000);
        assert_eq!(server.context().sessions.resolve(endpoint), Some(ClientId(1)));
    }

    #[tokio::test]
    async fn test_console_terminate_stops_run() {
        let (tx, rx) = mpsc::unbounded_channel();
        let server = assert_ok!(Server::bind(config()).await).with_console(rx);
        tx.send("terminate".to_string()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), server.run())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_stream_is_torn_down() {
        let mut server = assert_ok!(Server::bind(config()).await);
        let client = TcpStream::connect(server.tcp_addr().unwrap())
            .await
            .unwrap();
        server.step().await;
        assert_eq!(server.context().sessions.len(), 1);

        drop(client);
        for _ in 0..20 {
            server.step().await;
            if server.context().sessions.is_empty() {
                break;
            }
        }
        assert!(server.context().sessions.is_empty());
    }
}
