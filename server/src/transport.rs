//! Reliable and unreliable socket multiplexing
//!
//! The multiplexer owns the listening stream socket, the single datagram
//! socket and one stream per connected client. [`TransportMultiplexer::poll`]
//! waits, bounded by a timeout, until one source is ready and services only
//! that source. Sources are preferred in a fixed order:
//!
//! 1. the listener (new connections)
//! 2. the datagram socket
//! 3. established client streams, in identity order
//!
//! Inbound frames are decrypted, decoded and header-checked here before they
//! reach the router. Outbound messages are stamped with the recipient's
//! identity and next sequence number, encrypted and written by
//! [`TransportMultiplexer::flush`].

use crate::config::ServerConfig;
use crate::context::{Outgoing, ServerContext};
use crate::error::TransportError;
use crate::session::SessionTable;
use log::{debug, error, info, trace, warn};
use shared::{
    frame, ClientId, Cipher, Direction, FrameBuffer, Header, Message, MessageType, Payload,
    Transport, MAX_FRAME_SIZE,
};
use std::collections::BTreeMap;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

/// Datagrams drained per readiness of the datagram socket
const DATAGRAM_BURST: usize = 64;
const READ_CHUNK: usize = 4096;

#[derive(Debug)]
pub enum TransportEvent {
    /// A frame that passed decoding and header validation
    Message(Message),
    /// The peer closed its stream or the stream failed
    Disconnected(ClientId),
}

struct Connection {
    stream: TcpStream,
    frames: FrameBuffer,
    /// Set once the stream hit end of file; the connection waits for `close`
    closed: bool,
}

enum Ready {
    Accept(io::Result<(TcpStream, SocketAddr)>),
    Datagram(io::Result<()>),
    Stream(ClientId, io::Result<()>),
}

pub struct TransportMultiplexer {
    listener: TcpListener,
    datagrams: UdpSocket,
    connections: BTreeMap<ClientId, Connection>,
    cipher: Arc<dyn Cipher>,
    write_timeout: Duration,
}

impl TransportMultiplexer {
    pub async fn bind(
        config: &ServerConfig,
        cipher: Arc<dyn Cipher>,
    ) -> Result<Self, TransportError> {
        let tcp_addr = config.tcp_addr();
        let listener = TcpListener::bind(tcp_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: tcp_addr,
                source,
            })?;

        let udp_addr = config.udp_addr();
        let datagrams = UdpSocket::bind(udp_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: udp_addr,
                source,
            })?;

        info!(
            "Listening on tcp {} and udp {}",
            listener.local_addr().unwrap_or(tcp_addr),
            datagrams.local_addr().unwrap_or(udp_addr)
        );

        Ok(Self {
            listener,
            datagrams,
            connections: BTreeMap::new(),
            cipher,
            write_timeout: config.write_timeout,
        })
    }

    pub fn tcp_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.datagrams.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Waits at most `wait` for one source to become ready and services it
    pub async fn poll(
        &mut self,
        wait: Duration,
        sessions: &mut SessionTable,
    ) -> Vec<TransportEvent> {
        let ready = {
            let listener = &self.listener;
            let datagrams = &self.datagrams;
            let connections = &self.connections;
            tokio::time::timeout(wait, async move {
                tokio::select! {
                    biased;
                    accepted = listener.accept() => Ready::Accept(accepted),
                    readable = datagrams.readable() => Ready::Datagram(readable),
                    (id, readable) = next_readable(connections) => Ready::Stream(id, readable),
                }
            })
            .await
        };

        let mut events = Vec::new();
        match ready {
            Err(_) => {}
            Ok(Ready::Accept(Ok((stream, addr)))) => self.accept(stream, addr, sessions),
            Ok(Ready::Accept(Err(e))) => warn!("{}", TransportError::Accept(e)),
            Ok(Ready::Datagram(Ok(()))) => self.receive_datagrams(sessions, &mut events),
            Ok(Ready::Datagram(Err(e))) => warn!("{}", TransportError::Receive(e)),
            Ok(Ready::Stream(id, Ok(()))) => self.receive_stream(id, sessions, &mut events),
            Ok(Ready::Stream(id, Err(e))) => {
                warn!("Stream of {} failed: {}", id, e);
                self.mark_closed(id, &mut events);
            }
        }
        events
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr, sessions: &mut SessionTable) {
        if sessions.is_full() {
            warn!("Rejecting {}: server full ({} clients)", addr, sessions.len());
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to disable nagle for {}: {}", addr, e);
        }
        let id = sessions.allocate(addr);
        self.connections.insert(
            id,
            Connection {
                stream,
                frames: FrameBuffer::new(),
                closed: false,
            },
        );
        info!("Accepted {} from {}", id, addr);
    }

    fn receive_datagrams(
        &mut self,
        sessions: &mut SessionTable,
        events: &mut Vec<TransportEvent>,
    ) {
        let mut buffer = vec![0u8; MAX_FRAME_SIZE];
        for _ in 0..DATAGRAM_BURST {
            match self.datagrams.try_recv_from(&mut buffer) {
                Ok((len, from)) => {
                    if let Some(message) = self.ingest_datagram(&buffer[..len], from, sessions) {
                        events.push(TransportEvent::Message(message));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // Peers that went away can surface here as connection resets
                    debug!("{}", TransportError::Receive(e));
                    break;
                }
            }
        }
    }

    fn receive_stream(
        &mut self,
        id: ClientId,
        sessions: &mut SessionTable,
        events: &mut Vec<TransportEvent>,
    ) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };

        let mut chunk = [0u8; READ_CHUNK];
        let mut eof = false;
        loop {
            match connection.stream.try_read(&mut chunk) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => connection.frames.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("Read from {} failed: {}", id, e);
                    eof = true;
                    break;
                }
            }
        }

        let mut frames = Vec::new();
        loop {
            match connection.frames.next_frame() {
                Ok(Some(bytes)) => frames.push(bytes),
                Ok(None) => break,
                Err(e) => warn!("Discarding stream data from {}: {}", id, e),
            }
        }

        for bytes in frames {
            if let Some(message) = self.ingest_reliable(id, bytes, sessions) {
                events.push(TransportEvent::Message(message));
            }
        }
        if eof {
            self.mark_closed(id, events);
        }
    }

    fn mark_closed(&mut self, id: ClientId, events: &mut Vec<TransportEvent>) {
        if let Some(connection) = self.connections.get_mut(&id) {
            if !connection.closed {
                connection.closed = true;
                info!("{} closed its connection", id);
                events.push(TransportEvent::Disconnected(id));
            }
        }
    }

    /// Decrypts, decodes and checks a frame read from `id`'s stream
    fn ingest_reliable(
        &self,
        id: ClientId,
        bytes: Vec<u8>,
        sessions: &SessionTable,
    ) -> Option<Message> {
        let bytes = self.cipher.transform(bytes, Direction::FromRemote);
        let mut message = match Message::decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", id, e);
                return None;
            }
        };

        let kind = message.kind();
        if message.header.transport != Transport::Reliable
            || kind.is_some_and(|kind| kind.transport() != Transport::Reliable)
        {
            warn!("Dropping {:?} from {}: wrong channel", kind, id);
            return None;
        }

        // The identity is only known to the client once Connect is answered
        if kind == Some(MessageType::Connect) {
            message.header.client_id = id;
        } else {
            if message.header.client_id != id {
                warn!(
                    "Dropping frame from {} claiming to be {}",
                    id, message.header.client_id
                );
                return None;
            }
            if !sessions.get(id).is_some_and(|session| session.is_established()) {
                debug!("Dropping {:?} from {} before handshake", kind, id);
                return None;
            }
        }

        trace!("Reliable {:?} from {}", kind, id);
        Some(message)
    }

    /// Resolves the sender of a datagram, then checks identity and sequence
    fn ingest_datagram(
        &self,
        bytes: &[u8],
        from: SocketAddr,
        sessions: &mut SessionTable,
    ) -> Option<Message> {
        let Some(id) = sessions.resolve(from) else {
            warn!("Dropping datagram from unbound endpoint {}", from);
            return None;
        };

        let bytes = self.cipher.transform(bytes.to_vec(), Direction::FromRemote);
        let message = match Message::decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed datagram from {}: {}", id, e);
                return None;
            }
        };

        let kind = message.kind();
        if message.header.transport != Transport::Unreliable
            || kind.is_some_and(|kind| kind.transport() != Transport::Unreliable)
        {
            warn!("Dropping {:?} from {}: wrong channel", kind, id);
            return None;
        }
        if message.header.client_id != id {
            warn!(
                "Dropping datagram from {} ({}) claiming to be {}",
                from, id, message.header.client_id
            );
            return None;
        }
        if !sessions.validate_and_advance(id, message.header.sequence) {
            trace!(
                "Rejected sequence {} from {}",
                message.header.sequence,
                id
            );
            return None;
        }

        trace!("Unreliable {:?} from {}", kind, id);
        Some(message)
    }

    /// Writes every queued outbound message. Returns the clients whose
    /// stream broke while writing.
    pub async fn flush(&mut self, ctx: &mut ServerContext) -> Vec<ClientId> {
        let mut broken = Vec::new();
        for outgoing in ctx.outbox.drain() {
            match outgoing {
                Outgoing::Send {
                    to,
                    message_type,
                    payload,
                } => {
                    self.send(to, message_type, &payload, &mut ctx.sessions, &mut broken)
                        .await;
                }
                Outgoing::Broadcast {
                    message_type,
                    payload,
                    exclude,
                } => {
                    for to in ctx.sessions.broadcast_targets() {
                        if Some(to) != exclude {
                            self.send(to, message_type, &payload, &mut ctx.sessions, &mut broken)
                                .await;
                        }
                    }
                }
            }
        }
        broken
    }

    async fn send(
        &mut self,
        to: ClientId,
        message_type: MessageType,
        payload: &Payload,
        sessions: &mut SessionTable,
        broken: &mut Vec<ClientId>,
    ) {
        if broken.contains(&to) {
            return;
        }
        let Some(sequence) = sessions.next_outbound_sequence(to) else {
            debug!("Dropping {:?} for departed {}", message_type, to);
            return;
        };

        let message = Message::new(Header::new(to, sequence, message_type), payload.clone());
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("{:?} for {}: {}", message_type, to, TransportError::Encode(e));
                return;
            }
        };
        let bytes = self.cipher.transform(bytes, Direction::ToRemote);

        match message_type.transport() {
            Transport::Reliable => {
                let Some(connection) = self.connections.get_mut(&to) else {
                    return;
                };
                if connection.closed {
                    return;
                }
                let framed = match frame(&bytes) {
                    Ok(framed) => framed,
                    Err(e) => {
                        error!("{:?} for {}: {}", message_type, to, TransportError::Encode(e));
                        return;
                    }
                };
                let result =
                    tokio::time::timeout(self.write_timeout, connection.stream.write_all(&framed))
                        .await
                        .unwrap_or_else(|_| {
                            Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"))
                        });
                if let Err(source) = result {
                    error!(
                        "{}",
                        TransportError::Send {
                            client_id: to,
                            source
                        }
                    );
                    broken.push(to);
                }
            }
            Transport::Unreliable => {
                let endpoint = sessions
                    .get(to)
                    .and_then(|session| session.datagram_endpoint());
                let Some(endpoint) = endpoint else {
                    debug!("Dropping {:?} for {}: no datagram endpoint", message_type, to);
                    return;
                };
                if let Err(source) = self.datagrams.send_to(&bytes, endpoint).await {
                    warn!(
                        "{}",
                        TransportError::Send {
                            client_id: to,
                            source
                        }
                    );
                }
            }
        }
    }

    /// Drops the stream of `id`, closing the connection
    pub fn close(&mut self, id: ClientId) {
        if self.connections.remove(&id).is_some() {
            debug!("Closed stream of {}", id);
        }
    }
}

/// Resolves with the first open stream that reports read readiness
async fn next_readable(
    connections: &BTreeMap<ClientId, Connection>,
) -> (ClientId, io::Result<()>) {
    poll_fn(|cx| {
        for (id, connection) in connections {
            if connection.closed {
                continue;
            }
            if let Poll::Ready(result) = connection.stream.poll_read_ready(cx) {
                return Poll::Ready((*id, result));
            }
        }
        Poll::Pending
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{cipher_for_key, IdentityCipher, Serializable};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncReadExt;

    async fn multiplexer() -> TransportMultiplexer {
        let config = ServerConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            tcp_port: 0,
            udp_port: 0,
            ..ServerConfig::default()
        };
        TransportMultiplexer::bind(&config, Arc::new(IdentityCipher))
            .await
            .unwrap()
    }

    fn encode(
        id: ClientId,
        sequence: u64,
        message_type: MessageType,
        payload: Payload,
    ) -> Vec<u8> {
        Message::new(Header::new(id, sequence, message_type), payload)
            .encode()
            .unwrap()
    }

    async fn poll_until_message(
        transport: &mut TransportMultiplexer,
        sessions: &mut SessionTable,
    ) -> Option<Message> {
        for _ in 0..20 {
            for event in transport.poll(Duration::from_millis(50), sessions).await {
                if let TransportEvent::Message(message) = event {
                    return Some(message);
                }
            }
        }
        None
    }

    #[tokio::test]
    async fn test_accept_allocates_session() {
        let mut transport = multiplexer().await;
        let mut sessions = SessionTable::new(4);
        let _client = TcpStream::connect(transport.tcp_addr().unwrap())
            .await
            .unwrap();

        let events = transport.poll(Duration::from_secs(1), &mut sessions).await;
        assert!(events.is_empty());
        assert_eq!(sessions.len(), 1);
        assert_eq!(transport.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_poll_times_out_when_idle() {
        let mut transport = multiplexer().await;
        let mut sessions = SessionTable::new(4);
        let started = std::time::Instant::now();

        let events = transport.poll(Duration::from_millis(20), &mut sessions).await;
        assert!(events.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_connect_frame_is_rewritten_to_handle_identity() {
        let mut transport = multiplexer().await;
        let mut sessions = SessionTable::new(4);
        let mut client = TcpStream::connect(transport.tcp_addr().unwrap())
            .await
            .unwrap();
        transport.poll(Duration::from_secs(1), &mut sessions).await;

        let mut payload = Payload::new();
        payload.write_u16(5000);
        let bytes = encode(ClientId::UNASSIGNED, 0, MessageType::Connect, payload);
        client.write_all(&frame(&bytes).unwrap()).await.unwrap();

        let message = poll_until_message(&mut transport, &mut sessions)
            .await
            .unwrap();
        assert_eq!(message.kind(), Some(MessageType::Connect));
        assert_eq!(message.header.client_id, ClientId(1));
    }

    #[tokio::test]
    async fn test_frames_before_handshake_are_dropped() {
        let mut transport = multiplexer().await;
        let mut sessions = SessionTable::new(4);
        let mut client = TcpStream::connect(transport.tcp_addr().unwrap())
            .await
            .unwrap();
        transport.poll(Duration::from_secs(1), &mut sessions).await;

        let mut payload = Payload::new();
        payload.write_str("gary").unwrap();
        payload.write_str("password").unwrap();
        let bytes = encode(ClientId(1), 1, MessageType::Authenticate, payload);
        client.write_all(&frame(&bytes).unwrap()).await.unwrap();

        assert!(transport
            .poll(Duration::from_secs(1), &mut sessions)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_datagram_resolution_and_sequence_validation() {
        let mut transport = multiplexer().await;
        let mut sessions = SessionTable::new(4);
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_udp = transport.udp_addr().unwrap();

        let id = sessions.allocate("127.0.0.1:1".parse().unwrap());
        let port = client.local_addr().unwrap().port();
        sessions.bind_datagram_endpoint(id, IpAddr::V4(Ipv4Addr::LOCALHOST), port);

        // Unbound endpoint
        stranger
            .send_to(&encode(id, 1, MessageType::Spawn, Payload::new()), server_udp)
            .await
            .unwrap();
        // Forged identity
        client
            .send_to(
                &encode(ClientId(9), 1, MessageType::Spawn, Payload::new()),
                server_udp,
            )
            .await
            .unwrap();
        // Accepted, then a duplicate
        client
            .send_to(&encode(id, 1, MessageType::Spawn, Payload::new()), server_udp)
            .await
            .unwrap();
        client
            .send_to(&encode(id, 1, MessageType::Spawn, Payload::new()), server_udp)
            .await
            .unwrap();

        let mut accepted = Vec::new();
        for _ in 0..10 {
            for event in transport.poll(Duration::from_millis(50), &mut sessions).await {
                if let TransportEvent::Message(message) = event {
                    accepted.push(message);
                }
            }
        }
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].header.client_id, id);
        assert_eq!(sessions.get(id).unwrap().last_accepted_sequence(), 1);
    }

    #[tokio::test]
    async fn test_eof_reports_disconnect_once() {
        let mut transport = multiplexer().await;
        let mut sessions = SessionTable::new(4);
        let client = TcpStream::connect(transport.tcp_addr().unwrap())
            .await
            .unwrap();
        transport.poll(Duration::from_secs(1), &mut sessions).await;
        drop(client);

        let mut disconnects = 0;
        for _ in 0..5 {
            for event in transport.poll(Duration::from_millis(50), &mut sessions).await {
                if matches!(event, TransportEvent::Disconnected(ClientId(1))) {
                    disconnects += 1;
                }
            }
        }
        assert_eq!(disconnects, 1);

        transport.close(ClientId(1));
        assert_eq!(transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_stamps_and_encrypts_reliable_frames() {
        let config = ServerConfig {
            tcp_port: 0,
            udp_port: 0,
            ..ServerConfig::default()
        };
        let mut transport = TransportMultiplexer::bind(&config, cipher_for_key(Some("k")))
            .await
            .unwrap();
        let mut ctx = crate::context::tests::test_context();
        let mut client = TcpStream::connect(transport.tcp_addr().unwrap())
            .await
            .unwrap();
        transport.poll(Duration::from_secs(1), &mut ctx.sessions).await;
        let id = ClientId(1);

        let mut payload = Payload::new();
        payload.write_id(id);
        ctx.outbox.send(id, MessageType::Connect, payload.clone());
        ctx.outbox.send(id, MessageType::Connect, payload);
        assert!(transport.flush(&mut ctx).await.is_empty());

        let mut buffer = FrameBuffer::new();
        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        while received.len() < 2 {
            let n = client.read(&mut chunk).await.unwrap();
            buffer.extend(&chunk[..n]);
            while let Some(bytes) = buffer.next_frame().unwrap() {
                let plain = cipher_for_key(Some("k")).transform(bytes, Direction::FromRemote);
                received.push(Message::decode(&plain).unwrap());
            }
        }
        assert_eq!(received[0].header.sequence, 1);
        assert_eq!(received[1].header.sequence, 2);
        assert_eq!(received[0].header.client_id, id);
        let mut payload = received[0].payload.clone();
        assert_eq!(ClientId::decode(&mut payload).unwrap(), id);
    }
}
