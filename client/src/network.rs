use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ServerEvent;
use log::{debug, info, trace, warn};
use shared::{
    cipher_for_key, frame, ActionState, ActionType, AuthResult, Cipher, ClientId, Direction,
    EntitySnapshot, FrameBuffer, Header, Message, MessageType, Payload, SequenceCounter,
    SequenceWindow, Transport, MAX_FRAME_SIZE,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout, Instant};

const READ_CHUNK: usize = 4096;

enum Inbound {
    Stream(std::io::Result<usize>),
    Datagram(std::io::Result<(usize, SocketAddr)>),
}

/// Connected peer: one stream for control traffic, one datagram socket for
/// gameplay traffic
pub struct Client {
    stream: TcpStream,
    socket: UdpSocket,
    server_udp: SocketAddr,
    id: ClientId,
    outbound: SequenceCounter,
    inbound: SequenceWindow,
    frames: FrameBuffer,
    cipher: Arc<dyn Cipher>,
    reply_timeout: Duration,
    chunk: Vec<u8>,
    datagram: Vec<u8>,
}

impl Client {
    /// Opens the stream, binds a datagram socket and performs the handshake,
    /// retrying the Connect message up to `handshake_attempts` times
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        info!("Connecting to {}", config.server_tcp);
        let stream = TcpStream::connect(config.server_tcp).await?;
        stream.set_nodelay(true)?;

        let bind_addr = SocketAddr::new(local_bind_ip(config.server_udp.ip()), 0);
        let socket = UdpSocket::bind(bind_addr).await?;
        let datagram_port = socket.local_addr()?.port();
        info!("Datagram socket bound to {}", socket.local_addr()?);

        let mut client = Self {
            stream,
            socket,
            server_udp: config.server_udp,
            id: ClientId::UNASSIGNED,
            outbound: SequenceCounter::new(),
            inbound: SequenceWindow::new(),
            frames: FrameBuffer::new(),
            cipher: cipher_for_key(config.cipher_key.as_deref()),
            reply_timeout: config.reply_timeout,
            chunk: vec![0u8; READ_CHUNK],
            datagram: vec![0u8; MAX_FRAME_SIZE],
        };
        client.handshake(datagram_port, config).await?;
        Ok(client)
    }

    async fn handshake(
        &mut self,
        datagram_port: u16,
        config: &ClientConfig,
    ) -> Result<(), ClientError> {
        let attempts = config.handshake_attempts.max(1);
        for attempt in 1..=attempts {
            let mut payload = Payload::new();
            payload.write_u16(datagram_port);
            self.send(MessageType::Connect, payload).await?;

            match timeout(config.handshake_timeout, self.read_reliable()).await {
                Ok(Ok(mut reply)) => {
                    if reply.kind() != Some(MessageType::Connect) {
                        return Err(ClientError::UnexpectedReply {
                            expected: MessageType::Connect,
                            got: reply.header.message_type,
                        });
                    }
                    self.id = reply.payload.read_id()?;
                    info!("Connected as {}", self.id);
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => warn!("Handshake attempt {}/{} timed out", attempt, attempts),
            }
        }
        Err(ClientError::HandshakeTimeout { attempts })
    }

    /// Identity assigned by the server
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn local_datagram_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sends on the channel fixed for the type, stamped with the next
    /// outbound sequence number
    pub async fn send(
        &mut self,
        message_type: MessageType,
        payload: Payload,
    ) -> Result<(), ClientError> {
        let header = Header::new(self.id, self.outbound.next(), message_type);
        let bytes = Message::new(header, payload).encode()?;
        let bytes = self.cipher.transform(bytes, Direction::ToRemote);

        match message_type.transport() {
            Transport::Reliable => self.stream.write_all(&frame(&bytes)?).await?,
            Transport::Unreliable => {
                self.socket.send_to(&bytes, self.server_udp).await?;
            }
        }
        trace!("Sent {:?} seq {}", message_type, header.sequence);
        Ok(())
    }

    /// Next message from either channel. Stale datagrams and datagrams from
    /// anyone but the server are skipped.
    pub async fn recv(&mut self) -> Result<Message, ClientError> {
        loop {
            if let Some(message) = self.buffered_frame()? {
                return Ok(message);
            }

            let inbound = tokio::select! {
                read = self.stream.read(&mut self.chunk) => Inbound::Stream(read),
                received = self.socket.recv_from(&mut self.datagram) => {
                    Inbound::Datagram(received)
                }
            };

            match inbound {
                Inbound::Stream(read) => {
                    let n = read?;
                    if n == 0 {
                        return Err(ClientError::Closed);
                    }
                    self.frames.extend(&self.chunk[..n]);
                }
                Inbound::Datagram(received) => {
                    let (len, from) = received?;
                    if let Some(message) = self.accept_datagram(len, from) {
                        return Ok(message);
                    }
                }
            }
        }
    }

    /// Next message parsed into an event; messages a server never sends are
    /// skipped
    pub async fn next_event(&mut self) -> Result<ServerEvent, ClientError> {
        loop {
            let message = self.recv().await?;
            match ServerEvent::parse(&message)? {
                Some(event) => return Ok(event),
                None => debug!("Ignoring message type {}", message.header.message_type),
            }
        }
    }

    /// Receives until a message of the given type arrives, discarding others
    pub async fn recv_type(
        &mut self,
        message_type: MessageType,
        wait: Duration,
    ) -> Result<Message, ClientError> {
        let deadline = Instant::now() + wait;
        loop {
            let message = match tokio::time::timeout_at(deadline, self.recv()).await {
                Ok(message) => message?,
                Err(_) => {
                    return Err(ClientError::Timeout {
                        message_type,
                        timeout: wait,
                    })
                }
            };
            if message.kind() == Some(message_type) {
                return Ok(message);
            }
            trace!(
                "Skipping {} while waiting for {:?}",
                message.header.message_type,
                message_type
            );
        }
    }

    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<AuthResult, ClientError> {
        let mut payload = Payload::new();
        payload.write_str(username)?.write_str(password)?;
        self.send(MessageType::Authenticate, payload).await?;

        let mut reply = self
            .recv_type(MessageType::Authenticate, self.reply_timeout)
            .await?;
        let result = AuthResult::from_byte(reply.payload.read_u8()?)?;
        info!("Authentication as '{}': {:?}", username, result);
        Ok(result)
    }

    pub async fn spawn(&mut self) -> Result<(), ClientError> {
        self.send(MessageType::Spawn, Payload::new()).await
    }

    pub async fn action(
        &mut self,
        action: ActionType,
        state: ActionState,
    ) -> Result<(), ClientError> {
        let mut payload = Payload::new();
        payload.write_u8(action.to_byte()).write_u8(state.to_byte());
        self.send(MessageType::Action, payload).await
    }

    /// Every entity in the caller's instance. Datagrams may be lost, so a
    /// missing reply surfaces as a timeout the caller can retry.
    pub async fn request_world_state(&mut self) -> Result<Vec<EntitySnapshot>, ClientError> {
        self.send(MessageType::GetWorldState, Payload::new()).await?;
        let reply = self
            .recv_type(MessageType::WorldState, self.reply_timeout)
            .await?;
        match ServerEvent::parse(&reply)? {
            Some(ServerEvent::WorldState(entities)) => Ok(entities),
            _ => Err(ClientError::UnexpectedReply {
                expected: MessageType::WorldState,
                got: reply.header.message_type,
            }),
        }
    }

    pub async fn command(&mut self, line: &str) -> Result<(), ClientError> {
        let mut payload = Payload::new();
        payload.write_str(line)?;
        self.send(MessageType::Command, payload).await
    }

    /// Asks the server to let go and waits briefly for the acknowledgement
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send(MessageType::Disconnect, Payload::new()).await?;
        match self
            .recv_type(MessageType::Disconnect, self.reply_timeout)
            .await
        {
            Ok(_) | Err(ClientError::Closed) => {
                info!("Disconnected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn read_reliable(&mut self) -> Result<Message, ClientError> {
        loop {
            if let Some(message) = self.buffered_frame()? {
                return Ok(message);
            }
            let n = self.stream.read(&mut self.chunk).await?;
            if n == 0 {
                return Err(ClientError::Closed);
            }
            self.frames.extend(&self.chunk[..n]);
        }
    }

    fn buffered_frame(&mut self) -> Result<Option<Message>, ClientError> {
        let Some(bytes) = self.frames.next_frame()? else {
            return Ok(None);
        };
        let bytes = self.cipher.transform(bytes, Direction::FromRemote);
        Ok(Some(Message::decode(&bytes)?))
    }

    fn accept_datagram(&mut self, len: usize, from: SocketAddr) -> Option<Message> {
        if from != self.server_udp {
            trace!("Ignoring datagram from {}", from);
            return None;
        }
        let bytes = self
            .cipher
            .transform(self.datagram[..len].to_vec(), Direction::FromRemote);
        let message = match Message::decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed datagram: {}", e);
                return None;
            }
        };
        if !self.inbound.accept(message.header.sequence) {
            trace!(
                "Dropping stale datagram seq {} (last {})",
                message.header.sequence,
                self.inbound.last_accepted()
            );
            return None;
        }
        Some(message)
    }
}

/// Wildcard or loopback address of the same family as the server
fn local_bind_ip(server: IpAddr) -> IpAddr {
    match server {
        IpAddr::V4(ip) if ip.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(ip) if ip.is_loopback() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}
