//! Typed view of the messages a server sends

use shared::{
    AuthResult, ClientId, DecodeError, EntitySnapshot, Facing, InputState, Message, MessageType,
    Position, Serializable, Stats,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected(ClientId),
    /// Acknowledgement of our own Disconnect
    Disconnected,
    Authenticated(AuthResult),
    EntityCreated(EntitySnapshot),
    EntityDestroyed(ClientId),
    InputChanged {
        id: ClientId,
        input: InputState,
        position: Position,
        facing: Facing,
    },
    StatsChanged {
        id: ClientId,
        stats: Stats,
    },
    WorldState(Vec<EntitySnapshot>),
}

impl ServerEvent {
    /// `None` for types a server does not send and for unknown type bytes
    pub fn parse(message: &Message) -> Result<Option<Self>, DecodeError> {
        let Some(kind) = message.kind() else {
            return Ok(None);
        };
        let mut payload = message.payload.clone();
        payload.rewind();

        let event = match kind {
            MessageType::Connect => ServerEvent::Connected(payload.read_id()?),
            MessageType::Disconnect => ServerEvent::Disconnected,
            MessageType::Authenticate => {
                ServerEvent::Authenticated(AuthResult::from_byte(payload.read_u8()?)?)
            }
            MessageType::CreateEntity => {
                ServerEvent::EntityCreated(EntitySnapshot::decode(&mut payload)?)
            }
            MessageType::DestroyEntity => ServerEvent::EntityDestroyed(payload.read_id()?),
            MessageType::InputStateUpdate => ServerEvent::InputChanged {
                id: payload.read_id()?,
                input: InputState::decode(&mut payload)?,
                position: Position::decode(&mut payload)?,
                facing: Facing::decode(&mut payload)?,
            },
            MessageType::StatsUpdate => ServerEvent::StatsChanged {
                id: payload.read_id()?,
                stats: Stats::decode(&mut payload)?,
            },
            MessageType::WorldState => {
                let count = payload.read_u32()? as usize;
                let mut entities = Vec::with_capacity(count.min(256));
                for _ in 0..count {
                    entities.push(EntitySnapshot::decode(&mut payload)?);
                }
                ServerEvent::WorldState(entities)
            }
            MessageType::None
            | MessageType::Command
            | MessageType::Spawn
            | MessageType::Action
            | MessageType::GetWorldState => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Header, Name, Payload};

    fn message(message_type: MessageType, payload: Payload) -> Message {
        Message::new(Header::new(ClientId(1), 1, message_type), payload)
    }

    fn snapshot(id: u32, name: &str) -> EntitySnapshot {
        EntitySnapshot {
            id: ClientId(id),
            name: Name(name.to_string()),
            position: Position::new(0, 10.0, 20.0),
            stats: Stats::default(),
            input: InputState::default(),
            facing: Facing::Down,
        }
    }

    #[test]
    fn test_parse_world_state() {
        let mut payload = Payload::new();
        payload.write_u32(2);
        snapshot(1, "gary").encode(&mut payload).unwrap();
        snapshot(2, "mia").encode(&mut payload).unwrap();

        let event = ServerEvent::parse(&message(MessageType::WorldState, payload)).unwrap();
        assert_eq!(
            event,
            Some(ServerEvent::WorldState(vec![snapshot(1, "gary"), snapshot(2, "mia")]))
        );
    }

    #[test]
    fn test_parse_input_update() {
        let mut payload = Payload::new();
        payload.write_id(ClientId(3));
        let input = InputState {
            forward: true,
            ..InputState::default()
        };
        input.encode(&mut payload).unwrap();
        Position::new(0, 5.0, 6.0).encode(&mut payload).unwrap();
        Facing::Up.encode(&mut payload).unwrap();

        let event = ServerEvent::parse(&message(MessageType::InputStateUpdate, payload))
            .unwrap()
            .unwrap();
        match event {
            ServerEvent::InputChanged {
                id,
                input,
                position,
                facing,
            } => {
                assert_eq!(id, ClientId(3));
                assert!(input.forward);
                assert_eq!(position, Position::new(0, 5.0, 6.0));
                assert_eq!(facing, Facing::Up);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut payload = Payload::new();
        payload.write_u32(1);
        let result = ServerEvent::parse(&message(MessageType::WorldState, payload));
        assert!(result.is_err());
    }

    #[test]
    fn test_client_only_and_unknown_types_are_skipped() {
        let spawn = message(MessageType::Spawn, Payload::new());
        assert_eq!(ServerEvent::parse(&spawn).unwrap(), None);

        let mut unknown = message(MessageType::None, Payload::new());
        unknown.header.message_type = 200;
        assert_eq!(ServerEvent::parse(&unknown).unwrap(), None);
    }
}
