//! Handlers for every message type a client may send
//!
//! Handlers run during dispatch with the full [`ServerContext`]. They are the
//! only place replies to inbound messages are produced.

use crate::context::ServerContext;
use crate::error::HandlerError;
use crate::router::MessageRouter;
use crate::store::PlayerRecord;
use crate::world::random_spawn_point;
use log::{debug, info, warn};
use shared::{
    ActionState, ActionType, AuthResult, ClientId, EncodeError, EntitySnapshot, Message,
    MessageType, Payload, Serializable, Stats, ATTACK_DAMAGE,
};

pub fn register_default_handlers(router: &mut MessageRouter) {
    router.register(MessageType::Connect, handle_connect);
    router.register(MessageType::Disconnect, handle_disconnect);
    router.register(MessageType::Command, handle_command);
    router.register(MessageType::Authenticate, handle_authenticate);
    router.register(MessageType::Spawn, handle_spawn);
    router.register(MessageType::Action, handle_action);
    router.register(MessageType::GetWorldState, handle_get_world_state);
}

/// Payload of CreateEntity and of each WorldState entry
pub fn snapshot_payload(snapshot: &EntitySnapshot) -> Result<Payload, EncodeError> {
    let mut payload = Payload::new();
    snapshot.encode(&mut payload)?;
    Ok(payload)
}

pub fn stats_payload(id: ClientId, stats: &Stats) -> Result<Payload, EncodeError> {
    let mut payload = Payload::new();
    id.encode(&mut payload)?;
    stats.encode(&mut payload)?;
    Ok(payload)
}

/// Binds the advertised datagram port and tells the client its identity
fn handle_connect(mut message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError> {
    let id = message.header.client_id;
    let port = message.payload.read_u16()?;
    let address = ctx
        .sessions
        .get(id)
        .map(|session| session.remote_addr.ip())
        .ok_or(HandlerError::UnknownSession(id))?;

    ctx.sessions.bind_datagram_endpoint(id, address, port);

    let mut reply = Payload::new();
    reply.write_id(id);
    ctx.outbox.send(id, MessageType::Connect, reply);
    info!("Handshake with {} complete, datagrams from {}:{}", id, address, port);
    Ok(())
}

fn handle_disconnect(message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError> {
    let id = message.header.client_id;
    ctx.outbox.send(id, MessageType::Disconnect, Payload::new());
    ctx.request_disconnect(id);
    Ok(())
}

fn handle_command(mut message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError> {
    let id = message.header.client_id;
    require_account(ctx, id)?;
    let line = message.payload.read_str()?;
    debug!("Command from {}: {}", id, line);
    ctx.console.push(line);
    Ok(())
}

fn handle_authenticate(mut message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError> {
    let id = message.header.client_id;
    let username = message.payload.read_str()?;
    let password = message.payload.read_str()?;

    let session = ctx
        .sessions
        .get(id)
        .ok_or(HandlerError::UnknownSession(id))?;

    let result = if session.account.is_some() || ctx.logins.is_logged_in(&username) {
        AuthResult::AlreadyLoggedIn
    } else {
        ctx.logins.authenticate(&username, &password)
    };

    if result == AuthResult::Valid {
        ctx.logins.login(&username);
        if let Some(session) = ctx.sessions.get_mut(id) {
            session.account = Some(username.clone());
        }
        info!("{} authenticated as '{}'", id, username);
    } else {
        warn!("{} failed to authenticate as '{}': {:?}", id, username, result);
    }

    let mut reply = Payload::new();
    reply.write_u8(result.to_byte());
    ctx.outbox.send(id, MessageType::Authenticate, reply);
    Ok(())
}

/// Creates the entity once; repeated requests are no-ops
fn handle_spawn(message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError> {
    let id = message.header.client_id;
    let name = require_account(ctx, id)?;
    if ctx.world.contains(id) {
        debug!("{} already spawned", id);
        return Ok(());
    }

    let record = match ctx.store.get(&name)? {
        Some(record) => record,
        None => {
            let record = PlayerRecord {
                name: name.clone(),
                position: random_spawn_point(&mut rand::thread_rng()),
                stats: Stats::default(),
            };
            ctx.store.insert(record.clone())?;
            info!("Created character '{}'", name);
            record
        }
    };
    ctx.world.spawn(id, record);

    let snapshot = ctx.world.snapshot(id).ok_or(HandlerError::NotSpawned(id))?;
    ctx.outbox
        .broadcast(MessageType::CreateEntity, snapshot_payload(&snapshot)?, None);
    Ok(())
}

fn handle_action(mut message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError> {
    let id = message.header.client_id;
    let action = ActionType::from_byte(message.payload.read_u8()?)?;
    let state = ActionState::from_byte(message.payload.read_u8()?)?;
    let held = state == ActionState::Begin;

    if action == ActionType::Attack {
        if !ctx.world.contains(id) {
            return Err(HandlerError::NotSpawned(id));
        }
        if held {
            attack(ctx, id)?;
        }
        return Ok(());
    }

    let input = ctx
        .world
        .inputs
        .get_mut(&id)
        .ok_or(HandlerError::NotSpawned(id))?;
    match action {
        ActionType::MoveForward => input.forward = held,
        ActionType::MoveBackward => input.backward = held,
        ActionType::MoveLeft => input.left = held,
        ActionType::MoveRight => input.right = held,
        ActionType::Attack => {}
    }
    input.changed = true;
    Ok(())
}

fn attack(ctx: &mut ServerContext, attacker: ClientId) -> Result<(), HandlerError> {
    let cooldown = ctx
        .world
        .cooldowns
        .get_mut(&attacker)
        .ok_or(HandlerError::NotSpawned(attacker))?;
    if !cooldown.is_ready() {
        debug!("{} attack on cooldown ({} ms)", attacker, cooldown.remaining);
        return Ok(());
    }
    cooldown.reset();

    let Some(target) = ctx.world.attack_target(attacker) else {
        return Ok(());
    };
    if let Some(stats) = ctx.world.stats.get_mut(&target) {
        let dealt = stats.health.damage(ATTACK_DAMAGE);
        debug!("{} hit {} for {}", attacker, target, dealt);
        let payload = stats_payload(target, stats)?;
        ctx.outbox.broadcast(MessageType::StatsUpdate, payload, None);
    }
    Ok(())
}

/// Replies with every entity sharing the requester's instance
fn handle_get_world_state(message: Message, ctx: &mut ServerContext) -> Result<(), HandlerError> {
    let id = message.header.client_id;
    let instance_id = ctx
        .world
        .positions
        .get(&id)
        .map(|position| position.instance_id)
        .ok_or(HandlerError::NotSpawned(id))?;

    let ids = ctx.world.entities_in_instance(instance_id);
    let mut reply = Payload::new();
    reply.write_u32(ids.len() as u32);
    for entity in ids {
        if let Some(snapshot) = ctx.world.snapshot(entity) {
            snapshot.encode(&mut reply)?;
        }
    }
    ctx.outbox.send(id, MessageType::WorldState, reply);
    Ok(())
}

fn require_account(ctx: &ServerContext, id: ClientId) -> Result<String, HandlerError> {
    ctx.sessions
        .get(id)
        .ok_or(HandlerError::UnknownSession(id))?
        .account
        .clone()
        .ok_or(HandlerError::NotAuthenticated(id))
}
