//! Simulation and synchronization systems driven by the scheduler

use crate::context::ServerContext;
use crate::handlers::stats_payload;
use crate::scheduler::{Cadence, TickScheduler};
use log::error;
use shared::{
    ClientId, EncodeError, Facing, InputState, MessageType, Payload, Position, Serializable,
    ENTITY_SIZE, PLAYER_SPEED, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::time::Duration;

pub const REGEN_INTERVAL: Duration = Duration::from_millis(100);
pub const INPUT_BROADCAST_INTERVAL: Duration = Duration::from_millis(50);
pub const STATS_BROADCAST_INTERVAL: Duration = Duration::from_secs(1);
pub const PERSIST_INTERVAL: Duration = Duration::from_secs(300);

pub fn register_default_systems(scheduler: &mut TickScheduler) {
    scheduler.add_system("movement", Cadence::EveryTick, movement_system);
    scheduler.add_system("cooldowns", Cadence::EveryTick, cooldown_system);
    scheduler.add_system("regen", Cadence::Interval(REGEN_INTERVAL), regen_system);
    scheduler.add_system(
        "input_broadcast",
        Cadence::Interval(INPUT_BROADCAST_INTERVAL),
        input_broadcast_system,
    );
    scheduler.add_system(
        "stats_broadcast",
        Cadence::Interval(STATS_BROADCAST_INTERVAL),
        stats_broadcast_system,
    );
    scheduler.add_system(
        "persistence",
        Cadence::Interval(PERSIST_INTERVAL),
        persistence_system,
    );
}

/// Moves every entity along its held input at a fixed speed per axis and
/// keeps it inside the world
pub fn movement_system(ctx: &mut ServerContext, elapsed: Duration) {
    let dt = elapsed.as_secs_f32();
    let world = &mut ctx.world;

    for (id, input) in &world.inputs {
        let (dx, dy) = input.direction();
        let Some(facing) = Facing::from_direction(dx, dy) else {
            continue;
        };
        world.facings.insert(*id, facing);

        if let Some(position) = world.positions.get_mut(id) {
            position.x =
                (position.x + dx * PLAYER_SPEED * dt).clamp(0.0, WORLD_WIDTH - ENTITY_SIZE);
            position.y =
                (position.y + dy * PLAYER_SPEED * dt).clamp(0.0, WORLD_HEIGHT - ENTITY_SIZE);
        }
    }
}

pub fn cooldown_system(ctx: &mut ServerContext, elapsed: Duration) {
    for cooldown in ctx.world.cooldowns.values_mut() {
        cooldown.decay(elapsed);
    }
}

pub fn regen_system(ctx: &mut ServerContext, elapsed: Duration) {
    for stats in ctx.world.stats.values_mut() {
        stats.health.regenerate(elapsed);
        stats.power.regenerate(elapsed);
    }
}

/// Payload of an InputStateUpdate
pub fn input_payload(
    id: ClientId,
    input: &InputState,
    position: &Position,
    facing: Facing,
) -> Result<Payload, EncodeError> {
    let mut payload = Payload::new();
    id.encode(&mut payload)?;
    input.encode(&mut payload)?;
    position.encode(&mut payload)?;
    facing.encode(&mut payload)?;
    Ok(payload)
}

/// Sends the input of every entity whose input changed since the last run
pub fn input_broadcast_system(ctx: &mut ServerContext, _elapsed: Duration) {
    let world = &mut ctx.world;
    for (id, input) in world.inputs.iter_mut().filter(|(_, input)| input.changed) {
        input.changed = false;
        let Some(position) = world.positions.get(id) else {
            continue;
        };
        let facing = world.facings.get(id).copied().unwrap_or_default();
        match input_payload(*id, input, position, facing) {
            Ok(payload) => ctx
                .outbox
                .broadcast(MessageType::InputStateUpdate, payload, None),
            Err(e) => error!("Failed to encode input of {}: {}", id, e),
        }
    }
}

pub fn stats_broadcast_system(ctx: &mut ServerContext, _elapsed: Duration) {
    for (id, stats) in &ctx.world.stats {
        match stats_payload(*id, stats) {
            Ok(payload) => ctx
                .outbox
                .broadcast(MessageType::StatsUpdate, payload, None),
            Err(e) => error!("Failed to encode stats of {}: {}", id, e),
        }
    }
}

pub fn persistence_system(ctx: &mut ServerContext, _elapsed: Duration) {
    ctx.persist_all();
}
