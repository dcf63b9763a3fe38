//! Authoritative entity store
//!
//! One entity per spawned client, keyed by its [`ClientId`]. Each component
//! kind lives in its own table; an entity exists iff it has a position.
//! Tables are ordered so that scans run in identity order.

use crate::store::PlayerRecord;
use log::info;
use rand::Rng;
use shared::{
    Bounds, ClientId, CooldownTimer, EntitySnapshot, Facing, InputState, Name, Position, Stats,
    ATTACK_COOLDOWN_MS, ATTACK_RANGE, DEFAULT_INSTANCE, ENTITY_SIZE, WORLD_HEIGHT, WORLD_WIDTH,
};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct World {
    pub positions: BTreeMap<ClientId, Position>,
    pub stats: BTreeMap<ClientId, Stats>,
    pub names: BTreeMap<ClientId, Name>,
    pub inputs: BTreeMap<ClientId, InputState>,
    pub cooldowns: BTreeMap<ClientId, CooldownTimer>,
    pub facings: BTreeMap<ClientId, Facing>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the entity for `id` from persisted state; replaces nothing if
    /// it already exists
    pub fn spawn(&mut self, id: ClientId, record: PlayerRecord) -> bool {
        if self.contains(id) {
            return false;
        }
        info!(
            "Spawned {} '{}' at ({:.1}, {:.1}) in instance {}",
            id, record.name, record.position.x, record.position.y, record.position.instance_id
        );
        self.positions.insert(id, record.position);
        self.stats.insert(id, record.stats);
        self.names.insert(id, Name(record.name));
        self.inputs.insert(id, InputState::default());
        self.cooldowns.insert(id, CooldownTimer::new(ATTACK_COOLDOWN_MS));
        self.facings.insert(id, Facing::default());
        true
    }

    pub fn despawn(&mut self, id: ClientId) -> bool {
        let existed = self.positions.remove(&id).is_some();
        self.stats.remove(&id);
        self.names.remove(&id);
        self.inputs.remove(&id);
        self.cooldowns.remove(&id);
        self.facings.remove(&id);
        if existed {
            info!("Despawned {}", id);
        }
        existed
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.positions.keys().copied().collect()
    }

    pub fn snapshot(&self, id: ClientId) -> Option<EntitySnapshot> {
        Some(EntitySnapshot {
            id,
            name: self.names.get(&id)?.clone(),
            position: *self.positions.get(&id)?,
            stats: *self.stats.get(&id)?,
            input: self.inputs.get(&id).copied().unwrap_or_default(),
            facing: self.facings.get(&id).copied().unwrap_or_default(),
        })
    }

    pub fn entities_in_instance(&self, instance_id: u32) -> Vec<ClientId> {
        self.positions
            .iter()
            .filter(|(_, position)| position.instance_id == instance_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Persistable view of the entity
    pub fn record(&self, id: ClientId) -> Option<PlayerRecord> {
        Some(PlayerRecord {
            name: self.names.get(&id)?.0.clone(),
            position: *self.positions.get(&id)?,
            stats: *self.stats.get(&id)?,
        })
    }

    /// Box swept in front of `id` in the direction it faces
    pub fn reach(&self, id: ClientId) -> Option<Bounds> {
        let position = self.positions.get(&id)?;
        let facing = self.facings.get(&id).copied().unwrap_or_default();
        let (x, y) = (position.x, position.y);
        let reach = match facing {
            Facing::Up => Bounds::new(x, y - ATTACK_RANGE, ENTITY_SIZE, ATTACK_RANGE),
            Facing::Down => Bounds::new(x, y + ENTITY_SIZE, ENTITY_SIZE, ATTACK_RANGE),
            Facing::Left => Bounds::new(x - ATTACK_RANGE, y, ATTACK_RANGE, ENTITY_SIZE),
            Facing::Right => Bounds::new(x + ENTITY_SIZE, y, ATTACK_RANGE, ENTITY_SIZE),
        };
        Some(reach)
    }

    /// First other entity in the attacker's instance whose box overlaps its reach
    pub fn attack_target(&self, attacker: ClientId) -> Option<ClientId> {
        let reach = self.reach(attacker)?;
        let instance_id = self.positions.get(&attacker)?.instance_id;
        self.positions
            .iter()
            .filter(|(id, position)| **id != attacker && position.instance_id == instance_id)
            .find(|(_, position)| reach.overlaps(&position.bounds()))
            .map(|(id, _)| *id)
    }
}

/// Random point of the spawn area in the default instance
pub fn random_spawn_point<R: Rng>(rng: &mut R) -> Position {
    let x = rng.gen_range(WORLD_WIDTH * 0.25..WORLD_WIDTH * 0.75 - ENTITY_SIZE);
    let y = rng.gen_range(WORLD_HEIGHT * 0.25..WORLD_HEIGHT * 0.75 - ENTITY_SIZE);
    Position::new(DEFAULT_INSTANCE, x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(name: &str, instance_id: u32, x: f32, y: f32) -> PlayerRecord {
        PlayerRecord {
            name: name.to_string(),
            position: Position::new(instance_id, x, y),
            stats: Stats::default(),
        }
    }

    #[test]
    fn test_spawn_is_idempotent() {
        let mut world = World::new();
        assert!(world.spawn(ClientId(1), record_at("gary", 0, 10.0, 10.0)));
        assert!(!world.spawn(ClientId(1), record_at("other", 0, 50.0, 50.0)));

        assert_eq!(world.len(), 1);
        assert_eq!(world.names[&ClientId(1)], Name("gary".to_string()));
        assert_eq!(world.facings[&ClientId(1)], Facing::Down);
        assert!(world.cooldowns[&ClientId(1)].is_ready());
    }

    #[test]
    fn test_despawn_clears_every_table() {
        let mut world = World::new();
        world.spawn(ClientId(1), record_at("gary", 0, 10.0, 10.0));

        assert!(world.despawn(ClientId(1)));
        assert!(!world.despawn(ClientId(1)));
        assert!(world.is_empty());
        assert!(world.stats.is_empty());
        assert!(world.inputs.is_empty());
        assert!(world.cooldowns.is_empty());
        assert!(world.facings.is_empty());
    }

    #[test]
    fn test_snapshot_and_record() {
        let mut world = World::new();
        world.spawn(ClientId(4), record_at("gary", 2, 1.0, 2.0));

        let snapshot = world.snapshot(ClientId(4)).unwrap();
        assert_eq!(snapshot.id, ClientId(4));
        assert_eq!(snapshot.position, Position::new(2, 1.0, 2.0));
        assert_eq!(snapshot.stats, Stats::default());

        let record = world.record(ClientId(4)).unwrap();
        assert_eq!(record.name, "gary");
        assert!(world.snapshot(ClientId(5)).is_none());
    }

    #[test]
    fn test_entities_in_instance() {
        let mut world = World::new();
        world.spawn(ClientId(1), record_at("a", 0, 0.0, 0.0));
        world.spawn(ClientId(2), record_at("b", 1, 0.0, 0.0));
        world.spawn(ClientId(3), record_at("c", 0, 0.0, 0.0));

        assert_eq!(
            world.entities_in_instance(0),
            vec![ClientId(1), ClientId(3)]
        );
        assert_eq!(world.entities_in_instance(1), vec![ClientId(2)]);
        assert!(world.entities_in_instance(7).is_empty());
    }

    #[test]
    fn test_attack_target_follows_facing() {
        let mut world = World::new();
        world.spawn(ClientId(1), record_at("attacker", 0, 100.0, 100.0));
        world.spawn(ClientId(2), record_at("below", 0, 100.0, 100.0 + ENTITY_SIZE + 4.0));
        world.spawn(ClientId(3), record_at("right", 0, 100.0 + ENTITY_SIZE + 4.0, 100.0));

        // Default facing is down
        assert_eq!(world.attack_target(ClientId(1)), Some(ClientId(2)));

        world.facings.insert(ClientId(1), Facing::Right);
        assert_eq!(world.attack_target(ClientId(1)), Some(ClientId(3)));

        world.facings.insert(ClientId(1), Facing::Up);
        assert_eq!(world.attack_target(ClientId(1)), None);
    }

    #[test]
    fn test_attack_ignores_other_instances() {
        let mut world = World::new();
        world.spawn(ClientId(1), record_at("attacker", 0, 100.0, 100.0));
        world.spawn(ClientId(2), record_at("elsewhere", 1, 100.0, 140.0));

        assert_eq!(world.attack_target(ClientId(1)), None);
    }

    #[test]
    fn test_random_spawn_point_in_bounds() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let position = random_spawn_point(&mut rng);
            assert_eq!(position.instance_id, DEFAULT_INSTANCE);
            assert!(position.x >= 0.0 && position.x + ENTITY_SIZE <= WORLD_WIDTH);
            assert!(position.y >= 0.0 && position.y + ENTITY_SIZE <= WORLD_HEIGHT);
        }
    }
}
