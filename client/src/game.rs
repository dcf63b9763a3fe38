use crate::events::ServerEvent;
use log::debug;
use shared::{ClientId, EntitySnapshot};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Local mirror of every entity the server has told us about. The server is
/// authoritative; nothing here is predicted.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub entities: BTreeMap<ClientId, EntitySnapshot>,
    pub local_id: Option<ClientId>,
}

impl ClientGameState {
    pub fn new(local_id: ClientId) -> Self {
        Self {
            entities: BTreeMap::new(),
            local_id: Some(local_id),
        }
    }

    pub fn local(&self) -> Option<&EntitySnapshot> {
        self.local_id.and_then(|id| self.entities.get(&id))
    }

    /// Folds one event into the mirror. Updates for entities we never saw
    /// created are ignored until a world state fills them in.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::EntityCreated(snapshot) => {
                self.entities.insert(snapshot.id, snapshot.clone());
            }
            ServerEvent::EntityDestroyed(id) => {
                self.entities.remove(id);
            }
            ServerEvent::InputChanged {
                id,
                input,
                position,
                facing,
            } => match self.entities.get_mut(id) {
                Some(entity) => {
                    entity.input = *input;
                    entity.position = *position;
                    entity.facing = *facing;
                }
                None => debug!("Input update for unknown entity {}", id),
            },
            ServerEvent::StatsChanged { id, stats } => match self.entities.get_mut(id) {
                Some(entity) => entity.stats = *stats,
                None => debug!("Stats update for unknown entity {}", id),
            },
            ServerEvent::WorldState(snapshots) => {
                self.entities = snapshots
                    .iter()
                    .map(|snapshot| (snapshot.id, snapshot.clone()))
                    .collect();
            }
            ServerEvent::Connected(id) => self.local_id = Some(*id),
            ServerEvent::Disconnected | ServerEvent::Authenticated(_) => {}
        }
    }

    /// One line per entity, the local one marked with `*`
    pub fn describe(&self) -> String {
        let mut out = format!("{} entities", self.entities.len());
        for entity in self.entities.values() {
            let marker = if Some(entity.id) == self.local_id {
                "*"
            } else {
                " "
            };
            let _ = write!(
                out,
                "\n{} {} {:<12} ({:.1}, {:.1}) hp {}/{} power {}/{} facing {:?}",
                marker,
                entity.id,
                entity.name.0,
                entity.position.x,
                entity.position.y,
                entity.stats.health.current,
                entity.stats.health.max,
                entity.stats.power.current,
                entity.stats.power.max,
                entity.facing
            );
        }
        out
    }
}
