//! Per-entity state held by the server world and mirrored by clients

use crate::codec::{DecodeError, EncodeError, Payload, Serializable};
use crate::protocol::ClientId;
use crate::ENTITY_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub instance_id: u32,
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(instance_id: u32, x: f32, y: f32) -> Self {
        Self { instance_id, x, y }
    }

    /// Axis-aligned box occupied by the entity
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, ENTITY_SIZE, ENTITY_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        }
    }

    /// Strict intersection, boxes that only share an edge do not overlap
    pub fn overlaps(&self, other: &Bounds) -> bool {
        !(self.right <= other.left
            || other.right <= self.left
            || self.bottom <= other.top
            || other.bottom <= self.top)
    }
}

/// A regenerating bounded resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    pub max: i32,
    pub current: i32,
    /// Amount regained per second
    pub regen_rate: i32,
}

impl StatBlock {
    pub fn new(max: i32, current: i32, regen_rate: i32) -> Self {
        Self {
            max,
            current,
            regen_rate,
        }
    }

    /// Adds `regen_rate` per second of `elapsed` and clamps into `[0, max]`
    pub fn regenerate(&mut self, elapsed: Duration) {
        let micros = elapsed.as_micros().min(i64::MAX as u128) as i64;
        let gained = (self.regen_rate as i64).saturating_mul(micros) / 1_000_000;
        let next = (self.current as i64 + gained).clamp(0, self.max.max(0) as i64);
        self.current = next as i32;
    }

    /// Subtracts `amount` and clamps at zero; returns the amount removed
    pub fn damage(&mut self, amount: i32) -> i32 {
        let before = self.current;
        self.current = (self.current - amount).clamp(0, self.max.max(0));
        before - self.current
    }
}

impl Serializable for StatBlock {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        payload
            .write_i32(self.max)
            .write_i32(self.current)
            .write_i32(self.regen_rate);
        Ok(())
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        Ok(Self {
            max: payload.read_i32()?,
            current: payload.read_i32()?,
            regen_rate: payload.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub health: StatBlock,
    pub power: StatBlock,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            health: StatBlock::new(100_000, 100_000, 1_000),
            power: StatBlock::new(100_000, 100_000, 1_000),
        }
    }
}

impl Serializable for Stats {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        self.health.encode(payload)?;
        self.power.encode(payload)
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        Ok(Self {
            health: StatBlock::decode(payload)?,
            power: StatBlock::decode(payload)?,
        })
    }
}

impl Serializable for Position {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        payload
            .write_u32(self.instance_id)
            .write_f32(self.x)
            .write_f32(self.y);
        Ok(())
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        Ok(Self {
            instance_id: payload.read_u32()?,
            x: payload.read_f32()?,
            y: payload.read_f32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Name(pub String);

impl Serializable for Name {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        payload.write_str(&self.0)?;
        Ok(())
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        Ok(Name(payload.read_str()?))
    }
}

/// Held movement keys. `changed` is server bookkeeping and is not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub changed: bool,
}

impl InputState {
    /// Unit-less movement direction, forward is towards negative y
    pub fn direction(&self) -> (f32, f32) {
        let mut dx = 0.0;
        let mut dy = 0.0;
        if self.forward {
            dy -= 1.0;
        }
        if self.backward {
            dy += 1.0;
        }
        if self.left {
            dx -= 1.0;
        }
        if self.right {
            dx += 1.0;
        }
        (dx, dy)
    }
}

impl Serializable for InputState {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        payload
            .write_bool(self.forward)
            .write_bool(self.backward)
            .write_bool(self.left)
            .write_bool(self.right);
        Ok(())
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        Ok(Self {
            forward: payload.read_bool()?,
            backward: payload.read_bool()?,
            left: payload.read_bool()?,
            right: payload.read_bool()?,
            changed: false,
        })
    }
}

/// Countdown in milliseconds. Time below a whole millisecond is carried over
/// to the next decay and never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownTimer {
    pub reset_duration: u32,
    pub remaining: u32,
    carry: Duration,
}

impl CooldownTimer {
    pub fn new(reset_duration: u32) -> Self {
        Self::with_remaining(reset_duration, 0)
    }

    pub fn with_remaining(reset_duration: u32, remaining: u32) -> Self {
        Self {
            reset_duration,
            remaining,
            carry: Duration::ZERO,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.remaining == 0
    }

    pub fn reset(&mut self) {
        self.remaining = self.reset_duration;
        self.carry = Duration::ZERO;
    }

    pub fn decay(&mut self, elapsed: Duration) {
        let total = self.carry.saturating_add(elapsed);
        let whole_ms = total.as_millis().min(u32::MAX as u128) as u32;
        self.remaining = self.remaining.saturating_sub(whole_ms);
        self.carry = if self.remaining == 0 {
            Duration::ZERO
        } else {
            total.saturating_sub(Duration::from_millis(whole_ms as u64))
        };
    }
}

impl Serializable for CooldownTimer {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        payload
            .write_u32(self.reset_duration)
            .write_u32(self.remaining);
        Ok(())
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        let reset_duration = payload.read_u32()?;
        let remaining = payload.read_u32()?;
        Ok(Self::with_remaining(reset_duration, remaining))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Facing {
    /// Facing for a non-zero direction; the dominant axis wins, vertical on ties
    pub fn from_direction(dx: f32, dy: f32) -> Option<Self> {
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        let facing = if dy.abs() >= dx.abs() {
            if dy < 0.0 {
                Facing::Up
            } else {
                Facing::Down
            }
        } else if dx < 0.0 {
            Facing::Left
        } else {
            Facing::Right
        };
        Some(facing)
    }

    pub fn unit(self) -> (f32, f32) {
        match self {
            Facing::Up => (0.0, -1.0),
            Facing::Down => (0.0, 1.0),
            Facing::Left => (-1.0, 0.0),
            Facing::Right => (1.0, 0.0),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Facing::Up => 0,
            Facing::Down => 1,
            Facing::Left => 2,
            Facing::Right => 3,
        }
    }
}

impl Serializable for Facing {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        payload.write_u8(self.to_byte());
        Ok(())
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        match payload.read_u8()? {
            0 => Ok(Facing::Up),
            1 => Ok(Facing::Down),
            2 => Ok(Facing::Left),
            3 => Ok(Facing::Right),
            value => Err(DecodeError::InvalidValue {
                field: "facing",
                value,
            }),
        }
    }
}

/// Everything a peer needs to display one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub id: ClientId,
    pub name: Name,
    pub position: Position,
    pub stats: Stats,
    pub input: InputState,
    pub facing: Facing,
}

impl Serializable for EntitySnapshot {
    fn encode(&self, payload: &mut Payload) -> Result<(), EncodeError> {
        self.id.encode(payload)?;
        self.name.encode(payload)?;
        self.position.encode(payload)?;
        self.stats.encode(payload)?;
        self.input.encode(payload)?;
        self.facing.encode(payload)
    }

    fn decode(payload: &mut Payload) -> Result<Self, DecodeError> {
        Ok(Self {
            id: ClientId::decode(payload)?,
            name: Name::decode(payload)?,
            position: Position::decode(payload)?,
            stats: Stats::decode(payload)?,
            input: InputState::decode(payload)?,
            facing: Facing::decode(payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_default_stats() {
        let stats = Stats::default();
        assert_eq!(stats.health, StatBlock::new(100_000, 100_000, 1_000));
        assert_eq!(stats.power, StatBlock::new(100_000, 100_000, 1_000));
    }

    #[test]
    fn test_regenerate_scales_by_elapsed_and_clamps() {
        let mut block = StatBlock::new(1_000, 100, 500);
        block.regenerate(Duration::from_millis(200));
        assert_eq!(block.current, 200);

        // 120.5 ms at 2000/s is 241 whole points
        let mut fine = StatBlock::new(1_000, 0, 2_000);
        fine.regenerate(Duration::from_micros(120_500));
        assert_eq!(fine.current, 241);

        block.regenerate(Duration::from_secs(10));
        assert_eq!(block.current, 1_000);

        let mut draining = StatBlock::new(1_000, 50, -1_000);
        draining.regenerate(Duration::from_secs(1));
        assert_eq!(draining.current, 0);
    }

    #[test]
    fn test_damage_clamps_at_zero() {
        let mut block = StatBlock::new(100, 30, 0);
        assert_eq!(block.damage(50), 30);
        assert_eq!(block.current, 0);
    }

    #[test]
    fn test_bounds_overlap() {
        let a = Position::new(0, 0.0, 0.0).bounds();
        let b = Position::new(0, 16.0, 16.0).bounds();
        let far = Position::new(0, 100.0, 100.0).bounds();
        let touching = Position::new(0, ENTITY_SIZE, 0.0).bounds();

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&far));
        assert!(!a.overlaps(&touching));
    }

    #[test]
    fn test_input_direction() {
        let input = InputState {
            forward: true,
            left: true,
            ..Default::default()
        };
        let (dx, dy) = input.direction();
        assert_approx_eq!(dx, -1.0);
        assert_approx_eq!(dy, -1.0);

        let cancelled = InputState {
            left: true,
            right: true,
            ..Default::default()
        };
        assert_eq!(cancelled.direction(), (0.0, 0.0));
    }

    #[test]
    fn test_facing_from_direction() {
        assert_eq!(Facing::from_direction(0.0, 0.0), None);
        assert_eq!(Facing::from_direction(0.0, -1.0), Some(Facing::Up));
        assert_eq!(Facing::from_direction(1.0, 0.0), Some(Facing::Right));
        assert_eq!(Facing::from_direction(-1.0, 1.0), Some(Facing::Down));
        assert_eq!(Facing::default(), Facing::Down);
    }

    #[test]
    fn test_cooldown_decay_saturates() {
        let mut timer = CooldownTimer::new(500);
        assert!(timer.is_ready());
        timer.reset();
        timer.decay(Duration::from_millis(200));
        assert_eq!(timer.remaining, 300);
        timer.decay(Duration::from_secs(1));
        assert!(timer.is_ready());
    }

    #[test]
    fn test_cooldown_accumulates_sub_millisecond_ticks() {
        let mut timer = CooldownTimer::new(500);
        timer.reset();
        for _ in 0..100 {
            timer.decay(Duration::from_micros(900));
        }
        assert_eq!(timer.remaining, 410);

        for _ in 0..500 {
            timer.decay(Duration::from_micros(900));
        }
        assert!(timer.is_ready());
    }

    #[test]
    fn test_cooldown_reset_drops_carry() {
        let mut timer = CooldownTimer::new(500);
        timer.reset();
        timer.decay(Duration::from_micros(900));
        timer.reset();
        timer.decay(Duration::from_micros(200));
        assert_eq!(timer.remaining, 500);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let snapshot = EntitySnapshot {
            id: ClientId(3),
            name: Name("gary".to_string()),
            position: Position::new(2, 10.5, -4.25),
            stats: Stats::default(),
            input: InputState {
                forward: true,
                changed: false,
                ..Default::default()
            },
            facing: Facing::Left,
        };
        let mut payload = Payload::new();
        snapshot.encode(&mut payload).unwrap();
        let cooldown = CooldownTimer::with_remaining(500, 120);
        cooldown.encode(&mut payload).unwrap();

        assert_eq!(EntitySnapshot::decode(&mut payload).unwrap(), snapshot);
        assert_eq!(CooldownTimer::decode(&mut payload).unwrap(), cooldown);
        assert_eq!(payload.remaining(), 0);
    }

    #[test]
    fn test_truncated_snapshot_fails() {
        let mut payload = Payload::new();
        ClientId(1).encode(&mut payload).unwrap();
        Name("x".to_string()).encode(&mut payload).unwrap();
        assert!(matches!(
            EntitySnapshot::decode(&mut payload),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }
}
