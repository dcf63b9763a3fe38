//! Performance benchmarks for the wire codec and the world systems

use rand::{Rng, SeedableRng};
use server::context::ServerContext;
use server::login::InMemoryLogins;
use server::systems::{movement_system, regen_system};
use server::world::random_spawn_point;
use server::{MemoryStore, PlayerRecord};
use shared::{
    frame, ClientId, EntitySnapshot, Facing, FrameBuffer, Header, InputState, Message,
    MessageType, Name, Payload, Position, Serializable, Stats,
};
use std::time::{Duration, Instant};

fn snapshot(id: u32) -> EntitySnapshot {
    EntitySnapshot {
        id: ClientId(id),
        name: Name(format!("player{}", id)),
        position: Position::new(0, 100.0, 200.0),
        stats: Stats::default(),
        input: InputState::default(),
        facing: Facing::Down,
    }
}

fn populated_context(entities: u32) -> ServerContext {
    let mut ctx = ServerContext::new(
        entities as usize,
        Box::new(MemoryStore::new()),
        Box::new(InMemoryLogins::new(Vec::new())),
    );
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for id in 1..=entities {
        ctx.world.spawn(
            ClientId(id),
            PlayerRecord {
                name: format!("player{}", id),
                position: random_spawn_point(&mut rng),
                stats: Stats::default(),
            },
        );
        if let Some(input) = ctx.world.inputs.get_mut(&ClientId(id)) {
            input.forward = id % 2 == 0;
            input.right = id % 3 == 0;
        }
    }
    ctx
}

/// Benchmarks encoding and decoding entity snapshots inside full messages
#[test]
fn benchmark_snapshot_codec() {
    let iterations = 50_000;
    let entity = snapshot(42);
    let start = Instant::now();

    for i in 0..iterations {
        let mut payload = Payload::new();
        entity.encode(&mut payload).unwrap();
        let message = Message::new(
            Header::new(ClientId(1), i as u64 + 1, MessageType::CreateEntity),
            payload,
        );
        let bytes = message.encode().unwrap();
        let mut decoded = Message::decode(&bytes).unwrap();
        let _ = EntitySnapshot::decode(&mut decoded.payload).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Snapshot codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks reassembling a stream of framed messages split into small
/// chunks
#[test]
fn benchmark_frame_reassembly() {
    let frames = 20_000;
    let mut stream = Vec::new();
    for i in 0..frames {
        let mut payload = Payload::new();
        payload.write_id(ClientId(i)).write_u64(i as u64);
        let bytes = Message::new(
            Header::new(ClientId(1), i as u64 + 1, MessageType::DestroyEntity),
            payload,
        )
        .encode()
        .unwrap();
        stream.extend(frame(&bytes).unwrap());
    }

    let start = Instant::now();
    let mut buffer = FrameBuffer::new();
    let mut decoded = 0;
    for chunk in stream.chunks(61) {
        buffer.extend(chunk);
        while let Some(bytes) = buffer.next_frame().unwrap() {
            Message::decode(&bytes).unwrap();
            decoded += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Frame reassembly: {} frames in {:?} ({:.2} μs/frame)",
        decoded,
        duration,
        duration.as_micros() as f64 / decoded as f64
    );

    assert_eq!(decoded, frames);
    assert!(duration.as_millis() < 1000);
}

/// Random bytes must be rejected or accepted, never panic
#[test]
fn benchmark_decode_random_bytes() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let iterations = 20_000;
    let start = Instant::now();
    let mut accepted = 0;

    for _ in 0..iterations {
        let len = rng.gen_range(0..128);
        let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        if let Ok(mut message) = Message::decode(&bytes) {
            accepted += 1;
            let _ = EntitySnapshot::decode(&mut message.payload);
        }
    }

    let duration = start.elapsed();
    println!(
        "Random decode: {} inputs, {} accepted headers, {:?}",
        iterations, accepted, duration
    );
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the every-tick movement system over a crowded world
#[test]
fn benchmark_movement_system() {
    let mut ctx = populated_context(1_000);
    let ticks = 1_000;
    let start = Instant::now();

    for _ in 0..ticks {
        movement_system(&mut ctx, Duration::from_millis(5));
        regen_system(&mut ctx, Duration::from_millis(5));
    }

    let duration = start.elapsed();
    println!(
        "Movement + regen: {} ticks over {} entities in {:?} ({:.2} μs/tick)",
        ticks,
        ctx.world.len(),
        duration,
        duration.as_micros() as f64 / ticks as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the directional attack scan
#[test]
fn benchmark_attack_scan() {
    let ctx = populated_context(1_000);
    let iterations = 2_000;
    let start = Instant::now();

    let mut hits = 0;
    for i in 0..iterations {
        let attacker = ClientId(i % 1_000 + 1);
        if ctx.world.attack_target(attacker).is_some() {
            hits += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Attack scan: {} scans in {:?}, {} hits",
        iterations, duration, hits
    );
    assert!(duration.as_millis() < 2000);
}
