//! # replicate
//!
//! Replicates a small simulated world into a second world, one delta packet
//! per tick, and logs how large each packet is.
//!
//! Run with `RUST_LOG=delta_codec=debug` to see per-packet codec logs.
//!
//! ## Sequence
//!
//! 1. Register the same components in a sender and a receiver world.
//! 2. Exchange the property schema out of band (MessagePack round trip).
//! 3. Each tick: mutate the sender, serialize, deserialize into the receiver.
//! 4. Check that both worlds agree.

use anyhow::{Result, bail};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use delta_codec::{Deserializer, Schema, Serializer, SerializerConfig, Target, TargetEntry};
use delta_store::{ComponentDef, ComponentId, Entity, NumericKind, Value, World};

/// Number of entities spawned at startup.
const ENTITY_COUNT: u32 = 64;

/// Number of replicated ticks.
const TICKS: u32 = 8;

/// Fixed timestep in seconds.
const DT: f32 = 1.0 / 60.0;

/// Component ids, identical in both worlds because registration order is.
struct Components {
    position: ComponentId,
    velocity: ComponentId,
    inventory: ComponentId,
    player: ComponentId,
}

fn register(world: &mut World) -> Result<Components> {
    Ok(Components {
        position: world.register_component(
            ComponentDef::new("Position")
                .scalar("x", NumericKind::F32)
                .scalar("y", NumericKind::F32),
        )?,
        velocity: world.register_component(
            ComponentDef::new("Velocity")
                .scalar("x", NumericKind::F32)
                .scalar("y", NumericKind::F32),
        )?,
        inventory: world.register_component(ComponentDef::new("Inventory").array(
            "slots",
            NumericKind::U16,
            16,
        ))?,
        player: world.register_component(ComponentDef::new("Player"))?,
    })
}

fn spawn(world: &mut World, c: &Components) -> Result<Vec<Entity>> {
    let mut entities = Vec::new();
    for i in 0..ENTITY_COUNT {
        let e = world.add_entity();
        world.add_component(e, c.position)?;
        world.set(e, c.position.property(0), i as f32)?;
        // Only every fourth entity moves.
        if i % 4 == 0 {
            world.add_component(e, c.velocity)?;
            world.set(e, c.velocity.property(0), 3.0f32)?;
            world.set(e, c.velocity.property(1), -1.5f32)?;
        }
        if i % 8 == 0 {
            world.add_component(e, c.inventory)?;
            world.add_component(e, c.player)?;
        }
        entities.push(e);
    }
    Ok(entities)
}

fn step(world: &mut World, c: &Components, entities: &[Entity], tick: u32) -> Result<()> {
    for &e in entities {
        if world.has_component(e, c.velocity) {
            for field in 0..2 {
                let position = c.position.property(field);
                let velocity = world.get(e, c.velocity.property(field))?;
                let current = world.get(e, position)?;
                if let (Value::F32(v), Value::F32(p)) = (velocity, current) {
                    world.set(e, position, p + v * DT)?;
                }
            }
        }
        if tick % 3 == 0 && world.has_component(e, c.inventory) {
            let slot = (tick as usize) % 16;
            world.set_element(e, c.inventory.property(0), slot, tick as u16)?;
        }
    }
    Ok(())
}

fn verify(sender: &World, receiver: &World, de: &Deserializer, c: &Components) -> Result<()> {
    for &e in sender.entities() {
        let local = de.local_entity(receiver, e.id()).unwrap_or(e);
        for field in 0..2 {
            let p = c.position.property(field);
            if sender.get(e, p)? != receiver.get(local, p)? {
                bail!("{e} diverged on {p}");
            }
        }
        if sender.has_component(e, c.player) != receiver.has_component(local, c.player) {
            bail!("{e} diverged on Player");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("replicate=info".parse()?))
        .init();

    let mut sender = World::new();
    let components = register(&mut sender)?;
    let mut receiver = World::new();
    register(&mut receiver)?;

    let target = Target::Properties(vec![
        TargetEntry::Tracked(components.position),
        TargetEntry::Component(components.velocity),
        TargetEntry::Tracked(components.inventory),
        TargetEntry::Component(components.player),
    ]);
    let config = SerializerConfig::new().with_max_bytes(64 * 1024);
    let mut serializer = Serializer::with_config(&sender, target.clone(), config)?;

    let schema = serializer.schema(&sender)?;
    info!(
        fingerprint = %format!("{:016x}", schema.fingerprint()),
        "schema:\n{}",
        serde_json::to_string_pretty(&schema)?
    );
    let received = Schema::decode(&schema.encode()?)?;
    let mut deserializer = Deserializer::with_schema(&receiver, target, received)?;

    let entities = spawn(&mut sender, &components)?;
    info!(entities = entities.len(), ticks = TICKS, "replication starting");

    for tick in 0..TICKS {
        step(&mut sender, &components, &entities, tick)?;
        let Some(packet) = serializer.serialize(&sender, &entities)? else {
            warn!(tick, "nothing to send");
            continue;
        };
        let touched = deserializer.deserialize(&mut receiver, &packet)?;
        info!(tick, bytes = packet.len(), touched = touched.len(), "tick replicated");
    }

    verify(&sender, &receiver, &deserializer, &components)?;
    info!(
        sender = sender.entity_count(),
        receiver = receiver.entity_count(),
        "worlds agree"
    );
    Ok(())
}
