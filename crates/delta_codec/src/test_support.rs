//! Shared fixtures for codec tests.

use delta_store::{ComponentDef, ComponentId, NumericKind, World};

/// A world with `Position { x: f32, y: f32 }`, `Inventory { slots: [u16; 8] }`
/// and the `Player` tag, registered in that order.
pub(crate) fn make_world() -> (World, ComponentId, ComponentId, ComponentId) {
    let mut world = World::new();
    let position = world
        .register_component(
            ComponentDef::new("Position")
                .scalar("x", NumericKind::F32)
                .scalar("y", NumericKind::F32),
        )
        .unwrap();
    let inventory = world
        .register_component(ComponentDef::new("Inventory").array("slots", NumericKind::U16, 8))
        .unwrap();
    let player = world.register_component(ComponentDef::new("Player")).unwrap();
    (world, position, inventory, player)
}
