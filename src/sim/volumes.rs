//! Static obstacles

use super::entity::{Entity, EntityKind, VolumeKind};
use super::scene::{Node, NodeId};
use super::world::Sim;
use crate::error::Result;

/// Edge of a barricade brick
pub const BRICK_SIZE: f32 = 4.0;
/// Edge of boxes and dust piles
pub const CRATE_SIZE: f32 = 40.0;

impl VolumeKind {
    pub fn group(&self) -> &'static str {
        match self {
            VolumeKind::Plain => "plain",
            VolumeKind::Boundary => "boundary",
            VolumeKind::Brick => "brick",
            VolumeKind::Dust => "dust",
            VolumeKind::Pushable => "pushable",
        }
    }
}

pub fn volume_node(kind: VolumeKind, x: f32, y: f32, width: f32, height: f32) -> Node {
    Node::new(x, y, width, height)
        .with_group("volume")
        .with_group(kind.group())
        .with_entity(Entity::new(EntityKind::Volume(kind)))
}

impl Sim {
    /// Spawn a volume straight onto the stage
    pub fn spawn_volume(
        &mut self,
        kind: VolumeKind,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<NodeId> {
        let id = self.scene.spawn(volume_node(kind, x, y, width, height));
        let stage = self.stage();
        self.add_child(stage, id)?;
        Ok(id)
    }

    pub fn spawn_box(&mut self, x: f32, y: f32) -> Result<NodeId> {
        let id = self.spawn_volume(VolumeKind::Pushable, x, y, CRATE_SIZE, CRATE_SIZE)?;
        self.scene.add_group(id, "box");
        Ok(id)
    }

    pub fn spawn_dust(&mut self, x: f32, y: f32) -> Result<NodeId> {
        self.spawn_volume(VolumeKind::Dust, x, y, CRATE_SIZE, CRATE_SIZE)
    }

    /// Tile the area with bricks. Partial rows and columns are dropped.
    pub fn build_barricade(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<Vec<NodeId>> {
        let cols = (width / BRICK_SIZE).floor().max(0.0) as usize;
        let rows = (height / BRICK_SIZE).floor().max(0.0) as usize;
        let mut bricks = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                bricks.push(self.spawn_volume(
                    VolumeKind::Brick,
                    x + BRICK_SIZE * col as f32,
                    y + BRICK_SIZE * row as f32,
                    BRICK_SIZE,
                    BRICK_SIZE,
                )?);
            }
        }
        log::debug!("Barricade of {} bricks at ({}, {})", bricks.len(), x, y);
        Ok(bricks)
    }
}
