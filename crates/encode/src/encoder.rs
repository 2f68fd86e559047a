use crate::layout::TableLayout;
use crate::transforms::TransformTable;
use crate::walls::WallBlock;
use curvecast_common::{GeometryKind, Motion, RayOptions, Rgba};
use curvecast_geometry::ConstantModel;
use curvecast_world::{CellGraph, CellId, Material};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Connection value of a side with no visited neighbor.
pub const NO_NEIGHBOR: f32 = -1.0;

/// Edge shading scale of opaque walls and of tinted boundaries.
const SOLID_EDGE: f32 = 0.1;
const TINT_EDGE: f32 = 0.001;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("transform table exceeds its limit of {limit} entries; topology too complex")]
    TopologyOverflow { limit: usize },
    #[error("{needed} fixed wall and mirror motions do not fit a transform table of {limit}")]
    WallTableOverflow { needed: usize, limit: usize },
    #[error("cell budget is zero")]
    EmptyBudget,
    #[error("{cell} claims {degree} sides at wall offset {wall_offset}, but the shape table holds {walls} walls for at most {max_degree} sides")]
    ShapeMismatch {
        cell: CellId,
        degree: usize,
        wall_offset: usize,
        walls: usize,
        max_degree: usize,
    },
}

/// One record of the per-side tables, as the tracer reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideRecord {
    /// Neighbor slot (or [`NO_NEIGHBOR`]), correction index, neighbor wall
    /// offset, neighbor side count.
    pub connection: [f32; 4],
    pub color: [f32; 4],
    /// `(edge_scale, 0, 0, 0)` for flat walls, `(u, v, scale, 0)` for
    /// atlas-textured ones.
    pub texture: [f32; 4],
}

impl SideRecord {
    pub fn neighbor_slot(&self) -> Option<usize> {
        (self.connection[0] >= 0.0).then_some(self.connection[0] as usize)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeStats {
    pub cells: usize,
    pub transforms: usize,
    /// Entries added past the fixed blocks.
    pub corrections: usize,
    pub out_of_range_sides: usize,
    pub elapsed: Duration,
}

/// Everything the tracer needs about the world for one frame.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub kind: GeometryKind,
    pub layout: TableLayout,
    /// Visited cells in slot order.
    pub slots: Vec<CellId>,
    pub connections: Vec<[f32; 4]>,
    pub wall_colors: Vec<[f32; 4]>,
    pub texture_map: Vec<[f32; 4]>,
    /// Per-cell fog at each slot's side-0 texel; absent when fog is off.
    pub volumetric: Option<Vec<[f32; 4]>>,
    pub transforms: TransformTable,
    /// First mirror motion; mirrors follow the walls one to one.
    pub mirror_offset: Option<usize>,
    pub ultra_offset: usize,
    pub ultra_count: usize,
    pub walls: WallBlock,
    pub total_walls: usize,
    pub stats: EncodeStats,
    ids: HashMap<CellId, usize>,
}

impl EncodedFrame {
    pub fn slot_of(&self, cell: CellId) -> Option<usize> {
        self.ids.get(&cell).copied()
    }

    pub fn record(&self, slot: usize, side: usize) -> SideRecord {
        let i = self.layout.index(slot, side);
        SideRecord {
            connection: self.connections[i],
            color: self.wall_colors[i],
            texture: self.texture_map[i],
        }
    }

    /// Fog of a slot as `(rgb, density)`.
    pub fn fog(&self, slot: usize) -> Option<[f32; 4]> {
        self.volumetric
            .as_ref()
            .map(|v| v[self.layout.index(slot, 0)])
    }
}

/// Which optional blocks the transform table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Blocks {
    mirrors: bool,
    ultra: bool,
}

impl Blocks {
    fn for_options(options: &RayOptions, kind: GeometryKind) -> Self {
        let ultra = options.ultra_mirrors && kind == GeometryKind::Hyperbolic;
        Self {
            mirrors: kind != GeometryKind::Nil && (options.reflective() || ultra),
            ultra,
        }
    }
}

/// Reflection fixing the plane of `wall`: the bisector between the origin
/// and the neighbor center the wall maps onto it.
fn wall_mirror(kind: GeometryKind, wall: &Motion) -> Motion {
    let model = match kind {
        GeometryKind::Stretched => Some(ConstantModel::SPHERE),
        _ => ConstantModel::for_kind(kind),
    };
    match model {
        Some(model) => {
            let center = wall.inverse().apply(model.origin());
            // layer boundaries of products have identity walls
            if (center - model.origin()).length() < 1e-12 {
                Motion::IDENTITY
            } else {
                model.bisector_mirror(center)
            }
        }
        // Solv flips tangent components in the tracer instead
        None => Motion::IDENTITY,
    }
}

/// Breadth-first encoder of the visible part of a world.
#[derive(Debug, Clone, Copy)]
pub struct CellEncoder<'a> {
    options: &'a RayOptions,
}

impl<'a> CellEncoder<'a> {
    pub fn new(options: &'a RayOptions) -> Self {
        Self { options }
    }

    /// Encode the cells reachable from `viewer` within the cell budget.
    pub fn encode<W: CellGraph + ?Sized>(
        &self,
        world: &mut W,
        viewer: CellId,
    ) -> Result<EncodedFrame, EncodeError> {
        let kind = world.kind();
        let _span = tracing::info_span!("encode", %kind, %viewer).entered();
        let started = Instant::now();
        let options = self.options;
        if options.max_cells == 0 {
            return Err(EncodeError::EmptyBudget);
        }

        let blocks = Blocks::for_options(options, kind);
        let walls: Vec<Motion> = world.shapes().walls().copied().collect();
        let wall_block = WallBlock::from_shapes(world.shapes());
        let ultra: Vec<Motion> = if blocks.ultra {
            world.ultra_mirrors().to_vec()
        } else {
            Vec::new()
        };

        let mut table = TransformTable::new(options.transform_limit);
        let needed = walls.len() * if blocks.mirrors { 2 } else { 1 } + ultra.len();
        let overflow = || {
            warn!(needed, limit = options.transform_limit, "wall table does not fit");
            EncodeError::WallTableOverflow {
                needed,
                limit: options.transform_limit,
            }
        };
        for wall in &walls {
            table.push_fixed(*wall).ok_or_else(overflow)?;
        }
        let mirror_offset = if blocks.mirrors {
            let offset = table.len();
            for wall in &walls {
                table.push_fixed(wall_mirror(kind, wall)).ok_or_else(overflow)?;
            }
            Some(offset)
        } else {
            None
        };
        let ultra_offset = table.len();
        for m in &ultra {
            table.push_fixed(*m).ok_or_else(overflow)?;
        }
        let fixed = table.len();

        let slots = self.visit(world, viewer);
        let ids: HashMap<CellId, usize> = slots.iter().enumerate().map(|(i, c)| (*c, i)).collect();

        let layout = TableLayout::new(world.shapes().max_degree(), slots.len());
        let texels = layout.texel_count();
        let mut connections = vec![[NO_NEIGHBOR, 0.0, 0.0, 0.0]; texels];
        let mut wall_colors = vec![[0.0; 4]; texels];
        let mut texture_map = vec![[0.0; 4]; texels];
        let mut volumetric = options.volumetric.then(|| vec![[0.0; 4]; texels]);
        let mut out_of_range_sides = 0;

        for (slot, &cell) in slots.iter().enumerate() {
            if let Some(vol) = volumetric.as_mut() {
                let fog = world
                    .fog(cell)
                    .unwrap_or(options.fog_color.with_alpha(0));
                vol[layout.index(slot, 0)] = fog.to_array();
            }
            let wall_offset = world.wall_offset(cell);
            let degree = world.degree(cell);
            let cell_walls = walls
                .get(wall_offset..wall_offset + degree)
                .filter(|_| degree <= layout.degree)
                .ok_or_else(|| {
                    warn!(%cell, degree, wall_offset, "cell shape disagrees with the shape table");
                    EncodeError::ShapeMismatch {
                        cell,
                        degree,
                        wall_offset,
                        walls: walls.len(),
                        max_degree: layout.degree,
                    }
                })?;
            let tint = world.material(cell).tint();
            for (side, wall) in cell_walls.iter().enumerate() {
                let u = layout.index(slot, side);
                let Some((n, n_slot)) = world
                    .neighbor(cell, side)
                    .and_then(|n| ids.get(&n).map(|s| (n, *s)))
                else {
                    wall_colors[u] = options.out_of_range.with_alpha(0xFF).to_array();
                    texture_map[u] = [SOLID_EDGE, 0.0, 0.0, 0.0];
                    out_of_range_sides += 1;
                    continue;
                };

                let shade = 1.0 - world.darkness(cell, side) as f32 / 16.0;
                match world.material(n) {
                    Material::Solid { color, texture } => {
                        wall_colors[u] = color.with_alpha(0xFF).shaded(shade);
                        texture_map[u] = match texture {
                            Some(t) => [t.u, t.v, t.scale, 0.0],
                            None => [SOLID_EDGE, 0.0, 0.0, 0.0],
                        };
                    }
                    passable => {
                        let col: Rgba = tint | passable.tint();
                        if !col.is_transparent() {
                            wall_colors[u] = col.shaded(shade);
                            texture_map[u] = [TINT_EDGE, 0.0, 0.0, 0.0];
                        }
                    }
                }

                let correction = world.crossing(cell, side) * wall.inverse();
                let Some(index) = table.insert_or_find(correction) else {
                    warn!(
                        limit = options.transform_limit,
                        cells = slots.len(),
                        "topology too complex for the transform table"
                    );
                    return Err(EncodeError::TopologyOverflow {
                        limit: options.transform_limit,
                    });
                };
                connections[u] = [
                    n_slot as f32,
                    index as f32,
                    world.wall_offset(n) as f32,
                    world.degree(n) as f32,
                ];
            }
        }

        let stats = EncodeStats {
            cells: slots.len(),
            transforms: table.len(),
            corrections: table.len() - fixed,
            out_of_range_sides,
            elapsed: started.elapsed(),
        };
        debug!(
            cells = stats.cells,
            transforms = stats.transforms,
            corrections = stats.corrections,
            out_of_range = stats.out_of_range_sides,
            rows = layout.rows,
            "frame encoded"
        );

        Ok(EncodedFrame {
            kind,
            layout,
            slots,
            connections,
            wall_colors,
            texture_map,
            volumetric,
            transforms: table,
            mirror_offset,
            ultra_offset,
            ultra_count: ultra.len(),
            walls: wall_block,
            total_walls: walls.len(),
            stats,
            ids,
        })
    }

    /// Slot assignment in breadth-first order. Solid cells get a slot but are
    /// not expanded unless the viewer itself is inside one.
    fn visit<W: CellGraph + ?Sized>(&self, world: &mut W, viewer: CellId) -> Vec<CellId> {
        let max_cells = self.options.max_cells;
        let expand_solid = world.material(viewer).is_solid();
        let mut slots = vec![viewer];
        let mut seen = HashSet::from([viewer]);
        let mut cursor = 0;
        'walk: while cursor < slots.len() {
            let cell = slots[cursor];
            cursor += 1;
            if !expand_solid && world.material(cell).is_solid() {
                continue;
            }
            for side in 0..world.degree(cell) {
                let next = if self.options.generate_on_demand {
                    world.materialize(cell, side)
                } else {
                    world.neighbor(cell, side)
                };
                let Some(next) = next else { continue };
                if seen.contains(&next) {
                    continue;
                }
                if slots.len() >= max_cells {
                    break 'walk;
                }
                seen.insert(next);
                slots.push(next);
            }
        }
        slots
    }
}
