use crate::dispatcher::PreparedFrame;
use crate::setup::FrameSetup;
use crate::viewer::Projection;
use curvecast_common::{GeometryKind, Motion};
use curvecast_encode::EncodedFrame;
use curvecast_geometry::{
    AdaptiveMarcher, Chart, ConstantModel, LevelSide, ProductModel, ProductRay, Space, StepLimits,
    StepOutcome,
};
use curvecast_world::ShapeTable;
use glam::{DVec2, DVec3, DVec4};
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;

/// Exit distance assumed when no wall lies ahead.
const NO_EXIT: f64 = 100.0;

/// How a traced ray ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEnd {
    /// Stopped by an opaque, non-reflecting wall.
    Opaque,
    /// Walked into a side with no encoded neighbor.
    NoNeighbor,
    /// Hit a wall past the hard limit.
    HardLimit,
    /// Ran out of iterations.
    Exhausted,
}

/// A wall the ray composited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub slot: usize,
    pub side: usize,
    /// Distance along the ray.
    pub distance: f64,
    /// Opacity used for compositing.
    pub alpha: f64,
    pub reflected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceResult {
    pub color: DVec3,
    pub depth: f64,
    /// Light still passing after the last composite.
    pub transmittance: f64,
    pub hits: Vec<Hit>,
    pub iterations: u32,
    pub end: TraceEnd,
}

enum Ray {
    Constant {
        model: ConstantModel,
        pos: DVec4,
        tangent: DVec4,
    },
    Product {
        model: ProductModel,
        ray: ProductRay,
    },
    Stepped {
        marcher: AdaptiveMarcher,
        pos: DVec4,
        tangent: DVec4,
    },
}

impl Ray {
    /// Point used for wall-polygon lookups.
    fn chart_position(&self) -> DVec4 {
        match self {
            Ray::Product { ray, .. } => {
                let p = ray.position;
                DVec4::new(p.x / p.z, p.y / p.z, ray.zpos, 1.0)
            }
            Ray::Constant { pos, .. } | Ray::Stepped { pos, .. } => *pos / pos.w,
        }
    }

    fn position(&self) -> DVec4 {
        match self {
            Ray::Product { ray, .. } => ray.position,
            Ray::Constant { pos, .. } | Ray::Stepped { pos, .. } => *pos,
        }
    }

    fn apply(&mut self, m: &Motion) {
        match self {
            Ray::Product { ray, .. } => {
                ray.position = m.apply(ray.position);
                ray.tangent = m.apply(ray.tangent);
            }
            Ray::Constant { pos, tangent, .. } | Ray::Stepped { pos, tangent, .. } => {
                *pos = m.apply(*pos);
                *tangent = m.apply(*tangent);
            }
        }
    }

    fn turn(&mut self, m: &Motion) {
        match self {
            Ray::Product { ray, .. } => ray.tangent = m.apply(ray.tangent),
            Ray::Constant { tangent, .. } | Ray::Stepped { tangent, .. } => {
                *tangent = m.apply(*tangent)
            }
        }
    }
}

/// One leg of the march inside the current cell.
enum Leg {
    /// The integrator threw its trial step away.
    Rejected,
    /// Moved `dist` without leaving the cell.
    Inside(f64),
    /// Moved `dist` onto side `which` (ultra-mirrors number past the sides).
    Exit(f64, usize),
}

/// CPU rendition of the generated tracer, in f64, over the same encoded
/// tables. Atlas lookups sample white.
pub struct CpuTracer<'a> {
    setup: &'a FrameSetup,
    frame: &'a EncodedFrame,
    space: Space,
    charts: HashMap<usize, Chart>,
}

impl<'a> CpuTracer<'a> {
    /// `None` for geometries without an ambient model.
    pub fn new(prepared: &'a PreparedFrame, shapes: &ShapeTable) -> Option<Self> {
        let setup = &prepared.setup;
        let space = Space::for_kind(setup.kind, setup.plevel, setup.stretch)?;
        let charts = (0..shapes.len())
            .filter_map(|i| Some((shapes.wall_offset(i), shapes.chart(setup.kind, i)?)))
            .collect();
        Some(Self {
            setup,
            frame: &prepared.encoded,
            space,
            charts,
        })
    }

    fn transform(&self, index: usize) -> Motion {
        self.frame
            .transforms
            .get(index)
            .copied()
            .unwrap_or(Motion::IDENTITY)
    }

    fn launch(&self, at0: DVec3) -> Ray {
        let start = self.setup.start;
        match self.space {
            Space::Constant(model) => Ray::Constant {
                model,
                pos: start.apply(model.origin()),
                tangent: start.apply(model.tangent(at0)),
            },
            Space::Product(model) => Ray::Product {
                model,
                ray: model.launch(&start, self.setup.start_level, at0),
            },
            Space::Stepped(geodesic) => {
                let pos = start.apply(geodesic.origin());
                let tangent = geodesic.launch(pos, start.apply(at0.extend(0.0)));
                let limits = StepLimits {
                    maxstep: self.setup.maxstep,
                    minstep: self.setup.minstep,
                };
                Ray::Stepped {
                    marcher: AdaptiveMarcher::new(geodesic, limits),
                    pos,
                    tangent,
                }
            }
        }
    }

    fn leg(&self, ray: &mut Ray, wall_offset: usize, sides: usize) -> Leg {
        let mut best: Option<(f64, usize)> = None;
        let mut consider = |d: Option<f64>, which: usize| {
            if let Some(d) = d
                && best.is_none_or(|(b, _)| d < b)
            {
                best = Some((d, which));
            }
        };
        match ray {
            Ray::Constant { model, pos, tangent } => {
                for i in 0..sides {
                    let wall = self.transform(wall_offset + i).matrix();
                    consider(model.exit_distance(*pos, *tangent, &wall), i);
                }
                if self.setup.flags.ultra_mirrors {
                    for k in 0..self.frame.ultra_count {
                        let m = self.transform(self.frame.ultra_offset + k).matrix();
                        consider(model.exit_distance(*pos, *tangent, &m), sides + k);
                    }
                }
                let Some((d, which)) = best else {
                    return Leg::Inside(NO_EXIT);
                };
                let d = d.max(0.0);
                let (p, t) = model.transport(*pos, *tangent, d);
                (*pos, *tangent) = model.renormalize(p, t);
                Leg::Exit(d, which)
            }
            Ray::Product { model, ray } => {
                for i in 0..sides.saturating_sub(2) {
                    let wall = self.transform(wall_offset + i).matrix();
                    consider(model.exit_distance(ray, &wall), i);
                }
                if let Some((d, side)) = model.level_exit(ray) {
                    consider(Some(d), side.side(sides));
                }
                let Some((d, which)) = best else {
                    return Leg::Inside(NO_EXIT);
                };
                let d = d.max(0.0);
                model.transport(ray, d);
                Leg::Exit(d, which)
            }
            Ray::Stepped { marcher, pos, tangent } => {
                let Some(chart) = self.charts.get(&wall_offset) else {
                    return Leg::Inside(NO_EXIT);
                };
                match marcher.step(chart, pos, tangent) {
                    StepOutcome::Rejected { .. } => Leg::Rejected,
                    StepOutcome::Advanced { step } => Leg::Inside(step),
                    StepOutcome::Exited { step, face } => Leg::Exit(step, face),
                }
            }
        }
    }

    /// In-face coordinates of `pos` on `wall`, `(1, 1)` off every triangle.
    fn inface(&self, pos: DVec4, wall: usize) -> DVec2 {
        let block = &self.frame.walls;
        let start = |w: usize| {
            block
                .starts
                .get(w / 4)
                .map_or(0, |row| row[w % 4].max(0) as usize)
        };
        for i in start(wall)..start(wall + 1) {
            let (Some(x), Some(y)) = (block.x.get(i), block.y.get(i)) else {
                break;
            };
            let v = DVec2::new(
                glam::Vec4::from_array(*x).as_dvec4().dot(pos),
                glam::Vec4::from_array(*y).as_dvec4().dot(pos),
            );
            if v.x >= -1e-4 && v.y >= -1e-4 && v.x + v.y <= 1.0001 {
                return DVec2::new(v.x + v.y, v.x - v.y);
            }
        }
        DVec2::ONE
    }

    /// Trace the view-frame direction `at`.
    pub fn trace(&self, at: DVec3) -> TraceResult {
        let s = self.setup;
        let flags = s.flags;
        let kind = s.kind;
        let at0 = (s.lp * at.extend(0.0)).truncate().normalize();
        let fog = DVec4::from(s.fog_color.to_array().map(f64::from)).truncate();

        let mut slot = 0usize;
        let mut wall_offset = s.start_wall_offset;
        let mut sides = s.start_sides;
        let mut go = 0.0;
        let mut color = DVec3::ZERO;
        let mut left = 1.0;
        let mut depth = 1.0;
        let mut depth_set = false;
        let mut hits = Vec::new();
        let mut ray = self.launch(at0);
        let hard_limit = s.hard_limit.filter(|_| flags.hard_limit);

        let finish = |color: DVec3, left: f64, depth: f64, hits: Vec<Hit>, iterations: u32, end: TraceEnd| {
            TraceResult {
                color,
                depth,
                transmittance: left,
                hits,
                iterations,
                end,
            }
        };

        let mut end = TraceEnd::Exhausted;
        let mut iterations = 0;
        while iterations < s.max_iterations {
            iterations += 1;
            let (dist, which) = match self.leg(&mut ray, wall_offset, sides) {
                Leg::Rejected => continue,
                Leg::Inside(d) => (d, None),
                Leg::Exit(d, which) => (d, Some(which)),
            };

            if flags.volumetric
                && dist > 0.0
                && hard_limit.is_none_or(|hl| go < hl)
                && let Some(vol) = self.frame.fog(slot)
            {
                let vdist = hard_limit.map_or(dist, |hl| dist.min(hl - go));
                let vol = DVec4::from(vol.map(f64::from));
                let frac = (-(vol.w + 1.0 / s.exp_decay) * vdist).exp();
                color += left * (1.0 - frac) * vol.truncate();
                left *= frac;
            }
            go += dist;

            let Some(which) = which else { continue };
            if which >= sides {
                ray.turn(&self.transform(self.frame.ultra_offset + which - sides));
                continue;
            }

            let record = self.frame.record(slot, which);
            let mut col = DVec4::from(record.color.map(f64::from));
            let mut reflecting = false;
            if col.w > 0.0 {
                if hard_limit.is_some_and(|hl| go > hl) {
                    return finish(color, left, 1.0, hits, iterations, TraceEnd::HardLimit);
                }
                let inface = self.inface(ray.chart_position(), wall_offset + which);
                let tmap = record.texture;
                if tmap[2] == 0.0 {
                    let edge = ((1.0 - inface.x) / f64::from(tmap[0])).min(1.0);
                    col = (col.truncate() * edge).extend(col.w);
                }
                if !flags.volumetric {
                    let d = (1.0 - go / s.linear_sight_range)
                        .max(s.exp_start * (-go / s.exp_decay).exp());
                    col = (col.truncate() * d + fog * (1.0 - d)).extend(col.w);
                }
                if kind == GeometryKind::Nil {
                    let p = ray.position();
                    if (p.x.abs() - p.y.abs()).abs() < 0.005 {
                        col = (col.truncate() / 2.0).extend(col.w);
                    }
                }
                let opaque = col.w >= 1.0;
                if flags.reflect && opaque && s.reflectivity > 0.0 {
                    col.w = s.reflectivity;
                    reflecting = true;
                }
                color += left * col.truncate() * col.w;
                if opaque && !depth_set {
                    let z = if kind == GeometryKind::Hyperbolic {
                        at0.z * go.sinh()
                    } else {
                        at0.z * go
                    };
                    if flags.level_lines {
                        let level_z = if kind == GeometryKind::Hyperbolic {
                            z / go.cosh()
                        } else {
                            z
                        };
                        color *= 0.5 + 0.5 * (level_z * s.level_lines * 2.0 * PI).cos();
                    }
                    depth = s.perspective_depth(z);
                    depth_set = true;
                }
                left *= 1.0 - col.w;
                hits.push(Hit {
                    slot,
                    side: which,
                    distance: go,
                    alpha: col.w,
                    reflected: reflecting,
                });
                if opaque && !reflecting {
                    return finish(color, left, depth, hits, iterations, TraceEnd::Opaque);
                }
            }

            if reflecting {
                self.reflect(&mut ray, wall_offset, sides, which);
                continue;
            }

            let conn = record.connection;
            if conn[0] < 0.0 {
                end = TraceEnd::NoNeighbor;
                break;
            }
            if let Ray::Product { model, ray } = &mut ray {
                if which == LevelSide::Floor.side(sides) {
                    ray.zpos += 2.0 * model.plevel();
                } else if which == LevelSide::Ceiling.side(sides) {
                    ray.zpos -= 2.0 * model.plevel();
                }
            }
            let m = self.transform(conn[1] as usize) * self.transform(wall_offset + which);
            ray.apply(&m);
            slot = conn[0] as usize;
            if flags.multi_shape {
                wall_offset = conn[2] as usize;
                sides = conn[3] as usize;
            }
        }
        color += left * fog;
        finish(color, left, depth, hits, iterations, end)
    }

    fn reflect(&self, ray: &mut Ray, wall_offset: usize, sides: usize, which: usize) {
        let mirror = self.frame.mirror_offset.map(|o| self.transform(o + wall_offset + which));
        match ray {
            Ray::Product { ray, .. } if which >= sides.saturating_sub(2) => ray.zspeed = -ray.zspeed,
            Ray::Stepped { tangent, .. } if self.setup.kind == GeometryKind::Solv => {
                let k = which % 3;
                tangent[k] = -tangent[k];
            }
            _ => {
                if let Some(m) = mirror {
                    ray.turn(&m);
                }
            }
        }
    }

    /// Trace the center of pixel `(x, y)`, row 0 at the top.
    pub fn trace_pixel(&self, projection: &Projection, x: u32, y: u32) -> TraceResult {
        let w = projection.width.max(1) as f64;
        let h = projection.height.max(1) as f64;
        let ndc = DVec2::new(
            (x as f64 + 0.5) / w * 2.0 - 1.0,
            1.0 - (y as f64 + 0.5) / h * 2.0,
        );
        self.trace(projection.direction(ndc))
    }

    pub fn render(&self, projection: &Projection) -> TracedImage {
        let _span = tracing::info_span!("cpu_trace", w = projection.width, h = projection.height).entered();
        let (width, height) = (projection.width, projection.height);
        let mut pixels = Vec::with_capacity((width * height) as usize);
        let mut depth = Vec::with_capacity(pixels.capacity());
        let mut iterations = 0u64;
        for y in 0..height {
            for x in 0..width {
                let r = self.trace_pixel(projection, x, y);
                iterations += u64::from(r.iterations);
                pixels.push(r.color);
                depth.push(r.depth);
            }
        }
        debug!(iterations, "image traced");
        TracedImage {
            width,
            height,
            pixels,
            depth,
        }
    }
}

/// Output of [`CpuTracer::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct TracedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<DVec3>,
    pub depth: Vec<f64>,
}

impl TracedImage {
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|c| c.to_array().map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }

    /// Binary PPM (`P6`).
    pub fn to_ppm(&self) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend(self.to_rgb8());
        out
    }

    /// Luminance ramp, one character per pixel.
    pub fn to_ascii(&self) -> String {
        const RAMP: &[u8] = b" .:-=+*#%@";
        let mut out = String::with_capacity(((self.width + 1) * self.height) as usize);
        for row in self.pixels.chunks(self.width.max(1) as usize) {
            for c in row {
                let l = (0.2126 * c.x + 0.7152 * c.y + 0.0722 * c.z).clamp(0.0, 1.0);
                let i = ((l * (RAMP.len() - 1) as f64).round() as usize).min(RAMP.len() - 1);
                out.push(RAMP[i] as char);
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::prepare_frame;
    use crate::viewer::ViewerPose;
    use curvecast_common::{ProductBase, RayOptions};
    use curvecast_world::{CellGraph, NilLattice, Population, ReflectionHoneycomb};

    fn population(solid_per_mille: u32) -> Population {
        Population {
            solid_per_mille,
            ..Population::default()
        }
    }

    fn honeycomb(kind: GeometryKind, solid_per_mille: u32) -> ReflectionHoneycomb {
        ReflectionHoneycomb::for_kind(kind, population(solid_per_mille)).unwrap()
    }

    fn trace<W: CellGraph>(world: &mut W, options: &RayOptions, at: DVec3) -> TraceResult {
        let mut pose = ViewerPose::at(world.root());
        let prepared = prepare_frame(world, options, &mut pose, &Projection::sized(16, 12)).unwrap();
        let tracer = CpuTracer::new(&prepared, world.shapes()).unwrap();
        tracer.trace(at)
    }

    fn budget(max_cells: usize) -> RayOptions {
        RayOptions {
            max_cells,
            ..RayOptions::default()
        }
    }

    #[test]
    fn boxed_in_viewer_sees_the_nearest_wall() {
        let mut world = honeycomb(GeometryKind::Euclidean, 1000);
        let r = trace(&mut world, &RayOptions::default(), DVec3::Z);
        assert_eq!(r.end, TraceEnd::Opaque);
        assert_eq!(r.hits.len(), 1);
        assert_eq!(r.hits[0].side, 2);
        assert!((r.hits[0].distance - 0.5).abs() < 1e-9);
        assert!(r.color.length() > 0.0);
        assert!(r.depth > 0.0 && r.depth < 1.0);
        assert_eq!(r.transmittance, 0.0);
    }

    #[test]
    fn ray_stops_at_the_frontier_of_the_budget() {
        let mut world = honeycomb(GeometryKind::Euclidean, 0);
        let r = trace(&mut world, &budget(7), DVec3::Z);
        assert_eq!(r.end, TraceEnd::Opaque);
        assert_eq!(r.hits.len(), 1);
        assert_ne!(r.hits[0].slot, 0);
        assert_eq!(r.hits[0].side, 2);
        assert!((r.hits[0].distance - 1.5).abs() < 1e-9);
    }

    #[test]
    fn hard_limit_drops_far_walls() {
        let mut world = honeycomb(GeometryKind::Euclidean, 0);
        let options = RayOptions {
            hard_limit: Some(1.0),
            ..budget(7)
        };
        let r = trace(&mut world, &options, DVec3::Z);
        assert_eq!(r.end, TraceEnd::HardLimit);
        assert_eq!(r.depth, 1.0);
        assert!(r.hits.is_empty());
    }

    #[test]
    fn reflections_split_light_between_bounces() {
        let mut world = honeycomb(GeometryKind::Euclidean, 1000);
        let options = RayOptions {
            reflectivity: 0.5,
            ..RayOptions::default()
        };
        let r = trace(&mut world, &options, DVec3::Z);
        assert!(r.hits.len() >= 2);
        assert!(r.hits.iter().all(|h| h.reflected && h.alpha == 0.5));
        assert_eq!(r.hits[1].side, 5);
        assert!((r.hits[1].distance - 1.5).abs() < 1e-9);
        let expected = 0.5f64.powi(r.hits.len() as i32);
        assert!((r.transmittance - expected).abs() < 1e-12);
    }

    #[test]
    fn closed_empty_sphere_runs_out_of_iterations() {
        let mut world = honeycomb(GeometryKind::Spherical, 0);
        let options = RayOptions::default();
        let r = trace(&mut world, &options, DVec3::new(0.3, 0.2, 1.0));
        assert_eq!(r.end, TraceEnd::Exhausted);
        assert_eq!(r.iterations, options.max_iterations_closed);
        assert!(r.hits.is_empty());
        assert_eq!(r.color, DVec3::ZERO);
    }

    #[test]
    fn fog_absorbs_along_the_way() {
        let mut world = honeycomb(GeometryKind::Spherical, 0).with_random_fog(40);
        let options = RayOptions {
            volumetric: true,
            ..RayOptions::default()
        };
        let r = trace(&mut world, &options, DVec3::Z);
        assert!(r.transmittance > 0.0 && r.transmittance < 1.0);
        assert!(r.color.length() > 0.0);
    }

    #[test]
    fn product_rays_climb_through_layers() {
        let mut world = honeycomb(GeometryKind::Product(ProductBase::Hyperbolic), 0);
        let r = trace(&mut world, &budget(7), DVec3::Y);
        assert_eq!(r.end, TraceEnd::Opaque);
        assert_eq!(r.hits[0].side, LevelSide::Ceiling.side(6));
        assert!((r.hits[0].distance - 1.5).abs() < 1e-9);
    }

    #[test]
    fn nil_march_crosses_cells() {
        let mut world = NilLattice::new(population(0));
        let r = trace(&mut world, &budget(7), DVec3::Z);
        assert_eq!(r.end, TraceEnd::Opaque);
        assert_eq!(r.hits[0].side, 2);
        assert!((r.hits[0].distance - 1.5).abs() < 0.01, "{}", r.hits[0].distance);
    }

    #[test]
    fn images_export_as_ppm_and_ascii() {
        let mut world = honeycomb(GeometryKind::Euclidean, 1000);
        let options = RayOptions::default();
        let projection = Projection::sized(6, 4);
        let mut pose = ViewerPose::at(world.root());
        let prepared = prepare_frame(&mut world, &options, &mut pose, &projection).unwrap();
        let image = CpuTracer::new(&prepared, world.shapes())
            .unwrap()
            .render(&projection);
        assert_eq!(image.pixels.len(), 24);
        let ppm = image.to_ppm();
        assert!(ppm.starts_with(b"P6\n6 4\n255\n"));
        assert_eq!(ppm.len(), b"P6\n6 4\n255\n".len() + 72);
        assert_eq!(image.to_ascii().lines().count(), 4);
    }
}
