use crate::geodesic::Geodesic;
use glam::{DMat4, DVec3, DVec4};
use tracing::trace;

/// Local chart of one cell of a step-based geometry, used to notice when
/// an integrated point has left the cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Chart {
    /// Axis-aligned box of half extents `half` in the group chart. Faces are
    /// numbered `0:+x 1:+y 2:+z 3:-x 4:-y 5:-z`. A twisted box measures its
    /// third coordinate relative to the Nil twist so that neighboring boxes
    /// agree on their shared faces.
    Box { half: DVec3, twisted: bool },
    /// Voronoi region of the origin among the images of the origin under
    /// the wall motions. Face `i` is the bisector with the image under
    /// `walls[i]`.
    Voronoi { walls: Vec<DMat4> },
}

impl Chart {
    /// Box of a Nil lattice cell.
    pub fn nil() -> Self {
        Chart::Box {
            half: DVec3::splat(0.5),
            twisted: true,
        }
    }

    fn box_coordinates(p: DVec4, twisted: bool) -> DVec3 {
        let c = p.truncate() / p.w;
        if twisted {
            let shear = if c.x.abs() > c.y.abs() { -c.x * c.y } else { 0.0 };
            DVec3::new(c.x, c.y, c.z + shear)
        } else {
            c
        }
    }

    // monotone in the distance from the origin on the unit sphere
    fn sphere_len(p: DVec4) -> f64 {
        1.0 - p.w
    }

    /// The face `p` lies beyond, if any. When several faces are violated the
    /// one with the largest relative violation wins.
    pub fn exit_face(&self, p: DVec4) -> Option<usize> {
        match self {
            Chart::Box { half, twisted } => {
                let c = Self::box_coordinates(p, *twisted);
                let mut best: Option<(usize, f64)> = None;
                for i in 0..3 {
                    let violation = c[i].abs() / half[i] - 1.0;
                    if violation > 0.0 && best.is_none_or(|(_, v)| violation > v) {
                        let face = if c[i] < 0.0 { i + 3 } else { i };
                        best = Some((face, violation));
                    }
                }
                best.map(|(face, _)| face)
            }
            Chart::Voronoi { walls } => {
                let here = Self::sphere_len(p);
                let mut best: Option<(usize, f64)> = None;
                for (i, wall) in walls.iter().enumerate() {
                    let there = Self::sphere_len(*wall * p);
                    if there < here && best.is_none_or(|(_, v)| there < v) {
                        best = Some((i, there));
                    }
                }
                best.map(|(face, _)| face)
            }
        }
    }

    /// Lower bound on how far `p` sits inside the cell, in chart units.
    /// Negative once the point has left.
    pub fn margin(&self, p: DVec4) -> f64 {
        match self {
            Chart::Box { half, twisted } => {
                let c = Self::box_coordinates(p, *twisted);
                (0..3)
                    .map(|i| half[i] - c[i].abs())
                    .fold(f64::INFINITY, f64::min)
            }
            Chart::Voronoi { walls } => {
                let here = Self::sphere_len(p);
                walls
                    .iter()
                    .map(|wall| Self::sphere_len(*wall * p) - here)
                    .fold(f64::INFINITY, f64::min)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLimits {
    pub maxstep: f64,
    pub minstep: f64,
}

/// Result of one call to [`AdaptiveMarcher::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The trial step left the cell and was thrown away; the next trial is
    /// half as long.
    Rejected { trial: f64 },
    /// The ray moved `step` and is still inside.
    Advanced { step: f64 },
    /// The ray moved `step` and is now just past `face`.
    Exited { step: f64, face: usize },
}

/// Adaptive RK4 integration of a geodesic inside one cell chart.
///
/// The step starts at `maxstep`, halves on every trial that overshoots a
/// face, and is accepted across the face once halving would go below
/// `minstep`. Comfortable steps double again, up to `maxstep`. Every
/// accepted step therefore lies in `[minstep, maxstep]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveMarcher {
    geodesic: Geodesic,
    limits: StepLimits,
    next: f64,
}

/// Where a full march through one cell ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchExit {
    pub distance: f64,
    pub face: usize,
    pub iterations: u32,
    pub position: DVec4,
    pub velocity: DVec4,
}

impl AdaptiveMarcher {
    pub fn new(geodesic: Geodesic, limits: StepLimits) -> Self {
        Self {
            geodesic,
            limits,
            next: limits.maxstep,
        }
    }

    pub fn geodesic(&self) -> Geodesic {
        self.geodesic
    }

    pub fn next_step(&self) -> f64 {
        self.next
    }

    pub fn step(&mut self, chart: &Chart, x: &mut DVec4, v: &mut DVec4) -> StepOutcome {
        let h = self.next;
        let (nx, nv) = self.geodesic.rk4(*x, *v, h);
        match chart.exit_face(nx) {
            Some(_) if h / 2.0 >= self.limits.minstep => {
                self.next = h / 2.0;
                StepOutcome::Rejected { trial: h }
            }
            Some(face) => {
                *x = nx;
                *v = nv;
                self.next = self.limits.maxstep;
                StepOutcome::Exited { step: h, face }
            }
            None => {
                *x = nx;
                *v = nv;
                if chart.margin(nx) > h {
                    self.next = (2.0 * h).min(self.limits.maxstep);
                }
                StepOutcome::Advanced { step: h }
            }
        }
    }

    /// Step until the ray leaves the cell. Rejected trials count towards
    /// `max_iterations`; `None` when the budget runs out first.
    pub fn march_to_exit(
        &mut self,
        chart: &Chart,
        mut x: DVec4,
        mut v: DVec4,
        max_iterations: u32,
    ) -> Option<MarchExit> {
        let mut distance = 0.0;
        for iterations in 1..=max_iterations {
            match self.step(chart, &mut x, &mut v) {
                StepOutcome::Rejected { .. } => {}
                StepOutcome::Advanced { step } => distance += step,
                StepOutcome::Exited { step, face } => {
                    distance += step;
                    trace!(distance, face, iterations, "march left cell");
                    return Some(MarchExit {
                        distance,
                        face,
                        iterations,
                        position: x,
                        velocity: v,
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NIL_DIR: DVec4 = DVec4::new(0.8, 0.36, 0.48, 0.0);

    #[test]
    fn box_faces_follow_axis_order() {
        let chart = Chart::Box {
            half: DVec3::splat(0.5),
            twisted: false,
        };
        assert_eq!(chart.exit_face(DVec4::new(0.6, 0.0, 0.0, 1.0)), Some(0));
        assert_eq!(chart.exit_face(DVec4::new(0.0, 0.0, -0.7, 1.0)), Some(5));
        assert_eq!(chart.exit_face(DVec4::new(0.55, -0.9, 0.0, 1.0)), Some(4));
        assert_eq!(chart.exit_face(DVec4::new(0.1, 0.2, 0.3, 1.0)), None);
        assert!((chart.margin(DVec4::new(0.1, 0.2, 0.3, 1.0)) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn twisted_box_matches_neighbor_across_x() {
        let chart = Chart::nil();
        let p = DVec4::new(0.5, 0.2, 0.3, 1.0);
        let q = crate::geodesic::nil_translate(-1.0, 0.0, 0.0).apply(p);
        let a = Chart::box_coordinates(p, true);
        let b = Chart::box_coordinates(q, true);
        assert!((a.z - b.z).abs() < 1e-12);
        assert_eq!(chart.exit_face(p + DVec4::X * 0.01), Some(0));
        assert_eq!(chart.exit_face(q - DVec4::X * 0.01), Some(3));
    }

    #[test]
    fn voronoi_chart_picks_nearest_image() {
        let sphere = crate::constant::ConstantModel::SPHERE;
        let d = std::f64::consts::FRAC_PI_4;
        let walls: Vec<DMat4> = (0..3)
            .flat_map(|i| [(i, 1.0), (i, -1.0)])
            .map(|(i, s)| sphere.bisector_mirror(sphere.face_center(i, s, d)).0)
            .collect();
        let chart = Chart::Voronoi { walls };
        assert_eq!(chart.exit_face(DVec4::W), None);
        let out = sphere.push(1, -0.9).apply(DVec4::W);
        assert_eq!(chart.exit_face(out), Some(3));
        assert!(chart.margin(DVec4::W) > 0.0);
    }

    #[test]
    fn accepted_steps_stay_within_limits() {
        let limits = StepLimits {
            maxstep: 0.1,
            minstep: 0.001,
        };
        let mut marcher = AdaptiveMarcher::new(Geodesic::Nil, limits);
        let chart = Chart::nil();
        let (mut x, mut v) = (DVec4::W, NIL_DIR);
        let mut exited = false;
        for _ in 0..600 {
            match marcher.step(&chart, &mut x, &mut v) {
                StepOutcome::Rejected { trial } => assert!(trial / 2.0 >= limits.minstep),
                StepOutcome::Advanced { step } => {
                    assert!(step >= limits.minstep && step <= limits.maxstep);
                }
                StepOutcome::Exited { step, .. } => {
                    assert!(step >= limits.minstep && step <= limits.maxstep);
                    exited = true;
                    break;
                }
            }
            assert!(marcher.next_step() >= limits.minstep);
        }
        assert!(exited);
        assert_eq!(marcher.next_step(), limits.maxstep);
    }

    #[test]
    fn adaptive_exit_matches_fine_reference() {
        let chart = Chart::nil();
        let g = Geodesic::Nil;
        let h = 1e-4;
        let (mut x, mut v) = (DVec4::W, NIL_DIR);
        let mut reference = 0.0;
        let reference_face = loop {
            (x, v) = g.rk4(x, v, h);
            reference += h;
            if let Some(face) = chart.exit_face(x) {
                break face;
            }
        };

        let mut marcher = AdaptiveMarcher::new(
            g,
            StepLimits {
                maxstep: 0.1,
                minstep: 0.001,
            },
        );
        let exit = marcher
            .march_to_exit(&chart, DVec4::W, NIL_DIR, 600)
            .unwrap();
        assert_eq!(exit.face, reference_face);
        assert!((exit.distance - reference).abs() / reference < 0.01);
    }

    #[test]
    fn budget_counts_rejections() {
        let mut marcher = AdaptiveMarcher::new(
            Geodesic::Solv,
            StepLimits {
                maxstep: 0.05,
                minstep: 0.001,
            },
        );
        let chart = Chart::Box {
            half: DVec3::splat(0.5),
            twisted: false,
        };
        assert!(marcher.march_to_exit(&chart, DVec4::W, DVec4::Z, 5).is_none());
    }
}
