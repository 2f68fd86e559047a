use crate::graph::{AtlasPlacement, Material};
use curvecast_common::Rgba;
use serde::{Deserialize, Serialize};

/// Deterministic seeded wall population for the reference worlds.
///
/// A cell's material depends only on the seed and a per-cell key, so
/// regenerating a world with the same seed reproduces it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Population {
    pub seed: u64,
    /// Chance, in thousandths, that a cell is solid.
    pub solid_per_mille: u32,
    /// Chance, in thousandths, that a passable cell is tinted.
    pub tint_per_mille: u32,
    /// Give solid cells a tile of the texture atlas.
    pub textured: bool,
}

impl Default for Population {
    fn default() -> Self {
        Self {
            seed: 0,
            solid_per_mille: 250,
            tint_per_mille: 0,
            textured: false,
        }
    }
}

impl Population {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    fn roll(&self, key: u64, salt: u64) -> u64 {
        splitmix64(self.seed ^ splitmix64(key.wrapping_add(salt.wrapping_mul(0x9e37_79b9))))
    }

    pub fn material(&self, key: u64) -> Material {
        let r = self.roll(key, 1);
        if r % 1000 < self.solid_per_mille as u64 {
            let color = Rgba::from_rgb(brighten((r >> 16) as u32), 0xFF);
            let texture = self.textured.then(|| {
                // 2x2 atlas
                let tile = (r >> 40) & 3;
                AtlasPlacement {
                    u: if tile & 1 == 0 { 0.25 } else { 0.75 },
                    v: if tile & 2 == 0 { 0.25 } else { 0.75 },
                    scale: 0.2,
                }
            });
            return Material::Solid { color, texture };
        }
        let t = self.roll(key, 2);
        if t % 1000 < self.tint_per_mille as u64 {
            return Material::Tinted(Rgba::from_rgb(brighten((t >> 16) as u32), 0x40));
        }
        Material::Empty
    }

    /// Random fog color with `density` as its alpha.
    pub fn fog(&self, key: u64, density: u8) -> Rgba {
        Rgba::from_rgb((self.roll(key, 3) >> 8) as u32, density)
    }
}

fn brighten(rgb: u32) -> u32 {
    (rgb & 0x00BF_BFBF) + 0x0040_4040
}

/// Splitmix64 step; the mixing function behind every seeded roll.
pub fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_world() {
        let a = Population::with_seed(42);
        let b = Population::with_seed(42);
        for key in 0..200 {
            assert_eq!(a.material(key), b.material(key));
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let a = Population::with_seed(1);
        let b = Population::with_seed(2);
        assert!((0..200).any(|k| a.material(k) != b.material(k)));
    }

    #[test]
    fn solid_ratio_is_respected() {
        let p = Population {
            solid_per_mille: 1000,
            ..Population::with_seed(3)
        };
        assert!((0..50).all(|k| p.material(k).is_solid()));
        let p = Population {
            solid_per_mille: 0,
            ..Population::with_seed(3)
        };
        assert!((0..50).all(|k| p.material(k) == Material::Empty));
    }

    #[test]
    fn fog_density_is_alpha() {
        let p = Population::with_seed(9);
        assert_eq!(p.fog(5, 16).a(), 16);
    }

    #[test]
    fn textured_solids_get_a_tile() {
        let p = Population {
            solid_per_mille: 1000,
            textured: true,
            ..Population::with_seed(4)
        };
        match p.material(11) {
            Material::Solid {
                texture: Some(t), ..
            } => assert!(t.scale > 0.0),
            other => panic!("expected textured solid, got {other:?}"),
        }
    }
}
