use crate::flags::Fingerprint;
use tracing::debug;

/// Holds the one live program, keyed by the fingerprint it was built for.
///
/// `P` is whatever the backend produces from a [`crate::ProgramSource`]:
/// the source itself, or a compiled pipeline.
#[derive(Debug)]
pub struct ProgramCache<P> {
    current: Option<(Fingerprint, P)>,
    builds: u64,
}

impl<P> Default for ProgramCache<P> {
    fn default() -> Self {
        Self {
            current: None,
            builds: 0,
        }
    }
}

impl<P> ProgramCache<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached program if `fingerprint` matches, otherwise run
    /// `build` and keep its result. A failed build leaves the cache empty.
    pub fn get_or_build<E>(
        &mut self,
        fingerprint: Fingerprint,
        build: impl FnOnce() -> Result<P, E>,
    ) -> Result<&P, E> {
        let entry = match self.current.take() {
            Some((fp, program)) if fp == fingerprint => {
                debug!(%fingerprint, "program cache hit");
                (fp, program)
            }
            old => {
                match old {
                    Some((old, _)) => {
                        debug!(from = %old, to = %fingerprint, "program fingerprint changed, rebuilding")
                    }
                    None => debug!(%fingerprint, "building program"),
                }
                let program = build()?;
                self.builds += 1;
                (fingerprint, program)
            }
        };
        Ok(&self.current.insert(entry).1)
    }

    /// Drop the live program; the next request rebuilds.
    pub fn invalidate(&mut self) {
        if self.current.take().is_some() {
            debug!("program cache invalidated");
        }
    }

    pub fn current_fingerprint(&self) -> Option<Fingerprint> {
        self.current.as_ref().map(|(fp, _)| *fp)
    }

    /// Number of successful builds so far.
    pub fn builds(&self) -> u64 {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{FeatureFlags, ProgramSpec};
    use curvecast_common::GeometryKind;

    fn fp(kind: GeometryKind, walls: usize) -> Fingerprint {
        ProgramSpec {
            kind,
            flags: FeatureFlags::default(),
            walls,
            triangles: 4 * walls,
            max_iterations: 60,
            transform_limit: 110,
        }
        .fingerprint()
    }

    #[test]
    fn same_fingerprint_is_a_hit() {
        let mut cache = ProgramCache::new();
        let a = fp(GeometryKind::Hyperbolic, 6);
        let first: Result<&u32, ()> = cache.get_or_build(a, || Ok(1));
        assert_eq!(first, Ok(&1));
        let second: Result<&u32, ()> = cache.get_or_build(a, || Ok(2));
        assert_eq!(second, Ok(&1));
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn changed_fingerprint_rebuilds() {
        let mut cache = ProgramCache::new();
        let _ = cache.get_or_build::<()>(fp(GeometryKind::Hyperbolic, 6), || Ok("h"));
        let got = cache.get_or_build::<()>(fp(GeometryKind::Spherical, 6), || Ok("s"));
        assert_eq!(got, Ok(&"s"));
        let got = cache.get_or_build::<()>(fp(GeometryKind::Spherical, 8), || Ok("s8"));
        assert_eq!(got, Ok(&"s8"));
        assert_eq!(cache.builds(), 3);
        assert_eq!(cache.current_fingerprint(), Some(fp(GeometryKind::Spherical, 8)));
    }

    #[test]
    fn failures_are_not_cached() {
        let mut cache: ProgramCache<u8> = ProgramCache::new();
        let key = fp(GeometryKind::Euclidean, 6);
        assert_eq!(cache.get_or_build(key, || Err("bad")), Err("bad"));
        assert_eq!(cache.current_fingerprint(), None);
        assert_eq!(cache.get_or_build::<&str>(key, || Ok(7)), Ok(&7));
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let mut cache = ProgramCache::new();
        let key = fp(GeometryKind::Euclidean, 6);
        let _ = cache.get_or_build::<()>(key, || Ok(0u8));
        cache.invalidate();
        assert_eq!(cache.current_fingerprint(), None);
        let _ = cache.get_or_build::<()>(key, || Ok(1u8));
        assert_eq!(cache.builds(), 2);
    }
}
