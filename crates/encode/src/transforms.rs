use curvecast_common::{MOTION_TOLERANCE, Motion};

/// Deduplicated, capacity-bounded list of rigid motions, referenced by
/// index from the per-side records.
///
/// Fixed blocks (walls, mirrors, ultra-mirrors) are positional and pushed
/// first; corrections found during encoding go through
/// [`TransformTable::insert_or_find`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformTable {
    entries: Vec<Motion>,
    limit: usize,
    tolerance: f64,
}

impl TransformTable {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
            tolerance: MOTION_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Append without searching. `None` when the table is full.
    pub fn push_fixed(&mut self, motion: Motion) -> Option<usize> {
        if self.entries.len() >= self.limit {
            return None;
        }
        self.entries.push(motion);
        Some(self.entries.len() - 1)
    }

    /// Index of the first entry equal to `motion` within tolerance,
    /// appending it when there is none. `None` when a new entry would
    /// exceed the limit.
    pub fn insert_or_find(&mut self, motion: Motion) -> Option<usize> {
        if let Some(i) = self.find(&motion) {
            return Some(i);
        }
        self.push_fixed(motion)
    }

    pub fn find(&self, motion: &Motion) -> Option<usize> {
        self.entries
            .iter()
            .position(|m| m.approx_eq(motion, self.tolerance))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn get(&self, index: usize) -> Option<&Motion> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[Motion] {
        &self.entries
    }

    /// f32 matrices padded with identities to the full limit, the shape of
    /// the uniform array.
    pub fn to_gpu(&self) -> Vec<[[f32; 4]; 4]> {
        let mut out: Vec<_> = self.entries.iter().map(Motion::to_gpu).collect();
        out.resize(self.limit, Motion::IDENTITY.to_gpu());
        out
    }
}
