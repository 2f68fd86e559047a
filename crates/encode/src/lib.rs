//! Encode: flattens the visible part of a world into the tracer's tables.
//!
//! # Invariants
//! - Slots are dense, unique, and assigned in breadth-first order from the
//!   viewer with neighbors enumerated by side index.
//! - At most `max_cells` slots are assigned; every side whose neighbor has
//!   no slot carries the out-of-range color.
//! - No two transform-table entries added during encoding are equal within
//!   [`curvecast_common::MOTION_TOLERANCE`].
//! - The table layout is `walls | mirrors | ultra-mirrors | corrections`.

mod encoder;
mod layout;
mod transforms;
mod walls;

pub use encoder::{CellEncoder, EncodeError, EncodeStats, EncodedFrame, NO_NEIGHBOR, SideRecord};
pub use layout::{ROW_WIDTH, TableLayout};
pub use transforms::TransformTable;
pub use walls::WallBlock;

pub fn crate_info() -> &'static str {
    "curvecast-encode v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("encode"));
    }
}
