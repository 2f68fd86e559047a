use crate::setup::FrameSetup;
use bytemuck::{Pod, Zeroable};
use curvecast_encode::EncodedFrame;
use curvecast_shader::FRAME_UNIFORM_BYTES;

/// Stand-in for "no hard limit"; matches the tracer's `NONE`.
const NO_LIMIT: f32 = 1e9;

/// GPU-side frame uniform block, field for field the `Frame` struct of the
/// generated prelude.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub start: [[f32; 4]; 4],
    pub lp: [[f32; 4]; 4],
    pub fov: [f32; 2],
    pub screen_pos: [f32; 2],
    pub shift: f32,
    pub linear_sight_range: f32,
    pub exp_start: f32,
    pub exp_decay: f32,
    pub hard_limit: f32,
    pub maxstep: f32,
    pub minstep: f32,
    pub level_lines: f32,
    pub reflectivity: f32,
    pub plevel: f32,
    pub start_level: f32,
    pub near: f32,
    pub far: f32,
    pub _pad: [f32; 3],
    pub chart_half: [f32; 4],
    /// `(f, 1 + f, sqrt(1 + f), 0)` for stretch factor `f`.
    pub stretch: [f32; 4],
    pub fog_color: [f32; 4],
    /// Viewer slot, wall offset, side count.
    pub start_cell: [i32; 4],
    /// Table width, slots per row, degree, transforms in use.
    pub table_layout: [i32; 4],
    /// Mirror block offset, ultra-mirror offset and count.
    pub table_offsets: [i32; 4],
}

const _: () = assert!(std::mem::size_of::<FrameUniforms>() == FRAME_UNIFORM_BYTES);

impl FrameUniforms {
    pub fn new(setup: &FrameSetup, frame: &EncodedFrame) -> Self {
        let f = setup.stretch;
        let layout = frame.layout;
        Self {
            start: setup.start.to_gpu(),
            lp: setup.lp.as_mat4().to_cols_array_2d(),
            fov: setup.fov.as_vec2().to_array(),
            screen_pos: setup.screen_pos.as_vec2().to_array(),
            shift: setup.shift as f32,
            linear_sight_range: setup.linear_sight_range as f32,
            exp_start: setup.exp_start as f32,
            exp_decay: setup.exp_decay as f32,
            hard_limit: setup.hard_limit.map_or(NO_LIMIT, |h| h as f32),
            maxstep: setup.maxstep as f32,
            minstep: setup.minstep as f32,
            level_lines: setup.level_lines as f32,
            reflectivity: setup.reflectivity as f32,
            plevel: setup.plevel as f32,
            start_level: setup.start_level as f32,
            near: setup.near as f32,
            far: setup.far as f32,
            _pad: [0.0; 3],
            chart_half: setup.chart_half.as_vec3().extend(0.0).to_array(),
            stretch: [f as f32, (1.0 + f) as f32, (1.0 + f).sqrt() as f32, 0.0],
            fog_color: setup.fog_color.to_array(),
            start_cell: [
                0,
                setup.start_wall_offset as i32,
                setup.start_sides as i32,
                0,
            ],
            table_layout: [
                layout.width() as i32,
                layout.per_row as i32,
                layout.degree as i32,
                frame.transforms.len() as i32,
            ],
            table_offsets: [
                frame.mirror_offset.unwrap_or(0) as i32,
                frame.ultra_offset as i32,
                frame.ultra_count as i32,
                0,
            ],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
