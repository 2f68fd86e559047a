//! WGSL fragment table. The builder picks fragments by geometry family and
//! feature flags and fills the `{...}` placeholders.

/// Constants, resource declarations and helpers shared by every variant.
pub const PRELUDE: &str = r#"
const PI: f32 = 3.14159265358979;
const NONE: f32 = 1e9;
const MAX_ITER: i32 = {MAX_ITER};

struct Frame {
    start: mat4x4<f32>,
    lp: mat4x4<f32>,
    fov: vec2<f32>,
    screen_pos: vec2<f32>,
    shift: f32,
    linear_sight_range: f32,
    exp_start: f32,
    exp_decay: f32,
    hard_limit: f32,
    maxstep: f32,
    minstep: f32,
    level_lines: f32,
    reflectivity: f32,
    plevel: f32,
    start_level: f32,
    near: f32,
    far: f32,
    pad0: f32,
    pad1: f32,
    pad2: f32,
    chart_half: vec4<f32>,
    stretch: vec4<f32>,
    fog_color: vec4<f32>,
    start_cell: vec4<i32>,
    table_layout: vec4<i32>,
    table_offsets: vec4<i32>,
};

struct Transforms {
    m: array<mat4x4<f32>, {LIMIT}>,
};

struct Walls {
    x: array<vec4<f32>, {TRIANGLES}>,
    y: array<vec4<f32>, {TRIANGLES}>,
    start: array<vec4<i32>, {STARTS}>,
};

@group(0) @binding(0)
var<uniform> frame: Frame;

@group(0) @binding(1)
var<uniform> transforms: Transforms;

@group(0) @binding(2)
var<uniform> walls: Walls;

@group(0) @binding(3)
var connections: texture_2d<f32>;

@group(0) @binding(4)
var wall_colors: texture_2d<f32>;

@group(0) @binding(5)
var texture_map: texture_2d<f32>;

@group(0) @binding(6)
var volumetric: texture_2d<f32>;

@group(0) @binding(7)
var atlas: texture_2d<f32>;

@group(0) @binding(8)
var atlas_sampler: sampler;

struct ScreenOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) at: vec3<f32>,
};

struct TraceOut {
    @location(0) color: vec4<f32>,
    @builtin(frag_depth) depth: f32,
};

fn texel(cell: i32, side: i32) -> vec2<i32> {
    let per_row = frame.table_layout.y;
    let degree = frame.table_layout.z;
    return vec2<i32>((cell % per_row) * degree + side, cell / per_row);
}

fn wall_start(wall: i32) -> i32 {
    return walls.start[wall / 4][wall % 4];
}

fn map_texture(pos: vec4<f32>, wall: i32) -> vec2<f32> {
    let first = wall_start(wall);
    let last = wall_start(wall + 1);
    for (var i = first; i < last; i++) {
        let v = vec2<f32>(dot(walls.x[i], pos), dot(walls.y[i], pos));
        if (v.x >= -1e-4 && v.y >= -1e-4 && v.x + v.y <= 1.0001) {
            return vec2<f32>(v.x + v.y, v.x - v.y);
        }
    }
    return vec2<f32>(1.0, 1.0);
}

fn perspective_depth(z: f32) -> f32 {
    let n = frame.near;
    let f = frame.far;
    let d = ((-n - f) + 2.0 * n * f / z) / (n - f);
    return clamp((d + 1.0) / 2.0, 0.0, 1.0);
}
"#;

/// Full-screen pass: six vertices, ray direction per corner.
pub const SCREEN_STAGE: &str = r#"
@vertex
fn vs_screen(@builtin(vertex_index) index: u32) -> ScreenOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let xy = corners[index];
    var out: ScreenOut;
    out.clip = vec4<f32>(xy, 0.0, 1.0);
    var at = (xy - frame.screen_pos) * frame.fov;
{STEREO}    out.at = vec3<f32>(at, 1.0);
    return out;
}
"#;

pub const STEREO_SHIFT: &str = "    at.x = at.x + frame.shift;\n";

// ---- constant curvature; `{A}` is the time-like component ----

pub const HYPERBOLIC: &str = r#"
fn mink(a: vec4<f32>, b: vec4<f32>) -> f32 {
    return dot(a, b) - 2.0 * a.{A} * b.{A};
}

fn wall_distance(p: vec4<f32>, t: vec4<f32>, m: mat4x4<f32>) -> f32 {
    let mp = m * p;
    let mt = m * t;
    let v = (p.{A} - mp.{A}) / (mt.{A} - t.{A});
    if (!(abs(v) < 1.0)) {
        return NONE;
    }
    let d = atanh(v);
    let nt = p * sinh(d) + t * cosh(d);
    if (nt.{A} < (m * nt).{A}) {
        return NONE;
    }
    return d;
}

fn transport(p: vec4<f32>, t: vec4<f32>, d: f32) -> mat2x4<f32> {
    let ch = cosh(d);
    let sh = sinh(d);
    let np = p * ch + t * sh;
    let nt = t * ch + p * sh;
    let q = np / sqrt(-mink(np, np));
    let u = nt + q * mink(q, nt);
    return mat2x4<f32>(q, u / sqrt(mink(u, u)));
}
"#;

pub const SPHERICAL: &str = r#"
fn wall_distance(p: vec4<f32>, t: vec4<f32>, m: mat4x4<f32>) -> f32 {
    let mp = m * p;
    let mt = m * t;
    let v = (p.{A} - mp.{A}) / (mt.{A} - t.{A});
    if (v != v) {
        return NONE;
    }
    var d = atan(v);
    let nt = t * cos(d) - p * sin(d);
    if (nt.{A} > (m * nt).{A}) {
        d = d + PI;
    }
    return d;
}

fn transport(p: vec4<f32>, t: vec4<f32>, d: f32) -> mat2x4<f32> {
    let c = cos(d);
    let s = sin(d);
    let q = normalize(p * c + t * s);
    let u = t * c - p * s;
    return mat2x4<f32>(q, normalize(u - q * dot(q, u)));
}
"#;

pub const EUCLIDEAN: &str = r#"
fn wall_distance(p: vec4<f32>, t: vec4<f32>, m: mat4x4<f32>) -> f32 {
    let mp = m * p;
    let mt = m * t;
    let deno = dot(p, t) - dot(mp, mt);
    if (abs(deno) < 1e-6) {
        return NONE;
    }
    let d = (dot(mp, mp) - dot(p, p)) / 2.0 / deno;
    if (d < 0.0) {
        return NONE;
    }
    let np = p + t * d;
    if (dot(np, t) < dot(m * np, mt)) {
        return NONE;
    }
    return d;
}

fn transport(p: vec4<f32>, t: vec4<f32>, d: f32) -> mat2x4<f32> {
    return mat2x4<f32>(p + t * d, t);
}
"#;

// ---- step-based families ----

pub const FLOW: &str = r#"
struct Flow {
    x: vec4<f32>,
    v: vec4<f32>,
};

fn rk4(x: vec4<f32>, v: vec4<f32>, h: f32) -> Flow {
    let k1x = v;
    let k1v = accel(x, v);
    let k2x = v + k1v * (h / 2.0);
    let k2v = accel(x + k1x * (h / 2.0), k2x);
    let k3x = v + k2v * (h / 2.0);
    let k3v = accel(x + k2x * (h / 2.0), k3x);
    let k4x = v + k3v * h;
    let k4v = accel(x + k3x * h, k4x);
    let nx = x + (k1x + k2x * 2.0 + k3x * 2.0 + k4x) * (h / 6.0);
    let nv = v + (k1v + k2v * 2.0 + k3v * 2.0 + k4v) * (h / 6.0);
    return settle(nx, nv);
}
"#;

pub const NIL_FLOW: &str = r#"
fn accel(x: vec4<f32>, v: vec4<f32>) -> vec4<f32> {
    let px = x.x;
    return vec4<f32>(
        px * v.y * v.y - v.y * v.z,
        -px * v.x * v.y + v.x * v.z,
        -(px * px - 1.0) * v.x * v.y + px * v.x * v.z,
        0.0,
    );
}

fn settle(x: vec4<f32>, v: vec4<f32>) -> Flow {
    return Flow(x, v);
}

fn launch(x: vec4<f32>, v: vec4<f32>) -> vec4<f32> {
    return v;
}
"#;

pub const SOLV_FLOW: &str = r#"
fn accel(x: vec4<f32>, v: vec4<f32>) -> vec4<f32> {
    return vec4<f32>(
        -2.0 * v.x * v.z,
        2.0 * v.y * v.z,
        exp(2.0 * x.z) * v.x * v.x - exp(-2.0 * x.z) * v.y * v.y,
        0.0,
    );
}

fn settle(x: vec4<f32>, v: vec4<f32>) -> Flow {
    return Flow(x, v);
}

fn launch(x: vec4<f32>, v: vec4<f32>) -> vec4<f32> {
    return v;
}
"#;

pub const STRETCHED_FLOW: &str = r#"
fn s_translate(h: vec4<f32>) -> mat4x4<f32> {
    return mat4x4<f32>(
        vec4<f32>(h.w, h.z, -h.y, -h.x),
        vec4<f32>(-h.z, h.w, h.x, -h.y),
        vec4<f32>(h.y, -h.x, h.w, -h.z),
        h,
    );
}

fn s_itranslate(h: vec4<f32>) -> mat4x4<f32> {
    return s_translate(vec4<f32>(-h.xyz, h.w));
}

fn accel(x: vec4<f32>, v: vec4<f32>) -> vec4<f32> {
    let f = frame.stretch.x;
    let fr = s_itranslate(x) * v;
    let turn = vec4<f32>(-2.0 * f * fr.y * fr.z, 2.0 * f * fr.x * fr.z, 0.0, 0.0);
    return s_translate(x) * turn - x * dot(v, v);
}

fn settle(x: vec4<f32>, v: vec4<f32>) -> Flow {
    let q = normalize(x);
    var fr = s_itranslate(q) * v;
    fr.w = 0.0;
    let s2 = fr.x * fr.x + fr.y * fr.y + frame.stretch.y * fr.z * fr.z;
    return Flow(q, s_translate(q) * (fr / sqrt(s2)));
}

fn launch(x: vec4<f32>, v: vec4<f32>) -> vec4<f32> {
    var fr = s_itranslate(x) * v;
    fr.z = fr.z / frame.stretch.z;
    return s_translate(x) * fr;
}
"#;

pub const BOX_CHART: &str = r#"
fn chart_coords(p: vec4<f32>) -> vec3<f32> {
    var c = p.xyz / p.w;
{TWIST}    return c;
}

fn exit_face(p: vec4<f32>, wo: i32, sides: i32) -> i32 {
    let c = chart_coords(p);
    let r = abs(c) / frame.chart_half.xyz - vec3<f32>(1.0);
    var face = -1;
    var worst = 0.0;
    if (r.x > worst) {
        worst = r.x;
        face = select(0, 3, c.x < 0.0);
    }
    if (r.y > worst) {
        worst = r.y;
        face = select(1, 4, c.y < 0.0);
    }
    if (r.z > worst) {
        worst = r.z;
        face = select(2, 5, c.z < 0.0);
    }
    return face;
}

fn margin(p: vec4<f32>, wo: i32, sides: i32) -> f32 {
    let m = frame.chart_half.xyz - abs(chart_coords(p));
    return min(m.x, min(m.y, m.z));
}
"#;

pub const NIL_TWIST: &str = r#"    if (abs(c.x) > abs(c.y)) {
        c.z = c.z - c.x * c.y;
    }
"#;

pub const VORONOI_CHART: &str = r#"
fn exit_face(p: vec4<f32>, wo: i32, sides: i32) -> i32 {
    var best = 1.0 - p.w;
    var face = -1;
    for (var i = 0; i < sides; i++) {
        let there = 1.0 - (transforms.m[wo + i] * p).w;
        if (there < best) {
            best = there;
            face = i;
        }
    }
    return face;
}

fn margin(p: vec4<f32>, wo: i32, sides: i32) -> f32 {
    let here = 1.0 - p.w;
    var m = NONE;
    for (var i = 0; i < sides; i++) {
        m = min(m, 1.0 - (transforms.m[wo + i] * p).w - here);
    }
    return m;
}
"#;

// ---- tracer body ----

pub const TRACER_HEAD: &str = r#"
@fragment
fn fs_trace(in: ScreenOut) -> TraceOut {
    let at0 = normalize((frame.lp * vec4<f32>(in.at, 0.0)).xyz);
    var cell = frame.start_cell.x;
    var wall_offset = frame.start_cell.y;
    var sides = frame.start_cell.z;
    var go = 0.0;
    var color = vec3<f32>(0.0);
    var left = 1.0;
    var depth = 1.0;
    var depth_set = false;
"#;

pub const LAUNCH_CONSTANT: &str = r#"    var pos = frame.start * vec4<f32>(0.0, 0.0, 0.0, 1.0);
    var tangent = frame.start * vec4<f32>(at0, 0.0);
"#;

pub const LAUNCH_PRODUCT: &str = r#"    let xspeed = length(at0.xz);
    var base_dir = vec4<f32>(1.0, 0.0, 0.0, 0.0);
    if (xspeed > 1e-6) {
        base_dir = vec4<f32>(at0.x / xspeed, at0.z / xspeed, 0.0, 0.0);
    }
    var pos = frame.start * vec4<f32>(0.0, 0.0, 1.0, 0.0);
    var tangent = frame.start * base_dir;
    var zpos = frame.start_level;
    var zspeed = at0.y;
"#;

pub const LAUNCH_STEP: &str = r#"    var pos = frame.start * vec4<f32>(0.0, 0.0, 0.0, 1.0);
    var tangent = launch(pos, frame.start * vec4<f32>(at0, 0.0));
    var h = frame.maxstep;
"#;

pub const LOOP_HEAD: &str = r#"
    for (var iter = 0; iter < MAX_ITER; iter++) {
"#;

pub const EXIT_CONSTANT: &str = r#"        var dist = NONE;
        var which = -1;
        for (var i = 0; i < sides; i++) {
            let d = wall_distance(pos, tangent, transforms.m[wall_offset + i]);
            if (d < dist) {
                dist = d;
                which = i;
            }
        }
"#;

pub const EXIT_ULTRA: &str = r#"        for (var k = 0; k < frame.table_offsets.z; k++) {
            let d = wall_distance(pos, tangent, transforms.m[frame.table_offsets.y + k]);
            if (d < dist) {
                dist = d;
                which = sides + k;
            }
        }
"#;

pub const EXIT_PRODUCT: &str = r#"        var dist = NONE;
        var which = -1;
        if (xspeed > 1e-6) {
            for (var i = 0; i < sides - 2; i++) {
                let d = wall_distance(pos, tangent, transforms.m[wall_offset + i]) / xspeed;
                if (d < dist) {
                    dist = d;
                    which = i;
                }
            }
        }
        if (zspeed > 0.0) {
            let d = (frame.plevel - zpos) / zspeed;
            if (d < dist) {
                dist = d;
                which = sides - 1;
            }
        }
        if (zspeed < 0.0) {
            let d = (-frame.plevel - zpos) / zspeed;
            if (d < dist) {
                dist = d;
                which = sides - 2;
            }
        }
"#;

pub const EXIT_CLOSE: &str = r#"        if (which == -1) {
            dist = 100.0;
        }
        dist = max(dist, 0.0);
"#;

pub const EXIT_STEP: &str = r#"        let trial = rk4(pos, tangent, h);
        var which = exit_face(trial.x, wall_offset, sides);
        if (which >= 0 && h / 2.0 >= frame.minstep) {
            h = h / 2.0;
            continue;
        }
        let dist = h;
"#;

/// Extinction through the current cell's fog over `dist`.
pub const VOLUMETRIC: &str = r#"        if (dist > 0.0{HL_GUARD}) {
            var vdist = dist;
{HL_CLIP}            let vol = textureLoad(volumetric, texel(cell, 0), 0);
            let frac = exp(-(vol.a + 1.0 / frame.exp_decay) * vdist);
            color = color + left * (1.0 - frac) * vol.rgb;
            left = left * frac;
        }
"#;

pub const HL_GUARD: &str = " && go < frame.hard_limit";
pub const HL_CLIP: &str = r#"            if (vdist > frame.hard_limit - go) {
                vdist = frame.hard_limit - go;
            }
"#;

pub const ADVANCE_CONSTANT: &str = r#"        if (which == -1) {
            go = go + dist;
            continue;
        }
        let moved = transport(pos, tangent, dist);
        pos = moved[0];
        tangent = moved[1];
        go = go + dist;
"#;

pub const ADVANCE_PRODUCT: &str = r#"        if (which == -1) {
            go = go + dist;
            continue;
        }
        let moved = transport(pos, tangent, dist * xspeed);
        pos = moved[0];
        tangent = moved[1];
        zpos = zpos + dist * zspeed;
        go = go + dist;
"#;

pub const ADVANCE_STEP: &str = r#"        pos = trial.x;
        tangent = trial.v;
        go = go + dist;
        if (which < 0) {
            if (margin(pos, wall_offset, sides) > h) {
                h = min(2.0 * h, frame.maxstep);
            }
            continue;
        }
        h = frame.maxstep;
"#;

pub const ULTRA_TURN: &str = r#"        if (which >= sides) {
            tangent = transforms.m[frame.table_offsets.y + which - sides] * tangent;
            continue;
        }
"#;

pub const HIT_HEAD: &str = r#"        let u = texel(cell, which);
        var col = textureLoad(wall_colors, u, 0);
        var reflecting = false;
        if (col.a > 0.0) {
"#;

pub const HARD_LIMIT_STOP: &str = r#"            if (go > frame.hard_limit) {
                return TraceOut(vec4<f32>(color, 1.0), 1.0);
            }
"#;

pub const TEXTURE: &str = r#"            let inface = map_texture({CHART_POS}, wall_offset + which);
            let tmap = textureLoad(texture_map, u, 0);
            if (tmap.z == 0.0) {
                col = vec4<f32>(col.rgb * min(1.0, (1.0 - inface.x) / tmap.x), col.a);
            } else {
                let uv = tmap.xy + tmap.z * inface;
                let sampled = textureSampleLevel(atlas, atlas_sampler, uv, 0.0);
                col = vec4<f32>(col.rgb * sampled.rgb, col.a);
            }
"#;

pub const SIGHT_SHADE: &str = r#"            let d = max(1.0 - go / frame.linear_sight_range, frame.exp_start * exp(-go / frame.exp_decay));
            col = vec4<f32>(col.rgb * d + frame.fog_color.rgb * (1.0 - d), col.a);
"#;

pub const NIL_DIAGONALS: &str = r#"            if (abs(abs(pos.x) - abs(pos.y)) < 0.005) {
                col = vec4<f32>(col.rgb / 2.0, col.a);
            }
"#;

pub const OPAQUE: &str = "            let opaque = col.a >= 1.0;\n";

pub const REFLECT_MARK: &str = r#"            if (opaque && frame.reflectivity > 0.0) {
                col.a = frame.reflectivity;
                reflecting = true;
            }
"#;

pub const COMPOSITE: &str = r#"            color = color + left * col.rgb * col.a;
            if (opaque && !depth_set) {
                let z = {DEPTH_Z};
{LEVEL_LINES}                depth = perspective_depth(z);
                depth_set = true;
            }
            left = left * (1.0 - col.a);
            if (opaque && !reflecting) {
                return TraceOut(vec4<f32>(color, 1.0), depth);
            }
        }
"#;

pub const LEVEL_LINES: &str =
    "                color = color * (0.5 + 0.5 * cos({LEVEL_Z} * frame.level_lines * 2.0 * PI));\n";

pub const REFLECT_MIRROR: &str = r#"        if (reflecting) {
            tangent = transforms.m[frame.table_offsets.x + wall_offset + which] * tangent;
            continue;
        }
"#;

pub const REFLECT_PRODUCT: &str = r#"        if (reflecting) {
            if (which >= sides - 2) {
                zspeed = -zspeed;
            } else {
                tangent = transforms.m[frame.table_offsets.x + wall_offset + which] * tangent;
            }
            continue;
        }
"#;

pub const REFLECT_AXIS_FLIP: &str = r#"        if (reflecting) {
            let k = which % 3;
            if (k == 0) {
                tangent.x = -tangent.x;
            } else if (k == 1) {
                tangent.y = -tangent.y;
            } else {
                tangent.z = -tangent.z;
            }
            continue;
        }
"#;

pub const CROSS_HEAD: &str = r#"        let conn = textureLoad(connections, u, 0);
        if (conn.x < 0.0) {
            break;
        }
"#;

pub const CROSS_LEVEL: &str = r#"        if (which == sides - 2) {
            zpos = zpos + 2.0 * frame.plevel;
        }
        if (which == sides - 1) {
            zpos = zpos - 2.0 * frame.plevel;
        }
"#;

pub const CROSS_APPLY: &str = r#"        let m = transforms.m[i32(conn.y)] * transforms.m[wall_offset + which];
        pos = m * pos;
        tangent = m * tangent;
        cell = i32(conn.x);
"#;

pub const CROSS_SHAPE: &str = r#"        wall_offset = i32(conn.z);
        sides = i32(conn.w);
"#;

pub const TRACER_TAIL: &str = r#"    }
    color = color + left * frame.fog_color.rgb;
    return TraceOut(vec4<f32>(color, 1.0), depth);
}
"#;
