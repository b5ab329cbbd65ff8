// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// q_shared.rs: types and math shared between the host and the renderer

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// Angle indexes
pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

// ============================================================
// Limits
// ============================================================

pub const MAX_QPATH: usize = 64;
pub const MAX_DLIGHTS: usize = 32;
pub const MAX_ENTITIES: usize = 128;
pub const MAX_PARTICLES: usize = 4096;
pub const MAX_LIGHTSTYLES: usize = 256;
pub const MAX_MAP_AREAS: usize = 256;

// ============================================================
// Print / error levels
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintLevel {
    All,
    Developer,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    /// Unrecoverable, the host terminates.
    Fatal,
    /// Abort the current level and return to the console.
    Drop,
}

// ============================================================
// Contents / surface flags
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;
/// Contents value carried by internal nodes.
pub const CONTENTS_NODE: i32 = -1;

bitflags::bitflags! {
    /// Texinfo surface flags as stored in the BSP.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfFlags: u32 {
        const LIGHT   = 0x1;
        const SLICK   = 0x2;
        const SKY     = 0x4;
        const WARP    = 0x8;
        const TRANS33 = 0x10;
        const TRANS66 = 0x20;
        const FLOWING = 0x40;
        const NODRAW  = 0x80;
    }
}

// ============================================================
// Entity render flags (RF_*) and refdef flags (RDF_*)
// ============================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RenderFlags: u32 {
        const MINLIGHT      = 1;
        const VIEWERMODEL   = 2;
        const WEAPONMODEL   = 4;
        const FULLBRIGHT    = 8;
        const DEPTHHACK     = 16;
        const TRANSLUCENT   = 32;
        const FRAMELERP     = 64;
        const BEAM          = 128;
        const CUSTOMSKIN    = 256;
        const GLOW          = 512;
        const SHELL_RED     = 1024;
        const SHELL_GREEN   = 2048;
        const SHELL_BLUE    = 4096;
        const IR_VISIBLE    = 0x0000_8000;
        const SHELL_DOUBLE  = 0x0001_0000;
        const SHELL_HALF_DAM = 0x0002_0000;
    }
}

impl RenderFlags {
    pub const SHELL_MASK: RenderFlags = RenderFlags::SHELL_RED
        .union(RenderFlags::SHELL_GREEN)
        .union(RenderFlags::SHELL_BLUE)
        .union(RenderFlags::SHELL_DOUBLE)
        .union(RenderFlags::SHELL_HALF_DAM);
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RdFlags: u32 {
        const UNDERWATER   = 1;
        const NOWORLDMODEL = 2;
        const IRGOGGLES    = 4;
        const UVGOGGLES    = 8;
    }
}

// ============================================================
// Renderer interface types (from ref.h)
// ============================================================

/// Handle to a model registered with the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(pub u32);

/// Handle to an image registered with the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageHandle(pub u32);

/// imagetype_t
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Skin,
    Sprite,
    Wall,
    Pic,
    Sky,
}

/// dlight_t
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DLight {
    pub origin: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// particle_t
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Particle {
    pub origin: Vec3,
    pub color: u8,
    pub alpha: f32,
}

/// lightstyle_t
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightStyle {
    pub rgb: [f32; 3], // 0.0 - 2.0
    pub white: f32,    // highest of rgb
}

impl Default for LightStyle {
    fn default() -> Self {
        Self { rgb: [1.0; 3], white: 3.0 }
    }
}

/// entity_t: a draw request for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefEntity {
    pub model: Option<ModelHandle>,
    pub angles: Vec3,

    // most recent data
    pub origin: Vec3, // also used as RF_BEAM's "from"
    pub frame: i32,   // also used as RF_BEAM's diameter

    // previous data for lerping
    pub oldorigin: Vec3, // also used as RF_BEAM's "to"
    pub oldframe: i32,

    // misc
    pub backlerp: f32, // 0.0 = current, 1.0 = old
    pub skinnum: i32,  // also used as RF_BEAM's palette index

    pub lightstyle: i32,
    pub alpha: f32, // ignore if RF_TRANSLUCENT isn't set

    pub skin: Option<ImageHandle>, // None for inline skin
    pub flags: RenderFlags,
}

/// refdef_t: parameters for one 3D view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefDef {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub fov_x: f32,
    pub fov_y: f32,
    pub vieworg: Vec3,
    pub viewangles: Vec3,
    pub blend: [f32; 4], // rgba 0-1 full screen blend
    pub time: f32,       // time is used to auto animate
    pub rdflags: RdFlags,

    /// If present, only areas with set bits will be drawn.
    pub areabits: Option<Vec<u8>>,

    pub lightstyles: Vec<LightStyle>,
    pub entities: Vec<RefEntity>,
    pub dlights: Vec<DLight>,
    pub particles: Vec<Particle>,
}

impl RefDef {
    /// Lightstyle `idx`, or full white when the host sent fewer styles.
    pub fn lightstyle(&self, idx: usize) -> LightStyle {
        self.lightstyles.get(idx).copied().unwrap_or_default()
    }

    /// Area visibility test against the view's area bits.
    pub fn area_visible(&self, area: i32) -> bool {
        match &self.areabits {
            None => true,
            Some(bits) => {
                let area = area as usize;
                bits.get(area >> 3).map_or(false, |b| b & (1 << (area & 7)) != 0)
            }
        }
    }
}

// ============================================================
// Plane
// ============================================================

pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8,
    pub signbits: u8,
}

impl CPlane {
    /// Axial planes get PLANE_X/Y/Z, others the ANY type of their
    /// dominant axis. Signbits are refreshed as well.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        let plane_type = if normal[0] == 1.0 || normal[0] == -1.0 {
            PLANE_X
        } else if normal[1] == 1.0 || normal[1] == -1.0 {
            PLANE_Y
        } else if normal[2] == 1.0 || normal[2] == -1.0 {
            PLANE_Z
        } else {
            let ax = normal[0].abs();
            let ay = normal[1].abs();
            let az = normal[2].abs();
            if ax >= ay && ax >= az {
                PLANE_ANYX
            } else if ay >= ax && ay >= az {
                PLANE_ANYY
            } else {
                PLANE_ANYZ
            }
        };
        let mut plane = Self { normal, dist, plane_type, signbits: 0 };
        plane.signbits = signbits_for_plane(&plane);
        plane
    }
}

/// For fast box-on-planeside tests.
pub fn signbits_for_plane(p: &CPlane) -> u8 {
    let mut bits = 0u8;
    for (j, &n) in p.normal.iter().enumerate() {
        if n < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

// ============================================================
// MATHLIB: vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

fn concat_rotations(in1: &[[f32; 3]; 3], in2: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0f32; 3]; 3];
    for (row, a) in out.iter_mut().zip(in1) {
        for (j, o) in row.iter_mut().enumerate() {
            *o = a[0] * in2[0][j] + a[1] * in2[1][j] + a[2] * in2[2][j];
        }
    }
    out
}

// ============================================================
// Angle functions
// ============================================================

/// Returns (forward, right, up) for the given pitch/yaw/roll.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + -cr * -sy,
        -sr * sp * sy + -cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + -sr * -sy,
        cr * sp * sy + -sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

/// Returns 1 (front), 2 (back), or 3 (crossing) for a box vs. plane test.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if p.plane_type < 3 {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // general case: pick the corners nearest and farthest along the normal
    let negative = |j: usize| p.signbits & (1 << j) != 0;
    let near: Vec3 = std::array::from_fn(|j| if negative(j) { emaxs[j] } else { emins[j] });
    let far: Vec3 = std::array::from_fn(|j| if negative(j) { emins[j] } else { emaxs[j] });
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

fn project_point_on_plane(p: &Vec3, normal: &Vec3) -> Vec3 {
    let inv_denom = 1.0 / dot_product(normal, normal);
    let d = dot_product(normal, p) * inv_denom;
    let n = vector_scale(normal, inv_denom);
    vector_ma(p, -d, &n)
}

/// Find a vector perpendicular to `src` (assumed normalized).
pub fn perpendicular_vector(src: &Vec3) -> Vec3 {
    let mut min_elem = 1.0f32;
    let mut pos = 0;
    for (i, v) in src.iter().enumerate() {
        if v.abs() < min_elem {
            pos = i;
            min_elem = v.abs();
        }
    }
    let mut tempvec = [0.0f32; 3];
    tempvec[pos] = 1.0;

    let mut dst = project_point_on_plane(&tempvec, src);
    vector_normalize(&mut dst);
    dst
}

pub fn rotate_point_around_vector(dir: &Vec3, point: &Vec3, degrees: f32) -> Vec3 {
    let vf = *dir;
    let vr = perpendicular_vector(dir);
    let vup = cross_product(&vr, &vf);

    let m = [
        [vr[0], vup[0], vf[0]],
        [vr[1], vup[1], vf[1]],
        [vr[2], vup[2], vf[2]],
    ];
    let mut im = m;
    im[0][1] = m[1][0];
    im[0][2] = m[2][0];
    im[1][0] = m[0][1];
    im[1][2] = m[2][1];
    im[2][0] = m[0][2];
    im[2][1] = m[1][2];

    let (s, c) = degrees.to_radians().sin_cos();
    let zrot = [[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]];

    let rot = concat_rotations(&concat_rotations(&m, &zrot), &im);
    [
        dot_product(&rot[0], point),
        dot_product(&rot[1], point),
        dot_product(&rot[2], point),
    ]
}

// ============================================================
// Path utilities
// ============================================================

/// Extension of `name` without the dot, or "" if none.
pub fn com_file_extension(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(i) => &base[i + 1..],
        None => "",
    }
}
