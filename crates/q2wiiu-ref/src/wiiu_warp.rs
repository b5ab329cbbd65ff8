// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_warp.rs: water surfaces and the sky box

use glam::{Mat4, Vec3 as GVec3};
use q2wiiu_common::q_shared::{dot_product, vector_subtract, ImageHandle, ImageType, Vec3};

use crate::error::RefResult;
use crate::gx2::PrimitiveMode;
use crate::wiiu_local::{Gfx, RendererState};
use crate::wiiu_model_types::{MSurface, Vertex3D};
use crate::wiiu_shaders::ProgramKind;

const ON_EPSILON: f32 = 0.1;
const MAX_CLIP_VERTS: usize = 64;

const SKYCLIP: [Vec3; 6] = [
    [1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
];

// 1 = s, 2 = t, 3 = 2048
const ST_TO_VEC: [[i32; 3]; 6] = [
    [3, -1, 2],
    [-3, 1, 2],
    [1, 3, 2],
    [-1, -3, 2],
    [-2, -1, 3], // 0 degrees yaw, look straight up
    [2, -1, -3], // look straight down
];

// s = [0]/[2], t = [1]/[2]
const VEC_TO_ST: [[i32; 3]; 6] = [
    [-2, 3, 1],
    [2, 3, -1],
    [1, 3, 2],
    [-1, 3, -2],
    [-2, -1, 3],
    [-2, 1, -3],
];

const SKYTEXORDER: [usize; 6] = [0, 2, 1, 3, 4, 5];
const SUF: [&str; 6] = ["rt", "bk", "lf", "ft", "up", "dn"];

/// Signed component selected by a 1-based index table entry.
fn pick(v: &Vec3, j: i32) -> f32 {
    if j < 0 {
        -v[(-j - 1) as usize]
    } else {
        v[(j - 1) as usize]
    }
}

// ============================================================
// Sky bounds
// ============================================================

#[derive(Debug, Clone)]
pub struct SkyState {
    pub name: String,
    pub rotate: f32,
    pub axis: Vec3,
    pub images: [Option<ImageHandle>; 6],
    /// Per cube face: s and t bounds touched this frame.
    pub mins: [[f32; 6]; 2],
    pub maxs: [[f32; 6]; 2],
    pub min: f32,
    pub max: f32,
    /// Polygons projected this frame.
    pub c_sky: u32,
}

impl Default for SkyState {
    fn default() -> Self {
        let mut sky = Self {
            name: String::new(),
            rotate: 0.0,
            axis: [0.0; 3],
            images: [None; 6],
            mins: [[0.0; 6]; 2],
            maxs: [[0.0; 6]; 2],
            min: 1.0 / 512.0,
            max: 511.0 / 512.0,
            c_sky: 0,
        };
        sky.clear();
        sky
    }
}

impl SkyState {
    pub fn clear(&mut self) {
        self.mins = [[9999.0; 6]; 2];
        self.maxs = [[-9999.0; 6]; 2];
        self.c_sky = 0;
    }

    pub fn face_touched(&self, face: usize) -> bool {
        self.mins[0][face] < self.maxs[0][face] && self.mins[1][face] < self.maxs[1][face]
    }

    /// Grow the bounds of the face `verts` (relative to the view) maps to.
    fn project(&mut self, verts: &[Vec3]) {
        self.c_sky += 1;

        // decide which face it maps to
        let mut v = [0.0f32; 3];
        for p in verts {
            for (acc, c) in v.iter_mut().zip(p) {
                *acc += c;
            }
        }
        let av = v.map(f32::abs);
        let axis = if av[0] > av[1] && av[0] > av[2] {
            if v[0] < 0.0 { 1 } else { 0 }
        } else if av[1] > av[2] && av[1] > av[0] {
            if v[1] < 0.0 { 3 } else { 2 }
        } else if v[2] < 0.0 {
            5
        } else {
            4
        };

        // project new texture coords
        for p in verts {
            let dv = pick(p, VEC_TO_ST[axis][2]);
            if dv < 0.001 {
                continue; // don't divide by zero
            }
            let s = pick(p, VEC_TO_ST[axis][0]) / dv;
            let t = pick(p, VEC_TO_ST[axis][1]) / dv;
            self.mins[0][axis] = self.mins[0][axis].min(s);
            self.mins[1][axis] = self.mins[1][axis].min(t);
            self.maxs[0][axis] = self.maxs[0][axis].max(s);
            self.maxs[1][axis] = self.maxs[1][axis].max(t);
        }
    }

    fn clip_polygon(&mut self, verts: &[Vec3], stage: usize) {
        if verts.len() > MAX_CLIP_VERTS - 2 {
            log::warn!("sky polygon exceeds {} vertices", MAX_CLIP_VERTS);
            return;
        }
        if stage == 6 {
            // fully clipped, so draw it
            self.project(verts);
            return;
        }

        let norm = &SKYCLIP[stage];
        let dists: Vec<f32> = verts.iter().map(|v| dot_product(v, norm)).collect();
        let front = dists.iter().any(|&d| d > ON_EPSILON);
        let back = dists.iter().any(|&d| d < -ON_EPSILON);
        if !front || !back {
            // not clipped
            self.clip_polygon(verts, stage + 1);
            return;
        }

        let side = |d: f32| {
            if d > ON_EPSILON {
                1
            } else if d < -ON_EPSILON {
                -1
            } else {
                0
            }
        };

        let mut newv: [Vec<Vec3>; 2] = [Vec::new(), Vec::new()];
        for (i, (&v, &dist)) in verts.iter().zip(&dists).enumerate() {
            let next = (i + 1) % verts.len();
            let s = side(dist);
            match s {
                1 => newv[0].push(v),
                -1 => newv[1].push(v),
                _ => {
                    newv[0].push(v);
                    newv[1].push(v);
                }
            }
            let sn = side(dists[next]);
            if s == 0 || sn == 0 || sn == s {
                continue;
            }
            let d = dist / (dist - dists[next]);
            let w = verts[next];
            let e = [v[0] + d * (w[0] - v[0]), v[1] + d * (w[1] - v[1]), v[2] + d * (w[2] - v[2])];
            newv[0].push(e);
            newv[1].push(e);
        }

        let [a, b] = newv;
        self.clip_polygon(&a, stage + 1);
        self.clip_polygon(&b, stage + 1);
    }

    /// Add every poly of a sky surface, seen from `origin`.
    pub fn add_surface(&mut self, surf: &MSurface, origin: &Vec3) {
        for poly in &surf.polys {
            let verts: Vec<Vec3> = poly.vertices.iter().map(|v| vector_subtract(&v.pos, origin)).collect();
            self.clip_polygon(&verts, 0);
        }
    }

    /// One corner of a sky face, `dist` units out.
    fn make_sky_vec(&self, s: f32, t: f32, axis: usize, dist: f32) -> Vertex3D {
        let b = [s * dist, t * dist, dist];
        let v = [
            pick(&b, ST_TO_VEC[axis][0]),
            pick(&b, ST_TO_VEC[axis][1]),
            pick(&b, ST_TO_VEC[axis][2]),
        ];

        // avoid bilerp seam
        let s = ((s + 1.0) * 0.5).clamp(self.min, self.max);
        let t = 1.0 - ((t + 1.0) * 0.5).clamp(self.min, self.max);
        Vertex3D::new(v, [s, t], [0.0, 0.0])
    }
}

// ============================================================
// Water
// ============================================================

impl Gfx {
    /// Draw a warping surface with the water program. The caller binds
    /// its texture.
    pub fn emit_water_polys(&mut self, surf: &MSurface, time: f32) -> RefResult<()> {
        let scroll = if surf.kind.is_flowing() {
            -64.0 * ((time * 0.5) - (time * 0.5).trunc())
        } else {
            0.0
        };
        if scroll != self.uniforms.three_d.scroll {
            self.uniforms.three_d.scroll = scroll;
            self.update_ubo_3d()?;
        }

        self.use_program(ProgramKind::Water)?;
        for poly in &surf.polys {
            self.buffer_and_draw_3d(&poly.vertices, PrimitiveMode::TriangleFan, None)?;
        }
        Ok(())
    }
}

// ============================================================
// Sky box
// ============================================================

impl RendererState {
    pub fn draw_sky_box(&mut self) -> RefResult<()> {
        if self.sky.rotate != 0.0 {
            // check for no sky at all
            if !(0..6).any(|i| self.sky.face_touched(i)) {
                return Ok(());
            }
        }

        let origin = self.frame.origin;
        let mut model = Mat4::from_translation(GVec3::from(origin));
        let axis = GVec3::from(self.sky.axis);
        if self.sky.rotate != 0.0 && axis.length_squared() > 0.0 {
            let angle = (self.frame.refdef.time * self.sky.rotate).to_radians();
            model *= Mat4::from_axis_angle(axis.normalize(), angle);
        }

        self.gfx.use_program(ProgramKind::Sky)?;
        self.gfx.uniforms.three_d.trans_model = model;
        self.gfx.update_ubo_3d()?;

        let dist = if self.cvars.r_farsee.is_set() { 4096.0 } else { 2300.0 };
        let fallback = self.gfx.images.fallback();
        for i in 0..6 {
            if self.sky.rotate != 0.0 {
                self.sky.mins[0][i] = -1.0;
                self.sky.mins[1][i] = -1.0;
                self.sky.maxs[0][i] = 1.0;
                self.sky.maxs[1][i] = 1.0;
            }
            if !self.sky.face_touched(i) {
                continue;
            }

            self.gfx.bind(self.sky.images[SKYTEXORDER[i]].unwrap_or(fallback));
            let (smin, tmin) = (self.sky.mins[0][i], self.sky.mins[1][i]);
            let (smax, tmax) = (self.sky.maxs[0][i], self.sky.maxs[1][i]);
            let verts = [
                self.sky.make_sky_vec(smin, tmin, i, dist),
                self.sky.make_sky_vec(smin, tmax, i, dist),
                self.sky.make_sky_vec(smax, tmax, i, dist),
                self.sky.make_sky_vec(smax, tmin, i, dist),
            ];
            self.gfx.buffer_and_draw_3d(&verts, PrimitiveMode::TriangleFan, None)?;
        }

        self.gfx.uniforms.three_d.trans_model = Mat4::IDENTITY;
        self.gfx.update_ubo_3d()
    }

    /// Load the six faces `env/<name><suffix>`, preferring TGA over PCX.
    pub fn set_sky(&mut self, name: &str, rotate: f32, axis: &Vec3) -> RefResult<()> {
        self.sky.name = name.to_string();
        self.sky.rotate = rotate;
        self.sky.axis = *axis;

        let notexture = self.gfx.images.notexture;
        for (i, suf) in SUF.iter().enumerate() {
            let mut image = None;
            for ext in ["tga", "pcx"] {
                let path = format!("env/{}{}.{}", name, suf, ext);
                image = self.gfx.find_image(self.ri.as_mut(), &self.cvars, &path, ImageType::Sky)?;
                if image.is_some() && image != notexture {
                    break;
                }
            }
            self.sky.images[i] = image.or(notexture);
        }
        self.sky.min = 1.0 / 512.0;
        self.sky.max = 511.0 / 512.0;
        log::debug!("sky {} rotate {} axis {:?}", name, rotate, axis);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gx2::Gx2Command;
    use crate::refimport::ImageData;
    use crate::testutil::{quad, renderer};
    use crate::wiiu_model_types::SurfaceKind;
    use approx::assert_relative_eq;

    fn sky_surface(points: [Vec3; 4]) -> MSurface {
        MSurface::new(0, 0, SurfaceKind::Sky, vec![quad(points)])
    }

    // ============================================================
    // Bounds
    // ============================================================

    #[test]
    fn test_clear_leaves_no_face_touched() {
        let sky = SkyState::default();
        assert!((0..6).all(|i| !sky.face_touched(i)));
    }

    #[test]
    fn test_surface_ahead_touches_front_face() {
        let mut sky = SkyState::default();
        // a wall straight down +x
        let surf = sky_surface([
            [100.0, -10.0, -10.0],
            [100.0, 10.0, -10.0],
            [100.0, 10.0, 10.0],
            [100.0, -10.0, 10.0],
        ]);
        sky.add_surface(&surf, &[0.0; 3]);
        assert!(sky.face_touched(0));
        assert!((1..6).all(|i| !sky.face_touched(i)));
        assert_relative_eq!(sky.mins[0][0], -0.1, epsilon = 1e-5);
        assert_relative_eq!(sky.maxs[1][0], 0.1, epsilon = 1e-5);
    }

    #[test]
    fn test_surface_across_corner_is_split() {
        let mut sky = SkyState::default();
        // straddles the x = y clip plane
        let surf = sky_surface([
            [100.0, -50.0, -10.0],
            [100.0, 150.0, -10.0],
            [100.0, 150.0, 10.0],
            [100.0, -50.0, 10.0],
        ]);
        sky.add_surface(&surf, &[0.0; 3]);
        assert!(sky.face_touched(0));
        assert!(sky.face_touched(2));
        assert!(sky.c_sky > 2);
    }

    #[test]
    fn test_sky_vec_clamps_texcoords() {
        let sky = SkyState::default();
        let v = sky.make_sky_vec(-1.0, -1.0, 0, 2300.0);
        assert_eq!(v.pos, [2300.0, 2300.0, -2300.0]);
        assert_relative_eq!(v.tex_coord[0], 1.0 / 512.0);
        assert_relative_eq!(v.tex_coord[1], 1.0 - 1.0 / 512.0);
    }

    // ============================================================
    // Drawing
    // ============================================================

    #[test]
    fn test_set_sky_prefers_tga_then_pcx() {
        let (mut rs, host, _rec) = renderer();
        host.add_image("env/unit1_rt.tga", ImageData::solid(4, 4, [1, 2, 3, 255]));
        host.add_image("env/unit1_bk.pcx", ImageData::solid(4, 4, [1, 2, 3, 255]));
        rs.set_sky("unit1_", 0.0, &[0.0, 0.0, 1.0]).unwrap();
        let name = |i: usize| rs.gfx.images.get(rs.sky.images[i].unwrap()).unwrap().name.clone();
        assert_eq!(name(0), "env/unit1_rt.tga");
        assert_eq!(name(1), "env/unit1_bk.pcx");
        assert_eq!(rs.sky.images[2], rs.gfx.images.notexture);
    }

    #[test]
    fn test_draw_sky_box_only_touched_faces() {
        let (mut rs, _host, rec) = renderer();
        rs.set_sky("none", 0.0, &[0.0; 3]).unwrap();
        let surf = sky_surface([
            [100.0, -10.0, -10.0],
            [100.0, 10.0, -10.0],
            [100.0, 10.0, 10.0],
            [100.0, -10.0, 10.0],
        ]);
        rs.sky.clear();
        rs.sky.add_surface(&surf, &[0.0; 3]);
        rec.clear();
        rs.draw_sky_box().unwrap();
        let draws: Vec<_> = rec.commands().into_iter().filter(|c| c.is_draw()).collect();
        assert_eq!(draws, vec![Gx2Command::Draw { mode: PrimitiveMode::TriangleFan, count: 4 }]);
    }

    #[test]
    fn test_rotating_sky_draws_all_faces_or_nothing() {
        let (mut rs, _host, rec) = renderer();
        rs.set_sky("none", 10.0, &[0.0, 0.0, 1.0]).unwrap();
        rs.sky.clear();
        rec.clear();
        rs.draw_sky_box().unwrap();
        assert_eq!(rec.draw_count(), 0);

        rs.sky.add_surface(
            &sky_surface([[0.0, 0.0, 100.0], [10.0, 0.0, 100.0], [10.0, 10.0, 100.0], [0.0, 10.0, 100.0]]),
            &[0.0; 3],
        );
        rs.draw_sky_box().unwrap();
        assert_eq!(rec.draw_count(), 6);
    }

    #[test]
    fn test_water_scroll_uploads_once() {
        let (mut rs, _host, rec) = renderer();
        let mut surf = MSurface::new(0, 0, SurfaceKind::Warp { flowing: true }, vec![quad([[0.0; 3]; 4])]);
        rec.clear();
        rs.gfx.emit_water_polys(&surf, 1.5).unwrap();
        assert_relative_eq!(rs.gfx.uniforms.three_d.scroll, -64.0 * 0.75);
        rs.gfx.emit_water_polys(&surf, 1.5).unwrap();
        let ubo3d = rec
            .commands()
            .iter()
            .filter(|c| matches!(c, Gx2Command::SetUniformBlock { slot: 1, .. }))
            .count();
        // one block bound to both stages
        assert_eq!(ubo3d, 2);
        assert_eq!(rec.draw_count(), 2);

        surf.kind = SurfaceKind::Warp { flowing: false };
        rs.gfx.emit_water_polys(&surf, 1.5).unwrap();
        assert_eq!(rs.gfx.uniforms.three_d.scroll, 0.0);
    }
}
