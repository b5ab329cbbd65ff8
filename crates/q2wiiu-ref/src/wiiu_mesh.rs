// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_mesh.rs: triangle model drawing

use bytemuck::{Pod, Zeroable};
use q2wiiu_common::q_shared::{
    angle_vectors, dot_product, vector_add, vector_normalize, CPlane, ImageHandle, PrintLevel, RdFlags,
    RefEntity, RenderFlags, Vec3,
};

use crate::error::RefResult;
use crate::gx2::PrimitiveMode;
use crate::wiiu_local::{Gfx, RendererState};
use crate::wiiu_model_types::{AliasFrame, AliasModel, GlCmdKind};
use crate::wiiu_shaders::ProgramKind;

/// Shells are pushed out along the vertex normal by this much.
pub const POWERSUIT_SCALE: f32 = 4.0;

/// One alias vertex as the alias programs fetch it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct AliasVtx {
    pub pos: [f32; 3],
    pub tex_coord: [f32; 2],
    pub color: [f32; 4],
}

/// Flat shell colour, if the entity has any shell flag.
pub fn shell_color(flags: RenderFlags) -> Option<Vec3> {
    if !flags.intersects(RenderFlags::SHELL_MASK) {
        return None;
    }
    let mut color = [0.0; 3];
    if flags.contains(RenderFlags::SHELL_HALF_DAM) {
        color = [0.56, 0.59, 0.45];
    }
    if flags.contains(RenderFlags::SHELL_DOUBLE) {
        color[0] = 0.9;
        color[1] = 0.7;
    }
    if flags.contains(RenderFlags::SHELL_RED) {
        color[0] = 1.0;
    }
    if flags.contains(RenderFlags::SHELL_GREEN) {
        color[1] = 1.0;
    }
    if flags.contains(RenderFlags::SHELL_BLUE) {
        color[2] = 1.0;
    }
    Some(color)
}

/// Direction light falls from, relative to the model's yaw.
pub fn shade_vector(yaw: f32) -> Vec3 {
    let an = yaw.to_radians();
    let mut v = [(-an).cos(), (-an).sin(), 1.0];
    vector_normalize(&mut v);
    v
}

/// Brightness of a vertex with `normal` under `shadevector`, 0.5 to 1.5.
pub fn vertex_shade(normal: &Vec3, shadevector: &Vec3) -> f32 {
    (dot_product(normal, shadevector) + 1.0) * 0.5 + 0.5
}

/// Triangle list indices for the strips and fans of `model`, in the
/// order the vertices are emitted.
pub fn triangle_indices(model: &AliasModel) -> Vec<u16> {
    let mut indices = Vec::new();
    let mut base = 0u16;
    for cmd in &model.glcmds {
        let count = cmd.verts.len() as u16;
        for i in 1..count.saturating_sub(1) {
            let k = base + i;
            match cmd.kind {
                // keep the winding of every other triangle
                GlCmdKind::Strip if i % 2 == 1 => indices.extend_from_slice(&[k - 1, k, k + 1]),
                GlCmdKind::Strip => indices.extend_from_slice(&[k - 1, k + 1, k]),
                GlCmdKind::Fan => indices.extend_from_slice(&[base, k, k + 1]),
            }
        }
        base += count;
    }
    indices
}

/// True if the bounds of both frames, placed like the entity, are
/// completely behind one frustum plane.
pub fn cull_alias_model(frustum: &[CPlane; 4], entity: &RefEntity, frame: &AliasFrame, oldframe: &AliasFrame) -> bool {
    if entity.flags.contains(RenderFlags::WEAPONMODEL) {
        return false;
    }

    let mins: Vec3 = std::array::from_fn(|i| frame.mins[i].min(oldframe.mins[i]));
    let maxs: Vec3 = std::array::from_fn(|i| frame.maxs[i].max(oldframe.maxs[i]));

    let angles = [-entity.angles[0], entity.angles[1], entity.angles[2]];
    let (forward, right, up) = angle_vectors(&angles);

    let mut bbox = [[0.0f32; 3]; 8];
    for (i, corner) in bbox.iter_mut().enumerate() {
        let tmp = [
            if i & 1 != 0 { mins[0] } else { maxs[0] },
            if i & 2 != 0 { mins[1] } else { maxs[1] },
            if i & 4 != 0 { mins[2] } else { maxs[2] },
        ];
        let rotated = [dot_product(&forward, &tmp), -dot_product(&right, &tmp), dot_product(&up, &tmp)];
        *corner = vector_add(&rotated, &entity.origin);
    }

    frustum
        .iter()
        .any(|plane| bbox.iter().all(|p| dot_product(&plane.normal, p) < plane.dist))
}

impl RendererState {
    /// Light an alias entity gets before per-vertex shading.
    pub fn alias_shade_light(&self, entity: &RefEntity) -> Vec3 {
        let mut shadelight = if let Some(color) = shell_color(entity.flags) {
            color
        } else if entity.flags.contains(RenderFlags::FULLBRIGHT) {
            [1.0; 3]
        } else {
            self.light_point(&entity.origin, &entity.origin)
        };

        if entity.flags.contains(RenderFlags::MINLIGHT) && shadelight.iter().all(|&c| c <= 0.1) {
            shadelight = [0.1; 3];
        }

        if entity.flags.contains(RenderFlags::GLOW) {
            // bonus items pulse with time
            let scale = 0.1 * (self.frame.refdef.time * 7.0).sin();
            for c in shadelight.iter_mut() {
                let min = *c * 0.8;
                *c = (*c + scale).max(min);
            }
        }

        if self.frame.refdef.rdflags.contains(RdFlags::IRGOGGLES)
            && entity.flags.contains(RenderFlags::IR_VISIBLE)
        {
            shadelight = [1.0, 0.0, 0.0];
        }
        shadelight
    }

    fn alias_skin(&self, entity: &RefEntity, model: &AliasModel) -> ImageHandle {
        let skin = entity.skin.or_else(|| {
            let n = usize::try_from(entity.skinnum).ok().filter(|&n| n < model.skins.len());
            n.and_then(|n| model.skins[n]).or_else(|| model.skins.first().copied().flatten())
        });
        skin.unwrap_or_else(|| self.gfx.images.fallback())
    }

    fn checked_frame(&mut self, name: &str, frame: i32, model: &AliasModel) -> usize {
        match usize::try_from(frame).ok().filter(|&f| f < model.frames.len()) {
            Some(f) => f,
            None => {
                self.printf(
                    PrintLevel::Developer,
                    &format!("R_DrawAliasModel {}: no such frame {}\n", name, frame),
                );
                0
            }
        }
    }

    /// Lerped and shaded vertices of every glcmd vertex.
    fn build_alias_vertices(
        &self,
        entity: &RefEntity,
        model: &AliasModel,
        frame: usize,
        oldframe: usize,
        shadelight: &Vec3,
    ) -> Vec<AliasVtx> {
        let cur = &model.frames[frame];
        let old = &model.frames[oldframe];
        let backlerp = entity.backlerp;
        let frontlerp = 1.0 - backlerp;

        let shell = entity.flags.intersects(RenderFlags::SHELL_MASK);
        let flat = shell || entity.flags.contains(RenderFlags::FULLBRIGHT);
        let alpha = if entity.flags.contains(RenderFlags::TRANSLUCENT) { entity.alpha } else { 1.0 };
        let shadevector = shade_vector(entity.angles[1]);

        let mut verts = Vec::new();
        for cmd in &model.glcmds {
            for cv in &cmd.verts {
                let i = cv.index as usize;
                let (Some(v), Some(ov)) = (cur.verts.get(i), old.verts.get(i)) else {
                    verts.push(AliasVtx::default());
                    continue;
                };

                let pos: Vec3 = std::array::from_fn(|k| {
                    let p = ov.pos[k] * backlerp + v.pos[k] * frontlerp;
                    if shell {
                        p + v.normal[k] * POWERSUIT_SCALE
                    } else {
                        p
                    }
                });

                let l = if flat { 1.0 } else { vertex_shade(&v.normal, &shadevector) };
                verts.push(AliasVtx {
                    pos,
                    tex_coord: [cv.s, cv.t],
                    color: [l * shadelight[0], l * shadelight[1], l * shadelight[2], alpha],
                });
            }
        }
        verts
    }

    fn submit_alias(
        &mut self,
        entity: &RefEntity,
        model: &AliasModel,
        flat: bool,
        verts: &[AliasVtx],
        indices: &[u16],
    ) -> RefResult<()> {
        let angles = [-entity.angles[0], entity.angles[1], entity.angles[2]];
        self.gfx.rotate_for_entity(&entity.origin, &angles)?;
        if flat {
            self.gfx.use_program(ProgramKind::AliasColor)?;
        } else {
            self.gfx.use_program(ProgramKind::Alias)?;
            let skin = self.alias_skin(entity, model);
            self.gfx.bind(skin);
        }
        self.gfx.buffer_and_draw_alias(verts, indices)
    }

    pub fn draw_alias_model(&mut self, entity: &RefEntity, name: &str, model: &AliasModel) -> RefResult<()> {
        if model.frames.is_empty() {
            return Ok(());
        }

        let frame = self.checked_frame(name, entity.frame, model);
        let oldframe = self.checked_frame(name, entity.oldframe, model);
        if cull_alias_model(&self.frame.frustum, entity, &model.frames[frame], &model.frames[oldframe]) {
            return Ok(());
        }

        let shadelight = self.alias_shade_light(entity);
        let verts = self.build_alias_vertices(entity, model, frame, oldframe, &shadelight);
        let indices = triangle_indices(model);
        if indices.is_empty() {
            return Ok(());
        }

        let depthhack = entity.flags.contains(RenderFlags::DEPTHHACK);
        let translucent = entity.flags.contains(RenderFlags::TRANSLUCENT);
        let flat = entity.flags.intersects(RenderFlags::SHELL_MASK | RenderFlags::FULLBRIGHT);

        // hack the depth range to prevent view model from poking into walls
        let (near, far) = self.gfx.state.depth_range();
        if depthhack {
            self.gfx.set_depth_range(near, near + 0.3 * (far - near));
        }
        if translucent {
            self.gfx.enable_blend(true);
        }

        let old = self.gfx.uniforms.three_d.trans_model;
        let result = self.submit_alias(entity, model, flat, &verts, &indices);
        self.frame.c_alias_polys += (indices.len() / 3) as u32;

        self.gfx.uniforms.three_d.trans_model = old;
        self.gfx.update_ubo_3d()?;
        if translucent {
            self.gfx.enable_blend(false);
        }
        if depthhack {
            self.gfx.set_depth_range(near, far);
        }
        result
    }
}

impl Gfx {
    pub fn buffer_and_draw_alias(&mut self, verts: &[AliasVtx], indices: &[u16]) -> RefResult<()> {
        let vslice = self.arenas.attribute.write_pod(verts)?;
        let islice = self.arenas.index.write_u16s(indices)?;
        self.gpu.set_attrib_buffer(
            0,
            self.arenas.attribute.bytes(vslice),
            std::mem::size_of::<AliasVtx>() as u32,
        );
        self.gpu
            .draw_indexed(PrimitiveMode::Triangles, self.arenas.index.bytes(islice), indices.len() as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gx2::Gx2Command;
    use crate::testutil::renderer;
    use crate::wiiu_model_types::{AliasVert, GlCmd, GlCmdVert};
    use crate::wiiu_vis::set_frustum;
    use approx::assert_relative_eq;
    use q2wiiu_common::q_shared::RefDef;

    /// A single triangle strip of four vertices (two triangles).
    fn quad_model() -> AliasModel {
        let verts = vec![
            AliasVert { pos: [0.0, -8.0, -8.0], normal: [1.0, 0.0, 0.0] },
            AliasVert { pos: [0.0, 8.0, -8.0], normal: [1.0, 0.0, 0.0] },
            AliasVert { pos: [0.0, -8.0, 8.0], normal: [1.0, 0.0, 0.0] },
            AliasVert { pos: [0.0, 8.0, 8.0], normal: [1.0, 0.0, 0.0] },
        ];
        let frame = |dx: f32| AliasFrame {
            name: "stand".to_string(),
            mins: [dx, -8.0, -8.0],
            maxs: [dx, 8.0, 8.0],
            verts: verts.iter().map(|v| AliasVert { pos: [v.pos[0] + dx, v.pos[1], v.pos[2]], ..*v }).collect(),
        };
        let cmd = |i: u32, s: f32, t: f32| GlCmdVert { index: i, s, t };
        AliasModel {
            frames: vec![frame(0.0), frame(10.0)],
            glcmds: vec![GlCmd {
                kind: GlCmdKind::Strip,
                verts: vec![cmd(0, 0.0, 1.0), cmd(1, 1.0, 1.0), cmd(2, 0.0, 0.0), cmd(3, 1.0, 0.0)],
            }],
            skin_names: Vec::new(),
            skins: Vec::new(),
        }
    }

    /// Look down +x from the origin.
    fn look(rs: &mut RendererState) {
        rs.frame.refdef = RefDef {
            width: 1280,
            height: 720,
            fov_x: 90.0,
            fov_y: 73.74,
            time: 1.0,
            rdflags: RdFlags::NOWORLDMODEL,
            ..Default::default()
        };
        rs.setup_frame();
        set_frustum(&mut rs.frame);
    }

    fn entity_at(x: f32) -> RefEntity {
        RefEntity { origin: [x, 0.0, 0.0], alpha: 1.0, ..Default::default() }
    }

    fn drawn_vertices(rec: &crate::gx2::CommandRecorder) -> Vec<AliasVtx> {
        rec.commands()
            .iter()
            .find_map(|c| match c {
                Gx2Command::SetAttribBuffer { data, stride: 36, .. } => Some(
                    data.chunks_exact(36)
                        .map(bytemuck::pod_read_unaligned::<AliasVtx>)
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default()
    }

    // ============================================================
    // Helpers
    // ============================================================

    #[test]
    fn test_alias_vertex_size() {
        assert_eq!(std::mem::size_of::<AliasVtx>(), 36);
    }

    #[test]
    fn test_shell_colors() {
        assert_eq!(shell_color(RenderFlags::empty()), None);
        assert_eq!(shell_color(RenderFlags::SHELL_RED), Some([1.0, 0.0, 0.0]));
        assert_eq!(
            shell_color(RenderFlags::SHELL_DOUBLE | RenderFlags::SHELL_BLUE),
            Some([0.9, 0.7, 1.0])
        );
        assert_eq!(shell_color(RenderFlags::SHELL_HALF_DAM), Some([0.56, 0.59, 0.45]));
    }

    #[test]
    fn test_vertex_shade_range() {
        let sv = shade_vector(0.0);
        assert_relative_eq!(sv[0], std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
        assert_relative_eq!(sv[2], std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
        assert_relative_eq!(vertex_shade(&sv, &sv), 1.5, epsilon = 1e-6);
        let away = [-sv[0], -sv[1], -sv[2]];
        assert_relative_eq!(vertex_shade(&away, &sv), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_strip_and_fan_indices() {
        let mut model = quad_model();
        assert_eq!(triangle_indices(&model), vec![0, 1, 2, 1, 3, 2]);

        model.glcmds.push(GlCmd {
            kind: GlCmdKind::Fan,
            verts: (0..4).map(|i| GlCmdVert { index: i, s: 0.0, t: 0.0 }).collect(),
        });
        let idx = triangle_indices(&model);
        assert_eq!(&idx[6..], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn test_degenerate_command_has_no_triangles() {
        let mut model = quad_model();
        model.glcmds[0].verts.truncate(2);
        assert!(triangle_indices(&model).is_empty());
    }

    // ============================================================
    // Culling
    // ============================================================

    #[test]
    fn test_cull_behind_view() {
        let (mut rs, _host, _rec) = renderer();
        look(&mut rs);
        let model = quad_model();
        let f = &model.frames[0];
        assert!(!cull_alias_model(&rs.frame.frustum, &entity_at(100.0), f, f));
        assert!(cull_alias_model(&rs.frame.frustum, &entity_at(-100.0), f, f));

        let mut weapon = entity_at(-100.0);
        weapon.flags = RenderFlags::WEAPONMODEL;
        assert!(!cull_alias_model(&rs.frame.frustum, &weapon, f, f));
    }

    // ============================================================
    // Drawing
    // ============================================================

    #[test]
    fn test_draw_alias_model_one_indexed_draw() {
        let (mut rs, _host, rec) = renderer();
        look(&mut rs);
        let model = quad_model();
        let mut ent = entity_at(100.0);
        ent.flags = RenderFlags::FULLBRIGHT;

        rec.clear();
        rs.draw_alias_model(&ent, "models/test.md2", &model).unwrap();

        let draws: Vec<_> = rec.commands().into_iter().filter(|c| c.is_draw()).collect();
        assert_eq!(draws.len(), 1);
        assert!(matches!(draws[0], Gx2Command::DrawIndexed { mode: PrimitiveMode::Triangles, count: 6, .. }));
        assert_eq!(rs.frame.c_alias_polys, 2);
        assert_eq!(rs.gfx.state.current_program, Some(ProgramKind::AliasColor));
        assert_eq!(rs.gfx.uniforms.three_d.trans_model, glam::Mat4::IDENTITY);
    }

    #[test]
    fn test_lerp_and_shell_offset() {
        let (mut rs, _host, rec) = renderer();
        look(&mut rs);
        let model = quad_model();
        let mut ent = entity_at(100.0);
        ent.frame = 1;
        ent.oldframe = 0;
        ent.backlerp = 0.25;

        rec.clear();
        rs.draw_alias_model(&ent, "m", &model).unwrap();
        let verts = drawn_vertices(&rec);
        assert_eq!(verts.len(), 4);
        assert_relative_eq!(verts[0].pos[0], 7.5);
        assert_eq!(verts[1].tex_coord, [1.0, 1.0]);
        assert_eq!(rs.gfx.state.current_program, Some(ProgramKind::Alias));

        ent.flags = RenderFlags::SHELL_GREEN;
        rec.clear();
        rs.draw_alias_model(&ent, "m", &model).unwrap();
        let verts = drawn_vertices(&rec);
        assert_relative_eq!(verts[0].pos[0], 7.5 + POWERSUIT_SCALE);
        assert_eq!(&verts[0].color[..3], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_bad_frame_falls_back_to_zero() {
        let (mut rs, host, _rec) = renderer();
        look(&mut rs);
        let model = quad_model();
        let mut ent = entity_at(100.0);
        ent.frame = 9;

        rs.draw_alias_model(&ent, "models/bad.md2", &model).unwrap();
        assert!(host.printed().iter().any(|l| l.contains("no such frame 9")));
        assert_eq!(rs.frame.c_alias_polys, 2);
    }

    #[test]
    fn test_depthhack_restores_range() {
        let (mut rs, _host, rec) = renderer();
        look(&mut rs);
        let model = quad_model();
        let mut ent = entity_at(100.0);
        ent.flags = RenderFlags::DEPTHHACK | RenderFlags::TRANSLUCENT;
        ent.alpha = 0.5;

        rec.clear();
        rs.draw_alias_model(&ent, "m", &model).unwrap();
        let viewports: Vec<(f32, f32)> = rec
            .commands()
            .iter()
            .filter_map(|c| match c {
                Gx2Command::Viewport { near, far, .. } => Some((*near, *far)),
                _ => None,
            })
            .collect();
        assert_eq!(viewports.len(), 2);
        assert_relative_eq!(viewports[0].1, 0.3);
        assert_relative_eq!(viewports[1].1, 1.0);
        assert!(!rs.gfx.state.blend());
        assert_eq!(drawn_vertices(&rec)[0].color[3], 0.5);
    }

    #[test]
    fn test_minlight_and_ir_goggles() {
        let (mut rs, _host, _rec) = renderer();
        look(&mut rs);
        let mut ent = entity_at(100.0);
        ent.flags = RenderFlags::SHELL_RED | RenderFlags::SHELL_GREEN | RenderFlags::SHELL_BLUE;
        assert_eq!(rs.alias_shade_light(&ent), [1.0; 3]);

        ent.flags = RenderFlags::SHELL_HALF_DAM | RenderFlags::MINLIGHT;
        assert_eq!(rs.alias_shade_light(&ent), [0.56, 0.59, 0.45]);

        rs.frame.refdef.rdflags |= RdFlags::IRGOGGLES;
        ent.flags = RenderFlags::IR_VISIBLE;
        assert_eq!(rs.alias_shade_light(&ent), [1.0, 0.0, 0.0]);
    }
}
