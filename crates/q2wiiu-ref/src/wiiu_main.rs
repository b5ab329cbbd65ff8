// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_main.rs: frame setup, view rendering and the entity pass

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use q2wiiu_common::q_shared::{
    angle_vectors, perpendicular_vector, rotate_point_around_vector, vector_add, vector_length, vector_ma,
    vector_normalize, vector_scale, vector_subtract, PrintLevel, RdFlags, RefDef, RefEntity, RenderFlags,
    Vec3, CONTENTS_SOLID,
};

use crate::error::{RefError, RefResult};
use crate::gx2::{PrimitiveMode, ScanTarget};
use crate::refimport::RefImport;
use crate::wiiu_local::{CvarRef, FramePhase, Gfx, RendererState, REF_VERSION};
use crate::wiiu_model_types::{ModelKind, SpriteModel, Vertex3D};
use crate::wiiu_shaders::ProgramKind;
use crate::wiiu_uniforms::Uniforms;
use crate::wiiu_vis::set_frustum;

pub const NUM_BEAM_SEGS: usize = 6;

// ============================================================================
// Matrices
// ============================================================================

/// Rotation around Z by `around_z`, then Y, then X (degrees).
pub fn rot_around_axis_zyx(around_z: f32, around_y: f32, around_x: f32) -> Mat4 {
    Mat4::from_rotation_z(around_z.to_radians())
        * Mat4::from_rotation_y(around_y.to_radians())
        * Mat4::from_rotation_x(around_x.to_radians())
}

/// Rotation around X by `around_x`, then Y, then Z (degrees).
pub fn rot_around_axis_xyz(around_x: f32, around_y: f32, around_z: f32) -> Mat4 {
    Mat4::from_rotation_x(around_x.to_radians())
        * Mat4::from_rotation_y(around_y.to_radians())
        * Mat4::from_rotation_z(around_z.to_radians())
}

/// gluPerspective with `fovy` in degrees.
pub fn perspective(fovy: f32, aspect: f32, z_near: f32, z_far: f32) -> Mat4 {
    let ymax = z_near * (fovy * std::f32::consts::PI / 360.0).tan();
    let ymin = -ymax;
    let xmin = ymin * aspect;
    let xmax = ymax * aspect;

    let a = (xmax + xmin) / (xmax - xmin);
    let b = (ymax + ymin) / (ymax - ymin);
    let c = -(z_far + z_near) / (z_far - z_near);
    let d = -(2.0 * z_far * z_near) / (z_far - z_near);

    Mat4::from_cols(
        Vec4::new(2.0 * z_near / (xmax - xmin), 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * z_near / (ymax - ymin), 0.0, 0.0),
        Vec4::new(a, b, c, -1.0),
        Vec4::new(0.0, 0.0, d, 0.0),
    )
}

/// World to eye space. Quake is Z-up and looks down +X; the eye looks
/// down -Z with Y up.
pub fn view_matrix(vieworg: &Vec3, viewangles: &Vec3) -> Mat4 {
    let axes = Mat4::from_cols_array_2d(&[
        [0.0, 0.0, -1.0, 0.0],
        [-1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);
    axes * rot_around_axis_xyz(-viewangles[2], -viewangles[0], -viewangles[1])
        * Mat4::from_translation(glam::Vec3::new(-vieworg[0], -vieworg[1], -vieworg[2]))
}

/// Consume the modified flag of every cvar in `cvars`.
fn take_modified(ri: &mut dyn RefImport, cvars: &[&CvarRef]) -> bool {
    cvars.iter().fold(false, |any, c| c.take_modified(ri) | any)
}

// ============================================================================
// Vertex submission
// ============================================================================

/// One particle as the particle program fetches it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ParticleVtx {
    pub pos: [f32; 3],
    pub size: f32,
    pub dist: f32,
    pub color: [f32; 4],
}

impl Gfx {
    /// Copy `verts` into the attribute arena and draw them. With
    /// `light_flags`, every vertex's dynamic light mask is overwritten.
    pub fn buffer_and_draw_3d(
        &mut self,
        verts: &[Vertex3D],
        mode: PrimitiveMode,
        light_flags: Option<u32>,
    ) -> RefResult<()> {
        let slice = self.arenas.attribute.write_pod(verts)?;
        let stride = std::mem::size_of::<Vertex3D>();
        if let Some(flags) = light_flags {
            let bytes = self.arenas.attribute.bytes_mut(slice);
            for v in bytes.chunks_exact_mut(stride) {
                v[40..44].copy_from_slice(&flags.to_ne_bytes());
            }
        }
        self.gpu.set_attrib_buffer(0, self.arenas.attribute.bytes(slice), stride as u32);
        self.gpu.draw(mode, verts.len() as u32);
        Ok(())
    }

    /// Multiply the model matrix by the entity's placement.
    pub fn rotate_for_entity(&mut self, origin: &Vec3, angles: &Vec3) -> RefResult<()> {
        let mut m = rot_around_axis_zyx(angles[1], -angles[0], -angles[2]);
        m.w_axis = Vec4::new(origin[0], origin[1], origin[2], 1.0);
        self.uniforms.three_d.trans_model *= m;
        self.update_ubo_3d()
    }
}

// ============================================================================
// Init / shutdown
// ============================================================================

impl RendererState {
    pub fn init(&mut self) -> bool {
        self.printf(PrintLevel::All, &format!("Refresh: {}\n", REF_VERSION));
        self.palette = crate::wiiu_image::Palette::load(self.ri.as_mut());

        match self.init_local() {
            Ok(()) => {
                log::info!("renderer up at {}x{}", self.vid.width, self.vid.height);
                true
            }
            Err(e @ (RefError::ShaderLoad { .. } | RefError::ShaderMissing(_))) => {
                log::error!("{}", e);
                false
            }
            Err(e) => {
                self.ri.sys_error(e.level(), &e.to_string());
                false
            }
        }
    }

    fn init_local(&mut self) -> RefResult<()> {
        let (width, height) = self.get_drawable_size();
        self.vid.width = width;
        self.vid.height = height;
        self.ri.vid_menu_init();

        self.cvars.refresh(self.ri.as_ref());
        self.gfx.set_default_state();

        let c = &self.cvars;
        self.gfx.uniforms = Uniforms::new(
            c.vid_gamma.value,
            c.gl3_intensity.value,
            c.gl3_intensity_2D.value,
            c.gl3_overbrightbits.value,
            c.gl3_particle_fade_factor.value,
        );
        let square = c.gl3_particle_square.is_set();
        if let Err(e) = self.gfx.init_shaders(self.ri.as_mut(), square) {
            self.printf(PrintLevel::All, "Loading shaders failed.\n");
            return Err(e);
        }
        self.printf(PrintLevel::All, "Loading shaders succeeded.\n");

        self.gfx.images.registration_sequence = 1;
        self.gfx.init_builtin_textures(&self.cvars)?;
        self.draw_init_local()?;
        self.gfx.texture_mode(self.ri.as_mut(), &self.cvars);

        // everything above already reflects the current values
        let ri = self.ri.as_mut();
        let c = &self.cvars;
        take_modified(
            ri,
            &[
                &c.vid_gamma,
                &c.gl3_intensity,
                &c.gl3_intensity_2D,
                &c.gl3_overbrightbits,
                &c.gl3_particle_fade_factor,
                &c.gl3_particle_square,
                &c.gl3_colorlight,
                &c.gl_texturemode,
                &c.r_anisotropic,
                &c.gl_nolerp_list,
                &c.r_lerp_list,
                &c.r_2D_unfiltered,
                &c.r_3D_unfiltered,
                &c.r_videos_unfiltered,
                &c.r_lightmaps_unfiltered,
                &c.r_vsync,
                &c.r_msaa_samples,
            ],
        );
        self.set_vsync();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.models.known.clear();
        self.models.world = None;
        self.models.world_name.clear();
        self.chains.clear();

        if let Some((texture, _, _)) = self.gfx.raw_texture.take() {
            self.gfx.gpu.destroy_texture(texture);
        }
        self.gfx.shutdown_images();
        self.gfx.shutdown_shaders();
        self.frame.phase = FramePhase::Idle;
        log::info!("renderer shut down");
    }

    // ============================================================================
    // Frame setup
    // ============================================================================

    pub fn setup_frame(&mut self) {
        let frame = &mut self.frame;
        frame.framecount += 1;

        // build the transformation matrix for the given view angles
        frame.origin = frame.refdef.vieworg;
        let (forward, right, up) = angle_vectors(&frame.refdef.viewangles);
        frame.vpn = forward;
        frame.vright = right;
        frame.vup = up;

        // current viewcluster
        if frame.refdef.rdflags.contains(RdFlags::NOWORLDMODEL) {
            return;
        }
        let Some(world) = self.models.world.as_ref() else {
            return;
        };

        frame.oldviewcluster = frame.viewcluster;
        frame.oldviewcluster2 = frame.viewcluster2;
        let Some(leaf) = world.point_in_leaf(&frame.origin).map(|l| &world.leafs[l as usize]) else {
            return;
        };
        frame.viewcluster = leaf.cluster;
        frame.viewcluster2 = leaf.cluster;

        // check above and below so crossing solid water doesn't draw wrong
        let mut probe = frame.origin;
        probe[2] += if leaf.contents == 0 { -16.0 } else { 16.0 };
        if let Some(leaf2) = world.point_in_leaf(&probe).map(|l| &world.leafs[l as usize]) {
            if leaf2.contents & CONTENTS_SOLID == 0 && leaf2.cluster != frame.viewcluster2 {
                frame.viewcluster2 = leaf2.cluster;
            }
        }
    }

    /// Grey out the view rect of a view without a world.
    fn clear_noworld_view(&mut self) {
        let r = &self.frame.refdef;
        if !r.rdflags.contains(RdFlags::NOWORLDMODEL) {
            return;
        }
        let y = (self.vid.height - r.height - r.y).max(0);
        self.gfx.gpu.set_scissor(r.x.max(0) as u32, y as u32, r.width.max(0) as u32, r.height.max(0) as u32);
        self.gfx.gpu.clear(Some([0.3, 0.3, 0.3, 1.0]), Some(1.0));
        self.gfx.gpu.set_scissor(0, 0, self.vid.width.max(0) as u32, self.vid.height.max(0) as u32);
    }

    pub fn setup_gl(&mut self) -> RefResult<()> {
        let r = &self.frame.refdef;
        let x = r.x;
        let y2 = self.vid.height - (r.y + r.height);
        let (w, h) = (r.width, r.height);
        self.gfx.set_viewport(x, y2, w, h);

        let screenaspect = w as f32 / h.max(1) as f32;
        let far = if self.cvars.r_farsee.is_set() { 8192.0 } else { 4096.0 };
        self.frame.proj = perspective(r.fov_y, screenaspect, 4.0, far);
        self.frame.view = view_matrix(&r.vieworg, &r.viewangles);

        let time = r.time;
        let u = &mut self.gfx.uniforms.three_d;
        u.trans_proj_view = self.frame.proj * self.frame.view;
        u.trans_model = Mat4::IDENTITY;
        u.time = time;
        self.gfx.update_ubo_3d()?;

        // set drawing parms
        self.gfx.cull_front();
        self.gfx.enable_cull_face(self.cvars.r_cull.is_set());
        self.gfx.enable_depth_test(true);
        Ok(())
    }

    /// Switch to screen-space drawing for the HUD and menus.
    pub fn set_gl_2d(&mut self) -> RefResult<()> {
        let (w, h) = (self.vid.width, self.vid.height);
        self.gfx.set_viewport(0, 0, w, h);
        self.gfx.uniforms.two_d.trans_mat4 =
            Mat4::orthographic_rh_gl(0.0, w as f32, h as f32, 0.0, -99999.0, 99999.0);
        self.gfx.update_ubo_2d()?;
        self.gfx.update_ubo_common()?;

        self.gfx.enable_depth_test(false);
        self.gfx.enable_cull_face(false);
        self.gfx.enable_blend(false);
        self.frame.phase = FramePhase::Overlay;
        Ok(())
    }

    pub fn clear(&mut self) {
        if self.cvars.r_clear.is_set() {
            self.gfx.gpu.clear(Some([1.0, 0.0, 0.5, 1.0]), Some(1.0));
        } else {
            self.gfx.gpu.clear(None, Some(1.0));
        }
        self.gfx.gpu.begin_render(ScanTarget::Tv);
        self.gfx.set_depth_range(0.0, 1.0);

        if self.cvars.gl_zfix.is_set() {
            self.gfx.polygon_offset(0.05, 1.0);
        }
    }

    pub fn begin_frame(&mut self) -> RefResult<()> {
        self.gfx.arenas.begin_frame();
        self.gfx.gpu.begin_render(ScanTarget::Tv);
        self.gfx.set_default_state();
        self.frame.c_brush_polys = 0;
        self.frame.c_alias_polys = 0;
        self.gfx.lightmaps_bound.clear();
        self.cvars.refresh(self.ri.as_ref());
        self.gfx.images.nobind = self.cvars.gl_nobind.is_set();

        let ri = self.ri.as_mut();
        let c = &self.cvars;
        if take_modified(ri, &[&c.vid_gamma, &c.gl3_intensity, &c.gl3_intensity_2D]) {
            let common = &mut self.gfx.uniforms.common;
            common.gamma = 1.0 / c.vid_gamma.value;
            common.intensity = c.gl3_intensity.value;
            common.intensity_2d = c.gl3_intensity_2D.value;
            self.gfx.update_ubo_common()?;
        }

        if c.gl3_overbrightbits.take_modified(ri) {
            let mut obb = c.gl3_overbrightbits.value;
            if obb < 0.0 {
                ri.cvar_set("gl3_overbrightbits", "0");
                c.gl3_overbrightbits.take_modified(ri);
                obb = 0.0;
            }
            self.gfx.uniforms.three_d.overbrightbits = if obb <= 0.0 { 1.0 } else { obb };
            self.gfx.update_ubo_3d()?;
        }

        if c.gl3_particle_fade_factor.take_modified(ri) {
            self.gfx.uniforms.three_d.particle_fade_factor = c.gl3_particle_fade_factor.value;
            self.gfx.update_ubo_3d()?;
        }

        if take_modified(ri, &[&c.gl3_particle_square, &c.gl3_colorlight]) {
            self.gfx.recreate_shaders(ri, c.gl3_particle_square.is_set())?;
        }

        // go into 2D mode
        self.set_gl_2d()?;

        let ri = self.ri.as_mut();
        let c = &self.cvars;
        if take_modified(
            ri,
            &[
                &c.gl_texturemode,
                &c.r_anisotropic,
                &c.gl_nolerp_list,
                &c.r_lerp_list,
                &c.r_2D_unfiltered,
                &c.r_3D_unfiltered,
                &c.r_videos_unfiltered,
                &c.r_lightmaps_unfiltered,
            ],
        ) {
            self.gfx.texture_mode(ri, c);
        }

        if c.r_vsync.take_modified(ri) {
            self.set_vsync();
        }

        let ri = self.ri.as_mut();
        if self.cvars.r_msaa_samples.take_modified(ri) {
            // no multisampled scan buffers; the value is only remembered
            log::info!("r_msaa_samples {} ignored", self.cvars.r_msaa_samples.value);
        }

        self.clear();
        self.frame.phase = FramePhase::Begun;
        Ok(())
    }

    // ============================================================================
    // The 3D view
    // ============================================================================

    /// Render the 3D scene described by `refdef`.
    pub fn render_view(&mut self, refdef: &RefDef) -> RefResult<()> {
        if self.cvars.r_norefresh.is_set() {
            return Ok(());
        }
        self.frame.refdef = refdef.clone();

        if self.models.world.is_none() && !refdef.rdflags.contains(RdFlags::NOWORLDMODEL) {
            return Err(RefError::NoWorldModel);
        }

        if self.cvars.r_speeds.is_set() {
            self.frame.c_brush_polys = 0;
            self.frame.c_alias_polys = 0;
            self.gfx.lightmaps_bound.clear();
        }

        self.push_dlights()?;
        self.setup_frame();
        set_frustum(&mut self.frame);
        self.clear_noworld_view();
        self.setup_gl()?;
        // done here so we know if we're in water
        self.mark_leaves();

        self.frame.phase = FramePhase::World;
        self.draw_world()?;
        self.frame.phase = FramePhase::Entities;
        self.draw_entities()?;
        self.frame.phase = FramePhase::Alpha;
        self.draw_alpha_surfaces()?;
        self.frame.phase = FramePhase::Particles;
        self.draw_particles()?;

        if self.cvars.r_speeds.is_set() {
            let msg = format!(
                "{:4} wpoly {:4} epoly {} tex {} lmaps\n",
                self.frame.c_brush_polys,
                self.frame.c_alias_polys,
                self.chains.c_visible_textures,
                self.gfx.lightmaps_bound.len(),
            );
            self.printf(PrintLevel::All, &msg);
        }
        Ok(())
    }

    /// Tell the server how bright the view is.
    pub fn set_light_level(&mut self) {
        if self.frame.refdef.rdflags.contains(RdFlags::NOWORLDMODEL) {
            return;
        }
        let org = self.frame.refdef.vieworg;
        let shadelight = self.light_point(&org, &org);

        // pick the greatest component, which should be the same as the
        // mono value returned by software
        let level = shadelight.iter().copied().fold(0.0f32, f32::max);
        self.ri.cvar_set_value("r_lightlevel", 150.0 * level);
    }

    pub fn render_frame(&mut self, refdef: &RefDef) -> RefResult<()> {
        self.render_view(refdef)?;
        self.set_light_level();
        self.set_gl_2d()?;

        if refdef.blend[3] != 0.0 {
            let x = (self.vid.width - refdef.width) / 2;
            let y = (self.vid.height - refdef.height) / 2;
            self.draw_flash(refdef.blend, x, y, refdef.width, refdef.height)?;
        }
        Ok(())
    }

    // ============================================================================
    // Entities
    // ============================================================================

    pub fn draw_entities(&mut self) -> RefResult<()> {
        if !self.cvars.r_drawentities.is_set() {
            return Ok(());
        }
        let entities = std::mem::take(&mut self.frame.refdef.entities);
        let result = self.draw_entity_passes(&entities);
        self.frame.refdef.entities = entities;
        result
    }

    fn draw_entity_passes(&mut self, entities: &[RefEntity]) -> RefResult<()> {
        let translucent = |e: &&RefEntity| e.flags.contains(RenderFlags::TRANSLUCENT);

        // draw non-transparent first
        for e in entities.iter().filter(|e| !translucent(e)) {
            self.draw_entity(e)?;
        }

        // draw transparent entities; we could sort these if it ever
        // becomes a problem
        self.gfx.enable_depth_write(false);
        let result = entities.iter().filter(translucent).try_for_each(|e| self.draw_entity(e));
        self.gfx.enable_depth_write(true);
        result
    }

    fn draw_entity(&mut self, e: &RefEntity) -> RefResult<()> {
        if e.flags.contains(RenderFlags::BEAM) {
            return self.draw_beam(e);
        }

        let slot = e.model.map(|h| h.0 as usize);
        let Some(model) = slot.and_then(|i| self.models.known.get_mut(i)).and_then(Option::take) else {
            return self.draw_null_model(e);
        };

        let result = match &model.kind {
            ModelKind::Alias(alias) => self.draw_alias_model(e, &model.name, alias),
            ModelKind::Brush(inline) => self.draw_brush_model(e, inline),
            ModelKind::Sprite(sprite) => self.draw_sprite_model(e, sprite),
        };
        if let Some(i) = slot {
            self.models.known[i] = Some(model);
        }
        result
    }

    pub fn draw_beam(&mut self, e: &RefEntity) -> RefResult<()> {
        let origin = e.origin;
        let direction = vector_subtract(&e.oldorigin, &origin);
        let mut normalized_direction = direction;
        if vector_normalize(&mut normalized_direction) == 0.0 {
            return Ok(());
        }

        let perpvec = vector_scale(&perpendicular_vector(&normalized_direction), e.frame as f32 / 2.0);

        let mut start_points = [[0.0; 3]; NUM_BEAM_SEGS];
        let mut end_points = [[0.0; 3]; NUM_BEAM_SEGS];
        for (i, (start, end)) in start_points.iter_mut().zip(end_points.iter_mut()).enumerate() {
            let p = rotate_point_around_vector(
                &normalized_direction,
                &perpvec,
                (360.0 / NUM_BEAM_SEGS as f32) * i as f32,
            );
            *start = vector_add(&p, &origin);
            *end = vector_add(start, &direction);
        }

        let mut verts = [Vertex3D::default(); NUM_BEAM_SEGS * 4];
        for (i, quad) in verts.chunks_exact_mut(4).enumerate() {
            let next = (i + 1) % NUM_BEAM_SEGS;
            quad[0].pos = start_points[i];
            quad[1].pos = end_points[i];
            quad[2].pos = start_points[next];
            quad[3].pos = end_points[next];
        }

        self.gfx.enable_blend(true);
        self.gfx.enable_depth_write(false);

        let result = self.gfx.use_program(ProgramKind::Color).and_then(|()| {
            let mut color = self.palette.color((e.skinnum & 0xff) as u8);
            color[3] = e.alpha;
            self.gfx.uniforms.common.color = color;
            self.gfx.update_ubo_common()?;
            self.gfx.buffer_and_draw_3d(&verts, PrimitiveMode::TriangleStrip, None)
        });

        self.gfx.enable_blend(false);
        self.gfx.enable_depth_write(true);
        result
    }

    /// Marker for an entity whose model is missing.
    pub fn draw_null_model(&mut self, e: &RefEntity) -> RefResult<()> {
        let shadelight = if e.flags.contains(RenderFlags::FULLBRIGHT) {
            [1.0; 3]
        } else {
            self.light_point(&e.origin, &e.origin)
        };

        let orig_model = self.gfx.uniforms.three_d.trans_model;
        self.gfx.rotate_for_entity(&e.origin, &e.angles)?;

        self.gfx.uniforms.common.color = [shadelight[0], shadelight[1], shadelight[2], 1.0];
        self.gfx.update_ubo_common()?;
        self.gfx.use_program(ProgramKind::Color)?;

        let mut below = [Vertex3D::default(); 6];
        below[0].pos = [0.0, 0.0, -16.0];
        for (i, v) in below.iter_mut().skip(1).enumerate() {
            let a = i as f32 * std::f32::consts::FRAC_PI_2;
            v.pos = [16.0 * a.cos(), 16.0 * a.sin(), 0.0];
        }

        let mut above = [Vertex3D::default(); 6];
        above[0].pos = [0.0, 0.0, 16.0];
        for (a, b) in above[1..].iter_mut().zip(below[1..].iter().rev()) {
            a.pos = b.pos;
        }

        let result = self
            .gfx
            .buffer_and_draw_3d(&below, PrimitiveMode::TriangleFan, None)
            .and_then(|()| self.gfx.buffer_and_draw_3d(&above, PrimitiveMode::TriangleFan, None));

        self.gfx.uniforms.three_d.trans_model = orig_model;
        self.gfx.update_ubo_3d()?;
        result
    }

    pub fn draw_sprite_model(&mut self, e: &RefEntity, sprite: &SpriteModel) -> RefResult<()> {
        if sprite.frames.is_empty() {
            return Ok(());
        }
        let frame = &sprite.frames[e.frame.rem_euclid(sprite.frames.len() as i32) as usize];

        let alpha = if e.flags.contains(RenderFlags::TRANSLUCENT) { e.alpha } else { 1.0 };
        if alpha != self.gfx.uniforms.three_d.alpha {
            self.gfx.uniforms.three_d.alpha = alpha;
            self.gfx.update_ubo_3d()?;
        }

        let skin = frame.image.unwrap_or_else(|| self.gfx.images.fallback());
        self.gfx.bind(skin);

        if alpha == 1.0 {
            // use alpha testing
            self.gfx.use_program(ProgramKind::SpriteAlpha)?;
        } else {
            // use alpha blending
            self.gfx.enable_blend(true);
            self.gfx.use_program(ProgramKind::Sprite)?;
        }

        let (up, right) = (self.frame.vup, self.frame.vright);
        let (w, h) = (frame.width as f32, frame.height as f32);
        let (ox, oy) = (frame.origin_x as f32, frame.origin_y as f32);
        let corner = |u: f32, r: f32| vector_ma(&vector_ma(&e.origin, u, &up), r, &right);

        let verts = [
            Vertex3D::new(corner(-oy, -ox), [0.0, 1.0], [0.0; 2]),
            Vertex3D::new(corner(h - oy, -ox), [0.0, 0.0], [0.0; 2]),
            Vertex3D::new(corner(h - oy, w - ox), [1.0, 0.0], [0.0; 2]),
            Vertex3D::new(corner(-oy, w - ox), [1.0, 1.0], [0.0; 2]),
        ];
        let result = self.gfx.buffer_and_draw_3d(&verts, PrimitiveMode::TriangleFan, None);

        if alpha != 1.0 {
            self.gfx.enable_blend(false);
            self.gfx.uniforms.three_d.alpha = 1.0;
            self.gfx.update_ubo_3d()?;
        }
        result
    }

    pub fn draw_particles(&mut self) -> RefResult<()> {
        let refdef = &self.frame.refdef;
        if refdef.particles.is_empty() {
            return Ok(());
        }

        let point_size = self.cvars.gl3_particle_size.value * refdef.height as f32 / 480.0;
        let verts: Vec<ParticleVtx> = refdef
            .particles
            .iter()
            .map(|p| {
                let mut color = self.palette.color(p.color);
                color[3] = p.alpha;
                ParticleVtx {
                    pos: p.origin,
                    size: point_size,
                    dist: vector_length(&vector_subtract(&refdef.vieworg, &p.origin)),
                    color,
                }
            })
            .collect();

        self.gfx.enable_depth_write(false);
        self.gfx.enable_blend(true);

        let gfx = &mut self.gfx;
        let result = gfx.use_program(ProgramKind::Particle).and_then(|()| {
            let slice = gfx.arenas.attribute.write_pod(&verts)?;
            gfx.gpu.set_attrib_buffer(
                0,
                gfx.arenas.attribute.bytes(slice),
                std::mem::size_of::<ParticleVtx>() as u32,
            );
            gfx.gpu.draw(PrimitiveMode::Points, verts.len() as u32);
            Ok(())
        });

        self.gfx.enable_blend(false);
        self.gfx.enable_depth_write(true);
        result
    }
}
