// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_surf.rs: world traversal, texture chains and brush models

use std::collections::HashMap;

use glam::Mat4;
use q2wiiu_common::q_shared::{
    angle_vectors, dot_product, vector_add, vector_subtract, ImageHandle, RdFlags, RefDef, RefEntity,
    RenderFlags, Vec3, CONTENTS_SOLID, PLANE_X, PLANE_Y, PLANE_Z,
};

use crate::error::{RefError, RefResult};
use crate::gx2::PrimitiveMode;
use crate::refimport::RefImport;
use crate::wiiu_local::{Gfx, RendererState};
use crate::wiiu_model_types::{BrushModel, DrawFlags, InlineModel, MSurface, NodeRef, SurfaceKind, MAXLIGHTMAPS};
use crate::wiiu_shaders::select_program_for_surface;

pub const BACKFACE_EPSILON: f32 = 0.01;

/// Brush model faces light every vertex; the shader sorts it out.
const ALL_LIGHT_FLAGS: u32 = 0xffff_ffff;

// ============================================================
// Frame chains
// ============================================================

/// A translucent surface waiting for the alpha pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaSurface {
    pub surface: u32,
    /// Animation frame resolved when the surface was found.
    pub image: ImageHandle,
}

/// Surfaces collected while walking the tree, indexed into the world's
/// surface list. Rebuilt every frame.
#[derive(Debug, Default)]
pub struct SurfaceChains {
    textures: HashMap<ImageHandle, Vec<u32>>,
    alpha: Vec<AlphaSurface>,
    pub c_visible_textures: u32,
}

impl SurfaceChains {
    pub fn add_texture(&mut self, image: ImageHandle, surface: u32) {
        self.textures.entry(image).or_default().push(surface);
    }

    pub fn add_alpha(&mut self, surface: AlphaSurface) {
        self.alpha.push(surface);
    }

    /// Chained surfaces of `image`, most recently added first.
    pub fn take_chain(&mut self, image: ImageHandle) -> Option<Vec<u32>> {
        self.textures.remove(&image).map(|mut chain| {
            chain.reverse();
            chain
        })
    }

    /// Translucent surfaces, most recently added first. The tree is walked
    /// front to back, so this is back to front.
    pub fn alpha_surfaces(&self) -> impl Iterator<Item = &AlphaSurface> {
        self.alpha.iter().rev()
    }

    pub fn take_alpha(&mut self) -> Vec<AlphaSurface> {
        let mut alpha = std::mem::take(&mut self.alpha);
        alpha.reverse();
        alpha
    }

    pub fn chain_len(&self, image: ImageHandle) -> usize {
        self.textures.get(&image).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty() && self.alpha.is_empty()
    }

    pub fn clear(&mut self) {
        self.textures.clear();
        self.alpha.clear();
    }
}

/// Texture scroll of a flowing lightmapped surface at `time`.
pub fn flowing_scroll(time: f32) -> f32 {
    let t = time / 40.0;
    let scroll = -64.0 * (t - t.trunc());
    if scroll == 0.0 {
        -64.0
    } else {
        scroll
    }
}

/// Lightstyle scales for the (up to four) lightmaps of `surf`.
pub fn lightmap_scales(surf: &MSurface, refdef: &RefDef) -> [[f32; 4]; MAXLIGHTMAPS] {
    let mut scales = [[0.0; 4]; MAXLIGHTMAPS];
    scales[0] = [1.0; 4];
    for (map, &style) in surf.styles.iter().enumerate() {
        if style == 255 {
            break;
        }
        let rgb = refdef.lightstyle(style as usize).rgb;
        scales[map] = [rgb[0], rgb[1], rgb[2], 1.0];
    }
    scales
}

// ============================================================
// Polygon submission
// ============================================================

impl Gfx {
    fn draw_gl_poly(&mut self, surf: &MSurface, time: f32, light_flags: u32) -> RefResult<()> {
        if surf.kind.is_flowing() {
            let scroll = flowing_scroll(time);
            if self.uniforms.three_d.scroll != scroll {
                self.uniforms.three_d.scroll = scroll;
                self.update_ubo_3d()?;
            }
        }
        for poly in &surf.polys {
            self.buffer_and_draw_3d(&poly.vertices, PrimitiveMode::TriangleFan, Some(light_flags))?;
        }
        Ok(())
    }

    /// Draw an opaque surface with its lightmap in one pass.
    pub fn render_lightmapped_poly(
        &mut self,
        ri: &mut dyn RefImport,
        surf: &MSurface,
        image: ImageHandle,
        refdef: &RefDef,
        light_flags: u32,
    ) -> RefResult<()> {
        self.bind(image);
        self.bind_lightmap(ri, surf.lightmap as i32);

        let scales = lightmap_scales(surf, refdef);
        self.use_program(select_program_for_surface(surf.kind))?;
        self.update_ubo_lm_scales(&scales)?;
        self.draw_gl_poly(surf, refdef.time, light_flags)
    }
}

// ============================================================
// World
// ============================================================

impl RendererState {
    /// Run `f` with the world model moved out of the registry.
    fn with_world<T>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut BrushModel) -> RefResult<T>,
    ) -> RefResult<T> {
        let mut world = self.models.world.take().ok_or(RefError::NoWorldModel)?;
        let result = f(self, &mut world);
        self.models.world = Some(world);
        result
    }

    fn render_brush_poly(&mut self, world: &BrushModel, index: u32, light_flags: u32) -> RefResult<()> {
        let surf = &world.surfaces[index as usize];
        self.frame.c_brush_polys += 1;

        let image = world.texture_animation(surf.texinfo, self.frame.anim_frame);
        if surf.flags.contains(DrawFlags::DRAWTURB) {
            self.gfx.bind(image);
            return self.gfx.emit_water_polys(surf, self.frame.refdef.time);
        }

        self.gfx
            .render_lightmapped_poly(self.ri.as_mut(), surf, image, &self.frame.refdef, light_flags)
    }

    /// Front-to-back walk stamping visible surfaces and sorting them into
    /// the sky bounds, the alpha chain or a texture chain.
    fn recursive_world_node(&mut self, world: &mut BrushModel, node: Option<NodeRef>, modelorg: &Vec3) {
        let Some(node) = node else {
            return;
        };

        let n = match node {
            NodeRef::Leaf(l) => {
                let leaf = &world.leafs[l as usize];
                if leaf.contents == CONTENTS_SOLID || leaf.visframe != self.frame.visframecount {
                    return;
                }
                let (mins, maxs) = split_minmaxs(&leaf.minmaxs);
                if self.cull_box(&mins, &maxs) {
                    return;
                }
                // check for door connected areas
                if !self.frame.refdef.area_visible(leaf.area) {
                    return;
                }

                let first = leaf.firstmarksurface as usize;
                let marks = first..first + leaf.nummarksurfaces as usize;
                for &s in &world.marksurfaces[marks] {
                    world.surfaces[s as usize].visframe = self.frame.framecount;
                }
                return;
            }
            NodeRef::Node(n) => n as usize,
        };

        let (plane, children, first, count) = {
            let node = &world.nodes[n];
            if node.visframe != self.frame.visframecount {
                return;
            }
            let (mins, maxs) = split_minmaxs(&node.minmaxs);
            if self.cull_box(&mins, &maxs) {
                return;
            }
            (node.plane, node.children, node.firstsurface, node.numsurfaces)
        };

        // find which side of the node we are on
        let plane = &world.planes[plane as usize];
        let dot = match plane.plane_type {
            PLANE_X => modelorg[0] - plane.dist,
            PLANE_Y => modelorg[1] - plane.dist,
            PLANE_Z => modelorg[2] - plane.dist,
            _ => dot_product(modelorg, &plane.normal) - plane.dist,
        };
        let (side, back) = if dot >= 0.0 { (0, false) } else { (1, true) };

        self.recursive_world_node(world, children[side], modelorg);

        for i in first..first + count {
            let surf = &world.surfaces[i as usize];
            if surf.visframe != self.frame.framecount {
                continue;
            }
            if surf.flags.contains(DrawFlags::PLANEBACK) != back {
                continue; // wrong side
            }

            match surf.kind {
                SurfaceKind::Sky => self.sky.add_surface(surf, &self.frame.origin),
                SurfaceKind::Translucent { .. } => {
                    let image = world.texture_animation(surf.texinfo, self.frame.anim_frame);
                    self.chains.add_alpha(AlphaSurface { surface: i, image });
                }
                SurfaceKind::Opaque { .. } | SurfaceKind::Warp { .. } => {
                    let image = world.texture_animation(surf.texinfo, self.frame.anim_frame);
                    self.chains.add_texture(image, i);
                }
            }
        }

        self.recursive_world_node(world, children[1 - side], modelorg);
    }

    /// Drain every texture chain, one bind per registered image.
    fn draw_texture_chains(&mut self, world: &BrushModel) -> RefResult<()> {
        self.chains.c_visible_textures = 0;

        let handles: Vec<ImageHandle> = self.gfx.images.iter().map(|(h, _)| h).collect();
        for handle in handles {
            let Some(chain) = self.chains.take_chain(handle) else {
                continue;
            };
            self.chains.c_visible_textures += 1;

            for s in chain {
                let surf = &world.surfaces[s as usize];
                let light_flags = if surf.dlightframe == self.frame.framecount {
                    surf.dlightbits
                } else {
                    0
                };
                self.render_brush_poly(world, s, light_flags)?;
            }
        }

        // chains of images freed since the walk are dropped
        self.chains.textures.clear();
        Ok(())
    }

    pub fn draw_world(&mut self) -> RefResult<()> {
        if !self.cvars.r_drawworld.is_set() {
            return Ok(());
        }
        if self.frame.refdef.rdflags.contains(RdFlags::NOWORLDMODEL) {
            return Ok(());
        }

        // auto cycle the world frame for texture animation
        self.frame.anim_frame = (self.frame.refdef.time * 2.0) as i32;
        let modelorg = self.frame.refdef.vieworg;

        self.sky.clear();
        self.with_world(|rs, world| {
            let root = world.root();
            rs.recursive_world_node(world, root, &modelorg);
            rs.draw_texture_chains(world)
        })?;
        self.draw_sky_box()
    }

    /// Water surfaces and windows, back to front.
    pub fn draw_alpha_surfaces(&mut self) -> RefResult<()> {
        let surfaces = self.chains.take_alpha();
        if surfaces.is_empty() {
            return Ok(());
        }

        // go back to the world matrix
        self.gfx.uniforms.three_d.trans_model = Mat4::IDENTITY;
        self.gfx.update_ubo_3d()?;
        self.gfx.enable_blend(true);

        self.with_world(|rs, world| {
            for a in &surfaces {
                let surf = &world.surfaces[a.surface as usize];
                rs.gfx.bind(a.image);
                rs.frame.c_brush_polys += 1;

                let alpha = match surf.kind {
                    SurfaceKind::Translucent { alpha, .. } => alpha.value(),
                    _ => 1.0,
                };
                if alpha != rs.gfx.uniforms.three_d.alpha {
                    rs.gfx.uniforms.three_d.alpha = alpha;
                    rs.gfx.update_ubo_3d()?;
                }

                if surf.flags.contains(DrawFlags::DRAWTURB) {
                    rs.gfx.emit_water_polys(surf, rs.frame.refdef.time)?;
                } else {
                    rs.gfx.use_program(select_program_for_surface(surf.kind))?;
                    rs.gfx.draw_gl_poly(surf, rs.frame.refdef.time, 0)?;
                }
            }
            Ok(())
        })?;

        self.gfx.uniforms.three_d.alpha = 1.0;
        self.gfx.update_ubo_3d()?;
        self.gfx.enable_blend(false);
        Ok(())
    }

    // ============================================================
    // Brush models
    // ============================================================

    fn draw_inline_bmodel(
        &mut self,
        world: &mut BrushModel,
        entity: &RefEntity,
        model: &InlineModel,
        modelorg: &Vec3,
    ) -> RefResult<()> {
        // calculate dynamic lighting for bmodel
        if let Some(sub) = world.submodels.get(model.submodel as usize).copied() {
            let dlightframe = self.frame.dlightframecount;
            for (k, light) in self.frame.refdef.dlights.iter().enumerate().take(32) {
                world.mark_lights(light, 1 << k, Some(NodeRef::Node(sub.headnode)), dlightframe);
            }
        }

        let translucent = entity.flags.contains(RenderFlags::TRANSLUCENT);
        if translucent {
            self.gfx.enable_blend(true);
        }

        let first = model.firstface;
        let mut result = Ok(());
        for i in first..first + model.numfaces {
            let surf = &world.surfaces[i as usize];
            let plane = &world.planes[surf.plane as usize];
            let dot = dot_product(modelorg, &plane.normal) - plane.dist;

            let planeback = surf.flags.contains(DrawFlags::PLANEBACK);
            let facing = (planeback && dot < -BACKFACE_EPSILON) || (!planeback && dot > BACKFACE_EPSILON);
            if !facing {
                continue;
            }

            result = if surf.kind.is_translucent() {
                let image = world.texture_animation(surf.texinfo, self.frame.anim_frame);
                self.chains.add_alpha(AlphaSurface { surface: i, image });
                Ok(())
            } else if !surf.flags.contains(DrawFlags::DRAWTURB) {
                self.render_brush_poly(world, i, ALL_LIGHT_FLAGS)
            } else {
                self.render_brush_poly(world, i, 0)
            };
            if result.is_err() {
                break;
            }
        }

        if translucent {
            self.gfx.enable_blend(false);
        }
        result
    }

    pub fn draw_brush_model(&mut self, entity: &RefEntity, model: &InlineModel) -> RefResult<()> {
        if model.numfaces == 0 {
            return Ok(());
        }

        let rotated = entity.angles.iter().any(|&a| a != 0.0);
        let (mins, maxs) = if rotated {
            let r = [model.radius; 3];
            (vector_subtract(&entity.origin, &r), vector_add(&entity.origin, &r))
        } else {
            (vector_add(&entity.origin, &model.mins), vector_add(&entity.origin, &model.maxs))
        };
        if self.cull_box(&mins, &maxs) {
            return Ok(());
        }

        let zfix = self.cvars.gl_zfix.is_set();
        if zfix {
            self.gfx.enable_polygon_offset(true);
        }

        let mut modelorg = vector_subtract(&self.frame.refdef.vieworg, &entity.origin);
        if rotated {
            let temp = modelorg;
            let (forward, right, up) = angle_vectors(&entity.angles);
            modelorg = [dot_product(&temp, &forward), -dot_product(&temp, &right), dot_product(&temp, &up)];
        }

        let old = self.gfx.uniforms.three_d.trans_model;
        // brush models are rotated with pitch and roll negated
        let angles = [-entity.angles[0], entity.angles[1], -entity.angles[2]];
        let result = self.gfx.rotate_for_entity(&entity.origin, &angles).and_then(|()| {
            self.frame.anim_frame = entity.frame;
            self.with_world(|rs, world| rs.draw_inline_bmodel(world, entity, model, &modelorg))
        });

        self.gfx.uniforms.three_d.trans_model = old;
        self.gfx.update_ubo_3d()?;
        if zfix {
            self.gfx.enable_polygon_offset(false);
        }
        result
    }
}

fn split_minmaxs(minmaxs: &[f32; 6]) -> (Vec3, Vec3) {
    (
        [minmaxs[0], minmaxs[1], minmaxs[2]],
        [minmaxs[3], minmaxs[4], minmaxs[5]],
    )
}
