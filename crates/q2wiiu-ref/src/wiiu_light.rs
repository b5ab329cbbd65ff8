// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_light.rs: dynamic light marking and light sampling

use q2wiiu_common::q_shared::{
    dot_product, vector_length, vector_ma, vector_scale, vector_subtract, DLight, LightStyle, Vec3,
};

use crate::error::RefResult;
use crate::wiiu_local::RendererState;
use crate::wiiu_model_types::{BrushModel, DrawFlags, NodeRef, MAXLIGHTMAPS};
use crate::wiiu_uniforms::UniDynLight;

pub const DLIGHT_CUTOFF: f32 = 64.0;

impl BrushModel {
    /// Set `bit` on every surface the light can reach below `node`.
    pub fn mark_lights(&mut self, light: &DLight, bit: u32, node: Option<NodeRef>, dlightframe: u64) {
        let Some(NodeRef::Node(n)) = node else {
            return;
        };
        let (plane, children, first, count) = {
            let node = &self.nodes[n as usize];
            (node.plane, node.children, node.firstsurface, node.numsurfaces)
        };

        let splitplane = &self.planes[plane as usize];
        let dist = dot_product(&light.origin, &splitplane.normal) - splitplane.dist;
        if dist > light.intensity - DLIGHT_CUTOFF {
            self.mark_lights(light, bit, children[0], dlightframe);
            return;
        }
        if dist < -light.intensity + DLIGHT_CUTOFF {
            self.mark_lights(light, bit, children[1], dlightframe);
            return;
        }

        // mark the polygons
        for i in first..first + count {
            let surf = &mut self.surfaces[i as usize];
            if surf.dlightframe != dlightframe {
                surf.dlightbits = 0;
                surf.dlightframe = dlightframe;
            }
            let plane = &self.planes[surf.plane as usize];
            let dist = dot_product(&light.origin, &plane.normal) - plane.dist;
            let back = dist < 0.0;
            if surf.flags.contains(DrawFlags::PLANEBACK) != back {
                continue;
            }
            surf.dlightbits |= bit;
        }

        self.mark_lights(light, bit, children[0], dlightframe);
        self.mark_lights(light, bit, children[1], dlightframe);
    }

    /// Trace `start` to `end` and sample the lightmap of the first lit
    /// surface hit. `None` if nothing was hit.
    pub fn recursive_light_point(
        &self,
        node: Option<NodeRef>,
        start: &Vec3,
        end: &Vec3,
        lightstyle: &dyn Fn(usize) -> LightStyle,
        modulate: f32,
    ) -> Option<Vec3> {
        let Some(NodeRef::Node(n)) = node else {
            return None; // didn't hit anything
        };
        let node = &self.nodes[n as usize];

        // calculate mid point
        let plane = &self.planes[node.plane as usize];
        let front = dot_product(start, &plane.normal) - plane.dist;
        let back = dot_product(end, &plane.normal) - plane.dist;
        let side = usize::from(front < 0.0);

        if (back < 0.0) == (front < 0.0) {
            return self.recursive_light_point(node.child(side), start, end, lightstyle, modulate);
        }

        let frac = front / (front - back);
        let mid = [
            start[0] + (end[0] - start[0]) * frac,
            start[1] + (end[1] - start[1]) * frac,
            start[2] + (end[2] - start[2]) * frac,
        ];

        // go down front side
        if let Some(color) = self.recursive_light_point(node.child(side), start, &mid, lightstyle, modulate) {
            return Some(color);
        }

        // check for impact on this node
        for surf in &self.surfaces[node.firstsurface as usize..(node.firstsurface + node.numsurfaces) as usize] {
            if surf.flags.intersects(DrawFlags::DRAWTURB | DrawFlags::DRAWSKY) {
                continue; // no lightmaps
            }

            let tex = &self.texinfo[surf.texinfo as usize];
            let v0 = [tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]];
            let v1 = [tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]];
            let s = (dot_product(&mid, &v0) + tex.vecs[0][3]) as i32;
            let t = (dot_product(&mid, &v1) + tex.vecs[1][3]) as i32;
            if s < surf.texturemins[0] as i32 || t < surf.texturemins[1] as i32 {
                continue;
            }

            let ds = s - surf.texturemins[0] as i32;
            let dt = t - surf.texturemins[1] as i32;
            if ds > surf.extents[0] as i32 || dt > surf.extents[1] as i32 {
                continue;
            }

            let mut color = [0.0f32; 3];
            let Some(samples) = surf.samples else {
                return Some(color);
            };

            let width = (surf.extents[0] as i32 >> 4) + 1;
            let height = (surf.extents[1] as i32 >> 4) + 1;
            let mut ofs = samples + (3 * ((dt >> 4) * width + (ds >> 4))) as usize;
            for &style in surf.styles.iter().take(MAXLIGHTMAPS) {
                if style == 255 {
                    break;
                }
                let rgb = lightstyle(style as usize).rgb;
                if let Some(texel) = self.lightdata.get(ofs..ofs + 3) {
                    for ((c, &t), s) in color.iter_mut().zip(texel).zip(rgb) {
                        *c += t as f32 * modulate * s * (1.0 / 255.0);
                    }
                }
                ofs += (3 * width * height) as usize;
            }
            return Some(color);
        }

        // go down back side
        self.recursive_light_point(node.child(1 - side), &mid, end, lightstyle, modulate)
    }
}

impl RendererState {
    /// Mark surfaces touched by each dynamic light and upload the light
    /// block.
    pub fn push_dlights(&mut self) -> RefResult<()> {
        self.frame.dlightframecount = self.frame.framecount + 1;
        let dlightframe = self.frame.dlightframecount;

        if self.cvars.gl_dynamic.is_set() {
            if let Some(world) = self.models.world.as_mut() {
                let root = world.root();
                for (i, light) in self.frame.refdef.dlights.iter().enumerate().take(32) {
                    world.mark_lights(light, 1 << i, root, dlightframe);
                }
            }
        }

        self.gfx.uniforms.lights = self.frame.refdef.dlights.iter().take(32).map(UniDynLight::from).collect();
        self.gfx.update_ubo_lights()
    }

    /// Light arriving at `p`, for shading an entity at `origin`.
    pub fn light_point(&self, origin: &Vec3, p: &Vec3) -> Vec3 {
        let Some(world) = self.models.world.as_ref().filter(|w| !w.lightdata.is_empty()) else {
            return [1.0; 3];
        };

        let modulate = self.cvars.r_modulate.value;
        let refdef = &self.frame.refdef;
        let end = [p[0], p[1], p[2] - 2048.0];
        let mut color = world
            .recursive_light_point(world.root(), p, &end, &|i| refdef.lightstyle(i), modulate)
            .unwrap_or([0.0; 3]);

        // add dynamic lights
        for dl in &refdef.dlights {
            let dist = vector_subtract(origin, &dl.origin);
            let add = (dl.intensity - vector_length(&dist)) * (1.0 / 256.0);
            if add > 0.0 {
                color = vector_ma(&color, add, &dl.color);
            }
        }

        vector_scale(&color, modulate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{box_world, quad, renderer};
    use crate::wiiu_model_types::*;
    use approx::assert_relative_eq;
    use q2wiiu_common::q_shared::{CPlane, ImageHandle, SurfFlags};

    /// One floor at z = 0 carrying a 2x2 lightmap sample grid.
    fn floor_world() -> BrushModel {
        let mut surf = MSurface::new(
            0,
            0,
            SurfaceKind::Opaque { flowing: false },
            vec![quad([[0.0, 0.0, 0.0], [32.0, 0.0, 0.0], [32.0, 32.0, 0.0], [0.0, 32.0, 0.0]])],
        );
        surf.texturemins = [0, 0];
        surf.extents = [16, 16];
        surf.samples = Some(0);
        surf.styles = [0, 255, 255, 255];

        let mut lightdata = vec![0u8; 12];
        // texel (0,0) and (1,1)
        lightdata[0..3].copy_from_slice(&[255, 128, 0]);
        lightdata[9..12].copy_from_slice(&[0, 0, 255]);

        BrushModel {
            planes: vec![CPlane::new([0.0, 0.0, 1.0], 0.0)],
            nodes: vec![MNode {
                plane: 0,
                children: [Some(NodeRef::Leaf(0)), Some(NodeRef::Leaf(1))],
                minmaxs: [-64.0, -64.0, -64.0, 64.0, 64.0, 64.0],
                parent: None,
                visframe: 0,
                firstsurface: 0,
                numsurfaces: 1,
            }],
            leafs: vec![MLeaf::default(), MLeaf::default()],
            surfaces: vec![surf],
            texinfo: vec![MTexInfo {
                vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
                flags: SurfFlags::empty(),
                numframes: 1,
                next: None,
                texture: "e1u1/floor".to_string(),
                image: ImageHandle(0),
            }],
            lightdata,
            ..Default::default()
        }
    }

    fn white(_: usize) -> LightStyle {
        LightStyle::default()
    }

    // ============================================================
    // Marking
    // ============================================================

    #[test]
    fn test_light_marks_near_surfaces_only() {
        let mut world = box_world();
        let light = DLight { origin: [10.0, 10.0, 0.0], color: [1.0; 3], intensity: 100.0 };
        let root = world.root();
        world.mark_lights(&light, 1 << 3, root, 7);
        // within 36 units of x = 0 and y = 0, facing the light
        for surf in &world.surfaces[..5] {
            assert_eq!(surf.dlightframe, 7);
            assert_eq!(surf.dlightbits, 1 << 3);
        }
        // inline model faces hang off no node
        assert_eq!(world.surfaces[5].dlightframe, 0);
    }

    #[test]
    fn test_far_light_descends_one_side() {
        let mut world = box_world();
        let light = DLight { origin: [400.0, 400.0, 0.0], color: [1.0; 3], intensity: 100.0 };
        let root = world.root();
        world.mark_lights(&light, 1, root, 1);
        assert!(world.surfaces.iter().all(|s| s.dlightbits == 0));
    }

    #[test]
    fn test_backfacing_surface_not_lit() {
        let mut world = box_world();
        let light = DLight { origin: [-10.0, 10.0, 0.0], color: [1.0; 3], intensity: 100.0 };
        let root = world.root();
        world.mark_lights(&light, 1, root, 2);
        // node0 faces +x and the light is behind them
        assert_eq!(world.surfaces[0].dlightframe, 2);
        assert_eq!(world.surfaces[0].dlightbits, 0);
    }

    // ============================================================
    // Sampling
    // ============================================================

    #[test]
    fn test_light_point_samples_lightmap() {
        let world = floor_world();
        let c = world
            .recursive_light_point(world.root(), &[1.0, 1.0, 32.0], &[1.0, 1.0, -2016.0], &white, 1.0)
            .unwrap();
        assert_relative_eq!(c[0], 1.0);
        assert_relative_eq!(c[1], 128.0 / 255.0);
        assert_relative_eq!(c[2], 0.0);

        let c = world
            .recursive_light_point(world.root(), &[16.0, 16.0, 32.0], &[16.0, 16.0, -2016.0], &white, 1.0)
            .unwrap();
        assert_relative_eq!(c[2], 1.0);
    }

    #[test]
    fn test_light_point_misses_outside_extents() {
        let world = floor_world();
        let c = world.recursive_light_point(world.root(), &[40.0, 1.0, 32.0], &[40.0, 1.0, -2016.0], &white, 1.0);
        assert_eq!(c, None);
    }

    #[test]
    fn test_light_point_without_lightdata_is_white() {
        let (rs, _host, _rec) = renderer();
        assert_eq!(rs.light_point(&[0.0; 3], &[0.0; 3]), [1.0; 3]);
    }

    #[test]
    fn test_light_point_adds_dlights_and_modulates() {
        let (mut rs, _host, _rec) = renderer();
        rs.models.world = Some(floor_world());
        rs.cvars.r_modulate.value = 2.0;
        rs.frame.refdef.dlights = vec![DLight { origin: [1.0, 1.0, 64.0], color: [0.0, 1.0, 0.0], intensity: 128.0 }];
        let c = rs.light_point(&[1.0, 1.0, 0.0], &[1.0, 1.0, 32.0]);
        // style scaled by modulate, then the sum again
        assert_relative_eq!(c[0], 4.0);
        assert_relative_eq!(c[1], (2.0 * 128.0 / 255.0 + 0.25) * 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_push_dlights_uploads_block() {
        let (mut rs, _host, rec) = renderer();
        rs.models.world = Some(box_world());
        rs.frame.framecount = 4;
        rs.frame.refdef.dlights = vec![DLight { origin: [10.0, 10.0, 0.0], color: [1.0; 3], intensity: 100.0 }];
        rec.clear();
        rs.push_dlights().unwrap();
        assert_eq!(rs.frame.dlightframecount, 5);
        assert_eq!(rs.gfx.uniforms.lights.len(), 1);
        assert_eq!(rs.models.world.as_ref().unwrap().surfaces[0].dlightbits, 1);
        assert!(rec
            .commands()
            .iter()
            .any(|c| matches!(c, crate::gx2::Gx2Command::SetUniformBlock { slot: 2, .. })));
    }

    #[test]
    fn test_push_dlights_skips_marking_when_disabled() {
        let (mut rs, _host, _rec) = renderer();
        rs.models.world = Some(box_world());
        rs.cvars.gl_dynamic.value = 0.0;
        rs.frame.refdef.dlights = vec![DLight { origin: [10.0, 10.0, 0.0], color: [1.0; 3], intensity: 100.0 }];
        rs.push_dlights().unwrap();
        assert_eq!(rs.models.world.as_ref().unwrap().surfaces[0].dlightbits, 0);
        assert_eq!(rs.gfx.uniforms.lights.len(), 1);
    }
}
