// wiiu_state.rs: fixed-function state switchboard
//
// Every setter compares against the last value it applied and only talks
// to the GPU when something changed.

use crate::gx2::{CompareFunc, Gx2Device, PolygonControl, TextureId};
use crate::wiiu_local::Gfx;
use crate::wiiu_shaders::ProgramKind;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Viewport {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

#[derive(Debug, Default)]
pub struct StateCache {
    depth_test: Option<bool>,
    depth_write: Option<bool>,
    blend: Option<bool>,
    viewport: Option<Viewport>,
    depth_range: Option<(f32, f32)>,
    cull_enable: Option<bool>,
    cull_front: Option<bool>,
    polygon_offset_enable: Option<bool>,
    polygon_offset: Option<(f32, f32)>,

    pub current_program: Option<ProgramKind>,
    pub current_texture: Option<TextureId>,
    pub current_lightmap: Option<u32>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth_test(&self) -> bool {
        self.depth_test.unwrap_or(false)
    }

    pub fn depth_write(&self) -> bool {
        self.depth_write.unwrap_or(true)
    }

    pub fn blend(&self) -> bool {
        self.blend.unwrap_or(false)
    }

    pub fn depth_range(&self) -> (f32, f32) {
        self.depth_range.unwrap_or((0.0, 1.0))
    }

    fn apply_depth(&self, gpu: &mut dyn Gx2Device) {
        gpu.set_depth_only_control(self.depth_test(), self.depth_write(), CompareFunc::LEqual);
    }

    pub fn enable_depth_test(&mut self, gpu: &mut dyn Gx2Device, enable: bool) {
        if self.depth_test == Some(enable) {
            return;
        }
        self.depth_test = Some(enable);
        self.apply_depth(gpu);
    }

    pub fn enable_depth_write(&mut self, gpu: &mut dyn Gx2Device, enable: bool) {
        if self.depth_write == Some(enable) {
            return;
        }
        self.depth_write = Some(enable);
        self.apply_depth(gpu);
    }

    pub fn enable_blend(&mut self, gpu: &mut dyn Gx2Device, enable: bool) {
        if self.blend == Some(enable) {
            return;
        }
        self.blend = Some(enable);
        gpu.set_blend_control(enable);
    }

    fn apply_viewport(&self, gpu: &mut dyn Gx2Device) {
        let vp = self.viewport.unwrap_or(Viewport { x: 0, y: 0, w: 1280, h: 720 });
        let (near, far) = self.depth_range();
        gpu.set_viewport(vp.x as f32, vp.y as f32, vp.w as f32, vp.h as f32, near, far);
    }

    pub fn set_viewport(&mut self, gpu: &mut dyn Gx2Device, x: i32, y: i32, w: i32, h: i32) {
        let vp = Viewport { x, y, w, h };
        if self.viewport == Some(vp) {
            return;
        }
        self.viewport = Some(vp);
        self.apply_viewport(gpu);
    }

    pub fn set_depth_range(&mut self, gpu: &mut dyn Gx2Device, near: f32, far: f32) {
        if self.depth_range == Some((near, far)) {
            return;
        }
        self.depth_range = Some((near, far));
        self.apply_viewport(gpu);
    }

    fn apply_polygon_control(&self, gpu: &mut dyn Gx2Device) {
        let enable = self.cull_enable.unwrap_or(false);
        let front = self.cull_front.unwrap_or(false);
        let offset = self.polygon_offset_enable.unwrap_or(false);
        gpu.set_polygon_control(PolygonControl {
            front_ccw: true,
            cull_front: enable && front,
            cull_back: enable && !front,
            offset,
        });
    }

    pub fn enable_cull_face(&mut self, gpu: &mut dyn Gx2Device, enable: bool) {
        if self.cull_enable == Some(enable) {
            return;
        }
        self.cull_enable = Some(enable);
        self.apply_polygon_control(gpu);
    }

    pub fn cull_front(&mut self, gpu: &mut dyn Gx2Device) {
        if self.cull_front == Some(true) {
            return;
        }
        self.cull_front = Some(true);
        self.apply_polygon_control(gpu);
    }

    pub fn cull_back(&mut self, gpu: &mut dyn Gx2Device) {
        if self.cull_front == Some(false) {
            return;
        }
        self.cull_front = Some(false);
        self.apply_polygon_control(gpu);
    }

    pub fn enable_polygon_offset(&mut self, gpu: &mut dyn Gx2Device, enable: bool) {
        if self.polygon_offset_enable == Some(enable) {
            return;
        }
        self.polygon_offset_enable = Some(enable);
        self.apply_polygon_control(gpu);
    }

    pub fn polygon_offset(&mut self, gpu: &mut dyn Gx2Device, factor: f32, units: f32) {
        if self.polygon_offset == Some((factor, units)) {
            return;
        }
        self.polygon_offset = Some((factor, units));
        gpu.set_polygon_offset(units, factor);
    }

    /// Force the defaults onto the GPU and forget cached bindings.
    pub fn set_default_state(&mut self, gpu: &mut dyn Gx2Device) {
        self.depth_test = Some(true);
        self.depth_write = Some(true);
        self.apply_depth(gpu);

        self.blend = Some(false);
        gpu.set_blend_control(false);

        self.cull_enable = Some(true);
        self.cull_front = Some(false);
        self.polygon_offset_enable = Some(false);
        self.apply_polygon_control(gpu);

        self.current_program = None;
        self.current_texture = None;
        self.current_lightmap = None;
    }
}

impl Gfx {
    pub fn enable_depth_test(&mut self, enable: bool) {
        self.state.enable_depth_test(self.gpu.as_mut(), enable);
    }

    pub fn enable_depth_write(&mut self, enable: bool) {
        self.state.enable_depth_write(self.gpu.as_mut(), enable);
    }

    pub fn enable_blend(&mut self, enable: bool) {
        self.state.enable_blend(self.gpu.as_mut(), enable);
    }

    pub fn set_viewport(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.state.set_viewport(self.gpu.as_mut(), x, y, w, h);
    }

    pub fn set_depth_range(&mut self, near: f32, far: f32) {
        self.state.set_depth_range(self.gpu.as_mut(), near, far);
    }

    pub fn enable_cull_face(&mut self, enable: bool) {
        self.state.enable_cull_face(self.gpu.as_mut(), enable);
    }

    pub fn cull_front(&mut self) {
        self.state.cull_front(self.gpu.as_mut());
    }

    pub fn cull_back(&mut self) {
        self.state.cull_back(self.gpu.as_mut());
    }

    pub fn enable_polygon_offset(&mut self, enable: bool) {
        self.state.enable_polygon_offset(self.gpu.as_mut(), enable);
    }

    pub fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.state.polygon_offset(self.gpu.as_mut(), factor, units);
    }

    pub fn set_default_state(&mut self) {
        self.state.set_default_state(self.gpu.as_mut());
    }
}
