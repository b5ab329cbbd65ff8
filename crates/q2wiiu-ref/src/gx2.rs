//! GX2 command seam
//!
//! Everything the renderer asks of the GPU goes through [`Gx2Device`], a
//! thin fixed-function surface shaped after the console API (shader groups,
//! pixel textures and samplers per unit, uniform blocks per stage and slot,
//! attribute buffers, depth/blend/polygon control, scan buffers).
//!
//! [`CommandRecorder`] is the headless implementation. It records every
//! call as a [`Gx2Command`] so draw sequences can be inspected.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Magic at the start of every compiled GFD shader group.
pub const GFD_MAGIC: &[u8; 4] = b"Gfx2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    Points,
    Lines,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LEqual,
    Greater,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexFilter {
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipFilter {
    None,
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexClamp {
    Wrap,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub min: TexFilter,
    pub mag: TexFilter,
    pub mip: MipFilter,
    pub clamp: TexClamp,
    pub max_anisotropy: u32,
}

impl SamplerDesc {
    pub const fn new(filter: TexFilter, clamp: TexClamp) -> Self {
        Self {
            min: filter,
            mag: filter,
            mip: MipFilter::None,
            clamp,
            max_anisotropy: 1,
        }
    }
}

/// Arguments of `GX2SetPolygonControl` the renderer varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolygonControl {
    pub front_ccw: bool,
    pub cull_front: bool,
    pub cull_back: bool,
    pub offset: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanTarget {
    Tv,
    Drc,
}

/// The fixed-function GPU command API the renderer drives.
pub trait Gx2Device {
    /// Validate and load a compiled shader group.
    fn load_shader_group(&mut self, name: &str, gsh: &[u8]) -> Result<ProgramId, String>;
    fn free_shader_group(&mut self, program: ProgramId);
    fn set_program(&mut self, program: ProgramId);

    fn create_texture(&mut self, width: u32, height: u32, mip_levels: u32) -> TextureId;
    fn upload_texture(&mut self, texture: TextureId, rgba: &[u8]);
    fn destroy_texture(&mut self, texture: TextureId);
    fn create_sampler(&mut self, desc: SamplerDesc) -> SamplerId;
    fn set_pixel_texture(&mut self, texture: TextureId, unit: u32);
    fn set_pixel_sampler(&mut self, sampler: SamplerId, unit: u32);

    /// `data` lives in the uniform arena and stays valid until the arena wraps.
    fn set_uniform_block(&mut self, stage: ShaderStage, slot: u32, data: &[u8]);
    fn set_attrib_buffer(&mut self, slot: u32, data: &[u8], stride: u32);
    fn draw(&mut self, mode: PrimitiveMode, count: u32);
    fn draw_indexed(&mut self, mode: PrimitiveMode, indices: &[u8], count: u32);

    fn set_depth_only_control(&mut self, test: bool, write: bool, func: CompareFunc);
    fn set_blend_control(&mut self, enable: bool);
    fn set_polygon_control(&mut self, control: PolygonControl);
    fn set_polygon_offset(&mut self, units: f32, factor: f32);
    fn set_viewport(&mut self, x: f32, y: f32, w: f32, h: f32, near: f32, far: f32);
    fn set_scissor(&mut self, x: u32, y: u32, w: u32, h: u32);
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>);

    fn begin_render(&mut self, target: ScanTarget);
    fn finish_render(&mut self, target: ScanTarget);
    /// The TV colour buffer viewed as a texture, for the DRC copy.
    fn tv_color_texture(&mut self) -> TextureId;
    /// Blocks until the display accepts the next buffer when vsync is on.
    fn swap_scan_buffers(&mut self);
    fn set_swap_interval(&mut self, interval: u32);
    fn flush(&mut self);
    fn scan_size(&self, target: ScanTarget) -> (u32, u32);

    fn max_anisotropy(&self) -> u32 {
        16
    }
}

// ============================================================================
// Headless recorder
// ============================================================================

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Gx2Command {
    LoadShaderGroup { name: String, program: ProgramId },
    FreeShaderGroup(ProgramId),
    SetProgram(ProgramId),
    CreateTexture { texture: TextureId, width: u32, height: u32, mip_levels: u32 },
    UploadTexture { texture: TextureId, bytes: usize },
    DestroyTexture(TextureId),
    CreateSampler { sampler: SamplerId, desc: SamplerDesc },
    SetPixelTexture { texture: TextureId, unit: u32 },
    SetPixelSampler { sampler: SamplerId, unit: u32 },
    SetUniformBlock { stage: ShaderStage, slot: u32, data: Vec<u8> },
    SetAttribBuffer { slot: u32, data: Vec<u8>, stride: u32 },
    Draw { mode: PrimitiveMode, count: u32 },
    DrawIndexed { mode: PrimitiveMode, indices: Vec<u8>, count: u32 },
    DepthOnlyControl { test: bool, write: bool, func: CompareFunc },
    BlendControl(bool),
    PolygonControl(PolygonControl),
    PolygonOffset { units: f32, factor: f32 },
    Viewport { x: f32, y: f32, w: f32, h: f32, near: f32, far: f32 },
    Scissor { x: u32, y: u32, w: u32, h: u32 },
    Clear { color: Option<[f32; 4]>, depth: Option<f32> },
    BeginRender(ScanTarget),
    FinishRender(ScanTarget),
    SwapScanBuffers,
    SwapInterval(u32),
    Flush,
}

impl Gx2Command {
    pub fn is_draw(&self) -> bool {
        matches!(self, Gx2Command::Draw { .. } | Gx2Command::DrawIndexed { .. })
    }
}

#[derive(Debug)]
struct RecorderState {
    commands: Vec<Gx2Command>,
    next_program: u32,
    next_texture: u32,
    next_sampler: u32,
    tv_texture: Option<TextureId>,
    tv_size: (u32, u32),
    drc_size: (u32, u32),
    rejected: HashSet<String>,
}

/// Records device calls instead of talking to hardware.
///
/// Clones share the same log, so a test keeps one handle while the
/// renderer owns another.
#[derive(Debug, Clone)]
pub struct CommandRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl Default for CommandRecorder {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl CommandRecorder {
    pub fn new(tv_width: u32, tv_height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState {
                commands: Vec::new(),
                next_program: 1,
                next_texture: 1,
                next_sampler: 1,
                tv_texture: None,
                tv_size: (tv_width, tv_height),
                drc_size: (854, 480),
                rejected: HashSet::new(),
            })),
        }
    }

    /// Make `load_shader_group` fail for `name`.
    pub fn reject_shader(&self, name: &str) {
        self.state.lock().rejected.insert(name.to_string());
    }

    pub fn commands(&self) -> Vec<Gx2Command> {
        self.state.lock().commands.clone()
    }

    pub fn clear(&self) {
        self.state.lock().commands.clear();
    }

    pub fn draw_count(&self) -> usize {
        self.state.lock().commands.iter().filter(|c| c.is_draw()).count()
    }

    fn push(&self, cmd: Gx2Command) {
        self.state.lock().commands.push(cmd);
    }
}

impl Gx2Device for CommandRecorder {
    fn load_shader_group(&mut self, name: &str, gsh: &[u8]) -> Result<ProgramId, String> {
        let mut st = self.state.lock();
        if st.rejected.contains(name) {
            return Err("rejected by device".to_string());
        }
        if gsh.len() < GFD_MAGIC.len() || &gsh[..4] != GFD_MAGIC {
            return Err("not a GFD shader group".to_string());
        }
        let program = ProgramId(st.next_program);
        st.next_program += 1;
        st.commands.push(Gx2Command::LoadShaderGroup { name: name.to_string(), program });
        Ok(program)
    }

    fn free_shader_group(&mut self, program: ProgramId) {
        self.push(Gx2Command::FreeShaderGroup(program));
    }

    fn set_program(&mut self, program: ProgramId) {
        self.push(Gx2Command::SetProgram(program));
    }

    fn create_texture(&mut self, width: u32, height: u32, mip_levels: u32) -> TextureId {
        let mut st = self.state.lock();
        let texture = TextureId(st.next_texture);
        st.next_texture += 1;
        st.commands.push(Gx2Command::CreateTexture { texture, width, height, mip_levels });
        texture
    }

    fn upload_texture(&mut self, texture: TextureId, rgba: &[u8]) {
        self.push(Gx2Command::UploadTexture { texture, bytes: rgba.len() });
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.push(Gx2Command::DestroyTexture(texture));
    }

    fn create_sampler(&mut self, desc: SamplerDesc) -> SamplerId {
        let mut st = self.state.lock();
        let sampler = SamplerId(st.next_sampler);
        st.next_sampler += 1;
        st.commands.push(Gx2Command::CreateSampler { sampler, desc });
        sampler
    }

    fn set_pixel_texture(&mut self, texture: TextureId, unit: u32) {
        self.push(Gx2Command::SetPixelTexture { texture, unit });
    }

    fn set_pixel_sampler(&mut self, sampler: SamplerId, unit: u32) {
        self.push(Gx2Command::SetPixelSampler { sampler, unit });
    }

    fn set_uniform_block(&mut self, stage: ShaderStage, slot: u32, data: &[u8]) {
        self.push(Gx2Command::SetUniformBlock { stage, slot, data: data.to_vec() });
    }

    fn set_attrib_buffer(&mut self, slot: u32, data: &[u8], stride: u32) {
        self.push(Gx2Command::SetAttribBuffer { slot, data: data.to_vec(), stride });
    }

    fn draw(&mut self, mode: PrimitiveMode, count: u32) {
        self.push(Gx2Command::Draw { mode, count });
    }

    fn draw_indexed(&mut self, mode: PrimitiveMode, indices: &[u8], count: u32) {
        self.push(Gx2Command::DrawIndexed { mode, indices: indices.to_vec(), count });
    }

    fn set_depth_only_control(&mut self, test: bool, write: bool, func: CompareFunc) {
        self.push(Gx2Command::DepthOnlyControl { test, write, func });
    }

    fn set_blend_control(&mut self, enable: bool) {
        self.push(Gx2Command::BlendControl(enable));
    }

    fn set_polygon_control(&mut self, control: PolygonControl) {
        self.push(Gx2Command::PolygonControl(control));
    }

    fn set_polygon_offset(&mut self, units: f32, factor: f32) {
        self.push(Gx2Command::PolygonOffset { units, factor });
    }

    fn set_viewport(&mut self, x: f32, y: f32, w: f32, h: f32, near: f32, far: f32) {
        self.push(Gx2Command::Viewport { x, y, w, h, near, far });
    }

    fn set_scissor(&mut self, x: u32, y: u32, w: u32, h: u32) {
        self.push(Gx2Command::Scissor { x, y, w, h });
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.push(Gx2Command::Clear { color, depth });
    }

    fn begin_render(&mut self, target: ScanTarget) {
        self.push(Gx2Command::BeginRender(target));
    }

    fn finish_render(&mut self, target: ScanTarget) {
        self.push(Gx2Command::FinishRender(target));
    }

    fn tv_color_texture(&mut self) -> TextureId {
        let mut st = self.state.lock();
        if let Some(tex) = st.tv_texture {
            return tex;
        }
        let tex = TextureId(st.next_texture);
        st.next_texture += 1;
        st.tv_texture = Some(tex);
        tex
    }

    fn swap_scan_buffers(&mut self) {
        self.push(Gx2Command::SwapScanBuffers);
    }

    fn set_swap_interval(&mut self, interval: u32) {
        self.push(Gx2Command::SwapInterval(interval));
    }

    fn flush(&mut self) {
        self.push(Gx2Command::Flush);
    }

    fn scan_size(&self, target: ScanTarget) -> (u32, u32) {
        let st = self.state.lock();
        match target {
            ScanTarget::Tv => st.tv_size,
            ScanTarget::Drc => st.drc_size,
        }
    }
}
