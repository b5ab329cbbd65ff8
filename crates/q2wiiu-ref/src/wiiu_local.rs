// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_local.rs: renderer state shared by the wiiu_* modules

use glam::Mat4;
use q2wiiu_common::config::RendererConfig;
use q2wiiu_common::cvar::{CvarFlags, CvarId};
use q2wiiu_common::q_shared::{CPlane, ModelHandle, RefDef, Vec3};

use crate::gx2::{Gx2Device, TextureId};
use crate::refimport::RefImport;
use crate::wiiu_dynbuffers::FrameArenas;
use crate::wiiu_image::{ImageTable, Palette, Samplers};
use crate::wiiu_model_types::{BrushModel, Model};
use crate::wiiu_shaders::ShaderSet;
use crate::wiiu_state::StateCache;
use crate::wiiu_surf::SurfaceChains;
use crate::wiiu_uniforms::Uniforms;
use crate::wiiu_vis::VisStats;
use crate::wiiu_warp::SkyState;

pub const REF_VERSION: &str = "Yamagi Quake II GX2 Refresher";

// ============================================================================
// Cvars
// ============================================================================

/// A registered cvar with its value cached for the current frame.
#[derive(Debug, Clone)]
pub struct CvarRef {
    pub name: &'static str,
    pub id: CvarId,
    pub value: f32,
    pub string: String,
}

impl CvarRef {
    pub fn register(ri: &mut dyn RefImport, name: &'static str, default: &str, flags: CvarFlags) -> Self {
        let id = ri.cvar_get(name, default, flags);
        Self { name, id, value: ri.cvar_value(id), string: ri.cvar_string(id) }
    }

    pub fn refresh(&mut self, ri: &dyn RefImport) {
        self.value = ri.cvar_value(self.id);
        self.string = ri.cvar_string(self.id);
    }

    pub fn take_modified(&self, ri: &mut dyn RefImport) -> bool {
        ri.cvar_take_modified(self.id)
    }

    pub fn is_set(&self) -> bool {
        self.value != 0.0
    }
}

macro_rules! renderer_cvars {
    (@flags) => { CvarFlags::empty() };
    (@flags $flags:expr) => { $flags };
    ($( $field:ident = $default:literal $(, $flags:expr)? ;)*) => {
        #[allow(non_snake_case)]
        #[derive(Debug, Clone)]
        pub struct RendererCvars {
            $(pub $field: CvarRef,)*
        }

        impl RendererCvars {
            pub fn register(ri: &mut dyn RefImport) -> Self {
                Self {
                    $($field: CvarRef::register(
                        ri,
                        stringify!($field),
                        $default,
                        renderer_cvars!(@flags $($flags)?),
                    ),)*
                }
            }

            /// Re-read every cached value.
            pub fn refresh(&mut self, ri: &dyn RefImport) {
                $(self.$field.refresh(ri);)*
            }
        }
    };
}

renderer_cvars! {
    r_vsync = "1", CvarFlags::ARCHIVE;
    r_msaa_samples = "0", CvarFlags::ARCHIVE;
    gl3_particle_size = "40", CvarFlags::ARCHIVE;
    gl3_particle_fade_factor = "1.2", CvarFlags::ARCHIVE;
    gl3_particle_square = "0", CvarFlags::ARCHIVE;
    gl3_colorlight = "1";
    gl_polyblend = "1";
    r_norefresh = "0";
    r_drawentities = "1";
    r_drawworld = "1";
    r_novis = "0";
    r_lockpvs = "0";
    r_cull = "1";
    gl_zfix = "0";
    r_clear = "0";
    r_speeds = "0";
    r_farsee = "0", CvarFlags::ARCHIVE;
    r_fullbright = "0";
    r_lightlevel = "0";
    gl_nobind = "0";
    gl_dynamic = "1";
    r_modulate = "1", CvarFlags::ARCHIVE;
    vid_gamma = "1.2", CvarFlags::ARCHIVE;
    gl3_intensity = "1.5", CvarFlags::ARCHIVE;
    gl3_intensity_2D = "1.5", CvarFlags::ARCHIVE;
    gl3_overbrightbits = "1.3", CvarFlags::ARCHIVE;
    gl_texturemode = "GL_LINEAR_MIPMAP_NEAREST", CvarFlags::ARCHIVE;
    r_anisotropic = "0", CvarFlags::ARCHIVE;
    r_2D_unfiltered = "1", CvarFlags::ARCHIVE;
    r_3D_unfiltered = "1", CvarFlags::ARCHIVE;
    r_videos_unfiltered = "0", CvarFlags::ARCHIVE;
    r_lightmaps_unfiltered = "0", CvarFlags::ARCHIVE;
    gl_nolerp_list = "pics/conchars.pcx pics/ch1.pcx pics/ch2.pcx pics/ch3.pcx";
    r_lerp_list = "";
    wiiu_drc = "1", CvarFlags::ARCHIVE;
}

// ============================================================================
// GPU-side state
// ============================================================================

/// Everything that talks to the GPU.
pub struct Gfx {
    pub gpu: Box<dyn Gx2Device + Send>,
    pub arenas: FrameArenas,
    pub state: StateCache,
    pub shaders: ShaderSet,
    pub uniforms: Uniforms,
    pub images: ImageTable,
    pub samplers: Samplers,
    /// One texture per world lightmap page.
    pub lightmaps: Vec<TextureId>,
    /// Lightmap pages bound since the counters were last reset.
    pub lightmaps_bound: Vec<u32>,
    /// Cinematic frame texture and its size.
    pub raw_texture: Option<(TextureId, u32, u32)>,
    pub shader_dir: String,
}

impl Gfx {
    pub fn new(gpu: Box<dyn Gx2Device + Send>, config: &RendererConfig) -> Self {
        Self {
            gpu,
            arenas: FrameArenas::new(&config.arena),
            state: StateCache::new(),
            shaders: ShaderSet::default(),
            uniforms: Uniforms::new(1.0, 1.0, 1.0, 1.0, 1.0),
            images: ImageTable::new(),
            samplers: Samplers::default(),
            lightmaps: Vec::new(),
            lightmaps_bound: Vec::new(),
            raw_texture: None,
            shader_dir: config.shader_dir.clone(),
        }
    }
}

// ============================================================================
// Per-frame state
// ============================================================================

/// Where the renderer is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Begun,
    World,
    Entities,
    Alpha,
    Particles,
    Overlay,
}

#[derive(Debug, Clone)]
pub struct FrameState {
    pub refdef: RefDef,
    pub phase: FramePhase,

    /// Bumped per rendered view, used to stamp surfaces.
    pub framecount: u64,
    /// Bumped when going to a new PVS.
    pub visframecount: u64,
    pub dlightframecount: u64,

    pub viewcluster: i32,
    pub viewcluster2: i32,
    pub oldviewcluster: i32,
    pub oldviewcluster2: i32,

    pub origin: Vec3,
    pub vup: Vec3,
    pub vpn: Vec3,
    pub vright: Vec3,
    pub frustum: [CPlane; 4],

    pub proj: Mat4,
    pub view: Mat4,

    /// Entity frame driving texture animation of the model being drawn.
    pub anim_frame: i32,

    pub c_brush_polys: u32,
    pub c_alias_polys: u32,
    pub vis_stats: VisStats,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            refdef: RefDef::default(),
            phase: FramePhase::Idle,
            framecount: 0,
            visframecount: 0,
            dlightframecount: 0,
            viewcluster: -1,
            viewcluster2: -1,
            oldviewcluster: -1,
            oldviewcluster2: -1,
            origin: [0.0; 3],
            vup: [0.0; 3],
            vpn: [0.0; 3],
            vright: [0.0; 3],
            frustum: [CPlane::default(); 4],
            proj: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            anim_frame: 0,
            c_brush_polys: 0,
            c_alias_polys: 0,
            vis_stats: VisStats::default(),
        }
    }
}

// ============================================================================
// Models
// ============================================================================

pub const MAX_MOD_KNOWN: usize = 512;

#[derive(Debug, Default)]
pub struct ModelRegistry {
    /// Slot index is the handle value.
    pub known: Vec<Option<Model>>,
    /// The loaded map. Brush models reference its surfaces.
    pub world: Option<BrushModel>,
    pub world_name: String,
}

impl ModelRegistry {
    pub fn get(&self, handle: ModelHandle) -> Option<&Model> {
        self.known.get(handle.0 as usize).and_then(|m| m.as_ref())
    }

    pub fn find(&self, name: &str) -> Option<ModelHandle> {
        self.known
            .iter()
            .position(|m| m.as_ref().map_or(false, |m| m.name == name))
            .map(|i| ModelHandle(i as u32))
    }

    pub fn has_free_space(&self) -> bool {
        self.known.len() < MAX_MOD_KNOWN || self.known.iter().any(|m| m.is_none())
    }

    /// Store `model` in the first free slot.
    pub fn insert(&mut self, model: Model) -> Option<ModelHandle> {
        if let Some(i) = self.known.iter().position(|m| m.is_none()) {
            self.known[i] = Some(model);
            return Some(ModelHandle(i as u32));
        }
        if self.known.len() >= MAX_MOD_KNOWN {
            return None;
        }
        self.known.push(Some(model));
        Some(ModelHandle(self.known.len() as u32 - 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VidDef {
    pub width: i32,
    pub height: i32,
}

// ============================================================================
// The renderer
// ============================================================================

/// All renderer state, threaded through the draw code by `&mut`.
pub struct RendererState {
    pub gfx: Gfx,
    pub ri: Box<dyn RefImport + Send>,
    pub cvars: RendererCvars,
    pub models: ModelRegistry,
    pub frame: FrameState,
    pub chains: SurfaceChains,
    pub sky: SkyState,
    pub palette: Palette,
    pub vid: VidDef,
    pub vsync_active: bool,
    pub config: RendererConfig,
}

impl RendererState {
    pub fn new(
        mut ri: Box<dyn RefImport + Send>,
        gpu: Box<dyn Gx2Device + Send>,
        config: RendererConfig,
    ) -> Self {
        let cvars = RendererCvars::register(ri.as_mut());
        Self {
            gfx: Gfx::new(gpu, &config),
            ri,
            cvars,
            models: ModelRegistry::default(),
            frame: FrameState::default(),
            chains: SurfaceChains::default(),
            sky: SkyState::default(),
            palette: Palette::default(),
            vid: VidDef { width: 0, height: 0 },
            vsync_active: false,
            config,
        }
    }

    pub fn printf(&mut self, level: q2wiiu_common::q_shared::PrintLevel, msg: &str) {
        self.ri.con_printf(level, msg);
    }
}
