// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_model_types.rs: in-memory world, alias and sprite models
//
// The BSP is decoded by the host. Cross references are indices into the
// owning model's vectors; the renderer only writes frame stamps.

use bytemuck::{Pod, Zeroable};
use q2wiiu_common::q_shared::{CPlane, ImageHandle, SurfFlags, Vec3};

pub const MAXLIGHTMAPS: usize = 4;
/// Lightmap pages the world may use.
pub const MAX_LIGHTMAPS: usize = 4;
pub const BLOCK_WIDTH: u32 = 1024;
pub const BLOCK_HEIGHT: u32 = 512;

pub const SIDE_FRONT: usize = 0;
pub const SIDE_BACK: usize = 1;

bitflags::bitflags! {
    /// Per-surface draw flags derived at load time.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DrawFlags: u32 {
        const PLANEBACK = 0x2;
        const DRAWSKY   = 0x4;
        const DRAWTURB  = 0x10;
    }
}

// ============================================================================
// Vertex formats
// ============================================================================

/// One world/brush vertex as the 3D programs fetch it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex3D {
    pub pos: [f32; 3],
    pub tex_coord: [f32; 2],
    pub lm_tex_coord: [f32; 2],
    pub normal: [f32; 3],
    /// Bit i set: dynamic light i touches this surface.
    pub light_flags: u32,
}

impl Vertex3D {
    pub fn new(pos: Vec3, st: [f32; 2], lm: [f32; 2]) -> Self {
        Self { pos, tex_coord: st, lm_tex_coord: lm, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlPoly {
    pub vertices: Vec<Vertex3D>,
}

// ============================================================================
// Brush models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Node(u32),
    Leaf(u32),
}

#[derive(Debug, Clone, Default)]
pub struct MNode {
    pub plane: u32,
    pub children: [Option<NodeRef>; 2],
    pub minmaxs: [f32; 6],
    pub parent: Option<u32>,
    /// PVS generation this node was last marked in.
    pub visframe: u64,
    pub firstsurface: u32,
    pub numsurfaces: u32,
}

impl MNode {
    pub fn child(&self, side: usize) -> Option<NodeRef> {
        self.children[side]
    }
}

#[derive(Debug, Clone, Default)]
pub struct MLeaf {
    pub contents: i32,
    pub cluster: i32,
    pub area: i32,
    pub minmaxs: [f32; 6],
    pub parent: Option<u32>,
    pub visframe: u64,
    pub firstmarksurface: u32,
    pub nummarksurfaces: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alpha {
    Alpha33,
    Alpha66,
}

impl Alpha {
    pub fn value(self) -> f32 {
        match self {
            Alpha::Alpha33 => 0.333,
            Alpha::Alpha66 => 0.666,
        }
    }
}

/// How a surface is drawn, fixed once its texinfo is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Opaque { flowing: bool },
    Translucent { alpha: Alpha, flowing: bool, warp: bool },
    Sky,
    Warp { flowing: bool },
}

impl SurfaceKind {
    pub fn from_flags(flags: SurfFlags) -> Self {
        let flowing = flags.contains(SurfFlags::FLOWING);
        let warp = flags.contains(SurfFlags::WARP);
        if flags.contains(SurfFlags::SKY) {
            SurfaceKind::Sky
        } else if flags.intersects(SurfFlags::TRANS33 | SurfFlags::TRANS66) {
            let alpha = if flags.contains(SurfFlags::TRANS33) {
                Alpha::Alpha33
            } else {
                Alpha::Alpha66
            };
            SurfaceKind::Translucent { alpha, flowing, warp }
        } else if warp {
            SurfaceKind::Warp { flowing }
        } else {
            SurfaceKind::Opaque { flowing }
        }
    }

    pub fn is_flowing(self) -> bool {
        match self {
            SurfaceKind::Opaque { flowing }
            | SurfaceKind::Translucent { flowing, .. }
            | SurfaceKind::Warp { flowing } => flowing,
            SurfaceKind::Sky => false,
        }
    }

    pub fn is_translucent(self) -> bool {
        matches!(self, SurfaceKind::Translucent { .. })
    }
}

#[derive(Debug, Clone)]
pub struct MTexInfo {
    pub vecs: [[f32; 4]; 2],
    pub flags: SurfFlags,
    pub numframes: u32,
    /// Animation chain.
    pub next: Option<u32>,
    pub texture: String,
    pub image: ImageHandle,
}

#[derive(Debug, Clone)]
pub struct MSurface {
    pub plane: u32,
    pub flags: DrawFlags,
    pub texinfo: u32,
    pub kind: SurfaceKind,
    /// One poly, or several after warp subdivision.
    pub polys: Vec<GlPoly>,

    pub texturemins: [i16; 2],
    pub extents: [i16; 2],
    pub light_s: i32,
    pub light_t: i32,

    pub lightmap: u32,
    pub styles: [u8; MAXLIGHTMAPS],
    /// Offset into the model's lightdata.
    pub samples: Option<usize>,

    /// Frame this surface was last reached in.
    pub visframe: u64,
    pub dlightframe: u64,
    pub dlightbits: u32,
}

impl MSurface {
    pub fn new(plane: u32, texinfo: u32, kind: SurfaceKind, polys: Vec<GlPoly>) -> Self {
        let mut flags = DrawFlags::empty();
        match kind {
            SurfaceKind::Sky => flags |= DrawFlags::DRAWSKY,
            SurfaceKind::Warp { .. } | SurfaceKind::Translucent { warp: true, .. } => {
                flags |= DrawFlags::DRAWTURB
            }
            _ => {}
        }
        Self {
            plane,
            flags,
            texinfo,
            kind,
            polys,
            texturemins: [0; 2],
            extents: [16; 2],
            light_s: 0,
            light_t: 0,
            lightmap: 0,
            styles: [0, 255, 255, 255],
            samples: None,
            visframe: 0,
            dlightframe: 0,
            dlightbits: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub radius: f32,
    pub headnode: u32,
    pub firstface: u32,
    pub numfaces: u32,
}

/// Compressed cluster-to-cluster visibility.
#[derive(Debug, Clone, Default)]
pub struct VisData {
    pub numclusters: usize,
    /// Per cluster: offset of its PVS row in `data`.
    pub bitofs: Vec<usize>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct LightmapPage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct BrushModel {
    pub planes: Vec<CPlane>,
    pub nodes: Vec<MNode>,
    pub leafs: Vec<MLeaf>,
    pub surfaces: Vec<MSurface>,
    pub marksurfaces: Vec<u32>,
    pub texinfo: Vec<MTexInfo>,
    pub vis: Option<VisData>,
    pub lightdata: Vec<u8>,
    pub submodels: Vec<SubModel>,
    pub lightmap_pages: Vec<LightmapPage>,
}

impl BrushModel {
    /// Root of the world tree.
    pub fn root(&self) -> Option<NodeRef> {
        if self.nodes.is_empty() {
            self.leafs.first().map(|_| NodeRef::Leaf(0))
        } else {
            Some(NodeRef::Node(0))
        }
    }

    pub fn minmaxs(&self, r: NodeRef) -> [f32; 6] {
        match r {
            NodeRef::Node(n) => self.nodes[n as usize].minmaxs,
            NodeRef::Leaf(l) => self.leafs[l as usize].minmaxs,
        }
    }

    pub fn visframe(&self, r: NodeRef) -> u64 {
        match r {
            NodeRef::Node(n) => self.nodes[n as usize].visframe,
            NodeRef::Leaf(l) => self.leafs[l as usize].visframe,
        }
    }

    /// Follow the texinfo animation chain `frame` steps.
    pub fn texture_animation(&self, texinfo: u32, frame: i32) -> ImageHandle {
        let mut tex = &self.texinfo[texinfo as usize];
        if tex.next.is_none() || tex.numframes <= 1 {
            return tex.image;
        }
        let mut c = frame.rem_euclid(tex.numframes as i32);
        while c > 0 {
            match tex.next {
                Some(n) => tex = &self.texinfo[n as usize],
                None => break,
            }
            c -= 1;
        }
        tex.image
    }
}

// ============================================================================
// Alias models
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AliasVert {
    pub pos: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct AliasFrame {
    pub name: String,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub verts: Vec<AliasVert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlCmdKind {
    Strip,
    Fan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlCmdVert {
    pub index: u32,
    pub s: f32,
    pub t: f32,
}

#[derive(Debug, Clone)]
pub struct GlCmd {
    pub kind: GlCmdKind,
    pub verts: Vec<GlCmdVert>,
}

#[derive(Debug, Clone, Default)]
pub struct AliasModel {
    pub frames: Vec<AliasFrame>,
    pub glcmds: Vec<GlCmd>,
    pub skin_names: Vec<String>,
    /// Resolved at registration.
    pub skins: Vec<Option<ImageHandle>>,
}

// ============================================================================
// Sprite models
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SpriteFrame {
    pub width: i32,
    pub height: i32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub name: String,
    pub image: Option<ImageHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct SpriteModel {
    pub frames: Vec<SpriteFrame>,
}

// ============================================================================
// Whole model
// ============================================================================

/// Decoded model data as handed over by the host.
#[derive(Debug, Clone)]
pub enum ModelData {
    Brush(BrushModel),
    Alias(AliasModel),
    Sprite(SpriteModel),
}

/// A registered brush model: submodel `submodel` of the current world.
#[derive(Debug, Clone, Copy)]
pub struct InlineModel {
    pub submodel: u32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,
    pub firstface: u32,
    pub numfaces: u32,
}

impl InlineModel {
    pub fn from_submodel(index: u32, sub: &SubModel) -> Self {
        Self {
            submodel: index,
            mins: sub.mins,
            maxs: sub.maxs,
            radius: sub.radius,
            firstface: sub.firstface,
            numfaces: sub.numfaces,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ModelKind {
    Brush(InlineModel),
    Alias(AliasModel),
    Sprite(SpriteModel),
}

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub registration_sequence: i32,
    pub kind: ModelKind,
}
