// Fixtures shared by the unit tests.

use q2wiiu_common::config::RendererConfig;
use q2wiiu_common::q_shared::{CPlane, ImageHandle, SurfFlags, Vec3, CONTENTS_SOLID};

use crate::gx2::CommandRecorder;
use crate::refimport::{HostImports, ImageData};
use crate::wiiu_local::RendererState;
use crate::wiiu_model_types::*;

pub fn quad(points: [Vec3; 4]) -> GlPoly {
    let vertices = points
        .iter()
        .map(|p| Vertex3D::new(*p, [p[1] / 64.0, p[2] / 64.0], [0.5, 0.5]))
        .collect();
    GlPoly { vertices }
}

fn texinfo(texture: &str, flags: SurfFlags) -> MTexInfo {
    MTexInfo {
        vecs: [[0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]],
        flags,
        numframes: 1,
        next: None,
        texture: texture.to_string(),
        image: ImageHandle(0),
    }
}

/// Texinfo slots of [`box_world`].
pub const TI_WALL: u32 = 0;
pub const TI_GLASS: u32 = 1;
pub const TI_SKY: u32 = 2;
pub const TI_WINDOW: u32 = 3;

/// A two-node world.
///
/// ```text
///            node0 (x = 0)         surfaces 0 wall, 1 trans33, 2 sky
///           /             \
///      node1 (y = 0)     leaf0 (x < 0, cluster 0, area 0)
///      /          \                surfaces 3 wall, 4 trans66
///  leaf1 (y > 0)  leaf2 (y < 0)
///  cluster 1      cluster 2
/// ```
///
/// Leaf 3 is solid. Surface 5 belongs to inline model 1 (a floor
/// plate), surface 6 to inline model 2 (a warp plate).
pub fn box_world() -> BrushModel {
    let planes = vec![
        CPlane::new([1.0, 0.0, 0.0], 0.0),
        CPlane::new([0.0, 1.0, 0.0], 0.0),
        CPlane::new([0.0, 0.0, 1.0], 0.0),
    ];

    let nodes = vec![
        MNode {
            plane: 0,
            children: [Some(NodeRef::Node(1)), Some(NodeRef::Leaf(0))],
            minmaxs: [-512.0, -512.0, -512.0, 512.0, 512.0, 512.0],
            parent: None,
            visframe: 0,
            firstsurface: 0,
            numsurfaces: 3,
        },
        MNode {
            plane: 1,
            children: [Some(NodeRef::Leaf(1)), Some(NodeRef::Leaf(2))],
            minmaxs: [0.0, -512.0, -512.0, 512.0, 512.0, 512.0],
            parent: Some(0),
            visframe: 0,
            firstsurface: 3,
            numsurfaces: 2,
        },
    ];

    let leaf = |cluster, area, minmaxs, parent, first, num| MLeaf {
        contents: 0,
        cluster,
        area,
        minmaxs,
        parent: Some(parent),
        visframe: 0,
        firstmarksurface: first,
        nummarksurfaces: num,
    };
    let mut leafs = vec![
        leaf(0, 0, [-512.0, -512.0, -512.0, 0.0, 512.0, 512.0], 0, 0, 3),
        leaf(1, 1, [0.0, 0.0, -512.0, 512.0, 512.0, 512.0], 1, 3, 5),
        leaf(2, 1, [0.0, -512.0, -512.0, 512.0, 0.0, 512.0], 1, 8, 2),
    ];
    leafs.push(MLeaf { contents: CONTENTS_SOLID, cluster: -1, parent: None, ..Default::default() });

    let texinfo = vec![
        texinfo("e1u1/wall", SurfFlags::empty()),
        texinfo("e1u1/glass", SurfFlags::TRANS33),
        texinfo("e1u1/sky", SurfFlags::SKY),
        texinfo("e1u1/window", SurfFlags::TRANS66),
        texinfo("e1u1/water", SurfFlags::WARP),
    ];

    let wall_x = quad([[0.0, -64.0, -64.0], [0.0, 64.0, -64.0], [0.0, 64.0, 64.0], [0.0, -64.0, 64.0]]);
    let wall_y = quad([[-64.0, 0.0, -64.0], [64.0, 0.0, -64.0], [64.0, 0.0, 64.0], [-64.0, 0.0, 64.0]]);
    let plate = quad([[-32.0, -32.0, 0.0], [32.0, -32.0, 0.0], [32.0, 32.0, 0.0], [-32.0, 32.0, 0.0]]);

    let surf = |plane, ti: u32, poly: &GlPoly, tis: &[MTexInfo]| {
        let mut s = MSurface::new(plane, ti, SurfaceKind::from_flags(tis[ti as usize].flags), vec![poly.clone()]);
        s.lightmap = 0;
        s
    };
    let surfaces = vec![
        surf(0, TI_WALL, &wall_x, &texinfo),
        surf(0, TI_GLASS, &wall_x, &texinfo),
        surf(0, TI_SKY, &wall_x, &texinfo),
        surf(1, TI_WALL, &wall_y, &texinfo),
        surf(1, TI_WINDOW, &wall_y, &texinfo),
        surf(2, TI_WALL, &plate, &texinfo),
        surf(2, 4, &plate, &texinfo),
    ];

    let vis = VisData {
        numclusters: 3,
        bitofs: vec![0, 1, 2],
        // 0 sees {0,1}, 1 sees {0,1}, 2 sees {1,2}
        data: vec![0b011, 0b011, 0b110],
    };

    let submodels = vec![
        SubModel {
            mins: [-512.0; 3],
            maxs: [512.0; 3],
            origin: [0.0; 3],
            radius: 887.0,
            headnode: 0,
            firstface: 0,
            numfaces: 5,
        },
        SubModel {
            mins: [-32.0, -32.0, -8.0],
            maxs: [32.0, 32.0, 8.0],
            origin: [0.0; 3],
            radius: 46.0,
            headnode: 0,
            firstface: 5,
            numfaces: 1,
        },
        SubModel {
            mins: [-32.0, -32.0, -8.0],
            maxs: [32.0, 32.0, 8.0],
            origin: [0.0; 3],
            radius: 46.0,
            headnode: 0,
            firstface: 6,
            numfaces: 1,
        },
    ];

    BrushModel {
        planes,
        nodes,
        leafs,
        surfaces,
        marksurfaces: vec![0, 1, 2, 0, 1, 2, 3, 4, 3, 4],
        texinfo,
        vis: Some(vis),
        lightdata: Vec::new(),
        submodels,
        lightmap_pages: vec![LightmapPage { width: 4, height: 4, rgba: vec![255; 64] }],
    }
}

/// Host with every shader, the box world and its textures.
pub fn host() -> HostImports {
    let _ = env_logger::builder().is_test(true).try_init();
    let host = HostImports::new();
    host.add_default_shaders("shaders");
    for name in ["wall", "glass", "sky", "window", "water"] {
        host.add_image(
            &format!("textures/e1u1/{}.wal", name),
            ImageData::solid(16, 16, [128, 128, 128, 255]),
        );
    }
    host.add_image("pics/conchars.pcx", ImageData::solid(128, 128, [255, 255, 255, 255]));
    host.add_model("maps/box.bsp", ModelData::Brush(box_world()));
    host
}

/// A renderer over a recording device and [`host`], already initialised.
pub fn renderer() -> (RendererState, HostImports, CommandRecorder) {
    let rec = CommandRecorder::default();
    let host = host();
    let mut rs = RendererState::new(Box::new(host.clone()), Box::new(rec.clone()), RendererConfig::default());
    assert!(rs.init());
    (rs, host, rec)
}

/// [`renderer`] with the box world registered.
pub fn renderer_with_world() -> (RendererState, HostImports, CommandRecorder) {
    let (mut rs, host, rec) = renderer();
    rs.begin_registration("box").unwrap();
    rs.end_registration();
    (rs, host, rec)
}
