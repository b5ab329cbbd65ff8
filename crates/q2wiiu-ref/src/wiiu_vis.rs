// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_vis.rs: PVS marking, frustum and box culling

use q2wiiu_common::q_shared::{
    box_on_plane_side, dot_product, rotate_point_around_vector, CPlane, RefDef, Vec3, PLANE_ANYZ,
};

use crate::wiiu_local::{FrameState, RendererState};
use crate::wiiu_model_types::{BrushModel, NodeRef};

/// Diagnostics for the last `mark_leaves`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisStats {
    /// PVS rows decompressed.
    pub pvs_fetches: u32,
    /// Rows OR-ed into another row.
    pub unions: u32,
    /// Leaves whose cluster was visible.
    pub markings: u32,
}

/// Expand a run-length encoded PVS row. A zero byte is followed by the
/// number of zero bytes it stands for.
pub fn decompress_vis(input: &[u8], row: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(row);
    let mut i = 0;
    while out.len() < row && i < input.len() {
        if input[i] != 0 {
            out.push(input[i]);
            i += 1;
            continue;
        }
        let run = input.get(i + 1).copied().unwrap_or(0) as usize;
        i += 2;
        out.resize((out.len() + run).min(row), 0);
    }
    out.resize(row, 0);
    out
}

impl BrushModel {
    fn vis_row_len(&self) -> usize {
        self.vis.as_ref().map_or(0, |v| (v.numclusters + 7) >> 3)
    }

    /// Visible set of `cluster`. Everything is visible for cluster -1 or
    /// a map without vis data.
    pub fn cluster_pvs(&self, cluster: i32) -> Vec<u8> {
        let Some(vis) = &self.vis else {
            let leaves = self.leafs.len().max(1);
            return vec![0xff; (leaves + 7) >> 3];
        };
        let row = self.vis_row_len();
        match usize::try_from(cluster).ok().and_then(|c| vis.bitofs.get(c)) {
            Some(&ofs) => decompress_vis(vis.data.get(ofs..).unwrap_or(&[]), row),
            None => vec![0xff; row],
        }
    }

    /// Leaf containing `p`.
    pub fn point_in_leaf(&self, p: &Vec3) -> Option<u32> {
        let mut node = self.root()?;
        loop {
            match node {
                NodeRef::Leaf(l) => return Some(l),
                NodeRef::Node(n) => {
                    let n = &self.nodes[n as usize];
                    let plane = &self.planes[n.plane as usize];
                    let d = dot_product(p, &plane.normal) - plane.dist;
                    node = n.child(if d > 0.0 { 0 } else { 1 })?;
                }
            }
        }
    }

    /// Stamp a leaf and its ancestors up to the first one already in
    /// generation `visframe`.
    fn mark_up(&mut self, leaf: u32, visframe: u64) {
        let l = &mut self.leafs[leaf as usize];
        if l.visframe == visframe {
            return;
        }
        l.visframe = visframe;
        let mut parent = l.parent;
        while let Some(n) = parent {
            let node = &mut self.nodes[n as usize];
            if node.visframe == visframe {
                break;
            }
            node.visframe = visframe;
            parent = node.parent;
        }
    }

    fn mark_all(&mut self, visframe: u64) {
        for leaf in &mut self.leafs {
            leaf.visframe = visframe;
        }
        for node in &mut self.nodes {
            node.visframe = visframe;
        }
    }
}

/// Stamp every leaf and node visible from the frame's view clusters.
/// Unchanged clusters leave the previous stamps in place.
#[allow(clippy::needless_range_loop)] // mark_up borrows the world mutably
pub fn mark_leaves(world: &mut BrushModel, frame: &mut FrameState, novis: bool, lockpvs: bool) {
    if frame.oldviewcluster == frame.viewcluster
        && frame.oldviewcluster2 == frame.viewcluster2
        && !novis
        && frame.viewcluster != -1
    {
        return;
    }

    // development aid to let you run around and see exactly where
    // the pvs ends
    if lockpvs {
        return;
    }

    frame.visframecount += 1;
    frame.oldviewcluster = frame.viewcluster;
    frame.oldviewcluster2 = frame.viewcluster2;
    frame.vis_stats = VisStats::default();
    let visframe = frame.visframecount;

    if novis || frame.viewcluster == -1 || world.vis.is_none() {
        world.mark_all(visframe);
        return;
    }

    let mut vis = world.cluster_pvs(frame.viewcluster);
    frame.vis_stats.pvs_fetches += 1;

    // may have to combine two clusters because of solid water boundaries
    if frame.viewcluster2 != frame.viewcluster {
        let other = world.cluster_pvs(frame.viewcluster2);
        frame.vis_stats.pvs_fetches += 1;
        for (a, b) in vis.iter_mut().zip(&other) {
            *a |= b;
        }
        frame.vis_stats.unions += 1;
    }

    for i in 0..world.leafs.len() {
        let cluster = world.leafs[i].cluster;
        if cluster == -1 {
            continue;
        }
        let c = cluster as usize;
        if vis.get(c >> 3).map_or(false, |b| b & (1 << (c & 7)) != 0) {
            frame.vis_stats.markings += 1;
            world.mark_up(i as u32, visframe);
        }
    }
}

/// Build the four side planes of the view frustum.
pub fn set_frustum(frame: &mut FrameState) {
    let fov_x = frame.refdef.fov_x;
    let fov_y = frame.refdef.fov_y;
    let normals = [
        // rotate VPN right by FOV_X/2 degrees
        rotate_point_around_vector(&frame.vup, &frame.vpn, -(90.0 - fov_x / 2.0)),
        // rotate VPN left by FOV_X/2 degrees
        rotate_point_around_vector(&frame.vup, &frame.vpn, 90.0 - fov_x / 2.0),
        // rotate VPN up by FOV_Y/2 degrees
        rotate_point_around_vector(&frame.vright, &frame.vpn, 90.0 - fov_y / 2.0),
        // rotate VPN down by FOV_Y/2 degrees
        rotate_point_around_vector(&frame.vright, &frame.vpn, -(90.0 - fov_y / 2.0)),
    ];
    for (plane, normal) in frame.frustum.iter_mut().zip(normals) {
        *plane = CPlane::new(normal, dot_product(&frame.origin, &normal));
        plane.plane_type = PLANE_ANYZ;
    }
}

/// True if the box is completely outside the frustum.
pub fn cull_box(frustum: &[CPlane; 4], mins: &Vec3, maxs: &Vec3) -> bool {
    frustum.iter().any(|p| box_on_plane_side(mins, maxs, p) == 2)
}

/// Area test against the view's area bits.
pub fn area_visible(refdef: &RefDef, area: i32) -> bool {
    refdef.area_visible(area)
}

impl RendererState {
    pub fn mark_leaves(&mut self) {
        let novis = self.cvars.r_novis.is_set();
        let lockpvs = self.cvars.r_lockpvs.is_set();
        if let Some(world) = self.models.world.as_mut() {
            mark_leaves(world, &mut self.frame, novis, lockpvs);
        }
    }

    /// `cull_box` honouring r_cull.
    pub fn cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        if !self.cvars.r_cull.is_set() {
            return false;
        }
        cull_box(&self.frame.frustum, mins, maxs)
    }
}
