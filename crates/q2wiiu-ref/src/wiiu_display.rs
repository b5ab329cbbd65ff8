//! Scan buffers and presentation
//!
//! The TV buffer is the render target for the whole frame. At the end of
//! the frame it is optionally copied onto the gamepad screen (DRC) with a
//! full-screen strip, then both scan buffers are swapped.

use crate::error::RefResult;
use crate::gx2::{PrimitiveMode, ScanTarget};
use crate::wiiu_local::{FramePhase, RendererState};
use crate::wiiu_shaders::ProgramKind;

/// Clip-space strip covering the screen, `[x y s t]` per vertex.
#[rustfmt::skip]
const DRC_COPY_STRIP: [f32; 16] = [
     1.0,  1.0, 1.0, 0.0,
     1.0, -1.0, 1.0, 1.0,
    -1.0,  1.0, 0.0, 0.0,
    -1.0, -1.0, 0.0, 1.0,
];

impl RendererState {
    pub fn end_frame(&mut self) -> RefResult<()> {
        self.gfx.gpu.finish_render(ScanTarget::Tv);

        if self.cvars.wiiu_drc.is_set() {
            self.copy_to_drc()?;
        }

        self.gfx.gpu.swap_scan_buffers();
        self.gfx.gpu.flush();
        self.frame.phase = FramePhase::Idle;
        Ok(())
    }

    fn copy_to_drc(&mut self) -> RefResult<()> {
        let gfx = &mut self.gfx;
        gfx.gpu.begin_render(ScanTarget::Drc);
        gfx.enable_depth_test(false);
        gfx.enable_cull_face(false);
        gfx.enable_blend(false);

        gfx.use_program(ProgramKind::DrcCopy)?;
        let tv = gfx.gpu.tv_color_texture();
        let sampler = gfx.samplers.two_d;
        gfx.bind_raw(tv, sampler);

        let slice = gfx.arenas.attribute.write_f32s(&DRC_COPY_STRIP)?;
        gfx.gpu.set_attrib_buffer(0, gfx.arenas.attribute.bytes(slice), 4 * 4);
        gfx.gpu.draw(PrimitiveMode::TriangleStrip, 4);

        gfx.gpu.finish_render(ScanTarget::Drc);
        Ok(())
    }

    /// Apply `r_vsync` to the swap interval.
    pub fn set_vsync(&mut self) {
        let on = self.cvars.r_vsync.is_set();
        self.gfx.gpu.set_swap_interval(u32::from(on));
        self.vsync_active = on;
    }

    pub fn is_vsync_active(&self) -> bool {
        self.vsync_active
    }

    /// The scan buffers are set up by the host; nothing to prepare.
    pub fn prepare_for_window(&mut self) -> i32 {
        0
    }

    pub fn init_context(&mut self) -> bool {
        log::debug!("gx2 context is owned by the host");
        true
    }

    pub fn shutdown_context(&mut self) {
        if let Some((texture, _, _)) = self.gfx.raw_texture.take() {
            self.gfx.gpu.destroy_texture(texture);
        }
    }

    /// Size of the 3D render target. The host may override the TV size.
    pub fn get_drawable_size(&self) -> (i32, i32) {
        self.ri.drawable_size().unwrap_or_else(|| {
            let (w, h) = self.gfx.gpu.scan_size(ScanTarget::Tv);
            (w as i32, h as i32)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gx2::Gx2Command;
    use crate::testutil::renderer;

    // ============================================================
    // Present
    // ============================================================

    #[test]
    fn test_end_frame_copies_to_drc() {
        let (mut rs, _host, rec) = renderer();
        rs.begin_frame().unwrap();
        rec.clear();
        rs.end_frame().unwrap();

        let cmds = rec.commands();
        let pos = |want: &Gx2Command| cmds.iter().position(|c| c == want).unwrap();
        let tv_done = pos(&Gx2Command::FinishRender(ScanTarget::Tv));
        let drc_begin = pos(&Gx2Command::BeginRender(ScanTarget::Drc));
        let drc_done = pos(&Gx2Command::FinishRender(ScanTarget::Drc));
        let swap = pos(&Gx2Command::SwapScanBuffers);
        assert!(tv_done < drc_begin && drc_begin < drc_done && drc_done < swap);
        assert_eq!(cmds.last(), Some(&Gx2Command::Flush));

        assert_eq!(rs.gfx.state.current_program, Some(ProgramKind::DrcCopy));
        assert!(cmds.contains(&Gx2Command::Draw { mode: PrimitiveMode::TriangleStrip, count: 4 }));
        assert!(!rs.gfx.state.depth_test());
        assert!(!rs.gfx.state.blend());
        assert_eq!(rs.frame.phase, FramePhase::Idle);
    }

    #[test]
    fn test_end_frame_without_drc() {
        let (mut rs, host, rec) = renderer();
        host.set_cvar("wiiu_drc", "0");
        rs.begin_frame().unwrap();
        rec.clear();
        rs.end_frame().unwrap();
        assert_eq!(
            rec.commands(),
            vec![Gx2Command::FinishRender(ScanTarget::Tv), Gx2Command::SwapScanBuffers, Gx2Command::Flush]
        );
    }

    // ============================================================
    // Vsync and sizes
    // ============================================================

    #[test]
    fn test_vsync_follows_cvar() {
        let (mut rs, host, rec) = renderer();
        assert!(rs.is_vsync_active());

        host.set_cvar("r_vsync", "0");
        rec.clear();
        rs.begin_frame().unwrap();
        assert!(!rs.is_vsync_active());
        assert!(rec.commands().contains(&Gx2Command::SwapInterval(0)));

        // unchanged cvar leaves the interval alone
        rec.clear();
        rs.begin_frame().unwrap();
        assert!(!rec.commands().iter().any(|c| matches!(c, Gx2Command::SwapInterval(_))));
    }

    #[test]
    fn test_drawable_size() {
        let (rs, host, _rec) = renderer();
        assert_eq!(rs.get_drawable_size(), (1280, 720));
        host.set_drawable(Some((1920, 1080)));
        assert_eq!(rs.get_drawable_size(), (1920, 1080));
    }

    #[test]
    fn test_context_hooks() {
        let (mut rs, _host, rec) = renderer();
        assert_eq!(rs.prepare_for_window(), 0);
        assert!(rs.init_context());

        rs.draw_stretch_raw(0, 0, 64, 64, 2, 2, &[0; 4], 8).unwrap();
        rec.clear();
        rs.shutdown_context();
        assert!(rs.gfx.raw_texture.is_none());
        assert!(matches!(rec.commands().as_slice(), [Gx2Command::DestroyTexture(_)]));
    }
}
