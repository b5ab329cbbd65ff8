// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// refexport.rs: the refresh export table handed to the engine

use parking_lot::Mutex;
use q2wiiu_common::config::RendererConfig;
use q2wiiu_common::q_shared::{ImageHandle, ModelHandle, RefDef, Vec3};

use crate::error::RefResult;
use crate::gx2::Gx2Device;
use crate::refimport::RefImport;
use crate::wiiu_local::RendererState;

pub const API_VERSION: i32 = 6;

/// refexport_t
///
/// Every entry point the engine calls. Errors never cross this boundary:
/// fatal ones go to the host's `sys_error`, the rest are logged.
pub struct RefExport {
    state: RendererState,
}

impl RefExport {
    pub fn api_version(&self) -> i32 {
        API_VERSION
    }

    pub fn state(&self) -> &RendererState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RendererState {
        &mut self.state
    }

    fn check<T>(&mut self, result: RefResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) if e.is_fatal() => {
                self.state.ri.sys_error(e.level(), &e.to_string());
                None
            }
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }

    pub fn init(&mut self) -> bool {
        self.state.init()
    }

    pub fn shutdown(&mut self) {
        self.state.shutdown();
    }

    pub fn prepare_for_window(&mut self) -> i32 {
        self.state.prepare_for_window()
    }

    pub fn init_context(&mut self) -> bool {
        self.state.init_context()
    }

    pub fn shutdown_context(&mut self) {
        self.state.shutdown_context();
    }

    pub fn is_vsync_active(&self) -> bool {
        self.state.is_vsync_active()
    }

    // ============================================================
    // Registration
    // ============================================================

    pub fn begin_registration(&mut self, map: &str) {
        let r = self.state.begin_registration(map);
        self.check(r);
    }

    pub fn register_model(&mut self, name: &str) -> Option<ModelHandle> {
        let r = self.state.register_model(name);
        self.check(r).flatten()
    }

    pub fn register_skin(&mut self, name: &str) -> Option<ImageHandle> {
        let r = self.state.register_skin(name);
        self.check(r).flatten()
    }

    pub fn draw_find_pic(&mut self, name: &str) -> Option<ImageHandle> {
        let r = self.state.draw_find_pic(name);
        self.check(r).flatten()
    }

    pub fn set_sky(&mut self, name: &str, rotate: f32, axis: &Vec3) {
        let r = self.state.set_sky(name, rotate, axis);
        self.check(r);
    }

    pub fn end_registration(&mut self) {
        self.state.end_registration();
    }

    // ============================================================
    // Frame
    // ============================================================

    pub fn begin_frame(&mut self) {
        let r = self.state.begin_frame();
        self.check(r);
    }

    pub fn render_frame(&mut self, refdef: &RefDef) {
        let r = self.state.render_frame(refdef);
        self.check(r);
    }

    pub fn end_frame(&mut self) {
        let r = self.state.end_frame();
        self.check(r);
    }

    // ============================================================
    // 2D
    // ============================================================

    pub fn draw_get_pic_size(&mut self, name: &str) -> (i32, i32) {
        let r = self.state.draw_get_pic_size(name);
        self.check(r).unwrap_or((-1, -1))
    }

    pub fn draw_pic(&mut self, x: i32, y: i32, name: &str, factor: f32) {
        let r = self.state.draw_pic(x, y, name, factor);
        self.check(r);
    }

    pub fn draw_stretch_pic(&mut self, x: i32, y: i32, w: i32, h: i32, name: &str) {
        let r = self.state.draw_stretch_pic(x, y, w, h, name);
        self.check(r);
    }

    pub fn draw_char(&mut self, x: i32, y: i32, num: i32, scale: f32) {
        let r = self.state.draw_char(x, y, num, scale);
        self.check(r);
    }

    pub fn draw_tile_clear(&mut self, x: i32, y: i32, w: i32, h: i32, name: &str) {
        let r = self.state.draw_tile_clear(x, y, w, h, name);
        self.check(r);
    }

    pub fn draw_fill(&mut self, x: i32, y: i32, w: i32, h: i32, c: i32) {
        let r = self.state.draw_fill(x, y, w, h, c);
        self.check(r);
    }

    pub fn draw_fade_screen(&mut self) {
        let r = self.state.draw_fade_screen();
        self.check(r);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_stretch_raw(&mut self, x: i32, y: i32, w: i32, h: i32, cols: u32, rows: u32, data: &[u8], bits: u32) {
        let r = self.state.draw_stretch_raw(x, y, w, h, cols, rows, data, bits);
        self.check(r);
    }

    pub fn set_palette(&mut self, palette: Option<&[u8]>) {
        self.state.set_palette(palette);
    }
}

/// GetRefAPI
pub fn get_ref_api(
    ri: Box<dyn RefImport + Send>,
    device: Box<dyn Gx2Device + Send>,
    config: RendererConfig,
) -> RefExport {
    RefExport { state: RendererState::new(ri, device, config) }
}

// ============================================================
// Process-wide refresh, for hosts that call in through free functions
// ============================================================

static REFRESH: Mutex<Option<RefExport>> = parking_lot::const_mutex(None);

/// Make `re` the process refresh. Returns the one it replaced.
pub fn install(re: RefExport) -> Option<RefExport> {
    REFRESH.lock().replace(re)
}

pub fn uninstall() -> Option<RefExport> {
    REFRESH.lock().take()
}

/// Run `f` against the installed refresh, if any.
pub fn with_refresh<R>(f: impl FnOnce(&mut RefExport) -> R) -> Option<R> {
    let mut guard = REFRESH.lock();
    Option::as_mut(&mut *guard).map(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gx2::{CommandRecorder, Gx2Command, ScanTarget};
    use crate::refimport::HostImports;
    use crate::testutil::host;
    use q2wiiu_common::q_shared::{ErrorLevel, RdFlags};

    fn export() -> (RefExport, HostImports, CommandRecorder) {
        let host = host();
        let rec = CommandRecorder::default();
        let mut re = get_ref_api(Box::new(host.clone()), Box::new(rec.clone()), RendererConfig::default());
        assert!(re.init());
        (re, host, rec)
    }

    fn view() -> RefDef {
        RefDef {
            width: 1280,
            height: 720,
            fov_x: 90.0,
            fov_y: 73.74,
            vieworg: [100.0, 100.0, 0.0],
            time: 1.0,
            ..Default::default()
        }
    }

    // ============================================================
    // Lifecycle
    // ============================================================

    #[test]
    fn test_api_version() {
        let (re, _host, _rec) = export();
        assert_eq!(re.api_version(), 6);
        assert!(re.is_vsync_active());
    }

    #[test]
    fn test_init_fails_without_shaders() {
        let host = host();
        let rec = CommandRecorder::default();
        rec.reject_shader("3d_lm");
        let mut re = get_ref_api(Box::new(host.clone()), Box::new(rec), RendererConfig::default());
        assert!(!re.init());
        assert!(host.printed().contains(&"Loading shaders failed.\n".to_string()));
    }

    #[test]
    fn test_full_frame() {
        let (mut re, host, rec) = export();
        re.begin_registration("box");
        assert!(re.draw_find_pic("conchars").is_some());
        re.end_registration();

        rec.clear();
        re.begin_frame();
        re.render_frame(&view());
        re.draw_char(8, 8, 'Q' as i32, 1.0);
        re.end_frame();

        let cmds = rec.commands();
        assert_eq!(cmds.first(), Some(&Gx2Command::BeginRender(ScanTarget::Tv)));
        assert!(cmds.contains(&Gx2Command::SwapScanBuffers));
        assert!(rec.draw_count() > 2);
        assert!(host.errors().is_empty());
    }

    // ============================================================
    // Error routing
    // ============================================================

    #[test]
    fn test_bad_fill_reaches_host() {
        let (mut re, host, _rec) = export();
        re.draw_fill(0, 0, 8, 8, 300);
        assert_eq!(host.errors(), vec![(ErrorLevel::Fatal, "Draw_Fill: bad color 300".to_string())]);
    }

    #[test]
    fn test_world_render_without_world_drops() {
        let (mut re, host, _rec) = export();
        re.begin_frame();
        re.render_frame(&view());
        assert_eq!(host.errors().len(), 1);
        assert_eq!(host.errors()[0].0, ErrorLevel::Drop);

        // a menu scene needs no world
        let mut menu = view();
        menu.rdflags = RdFlags::NOWORLDMODEL;
        re.render_frame(&menu);
        assert_eq!(host.errors().len(), 1);
    }

    #[test]
    fn test_missing_pic_size() {
        let (mut re, _host, _rec) = export();
        assert_eq!(re.draw_get_pic_size("nope"), (-1, -1));
        assert_eq!(re.register_model(""), None);
    }

    // ============================================================
    // Process-wide handle
    // ============================================================

    #[test]
    fn test_install_and_call() {
        let (re, _host, _rec) = export();
        assert!(install(re).is_none());
        assert_eq!(with_refresh(|re| re.api_version()), Some(API_VERSION));
        assert!(uninstall().is_some());
        assert_eq!(with_refresh(|re| re.api_version()), None);
    }
}
