//! Services the host provides to the renderer
//!
//! [`RefImport`] is everything the renderer calls back into: error and
//! console output, cvars, file and asset loading, the drawable size.
//! [`HostImports`] is a self-contained implementation backed by an
//! in-memory file system and a [`CvarContext`].

use parking_lot::Mutex;
use q2wiiu_common::cvar::{CvarContext, CvarFlags, CvarId};
use q2wiiu_common::q_shared::{ErrorLevel, ImageType, PrintLevel};
use std::collections::HashMap;
use std::sync::Arc;

use crate::wiiu_model_types::ModelData;

/// A decoded image in RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let rgba = rgba.repeat((width * height) as usize);
        Self { width, height, rgba }
    }
}

pub trait RefImport {
    fn sys_error(&mut self, level: ErrorLevel, msg: &str);
    fn con_printf(&mut self, level: PrintLevel, msg: &str);

    fn cvar_get(&mut self, name: &str, value: &str, flags: CvarFlags) -> CvarId;
    fn cvar_set(&mut self, name: &str, value: &str);
    fn cvar_set_value(&mut self, name: &str, value: f32);
    fn cvar_value(&self, id: CvarId) -> f32;
    fn cvar_string(&self, id: CvarId) -> String;
    /// Returns and clears the modified flag.
    fn cvar_take_modified(&mut self, id: CvarId) -> bool;

    fn load_file(&mut self, path: &str) -> Option<Vec<u8>>;
    fn load_image(&mut self, name: &str, ty: ImageType) -> Option<ImageData>;
    fn load_model(&mut self, name: &str) -> Option<ModelData>;
    /// 256 RGB triplets of the game palette.
    fn load_palette(&mut self) -> Option<Vec<u8>>;

    /// `None` lets the renderer use the TV scan buffer size.
    fn drawable_size(&self) -> Option<(i32, i32)>;
    fn vid_menu_init(&mut self);
}

#[derive(Debug, Default)]
pub struct HostState {
    pub cvars: CvarContext,
    pub files: HashMap<String, Vec<u8>>,
    pub images: HashMap<String, ImageData>,
    pub models: HashMap<String, ModelData>,
    pub palette: Option<Vec<u8>>,
    pub drawable: Option<(i32, i32)>,
    pub printed: Vec<String>,
    pub errors: Vec<(ErrorLevel, String)>,
}

/// In-memory host. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct HostImports {
    state: Arc<Mutex<HostState>>,
}

impl HostImports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cvars(cvars: CvarContext) -> Self {
        let host = Self::default();
        host.state.lock().cvars = cvars;
        host
    }

    pub fn add_file(&self, path: &str, data: Vec<u8>) {
        self.state.lock().files.insert(path.to_string(), data);
    }

    pub fn remove_file(&self, path: &str) {
        self.state.lock().files.remove(path);
    }

    /// A minimal GFD stand-in for every program under `dir`.
    pub fn add_default_shaders(&self, dir: &str) {
        for kind in crate::wiiu_shaders::ProgramKind::ALL {
            self.add_file(&format!("{}/{}.gsh", dir, kind.name()), b"Gfx2".to_vec());
        }
    }

    pub fn add_image(&self, name: &str, image: ImageData) {
        self.state.lock().images.insert(name.to_string(), image);
    }

    pub fn add_model(&self, name: &str, model: ModelData) {
        self.state.lock().models.insert(name.to_string(), model);
    }

    pub fn set_palette(&self, palette: Vec<u8>) {
        self.state.lock().palette = Some(palette);
    }

    pub fn set_drawable(&self, size: Option<(i32, i32)>) {
        self.state.lock().drawable = size;
    }

    pub fn set_cvar(&self, name: &str, value: &str) {
        self.state.lock().cvars.set(name, value);
    }

    pub fn cvar_str(&self, name: &str) -> String {
        self.state.lock().cvars.variable_string(name).to_string()
    }

    pub fn printed(&self) -> Vec<String> {
        self.state.lock().printed.clone()
    }

    pub fn errors(&self) -> Vec<(ErrorLevel, String)> {
        self.state.lock().errors.clone()
    }
}

impl RefImport for HostImports {
    fn sys_error(&mut self, level: ErrorLevel, msg: &str) {
        log::error!("{}", msg);
        self.state.lock().errors.push((level, msg.to_string()));
    }

    fn con_printf(&mut self, level: PrintLevel, msg: &str) {
        if level == PrintLevel::Developer {
            log::debug!("{}", msg.trim_end());
        }
        self.state.lock().printed.push(msg.to_string());
    }

    fn cvar_get(&mut self, name: &str, value: &str, flags: CvarFlags) -> CvarId {
        self.state.lock().cvars.get(name, value, flags)
    }

    fn cvar_set(&mut self, name: &str, value: &str) {
        self.state.lock().cvars.set(name, value);
    }

    fn cvar_set_value(&mut self, name: &str, value: f32) {
        self.state.lock().cvars.set_value(name, value);
    }

    fn cvar_value(&self, id: CvarId) -> f32 {
        self.state.lock().cvars.cvar(id).map_or(0.0, |c| c.value)
    }

    fn cvar_string(&self, id: CvarId) -> String {
        self.state.lock().cvars.cvar(id).map(|c| c.string.clone()).unwrap_or_default()
    }

    fn cvar_take_modified(&mut self, id: CvarId) -> bool {
        self.state.lock().cvars.take_modified(id)
    }

    fn load_file(&mut self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    fn load_image(&mut self, name: &str, _ty: ImageType) -> Option<ImageData> {
        self.state.lock().images.get(name).cloned()
    }

    fn load_model(&mut self, name: &str) -> Option<ModelData> {
        self.state.lock().models.get(name).cloned()
    }

    fn load_palette(&mut self) -> Option<Vec<u8>> {
        self.state.lock().palette.clone()
    }

    fn drawable_size(&self) -> Option<(i32, i32)> {
        self.state.lock().drawable
    }

    fn vid_menu_init(&mut self) {}
}
