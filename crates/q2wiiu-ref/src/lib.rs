// GX2 refresh module: the Wii U rendering backend behind refexport_t

pub mod error;
pub mod gx2;
pub mod refexport;
pub mod refimport;
pub mod wiiu_display;
pub mod wiiu_draw;
pub mod wiiu_dynbuffers;
pub mod wiiu_image;
pub mod wiiu_light;
pub mod wiiu_local;
pub mod wiiu_main;
pub mod wiiu_mesh;
pub mod wiiu_model;
pub mod wiiu_model_types;
pub mod wiiu_shaders;
pub mod wiiu_state;
pub mod wiiu_surf;
pub mod wiiu_uniforms;
pub mod wiiu_vis;
pub mod wiiu_warp;

#[cfg(test)]
mod testutil;

pub use error::{RefError, RefResult};
pub use gx2::{CommandRecorder, Gx2Device};
pub use refexport::{get_ref_api, RefExport, API_VERSION};
pub use refimport::{HostImports, RefImport};
