//! Uniform blocks
//!
//! CPU-side copies of the uniform blocks the programs read. Each update
//! packs one block big-endian into a fresh uniform-arena slice and binds
//! it to its stage slots:
//!
//! | block       | stage/slot |
//! |-------------|------------|
//! | Common      | PS0        |
//! | 2D          | VS0        |
//! | 3D          | VS1 + PS1  |
//! | Lights      | PS2        |
//! | LM scales   | PS3        |
//! | PostProcess | PS4        |

use byteorder::{BigEndian, ByteOrder};
use glam::Mat4;
use q2wiiu_common::q_shared::{DLight, Vec3, MAX_DLIGHTS};

use crate::error::RefResult;
use crate::gx2::ShaderStage;
use crate::wiiu_local::Gfx;
use crate::wiiu_model_types::MAXLIGHTMAPS;

pub const UNI_COMMON_SIZE: u32 = 8 * 4;
pub const UNI_2D_SIZE: u32 = 16 * 4;
/// Two matrices, six scalars, two floats of padding.
pub const UNI_3D_SIZE: u32 = 40 * 4;
pub const UNI_DYN_LIGHT_SIZE: u32 = 8 * 4;
pub const UNI_LIGHTS_SIZE: u32 = UNI_DYN_LIGHT_SIZE * MAX_DLIGHTS as u32;
pub const UNI_LM_SCALES_SIZE: u32 = 4 * 4 * MAXLIGHTMAPS as u32;
pub const UNI_POSTPROCESS_SIZE: u32 = 5 * 4;

/// Shared by every program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniCommon {
    pub gamma: f32,
    pub intensity: f32,
    /// For HUD, menus etc.
    pub intensity_2d: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uni2D {
    pub trans_mat4: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uni3D {
    /// Projection times view, premultiplied on the CPU.
    pub trans_proj_view: Mat4,
    pub trans_model: Mat4,
    /// For flowing surfaces.
    pub scroll: f32,
    /// For warping surfaces like water.
    pub time: f32,
    pub alpha: f32,
    pub overbrightbits: f32,
    pub particle_fade_factor: f32,
    /// Warp surfaces have no lightmap; they are lit with this instead.
    pub light_scale_for_turb: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UniDynLight {
    pub origin: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl From<&DLight> for UniDynLight {
    fn from(dl: &DLight) -> Self {
        Self { origin: dl.origin, color: dl.color, intensity: dl.intensity }
    }
}

#[derive(Debug, Clone)]
pub struct Uniforms {
    pub common: UniCommon,
    pub two_d: Uni2D,
    pub three_d: Uni3D,
    pub lights: Vec<UniDynLight>,
}

impl Uniforms {
    pub fn new(
        vid_gamma: f32,
        intensity: f32,
        intensity_2d: f32,
        overbrightbits: f32,
        particle_fade_factor: f32,
    ) -> Self {
        Self {
            common: UniCommon {
                gamma: 1.0 / vid_gamma,
                intensity,
                intensity_2d,
                color: [1.0; 4],
            },
            two_d: Uni2D { trans_mat4: Mat4::ZERO },
            three_d: Uni3D {
                trans_proj_view: Mat4::ZERO,
                trans_model: Mat4::IDENTITY,
                scroll: 0.0,
                time: 0.0,
                alpha: 1.0,
                // 0 means "no scaling", the same as multiplying by 1
                overbrightbits: if overbrightbits <= 0.0 { 1.0 } else { overbrightbits },
                particle_fade_factor,
                light_scale_for_turb: 1.0,
            },
            lights: Vec::new(),
        }
    }
}

// ============================================================================
// Big-endian packing
// ============================================================================

fn put_f32s(dst: &mut [u8], at: usize, vals: &[f32]) {
    BigEndian::write_f32_into(vals, &mut dst[at * 4..(at + vals.len()) * 4]);
}

pub fn pack_common(c: &UniCommon, dst: &mut [u8]) {
    put_f32s(dst, 0, &[c.gamma, c.intensity, c.intensity_2d, 0.0]);
    put_f32s(dst, 4, &c.color);
}

pub fn pack_2d(u: &Uni2D, dst: &mut [u8]) {
    put_f32s(dst, 0, &u.trans_mat4.to_cols_array());
}

pub fn pack_3d(u: &Uni3D, dst: &mut [u8]) {
    put_f32s(dst, 0, &u.trans_proj_view.to_cols_array());
    put_f32s(dst, 16, &u.trans_model.to_cols_array());
    put_f32s(
        dst,
        32,
        &[
            u.scroll,
            u.time,
            u.alpha,
            u.overbrightbits,
            u.particle_fade_factor,
            u.light_scale_for_turb,
        ],
    );
}

/// Unused light slots stay zero.
pub fn pack_lights(lights: &[UniDynLight], dst: &mut [u8]) {
    for (i, l) in lights.iter().take(MAX_DLIGHTS).enumerate() {
        let base = i * (UNI_DYN_LIGHT_SIZE as usize / 4);
        put_f32s(dst, base, &l.origin);
        put_f32s(dst, base + 4, &l.color);
        put_f32s(dst, base + 7, &[l.intensity]);
    }
}

pub fn pack_lm_scales(scales: &[[f32; 4]; MAXLIGHTMAPS], dst: &mut [u8]) {
    for (i, s) in scales.iter().enumerate() {
        put_f32s(dst, i * 4, s);
    }
}

pub fn pack_post_process(time: f32, v_blend: &[f32; 4], dst: &mut [u8]) {
    put_f32s(dst, 0, v_blend);
    put_f32s(dst, 4, &[time]);
}

// ============================================================================
// Upload
// ============================================================================

impl Gfx {
    fn upload_block(
        &mut self,
        size: u32,
        bindings: &[(ShaderStage, u32)],
        fill: impl FnOnce(&mut [u8]),
    ) -> RefResult<()> {
        let slice = self.arenas.uniform.alloc(size)?;
        fill(self.arenas.uniform.bytes_mut(slice));
        let bytes = self.arenas.uniform.bytes(slice);
        for &(stage, slot) in bindings {
            self.gpu.set_uniform_block(stage, slot, bytes);
        }
        Ok(())
    }

    pub fn update_ubo_common(&mut self) -> RefResult<()> {
        let common = self.uniforms.common;
        self.upload_block(UNI_COMMON_SIZE, &[(ShaderStage::Pixel, 0)], |dst| {
            pack_common(&common, dst)
        })
    }

    pub fn update_ubo_2d(&mut self) -> RefResult<()> {
        let u = self.uniforms.two_d;
        self.upload_block(UNI_2D_SIZE, &[(ShaderStage::Vertex, 0)], |dst| pack_2d(&u, dst))
    }

    pub fn update_ubo_3d(&mut self) -> RefResult<()> {
        let u = self.uniforms.three_d;
        self.upload_block(
            UNI_3D_SIZE,
            &[(ShaderStage::Pixel, 1), (ShaderStage::Vertex, 1)],
            |dst| pack_3d(&u, dst),
        )
    }

    pub fn update_ubo_lights(&mut self) -> RefResult<()> {
        let lights = std::mem::take(&mut self.uniforms.lights);
        let r = self.upload_block(UNI_LIGHTS_SIZE, &[(ShaderStage::Pixel, 2)], |dst| {
            pack_lights(&lights, dst)
        });
        self.uniforms.lights = lights;
        r
    }

    pub fn update_ubo_lm_scales(&mut self, scales: &[[f32; 4]; MAXLIGHTMAPS]) -> RefResult<()> {
        self.upload_block(UNI_LM_SCALES_SIZE, &[(ShaderStage::Pixel, 3)], |dst| {
            pack_lm_scales(scales, dst)
        })
    }

    pub fn update_ubo_post_process(&mut self, time: f32, v_blend: &[f32; 4]) -> RefResult<()> {
        self.upload_block(UNI_POSTPROCESS_SIZE, &[(ShaderStage::Pixel, 4)], |dst| {
            pack_post_process(time, v_blend, dst)
        })
    }
}
