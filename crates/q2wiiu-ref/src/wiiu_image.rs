// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_image.rs: image table, texture filtering and binding

use q2wiiu_common::q_shared::{com_file_extension, ImageHandle, ImageType, PrintLevel};

use crate::error::{RefError, RefResult};
use crate::gx2::{MipFilter, SamplerDesc, SamplerId, TexClamp, TexFilter, TextureId};
use crate::refimport::{ImageData, RefImport};
use crate::wiiu_local::{Gfx, RendererCvars};
use crate::wiiu_model_types::LightmapPage;

pub const MAX_GL3TEXTURES: usize = 1024;

/// Texture unit the first lightmap page is bound to.
pub const LIGHTMAP_UNIT_BASE: u32 = 2;

// ============================================================
// Palette
// ============================================================

/// The game palette expanded to packed RGBA (r in the low byte).
#[derive(Debug, Clone)]
pub struct Palette {
    pub d_8to24table: [u32; 256],
    /// Palette used by `stretch_raw`.
    pub rawpalette: [u32; 256],
}

impl Default for Palette {
    fn default() -> Self {
        let mut rgb = [0u8; 768];
        for (i, c) in rgb.chunks_exact_mut(3).enumerate() {
            c.fill(i as u8);
        }
        Self::from_rgb(&rgb)
    }
}

pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24)
}

impl Palette {
    /// Build from 256 RGB triplets. Index 255 is transparent.
    pub fn from_rgb(rgb: &[u8]) -> Self {
        let mut d_8to24table = [0u32; 256];
        for (i, entry) in d_8to24table.iter_mut().enumerate() {
            let c = rgb.get(i * 3..i * 3 + 3).unwrap_or(&[0, 0, 0]);
            *entry = pack_rgba(c[0], c[1], c[2], 255);
        }
        d_8to24table[255] &= 0x00ff_ffff;
        Self { d_8to24table, rawpalette: d_8to24table.map(|c| c | 0xff00_0000) }
    }

    pub fn load(ri: &mut dyn RefImport) -> Self {
        match ri.load_palette() {
            Some(rgb) if rgb.len() >= 768 => Self::from_rgb(&rgb),
            _ => {
                ri.con_printf(PrintLevel::All, "WARNING: couldn't load palette, using grayscale\n");
                Self::default()
            }
        }
    }

    /// Palette entry as normalized RGBA.
    pub fn color(&self, index: u8) -> [f32; 4] {
        let c = self.d_8to24table[index as usize];
        [
            (c & 0xff) as f32 / 255.0,
            ((c >> 8) & 0xff) as f32 / 255.0,
            ((c >> 16) & 0xff) as f32 / 255.0,
            ((c >> 24) & 0xff) as f32 / 255.0,
        ]
    }
}

// ============================================================
// Images
// ============================================================

#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    pub image_type: ImageType,
    pub width: u32,
    pub height: u32,
    pub texture: TextureId,
    pub sl: f32,
    pub tl: f32,
    pub sh: f32,
    pub th: f32,
    pub has_alpha: bool,
    pub is_lava: bool,
    pub nolerp: bool,
    /// 0 marks a free slot.
    pub registration_sequence: i32,
}

impl Image {
    fn is_mipmapped(&self) -> bool {
        !matches!(self.image_type, ImageType::Pic | ImageType::Sky)
    }
}

#[derive(Debug)]
pub struct ImageTable {
    pub slots: Vec<Image>,
    pub registration_sequence: i32,
    pub image_max: usize,
    pub notexture: Option<ImageHandle>,
    pub particle: Option<ImageHandle>,
    pub draw_chars: Option<ImageHandle>,
    /// gl_nobind: every bind uses the console font instead.
    pub nobind: bool,
}

impl ImageTable {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            registration_sequence: 1,
            image_max: 0,
            notexture: None,
            particle: None,
            draw_chars: None,
            nobind: false,
        }
    }

    pub fn get(&self, handle: ImageHandle) -> Option<&Image> {
        self.slots.get(handle.0 as usize).filter(|i| i.registration_sequence != 0)
    }

    pub fn find(&self, name: &str) -> Option<ImageHandle> {
        self.slots
            .iter()
            .position(|i| i.registration_sequence != 0 && i.name == name)
            .map(|i| ImageHandle(i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ImageHandle, &Image)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, i)| i.registration_sequence != 0)
            .map(|(n, i)| (ImageHandle(n as u32), i))
    }

    /// Handle used in place of a missing image.
    pub fn fallback(&self) -> ImageHandle {
        self.notexture.unwrap_or(ImageHandle(0))
    }
}

impl Default for ImageTable {
    fn default() -> Self {
        Self::new()
    }
}

fn nolerp_for(name: &str, ty: ImageType, cvars: &RendererCvars) -> bool {
    if cvars.r_2D_unfiltered.is_set() && ty == ImageType::Pic {
        // unfiltered unless the pic is on the lerp list
        !cvars.r_lerp_list.string.contains(name)
    } else {
        cvars.gl_nolerp_list.string.contains(name)
    }
}

fn mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

// ============================================================
// Samplers
// ============================================================

struct GlMode {
    name: &'static str,
    min: TexFilter,
    mag: TexFilter,
    mip: MipFilter,
}

const MODES: &[GlMode] = &[
    GlMode { name: "GL_NEAREST", min: TexFilter::Point, mag: TexFilter::Point, mip: MipFilter::None },
    GlMode { name: "GL_LINEAR", min: TexFilter::Linear, mag: TexFilter::Linear, mip: MipFilter::None },
    GlMode {
        name: "GL_NEAREST_MIPMAP_NEAREST",
        min: TexFilter::Point,
        mag: TexFilter::Point,
        mip: MipFilter::Point,
    },
    GlMode {
        name: "GL_LINEAR_MIPMAP_NEAREST",
        min: TexFilter::Linear,
        mag: TexFilter::Linear,
        mip: MipFilter::Point,
    },
    GlMode {
        name: "GL_NEAREST_MIPMAP_LINEAR",
        min: TexFilter::Point,
        mag: TexFilter::Point,
        mip: MipFilter::Linear,
    },
    GlMode {
        name: "GL_LINEAR_MIPMAP_LINEAR",
        min: TexFilter::Linear,
        mag: TexFilter::Linear,
        mip: MipFilter::Linear,
    },
];

/// The sampler set rebuilt by `texture_mode`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Samplers {
    pub video: Option<SamplerId>,
    pub two_d: Option<SamplerId>,
    pub two_d_unfiltered: Option<SamplerId>,
    pub three_d: Option<SamplerId>,
    pub lightmaps: Option<SamplerId>,
}

impl Samplers {
    /// Sampler an image should be drawn with.
    pub fn for_image(&self, image: &Image) -> Option<SamplerId> {
        match image.image_type {
            ImageType::Pic if image.nolerp => self.two_d_unfiltered,
            ImageType::Pic => self.two_d,
            _ if image.nolerp => self.two_d_unfiltered,
            _ => self.three_d,
        }
    }
}

impl Gfx {
    /// Apply gl_texturemode and the *_unfiltered cvars. Returns false if
    /// the mode name was not recognised; the previous samplers stay.
    pub fn texture_mode(&mut self, ri: &mut dyn RefImport, cvars: &RendererCvars) -> bool {
        let string = cvars.gl_texturemode.string.as_str();
        let Some(mode) = MODES.iter().find(|m| m.name.eq_ignore_ascii_case(string)) else {
            ri.con_printf(
                PrintLevel::All,
                &format!("bad filter name '{}' (probably from gl_texturemode)\n", string),
            );
            return false;
        };

        let max_aniso = self.gpu.max_anisotropy();
        let mut aniso = cvars.r_anisotropic.value.max(0.0) as u32;
        if aniso > max_aniso {
            ri.cvar_set_value("r_anisotropic", max_aniso as f32);
            aniso = max_aniso;
        }

        let three_d = if cvars.r_3D_unfiltered.is_set() {
            SamplerDesc { mip: mode.mip, ..SamplerDesc::new(TexFilter::Point, TexClamp::Wrap) }
        } else {
            SamplerDesc {
                min: mode.min,
                mag: mode.mag,
                mip: mode.mip,
                clamp: TexClamp::Wrap,
                max_anisotropy: aniso.max(1),
            }
        };
        let filter = |unfiltered: bool| if unfiltered { TexFilter::Point } else { TexFilter::Linear };

        self.samplers = Samplers {
            video: Some(self.gpu.create_sampler(SamplerDesc::new(
                filter(cvars.r_videos_unfiltered.is_set()),
                TexClamp::Clamp,
            ))),
            two_d: Some(self.gpu.create_sampler(SamplerDesc::new(mode.mag, TexClamp::Clamp))),
            two_d_unfiltered: Some(
                self.gpu.create_sampler(SamplerDesc::new(TexFilter::Point, TexClamp::Clamp)),
            ),
            three_d: Some(self.gpu.create_sampler(three_d)),
            lightmaps: Some(self.gpu.create_sampler(SamplerDesc::new(
                filter(cvars.r_lightmaps_unfiltered.is_set()),
                TexClamp::Clamp,
            ))),
        };

        for image in self.images.slots.iter_mut().filter(|i| i.registration_sequence != 0) {
            image.nolerp = nolerp_for(&image.name, image.image_type, cvars);
        }

        // the next bind has to pick up the new samplers
        self.state.current_texture = None;
        self.state.current_lightmap = None;
        log::debug!("texture mode {} (anisotropy {})", mode.name, aniso);
        true
    }

    // ============================================================
    // Binding
    // ============================================================

    pub fn bind(&mut self, handle: ImageHandle) {
        let handle = if self.images.nobind { self.images.draw_chars.unwrap_or(handle) } else { handle };
        let Some(image) = self.images.get(handle) else {
            return;
        };
        if self.state.current_texture == Some(image.texture) {
            return;
        }
        self.state.current_texture = Some(image.texture);
        self.gpu.set_pixel_texture(image.texture, 0);
        if let Some(sampler) = self.samplers.for_image(image) {
            self.gpu.set_pixel_sampler(sampler, 0);
        }
    }

    pub fn bind_lightmap(&mut self, ri: &mut dyn RefImport, lightmapnum: i32) {
        let Some(&texture) = usize::try_from(lightmapnum).ok().and_then(|n| self.lightmaps.get(n)) else {
            ri.con_printf(
                PrintLevel::Developer,
                &format!("WARNING: Invalid lightmapnum {} used!\n", lightmapnum),
            );
            return;
        };
        let n = lightmapnum as u32;
        if !self.lightmaps_bound.contains(&n) {
            self.lightmaps_bound.push(n);
        }
        if self.state.current_lightmap == Some(n) {
            return;
        }
        self.state.current_lightmap = Some(n);
        let unit = LIGHTMAP_UNIT_BASE + n;
        self.gpu.set_pixel_texture(texture, unit);
        if let Some(sampler) = self.samplers.lightmaps {
            self.gpu.set_pixel_sampler(sampler, unit);
        }
    }

    /// Replace the lightmap textures with the pages of a new world.
    pub fn upload_lightmaps(&mut self, pages: &[LightmapPage]) {
        for texture in self.lightmaps.drain(..) {
            self.gpu.destroy_texture(texture);
        }
        for page in pages {
            let texture = self.gpu.create_texture(page.width, page.height, 1);
            self.gpu.upload_texture(texture, &page.rgba);
            self.lightmaps.push(texture);
        }
        self.state.current_lightmap = None;
    }

    // ============================================================
    // Loading
    // ============================================================

    /// Create an image from decoded RGBA and store it in a free slot.
    pub fn load_pic(
        &mut self,
        name: &str,
        data: &ImageData,
        ty: ImageType,
        cvars: &RendererCvars,
    ) -> RefResult<ImageHandle> {
        let slot = match self.images.slots.iter().position(|i| i.registration_sequence == 0) {
            Some(i) => i,
            None if self.images.slots.len() >= MAX_GL3TEXTURES => return Err(RefError::ImageTableFull),
            None => self.images.slots.len(),
        };

        let mipmapped = !matches!(ty, ImageType::Pic | ImageType::Sky);
        let mips = if mipmapped { mip_levels(data.width, data.height) } else { 1 };
        let texture = self.gpu.create_texture(data.width, data.height, mips);
        self.gpu.upload_texture(texture, &data.rgba);

        let image = Image {
            name: name.to_string(),
            image_type: ty,
            width: data.width,
            height: data.height,
            texture,
            sl: 0.0,
            tl: 0.0,
            sh: 1.0,
            th: 1.0,
            has_alpha: data.rgba.chunks_exact(4).any(|p| p[3] != 255),
            is_lava: name.contains("lava"),
            nolerp: nolerp_for(name, ty, cvars),
            registration_sequence: self.images.registration_sequence,
        };
        if slot == self.images.slots.len() {
            self.images.slots.push(image);
        } else {
            self.images.slots[slot] = image;
        }
        Ok(ImageHandle(slot as u32))
    }

    /// Find or load an image. `None` if the name is unusable or the host
    /// has no such file.
    pub fn find_image(
        &mut self,
        ri: &mut dyn RefImport,
        cvars: &RendererCvars,
        name: &str,
        ty: ImageType,
    ) -> RefResult<Option<ImageHandle>> {
        if com_file_extension(name).is_empty() || name.len() < 5 {
            return Ok(None);
        }
        let name = name.replace('\\', "/");

        if let Some(handle) = self.images.find(&name) {
            let seq = self.images.registration_sequence;
            self.images.slots[handle.0 as usize].registration_sequence = seq;
            return Ok(Some(handle));
        }

        let Some(data) = ri.load_image(&name, ty) else {
            log::debug!("image {} not found", name);
            return Ok(None);
        };
        self.load_pic(&name, &data, ty, cvars).map(Some)
    }

    /// `pics/<name>.pcx`, or the literal path after a leading slash.
    pub fn find_pic(
        &mut self,
        ri: &mut dyn RefImport,
        cvars: &RendererCvars,
        name: &str,
    ) -> RefResult<Option<ImageHandle>> {
        if let Some(path) = name.strip_prefix('/').or_else(|| name.strip_prefix('\\')) {
            self.find_image(ri, cvars, path, ImageType::Pic)
        } else {
            self.find_image(ri, cvars, &format!("pics/{}.pcx", name), ImageType::Pic)
        }
    }

    pub fn register_skin(
        &mut self,
        ri: &mut dyn RefImport,
        cvars: &RendererCvars,
        name: &str,
    ) -> RefResult<Option<ImageHandle>> {
        self.find_image(ri, cvars, name, ImageType::Skin)
    }

    /// The checkerboard for missing textures and the particle dot.
    pub fn init_builtin_textures(&mut self, cvars: &RendererCvars) -> RefResult<()> {
        const DOTTEXTURE: [[u8; 8]; 8] = [
            [0, 0, 0, 0, 0, 0, 0, 0],
            [0, 0, 1, 1, 0, 0, 0, 0],
            [0, 1, 1, 1, 1, 0, 0, 0],
            [0, 1, 1, 1, 1, 0, 0, 0],
            [0, 0, 1, 1, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0, 0],
            [0, 0, 0, 0, 0, 0, 0, 0],
        ];

        let mut particle = Vec::with_capacity(8 * 8 * 4);
        let mut checker = Vec::with_capacity(8 * 8 * 4);
        for (x, row) in DOTTEXTURE.iter().enumerate() {
            for (y, &dot) in row.iter().enumerate() {
                particle.extend_from_slice(&[255, 255, 255, dot * 255]);
                let c = DOTTEXTURE[x & 3][y & 3] * 255;
                checker.extend_from_slice(&[c, c, c, 255]);
            }
        }

        let particle = ImageData { width: 8, height: 8, rgba: particle };
        let checker = ImageData { width: 8, height: 8, rgba: checker };
        self.images.particle = Some(self.load_pic("***particle***", &particle, ImageType::Sprite, cvars)?);
        self.images.notexture = Some(self.load_pic("***r_notexture***", &checker, ImageType::Wall, cvars)?);
        Ok(())
    }

    // ============================================================
    // Registration bookkeeping
    // ============================================================

    /// Release images not touched during the current registration.
    pub fn free_unused_images(&mut self) {
        let seq = self.images.registration_sequence;
        for handle in [self.images.notexture, self.images.particle].into_iter().flatten() {
            self.images.slots[handle.0 as usize].registration_sequence = seq;
        }

        let mut freed = 0;
        for image in self.images.slots.iter_mut() {
            if image.registration_sequence == seq
                || image.registration_sequence == 0
                || image.image_type == ImageType::Pic
            {
                continue;
            }
            self.gpu.destroy_texture(image.texture);
            image.registration_sequence = 0;
            image.name.clear();
            freed += 1;
        }
        if freed > 0 {
            self.state.current_texture = None;
            log::debug!("freed {} unused images", freed);
        }
    }

    pub fn image_has_free_space(&mut self) -> bool {
        let seq = self.images.registration_sequence;
        let used = self
            .images
            .slots
            .iter()
            .filter(|i| !i.name.is_empty() && i.registration_sequence == seq)
            .count();
        self.images.image_max = self.images.image_max.max(used);
        self.images.slots.len() + used < MAX_GL3TEXTURES
    }

    pub fn shutdown_images(&mut self) {
        for image in self.images.slots.drain(..) {
            if image.registration_sequence != 0 {
                self.gpu.destroy_texture(image.texture);
            }
        }
        for texture in self.lightmaps.drain(..) {
            self.gpu.destroy_texture(texture);
        }
        self.images.notexture = None;
        self.images.particle = None;
        self.images.draw_chars = None;
        self.state.current_texture = None;
        self.state.current_lightmap = None;
    }

    /// Console listing of every loaded image.
    pub fn image_list(&mut self, ri: &mut dyn RefImport) {
        let seq = self.images.registration_sequence;
        let mut texels = 0u32;
        let mut used = 0usize;

        ri.con_printf(PrintLevel::All, "------------------\n");
        for (_, image) in self.images.iter() {
            let in_use = if image.registration_sequence == seq {
                used += 1;
                "*"
            } else {
                ""
            };
            texels += image.width * image.height;
            let kind = match image.image_type {
                ImageType::Skin => 'M',
                ImageType::Sprite => 'S',
                ImageType::Wall => 'W',
                ImageType::Pic => 'P',
                ImageType::Sky => 'Y',
            };
            let mip = if image.is_mipmapped() { 'm' } else { ' ' };
            let fmt = if image.has_alpha { "RGBA" } else { "RGB " };
            let pot = if image.width.is_power_of_two() && image.height.is_power_of_two() {
                "POT"
            } else {
                "NPOT"
            };
            ri.con_printf(
                PrintLevel::All,
                &format!(
                    "{}{} {:3} {:3} {} {}: {} {}\n",
                    kind, mip, image.width, image.height, fmt, pot, image.name, in_use
                ),
            );
        }
        ri.con_printf(
            PrintLevel::All,
            &format!("Total texel count (not counting mipmaps): {}\n", texels),
        );
        let free = if self.image_has_free_space() { ", has free space" } else { "" };
        ri.con_printf(
            PrintLevel::All,
            &format!("Used {} of {} images{}.\n", used, self.images.image_max, free),
        );
    }
}
