// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// wiiu_draw.rs: 2D drawing (HUD, menus, console, cinematics)

use q2wiiu_common::q_shared::{ImageHandle, ImageType, PrintLevel};

use crate::error::{RefError, RefResult};
use crate::gx2::{PrimitiveMode, SamplerId, TextureId};
use crate::wiiu_image::pack_rgba;
use crate::wiiu_local::{Gfx, RendererState};
use crate::wiiu_shaders::ProgramKind;

/// Size of one glyph cell in the 16x16 console font.
const CHAR_CELL: f32 = 0.0625;

/// Pixels in a `cols` x `rows` frame, widened before multiplying.
pub fn raw_pixel_count(cols: u32, rows: u32) -> usize {
    cols as usize * rows as usize
}

/// Expand a cinematic frame to RGBA. 8-bit frames go through `rawpalette`.
pub fn raw_to_rgba(rawpalette: &[u32; 256], data: &[u8], pixels: usize, bits: u32) -> Vec<u8> {
    let mut rgba: Vec<u8> = if bits == 32 {
        data.iter().copied().take(pixels * 4).collect()
    } else {
        data.iter().take(pixels).flat_map(|&i| rawpalette[i as usize].to_le_bytes()).collect()
    };
    rgba.resize(pixels * 4, 0);
    rgba
}

impl Gfx {
    #[allow(clippy::too_many_arguments)]
    fn draw_textured_rectangle(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        sl: f32,
        tl: f32,
        sh: f32,
        th: f32,
    ) -> RefResult<()> {
        #[rustfmt::skip]
        let verts = [
            //  X,     Y,     S,  T
            x,     y + h, sl, th,
            x,     y,     sl, tl,
            x + w, y + h, sh, th,
            x + w, y,     sh, tl,
        ];
        let slice = self.arenas.attribute.write_f32s(&verts)?;
        self.gpu.set_attrib_buffer(0, self.arenas.attribute.bytes(slice), 4 * 4);
        self.gpu.draw(PrimitiveMode::TriangleStrip, 4);
        Ok(())
    }

    fn draw_colored_rectangle(&mut self, x: f32, y: f32, w: f32, h: f32) -> RefResult<()> {
        let verts = [x, y + h, x, y, x + w, y + h, x + w, y];
        let slice = self.arenas.attribute.write_f32s(&verts)?;
        self.gpu.set_attrib_buffer(0, self.arenas.attribute.bytes(slice), 2 * 4);
        self.gpu.draw(PrimitiveMode::TriangleStrip, 4);
        Ok(())
    }

    /// Bind a texture that has no image slot.
    pub fn bind_raw(&mut self, texture: TextureId, sampler: Option<SamplerId>) {
        if self.state.current_texture != Some(texture) {
            self.state.current_texture = Some(texture);
            self.gpu.set_pixel_texture(texture, 0);
        }
        if let Some(sampler) = sampler {
            self.gpu.set_pixel_sampler(sampler, 0);
        }
    }

    /// Draw a rendered frame through the post-processing programs.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_frame_buffer_object(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        texture: TextureId,
        v_blend: &[f32; 4],
        time: f32,
        underwater: bool,
    ) -> RefResult<()> {
        let program = if underwater { ProgramKind::TwoDPostProcessWater } else { ProgramKind::TwoDPostProcess };
        self.use_program(program)?;
        self.bind_raw(texture, self.samplers.two_d);
        self.update_ubo_post_process(time, v_blend)?;
        self.draw_textured_rectangle(x as f32, y as f32, w as f32, h as f32, 0.0, 0.0, 1.0, 1.0)
    }
}

impl RendererState {
    pub fn draw_init_local(&mut self) -> RefResult<()> {
        // load console characters
        let chars = self
            .gfx
            .find_image(self.ri.as_mut(), &self.cvars, "pics/conchars.pcx", ImageType::Pic)?
            .ok_or_else(|| RefError::PicMissing("pics/conchars.pcx".to_string()))?;
        self.gfx.images.draw_chars = Some(chars);
        Ok(())
    }

    pub fn draw_find_pic(&mut self, name: &str) -> RefResult<Option<ImageHandle>> {
        self.gfx.find_pic(self.ri.as_mut(), &self.cvars, name)
    }

    /// Pic and its texture rect, or a console warning.
    fn pic_or_warn(&mut self, name: &str) -> RefResult<Option<(ImageHandle, [f32; 6])>> {
        let found = self.draw_find_pic(name)?.and_then(|h| {
            let i = self.gfx.images.get(h)?;
            Some((h, [i.width as f32, i.height as f32, i.sl, i.tl, i.sh, i.th]))
        });
        if found.is_none() {
            self.printf(PrintLevel::All, &format!("Can't find pic: {}\n", name));
        }
        Ok(found)
    }

    /// Draws one 8*8 graphics character scaled by `scale`. It can be
    /// clipped to the top of the screen to allow the console to be
    /// smoothly scrolled off.
    pub fn draw_char(&mut self, x: i32, y: i32, num: i32, scale: f32) -> RefResult<()> {
        let num = num & 255;
        if (num & 127) == 32 {
            // space
            return Ok(());
        }
        if y <= -8 {
            // totally off screen
            return Ok(());
        }
        let Some(chars) = self.gfx.images.draw_chars else {
            return Ok(());
        };

        let frow = (num >> 4) as f32 * CHAR_CELL;
        let fcol = (num & 15) as f32 * CHAR_CELL;
        let scaled = 8.0 * scale;

        self.gfx.use_program(ProgramKind::TwoD)?;
        self.gfx.bind(chars);
        self.gfx.draw_textured_rectangle(
            x as f32,
            y as f32,
            scaled,
            scaled,
            fcol,
            frow,
            fcol + CHAR_CELL,
            frow + CHAR_CELL,
        )
    }

    /// `(-1, -1)` if there is no such pic.
    pub fn draw_get_pic_size(&mut self, name: &str) -> RefResult<(i32, i32)> {
        let size = self
            .draw_find_pic(name)?
            .and_then(|h| self.gfx.images.get(h))
            .map(|i| (i.width as i32, i.height as i32));
        Ok(size.unwrap_or((-1, -1)))
    }

    pub fn draw_stretch_pic(&mut self, x: i32, y: i32, w: i32, h: i32, name: &str) -> RefResult<()> {
        let Some((image, [_, _, sl, tl, sh, th])) = self.pic_or_warn(name)? else {
            return Ok(());
        };
        self.gfx.use_program(ProgramKind::TwoD)?;
        self.gfx.bind(image);
        self.gfx.draw_textured_rectangle(x as f32, y as f32, w as f32, h as f32, sl, tl, sh, th)
    }

    pub fn draw_pic(&mut self, x: i32, y: i32, name: &str, factor: f32) -> RefResult<()> {
        let Some((image, [w, h, sl, tl, sh, th])) = self.pic_or_warn(name)? else {
            return Ok(());
        };
        self.gfx.use_program(ProgramKind::TwoD)?;
        self.gfx.bind(image);
        self.gfx.draw_textured_rectangle(x as f32, y as f32, w * factor, h * factor, sl, tl, sh, th)
    }

    /// Fill a rect with a repeating 64x64 pic, for the screen around a
    /// sized down refresh window.
    pub fn draw_tile_clear(&mut self, x: i32, y: i32, w: i32, h: i32, name: &str) -> RefResult<()> {
        let Some((image, _)) = self.pic_or_warn(name)? else {
            return Ok(());
        };
        self.gfx.use_program(ProgramKind::TwoD)?;
        self.gfx.bind(image);

        let (x, y, w, h) = (x as f32, y as f32, w as f32, h as f32);
        self.gfx.draw_textured_rectangle(x, y, w, h, x / 64.0, y / 64.0, (x + w) / 64.0, (y + h) / 64.0)
    }

    /// Fill a box of pixels with a single palette color.
    pub fn draw_fill(&mut self, x: i32, y: i32, w: i32, h: i32, c: i32) -> RefResult<()> {
        let index = u8::try_from(c).map_err(|_| RefError::BadFillColor(c))?;
        let mut color = self.palette.color(index);
        color[3] = 1.0;
        self.gfx.uniforms.common.color = color;
        self.gfx.update_ubo_common()?;

        self.gfx.use_program(ProgramKind::TwoDColor)?;
        self.gfx.draw_colored_rectangle(x as f32, y as f32, w as f32, h as f32)
    }

    /// Full screen blend for damage, pickups and the like.
    pub fn draw_flash(&mut self, color: [f32; 4], x: i32, y: i32, w: i32, h: i32) -> RefResult<()> {
        if !self.cvars.gl_polyblend.is_set() {
            return Ok(());
        }

        self.gfx.enable_blend(true);
        self.gfx.uniforms.common.color = color;
        let result = self
            .gfx
            .update_ubo_common()
            .and_then(|()| self.gfx.use_program(ProgramKind::TwoDColor))
            .and_then(|()| self.gfx.draw_colored_rectangle(x as f32, y as f32, w as f32, h as f32));
        self.gfx.enable_blend(false);
        result
    }

    pub fn draw_fade_screen(&mut self) -> RefResult<()> {
        let (w, h) = (self.vid.width, self.vid.height);
        self.draw_flash([0.0, 0.0, 0.0, 0.6], 0, 0, w, h)
    }

    /// Draw one cinematic frame of `cols` x `rows` pixels.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_stretch_raw(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        cols: u32,
        rows: u32,
        data: &[u8],
        bits: u32,
    ) -> RefResult<()> {
        if cols == 0 || rows == 0 {
            return Ok(());
        }

        let texture = match self.gfx.raw_texture {
            Some((texture, tw, th)) if tw == cols && th == rows => texture,
            old => {
                if let Some((texture, _, _)) = old {
                    self.gfx.gpu.destroy_texture(texture);
                    if self.gfx.state.current_texture == Some(texture) {
                        self.gfx.state.current_texture = None;
                    }
                }
                let texture = self.gfx.gpu.create_texture(cols, rows, 1);
                self.gfx.raw_texture = Some((texture, cols, rows));
                texture
            }
        };

        let rgba = raw_to_rgba(&self.palette.rawpalette, data, raw_pixel_count(cols, rows), bits);
        self.gfx.gpu.upload_texture(texture, &rgba);

        self.gfx.use_program(ProgramKind::TwoD)?;
        self.gfx.update_ubo_common()?;
        self.gfx.update_ubo_2d()?;
        let sampler = self.gfx.samplers.video;
        self.gfx.bind_raw(texture, sampler);

        self.gfx.draw_textured_rectangle(x as f32, y as f32, w as f32, h as f32, 0.0, 0.0, 1.0, 1.0)
    }

    /// Set the cinematic palette from 256 RGB triplets, or back to the
    /// game palette.
    pub fn set_palette(&mut self, palette: Option<&[u8]>) {
        let p = &mut self.palette;
        match palette {
            Some(rgb) => {
                for (i, entry) in p.rawpalette.iter_mut().enumerate() {
                    let c = rgb.get(i * 3..i * 3 + 3).unwrap_or(&[0, 0, 0]);
                    *entry = pack_rgba(c[0], c[1], c[2], 0xff);
                }
            }
            None => {
                for (entry, &c) in p.rawpalette.iter_mut().zip(p.d_8to24table.iter()) {
                    *entry = c | 0xff00_0000;
                }
            }
        }
    }
}
