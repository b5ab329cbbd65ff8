//! Shader program set
//!
//! Loads the compiled GX2 shader groups the renderer draws with and keeps
//! track of which one is bound.

use q2wiiu_common::q_shared::PrintLevel;
use std::collections::HashMap;

use crate::error::{RefError, RefResult};
use crate::gx2::ProgramId;
use crate::refimport::RefImport;
use crate::wiiu_local::Gfx;
use crate::wiiu_model_types::SurfaceKind;

/// Programs used by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Textured 2D.
    TwoD,
    /// Flat-coloured 2D.
    TwoDColor,
    TwoDPostProcess,
    TwoDPostProcessWater,
    /// TV colour buffer onto the DRC.
    DrcCopy,
    Trans,
    /// Flat-coloured 3D, used for beams and null models.
    Color,
    /// Opaque lightmapped faces.
    Lm,
    /// Water, lava, slime.
    Water,
    LmFlow,
    TransFlow,
    Sky,
    Sprite,
    SpriteAlpha,
    Alias,
    AliasColor,
    Particle,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 17] = [
        ProgramKind::TwoD,
        ProgramKind::TwoDColor,
        ProgramKind::TwoDPostProcess,
        ProgramKind::TwoDPostProcessWater,
        ProgramKind::Trans,
        ProgramKind::Color,
        ProgramKind::Lm,
        ProgramKind::Water,
        ProgramKind::LmFlow,
        ProgramKind::TransFlow,
        ProgramKind::Sky,
        ProgramKind::Sprite,
        ProgramKind::SpriteAlpha,
        ProgramKind::Alias,
        ProgramKind::AliasColor,
        ProgramKind::Particle,
        ProgramKind::DrcCopy,
    ];

    /// Shader group file name without extension.
    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::TwoD => "2d",
            ProgramKind::TwoDColor => "2d_color",
            ProgramKind::TwoDPostProcess => "2d_postprocess",
            ProgramKind::TwoDPostProcessWater => "2d_postprocess_water",
            ProgramKind::DrcCopy => "drc_copy",
            ProgramKind::Trans => "3d_trans",
            ProgramKind::Color => "3d_color",
            ProgramKind::Lm => "3d_lm",
            ProgramKind::Water => "3d_water",
            ProgramKind::LmFlow => "3d_lm_flow",
            ProgramKind::TransFlow => "3d_trans_flow",
            ProgramKind::Sky => "3d_sky",
            ProgramKind::Sprite => "3d_sprite",
            ProgramKind::SpriteAlpha => "3d_sprite_alpha",
            ProgramKind::Alias => "alias",
            ProgramKind::AliasColor => "alias_color",
            ProgramKind::Particle => "particle",
        }
    }

    fn purpose(self) -> &'static str {
        match self {
            ProgramKind::TwoD => "textured 2D rendering",
            ProgramKind::TwoDColor => "color-only 2D rendering",
            ProgramKind::TwoDPostProcess => "rendering the framebuffer object",
            ProgramKind::TwoDPostProcessWater => "rendering the framebuffer object under water",
            ProgramKind::DrcCopy => "copying to DRC",
            ProgramKind::Trans => "rendering translucent 3D things",
            ProgramKind::Color => "flat-colored 3D rendering",
            ProgramKind::Lm => "textured 3D rendering with lightmap",
            ProgramKind::Water => "water rendering",
            ProgramKind::LmFlow => "scrolling textured 3D rendering with lightmap",
            ProgramKind::TransFlow => "scrolling textured translucent 3D rendering",
            ProgramKind::Sky => "sky rendering",
            ProgramKind::Sprite => "sprite rendering",
            ProgramKind::SpriteAlpha => "alpha-tested sprite rendering",
            ProgramKind::Alias => "rendering textured models",
            ProgramKind::AliasColor => "rendering flat-colored models",
            ProgramKind::Particle => "rendering particles",
        }
    }
}

/// Program to draw a world or brush surface with.
pub fn select_program_for_surface(kind: SurfaceKind) -> ProgramKind {
    match kind {
        SurfaceKind::Opaque { flowing: true } => ProgramKind::LmFlow,
        SurfaceKind::Opaque { flowing: false } => ProgramKind::Lm,
        SurfaceKind::Warp { .. } => ProgramKind::Water,
        SurfaceKind::Sky => ProgramKind::Sky,
        SurfaceKind::Translucent { warp: true, .. } => ProgramKind::Water,
        SurfaceKind::Translucent { flowing: true, .. } => ProgramKind::TransFlow,
        SurfaceKind::Translucent { .. } => ProgramKind::Trans,
    }
}

#[derive(Debug, Default)]
pub struct ShaderSet {
    programs: HashMap<ProgramKind, ProgramId>,
}

impl ShaderSet {
    pub fn get(&self, kind: ProgramKind) -> Option<ProgramId> {
        self.programs.get(&kind).copied()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl Gfx {
    fn load_shader_group(&mut self, ri: &mut dyn RefImport, file: &str) -> RefResult<ProgramId> {
        let path = format!("{}/{}.gsh", self.shader_dir, file);
        let data = ri.load_file(&path).ok_or_else(|| RefError::ShaderLoad {
            name: file.to_string(),
            reason: format!("{} not found", path),
        })?;
        self.gpu
            .load_shader_group(file, &data)
            .map_err(|reason| RefError::ShaderLoad { name: file.to_string(), reason })
    }

    fn create_shaders(&mut self, ri: &mut dyn RefImport, particle_square: bool) -> RefResult<()> {
        for kind in ProgramKind::ALL {
            let loaded = if kind == ProgramKind::Particle && particle_square {
                self.load_shader_group(ri, "particle_square").or_else(|e| {
                    log::warn!("{}, using round particles", e);
                    self.load_shader_group(ri, kind.name())
                })
            } else {
                self.load_shader_group(ri, kind.name())
            };
            match loaded {
                Ok(program) => {
                    self.shaders.programs.insert(kind, program);
                }
                Err(e) => {
                    ri.con_printf(
                        PrintLevel::All,
                        &format!("WARNING: Failed to create shader program for {}!\n", kind.purpose()),
                    );
                    return Err(e);
                }
            }
        }
        self.state.current_program = None;
        log::debug!("loaded {} shader programs", self.shaders.len());
        Ok(())
    }

    /// Load every program and upload the initial uniform blocks.
    pub fn init_shaders(&mut self, ri: &mut dyn RefImport, particle_square: bool) -> RefResult<()> {
        self.update_ubo_common()?;
        self.update_ubo_2d()?;
        self.update_ubo_3d()?;
        self.update_ubo_lights()?;
        self.create_shaders(ri, particle_square)
    }

    pub fn shutdown_shaders(&mut self) {
        self.state.current_program = None;
        for (_, program) in self.shaders.programs.drain() {
            self.gpu.free_shader_group(program);
        }
    }

    /// Unload and reload the programs. Uniform blocks are left alone.
    pub fn recreate_shaders(&mut self, ri: &mut dyn RefImport, particle_square: bool) -> RefResult<()> {
        self.shutdown_shaders();
        self.create_shaders(ri, particle_square)
    }

    pub fn use_program(&mut self, kind: ProgramKind) -> RefResult<()> {
        if self.state.current_program == Some(kind) {
            return Ok(());
        }
        let program = self.shaders.get(kind).ok_or(RefError::ShaderMissing(kind.name()))?;
        self.state.current_program = Some(kind);
        self.gpu.set_program(program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gx2::{CommandRecorder, Gx2Command};
    use crate::refimport::HostImports;
    use crate::wiiu_model_types::Alpha;
    use q2wiiu_common::config::RendererConfig;

    fn setup() -> (Gfx, HostImports, CommandRecorder) {
        let rec = CommandRecorder::default();
        let gfx = Gfx::new(Box::new(rec.clone()), &RendererConfig::default());
        let host = HostImports::new();
        host.add_default_shaders("shaders");
        (gfx, host, rec)
    }

    // ----------------------------------------------------------------
    // loading
    // ----------------------------------------------------------------

    #[test]
    fn test_all_programs_load() {
        let (mut gfx, mut host, _rec) = setup();
        gfx.init_shaders(&mut host, false).unwrap();
        assert_eq!(gfx.shaders.len(), 17);
        for kind in ProgramKind::ALL {
            assert!(gfx.shaders.get(kind).is_some(), "{} missing", kind.name());
        }
    }

    #[test]
    fn test_missing_shader_fails_init() {
        let (mut gfx, mut host, _rec) = setup();
        host.remove_file("shaders/3d_sky.gsh");
        match gfx.init_shaders(&mut host, false) {
            Err(RefError::ShaderLoad { name, .. }) => assert_eq!(name, "3d_sky"),
            other => panic!("expected ShaderLoad, got {:?}", other),
        }
        assert!(host.printed().iter().any(|m| m.contains("sky rendering")));
    }

    #[test]
    fn test_rejected_shader_fails_init() {
        let (mut gfx, mut host, rec) = setup();
        rec.reject_shader("alias");
        assert!(matches!(
            gfx.init_shaders(&mut host, false),
            Err(RefError::ShaderLoad { .. })
        ));
    }

    #[test]
    fn test_square_particles_fall_back() {
        let (mut gfx, mut host, rec) = setup();
        gfx.init_shaders(&mut host, true).unwrap();
        let loaded: Vec<String> = rec
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                Gx2Command::LoadShaderGroup { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert!(loaded.contains(&"particle".to_string()));

        host.add_file("shaders/particle_square.gsh", b"Gfx2square".to_vec());
        rec.clear();
        gfx.recreate_shaders(&mut host, true).unwrap();
        let cmds = rec.commands();
        assert!(cmds.iter().any(
            |c| matches!(c, Gx2Command::LoadShaderGroup { name, .. } if name == "particle_square")
        ));
        assert_eq!(
            cmds.iter().filter(|c| matches!(c, Gx2Command::FreeShaderGroup(_))).count(),
            17
        );
    }

    // ----------------------------------------------------------------
    // binding
    // ----------------------------------------------------------------

    #[test]
    fn test_use_program_is_elided() {
        let (mut gfx, mut host, rec) = setup();
        gfx.init_shaders(&mut host, false).unwrap();
        rec.clear();
        gfx.use_program(ProgramKind::Lm).unwrap();
        gfx.use_program(ProgramKind::Lm).unwrap();
        gfx.use_program(ProgramKind::Water).unwrap();
        let sets = rec
            .commands()
            .into_iter()
            .filter(|c| matches!(c, Gx2Command::SetProgram(_)))
            .count();
        assert_eq!(sets, 2);
    }

    #[test]
    fn test_use_program_before_init() {
        let (mut gfx, _host, _rec) = setup();
        assert!(matches!(
            gfx.use_program(ProgramKind::TwoD),
            Err(RefError::ShaderMissing("2d"))
        ));
    }

    // ----------------------------------------------------------------
    // selection
    // ----------------------------------------------------------------

    #[test]
    fn test_program_for_surface() {
        use SurfaceKind::*;
        assert_eq!(select_program_for_surface(Opaque { flowing: false }), ProgramKind::Lm);
        assert_eq!(select_program_for_surface(Opaque { flowing: true }), ProgramKind::LmFlow);
        assert_eq!(select_program_for_surface(Warp { flowing: true }), ProgramKind::Water);
        assert_eq!(select_program_for_surface(Sky), ProgramKind::Sky);
        assert_eq!(
            select_program_for_surface(Translucent { alpha: Alpha::Alpha33, flowing: false, warp: false }),
            ProgramKind::Trans
        );
        assert_eq!(
            select_program_for_surface(Translucent { alpha: Alpha::Alpha66, flowing: true, warp: false }),
            ProgramKind::TransFlow
        );
        assert_eq!(
            select_program_for_surface(Translucent { alpha: Alpha::Alpha66, flowing: true, warp: true }),
            ProgramKind::Water
        );
    }
}
