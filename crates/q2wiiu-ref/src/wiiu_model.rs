//! Model registration
//!
//! The host decodes BSP, MD2 and SP2 files into [`ModelData`]; the
//! renderer caches the results by name, resolves the images they use and
//! drops whatever the current level did not touch once registration ends.

use q2wiiu_common::q_shared::{ImageHandle, ImageType, ModelHandle, PrintLevel};

use crate::error::{RefError, RefResult};
use crate::wiiu_local::RendererState;
use crate::wiiu_model_types::{BrushModel, InlineModel, Model, ModelData, ModelKind};

impl RendererState {
    /// Start loading a level: `maps/<map>.bsp` becomes the world.
    pub fn begin_registration(&mut self, map: &str) -> RefResult<()> {
        self.gfx.images.registration_sequence += 1;
        // force markleafs
        self.frame.oldviewcluster = -1;

        let fullname = format!("maps/{}.bsp", map);

        // explicitly free the old map if different
        if self.models.world_name != fullname || self.models.world.is_none() {
            self.free_world();
            let world = match self.ri.load_model(&fullname) {
                Some(ModelData::Brush(world)) => world,
                Some(_) => return Err(RefError::BadModelType(fullname)),
                None => return Err(RefError::ModelMissing(fullname)),
            };
            self.gfx.upload_lightmaps(&world.lightmap_pages);
            log::info!(
                "world {}: {} surfaces, {} lightmap pages",
                fullname,
                world.surfaces.len(),
                world.lightmap_pages.len()
            );
            self.models.world = Some(world);
            self.models.world_name = fullname;
        }

        let Some(mut world) = self.models.world.take() else {
            return Ok(());
        };
        let result = self.resolve_texinfo_images(&mut world);
        self.models.world = Some(world);

        self.frame.viewcluster = -1;
        result
    }

    fn free_world(&mut self) {
        self.models.world = None;
        self.models.world_name.clear();
        self.chains.clear();
        // inline models index into the old world
        for slot in self.models.known.iter_mut() {
            if matches!(slot, Some(Model { kind: ModelKind::Brush(_), .. })) {
                *slot = None;
            }
        }
    }

    /// Find the wall texture of every texinfo, stamping it as in use.
    fn resolve_texinfo_images(&mut self, world: &mut BrushModel) -> RefResult<()> {
        for ti in world.texinfo.iter_mut() {
            let name = format!("textures/{}.wal", ti.texture);
            ti.image = match self.gfx.find_image(self.ri.as_mut(), &self.cvars, &name, ImageType::Wall)? {
                Some(image) => image,
                None => {
                    self.ri.con_printf(PrintLevel::All, &format!("Couldn't load {}\n", name));
                    self.gfx.images.fallback()
                }
            };
        }
        Ok(())
    }

    pub fn register_model(&mut self, name: &str) -> RefResult<Option<ModelHandle>> {
        if name.is_empty() {
            return Ok(None);
        }

        let handle = match self.models.find(name) {
            Some(handle) => handle,
            None => match self.load_model(name)? {
                Some(model) => self.models.insert(model).ok_or(RefError::ModelTableFull)?,
                None => return Ok(None),
            },
        };
        self.touch_model(handle)?;
        Ok(Some(handle))
    }

    fn load_model(&mut self, name: &str) -> RefResult<Option<Model>> {
        let registration_sequence = self.gfx.images.registration_sequence;

        // inline models are grabbed only from the world
        if let Some(num) = name.strip_prefix('*') {
            let world = self.models.world.as_ref().ok_or(RefError::NoWorldModel)?;
            let inline = num
                .parse::<u32>()
                .ok()
                .filter(|&i| i >= 1)
                .and_then(|i| world.submodels.get(i as usize).map(|sub| InlineModel::from_submodel(i, sub)))
                .ok_or_else(|| RefError::ModelMissing(name.to_string()))?;
            return Ok(Some(Model {
                name: name.to_string(),
                registration_sequence,
                kind: ModelKind::Brush(inline),
            }));
        }

        let kind = match self.ri.load_model(name) {
            Some(ModelData::Alias(alias)) => ModelKind::Alias(alias),
            Some(ModelData::Sprite(sprite)) => ModelKind::Sprite(sprite),
            // brush models only come from the map
            Some(ModelData::Brush(_)) => return Err(RefError::BadModelType(name.to_string())),
            None => {
                log::debug!("model {} not found", name);
                return Ok(None);
            }
        };
        Ok(Some(Model { name: name.to_string(), registration_sequence, kind }))
    }

    /// Stamp a model and the images it uses with the current sequence.
    fn touch_model(&mut self, handle: ModelHandle) -> RefResult<()> {
        let idx = handle.0 as usize;
        let Some(mut model) = self.models.known.get_mut(idx).and_then(Option::take) else {
            return Ok(());
        };
        model.registration_sequence = self.gfx.images.registration_sequence;

        let result = self.register_model_images(&mut model.kind);
        self.models.known[idx] = Some(model);
        result
    }

    fn register_model_images(&mut self, kind: &mut ModelKind) -> RefResult<()> {
        match kind {
            ModelKind::Sprite(sprite) => {
                for frame in sprite.frames.iter_mut() {
                    frame.image =
                        self.gfx.find_image(self.ri.as_mut(), &self.cvars, &frame.name, ImageType::Sprite)?;
                }
            }
            ModelKind::Alias(alias) => {
                alias.skins.clear();
                for name in &alias.skin_names {
                    let skin = self.gfx.find_image(self.ri.as_mut(), &self.cvars, name, ImageType::Skin)?;
                    alias.skins.push(skin);
                }
            }
            // texinfo images were stamped by begin_registration
            ModelKind::Brush(_) => {}
        }
        Ok(())
    }

    pub fn register_skin(&mut self, name: &str) -> RefResult<Option<ImageHandle>> {
        self.gfx.register_skin(self.ri.as_mut(), &self.cvars, name)
    }

    /// Free every model and image the level did not register.
    pub fn end_registration(&mut self) {
        let seq = self.gfx.images.registration_sequence;
        let mut freed = 0;
        for slot in self.models.known.iter_mut() {
            if slot.as_ref().map_or(false, |m| m.registration_sequence != seq) {
                *slot = None;
                freed += 1;
            }
        }
        if freed > 0 {
            log::debug!("freed {} unused models", freed);
        }
        self.gfx.free_unused_images();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gx2::Gx2Command;
    use crate::refimport::ImageData;
    use crate::testutil::{box_world, renderer, renderer_with_world, TI_WALL};
    use crate::wiiu_model_types::{AliasModel, SpriteFrame, SpriteModel};

    fn sprite(image: &str) -> ModelData {
        ModelData::Sprite(SpriteModel {
            frames: vec![SpriteFrame { width: 16, height: 16, name: image.to_string(), ..Default::default() }],
        })
    }

    // ============================================================
    // World
    // ============================================================

    #[test]
    fn test_begin_registration_loads_world() {
        let (mut rs, _host, rec) = renderer();
        let seq = rs.gfx.images.registration_sequence;
        rs.begin_registration("box").unwrap();

        assert_eq!(rs.models.world_name, "maps/box.bsp");
        assert_eq!(rs.gfx.images.registration_sequence, seq + 1);
        assert_eq!(rs.gfx.lightmaps.len(), 1);

        let world = rs.models.world.as_ref().unwrap();
        let wall = world.texinfo[TI_WALL as usize].image;
        assert_ne!(wall, rs.gfx.images.fallback());
        assert_eq!(rs.gfx.images.get(wall).unwrap().name, "textures/e1u1/wall.wal");
        assert_eq!(rs.frame.viewcluster, -1);
        assert!(rec.commands().iter().any(|c| matches!(c, Gx2Command::CreateTexture { width: 4, height: 4, .. })));
    }

    #[test]
    fn test_missing_map() {
        let (mut rs, _host, _rec) = renderer();
        let err = rs.begin_registration("q2dm1").unwrap_err();
        assert!(matches!(err, RefError::ModelMissing(ref n) if n == "maps/q2dm1.bsp"));
        assert!(rs.models.world.is_none());
    }

    #[test]
    fn test_missing_wall_texture_uses_notexture() {
        let (mut rs, host, _rec) = renderer();
        let mut world = box_world();
        world.texinfo[TI_WALL as usize].texture = "e1u1/missing".to_string();
        host.add_model("maps/holes.bsp", ModelData::Brush(world));
        rs.begin_registration("holes").unwrap();

        let world = rs.models.world.as_ref().unwrap();
        assert_eq!(world.texinfo[TI_WALL as usize].image, rs.gfx.images.fallback());
        assert!(host.printed().iter().any(|l| l == "Couldn't load textures/e1u1/missing.wal\n"));
    }

    #[test]
    fn test_same_map_is_kept() {
        let (mut rs, _host, rec) = renderer_with_world();
        rec.clear();
        rs.begin_registration("box").unwrap();
        rs.end_registration();
        // no lightmap re-upload, no texture reload
        assert!(!rec.commands().iter().any(|c| matches!(c, Gx2Command::CreateTexture { .. })));
        assert!(!rec.commands().iter().any(|c| matches!(c, Gx2Command::DestroyTexture(_))));
    }

    // ============================================================
    // Models
    // ============================================================

    #[test]
    fn test_register_model_caches_by_name() {
        let (mut rs, host, _rec) = renderer_with_world();
        host.add_image("sprites/s_bubble_0.pcx", ImageData::solid(16, 16, [255; 4]));
        host.add_model("sprites/s_bubble.sp2", sprite("sprites/s_bubble_0.pcx"));

        let a = rs.register_model("sprites/s_bubble.sp2").unwrap().unwrap();
        let b = rs.register_model("sprites/s_bubble.sp2").unwrap().unwrap();
        assert_eq!(a, b);
        let Some(Model { kind: ModelKind::Sprite(s), .. }) = rs.models.get(a) else {
            panic!("not a sprite");
        };
        assert!(s.frames[0].image.is_some());

        assert_eq!(rs.register_model("").unwrap(), None);
        assert_eq!(rs.register_model("models/nothing.md2").unwrap(), None);
    }

    #[test]
    fn test_alias_skins_resolved() {
        let (mut rs, host, _rec) = renderer_with_world();
        host.add_image("models/monsters/soldier/skin.pcx", ImageData::solid(32, 32, [200; 4]));
        host.add_model(
            "models/monsters/soldier/tris.md2",
            ModelData::Alias(AliasModel {
                skin_names: vec!["models/monsters/soldier/skin.pcx".into(), "models/monsters/soldier/pain.pcx".into()],
                ..Default::default()
            }),
        );
        let h = rs.register_model("models/monsters/soldier/tris.md2").unwrap().unwrap();
        let Some(Model { kind: ModelKind::Alias(a), .. }) = rs.models.get(h) else {
            panic!("not an alias model");
        };
        assert_eq!(a.skins.len(), 2);
        assert!(a.skins[0].is_some());
        assert!(a.skins[1].is_none());
    }

    #[test]
    fn test_inline_models() {
        let (mut rs, _host, _rec) = renderer_with_world();
        let h = rs.register_model("*1").unwrap().unwrap();
        let Some(Model { kind: ModelKind::Brush(inline), .. }) = rs.models.get(h) else {
            panic!("not a brush model");
        };
        assert_eq!(inline.submodel, 1);
        assert_eq!(inline.firstface, 5);

        assert!(matches!(rs.register_model("*9"), Err(RefError::ModelMissing(_))));
        assert!(matches!(rs.register_model("*0"), Err(RefError::ModelMissing(_))));
    }

    #[test]
    fn test_inline_model_without_world() {
        let (mut rs, _host, _rec) = renderer();
        assert!(matches!(rs.register_model("*1"), Err(RefError::NoWorldModel)));
    }

    #[test]
    fn test_brush_data_for_model_name() {
        let (mut rs, host, _rec) = renderer_with_world();
        host.add_model("models/objects/box.md2", ModelData::Brush(box_world()));
        let err = rs.register_model("models/objects/box.md2").unwrap_err();
        assert!(matches!(err, RefError::BadModelType(_)));
    }

    #[test]
    fn test_new_map_drops_inline_models() {
        let (mut rs, host, _rec) = renderer_with_world();
        let h = rs.register_model("*2").unwrap().unwrap();
        host.add_model("maps/base1.bsp", ModelData::Brush(box_world()));
        rs.begin_registration("base1").unwrap();
        assert!(rs.models.get(h).is_none());
        assert_eq!(rs.models.world_name, "maps/base1.bsp");
    }

    // ============================================================
    // End registration
    // ============================================================

    #[test]
    fn test_end_registration_frees_untouched() {
        let (mut rs, host, _rec) = renderer_with_world();
        host.add_image("sprites/a.pcx", ImageData::solid(8, 8, [255; 4]));
        host.add_image("sprites/b.pcx", ImageData::solid(8, 8, [255; 4]));
        host.add_model("sprites/a.sp2", sprite("sprites/a.pcx"));
        host.add_model("sprites/b.sp2", sprite("sprites/b.pcx"));

        let a = rs.register_model("sprites/a.sp2").unwrap().unwrap();
        let b = rs.register_model("sprites/b.sp2").unwrap().unwrap();
        rs.end_registration();
        assert!(rs.models.get(a).is_some());

        // next level only uses b
        rs.begin_registration("box").unwrap();
        rs.register_model("sprites/b.sp2").unwrap();
        rs.end_registration();

        assert!(rs.models.get(a).is_none());
        assert!(rs.models.get(b).is_some());
        assert!(rs.gfx.images.find("sprites/a.pcx").is_none());
        assert!(rs.gfx.images.find("sprites/b.pcx").is_some());
        // world textures and the console font survive
        assert!(rs.gfx.images.find("textures/e1u1/wall.wal").is_some());
        assert!(rs.gfx.images.draw_chars.is_some());
    }

    #[test]
    fn test_register_skin() {
        let (mut rs, host, _rec) = renderer_with_world();
        host.add_image("players/male/grunt.pcx", ImageData::solid(32, 32, [90; 4]));
        assert!(rs.register_skin("players/male/grunt.pcx").unwrap().is_some());
        assert!(rs.register_skin("players/male/nobody.pcx").unwrap().is_none());
    }
}
