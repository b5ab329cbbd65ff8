// error.rs: renderer error taxonomy

use q2wiiu_common::q_shared::ErrorLevel;
use thiserror::Error;

/// Which frame arena an allocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaKind {
    Attribute,
    Index,
    Uniform,
}

impl std::fmt::Display for ArenaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ArenaKind::Attribute => "attribute",
            ArenaKind::Index => "index",
            ArenaKind::Uniform => "uniform",
        })
    }
}

#[derive(Debug, Error)]
pub enum RefError {
    #[error("failed to load shader group {name}: {reason}")]
    ShaderLoad { name: String, reason: String },
    #[error("shader program {0} is not loaded")]
    ShaderMissing(&'static str),
    #[error("MAX_GLTEXTURES")]
    ImageTableFull,
    #[error("render view with no world model")]
    NoWorldModel,
    #[error("{0}: bad modeltype")]
    BadModelType(String),
    #[error("Mod_NumForName: {0} not found")]
    ModelMissing(String),
    #[error("mod_numknown == MAX_MOD_KNOWN")]
    ModelTableFull,
    #[error("Draw_Fill: bad color {0}")]
    BadFillColor(i32),
    #[error("couldn't load {0}")]
    PicMissing(String),
    #[error("{kind} arena overrun: {requested} bytes requested, capacity {capacity}")]
    ArenaOverrun {
        kind: ArenaKind,
        requested: u32,
        capacity: u32,
    },
    #[error("{kind} arena wrapped onto data of the current frame")]
    ArenaFence { kind: ArenaKind },
    #[error("gx2: {0}")]
    Device(String),
    #[error("config: {0}")]
    Config(String),
}

impl RefError {
    /// Everything except configuration problems escalates to the host.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RefError::Config(_))
    }

    /// Error level handed to `sys_error` for fatal errors.
    pub fn level(&self) -> ErrorLevel {
        match self {
            RefError::BadFillColor(_) | RefError::PicMissing(_) => ErrorLevel::Fatal,
            _ => ErrorLevel::Drop,
        }
    }
}

impl From<q2wiiu_common::config::ConfigError> for RefError {
    fn from(e: q2wiiu_common::config::ConfigError) -> Self {
        RefError::Config(e.to_string())
    }
}

pub type RefResult<T> = Result<T, RefError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RefError::NoWorldModel.is_fatal());
        assert!(RefError::ImageTableFull.is_fatal());
        assert!(RefError::BadModelType("models/x.md2".into()).is_fatal());
        assert!(!RefError::Config("bad".into()).is_fatal());
    }

    #[test]
    fn test_error_levels() {
        assert_eq!(RefError::BadFillColor(300).level(), ErrorLevel::Fatal);
        assert_eq!(RefError::NoWorldModel.level(), ErrorLevel::Drop);
    }

    #[test]
    fn test_messages() {
        let e = RefError::ArenaOverrun {
            kind: ArenaKind::Uniform,
            requested: 4096,
            capacity: 1024,
        };
        assert_eq!(
            e.to_string(),
            "uniform arena overrun: 4096 bytes requested, capacity 1024"
        );
        assert_eq!(RefError::BadFillColor(256).to_string(), "Draw_Fill: bad color 256");
    }
}
