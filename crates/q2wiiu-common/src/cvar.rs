// cvar.rs: console variable registry shared by the host and the renderer

use std::collections::HashMap;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        /// Saved to the config file.
        const ARCHIVE = 1;
    }
}

/// Index of a cvar in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CvarId(pub usize);

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

/// The cvar registry.
#[derive(Debug, Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a cvar by name, returning its id.
    pub fn find_var(&self, name: &str) -> Option<CvarId> {
        self.cvar_index.get(name).copied().map(CvarId)
    }

    pub fn cvar(&self, id: CvarId) -> Option<&Cvar> {
        self.cvar_vars.get(id.0)
    }

    /// String value, "" if the cvar does not exist.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name)
            .and_then(|id| self.cvar(id))
            .map_or("", |v| v.string.as_str())
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> CvarId {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return CvarId(idx);
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        CvarId(idx)
    }

    /// Set a cvar value, creating it if needed.
    pub fn set(&mut self, name: &str, value: &str) -> CvarId {
        let Some(id) = self.find_var(name) else {
            return self.get(name, value, CvarFlags::empty());
        };
        let var = &mut self.cvar_vars[id.0];
        if var.string == value {
            return id; // not changed
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        id
    }

    /// Set a cvar from a float value.
    pub fn set_value(&mut self, name: &str, value: f32) -> CvarId {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str)
    }

    /// Returns whether the cvar changed since the last call and clears
    /// the flag.
    pub fn take_modified(&mut self, id: CvarId) -> bool {
        match self.cvar_vars.get_mut(id.0) {
            Some(var) => std::mem::take(&mut var.modified),
            None => false,
        }
    }
}

// ============================================================
// Tests
// ============================================================
