use kino_core::prelude::*;
use tracing::error;

use crate::io::{load_pack_from_dir, save_pack_to_dir};
use crate::pack::Pack;

/// A pack that is loaded into the manager, together with the directory it lives in
/// and whether it has unsaved edits.
pub(crate) struct LoadedPack {
    /// The directory this pack is stored in. Its name is the pack's id.
    pub dir: Dir,
    pub pack: Pack,
    dirty: bool,
}

impl LoadedPack {
    /// a brand new pack. starts dirty so it reaches disk on the next tick
    pub fn new(pack: Pack, dir: Dir) -> Self {
        Self {
            dir,
            pack,
            dirty: true,
        }
    }

    pub fn load_from_dir(dir: Dir) -> Result<Self> {
        let pack = load_pack_from_dir(&dir)?;
        Ok(Self {
            dir,
            pack,
            dirty: false,
        })
    }

    #[allow(unused)]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// saves if there's anything to save. failures are logged and the pack stays
    /// dirty, so the next tick retries
    pub fn save_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        match self.save() {
            Ok(_) => {}
            Err(e) => {
                error!(?e, "failed to save marker pack");
            }
        }
    }

    pub fn save(&mut self) -> Result<()> {
        save_pack_to_dir(&self.pack, &self.dir)?;
        self.dirty = false;
        Ok(())
    }
}
