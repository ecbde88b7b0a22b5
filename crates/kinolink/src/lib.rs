//! kinolink reads the camera link that the game (or its companion shim) shares with
//! overlay clients.
//!
//! The link is a small pod struct ([ctypes::CKinoLink]) that the writer refreshes every
//! frame it renders, stored in a file under the runtime dir (`$XDG_RUNTIME_DIR`, falling
//! back to `/dev/shm`). Readers like kinolay poll it once per frame, which is cheap
//! enough that no notification mechanism is needed.

pub mod ctypes;

use std::path::PathBuf;
use std::sync::Arc;

use egui::DragValue;
use enumflags2::{bitflags, BitFlags};
use glam::{IVec2, Vec3};
use miette::Result;
use tracing::warn;

use ctypes::{CKinoLink, C_KINO_LINK_SIZE};

/// The default link name. games that support multiboxing let the user override it.
pub const DEFAULT_KINOLINK_NAME: &str = "KinoLink";

/// A typed snapshot of the link for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KinoLink {
    /// update count of the link. zero means "no game", and such links are never
    /// handed out by [LinkManager::tick]
    pub ui_tick: u32,
    /// camera position
    pub cam_pos: Vec3,
    /// direction the camera is facing
    pub cam_front: Vec3,
    /// player character position
    pub player_pos: Vec3,
    /// vertical field of view in radians
    pub fov: f32,
    /// id of the current map
    pub map_id: u32,
    /// name of the character currently logged in
    pub name: String,
    /// position of the game's client area in screen coordinates
    pub client_pos: IVec2,
    /// size of the game's client area in screen coordinates
    pub client_size: IVec2,
    pub process_id: u32,
    /// what changed since the previous snapshot
    pub changes: BitFlags<LinkChanges>,
}

/// These flags represent the changes in the link compared to the previous frame's
/// values. The overlay only repositions its window or rebuilds its marker lists when
/// the relevant flag is set.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkChanges {
    UiTick = 1,
    Map = 1 << 1,
    Character = 1 << 2,
    WindowPosition = 1 << 3,
    WindowSize = 1 << 4,
}

/// Polls the link file and caches the previous snapshot so that each tick can report
/// what changed. A vanished or zeroed link resets the cache, so a game restart is
/// picked up as a fresh set of change flags.
pub struct LinkManager {
    path: PathBuf,
    link: Arc<KinoLink>,
}

impl LinkManager {
    pub fn new(name: &str) -> Result<Self> {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/dev/shm"));
        Ok(Self {
            path: runtime_dir.join(name),
            link: Arc::new(Default::default()),
        })
    }

    /// Reads the latest link. `Ok(None)` means there's no game right now, which is a
    /// normal state for an overlay, not an error.
    pub fn tick(&mut self) -> Result<Option<Arc<KinoLink>>> {
        let buffer = match std::fs::read(&self.path) {
            Ok(buffer) => buffer,
            Err(_) => {
                // no link file. reset so the next writer triggers change flags
                if self.link.ui_tick != 0 {
                    self.link = Arc::new(Default::default());
                }
                return Ok(None);
            }
        };
        if buffer.len() < C_KINO_LINK_SIZE {
            warn!(
                len = buffer.len(),
                "link file is smaller than the link struct"
            );
            return Ok(None);
        }
        let cl: CKinoLink = bytemuck::pod_read_unaligned(&buffer[..C_KINO_LINK_SIZE]);
        if cl.ui_version != CKinoLink::UI_VERSION {
            warn!(cl.ui_version, "link file has an unknown version");
            return Ok(None);
        }
        if cl.ui_tick == 0 {
            if self.link.ui_tick != 0 {
                self.link = Arc::new(Default::default());
            }
            return Ok(None);
        }
        let link = Arc::new(diff_link(&self.link, &cl));
        self.link = link.clone();
        Ok(Some(link))
    }

    pub fn gui(&mut self, etx: &egui::Context, open: &mut bool) {
        egui::Window::new("Link").open(open).show(etx, |ui| {
            if self.link.ui_tick == 0 {
                ui.label("link is not initialized");
            } else {
                let link: KinoLink = self.link.as_ref().clone();
                link_ui(ui, link);
            }
        });
    }
}

/// Builds this frame's snapshot and records which fields moved since `previous`.
fn diff_link(previous: &KinoLink, cl: &CKinoLink) -> KinoLink {
    let mut changes: BitFlags<LinkChanges> = Default::default();
    let name = cl.name_str().to_string();
    let client_pos = IVec2::new(cl.client_pos[0], cl.client_pos[1]);
    let client_size = IVec2::new(cl.client_size[0], cl.client_size[1]);
    if previous.ui_tick != cl.ui_tick {
        changes.insert(LinkChanges::UiTick);
    }
    if previous.map_id != cl.map_id {
        changes.insert(LinkChanges::Map);
    }
    if previous.name != name {
        changes.insert(LinkChanges::Character);
    }
    if previous.client_pos != client_pos {
        changes.insert(LinkChanges::WindowPosition);
    }
    if previous.client_size != client_size {
        changes.insert(LinkChanges::WindowSize);
    }
    KinoLink {
        ui_tick: cl.ui_tick,
        cam_pos: cl.f_camera_position.into(),
        cam_front: cl.f_camera_front.into(),
        player_pos: cl.f_player_position.into(),
        fov: cl.fov,
        map_id: cl.map_id,
        name,
        client_pos,
        client_size,
        process_id: cl.process_id,
        changes,
    }
}

fn link_ui(ui: &mut egui::Ui, mut link: KinoLink) {
    egui::Grid::new("link grid")
        .num_columns(2)
        .striped(true)
        .show(ui, |ui| {
            ui.label("ui tick");
            ui.add(DragValue::new(&mut link.ui_tick));
            ui.end_row();
            ui.label("camera position");
            ui.horizontal(|ui| {
                ui.add(DragValue::new(&mut link.cam_pos.x));
                ui.add(DragValue::new(&mut link.cam_pos.y));
                ui.add(DragValue::new(&mut link.cam_pos.z));
            });
            ui.end_row();
            ui.label("camera direction");
            ui.horizontal(|ui| {
                ui.add(DragValue::new(&mut link.cam_front.x));
                ui.add(DragValue::new(&mut link.cam_front.y));
                ui.add(DragValue::new(&mut link.cam_front.z));
            });
            ui.end_row();
            ui.label("player position");
            ui.horizontal(|ui| {
                ui.add(DragValue::new(&mut link.player_pos.x));
                ui.add(DragValue::new(&mut link.player_pos.y));
                ui.add(DragValue::new(&mut link.player_pos.z));
            });
            ui.end_row();
            ui.label("fov");
            ui.add(DragValue::new(&mut link.fov));
            ui.end_row();
            ui.label("character");
            ui.label(&link.name);
            ui.end_row();
            ui.label("map id");
            ui.add(DragValue::new(&mut link.map_id));
            ui.end_row();
            ui.label("client pos");
            ui.horizontal(|ui| {
                ui.add(DragValue::new(&mut link.client_pos.x));
                ui.add(DragValue::new(&mut link.client_pos.y));
            });
            ui.end_row();
            ui.label("client size");
            ui.horizontal(|ui| {
                ui.add(DragValue::new(&mut link.client_size.x));
                ui.add(DragValue::new(&mut link.client_size.y));
            });
            ui.end_row();
        });
}

#[cfg(test)]
mod test {
    use rstest::*;
    use similar_asserts::assert_eq;

    use super::*;

    #[fixture]
    fn raw_link() -> CKinoLink {
        let mut cl = CKinoLink {
            ui_version: CKinoLink::UI_VERSION,
            ui_tick: 7,
            f_camera_position: [1.0, 2.0, 3.0],
            f_camera_front: [0.0, 0.0, 1.0],
            f_player_position: [1.0, 0.0, 3.0],
            fov: 1.01,
            map_id: 50,
            process_id: 4242,
            client_pos: [10, 20],
            client_size: [1920, 1080],
            ..Default::default()
        };
        cl.name[..5].copy_from_slice(b"kirin");
        cl
    }

    #[rstest]
    fn first_snapshot_flags_everything(raw_link: CKinoLink) {
        let link = diff_link(&KinoLink::default(), &raw_link);
        assert!(link.changes.contains(LinkChanges::UiTick));
        assert!(link.changes.contains(LinkChanges::Map));
        assert!(link.changes.contains(LinkChanges::Character));
        assert!(link.changes.contains(LinkChanges::WindowPosition));
        assert!(link.changes.contains(LinkChanges::WindowSize));
        assert_eq!(link.cam_pos, glam::vec3(1.0, 2.0, 3.0));
        assert_eq!(link.name, "kirin");
    }

    #[rstest]
    fn only_moved_fields_get_flagged(raw_link: CKinoLink) {
        let previous = diff_link(&KinoLink::default(), &raw_link);
        let mut cl = raw_link;
        cl.ui_tick += 1;
        cl.client_size = [800, 600];
        let link = diff_link(&previous, &cl);
        assert!(link.changes.contains(LinkChanges::UiTick));
        assert!(link.changes.contains(LinkChanges::WindowSize));
        assert!(!link.changes.contains(LinkChanges::Map));
        assert!(!link.changes.contains(LinkChanges::Character));
        assert!(!link.changes.contains(LinkChanges::WindowPosition));
    }

    #[rstest]
    fn unchanged_link_flags_nothing(raw_link: CKinoLink) {
        let previous = diff_link(&KinoLink::default(), &raw_link);
        let link = diff_link(&previous, &raw_link);
        assert_eq!(link.changes, BitFlags::empty());
    }
}
