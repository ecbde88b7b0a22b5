//! How packs are stored by kinolay:
//! 1. Inside a directory called `packs`, every pack gets its own subdirectory.
//! 2. The name of the subdirectory serves as the id of the pack.
//! 3. Inside it lives `pack.json`, the pack itself.
//!
//! The manager's own state (which packs are enabled) sits next to `packs` in
//! `pack_manager_config.json` so the pack directories stay shareable as they are.

mod bus;
mod live_pack;
pub mod overlay;

use std::io::Read;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use indexmap::IndexMap;
use kino_core::prelude::*;
use kino_render::KinoRenderer;
use kinolink::KinoLink;
use tracing::warn;
use url::Url;

pub use bus::{ImportProgress, PackEntry, Settings, SettingsBus, UiBridge, UiMessage};
use live_pack::LoadedPack;
use overlay::{MediaPlayer, VideoOverlay};

use crate::io::import_pack_from_bytes;
use crate::pack::{Pack, VideoMarker};

pub const PACK_LIST_URL: &str = "https://packlist.kinolay.com/packlist.json";

pub const PACK_MANAGER_DIRECTORY_NAME: &str = "pack_manager";
pub const MARKER_PACKS_DIRECTORY_NAME: &str = "packs";
pub const PACK_MANAGER_CONFIG_NAME: &str = "pack_manager_config.json";

/// pack downloads bigger than this are cut off (and fail to import)
const MAX_PACK_ARCHIVE_SIZE: u64 = 100 * 1024 * 1024;

/// It manages everything that has to do with marker packs.
/// 1. imports, loads, saves and deletes marker packs.
/// 2. owns the settings bus: windows subscribe for snapshots and talk back in
///    [UiMessage]s, never through direct references.
/// 3. owns the [VideoOverlay] and feeds it the enabled video markers of the current
///    map, every frame.
pub struct PackManager {
    /// pack manager directory, holds the manager's own config
    pack_manager_dir: Dir,
    /// packs directory. each subdirectory is an individual marker pack and the
    /// subdirectory's name is the pack's id
    marker_packs_dir: Dir,
    /// loaded packs by name. BTreeMap so the settings order is stable
    packs: BTreeMap<String, LoadedPack>,
    config: PackManagerConfig,
    config_dirty: bool,
    overlay: VideoOverlay,
    bus: SettingsBus,
    message_tx: Sender<UiMessage>,
    message_rx: Receiver<UiMessage>,
    import_status: Option<Arc<Mutex<ImportStatus>>>,
    /// what the settings snapshot tells the ui about importing. outlives
    /// `import_status` so the final done/error line stays visible
    import_progress: Option<ImportProgress>,
    page_requests: Vec<PageRequest>,
    current_map: u32,
    videos_dirty: bool,
    settings_changed: bool,
}

/// local (non shareable) manager state
#[derive(Debug, Default, Serialize, Deserialize)]
struct PackManagerConfig {
    /// packs absent from this map count as enabled
    enabled: BTreeMap<String, bool>,
}

/// a [UiMessage::ShowPage] waiting for the app shell to toggle the named window
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub path: String,
    pub show: bool,
}

#[derive(Debug, Default)]
pub enum ImportStatus {
    #[default]
    UnInitialized,
    WaitingForFileChooser,
    LoadingPack(PathBuf),
    Downloading(Url),
    PackDone(String, Pack),
    PackError(miette::Report),
}

/// The downloadable pack list shown on the `get_markers` page.
#[derive(Debug, Default, Deserialize)]
pub struct PackList {
    pub packs: IndexMap<String, PackListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PackListEntry {
    pub url: Url,
    pub description: String,
}

/// blocking. callers run it on a rayon thread
pub fn fetch_pack_list() -> Result<PackList> {
    ureq::get(PACK_LIST_URL)
        .call()
        .into_diagnostic()
        .wrap_err("failed to download the pack list")?
        .into_json()
        .into_diagnostic()
        .wrap_err("failed to deserialize the pack list")
}

impl PackManager {
    /// Creates a new instance of [PackManager].
    /// 1. opens (creating if needed) the pack manager and packs directories
    /// 2. loads the manager config
    /// 3. loads every pack subdirectory, skipping (and logging) broken ones
    pub fn new(kdir: &Dir, player: Box<dyn MediaPlayer>) -> Result<Self> {
        kdir.create_dir_all(PACK_MANAGER_DIRECTORY_NAME)
            .into_diagnostic()
            .wrap_err("failed to create pack manager directory")?;
        let pack_manager_dir = kdir
            .open_dir(PACK_MANAGER_DIRECTORY_NAME)
            .into_diagnostic()
            .wrap_err("failed to open pack manager directory")?;
        pack_manager_dir
            .create_dir_all(MARKER_PACKS_DIRECTORY_NAME)
            .into_diagnostic()
            .wrap_err("failed to create marker packs directory")?;
        let marker_packs_dir = pack_manager_dir
            .open_dir(MARKER_PACKS_DIRECTORY_NAME)
            .into_diagnostic()
            .wrap_err("failed to open marker packs dir")?;

        let config = if pack_manager_dir.exists(PACK_MANAGER_CONFIG_NAME) {
            match pack_manager_dir.read_to_string(PACK_MANAGER_CONFIG_NAME) {
                Ok(config_json) => match from_str(&config_json) {
                    Ok(config) => config,
                    Err(e) => {
                        error!(?e, "failed to deserialize pack manager config");
                        Default::default()
                    }
                },
                Err(e) => {
                    error!(?e, "failed to read pack manager config");
                    Default::default()
                }
            }
        } else {
            Default::default()
        };

        let mut packs: BTreeMap<String, LoadedPack> = Default::default();
        for entry in marker_packs_dir
            .entries()
            .into_diagnostic()
            .wrap_err("failed to get entries of marker packs dir")?
        {
            let entry = entry.into_diagnostic()?;
            if entry.metadata().into_diagnostic()?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name() {
                let pack_dir = entry
                    .open_dir()
                    .into_diagnostic()
                    .wrap_err("failed to open pack entry as directory")?;
                let span_guard = info_span!("loading pack from dir", name).entered();
                match LoadedPack::load_from_dir(pack_dir) {
                    Ok(lp) => {
                        packs.insert(name, lp);
                    }
                    Err(e) => {
                        error!(?e, "failed to load pack from directory");
                    }
                }
                drop(span_guard);
            }
        }

        let (message_tx, message_rx) = channel();
        Ok(Self {
            pack_manager_dir,
            marker_packs_dir,
            packs,
            config,
            config_dirty: false,
            overlay: VideoOverlay::new(player),
            bus: Default::default(),
            message_tx,
            message_rx,
            import_status: None,
            import_progress: None,
            page_requests: Vec::new(),
            current_map: 0,
            videos_dirty: true,
            settings_changed: true,
        })
    }

    /// A new window end of the settings bus. The window sends [UiMessage]s through it
    /// and receives settings snapshots; dropping the bridge unsubscribes.
    pub fn bridge(&mut self) -> UiBridge {
        self.bus.subscribe(self.message_tx.clone())
    }

    /// [UiMessage::ShowPage]s received since the last drain. The app shell maps the
    /// paths onto its windows.
    pub fn drain_page_requests(&mut self) -> Vec<PageRequest> {
        std::mem::take(&mut self.page_requests)
    }

    pub fn tick(
        &mut self,
        etx: &egui::Context,
        renderer: &mut KinoRenderer,
        link: &Option<Arc<KinoLink>>,
    ) {
        let messages: Vec<UiMessage> = self.message_rx.try_iter().collect();
        for message in messages {
            self.handle_message(message);
        }
        self.pump_import();
        if std::mem::take(&mut self.config_dirty) {
            self.save_config();
        }
        for pack in self.packs.values_mut() {
            pack.save_if_dirty();
        }
        if std::mem::take(&mut self.settings_changed) {
            let snapshot = Arc::new(self.snapshot());
            self.bus.broadcast(&snapshot);
        }

        self.overlay.tick(etx);
        let link = match link {
            Some(link) => link,
            None => {
                renderer.submit_screen(None);
                return;
            }
        };
        if self.current_map != link.map_id || std::mem::take(&mut self.videos_dirty) {
            self.on_map_changed(link);
        }
        self.overlay.check_distance(link.cam_pos);
        self.overlay.update_fade(link.cam_pos);
        renderer.submit_screen(self.overlay.screen().cloned());
    }

    pub fn menu_ui(&mut self, ui: &mut egui::Ui) {
        ui.menu_button("Packs", |ui| {
            for name in self.packs.keys() {
                let mut enabled = *self.config.enabled.get(name).unwrap_or(&true);
                if ui.checkbox(&mut enabled, name.as_str()).changed() {
                    self.config.enabled.insert(name.clone(), enabled);
                    self.config_dirty = true;
                    self.videos_dirty = true;
                    self.settings_changed = true;
                }
            }
        });
    }

    fn handle_message(&mut self, message: UiMessage) {
        match message {
            UiMessage::RequestSettings => {
                self.settings_changed = true;
            }
            UiMessage::NewMarkerGroup => {
                if let Err(e) = self.new_marker_group() {
                    error!(?e, "failed to create a new marker pack");
                }
            }
            UiMessage::LoadMarkerGroup => self.start_file_import(),
            UiMessage::ShowPage { path, show } => {
                self.page_requests.push(PageRequest { path, show });
            }
            UiMessage::SetPackEnabled { index, enabled } => self.set_pack_enabled(index, enabled),
            UiMessage::DeletePack { index } => self.delete_pack(index),
            UiMessage::InstallPack { name, url } => self.start_install(name, url),
            UiMessage::ClearImportStatus => {
                // forgetting a running import just means its result gets ignored
                self.import_status = None;
                self.import_progress = None;
                self.settings_changed = true;
            }
        }
    }

    fn new_marker_group(&mut self) -> Result<()> {
        let name = self.save_imported_pack("pack", Pack::default())?;
        info!(name, "created a new marker pack");
        self.settings_changed = true;
        self.videos_dirty = true;
        Ok(())
    }

    fn set_pack_enabled(&mut self, index: usize, enabled: bool) {
        let name = match self.packs.keys().nth(index) {
            Some(name) => name.clone(),
            None => {
                warn!(index, "stale pack index in SetPackEnabled");
                return;
            }
        };
        self.config.enabled.insert(name, enabled);
        self.config_dirty = true;
        self.videos_dirty = true;
        self.settings_changed = true;
    }

    fn delete_pack(&mut self, index: usize) {
        let name = match self.packs.keys().nth(index) {
            Some(name) => name.clone(),
            None => {
                warn!(index, "stale pack index in DeletePack");
                return;
            }
        };
        self.packs.remove(&name);
        self.config.enabled.remove(&name);
        self.config_dirty = true;
        if let Err(e) = self.marker_packs_dir.remove_dir_all(&name) {
            error!(?e, name, "failed to remove pack");
        } else {
            info!("deleted marker pack: {name}");
        }
        self.videos_dirty = true;
        self.settings_changed = true;
    }

    fn start_file_import(&mut self) {
        if self.import_status.is_some() {
            warn!("ignoring LoadMarkerGroup, an import is already in progress");
            return;
        }
        let import_status = Arc::new(Mutex::default());
        self.import_status = Some(import_status.clone());
        Self::pack_importer(import_status);
    }

    fn start_install(&mut self, name: String, url: Url) {
        if self.import_status.is_some() {
            warn!("ignoring InstallPack, an import is already in progress");
            return;
        }
        let import_status = Arc::new(Mutex::new(ImportStatus::Downloading(url.clone())));
        self.import_status = Some(import_status.clone());
        rayon::spawn(move || {
            let result = download_pack_bytes(&url).and_then(|bytes| import_pack_from_bytes(&bytes));
            *import_status.lock().unwrap() = match result {
                Ok(pack) => ImportStatus::PackDone(name, pack),
                Err(e) => ImportStatus::PackError(e),
            };
        });
    }

    fn pack_importer(import_status: Arc<Mutex<ImportStatus>>) {
        rayon::spawn(move || {
            *import_status.lock().unwrap() = ImportStatus::WaitingForFileChooser;

            if let Some(file_path) = rfd::FileDialog::new()
                .add_filter("kinolay pack", &["zip", "json"])
                .pick_file()
            {
                *import_status.lock().unwrap() = ImportStatus::LoadingPack(file_path.clone());
                let result = std::fs::read(&file_path)
                    .into_diagnostic()
                    .wrap_err("failed to read pack file")
                    .and_then(|bytes| import_pack_from_bytes(&bytes));
                let name = file_path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_default();
                *import_status.lock().unwrap() = match result {
                    Ok(pack) => ImportStatus::PackDone(name, pack),
                    Err(e) => ImportStatus::PackError(e),
                };
            } else {
                *import_status.lock().unwrap() =
                    ImportStatus::PackError(miette::miette!("file chooser was cancelled"));
            }
        });
    }

    /// moves finished imports into the pack set and mirrors the running state into
    /// [ImportProgress] for the settings snapshot
    fn pump_import(&mut self) {
        let status = match self.import_status.clone() {
            Some(status) => status,
            None => return,
        };
        let mut guard = match status.lock() {
            Ok(guard) => guard,
            Err(_) => {
                error!("import status mutex is poisoned, dropping the import");
                self.import_status = None;
                return;
            }
        };
        let progress = match &mut *guard {
            ImportStatus::UnInitialized | ImportStatus::WaitingForFileChooser => {
                ImportProgress::WaitingForFileChooser
            }
            ImportStatus::LoadingPack(path) => {
                ImportProgress::Loading(path.display().to_string())
            }
            ImportStatus::Downloading(url) => ImportProgress::Loading(url.to_string()),
            ImportStatus::PackDone(name, pack) => {
                let base = std::mem::take(name);
                let pack = std::mem::take(pack);
                drop(guard);
                self.import_status = None;
                self.import_progress = Some(match self.save_imported_pack(&base, pack) {
                    Ok(name) => {
                        info!(name, "imported a marker pack");
                        ImportProgress::Done(name)
                    }
                    Err(e) => {
                        error!(?e, "failed to save imported pack");
                        ImportProgress::Error(e.to_string())
                    }
                });
                self.videos_dirty = true;
                self.settings_changed = true;
                return;
            }
            ImportStatus::PackError(e) => {
                let message = e.to_string();
                drop(guard);
                self.import_status = None;
                self.import_progress = Some(ImportProgress::Error(message));
                self.settings_changed = true;
                return;
            }
        };
        if self.import_progress.as_ref() != Some(&progress) {
            self.import_progress = Some(progress);
            self.settings_changed = true;
        }
    }

    /// saves `pack` under a unique name derived from `base` and loads it
    fn save_imported_pack(&mut self, base: &str, pack: Pack) -> Result<String> {
        let taken: BTreeSet<String> = self.packs.keys().cloned().collect();
        let name = unique_pack_name(&taken, base);
        self.marker_packs_dir
            .create_dir_all(&name)
            .into_diagnostic()
            .wrap_err("failed to create directory for pack")?;
        let dir = self
            .marker_packs_dir
            .open_dir(&name)
            .into_diagnostic()
            .wrap_err("failed to open marker pack directory to save pack")?;
        let mut loaded_pack = LoadedPack::new(pack, dir);
        loaded_pack.save()?;
        self.packs.insert(name.clone(), loaded_pack);
        Ok(name)
    }

    fn on_map_changed(&mut self, link: &KinoLink) {
        info!(
            self.current_map,
            link.map_id, "rebuilding the video marker list"
        );
        self.current_map = link.map_id;
        self.overlay.clear_videos();
        if link.map_id == 0 {
            return;
        }
        let markers: Vec<VideoMarker> = self
            .packs
            .iter()
            .filter(|(name, _)| *self.config.enabled.get(*name).unwrap_or(&true))
            .flat_map(|(_, pack)| {
                pack.pack
                    .videos
                    .iter()
                    .filter(|marker| marker.map_id == link.map_id)
                    .cloned()
            })
            .collect();
        for marker in markers {
            self.overlay.add_video(marker);
        }
    }

    fn snapshot(&self) -> Settings {
        Settings {
            marker_packs: self
                .packs
                .iter()
                .map(|(name, pack)| PackEntry {
                    name: name.clone(),
                    enabled: *self.config.enabled.get(name).unwrap_or(&true),
                    video_count: pack.pack.videos.len(),
                })
                .collect(),
            import: self.import_progress.clone(),
        }
    }

    fn save_config(&mut self) {
        match to_string_pretty(&self.config) {
            Ok(config_json) => {
                if let Err(e) = self
                    .pack_manager_dir
                    .write(PACK_MANAGER_CONFIG_NAME, config_json)
                {
                    error!(?e, "failed to write pack manager config");
                }
            }
            Err(e) => {
                error!(?e, "failed to serialize pack manager config");
            }
        }
    }
}

fn download_pack_bytes(url: &Url) -> Result<Vec<u8>> {
    let response = ureq::get(url.as_str())
        .call()
        .into_diagnostic()
        .wrap_err("failed to download pack")?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_PACK_ARCHIVE_SIZE)
        .read_to_end(&mut bytes)
        .into_diagnostic()
        .wrap_err("failed to read pack download")?;
    Ok(bytes)
}

/// pack names double as directory names, so anything path-ish gets replaced
fn sanitize_pack_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim().to_string();
    if sanitized.is_empty() {
        "pack".to_string()
    } else {
        sanitized
    }
}

fn unique_pack_name(taken: &BTreeSet<String>, base: &str) -> String {
    let base = sanitize_pack_name(base);
    if !taken.contains(&base) {
        return base;
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{base}_{suffix}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
