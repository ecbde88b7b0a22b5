use std::sync::{Arc, Mutex};

use kino_pack_format::manager::{fetch_pack_list, PackList, UiBridge, UiMessage};
use tracing::error;
use url::Url;

/// The `get_markers` page: browses the online pack list and installs packs from it.
///
/// The list download runs on a rayon thread the first time the window opens; the
/// install itself is just an [UiMessage::InstallPack] send, the manager does the rest.
pub struct PackSearchWindow {
    bridge: UiBridge,
    status: Option<Arc<Mutex<PackListStatus>>>,
}

#[derive(Default)]
enum PackListStatus {
    #[default]
    Fetching,
    Done(PackList),
    Error(String),
}

impl PackSearchWindow {
    pub fn new(bridge: UiBridge) -> Self {
        Self {
            bridge,
            status: None,
        }
    }

    fn install(&self, name: String, url: Url) {
        self.bridge.send(UiMessage::InstallPack { name, url });
    }

    fn start_fetch(&mut self) {
        let status = Arc::new(Mutex::new(PackListStatus::Fetching));
        self.status = Some(status.clone());
        rayon::spawn(move || {
            let result = match fetch_pack_list() {
                Ok(list) => PackListStatus::Done(list),
                Err(e) => {
                    error!(?e, "failed to fetch the pack list");
                    PackListStatus::Error(e.to_string())
                }
            };
            *status.lock().unwrap() = result;
        });
    }

    pub fn gui(&mut self, etx: &egui::Context, open: &mut bool) {
        if *open && self.status.is_none() {
            self.start_fetch();
        }
        egui::Window::new("Get Marker Packs")
            .open(open)
            .show(etx, |ui| {
                let status = match self.status.as_ref() {
                    Some(status) => status.clone(),
                    None => return,
                };
                let mut refetch = false;
                match &*status.lock().unwrap() {
                    PackListStatus::Fetching => {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label("downloading the pack list");
                        });
                    }
                    PackListStatus::Done(list) => {
                        egui::Grid::new("pack list")
                            .striped(true)
                            .num_columns(3)
                            .show(ui, |ui| {
                                for (name, entry) in &list.packs {
                                    ui.label(name);
                                    ui.label(&entry.description);
                                    if ui.button("install").clicked() {
                                        self.install(name.clone(), entry.url.clone());
                                    }
                                    ui.end_row();
                                }
                            });
                        refetch = ui.button("refresh").clicked();
                    }
                    PackListStatus::Error(message) => {
                        ui.colored_label(
                            egui::Color32::RED,
                            format!("failed to download the pack list: {message}"),
                        );
                        refetch = ui.button("retry").clicked();
                    }
                }
                if refetch {
                    self.start_fetch();
                }
            });
    }
}
