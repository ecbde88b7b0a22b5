use std::sync::Arc;

use kino_pack_format::manager::{ImportProgress, PackEntry, Settings, UiBridge, UiMessage};

use super::MenuPanel;

/// The marker pack list window.
///
/// It owns no pack state at all: it renders the latest [Settings] snapshot that came
/// over the bus and fires [UiMessage]s back at the manager. A window that never got a
/// snapshot simply shows an empty list.
pub struct PacksWindow {
    bridge: UiBridge,
    settings: Option<Arc<Settings>>,
    requested: bool,
}

/// One row of the pack list, addressed by its index in the snapshot's order. The path
/// prefix keeps the row's widget ids stable while packs get added and removed around it.
struct PackRow<'a> {
    entry: &'a PackEntry,
    index: usize,
    path: String,
}

impl PacksWindow {
    pub fn new(bridge: UiBridge) -> Self {
        Self {
            bridge,
            settings: None,
            requested: false,
        }
    }

    /// Once per frame: ask for the first snapshot once, then keep whatever newer
    /// snapshots arrived since.
    pub fn tick(&mut self) {
        if !std::mem::replace(&mut self.requested, true) {
            self.bridge.send(UiMessage::RequestSettings);
        }
        if let Some(settings) = self.bridge.latest_settings() {
            self.settings = Some(settings);
        }
    }

    fn rows(settings: Option<&Settings>) -> Vec<PackRow> {
        settings
            .map(|settings| {
                settings
                    .marker_packs
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| PackRow {
                        entry,
                        index,
                        path: format!("marks.{index}."),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn open_search(&self) {
        self.bridge.send(UiMessage::ShowPage {
            path: MenuPanel::SEARCH_PAGE.to_string(),
            show: true,
        });
    }

    fn new_pack(&self) {
        self.bridge.send(UiMessage::NewMarkerGroup);
    }

    fn load_pack(&self) {
        self.bridge.send(UiMessage::LoadMarkerGroup);
    }

    fn set_enabled(&self, index: usize, enabled: bool) {
        self.bridge.send(UiMessage::SetPackEnabled { index, enabled });
    }

    fn delete(&self, index: usize) {
        self.bridge.send(UiMessage::DeletePack { index });
    }

    fn clear_import_status(&self) {
        self.bridge.send(UiMessage::ClearImportStatus);
    }

    pub fn gui(&mut self, etx: &egui::Context, open: &mut bool) {
        egui::Window::new("Marker Packs").open(open).show(etx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button("get packs")
                    .on_hover_text("browse the online pack list")
                    .clicked()
                {
                    self.open_search();
                }
                if ui.button("new").clicked() {
                    self.new_pack();
                }
                if ui
                    .button("load")
                    .on_hover_text("import a pack from a json or zip file")
                    .clicked()
                {
                    self.load_pack();
                }
            });
            ui.separator();
            egui::Grid::new("marker packs")
                .striped(true)
                .num_columns(4)
                .show(ui, |ui| {
                    for row in Self::rows(self.settings.as_deref()) {
                        ui.push_id((row.path.as_str(), "enabled"), |ui| {
                            let mut enabled = row.entry.enabled;
                            if ui.checkbox(&mut enabled, "").changed() {
                                self.set_enabled(row.index, enabled);
                            }
                        });
                        ui.label(&row.entry.name);
                        ui.label(format!("{} videos", row.entry.video_count));
                        ui.push_id((row.path.as_str(), "delete"), |ui| {
                            if ui.button("delete").clicked() {
                                self.delete(row.index);
                            }
                        });
                        ui.end_row();
                    }
                });
            if let Some(import) = self.settings.as_ref().and_then(|s| s.import.as_ref()) {
                ui.separator();
                match import {
                    ImportProgress::WaitingForFileChooser => {
                        ui.label("waiting for the file dialog. choose a json or zip file");
                    }
                    ImportProgress::Loading(source) => {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label(format!("importing from {source}"));
                        });
                    }
                    ImportProgress::Done(name) => {
                        ui.colored_label(egui::Color32::GREEN, format!("imported pack: {name}"));
                    }
                    ImportProgress::Error(message) => {
                        ui.colored_label(
                            egui::Color32::RED,
                            format!("failed to import pack: {message}"),
                        );
                    }
                }
                if ui.button("clear").clicked() {
                    self.clear_import_status();
                }
            }
        });
    }
}

#[cfg(test)]
mod test {
    use std::sync::mpsc::{channel, Receiver};

    use kino_pack_format::manager::SettingsBus;
    use similar_asserts::assert_eq;

    use super::*;

    fn window() -> (PacksWindow, SettingsBus, Receiver<UiMessage>) {
        let mut bus = SettingsBus::default();
        let (message_tx, message_rx) = channel();
        let bridge = bus.subscribe(message_tx);
        (PacksWindow::new(bridge), bus, message_rx)
    }

    fn settings(count: usize) -> Arc<Settings> {
        Arc::new(Settings {
            marker_packs: (0..count)
                .map(|index| PackEntry {
                    name: format!("pack_{index}"),
                    enabled: index % 2 == 0,
                    video_count: index,
                })
                .collect(),
            import: None,
        })
    }

    #[test]
    fn first_tick_requests_settings_exactly_once() {
        let (mut window, _bus, message_rx) = window();
        window.tick();
        window.tick();
        let messages: Vec<UiMessage> = message_rx.try_iter().collect();
        assert_eq!(messages, vec![UiMessage::RequestSettings]);
    }

    #[test]
    fn one_row_per_entry_with_index_and_path() {
        let (mut window, mut bus, _message_rx) = window();
        bus.broadcast(&settings(3));
        window.tick();
        let rows = PacksWindow::rows(window.settings.as_deref());
        assert_eq!(rows.len(), 3);
        for (index, row) in rows.iter().enumerate() {
            assert_eq!(row.index, index);
            assert_eq!(row.path, format!("marks.{index}."));
            assert_eq!(row.entry.name, format!("pack_{index}"));
        }
    }

    #[test]
    fn no_settings_means_no_rows() {
        let (mut window, _bus, _message_rx) = window();
        window.tick();
        assert!(PacksWindow::rows(window.settings.as_deref()).is_empty());
    }

    #[test]
    fn each_action_sends_exactly_one_message() {
        let (mut window, _bus, message_rx) = window();
        window.tick();
        let _ = message_rx.try_iter().count();
        window.open_search();
        assert_eq!(
            message_rx.try_iter().collect::<Vec<_>>(),
            vec![UiMessage::ShowPage {
                path: "get_markers".to_string(),
                show: true,
            }]
        );
        window.new_pack();
        assert_eq!(
            message_rx.try_iter().collect::<Vec<_>>(),
            vec![UiMessage::NewMarkerGroup]
        );
        window.load_pack();
        assert_eq!(
            message_rx.try_iter().collect::<Vec<_>>(),
            vec![UiMessage::LoadMarkerGroup]
        );
    }

    #[test]
    fn row_controls_send_index_addressed_messages() {
        let (mut window, mut bus, message_rx) = window();
        bus.broadcast(&settings(2));
        window.tick();
        let _ = message_rx.try_iter().count();
        window.set_enabled(1, false);
        window.delete(0);
        assert_eq!(
            message_rx.try_iter().collect::<Vec<_>>(),
            vec![
                UiMessage::SetPackEnabled {
                    index: 1,
                    enabled: false,
                },
                UiMessage::DeletePack { index: 0 },
            ]
        );
    }

    #[test]
    fn newest_snapshot_wins() {
        let (mut window, mut bus, _message_rx) = window();
        bus.broadcast(&settings(1));
        bus.broadcast(&settings(4));
        window.tick();
        assert_eq!(PacksWindow::rows(window.settings.as_deref()).len(), 4);
    }
}
