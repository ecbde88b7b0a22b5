use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use tracing::debug;
use url::Url;

/// Notifications the ui fires at the pack manager. Fire and forget: a send is never
/// answered directly, any effect shows up as a fresh [Settings] snapshot instead.
#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    /// ask for the current settings snapshot. sent once by every window on its first
    /// tick so it doesn't have to wait for the next change
    RequestSettings,
    /// create a new empty marker pack
    NewMarkerGroup,
    /// pick a pack file (json or zip) via the file dialog and import it
    LoadMarkerGroup,
    /// show or hide the window registered under `path`
    ShowPage { path: String, show: bool },
    SetPackEnabled { index: usize, enabled: bool },
    DeletePack { index: usize },
    /// download a pack archive and import it under `name`
    InstallPack { name: String, url: Url },
    /// drop the current import status line (and forget a still running import)
    ClearImportStatus,
}

/// The snapshot pushed to every subscribed window whenever anything changes. Windows
/// never hold live references into the manager, only the latest snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// ordered list of marker packs. the order is stable and index addressed messages
    /// ([UiMessage::SetPackEnabled], [UiMessage::DeletePack]) resolve against it
    pub marker_packs: Vec<PackEntry>,
    /// what the importer is currently doing, if anything
    pub import: Option<ImportProgress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackEntry {
    pub name: String,
    pub enabled: bool,
    pub video_count: usize,
}

/// The ui facing shape of the importer state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportProgress {
    WaitingForFileChooser,
    Loading(String),
    Done(String),
    Error(String),
}

/// The window end of the settings bus. Dropping it drops the receiver, which is all
/// the unsubscription there is: the manager prunes the dead sender on its next
/// broadcast, so release is guaranteed on every exit path.
pub struct UiBridge {
    messages: Sender<UiMessage>,
    settings: Receiver<Arc<Settings>>,
}

impl UiBridge {
    pub fn send(&self, message: UiMessage) {
        if self.messages.send(message).is_err() {
            // manager is gone, the app is shutting down
            debug!("dropped a ui message, the pack manager is gone");
        }
    }

    /// drains the snapshot channel and keeps the newest one
    pub fn latest_settings(&self) -> Option<Arc<Settings>> {
        self.settings.try_iter().last()
    }
}

/// The manager end: the list of snapshot subscribers.
#[derive(Default)]
pub struct SettingsBus {
    subscribers: Vec<Sender<Arc<Settings>>>,
}

impl SettingsBus {
    /// registers a new subscriber and hands back its bridge
    pub fn subscribe(&mut self, messages: Sender<UiMessage>) -> UiBridge {
        let (settings_tx, settings_rx) = channel();
        self.subscribers.push(settings_tx);
        UiBridge {
            messages,
            settings: settings_rx,
        }
    }

    /// pushes `settings` to every live subscriber and prunes the dead ones
    pub fn broadcast(&mut self, settings: &Arc<Settings>) {
        self.subscribers
            .retain(|subscriber| subscriber.send(settings.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn latest_settings_keeps_only_the_newest_snapshot() {
        let mut bus = SettingsBus::default();
        let (message_tx, _message_rx) = channel();
        let bridge = bus.subscribe(message_tx);
        for count in 0..3 {
            let settings = Arc::new(Settings {
                marker_packs: vec![PackEntry {
                    name: format!("pack_{count}"),
                    enabled: true,
                    video_count: count,
                }],
                import: None,
            });
            bus.broadcast(&settings);
        }
        let latest = bridge.latest_settings().expect("no snapshot arrived");
        assert_eq!(latest.marker_packs[0].name, "pack_2");
        // drained: nothing newer around
        assert!(bridge.latest_settings().is_none());
    }

    #[test]
    fn dropped_bridges_get_pruned_on_broadcast() {
        let mut bus = SettingsBus::default();
        let (message_tx, _message_rx) = channel();
        let alive = bus.subscribe(message_tx.clone());
        let dead = bus.subscribe(message_tx);
        drop(dead);
        assert_eq!(bus.subscriber_count(), 2);
        bus.broadcast(&Arc::new(Settings::default()));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(alive.latest_settings().is_some());
    }

    #[test]
    fn sending_into_a_gone_manager_does_not_panic() {
        let mut bus = SettingsBus::default();
        let (message_tx, message_rx) = channel();
        let bridge = bus.subscribe(message_tx);
        drop(message_rx);
        bridge.send(UiMessage::RequestSettings);
    }
}
