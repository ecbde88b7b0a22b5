use tracing::Level;

use super::TracingEvent;

/// Warn/error toasts in the top right corner. Each one lives for the seconds its
/// event asked for and can be dismissed early.
#[derive(Debug, Default)]
pub struct Notifications {
    current: Vec<Notification>,
}

#[derive(Debug)]
struct Notification {
    title: String,
    message: String,
    level: Level,
    time_to_live: f32,
}

impl Notifications {
    pub fn tick_egui(&mut self, etx: &egui::Context) {
        if self.current.is_empty() {
            return;
        }
        let dt = etx.input(|i| i.unstable_dt);
        egui::Area::new("notifications")
            .anchor(egui::Align2::RIGHT_TOP, [0.0, 0.0])
            .interactable(true)
            .movable(false)
            .show(etx, |ui| {
                for notification in &mut self.current {
                    ui.group(|ui| {
                        ui.horizontal(|ui| {
                            let color = if notification.level == Level::ERROR {
                                egui::Color32::RED
                            } else {
                                egui::Color32::YELLOW
                            };
                            ui.colored_label(color, &notification.title);
                            ui.add_space((ui.available_width() - 20.0).max(0.0));
                            if ui.button("X").clicked() {
                                notification.time_to_live = 0.0;
                            }
                        });
                        ui.label(&notification.message);
                    });
                    notification.time_to_live -= dt;
                }
                self.current
                    .retain(|notification| notification.time_to_live > 0.0);
            });
    }

    pub(super) fn add_event(&mut self, event: &TracingEvent) {
        if event.level < Level::INFO && event.notify > 0.0 {
            self.current.push(Notification {
                title: if event.target.is_empty() {
                    event.level.to_string()
                } else {
                    event.target.clone()
                },
                message: event.message.clone(),
                level: event.level,
                time_to_live: event.notify,
            });
        }
    }
}
