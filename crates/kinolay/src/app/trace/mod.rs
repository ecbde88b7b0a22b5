mod notification;

use std::{
    collections::BTreeMap,
    sync::{Mutex, OnceLock},
};

use cap_std::fs_utf8::Dir;
use egui_extras::{Column, TableRow};
use miette::{Context, IntoDiagnostic, Result};
use ringbuffer::{AllocRingBuffer, RingBuffer};
use tracing::{field::Visit, Event, Level, Subscriber};
use tracing_subscriber::Layer;

/// how many of the latest events the log window keeps around
const LOG_BUFFER_SIZE: usize = 256;

pub struct KinolayTracingLayer;

static TRACING_DATA: OnceLock<Mutex<GlobalTracingData>> = OnceLock::new();

impl KinolayTracingLayer {
    /// Installs the tracing stack: env-filter from `KINOLAY_LOG`, a non-blocking
    /// writer into `kinolay.log` inside the data dir, and this layer feeding the log
    /// window and the warn/error notifications. The returned guard flushes the log
    /// file when dropped, so keep it alive until the app exits.
    pub fn install_tracing(
        kinolay_dir: &Dir,
    ) -> Result<tracing_appender::non_blocking::WorkerGuard> {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{fmt, EnvFilter};
        let filter_layer = EnvFilter::try_from_env("KINOLAY_LOG")
            .or_else(|_| EnvFilter::try_new("info,wgpu=warn,naga=warn"))
            .into_diagnostic()?;
        // creating the log file doubles as a writability check of the data dir
        let writer = std::io::BufWriter::new(
            kinolay_dir
                .create("kinolay.log")
                .into_diagnostic()
                .wrap_err("failed to create kinolay.log file")?,
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(writer);
        let fmt_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_writer(non_blocking);
        TRACING_DATA
            .set(Mutex::new(GlobalTracingData {
                buffer: AllocRingBuffer::new(LOG_BUFFER_SIZE),
                notifications: Default::default(),
            }))
            .map_err(|_| miette::miette!("tracing was installed twice"))?;

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(KinolayTracingLayer)
            .init();
        Ok(guard)
    }

    pub fn gui(etx: &egui::Context, open: &mut bool) {
        egui::Window::new("Logs").open(open).show(etx, |ui| {
            let mut data = TRACING_DATA.get().unwrap().lock().unwrap();
            if ui.button("clear").clicked() {
                data.buffer.clear();
            }
            egui_extras::TableBuilder::new(ui)
                .resizable(true)
                .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
                .column(Column::exact(40.0))
                .column(Column::initial(100.0).range(40.0..=300.0).clip(true))
                .column(Column::exact(40.0))
                .column(Column::initial(200.0).clip(true))
                .min_scrolled_height(0.0)
                .header(20.0, |mut header| {
                    header.col(|ui| {
                        ui.strong("level");
                    });
                    header.col(|ui| {
                        ui.strong("target");
                    });
                    header.col(|ui| {
                        ui.strong("line");
                    });
                    header.col(|ui| {
                        ui.strong("message");
                    });
                })
                .body(|body| {
                    let events = &data.buffer;
                    body.rows(20.0, events.len(), |index, mut row| {
                        if let Some(event) = events.get(index as _) {
                            event.ui_row(&mut row);
                        }
                    });
                });
        });
    }

    /// draws the warn/error toasts. called every frame, after all the windows
    pub fn show_notifications(etx: &egui::Context) {
        TRACING_DATA
            .get()
            .unwrap()
            .lock()
            .unwrap()
            .notifications
            .tick_egui(etx);
    }
}

/// One tracing event as the log window stores it. Warn and error events double as
/// notifications, so users see failures without digging through the log window.
#[derive(Debug)]
struct TracingEvent {
    level: Level,
    /// source line the event came from
    line: u32,
    /// module path of the event, used as the notification title
    target: String,
    message: String,
    /// seconds the notification stays up. zero means no notification
    notify: f32,
    /// any extra fields recorded on the event
    fields: BTreeMap<String, String>,
}

impl Default for TracingEvent {
    fn default() -> Self {
        Self {
            level: Level::TRACE,
            line: Default::default(),
            target: Default::default(),
            message: Default::default(),
            notify: Default::default(),
            fields: Default::default(),
        }
    }
}

struct EventVisitor<'a>(&'a mut TracingEvent);

impl Visit for EventVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => {
                self.0.message = format!("{value:?}");
            }
            "log.line" => {
                self.0.line = format!("{value:?}").parse().unwrap_or_default();
            }
            "log.target" => {
                self.0.target = format!("{value:?}");
            }
            name if name.starts_with("log.") => {}
            name => {
                self.0.fields.insert(name.to_string(), format!("{value:?}"));
            }
        }
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        if field.name() == "notify" {
            self.0.notify = value as _;
        } else {
            self.record_debug(field, &value)
        }
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.record_debug(field, &value)
    }
}

impl TracingEvent {
    fn from_event(event: &Event<'_>) -> Self {
        let target = if event.metadata().target() == "log" {
            Default::default()
        } else {
            event.metadata().target().to_string()
        };
        let level = *event.metadata().level();
        let mut tracing_event = Self {
            level,
            line: event.metadata().line().unwrap_or_default(),
            target,
            // warn and error show up as notifications unless the event says otherwise
            notify: if level < Level::INFO { 10.0 } else { 0.0 },
            ..Default::default()
        };
        event.record(&mut EventVisitor(&mut tracing_event));
        tracing_event
    }

    fn level_color(&self) -> egui::Color32 {
        match self.level {
            Level::ERROR => egui::Color32::RED,
            Level::WARN => egui::Color32::YELLOW,
            _ => egui::Color32::GRAY,
        }
    }

    fn ui_row(&self, row: &mut TableRow) {
        row.col(|ui| {
            ui.colored_label(self.level_color(), format!("{}", self.level));
        });
        row.col(|ui| {
            ui.label(&self.target);
        });
        row.col(|ui| {
            ui.label(format!("{}", self.line));
        });
        row.col(|ui| {
            let mut message = self.message.clone();
            if !self.fields.is_empty() {
                for (name, value) in &self.fields {
                    message.push_str(&format!(" {name}={value}"));
                }
            }
            ui.label(message);
        });
    }
}

impl<S: Subscriber> Layer<S> for KinolayTracingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let tracing_event = TracingEvent::from_event(event);
        TRACING_DATA
            .get()
            .unwrap()
            .lock()
            .unwrap()
            .add_event(tracing_event);
    }
}

struct GlobalTracingData {
    buffer: AllocRingBuffer<TracingEvent>,
    notifications: notification::Notifications,
}

impl GlobalTracingData {
    fn add_event(&mut self, event: TracingEvent) {
        self.notifications.add_event(&event);
        self.buffer.push(event);
    }
}
