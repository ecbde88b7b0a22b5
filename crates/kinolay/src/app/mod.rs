mod frame;
mod init;
mod packs;
mod player;
mod search;
mod theme;
mod trace;

use egui_backend::{egui, BackendConfig, GfxBackend, UserApp, WindowBackend};
use egui_window_glfw_passthrough::{GlfwBackend, GlfwConfig};
use kino_pack_format::manager::PageRequest;
use kino_pack_format::PackManager;
use kino_render::KinoRenderer;
use kinolink::{LinkChanges, LinkManager, DEFAULT_KINOLINK_NAME};
use miette::{Context, Result};
use tracing::{error, info, warn};

use init::get_kinolay_dir;
use packs::PacksWindow;
use player::ImagePlayer;
use search::PackSearchWindow;
use theme::ThemeManager;
use trace::KinolayTracingLayer;

pub struct Kinolay {
    frame_stats: frame::FrameStatistics,
    menu_panel: MenuPanel,
    link_manager: LinkManager,
    pack_manager: PackManager,
    packs_window: PacksWindow,
    search_window: PackSearchWindow,
    theme_manager: ThemeManager,
    renderer: KinoRenderer,
    egui_context: egui::Context,
    glfw_backend: GlfwBackend,
}

impl Kinolay {
    fn new(kdir: cap_std::fs_utf8::Dir) -> Result<Self> {
        let link_manager =
            LinkManager::new(DEFAULT_KINOLINK_NAME).wrap_err("failed to create link manager")?;
        let mut pack_manager = PackManager::new(&kdir, Box::new(ImagePlayer::new()))
            .wrap_err("failed to create pack manager")?;
        let packs_window = PacksWindow::new(pack_manager.bridge());
        let search_window = PackSearchWindow::new(pack_manager.bridge());
        let mut theme_manager =
            ThemeManager::new(&kdir).wrap_err("failed to create theme manager")?;
        let egui_context = egui::Context::default();
        theme_manager.init_egui(&egui_context);
        let mut glfw_backend = GlfwBackend::new(
            GlfwConfig {
                glfw_callback: Box::new(|glfw_context| {
                    glfw_context.window_hint(
                        egui_window_glfw_passthrough::glfw::WindowHint::SRgbCapable(true),
                    );
                    glfw_context.window_hint(
                        egui_window_glfw_passthrough::glfw::WindowHint::Floating(true),
                    );
                }),
                ..Default::default()
            },
            BackendConfig {
                transparent: Some(true),
                is_opengl: false,
                ..Default::default()
            },
        );
        let renderer = KinoRenderer::new(&mut glfw_backend, {
            use kino_render::egui_render_wgpu::*;
            use wgpu::*;
            WgpuConfig {
                backends: Backends::VULKAN.union(Backends::GL),
                power_preference: PowerPreference::HighPerformance,
                ..Default::default()
            }
        });
        // the overlay has no window chrome of its own
        glfw_backend.window.set_decorated(false);
        Ok(Self {
            frame_stats: frame::FrameStatistics::new(glfw_backend.glfw.get_time() as _),
            menu_panel: MenuPanel::default(),
            link_manager,
            pack_manager,
            packs_window,
            search_window,
            theme_manager,
            renderer,
            egui_context,
            glfw_backend,
        })
    }
}

impl UserApp for Kinolay {
    fn gui_run(&mut self) {
        // everything happens in Self::run instead, the frame needs non-gui work
        // before and after the egui pass
    }

    type UserGfxBackend = KinoRenderer;

    type UserWindowBackend = GlfwBackend;

    fn get_all(
        &mut self,
    ) -> (
        &mut Self::UserWindowBackend,
        &mut Self::UserGfxBackend,
        &egui::Context,
    ) {
        (
            &mut self.glfw_backend,
            &mut self.renderer,
            &self.egui_context,
        )
    }

    fn run(
        &mut self,
        logical_size: [f32; 2],
    ) -> Option<(egui::PlatformOutput, std::time::Duration)> {
        let Self {
            frame_stats,
            menu_panel,
            link_manager,
            pack_manager,
            packs_window,
            search_window,
            theme_manager,
            renderer,
            egui_context,
            glfw_backend,
        } = self;
        let etx = egui_context.clone();
        if let Some(full_output) = if glfw_backend.get_window().is_some() {
            let input = glfw_backend.take_raw_input();
            renderer.prepare_frame(glfw_backend);
            frame_stats.tick(glfw_backend.glfw.get_time());

            // the non-gui work first: link, camera, packs and the overlay
            let link = match link_manager.tick() {
                Ok(link) => link,
                Err(e) => {
                    error!(?e, "link manager tick error");
                    None
                }
            };
            renderer.tick(link.clone());
            pack_manager.tick(&etx, renderer, &link);
            for request in pack_manager.drain_page_requests() {
                menu_panel.apply_page(&request);
            }
            packs_window.tick();

            // the gui pass
            etx.begin_frame(input);
            egui::Area::new("menu panel")
                .fixed_pos([8.0, 8.0])
                .interactable(true)
                .order(egui::Order::Foreground)
                .show(&etx, |ui| {
                    ui.style_mut().visuals.widgets.inactive.weak_bg_fill =
                        egui::Color32::TRANSPARENT;
                    ui.horizontal(|ui| {
                        ui.menu_button("KNL", |ui| {
                            ui.checkbox(&mut menu_panel.show_packs_window, "Show Marker Packs");
                            ui.checkbox(&mut menu_panel.show_search_window, "Show Pack Search");
                            ui.checkbox(&mut menu_panel.show_link_window, "Show Link");
                            ui.checkbox(&mut menu_panel.show_theme_window, "Show Theme Manager");
                            ui.checkbox(&mut menu_panel.show_tracing_window, "Show Logs");
                            ui.checkbox(&mut menu_panel.show_frame_window, "Show Frame Stats");
                            if ui.button("exit").clicked() {
                                info!("exiting kinolay");
                                glfw_backend.window.set_should_close(true);
                            }
                        });
                        pack_manager.menu_ui(ui);
                    });
                });
            packs_window.gui(&etx, &mut menu_panel.show_packs_window);
            search_window.gui(&etx, &mut menu_panel.show_search_window);
            link_manager.gui(&etx, &mut menu_panel.show_link_window);
            theme_manager.gui(&etx, &mut menu_panel.show_theme_window);
            KinolayTracingLayer::gui(&etx, &mut menu_panel.show_tracing_window);
            if menu_panel.show_frame_window {
                egui::Window::new("Frame Stats")
                    .open(&mut menu_panel.show_frame_window)
                    .show(&etx, |ui| {
                        frame_stats.gui(ui);
                    });
            }
            KinolayTracingLayer::show_notifications(&etx);

            // follow the game's client area when it moves or resizes
            if let Some(link) = link.as_ref() {
                if link.changes.contains(LinkChanges::WindowPosition)
                    || link.changes.contains(LinkChanges::WindowSize)
                {
                    info!(
                        ?link.client_pos, ?link.client_size,
                        "matching the game window dimensions"
                    );
                    glfw_backend
                        .window
                        .set_pos(link.client_pos.x, link.client_pos.y);
                    // full monitor sized windows lose transparency on some
                    // compositors, so stay a pixel short of the client area
                    glfw_backend
                        .window
                        .set_size(link.client_size.x - 1, link.client_size.y - 1);
                }
            }
            // clicks fall through to the game unless egui wants them
            glfw_backend
                .window
                .set_mouse_passthrough(!(etx.wants_keyboard_input() || etx.wants_pointer_input()));
            etx.request_repaint();
            Some(etx.end_frame())
        } else {
            None
        } {
            let egui::FullOutput {
                platform_output,
                repaint_after,
                textures_delta,
                shapes,
            } = full_output;
            let (wb, gb, egui_context) = self.get_all();
            let egui_context = egui_context.clone();
            gb.render_egui(
                egui_context.tessellate(shapes),
                textures_delta,
                logical_size,
            );
            gb.present(wb);
            return Some((platform_output, repaint_after));
        }
        None
    }
}

pub fn start_kinolay() {
    let kdir = match get_kinolay_dir() {
        Ok(kdir) => kdir,
        Err(e) => {
            eprintln!("failed to create kinolay dir: {e:#?}");
            panic!("failed to create kinolay dir: {e:#?}");
        }
    };
    let log_file_flush_guard = match KinolayTracingLayer::install_tracing(&kdir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to install tracing: {e:#?}");
            panic!("failed to install tracing: {e:#?}");
        }
    };
    if let Err(e) = rayon::ThreadPoolBuilder::default()
        .panic_handler(|panic_info| {
            error!(?panic_info, "rayon thread panicked");
        })
        .build_global()
    {
        error!(?e, "failed to build the global rayon threadpool");
    }
    match Kinolay::new(kdir) {
        Ok(kinolay) => {
            <Kinolay as UserApp>::UserWindowBackend::run_event_loop(kinolay);
        }
        Err(e) => {
            error!(?e, "failed to create the kinolay app");
        }
    }
    std::mem::drop(log_file_flush_guard);
}

/// The top left menu strip plus the booleans of every toggleable window. Windows are
/// also addressable by page path through [kino_pack_format::manager::UiMessage::ShowPage].
#[derive(Debug, Default)]
pub struct MenuPanel {
    show_packs_window: bool,
    show_search_window: bool,
    show_link_window: bool,
    show_theme_window: bool,
    show_tracing_window: bool,
    show_frame_window: bool,
}

impl MenuPanel {
    /// the marker pack list page. rows inside it are addressed as `marks.<index>.`
    pub const PACKS_PAGE: &str = "marks";
    pub const SEARCH_PAGE: &str = "get_markers";
    pub const LINK_PAGE: &str = "link";
    pub const LOGS_PAGE: &str = "logs";
    pub const THEME_PAGE: &str = "theme";

    pub fn apply_page(&mut self, request: &PageRequest) {
        let flag = match request.path.as_str() {
            Self::PACKS_PAGE => &mut self.show_packs_window,
            Self::SEARCH_PAGE => &mut self.show_search_window,
            Self::LINK_PAGE => &mut self.show_link_window,
            Self::LOGS_PAGE => &mut self.show_tracing_window,
            Self::THEME_PAGE => &mut self.show_theme_window,
            path => {
                warn!(path, "ShowPage request for an unknown page");
                return;
            }
        };
        *flag = request.show;
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn pages_map_onto_their_windows() {
        let mut panel = MenuPanel::default();
        panel.apply_page(&PageRequest {
            path: MenuPanel::SEARCH_PAGE.to_string(),
            show: true,
        });
        assert!(panel.show_search_window);
        panel.apply_page(&PageRequest {
            path: MenuPanel::PACKS_PAGE.to_string(),
            show: true,
        });
        assert!(panel.show_packs_window);
        panel.apply_page(&PageRequest {
            path: MenuPanel::SEARCH_PAGE.to_string(),
            show: false,
        });
        assert!(!panel.show_search_window);
    }

    #[test]
    fn unknown_pages_change_nothing() {
        let mut panel = MenuPanel::default();
        panel.apply_page(&PageRequest {
            path: "definitely_not_a_page".to_string(),
            show: true,
        });
        assert_eq!(format!("{panel:?}"), format!("{:?}", MenuPanel::default()));
    }
}
