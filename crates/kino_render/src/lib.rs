pub mod screen;

pub use egui_render_wgpu;

use std::sync::Arc;

use egui_backend::{GfxBackend, WindowBackend};
use egui_render_wgpu::wgpu::{
    CommandEncoderDescriptor, LoadOp, Operations, RenderPassColorAttachment, RenderPassDescriptor,
};
use egui_render_wgpu::{WgpuBackend, WgpuConfig};
use glam::Mat4;
use kinolink::KinoLink;
use screen::{ScreenMesh, ScreenRenderer};

/// The overlay's gfx backend. Wraps the egui wgpu backend and draws the video screen
/// underneath the egui windows, with camera matrices rebuilt from the link each frame.
pub struct KinoRenderer {
    pub view_proj: Mat4,
    pub cam_pos: glam::Vec3,
    pub link: Option<Arc<KinoLink>>,
    pub screen_renderer: ScreenRenderer,
    pub wgpu_backend: WgpuBackend,
    screen: Option<ScreenMesh>,
}

impl KinoRenderer {
    pub fn new(window_backend: &mut impl WindowBackend, config: WgpuConfig) -> Self {
        let wgpu_backend = WgpuBackend::new(window_backend, config);
        let screen_renderer = ScreenRenderer::new(
            &wgpu_backend.device,
            &wgpu_backend.painter.texture_bindgroup_layout,
            wgpu_backend.surface_manager.surface_config.format,
        );
        Self {
            view_proj: Default::default(),
            cam_pos: Default::default(),
            link: None,
            screen_renderer,
            wgpu_backend,
            screen: None,
        }
    }

    pub fn get_z_near(&self) -> f32 {
        1.0
    }
    pub fn get_z_far(&self) -> f32 {
        1000.0
    }

    /// rebuilds the camera matrices for this frame. without a link the previous
    /// matrices stay, which is fine because nothing gets submitted without a link.
    pub fn tick(&mut self, link: Option<Arc<KinoLink>>) {
        if let Some(link) = link.as_ref() {
            let center = link.cam_pos + link.cam_front;
            let view = Mat4::look_at_lh(link.cam_pos, center, glam::Vec3::Y);
            let aspect = {
                let config = &self.wgpu_backend.surface_manager.surface_config;
                config.width as f32 / config.height.max(1) as f32
            };
            let proj =
                Mat4::perspective_lh(link.fov, aspect, self.get_z_near(), self.get_z_far());
            self.view_proj = proj * view;
            self.cam_pos = link.cam_pos;
        }
        self.link = link;
    }

    /// hands this frame's screen (if any) to the renderer. submitting `None` simply
    /// skips the screen pass.
    pub fn submit_screen(&mut self, screen: Option<ScreenMesh>) {
        self.screen = screen;
    }
}

impl GfxBackend for KinoRenderer {
    type Configuration = WgpuConfig;

    fn new(window_backend: &mut impl WindowBackend, config: Self::Configuration) -> Self {
        Self::new(window_backend, config)
    }

    fn resume(&mut self, window_backend: &mut impl WindowBackend) {
        self.wgpu_backend.resume(window_backend);
    }

    fn prepare_frame(&mut self, window_backend: &mut impl WindowBackend) {
        self.wgpu_backend.prepare_frame(window_backend);
    }

    fn render_egui(
        &mut self,
        meshes: Vec<egui::ClippedPrimitive>,
        textures_delta: egui::TexturesDelta,
        logical_screen_size: [f32; 2],
    ) {
        // the screen renders first so egui windows stay on top of it
        if self.link.is_some() {
            if let Some(screen) = self.screen.take() {
                self.screen_renderer.prepare_render_data(
                    &screen,
                    self.view_proj,
                    &self.wgpu_backend.device,
                    &self.wgpu_backend.queue,
                );
                if let Some(view) = self.wgpu_backend.surface_manager.surface_view.as_ref() {
                    let mut encoder = self
                        .wgpu_backend
                        .device
                        .create_command_encoder(&CommandEncoderDescriptor {
                            label: Some("screen command encoder"),
                        });
                    {
                        let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                            label: Some("screen render pass"),
                            color_attachments: &[Some(RenderPassColorAttachment {
                                view,
                                resolve_target: None,
                                ops: Operations {
                                    load: LoadOp::Load,
                                    store: true,
                                },
                            })],
                            depth_stencil_attachment: None,
                        });
                        self.screen_renderer.render(
                            &mut rpass,
                            &self.wgpu_backend.painter.managed_textures,
                            &screen,
                        );
                    }
                    self.wgpu_backend.queue.submit(Some(encoder.finish()));
                }
            }
        }
        self.wgpu_backend
            .render_egui(meshes, textures_delta, logical_screen_size);
    }

    fn present(&mut self, window_backend: &mut impl WindowBackend) {
        self.wgpu_backend.present(window_backend);
    }

    fn resize_framebuffer(&mut self, window_backend: &mut impl WindowBackend) {
        tracing::info!("resizing framebuffer");
        self.wgpu_backend.resize_framebuffer(window_backend);
    }
}
