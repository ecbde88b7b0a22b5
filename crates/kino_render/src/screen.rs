use std::collections::BTreeMap;

use egui_render_wgpu::{wgpu::*, EguiTexture};
use glam::{vec2, vec3, Mat4, Quat, Vec2, Vec3, Vec4};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ScreenVertex {
    pub position: Vec3,
    pub texture_coordinates: Vec2,
}

/// The cpu side of the video screen: a quad sized by the source's aspect ratio plus
/// the per-frame presentation state (transform, visibility, opacity, frame texture).
///
/// The quad vertices are model space and only change when the aspect ratio does.
/// `generation` counts those rebuilds, and [ScreenRenderer] uses it to know when the
/// gpu vertex buffer it uploaded earlier is stale and must be released.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenMesh {
    pub vertices: [ScreenVertex; 6],
    pub ratio: Vec2,
    pub generation: u64,
    pub position: Vec3,
    /// euler angles in radians, applied x then y then z
    pub rotation: Vec3,
    pub scale: f32,
    pub visible: bool,
    pub opacity: f32,
    /// the (managed) texture id of the player's current frame. None until the player
    /// has produced a frame, and the renderer skips the draw meanwhile
    pub texture: Option<u64>,
}

impl ScreenMesh {
    pub fn new(ratio: Vec2) -> Self {
        Self {
            vertices: quad_vertices(ratio),
            ratio,
            generation: 1,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            visible: false,
            opacity: 1.0,
            texture: None,
        }
    }

    /// Replaces the quad with one matching the new ratio. The old vertices are gone
    /// the moment this returns, and the bumped generation tells the renderer to
    /// release the gpu copy before uploading the new one.
    pub fn rebuild_geometry(&mut self, ratio: Vec2) {
        self.vertices = quad_vertices(ratio);
        self.ratio = ratio;
        self.generation += 1;
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_euler(
                glam::EulerRot::XYZ,
                self.rotation.x,
                self.rotation.y,
                self.rotation.z,
            ),
            self.position,
        )
    }
}

/// a `ratio.x` by `ratio.y` quad centered at the origin, facing +z
fn quad_vertices(ratio: Vec2) -> [ScreenVertex; 6] {
    let half = ratio / 2.0;
    let bottom_left = ScreenVertex {
        position: vec3(-half.x, -half.y, 0.0),
        texture_coordinates: vec2(0.0, 1.0),
    };
    let bottom_right = ScreenVertex {
        position: vec3(half.x, -half.y, 0.0),
        texture_coordinates: vec2(1.0, 1.0),
    };
    let top_right = ScreenVertex {
        position: vec3(half.x, half.y, 0.0),
        texture_coordinates: vec2(1.0, 0.0),
    };
    let top_left = ScreenVertex {
        position: vec3(-half.x, half.y, 0.0),
        texture_coordinates: vec2(0.0, 0.0),
    };
    [
        top_left,
        bottom_left,
        bottom_right,
        bottom_right,
        top_right,
        top_left,
    ]
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ScreenTransform {
    mvp: Mat4,
    /// rgba multiplied over the sampled frame. alpha carries the fade opacity
    tint: Vec4,
}

/// Draws the [ScreenMesh] with the egui managed texture of the current frame.
///
/// The vertex buffer holds exactly one quad and lives as long as the geometry
/// generation it was uploaded for. On a generation change it is destroyed first and
/// only then recreated, so the gpu never holds two copies of the screen.
pub struct ScreenRenderer {
    pipeline: RenderPipeline,
    transform_ub: Buffer,
    transform_bindgroup: BindGroup,
    vb: Option<Buffer>,
    uploaded_generation: u64,
}

impl ScreenRenderer {
    pub fn new(
        dev: &Device,
        texture_bindgroup_layout: &BindGroupLayout,
        surface_format: TextureFormat,
    ) -> Self {
        let shader_module = dev.create_shader_module(include_wgsl!("../shaders/screen.wgsl"));
        let transform_bgl = dev.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("screen transform bindgroup layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let pipeline_layout = dev.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("screen pipeline layout"),
            bind_group_layouts: &[&transform_bgl, texture_bindgroup_layout],
            push_constant_ranges: &[],
        });
        let pipeline = dev.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("screen pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader_module,
                entry_point: "vs_main",
                buffers: &[VertexBufferLayout {
                    array_stride: std::mem::size_of::<ScreenVertex>() as u64,
                    step_mode: VertexStepMode::Vertex,
                    attributes: &vertex_attr_array![
                    0 => Float32x3,
                    1 => Float32x2,
                    ],
                }],
            },
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                // the screen is watchable from both sides, like the original plane
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                module: &shader_module,
                entry_point: "fs_main",
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::all(),
                })],
            }),
            multiview: None,
        });
        let transform_ub = dev.create_buffer(&BufferDescriptor {
            label: Some("screen transform buffer"),
            size: std::mem::size_of::<ScreenTransform>() as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });
        let transform_bindgroup = dev.create_bind_group(&BindGroupDescriptor {
            label: Some("screen transform bindgroup"),
            layout: &transform_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: transform_ub.as_entire_binding(),
            }],
        });
        Self {
            pipeline,
            transform_ub,
            transform_bindgroup,
            vb: None,
            uploaded_generation: 0,
        }
    }

    pub fn prepare_render_data(
        &mut self,
        screen: &ScreenMesh,
        view_proj: Mat4,
        dev: &Device,
        queue: &Queue,
    ) {
        if self.uploaded_generation != screen.generation {
            // release the stale quad before uploading its replacement
            if let Some(vb) = self.vb.take() {
                vb.destroy();
            }
            let vb = dev.create_buffer(&BufferDescriptor {
                label: Some("screen vertex buffer"),
                size: std::mem::size_of_val(&screen.vertices) as u64,
                usage: BufferUsages::COPY_DST | BufferUsages::VERTEX,
                mapped_at_creation: false,
            });
            queue.write_buffer(&vb, 0, bytemuck::cast_slice(&screen.vertices));
            self.vb = Some(vb);
            self.uploaded_generation = screen.generation;
        }
        let transform = ScreenTransform {
            mvp: view_proj * screen.model_matrix(),
            tint: Vec4::new(1.0, 1.0, 1.0, screen.opacity),
        };
        queue.write_buffer(&self.transform_ub, 0, bytemuck::bytes_of(&transform));
    }

    pub fn render<'a: 'b, 'b>(
        &'a self,
        rpass: &mut RenderPass<'b>,
        textures: &'a BTreeMap<u64, EguiTexture>,
        screen: &ScreenMesh,
    ) {
        if !screen.visible {
            return;
        }
        let vb = match self.vb.as_ref() {
            Some(vb) => vb,
            None => return,
        };
        let texture = match screen.texture.and_then(|id| textures.get(&id)) {
            Some(texture) => texture,
            // no frame decoded yet. skip the draw rather than flash a placeholder
            None => return,
        };
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.transform_bindgroup, &[]);
        rpass.set_bind_group(1, &texture.bindgroup, &[]);
        rpass.set_vertex_buffer(0, vb.slice(..));
        rpass.draw(0..6, 0..1);
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn quad_matches_ratio() {
        let mesh = ScreenMesh::new(vec2(16.0, 9.0));
        for vertex in mesh.vertices {
            assert_eq!(vertex.position.x.abs(), 8.0);
            assert_eq!(vertex.position.y.abs(), 4.5);
            assert_eq!(vertex.position.z, 0.0);
        }
    }

    #[test]
    fn rebuild_bumps_generation_once() {
        let mut mesh = ScreenMesh::new(vec2(16.0, 9.0));
        let generation = mesh.generation;
        mesh.rebuild_geometry(vec2(4.0, 3.0));
        assert_eq!(mesh.generation, generation + 1);
        assert_eq!(mesh.ratio, vec2(4.0, 3.0));
    }

    #[test]
    fn model_matrix_applies_scale_and_translation() {
        let mut mesh = ScreenMesh::new(vec2(1.0, 1.0));
        mesh.position = vec3(1.0, 2.0, 3.0);
        mesh.scale = 2.0;
        let transformed = mesh.model_matrix().transform_point3(vec3(0.5, 0.0, 0.0));
        assert_eq!(transformed, vec3(2.0, 2.0, 3.0));
    }
}
