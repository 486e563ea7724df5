//! Shared mesh pipeline setup
//!
//! Vertex/uniform layouts and pipeline construction used by both the still
//! renderer and the interactive viewer.

use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Perspective3};
use stlview_core::{Geometry, Point3f, PreviewOptions, Vector3f};

/// Vertex data for mesh rendering
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl MeshVertex {
    /// Vertex buffer layout descriptor
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Normal
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Scene uniform shared by the mesh and ground-plane passes.
///
/// Light directions point from the light toward the scene; the `w`
/// components carry intensities so everything stays 16-byte aligned.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    /// Key light: xyz direction, w intensity. Casts the shadow.
    pub key: [f32; 4],
    /// Fill light: xyz direction, w intensity
    pub fill: [f32; 4],
    /// Rim light: xyz direction, w intensity
    pub rim: [f32; 4],
    /// Model color rgb, w ambient intensity
    pub model_color: [f32; 4],
    /// Background rgb, w hemisphere intensity
    pub background: [f32; 4],
    /// Hemisphere ground color rgb, w ground shadow strength
    pub ground: [f32; 4],
}

/// Uniform for the shadow depth pre-pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ShadowUniform {
    pub light_view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
}

/// Fixed professional lighting rig for previews: key, fill and rim
/// directional lights plus ambient and hemisphere terms.
pub fn scene_uniform(
    view_proj: Matrix4<f32>,
    light_view_proj: Matrix4<f32>,
    model: Matrix4<f32>,
    camera_position: Point3f,
    options: &PreviewOptions,
) -> SceneUniform {
    let key_dir = Vector3f::new(-0.5, -1.0, -0.4).normalize();
    let fill_dir = Vector3f::new(0.7, -0.2, 0.4).normalize();
    let rim_dir = Vector3f::new(0.2, -0.3, 0.9).normalize();
    let directional = options.lighting.directional_intensity;
    let background = srgb(options.background_color);

    SceneUniform {
        view_proj: view_proj.into(),
        light_view_proj: light_view_proj.into(),
        model: model.into(),
        camera_pos: [
            camera_position.x,
            camera_position.y,
            camera_position.z,
            1.0,
        ],
        key: [key_dir.x, key_dir.y, key_dir.z, directional],
        fill: [fill_dir.x, fill_dir.y, fill_dir.z, directional * 0.4],
        rim: [rim_dir.x, rim_dir.y, rim_dir.z, directional * 0.25],
        model_color: with_w(srgb(options.model_color), options.lighting.ambient_intensity),
        background: with_w(background, 0.25),
        ground: [0.35, 0.35, 0.38, 0.3],
    }
}

fn srgb(color: [u8; 3]) -> [f32; 3] {
    [
        color[0] as f32 / 255.0,
        color[1] as f32 / 255.0,
        color[2] as f32 / 255.0,
    ]
}

fn with_w(rgb: [f32; 3], w: f32) -> [f32; 4] {
    [rgb[0], rgb[1], rgb[2], w]
}

/// Maps OpenGL clip space (z in [-1, 1], as produced by nalgebra's
/// projections) to wgpu clip space (z in [0, 1]).
pub fn opengl_to_wgpu_matrix() -> Matrix4<f32> {
    #[rustfmt::skip]
    let m = Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.5, 0.5,
        0.0, 0.0, 0.0, 1.0,
    );
    m
}

/// Perspective view-projection for a camera at `position` looking at
/// `look_at`
pub fn view_projection(
    position: Point3f,
    look_at: Point3f,
    aspect_ratio: f32,
    far: f32,
) -> Matrix4<f32> {
    let view = Matrix4::look_at_rh(&position, &look_at, &Vector3f::new(0.0, 1.0, 0.0));
    let projection = Perspective3::new(aspect_ratio, std::f32::consts::FRAC_PI_4, 0.1, far);
    opengl_to_wgpu_matrix() * projection.into_inner() * view
}

/// Orthographic view-projection from the key light, sized to cover a model
/// of the given extent around the origin
pub fn light_view_projection(extent: f32) -> Matrix4<f32> {
    let half = (extent * 1.2).max(1.0);
    let light_dir = Vector3f::new(-0.5, -1.0, -0.4).normalize();
    let eye = Point3f::origin() - light_dir * (extent * 2.0).max(4.0);
    let view = Matrix4::look_at_rh(&eye, &Point3f::origin(), &Vector3f::new(0.0, 1.0, 0.0));
    let projection = nalgebra::Orthographic3::new(-half, half, -half, half, 0.1, extent * 6.0 + 8.0);
    opengl_to_wgpu_matrix() * projection.into_inner() * view
}

/// Flatten a geometry into GPU vertices
pub fn geometry_to_vertices(geometry: &Geometry) -> Vec<MeshVertex> {
    geometry
        .positions
        .iter()
        .zip(geometry.normals.iter())
        .map(|(p, n)| MeshVertex {
            position: [p.x, p.y, p.z],
            normal: [n.x, n.y, n.z],
        })
        .collect()
}

/// A large quad under the model acting as an invisible shadow catcher.
///
/// `floor_y` should be the scaled model's minimum y; `extent` its largest
/// scaled dimension.
pub fn ground_plane_vertices(floor_y: f32, extent: f32) -> Vec<MeshVertex> {
    let half = (extent * 4.0).max(8.0);
    let up = [0.0, 1.0, 0.0];
    let corners = [
        [-half, floor_y, -half],
        [-half, floor_y, half],
        [half, floor_y, half],
        [half, floor_y, -half],
    ];
    vec![
        MeshVertex { position: corners[0], normal: up },
        MeshVertex { position: corners[1], normal: up },
        MeshVertex { position: corners[2], normal: up },
        MeshVertex { position: corners[0], normal: up },
        MeshVertex { position: corners[2], normal: up },
        MeshVertex { position: corners[3], normal: up },
    ]
}

/// Bind group layout shared by the mesh and ground pipelines: scene
/// uniform, shadow map, comparison sampler.
pub fn scene_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
        ],
        label: Some("scene_bind_group_layout"),
    })
}

/// Bind group layout for the shadow depth pre-pass
pub fn shadow_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("shadow_bind_group_layout"),
    })
}

/// Create the forward render pipeline used for the mesh and the ground
/// plane
pub fn create_mesh_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    shader: &wgpu::ShaderModule,
    target_format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Pipeline Layout")),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{label} Pipeline")),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            buffers: &[MeshVertex::desc()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // STL winding is unreliable in the wild; draw both sides.
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth32Float,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

/// Create the depth-only pipeline that renders the shadow map
pub fn create_shadow_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    shader: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Shadow Pipeline Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Shadow Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: "vs_main",
            buffers: &[MeshVertex::desc()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: None,
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth32Float,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

/// Create a depth texture matching the given dimensions
pub fn create_depth_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stlview_core::Vector3f;

    #[test]
    fn geometry_vertices_pair_positions_with_normals() {
        let mut g = Geometry::new();
        g.push_facet(
            [
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            Vector3f::new(0.0, 0.0, 1.0),
        );
        let vertices = geometry_to_vertices(&g);
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[2].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn ground_plane_sits_at_floor_height() {
        let vertices = ground_plane_vertices(-1.5, 2.0);
        assert_eq!(vertices.len(), 6);
        for v in &vertices {
            assert_relative_eq!(v.position[1], -1.5);
            assert_eq!(v.normal, [0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn clip_space_conversion_maps_z_range() {
        let m = opengl_to_wgpu_matrix();
        let near = m * nalgebra::Vector4::new(0.0, 0.0, -1.0, 1.0);
        let far = m * nalgebra::Vector4::new(0.0, 0.0, 1.0, 1.0);
        assert_relative_eq!(near.z, 0.0);
        assert_relative_eq!(far.z, 1.0);
    }

    #[test]
    fn lighting_rig_tracks_options() {
        let mut options = PreviewOptions::default();
        options.lighting.directional_intensity = 2.0;
        options.lighting.ambient_intensity = 0.1;
        let uniform = scene_uniform(
            Matrix4::identity(),
            Matrix4::identity(),
            Matrix4::identity(),
            Point3f::new(0.0, 0.0, 5.0),
            &options,
        );
        assert_relative_eq!(uniform.key[3], 2.0);
        assert_relative_eq!(uniform.fill[3], 0.8);
        assert_relative_eq!(uniform.model_color[3], 0.1);
    }
}
