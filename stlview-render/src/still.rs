//! Deterministic still-image rendering
//!
//! Renders a framed geometry to an offscreen texture with the preview
//! lighting rig and encodes the result as PNG bytes. The scene (buffers,
//! textures, uniforms) is rebuilt from scratch on every invocation; only
//! the compiled pipelines persist across renders.

use crate::context::GpuContext;
use crate::framing::FramingProfile;
use crate::pipeline::{
    self, create_depth_texture, create_mesh_pipeline, create_shadow_pipeline,
    geometry_to_vertices, ground_plane_vertices, scene_bind_group_layout, scene_uniform,
    shadow_bind_group_layout, ShadowUniform,
};
use crate::session::{RenderSession, SessionState};
use nalgebra::Matrix4;
use stlview_core::{Error, Geometry, PreviewOptions, Result};
use wgpu::util::DeviceExt;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const SHADOW_MAP_SIZE: u32 = 1024;
/// Some backends need a warm-up frame before shadow maps converge.
const WARMUP_FRAMES: usize = 2;
/// Smallest byte count a plausible PNG of a rendered frame can have.
const MIN_PLAUSIBLE_PNG: usize = 90;
/// Largest per-axis output dimension, matching wgpu's default
/// `max_texture_dimension_2d` limit.
const MAX_OUTPUT_DIM: u32 = 8192;

/// Offscreen renderer producing PNG previews
pub struct StillRenderer {
    context: GpuContext,
    profile: FramingProfile,
    scene_layout: wgpu::BindGroupLayout,
    shadow_layout: wgpu::BindGroupLayout,
    mesh_pipeline: wgpu::RenderPipeline,
    ground_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    shadow_sampler: wgpu::Sampler,
}

impl StillRenderer {
    /// Create a headless renderer with the still framing profile
    pub async fn new() -> Result<Self> {
        Self::with_profile(FramingProfile::still()).await
    }

    pub async fn with_profile(profile: FramingProfile) -> Result<Self> {
        let context = GpuContext::new().await?;
        let device = &context.device;

        let scene_layout = scene_bind_group_layout(device);
        let shadow_layout = shadow_bind_group_layout(device);

        let mesh_shader =
            context.create_shader_module("Mesh Shader", include_str!("shaders/mesh.wgsl"));
        let ground_shader =
            context.create_shader_module("Ground Shader", include_str!("shaders/ground.wgsl"));
        let shadow_shader =
            context.create_shader_module("Shadow Shader", include_str!("shaders/shadow.wgsl"));

        let mesh_pipeline =
            create_mesh_pipeline(device, &scene_layout, &mesh_shader, TARGET_FORMAT, "Mesh");
        let ground_pipeline =
            create_mesh_pipeline(device, &scene_layout, &ground_shader, TARGET_FORMAT, "Ground");
        let shadow_pipeline = create_shadow_pipeline(device, &shadow_layout, &shadow_shader);

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        Ok(Self {
            context,
            profile,
            scene_layout,
            shadow_layout,
            mesh_pipeline,
            ground_pipeline,
            shadow_pipeline,
            shadow_sampler,
        })
    }

    /// The framing profile this renderer frames models with
    pub fn profile(&self) -> &FramingProfile {
        &self.profile
    }

    /// Render a single deterministic frame and encode it as PNG bytes.
    ///
    /// The geometry is centered and scaled per the framing profile if it
    /// has not been framed yet. Fails with [`Error::Encode`] if the
    /// readback produces no usable pixels.
    pub fn render(&self, geometry: &mut Geometry, options: &PreviewOptions) -> Result<Vec<u8>> {
        pollster::block_on(self.render_async(geometry, options))
    }

    pub async fn render_async(
        &self,
        geometry: &mut Geometry,
        options: &PreviewOptions,
    ) -> Result<Vec<u8>> {
        if geometry.is_empty() {
            return Err(Error::Format("cannot render an empty geometry".to_string()));
        }

        let mut session = RenderSession::new();
        session.transition(SessionState::Initialized)?;
        session.transition(SessionState::Loading)?;

        // Frame the model: center once, scale once, then place the camera.
        let scale = self.profile.compute_scale(geometry.bounding_box().max_dimension());
        geometry.center_and_scale(scale);
        let bounds = geometry.bounding_box();
        let extent = bounds.max_dimension();
        let (camera_position, look_at) = self
            .profile
            .camera_placement(bounds.size(), options.camera_position);

        let device = &self.context.device;
        let queue = &self.context.queue;
        let (width, height) = options.output_size();
        validate_output_size(width, height)?;

        let mesh_vertices = geometry_to_vertices(geometry);
        let ground_vertices = ground_plane_vertices(bounds.min.y, extent);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Still Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&mesh_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ground_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Still Ground Vertex Buffer"),
            contents: bytemuck::cast_slice(&ground_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let camera_distance = (camera_position - look_at).norm();
        let far = (camera_distance + extent * 4.0).max(100.0);
        let view_proj = pipeline::view_projection(
            camera_position,
            look_at,
            width as f32 / height as f32,
            far,
        );
        let light_view_proj = pipeline::light_view_projection(extent);

        let scene = scene_uniform(
            view_proj,
            light_view_proj,
            Matrix4::identity(),
            camera_position,
            options,
        );
        let scene_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Still Scene Buffer"),
            contents: bytemuck::bytes_of(&scene),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let shadow_uniform = ShadowUniform {
            light_view_proj: light_view_proj.into(),
            model: Matrix4::identity().into(),
        };
        let shadow_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Still Shadow Buffer"),
            contents: bytemuck::bytes_of(&shadow_uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let shadow_map = create_depth_texture(device, SHADOW_MAP_SIZE, SHADOW_MAP_SIZE, "Shadow Map");
        let shadow_view = shadow_map.create_view(&wgpu::TextureViewDescriptor::default());

        let color_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Still Color Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_texture = create_depth_texture(device, width, height, "Still Depth Texture");
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.scene_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadow_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
                },
            ],
            label: Some("still_scene_bind_group"),
        });
        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.shadow_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shadow_buffer.as_entire_binding(),
            }],
            label: Some("still_shadow_bind_group"),
        });

        session.transition(SessionState::Populated)?;
        session.transition(SessionState::Rendering)?;

        let background = options.background_color;
        let clear_color = wgpu::Color {
            r: (background[0] as f64 / 255.0).powf(2.2),
            g: (background[1] as f64 / 255.0).powf(2.2),
            b: (background[2] as f64 / 255.0).powf(2.2),
            a: 1.0,
        };

        for _ in 0..WARMUP_FRAMES {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Still Render Encoder"),
            });

            {
                let mut shadow_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Shadow Pass"),
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &shadow_view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                shadow_pass.set_pipeline(&self.shadow_pipeline);
                shadow_pass.set_bind_group(0, &shadow_bind_group, &[]);
                shadow_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                shadow_pass.draw(0..mesh_vertices.len() as u32, 0..1);
            }

            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Still Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &color_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(clear_color),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &depth_view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                render_pass.set_pipeline(&self.ground_pipeline);
                render_pass.set_bind_group(0, &scene_bind_group, &[]);
                render_pass.set_vertex_buffer(0, ground_buffer.slice(..));
                render_pass.draw(0..ground_vertices.len() as u32, 0..1);

                render_pass.set_pipeline(&self.mesh_pipeline);
                render_pass.set_bind_group(0, &scene_bind_group, &[]);
                render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                render_pass.draw(0..mesh_vertices.len() as u32, 0..1);
            }

            queue.submit(std::iter::once(encoder.finish()));
        }

        let pixels = self.read_back(&color_texture, width, height).await?;

        // All frames submitted and read back; hand the scene's resources to
        // the session so disposal order is explicit.
        session.own("scene buffer", move || drop(scene_buffer));
        session.own("shadow buffer", move || drop(shadow_buffer));
        session.own("ground buffer", move || ground_buffer.destroy());
        session.own("vertex buffer", move || vertex_buffer.destroy());
        session.own("depth texture", move || depth_texture.destroy());
        session.own("shadow map", move || shadow_map.destroy());
        session.own("color texture", move || color_texture.destroy());
        session.dispose();

        encode_png(pixels, width, height)
    }

    /// Copy the rendered texture into a staging buffer and map it
    async fn read_back(
        &self,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>> {
        let device = &self.context.device;
        let queue = &self.context.queue;

        let bytes_per_pixel = 4u32;
        let unpadded_bytes_per_row = width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Still Readback Buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Still Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = sender.send(v);
        });

        device.poll(wgpu::Maintain::wait()).panic_on_timeout();

        match receiver.receive().await {
            Some(Ok(())) => {
                let data = buffer_slice.get_mapped_range();
                let mut pixels =
                    Vec::with_capacity((unpadded_bytes_per_row as u64 * height as u64) as usize);
                for row in data.chunks_exact(padded_bytes_per_row as usize) {
                    pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
                }
                drop(data);
                staging_buffer.unmap();
                Ok(pixels)
            }
            _ => Err(Error::Encode("failed to read back rendered pixels".to_string())),
        }
    }
}

/// Reject output sizes the GPU cannot allocate a texture for. Byte-count
/// arithmetic downstream relies on both axes fitting this limit.
fn validate_output_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 || width > MAX_OUTPUT_DIM || height > MAX_OUTPUT_DIM {
        return Err(Error::Encode(format!(
            "unsupported output size {width}x{height}, limit is {MAX_OUTPUT_DIM} per axis"
        )));
    }
    Ok(())
}

/// Encode raw RGBA pixels as PNG bytes, with a sanity floor so an empty or
/// bogus frame never reaches the cache
fn encode_png(pixels: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = (width as u64)
        .checked_mul(height as u64)
        .and_then(|n| n.checked_mul(4));
    if width == 0 || height == 0 || expected_len != Some(pixels.len() as u64) {
        return Err(Error::Encode(format!(
            "rendering surface produced {} bytes for {width}x{height}",
            pixels.len()
        )));
    }

    let image = image::RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| Error::Encode("pixel buffer does not match dimensions".to_string()))?;

    let mut png = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut png, image::ImageOutputFormat::Png)
        .map_err(|e| Error::Encode(format!("PNG encoding failed: {e}")))?;
    let png = png.into_inner();

    if png.len() < MIN_PLAUSIBLE_PNG {
        return Err(Error::Encode(format!(
            "implausibly small still image: {} bytes",
            png.len()
        )));
    }
    Ok(png)
}

/// Encode PNG bytes as a self-describing data URI
pub fn to_data_uri(png: &[u8]) -> String {
    use base64::Engine as _;
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pixels_fail_encoding() {
        let err = encode_png(Vec::new(), 0, 0).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn mismatched_pixel_count_fails_encoding() {
        let err = encode_png(vec![0u8; 10], 4, 4).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn huge_declared_dimensions_fail_encoding() {
        // The expected byte count overflows u32 arithmetic; the check must
        // not wrap and accidentally match a short buffer.
        let err = encode_png(vec![0u8; 64], u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn output_size_is_bounded() {
        assert!(validate_output_size(800, 600).is_ok());
        assert!(validate_output_size(MAX_OUTPUT_DIM, MAX_OUTPUT_DIM).is_ok());
        for (w, h) in [(0, 300), (400, 0), (1 << 18, 1 << 18), (MAX_OUTPUT_DIM + 1, 100)] {
            let err = validate_output_size(w, h).unwrap_err();
            assert!(matches!(err, Error::Encode(_)));
        }
    }

    #[test]
    fn valid_pixels_produce_decodable_png() {
        let pixels = vec![128u8; 16 * 16 * 4];
        let png = encode_png(pixels, 16, 16).unwrap();
        assert!(png.len() >= MIN_PLAUSIBLE_PNG);
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 16);
    }

    #[test]
    fn data_uri_is_self_describing() {
        let uri = to_data_uri(&[1, 2, 3]);
        assert!(uri.starts_with("data:image/png;base64,"));
    }
}
