//! Interactive mesh viewer
//!
//! Continuous-frame-loop counterpart of the still renderer: same pipeline
//! setup, but rendering to a window surface with drag-to-rotate and a
//! constant auto-rotation applied every frame.
//!
//! Disposal here is RAII rather than the session arena: the viewer's GPU
//! resources live for the whole event loop and are dropped together when
//! the closure that owns them returns. The [`SessionSlot`] still tracks the
//! lifecycle so close ends the session before the loop exits; only the
//! still renderer, whose resources die mid-function, routes them through
//! `RenderSession::own`.

use crate::context::GpuContext;
use crate::framing::FramingProfile;
use crate::pipeline::{
    self, create_depth_texture, create_mesh_pipeline, geometry_to_vertices,
    scene_bind_group_layout, scene_uniform,
};
use crate::session::{SessionSlot, SessionState};
use nalgebra::Matrix4;
use std::sync::Arc;
use stlview_core::{Error, Geometry, PreviewOptions, Result};
use wgpu::util::DeviceExt;
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, Event, MouseButton, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

/// Radians of yaw added every frame regardless of manual rotation
const AUTO_ROTATE_STEP: f32 = 0.008;
/// Pointer-delta to radians factor for drag rotation
const DRAG_SENSITIVITY: f32 = 0.01;

/// Interactive viewer for a single mesh
pub struct Viewer {
    geometry: Geometry,
    options: PreviewOptions,
    profile: FramingProfile,
    yaw: f32,
    pitch: f32,
    last_mouse_pos: Option<PhysicalPosition<f64>>,
    mouse_pressed: bool,
}

impl Viewer {
    pub fn new(geometry: Geometry, options: PreviewOptions) -> Self {
        Self {
            geometry,
            options,
            profile: FramingProfile::interactive(),
            yaw: 0.0,
            pitch: 0.0,
            last_mouse_pos: None,
            mouse_pressed: false,
        }
    }

    /// Accumulated model rotation from auto-rotate plus drag input.
    /// Yaw and pitch are unclamped by design.
    fn model_matrix(&self) -> Matrix4<f32> {
        nalgebra::Rotation3::from_euler_angles(self.pitch, self.yaw, 0.0).to_homogeneous()
    }

    /// Run the viewer until the window is closed
    pub fn run(mut self) -> Result<()> {
        if self.geometry.is_empty() {
            return Err(Error::Format("cannot view an empty geometry".to_string()));
        }

        let event_loop = EventLoop::new()
            .map_err(|e| Error::Gpu(format!("Failed to create event loop: {e}")))?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title("stlview")
                .with_inner_size(winit::dpi::LogicalSize::new(1024.0, 768.0))
                .build(&event_loop)
                .map_err(|e| Error::Gpu(format!("Failed to create window: {e}")))?,
        );

        let context = pollster::block_on(GpuContext::new())?;
        let surface = context
            .instance
            .create_surface(window.clone())
            .map_err(|e| Error::Gpu(format!("Failed to create surface: {e}")))?;

        let surface_caps = surface.get_capabilities(&context.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let size = window.inner_size();
        let mut surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &surface_config);

        let mut slot = SessionSlot::new();
        let session = slot.begin();
        session.transition(SessionState::Initialized)?;
        session.transition(SessionState::Loading)?;

        // Frame the model once; the camera stays fixed and the model spins.
        let scale = self
            .profile
            .compute_scale(self.geometry.bounding_box().max_dimension());
        self.geometry.center_and_scale(scale);
        let bounds = self.geometry.bounding_box();
        let extent = bounds.max_dimension();
        let (camera_position, look_at) = self
            .profile
            .camera_placement(bounds.size(), self.options.camera_position);
        let far = ((camera_position - look_at).norm() + extent * 4.0).max(100.0);

        let scene_layout = scene_bind_group_layout(&context.device);
        let mesh_shader =
            context.create_shader_module("Viewer Mesh Shader", include_str!("shaders/mesh.wgsl"));
        let mesh_pipeline = create_mesh_pipeline(
            &context.device,
            &scene_layout,
            &mesh_shader,
            surface_format,
            "Viewer Mesh",
        );

        let vertices = geometry_to_vertices(&self.geometry);
        let vertex_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Viewer Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let vertex_count = vertices.len() as u32;

        let light_view_proj = pipeline::light_view_projection(extent);
        let mut scene = scene_uniform(
            pipeline::view_projection(
                camera_position,
                look_at,
                surface_config.width as f32 / surface_config.height as f32,
                far,
            ),
            light_view_proj,
            self.model_matrix(),
            camera_position,
            &self.options,
        );
        let scene_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Viewer Scene Buffer"),
                contents: bytemuck::bytes_of(&scene),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        // The interactive path skips the shadow pre-pass; a cleared 1x1
        // shadow map satisfies the shared bind group layout with full
        // visibility everywhere.
        let shadow_map = create_depth_texture(&context.device, 1, 1, "Viewer Shadow Map");
        let shadow_view = shadow_map.create_view(&wgpu::TextureViewDescriptor::default());
        clear_depth(&context, &shadow_view);
        let shadow_sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Viewer Shadow Sampler"),
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let scene_bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &scene_layout,
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
                    resource: wgpu::BindingResource::Sampler(&shadow_sampler),
                },
            ],
            label: Some("viewer_scene_bind_group"),
        });

        let mut depth_texture = create_depth_texture(
            &context.device,
            surface_config.width,
            surface_config.height,
            "Viewer Depth Texture",
        );
        let mut depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        if let Some(session) = slot.current() {
            session.transition(SessionState::Populated)?;
            session.transition(SessionState::Animating)?;
        }

        let background = self.options.background_color;
        let clear_color = wgpu::Color {
            r: (background[0] as f64 / 255.0).powf(2.2),
            g: (background[1] as f64 / 255.0).powf(2.2),
            b: (background[2] as f64 / 255.0).powf(2.2),
            a: 1.0,
        };

        log::info!(
            "viewer started: {} triangles, scale {scale}",
            self.geometry.triangle_count()
        );

        event_loop
            .run(move |event, target| {
                target.set_control_flow(ControlFlow::Poll);

                if let Event::WindowEvent { event, .. } = event {
                    match event {
                        WindowEvent::CloseRequested => {
                            slot.end();
                            target.exit();
                        }
                        WindowEvent::Resized(new_size) => {
                            if new_size.width > 0 && new_size.height > 0 {
                                surface_config.width = new_size.width;
                                surface_config.height = new_size.height;
                                surface.configure(&context.device, &surface_config);
                                depth_texture = create_depth_texture(
                                    &context.device,
                                    new_size.width,
                                    new_size.height,
                                    "Viewer Depth Texture",
                                );
                                depth_view = depth_texture
                                    .create_view(&wgpu::TextureViewDescriptor::default());
                                // Projection follows the new aspect ratio.
                                scene.view_proj = pipeline::view_projection(
                                    camera_position,
                                    look_at,
                                    new_size.width as f32 / new_size.height as f32,
                                    far,
                                )
                                .into();
                            }
                        }
                        WindowEvent::MouseInput { state, button, .. } => {
                            if button == MouseButton::Left {
                                self.mouse_pressed = state == ElementState::Pressed;
                            }
                        }
                        WindowEvent::CursorMoved { position, .. } => {
                            if let Some(last_pos) = self.last_mouse_pos {
                                if self.mouse_pressed {
                                    let delta_x = (position.x - last_pos.x) as f32;
                                    let delta_y = (position.y - last_pos.y) as f32;
                                    self.yaw += delta_x * DRAG_SENSITIVITY;
                                    self.pitch += delta_y * DRAG_SENSITIVITY;
                                }
                            }
                            self.last_mouse_pos = Some(position);
                        }
                        WindowEvent::RedrawRequested => {
                            // Auto-rotation runs every frame, on top of any
                            // manual rotation.
                            self.yaw += AUTO_ROTATE_STEP;
                            scene.model = self.model_matrix().into();
                            context.queue.write_buffer(
                                &scene_buffer,
                                0,
                                bytemuck::bytes_of(&scene),
                            );

                            match surface.get_current_texture() {
                                Ok(frame) => {
                                    let view = frame
                                        .texture
                                        .create_view(&wgpu::TextureViewDescriptor::default());
                                    let mut encoder = context.device.create_command_encoder(
                                        &wgpu::CommandEncoderDescriptor {
                                            label: Some("Viewer Render Encoder"),
                                        },
                                    );
                                    {
                                        let mut render_pass =
                                            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                                                label: Some("Viewer Render Pass"),
                                                color_attachments: &[Some(
                                                    wgpu::RenderPassColorAttachment {
                                                        view: &view,
                                                        resolve_target: None,
                                                        ops: wgpu::Operations {
                                                            load: wgpu::LoadOp::Clear(clear_color),
                                                            store: wgpu::StoreOp::Store,
                                                        },
                                                    },
                                                )],
                                                depth_stencil_attachment: Some(
                                                    wgpu::RenderPassDepthStencilAttachment {
                                                        view: &depth_view,
                                                        depth_ops: Some(wgpu::Operations {
                                                            load: wgpu::LoadOp::Clear(1.0),
                                                            store: wgpu::StoreOp::Store,
                                                        }),
                                                        stencil_ops: None,
                                                    },
                                                ),
                                                timestamp_writes: None,
                                                occlusion_query_set: None,
                                            });
                                        render_pass.set_pipeline(&mesh_pipeline);
                                        render_pass.set_bind_group(0, &scene_bind_group, &[]);
                                        render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                                        render_pass.draw(0..vertex_count, 0..1);
                                    }
                                    context.queue.submit(std::iter::once(encoder.finish()));
                                    frame.present();
                                }
                                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                    surface.configure(&context.device, &surface_config);
                                }
                                Err(e) => {
                                    log::warn!("dropped frame: {e}");
                                }
                            }

                            window.request_redraw();
                        }
                        _ => {}
                    }
                }
            })
            .map_err(|e| Error::Gpu(format!("Event loop error: {e}")))?;

        Ok(())
    }
}

/// Clear a depth view to the far plane without drawing anything
fn clear_depth(context: &GpuContext, view: &wgpu::TextureView) {
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Depth Clear Encoder"),
        });
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Depth Clear Pass"),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    context.queue.submit(std::iter::once(encoder.finish()));
}
