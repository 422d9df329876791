use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::camera::{CameraUniform, PerspectiveCamera};
use crate::error::{Error, Result};
use crate::particle_system::{max_capacity, Particle, ParticleSystem};
use crate::scene::{AxisVertex, Scene};
use crate::surface::CanvasSize;

/// Drawing backend bound to one surface
pub trait Render {
    /// One draw of `scene` from `camera`.
    fn render(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
    ) -> Result<(), wgpu::SurfaceError>;

    /// Match the output target to a new surface size. `camera` already
    /// carries the projection for that size.
    fn resize(&mut self, size: CanvasSize, camera: &PerspectiveCamera);

    /// Largest particle system this backend can draw.
    fn max_particles(&self) -> usize;
}

const MSAA_SAMPLES: u32 = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct EmitterUniform {
    time: f32,
    _padding: [f32; 3],
}

/// GPU side of one particle system: instance ring + time uniform
struct ParticleLayer {
    instance_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    /// `spawned_total` of the system at the last upload
    uploaded: u64,
    /// Epoch of the system at the last upload
    epoch_generation: u64,
}

pub struct Renderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: CanvasSize,
    sample_count: u32,
    msaa_view: Option<wgpu::TextureView>,
    particle_pipeline: wgpu::RenderPipeline,
    axis_pipeline: wgpu::RenderPipeline,
    quad_buffer: wgpu::Buffer,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    emitter_layout: wgpu::BindGroupLayout,
    particle_layers: Vec<ParticleLayer>,
    axis_buffers: Vec<wgpu::Buffer>,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = CanvasSize::from(window.inner_size());

        // Create wgpu instance (cross-platform GPU abstraction)
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        // Request adapter (physical GPU)
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(Error::NoAdapter)?;
        log::debug!("Using adapter {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Sparkfield Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        // Configure surface
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(Error::UnsupportedSurface)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .ok_or(Error::UnsupportedSurface)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo, // VSync
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        if !size.is_empty() {
            surface.configure(&device, &config);
        }

        let sample_count = if adapter
            .get_texture_format_features(surface_format)
            .flags
            .sample_count_supported(MSAA_SAMPLES)
        {
            MSAA_SAMPLES
        } else {
            log::warn!("{:?} has no {}x MSAA; drawing aliased", surface_format, MSAA_SAMPLES);
            1
        };
        let msaa_view = create_msaa_view(&device, &config, sample_count);

        // Quad corners for instanced particle billboards
        let vertices: &[f32] = &[
            -1.0, -1.0, // Bottom-left
            1.0, -1.0, // Bottom-right
            1.0, 1.0, // Top-right
            -1.0, -1.0, // Bottom-left
            1.0, 1.0, // Top-right
            -1.0, 1.0, // Top-left
        ];

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniform Buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_layout = uniform_layout(&device, "Camera Bind Group Layout");
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some("Camera Bind Group"),
        });
        let emitter_layout = uniform_layout(&device, "Emitter Bind Group Layout");

        let particle_pipeline = particle_pipeline(
            &device,
            &camera_layout,
            &emitter_layout,
            config.format,
            sample_count,
        );
        let axis_pipeline = axis_pipeline(&device, &camera_layout, config.format, sample_count);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            sample_count,
            msaa_view,
            particle_pipeline,
            axis_pipeline,
            quad_buffer,
            camera_buffer,
            camera_bind_group,
            emitter_layout,
            particle_layers: Vec::new(),
            axis_buffers: Vec::new(),
        })
    }

    pub fn size(&self) -> CanvasSize {
        self.size
    }

    fn reconfigure(&mut self) {
        if !self.size.is_empty() {
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn write_camera(&self, camera: &PerspectiveCamera) {
        let uniform = camera.uniform([self.size.width as f32, self.size.height as f32]);
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[uniform]));
    }

    fn create_particle_layer(&self, capacity: usize) -> ParticleLayer {
        let instance_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Instance Buffer"),
            size: (capacity * std::mem::size_of::<Particle>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Emitter Uniform Buffer"),
            size: std::mem::size_of::<EmitterUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.emitter_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("Emitter Bind Group"),
        });
        log::debug!("Allocated particle buffer for {} particles", capacity);

        ParticleLayer {
            instance_buffer,
            uniform_buffer,
            bind_group,
            capacity,
            uploaded: 0,
            epoch_generation: 0,
        }
    }

    /// Upload whatever each particle system wrote since the last frame
    fn sync_particles(&mut self, scene: &Scene) {
        let limit = self.max_particles();
        let mut synced = 0;
        for (index, system) in scene.particle_systems().enumerate() {
            if system.capacity() > limit {
                log::warn!(
                    "Particle system of {} exceeds the device limit of {}; not drawn",
                    system.capacity(),
                    limit
                );
                break;
            }
            if index == self.particle_layers.len() {
                let layer = self.create_particle_layer(system.capacity());
                self.particle_layers.push(layer);
            }
            let layer = &mut self.particle_layers[index];
            upload_particles(&self.queue, layer, system);
            synced += 1;
        }
        self.particle_layers.truncate(synced);
    }

    fn sync_axes(&mut self, scene: &Scene) {
        for (index, helper) in scene.axis_helpers().enumerate() {
            let vertices = helper.vertices();
            if index == self.axis_buffers.len() {
                let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Axis Vertex Buffer"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                });
                self.axis_buffers.push(buffer);
            } else {
                self.queue
                    .write_buffer(&self.axis_buffers[index], 0, bytemuck::cast_slice(&vertices));
            }
        }
        let helpers = scene.axis_helpers().count();
        self.axis_buffers.truncate(helpers);
    }
}

fn upload_particles(queue: &wgpu::Queue, layer: &mut ParticleLayer, system: &ParticleSystem) {
    if layer.capacity == system.capacity() {
        let stride = std::mem::size_of::<Particle>();
        let ranges = if layer.epoch_generation == system.epoch_generation() {
            system.dirty_ranges(layer.uploaded)
        } else {
            // every start_time moved with the epoch
            vec![0..system.capacity()]
        };
        for range in ranges {
            let offset = (range.start * stride) as wgpu::BufferAddress;
            queue.write_buffer(&layer.instance_buffer, offset, system.range_bytes(range));
        }
        layer.uploaded = system.spawned_total();
        layer.epoch_generation = system.epoch_generation();
    } else {
        log::warn!(
            "Particle system capacity changed from {} to {}; skipping upload",
            layer.capacity,
            system.capacity()
        );
    }

    let uniform = EmitterUniform {
        time: system.shader_time(),
        _padding: [0.0; 3],
    };
    queue.write_buffer(&layer.uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));
}

impl Render for Renderer {
    fn render(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
    ) -> Result<(), wgpu::SurfaceError> {
        if self.size.is_empty() {
            return Ok(());
        }

        self.sync_particles(scene);
        self.sync_axes(scene);

        self.write_camera(camera);

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated; reconfiguring");
                self.reconfigure();
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let (target, resolve_target) = match &self.msaa_view {
            Some(msaa_view) => (msaa_view, Some(&view)),
            None => (&view, None),
        };

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(scene.background.into()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

            render_pass.set_pipeline(&self.axis_pipeline);
            for buffer in &self.axis_buffers {
                render_pass.set_vertex_buffer(0, buffer.slice(..));
                render_pass.draw(0..6, 0..1);
            }

            // All particles of a system in one instanced draw
            render_pass.set_pipeline(&self.particle_pipeline);
            render_pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
            for layer in &self.particle_layers {
                render_pass.set_bind_group(1, &layer.bind_group, &[]);
                render_pass.set_vertex_buffer(1, layer.instance_buffer.slice(..));
                let instances = u32::try_from(layer.capacity).unwrap_or(u32::MAX);
                render_pass.draw(0..6, 0..instances);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn resize(&mut self, size: CanvasSize, camera: &PerspectiveCamera) {
        self.size = size;
        self.config.width = size.width;
        self.config.height = size.height;
        self.reconfigure();
        self.msaa_view = create_msaa_view(&self.device, &self.config, self.sample_count);
        self.write_camera(camera);
    }

    fn max_particles(&self) -> usize {
        max_capacity(self.device.limits().max_buffer_size)
    }
}

/// Multisampled color target resolved into the surface texture each frame
fn create_msaa_view(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    sample_count: u32,
) -> Option<wgpu::TextureView> {
    if sample_count <= 1 || config.width == 0 || config.height == 0 {
        return None;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("MSAA Color Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format: config.format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    Some(texture.create_view(&wgpu::TextureViewDescriptor::default()))
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some(label),
    })
}

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

fn particle_pipeline(
    device: &wgpu::Device,
    camera_layout: &wgpu::BindGroupLayout,
    emitter_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Particle Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/particle.wgsl").into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Particle Pipeline Layout"),
        bind_group_layouts: &[camera_layout, emitter_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Particle Render Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[
                // Quad corners
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x2,
                    }],
                },
                // Particle instances
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Particle>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &[
                        wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x3, // position
                        },
                        wgpu::VertexAttribute {
                            offset: 12,
                            shader_location: 2,
                            format: wgpu::VertexFormat::Float32, // start_time
                        },
                        wgpu::VertexAttribute {
                            offset: 16,
                            shader_location: 3,
                            format: wgpu::VertexFormat::Float32x3, // velocity
                        },
                        wgpu::VertexAttribute {
                            offset: 28,
                            shader_location: 4,
                            format: wgpu::VertexFormat::Float32, // lifetime
                        },
                        wgpu::VertexAttribute {
                            offset: 32,
                            shader_location: 5,
                            format: wgpu::VertexFormat::Float32x3, // color
                        },
                        wgpu::VertexAttribute {
                            offset: 44,
                            shader_location: 6,
                            format: wgpu::VertexFormat::Float32, // size
                        },
                        wgpu::VertexAttribute {
                            offset: 48,
                            shader_location: 7,
                            format: wgpu::VertexFormat::Float32, // turbulence
                        },
                    ],
                },
            ],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(ADDITIVE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

fn axis_pipeline(
    device: &wgpu::Device,
    camera_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Axis Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/axes.wgsl").into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Axis Pipeline Layout"),
        bind_group_layouts: &[camera_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Axis Render Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<AxisVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x3,
                    },
                    wgpu::VertexAttribute {
                        offset: 12,
                        shader_location: 1,
                        format: wgpu::VertexFormat::Float32x3,
                    },
                ],
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::LineList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}
