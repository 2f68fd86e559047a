use curvecast_encode::{EncodedFrame, TableLayout};
use curvecast_render::{DriverError, FrameUpload, GraphicsDriver};
use curvecast_shader::{FRAME_UNIFORM_BYTES, Fingerprint, ProgramSource, bindings};
use std::fmt;
use std::sync::mpsc;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const TABLE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Row pitch of a readback buffer for `width` RGBA8 texels.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Result of a buffer mapping once the device has been polled to
/// completion. A callback that never ran is an error, not a wait.
fn map_outcome<E: fmt::Display>(rx: &mpsc::Receiver<Result<(), E>>) -> Result<(), DriverError> {
    match rx.try_recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DriverError::Draw(format!("readback mapping failed: {e}"))),
        Err(mpsc::TryRecvError::Empty) => {
            Err(DriverError::Draw("readback mapping did not complete".into()))
        }
        Err(mpsc::TryRecvError::Disconnected) => {
            Err(DriverError::Draw("readback mapping was dropped".into()))
        }
    }
}

/// A generated program compiled into a render pipeline.
pub struct TracerProgram {
    pipeline: wgpu::RenderPipeline,
    fingerprint: Fingerprint,
}

impl TracerProgram {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// The four per-side tables, sized to one layout.
struct TableTextures {
    layout: TableLayout,
    connections: wgpu::Texture,
    wall_colors: wgpu::Texture,
    texture_map: wgpu::Texture,
    volumetric: wgpu::Texture,
}

/// Offscreen wgpu driver for the raycaster.
pub struct WgpuRaycaster {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    width: u32,
    height: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    frame_buffer: wgpu::Buffer,
    tables: Option<TableTextures>,
    atlas: wgpu::Texture,
    sampler: wgpu::Sampler,
    bind_group: Option<wgpu::BindGroup>,
}

fn table_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl WgpuRaycaster {
    /// Open the default adapter without a surface.
    pub fn headless(width: u32, height: u32) -> Result<Self, DriverError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DriverError::Device("no adapter found".into()))?;
        info!(adapter = ?adapter.get_info().name, "using adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("curvecast_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| DriverError::Device(e.to_string()))?;
        Ok(Self::new(device, queue, width, height))
    }

    pub fn new(device: wgpu::Device, queue: wgpu::Queue, width: u32, height: u32) -> Self {
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tracer_bind_group_layout"),
            entries: &[
                uniform_entry(bindings::FRAME, wgpu::ShaderStages::VERTEX_FRAGMENT),
                uniform_entry(bindings::TRANSFORMS, fragment),
                uniform_entry(bindings::WALLS, fragment),
                table_entry(bindings::CONNECTIONS),
                table_entry(bindings::WALL_COLORS),
                table_entry(bindings::TEXTURE_MAP),
                table_entry(bindings::VOLUMETRIC),
                wgpu::BindGroupLayoutEntry {
                    binding: bindings::ATLAS,
                    visibility: fragment,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: bindings::ATLAS_SAMPLER,
                    visibility: fragment,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tracer_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_uniforms"),
            size: FRAME_UNIFORM_BYTES as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atlas_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let atlas = Self::create_atlas(&device, &queue, 1, 1, &[255; 4]);
        let (color, depth) = Self::create_targets(&device, width, height);

        Self {
            color_view: color.create_view(&Default::default()),
            depth_view: depth.create_view(&Default::default()),
            color,
            device,
            queue,
            bind_group_layout,
            pipeline_layout,
            width: width.max(1),
            height: height.max(1),
            frame_buffer,
            tables: None,
            atlas,
            sampler,
            bind_group: None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let (color, depth) = Self::create_targets(&self.device, width, height);
        self.color_view = color.create_view(&Default::default());
        self.depth_view = depth.create_view(&Default::default());
        self.color = color;
        self.width = width.max(1);
        self.height = height.max(1);
    }

    /// Replace the wall texture atlas with `rgba` (RGBA8, row-major).
    pub fn set_atlas(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<(), DriverError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(DriverError::Upload(format!(
                "atlas of {width}x{height} needs {expected} bytes, got {}",
                rgba.len()
            )));
        }
        self.atlas = Self::create_atlas(&self.device, &self.queue, width, height, rgba);
        // the next upload rebinds
        self.bind_group = None;
        debug!(width, height, "atlas replaced");
        Ok(())
    }

    fn create_atlas(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> wgpu::Texture {
        device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("atlas"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            rgba,
        )
    }

    fn create_targets(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::Texture) {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let target = |label, format, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        (
            target(
                "color_target",
                COLOR_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            ),
            target("depth_target", DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT),
        )
    }

    fn create_table(&self, label: &str, layout: &TableLayout) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: layout.width() as u32,
                height: layout.rows as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TABLE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    fn write_table(&self, texture: &wgpu::Texture, layout: &TableLayout, texels: &[[f32; 4]]) {
        let size = texture.size();
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(layout.width() as u32 * 16),
                rows_per_image: Some(layout.rows as u32),
            },
            size,
        );
    }

    /// Table textures for `frame`, re-created when the layout changed.
    fn upload_tables(&mut self, frame: &EncodedFrame) -> Result<(), DriverError> {
        let layout = frame.layout;
        let texels = layout.texel_count();
        if frame.connections.len() != texels
            || frame.wall_colors.len() != texels
            || frame.texture_map.len() != texels
        {
            return Err(DriverError::Upload(format!(
                "tables hold {} texels, layout needs {texels}",
                frame.connections.len()
            )));
        }
        if self.tables.as_ref().is_none_or(|t| t.layout != layout) {
            debug!(width = layout.width(), rows = layout.rows, "allocating table textures");
            self.tables = Some(TableTextures {
                layout,
                connections: self.create_table("connections", &layout),
                wall_colors: self.create_table("wall_colors", &layout),
                texture_map: self.create_table("texture_map", &layout),
                volumetric: self.create_table("volumetric", &layout),
            });
        }
        let Some(tables) = &self.tables else {
            return Err(DriverError::Upload("table textures missing".into()));
        };
        self.write_table(&tables.connections, &layout, &frame.connections);
        self.write_table(&tables.wall_colors, &layout, &frame.wall_colors);
        self.write_table(&tables.texture_map, &layout, &frame.texture_map);
        if let Some(volumetric) = &frame.volumetric {
            self.write_table(&tables.volumetric, &layout, volumetric);
        }
        Ok(())
    }

    /// Copy the color target back as tightly packed RGBA8 rows.
    pub fn read_pixels(&self) -> Result<Vec<u8>, DriverError> {
        let padded = padded_bytes_per_row(self.width);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: u64::from(padded) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            self.color.size(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            if tx.send(result).is_err() {
                warn!("readback finished after its receiver was dropped");
            }
        });
        let status = self.device.poll(wgpu::Maintain::Wait);
        debug!(queue_empty = status.is_queue_empty(), "readback polled");
        map_outcome(&rx)?;

        let row = self.width as usize * 4;
        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity(row * self.height as usize);
        for chunk in mapped.chunks(padded as usize) {
            out.extend_from_slice(&chunk[..row]);
        }
        drop(mapped);
        buffer.unmap();
        Ok(out)
    }
}

impl GraphicsDriver for WgpuRaycaster {
    type Program = TracerProgram;

    fn compile(&mut self, source: &ProgramSource) -> Result<TracerProgram, DriverError> {
        let _span = tracing::info_span!("compile", fingerprint = %source.fingerprint).entered();
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tracer"),
            source: wgpu::ShaderSource::Wgsl(source.wgsl().into()),
        });
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("tracer_pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some(ProgramSource::VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some(ProgramSource::FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DriverError::Compile(error.to_string()));
        }
        debug!("pipeline created");
        Ok(TracerProgram {
            pipeline,
            fingerprint: source.fingerprint,
        })
    }

    fn upload(&mut self, upload: &FrameUpload<'_>) -> Result<(), DriverError> {
        let frame = upload.frame;
        self.queue
            .write_buffer(&self.frame_buffer, 0, upload.uniforms.as_bytes());
        self.upload_tables(frame)?;

        let transforms = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("transforms"),
            contents: bytemuck::cast_slice(&frame.transforms.to_gpu()),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let walls = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("walls"),
            contents: &frame.walls.to_bytes(),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let Some(tables) = &self.tables else {
            return Err(DriverError::Upload("table textures missing".into()));
        };
        let view = |t: &wgpu::Texture| t.create_view(&Default::default());
        let (connections, wall_colors, texture_map, volumetric, atlas) = (
            view(&tables.connections),
            view(&tables.wall_colors),
            view(&tables.texture_map),
            view(&tables.volumetric),
            view(&self.atlas),
        );
        self.bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tracer_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: bindings::FRAME,
                    resource: self.frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::TRANSFORMS,
                    resource: transforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::WALLS,
                    resource: walls.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::CONNECTIONS,
                    resource: wgpu::BindingResource::TextureView(&connections),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::WALL_COLORS,
                    resource: wgpu::BindingResource::TextureView(&wall_colors),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::TEXTURE_MAP,
                    resource: wgpu::BindingResource::TextureView(&texture_map),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::VOLUMETRIC,
                    resource: wgpu::BindingResource::TextureView(&volumetric),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::ATLAS,
                    resource: wgpu::BindingResource::TextureView(&atlas),
                },
                wgpu::BindGroupEntry {
                    binding: bindings::ATLAS_SAMPLER,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));
        debug!(
            cells = frame.slots.len(),
            transforms = frame.transforms.len(),
            "frame uploaded"
        );
        Ok(())
    }

    fn draw(&mut self, program: &TracerProgram) -> Result<(), DriverError> {
        let bind_group = self
            .bind_group
            .as_ref()
            .ok_or_else(|| DriverError::Draw("nothing uploaded".into()))?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tracer_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tracer_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
