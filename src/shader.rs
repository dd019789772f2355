//! GLSL assembly and pipeline construction for document passes.
//!
//! Pass sources arrive as ShaderToy fragments: a `mainImage` function plus
//! whatever helpers the author wrote. [`assemble_fragment_source`] wraps that
//! in a real Vulkan-GLSL fragment shader with the `iTime`/`iChannel` uniform
//! surface declared, and [`build_pass_program`] compiles it through naga's
//! GLSL frontend into a render pipeline targeting a pass buffer.
//!
//! Compilation failures never take the player down. The build is wrapped in
//! a validation error scope; if the user's shader doesn't compile, the error
//! is logged and a solid-magenta fallback pipeline is swapped in so the
//! frame loop keeps running.
//!
//! All coordinates are y-down: `fragCoord` is `gl_FragCoord.xy` untouched,
//! pass buffers are written and sampled in the same orientation, and only
//! the final blit to the window flips vertically.

use std::fmt::Write as _;

use crate::document::{FilterMode, SamplerSpec, WrapMode, MAX_INPUTS};
use crate::gpu::GpuContext;
use crate::pool::PASS_BUFFER_FORMAT;

/// Binding slot of the per-pass uniform block.
pub const UNIFORM_BINDING: u32 = 0;

/// Binding slot of channel `c`'s texture.
pub fn channel_texture_binding(c: usize) -> u32 {
    1 + c as u32 * 2
}

/// Binding slot of channel `c`'s sampler.
pub fn channel_sampler_binding(c: usize) -> u32 {
    2 + c as u32 * 2
}

/// The std140 uniform block backing the ShaderToy built-in inputs.
///
/// Field order and padding mirror the `ShaderInputs` block declared in
/// [`assemble_fragment_source`]; the layout tests below pin the offsets.
/// `channel_time` and `channel_resolution` use a full vec4 stride per
/// element because std140 arrays round element alignment up to 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassUniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub sample_rate: f32,
    pub _pad0: f32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub channel_time: [[f32; 4]; 4],
    pub channel_resolution: [[f32; 4]; 4],
}

impl PassUniforms {
    pub fn zeroed() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

const UNIFORM_BLOCK: &str = "\
layout(std140, binding = 0) uniform ShaderInputs {
    vec3  iResolution;
    float iTime;
    float iTimeDelta;
    int   iFrame;
    float iSampleRate;
    float _pad0;
    vec4  iMouse;
    vec4  iDate;
    float iChannelTime[4];
    vec3  iChannelResolution[4];
};
";

/// Fullscreen-triangle vertex stage shared by every pass pipeline.
pub const FULLSCREEN_VERTEX: &str = "\
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0),
        vec2<f32>(3.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    return vec4<f32>(positions[index], 0.0, 1.0);
}
";

/// Fragment stage substituted when a pass fails to compile. Solid magenta,
/// hard to mistake for intended output.
const ERROR_FRAGMENT: &str = "\
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 1.0, 1.0);
}
";

/// Wraps a pass's `mainImage` source in a complete fragment shader.
///
/// `channel_types` gives the GLSL sampler type per channel (`"sampler2D"`
/// or `"samplerCube"`); the matching `texture2D`/`textureCube` binding pair
/// is declared for each, with an `iChannelN` define combining them. The
/// common pass source, when present, lands between the declarations and the
/// user code so both see it.
pub fn assemble_fragment_source(
    common: Option<&str>,
    user_code: &str,
    channel_types: &[&'static str; MAX_INPUTS],
) -> String {
    let mut source = String::with_capacity(user_code.len() + 2048);
    source.push_str("#version 450\n\n");
    source.push_str(UNIFORM_BLOCK);
    source.push('\n');

    for (c, sampler_type) in channel_types.iter().enumerate() {
        let texture_type = match *sampler_type {
            "samplerCube" => "textureCube",
            _ => "texture2D",
        };
        let _ = writeln!(
            source,
            "layout(binding = {}) uniform {texture_type} iChannel{c}_tex;",
            channel_texture_binding(c)
        );
        let _ = writeln!(
            source,
            "layout(binding = {}) uniform sampler iChannel{c}_smp;",
            channel_sampler_binding(c)
        );
        let _ = writeln!(
            source,
            "#define iChannel{c} {sampler_type}(iChannel{c}_tex, iChannel{c}_smp)"
        );
    }
    source.push('\n');

    if let Some(common) = common {
        source.push_str(common);
        source.push('\n');
    }

    source.push_str(user_code);
    source.push_str(
        "\n\
         layout(location = 0) out vec4 outColor;\n\
         void main() {\n\
         \x20   vec4 color = vec4(0.0, 0.0, 0.0, 1.0);\n\
         \x20   mainImage(color, gl_FragCoord.xy);\n\
         \x20   outColor = color;\n\
         }\n",
    );
    source
}

/// A compiled pass pipeline plus the layout its per-frame bind groups use.
pub struct PassProgram {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
    /// Set when the user's shader failed to compile and the magenta
    /// fallback pipeline is in place.
    pub compile_error: Option<String>,
}

/// Compiles `source` into a pass pipeline, falling back to the error
/// pipeline on any validation failure.
pub fn build_pass_program(
    gpu: &GpuContext,
    name: &str,
    source: &str,
    cubemap_channels: [bool; MAX_INPUTS],
) -> PassProgram {
    let bind_group_layout = create_pass_bind_group_layout(&gpu.device, cubemap_channels);

    gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let fragment = gpu
        .device
        .create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Glsl {
                shader: source.into(),
                stage: wgpu::naga::ShaderStage::Fragment,
                defines: Default::default(),
            },
        });
    let pipeline = create_pass_pipeline(gpu, name, &bind_group_layout, &fragment, "main");
    let error = pollster::block_on(gpu.device.pop_error_scope());

    match error {
        None => PassProgram {
            pipeline,
            bind_group_layout,
            compile_error: None,
        },
        Some(err) => {
            log::error!("shader '{name}' failed to compile: {err}");
            let fallback = gpu
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Error Fragment"),
                    source: wgpu::ShaderSource::Wgsl(ERROR_FRAGMENT.into()),
                });
            let pipeline = create_pass_pipeline(gpu, name, &bind_group_layout, &fallback, "fs_main");
            PassProgram {
                pipeline,
                bind_group_layout,
                compile_error: Some(err.to_string()),
            }
        }
    }
}

fn create_pass_pipeline(
    gpu: &GpuContext,
    name: &str,
    bind_group_layout: &wgpu::BindGroupLayout,
    fragment: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::RenderPipeline {
    let vertex = gpu
        .device
        .create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fullscreen Vertex"),
            source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VERTEX.into()),
        });

    let layout = gpu
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });

    gpu.device
        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(name),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: fragment,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: PASS_BUFFER_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
}

fn create_pass_bind_group_layout(
    device: &wgpu::Device,
    cubemap_channels: [bool; MAX_INPUTS],
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(1 + MAX_INPUTS * 2);
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: UNIFORM_BINDING,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    for (c, &cube) in cubemap_channels.iter().enumerate() {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: channel_texture_binding(c),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: if cube {
                    wgpu::TextureViewDimension::Cube
                } else {
                    wgpu::TextureViewDimension::D2
                },
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: channel_sampler_binding(c),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Pass Bind Group Layout"),
        entries: &entries,
    })
}

/// Creates the sampler a channel requested in its document settings.
///
/// Mipmap filtering degrades to linear because every texture here carries a
/// single mip level.
pub fn channel_sampler(device: &wgpu::Device, spec: &SamplerSpec) -> wgpu::Sampler {
    let filter = match spec.filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear | FilterMode::Mipmap => wgpu::FilterMode::Linear,
    };
    let address = match spec.wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Channel Sampler"),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn uniform_layout_matches_std140() {
        assert_eq!(offset_of!(PassUniforms, resolution), 0);
        assert_eq!(offset_of!(PassUniforms, time), 12);
        assert_eq!(offset_of!(PassUniforms, time_delta), 16);
        assert_eq!(offset_of!(PassUniforms, frame), 20);
        assert_eq!(offset_of!(PassUniforms, sample_rate), 24);
        assert_eq!(offset_of!(PassUniforms, mouse), 32);
        assert_eq!(offset_of!(PassUniforms, date), 48);
        assert_eq!(offset_of!(PassUniforms, channel_time), 64);
        assert_eq!(offset_of!(PassUniforms, channel_resolution), 128);
        assert_eq!(std::mem::size_of::<PassUniforms>(), 192);
    }

    #[test]
    fn assembled_source_declares_all_channels() {
        let source = assemble_fragment_source(
            None,
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(0.0); }",
            &["sampler2D", "samplerCube", "sampler2D", "sampler2D"],
        );
        assert!(source.contains("uniform texture2D iChannel0_tex;"));
        assert!(source.contains("uniform textureCube iChannel1_tex;"));
        assert!(source.contains("#define iChannel1 samplerCube(iChannel1_tex, iChannel1_smp)"));
        assert!(source.contains("uniform ShaderInputs"));
        assert!(source.contains("mainImage(color, gl_FragCoord.xy);"));
    }

    #[test]
    fn common_source_precedes_user_code() {
        let source = assemble_fragment_source(
            Some("float shared_helper() { return 1.0; }"),
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(shared_helper()); }",
            &["sampler2D"; 4],
        );
        let common_at = source.find("shared_helper() {").unwrap();
        let user_at = source.find("mainImage(out").unwrap();
        assert!(common_at < user_at);
    }

    #[test]
    fn channel_bindings_interleave_after_uniforms() {
        assert_eq!(channel_texture_binding(0), 1);
        assert_eq!(channel_sampler_binding(0), 2);
        assert_eq!(channel_texture_binding(3), 7);
        assert_eq!(channel_sampler_binding(3), 8);
    }
}
