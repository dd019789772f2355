//! Document-to-graph resolution and the per-frame ping-pong bookkeeping.
//!
//! [`ExecutionGraph::resolve`] turns a validated [`ShaderDocument`] into an
//! ordered list of executable [`RenderPassNode`]s in two phases. Phase one
//! orders the passes (buffers in declared order, then the cubemap pass, then
//! the image pass) and allocates both halves of each pass's ping-pong output
//! pair, so phase two can bind inputs that reference passes declared later
//! in the document. Sound and common passes produce no node: common source
//! is spliced into every pass's shader, and sound output has no place in
//! the visual graph.
//!
//! Feedback works on one global role pair: `back_buffer` names the output
//! half every pass writes this frame, `front_buffer` the half written last
//! frame. The pair is swapped exactly once per frame. Which half of a source
//! pass an input reads depends on execution order and is frozen at resolve
//! time: a pass earlier in the order has already run this frame, so its
//! freshly written half is the one to read; a self-reference or a pass later
//! in the order still holds last frame's data in its front half.

use thiserror::Error;

use crate::assets::{AssetProvider, AudioSource, StreamSource};
use crate::document::{
    DocumentError, InputKind, PassType, SamplerSpec, ShaderDocument, MAX_INPUTS,
};
use crate::gpu::GpuContext;
use crate::pool::{AssetKey, SlotId, SlotKind, TexturePool};
use crate::shader::{
    assemble_fragment_source, build_pass_program, channel_sampler, PassProgram, PassUniforms,
};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    InvalidDocument(#[from] DocumentError),
}

/// A video or webcam stream bound to the slot its frames upload into.
pub struct StreamBinding {
    pub source: StreamSource,
    pub slot: SlotId,
}

/// An audio stream bound to its waveform texture slot.
pub struct AudioBinding {
    pub source: AudioSource,
    pub slot: SlotId,
}

/// One executable pass.
pub struct RenderPassNode {
    pub pass_type: PassType,
    pub name: String,
    /// Ping-pong output pair, indexed by the graph's global role.
    pub outputs: [SlotId; 2],
    /// Per channel: the slot to read for each global role. Non-buffer inputs
    /// hold the same slot in both positions.
    pub inputs: [[SlotId; 2]; MAX_INPUTS],
    pub program: PassProgram,
    pub samplers: [wgpu::Sampler; MAX_INPUTS],
    /// This pass's `ShaderInputs` uniform buffer.
    pub uniforms: wgpu::Buffer,
}

/// The resolved, executable form of a document.
pub struct ExecutionGraph {
    pub nodes: Vec<RenderPassNode>,
    pub videos: Vec<StreamBinding>,
    pub audios: Vec<AudioBinding>,
    back_buffer: usize,
    front_buffer: usize,
    display_pass: usize,
}

impl ExecutionGraph {
    /// Resolves `document` against the pool, loading assets and compiling
    /// pass programs. Validation failures leave the pool untouched.
    pub fn resolve(
        gpu: &GpuContext,
        pool: &mut TexturePool,
        assets: &dyn AssetProvider,
        document: &ShaderDocument,
        render_width: u32,
        render_height: u32,
    ) -> Result<Self, GraphError> {
        document.validate()?;

        let order = ordered_pass_indices(document);
        let common = document.common_source();

        // Phase one: allocate every pass's output pair up front so forward
        // buffer references resolve in phase two.
        let mut outputs = Vec::with_capacity(order.len());
        for _ in &order {
            outputs.push([
                pool.create_pass_buffer(gpu, render_width, render_height),
                pool.create_pass_buffer(gpu, render_width, render_height),
            ]);
        }

        let node_by_output_id = |id: i32| -> Option<usize> {
            let doc_index = document.find_pass_by_output_id(id)?;
            order.iter().position(|&i| i == doc_index)
        };

        let mut videos = Vec::new();
        let mut audios = Vec::new();
        let mut nodes = Vec::with_capacity(order.len());

        for (node_index, &doc_index) in order.iter().enumerate() {
            let pass = &document.passes[doc_index];
            let mut inputs = unbound_input_pairs(pool.placeholder_image());
            let mut samplers: [Option<wgpu::Sampler>; MAX_INPUTS] = Default::default();

            for input in &pass.inputs {
                let channel = input.channel;
                inputs[channel] = match input.kind {
                    InputKind::Buffer => match node_by_output_id(input.id) {
                        Some(src_index) => {
                            buffer_input_pair(src_index, node_index, outputs[src_index])
                        }
                        None => {
                            log::warn!(
                                "pass '{}' channel {channel} references unknown output {}",
                                pass.name,
                                input.id
                            );
                            [pool.placeholder_image(); 2]
                        }
                    },
                    InputKind::Texture => {
                        let key = AssetKey {
                            source: input.src.clone(),
                            flip: input.sampler.vflip,
                            srgb: input.sampler.srgb,
                        };
                        [pool.load_image(gpu, assets, key); 2]
                    }
                    InputKind::Cubemap => {
                        let key = AssetKey {
                            source: input.src.clone(),
                            flip: input.sampler.vflip,
                            srgb: input.sampler.srgb,
                        };
                        [pool.load_cubemap(gpu, assets, key); 2]
                    }
                    InputKind::Video => {
                        // Video frames are already linear; sRGB decode would
                        // double-apply.
                        let key = AssetKey {
                            source: input.src.clone(),
                            flip: input.sampler.vflip,
                            srgb: false,
                        };
                        let slot = resolve_stream(
                            pool,
                            key,
                            SlotKind::Video,
                            input.sampler.vflip,
                            || assets.open_video(&input.src),
                            &mut videos,
                        );
                        [slot; 2]
                    }
                    InputKind::Webcam => {
                        // Camera frames arrive bottom-up relative to file
                        // images, so the requested flip is inverted.
                        let key = AssetKey {
                            source: "webcam".to_string(),
                            flip: !input.sampler.vflip,
                            srgb: false,
                        };
                        let slot = resolve_stream(
                            pool,
                            key,
                            SlotKind::Video,
                            !input.sampler.vflip,
                            || assets.open_camera(),
                            &mut videos,
                        );
                        [slot; 2]
                    }
                    InputKind::Audio => {
                        let key = AssetKey {
                            source: input.src.clone(),
                            flip: false,
                            srgb: false,
                        };
                        let slot = if let Some(slot) = pool.cached_asset(&key) {
                            slot
                        } else {
                            match assets.open_audio(&input.src) {
                                Ok(source) => {
                                    let slot = pool.alloc_streaming(SlotKind::Audio, false);
                                    pool.remember_asset(key, slot);
                                    audios.push(AudioBinding { source, slot });
                                    slot
                                }
                                Err(err) => {
                                    log::warn!("failed to open audio '{}': {err}", input.src);
                                    let slot = pool.placeholder_image();
                                    pool.remember_asset(key, slot);
                                    slot
                                }
                            }
                        };
                        [slot; 2]
                    }
                    InputKind::Keyboard => [pool.keyboard(); 2],
                };
                samplers[channel] = Some(channel_sampler(&gpu.device, &input.sampler));
            }

            let samplers = samplers.map(|s| {
                s.unwrap_or_else(|| channel_sampler(&gpu.device, &SamplerSpec::default()))
            });

            let channel_types =
                std::array::from_fn(|c| pool.slot(inputs[c][0]).kind.glsl_sampler_type());
            let cubemap_channels = std::array::from_fn(|c| pool.slot(inputs[c][0]).kind.is_cubemap());

            let source = assemble_fragment_source(common, &pass.code, &channel_types);
            let program = build_pass_program(gpu, &pass.name, &source, cubemap_channels);

            nodes.push(RenderPassNode {
                pass_type: pass.pass_type,
                name: pass.name.clone(),
                outputs: outputs[node_index],
                inputs,
                program,
                samplers,
                uniforms: create_uniform_buffer(gpu, &pass.name),
            });
        }

        // The image pass is always last in the order.
        let display_pass = nodes.len().saturating_sub(1);

        Ok(Self {
            nodes,
            videos,
            audios,
            back_buffer: 0,
            front_buffer: 1,
            display_pass,
        })
    }

    /// The output role every pass writes this frame.
    pub fn back_buffer(&self) -> usize {
        self.back_buffer
    }

    /// The output role holding last frame's results.
    pub fn front_buffer(&self) -> usize {
        self.front_buffer
    }

    /// Swaps the global roles. Called exactly once, at the end of a frame.
    pub fn flip_buffers(&mut self) {
        std::mem::swap(&mut self.back_buffer, &mut self.front_buffer);
    }

    /// The slot pass `node` writes this frame.
    pub fn output_slot(&self, node: usize) -> SlotId {
        self.nodes[node].outputs[self.back_buffer]
    }

    /// The slot pass `node` reads on `channel` this frame.
    pub fn input_slot(&self, node: usize, channel: usize) -> SlotId {
        self.nodes[node].inputs[channel][self.front_buffer]
    }

    pub fn display_pass(&self) -> usize {
        self.display_pass
    }

    /// The slot holding the image shown on screen: the display pass's output
    /// written this frame. Read after the pass runs, before the flip.
    pub fn display_slot(&self) -> SlotId {
        self.output_slot(self.display_pass)
    }

    /// Points the display at the `index`-th pass of the given type. Sound
    /// and cubemap passes are not displayable and are ignored.
    pub fn set_display_pass_by_type(&mut self, pass_type: PassType, index: usize) {
        if matches!(pass_type, PassType::Sound | PassType::Cubemap) {
            return;
        }
        let found = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.pass_type == pass_type)
            .nth(index)
            .map(|(i, _)| i);
        if let Some(i) = found {
            if i != self.display_pass {
                self.display_pass = i;
                log::debug!("display pass set to '{}'", self.nodes[i].name);
            }
        }
    }
}

/// Document pass indices in execution order: buffer passes as declared
/// (capped at four), then the cubemap pass, then the image pass.
pub(crate) fn ordered_pass_indices(document: &ShaderDocument) -> Vec<usize> {
    let mut order: Vec<usize> = document
        .passes
        .iter()
        .enumerate()
        .filter(|(_, p)| p.pass_type == PassType::Buffer)
        .map(|(i, _)| i)
        .take(crate::document::MAX_BUFFER_PASSES)
        .collect();
    order.extend(document.find_pass_by_type(PassType::Cubemap, 0));
    order.extend(document.find_pass_by_type(PassType::Image, 0));
    order
}

/// Chooses which half of `src_outputs` a buffer input reads for each global
/// role. A source earlier in the order (`src < dst`) has already written its
/// back half when the destination runs, so the destination reads it; a
/// self-reference or later source is read from last frame's front half.
pub(crate) fn buffer_input_pair(
    src_index: usize,
    dst_index: usize,
    src_outputs: [SlotId; 2],
) -> [SlotId; 2] {
    let read_back = if src_index < dst_index { 1 } else { 0 };
    [src_outputs[read_back], src_outputs[read_back ^ 1]]
}

/// Channel bindings before any input is resolved: every channel reads the
/// image placeholder under both roles.
pub(crate) fn unbound_input_pairs(placeholder: SlotId) -> [[SlotId; 2]; MAX_INPUTS] {
    [[placeholder; 2]; MAX_INPUTS]
}

fn resolve_stream(
    pool: &mut TexturePool,
    key: AssetKey,
    kind: SlotKind,
    flip: bool,
    open: impl FnOnce() -> Result<StreamSource, crate::assets::AssetError>,
    streams: &mut Vec<StreamBinding>,
) -> SlotId {
    if let Some(slot) = pool.cached_asset(&key) {
        return slot;
    }
    match open() {
        Ok(source) => {
            let slot = pool.alloc_streaming(kind, flip);
            pool.remember_asset(key, slot);
            streams.push(StreamBinding { source, slot });
            slot
        }
        Err(err) => {
            log::warn!("failed to open stream '{}': {err}", key.source);
            let slot = pool.placeholder_image();
            pool.remember_asset(key, slot);
            slot
        }
    }
}

fn create_uniform_buffer(gpu: &GpuContext, name: &str) -> wgpu::Buffer {
    gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(name),
        size: std::mem::size_of::<PassUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{OutputSpec, RenderPassSpec, OUTPUT_ID_BUF_A, OUTPUT_ID_IMAGE};

    fn pass(pass_type: PassType, id: i32) -> RenderPassSpec {
        let mut p = RenderPassSpec::new(pass_type, format!("{pass_type:?}{id}"), "");
        p.outputs.push(OutputSpec { id, channel: 0 });
        p
    }

    fn slot_pair() -> [SlotId; 2] {
        [SlotId::from_index(10), SlotId::from_index(11)]
    }

    #[test]
    fn buffers_execute_in_declared_order_before_the_image() {
        for buffer_count in 0..=4 {
            let mut passes = vec![pass(PassType::Image, OUTPUT_ID_IMAGE)];
            for i in 0..buffer_count {
                passes.push(pass(PassType::Buffer, OUTPUT_ID_BUF_A + i as i32));
            }
            let doc = ShaderDocument {
                name: "t".into(),
                passes,
            };
            let order = ordered_pass_indices(&doc);
            assert_eq!(order.len(), buffer_count + 1);
            // Buffers come first, in document order (indices 1..), image last.
            for (pos, &doc_index) in order[..buffer_count].iter().enumerate() {
                assert_eq!(doc_index, pos + 1);
            }
            assert_eq!(*order.last().unwrap(), 0);
        }
    }

    #[test]
    fn cubemap_runs_between_buffers_and_image() {
        let doc = ShaderDocument {
            name: "t".into(),
            passes: vec![
                pass(PassType::Image, OUTPUT_ID_IMAGE),
                pass(PassType::Cubemap, crate::document::OUTPUT_ID_CUBE_A),
                pass(PassType::Buffer, OUTPUT_ID_BUF_A),
            ],
        };
        assert_eq!(ordered_pass_indices(&doc), vec![2, 1, 0]);
    }

    #[test]
    fn earlier_source_is_read_from_its_back_half() {
        let outputs = slot_pair();
        let pair = buffer_input_pair(0, 1, outputs);
        // Initial roles: back = 0, front = 1. Reading at the front role must
        // yield the half the source wrote this frame, outputs[0].
        assert_eq!(pair[1], outputs[0]);
        // After the flip (front = 0) the other half is read.
        assert_eq!(pair[0], outputs[1]);
    }

    #[test]
    fn self_reference_is_read_from_last_frames_half() {
        let outputs = slot_pair();
        let pair = buffer_input_pair(1, 1, outputs);
        // With back = 0 and front = 1, a self-reference must read the half
        // not being written this frame, outputs[1].
        assert_eq!(pair[1], outputs[1]);
        assert_eq!(pair[0], outputs[0]);
    }

    #[test]
    fn later_source_behaves_like_a_self_reference() {
        let outputs = slot_pair();
        let pair = buffer_input_pair(3, 1, outputs);
        assert_eq!(pair[1], outputs[1]);
    }

    #[test]
    fn role_pair_returns_to_start_after_even_flip_counts() {
        for flips in 0..10 {
            let mut graph = ExecutionGraph {
                nodes: Vec::new(),
                videos: Vec::new(),
                audios: Vec::new(),
                back_buffer: 0,
                front_buffer: 1,
                display_pass: 0,
            };
            for _ in 0..flips {
                graph.flip_buffers();
            }
            if flips % 2 == 0 {
                assert_eq!((graph.back_buffer(), graph.front_buffer()), (0, 1));
            } else {
                assert_eq!((graph.back_buffer(), graph.front_buffer()), (1, 0));
            }
        }
    }

    #[test]
    fn unbound_channels_read_the_placeholder_under_both_roles() {
        let placeholder = SlotId::from_index(0);
        let pairs = unbound_input_pairs(placeholder);
        for channel in &pairs {
            assert_eq!(channel[0], placeholder);
            assert_eq!(channel[1], placeholder);
        }
    }
}
