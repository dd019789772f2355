//! GPU texture ownership: the slot arena, asset dedup, and resizing.
//!
//! Every texture the player touches lives in a [`TexturePool`]: the 1x1
//! placeholders, the keyboard-state texture, each pass's ping-pong output
//! pair, loaded assets, and streaming targets. Slots are addressed by
//! [`SlotId`], a stable arena index: handles stay valid across resizes and
//! storage reallocation, and dedup-cache hits are plain handle equality.
//!
//! Slot storage is deferred in two places: streaming slots have no GPU
//! texture at all until their first frame arrives (the dimensions aren't
//! known before that), and pass-buffer resizes are requested by flag and
//! applied at the top of the next frame so a texture is never destroyed
//! while bound as a render attachment.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::assets::{AssetProvider, AudioBlock, StreamFrame, AUDIO_SAMPLES};
use crate::gpu::GpuContext;

/// Format of pass output buffers. 16-bit float keeps the extended range
/// feedback shaders rely on while staying filterable everywhere.
pub const PASS_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Rows in the keyboard-state texture: key down, pressed this frame, toggled.
pub const KEYBOARD_ROWS: usize = 3;
/// One column per ShaderToy key code.
pub const KEYBOARD_KEYS: usize = 256;

const SPECIAL_SLOTS: usize = 3;

/// Identity-stable handle to a texture slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// What kind of content a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// 1x1 black fallback for failed or absent 2D inputs.
    PlaceholderImage,
    /// 1x1 white fallback for failed or absent cubemap inputs.
    PlaceholderCubemap,
    /// The shared 256x3 keyboard-state texture.
    Keyboard,
    /// A pass's render target; tracks the render resolution.
    PassBuffer,
    StaticImage,
    StaticCubemap,
    Video,
    Audio,
}

impl SlotKind {
    pub fn is_cubemap(self) -> bool {
        matches!(self, SlotKind::PlaceholderCubemap | SlotKind::StaticCubemap)
    }

    /// The GLSL sampler type a channel bound to this slot needs.
    pub fn glsl_sampler_type(self) -> &'static str {
        if self.is_cubemap() {
            "samplerCube"
        } else {
            "sampler2D"
        }
    }
}

/// Dedup identity for a loaded asset. Two inputs with equal keys share one
/// texture slot for the lifetime of the resolved document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub source: String,
    pub flip: bool,
    pub srgb: bool,
}

/// Enforces "at most one slot per distinct [`AssetKey`]". Failed loads are
/// remembered too, so a broken path resolves to the placeholder once instead
/// of retrying per channel.
#[derive(Default)]
pub(crate) struct AssetCache {
    entries: HashMap<AssetKey, SlotId>,
}

impl AssetCache {
    pub(crate) fn lookup(&self, key: &AssetKey) -> Option<SlotId> {
        self.entries.get(key).copied()
    }

    pub(crate) fn remember(&mut self, key: AssetKey, id: SlotId) {
        self.entries.insert(key, id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

struct TextureStorage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// One entry in the arena.
pub struct TextureSlot {
    pub kind: SlotKind,
    /// True only for pass buffers, which track the render resolution.
    pub resizable: bool,
    /// Playback position of the channel's content, in seconds. Zero for
    /// anything that isn't animated.
    pub playback_time: f32,
    /// Streaming slots only: flip rows vertically at upload time.
    flip_on_upload: bool,
    width: u32,
    height: u32,
    storage: Option<TextureStorage>,
}

impl TextureSlot {
    fn without_storage(kind: SlotKind, flip_on_upload: bool) -> Self {
        Self {
            kind,
            resizable: false,
            playback_time: 0.0,
            flip_on_upload,
            width: 0,
            height: 0,
            storage: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    fn view(&self) -> Option<&wgpu::TextureView> {
        self.storage.as_ref().map(|s| &s.view)
    }
}

/// Owns every texture slot for the currently mounted document.
pub struct TexturePool {
    slots: Vec<TextureSlot>,
    cache: AssetCache,
}

impl TexturePool {
    /// Creates the pool and its three shared slots: the image placeholder,
    /// the cubemap placeholder, and the keyboard texture.
    pub fn new(gpu: &GpuContext) -> Self {
        let mut pool = Self {
            slots: Vec::new(),
            cache: AssetCache::default(),
        };
        pool.create_placeholder_image(gpu);
        pool.create_placeholder_cubemap(gpu);
        pool.create_keyboard_texture(gpu);
        pool
    }

    pub fn placeholder_image(&self) -> SlotId {
        SlotId(0)
    }

    pub fn placeholder_cubemap(&self) -> SlotId {
        SlotId(1)
    }

    pub fn keyboard(&self) -> SlotId {
        SlotId(2)
    }

    pub fn slot(&self, id: SlotId) -> &TextureSlot {
        &self.slots[id.0]
    }

    /// Number of distinct asset keys loaded (or remembered as failed).
    pub fn asset_count(&self) -> usize {
        self.cache.len()
    }

    /// The texture view to bind for `id`. Streaming slots that haven't
    /// received a frame yet fall back to the image placeholder.
    pub(crate) fn binding_view(&self, id: SlotId) -> &wgpu::TextureView {
        self.slots[id.0]
            .view()
            .or_else(|| self.slots[self.placeholder_image().0].view())
            .expect("placeholder slots always have storage")
    }

    /// Allocates one ping-pong half of a pass's output at the current render
    /// resolution.
    pub fn create_pass_buffer(&mut self, gpu: &GpuContext, width: u32, height: u32) -> SlotId {
        log::debug!("creating pass buffer at {width}x{height}");
        let storage = create_target_storage(gpu, width, height);
        self.slots.push(TextureSlot {
            kind: SlotKind::PassBuffer,
            resizable: true,
            playback_time: 0.0,
            flip_on_upload: false,
            width,
            height,
            storage: Some(storage),
        });
        SlotId(self.slots.len() - 1)
    }

    /// Resizes a single pass buffer. No-op when the dimensions already
    /// match; otherwise the storage is destroyed and recreated, never
    /// resized in place.
    pub fn resize_pass_buffer(&mut self, gpu: &GpuContext, id: SlotId, width: u32, height: u32) {
        let slot = &mut self.slots[id.0];
        debug_assert!(slot.resizable);
        if slot.width == width && slot.height == height {
            return;
        }
        log::debug!(
            "resizing pass buffer from {}x{} to {width}x{height}",
            slot.width,
            slot.height
        );
        slot.storage = Some(create_target_storage(gpu, width, height));
        slot.width = width;
        slot.height = height;
    }

    /// Resizes every resizable slot to the given render resolution. Called
    /// at the start of a frame, never mid-draw.
    pub fn resize_all_pass_buffers(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        let ids: Vec<SlotId> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.resizable)
            .map(|(i, _)| SlotId(i))
            .collect();
        for id in ids {
            self.resize_pass_buffer(gpu, id, width, height);
        }
    }

    /// Loads a 2D image asset, deduplicating by key. On failure the image
    /// placeholder is substituted and remembered under the same key.
    pub fn load_image(
        &mut self,
        gpu: &GpuContext,
        assets: &dyn AssetProvider,
        key: AssetKey,
    ) -> SlotId {
        if let Some(id) = self.cache.lookup(&key) {
            return id;
        }
        let id = match assets.load_image(&key.source, key.flip) {
            Ok(data) => {
                let storage = upload_image(gpu, &data.pixels, data.width, data.height, key.srgb);
                self.slots.push(TextureSlot {
                    kind: SlotKind::StaticImage,
                    resizable: false,
                    playback_time: 0.0,
                    flip_on_upload: false,
                    width: data.width,
                    height: data.height,
                    storage: Some(storage),
                });
                SlotId(self.slots.len() - 1)
            }
            Err(err) => {
                log::warn!("failed to load texture '{}': {err}", key.source);
                self.placeholder_image()
            }
        };
        self.cache.remember(key, id);
        id
    }

    /// Loads a cubemap asset (six faces), deduplicating by key. On failure
    /// the cubemap placeholder is substituted.
    pub fn load_cubemap(
        &mut self,
        gpu: &GpuContext,
        assets: &dyn AssetProvider,
        key: AssetKey,
    ) -> SlotId {
        if let Some(id) = self.cache.lookup(&key) {
            return id;
        }
        let id = match assets.load_cubemap(&key.source, key.flip) {
            Ok(data) => {
                let mut pixels =
                    Vec::with_capacity(data.faces.iter().map(|f| f.pixels.len()).sum());
                for face in &data.faces {
                    pixels.extend_from_slice(&face.pixels);
                }
                let storage = upload_cubemap(gpu, &pixels, data.width, data.height, key.srgb);
                self.slots.push(TextureSlot {
                    kind: SlotKind::StaticCubemap,
                    resizable: false,
                    playback_time: 0.0,
                    flip_on_upload: false,
                    width: data.width,
                    height: data.height,
                    storage: Some(storage),
                });
                SlotId(self.slots.len() - 1)
            }
            Err(err) => {
                log::warn!("failed to load cubemap '{}': {err}", key.source);
                self.placeholder_cubemap()
            }
        };
        self.cache.remember(key, id);
        id
    }

    /// Remembers an externally chosen slot for a key (used for streaming
    /// slots, whose textures are allocated lazily).
    pub(crate) fn remember_asset(&mut self, key: AssetKey, id: SlotId) {
        self.cache.remember(key, id);
    }

    pub(crate) fn cached_asset(&self, key: &AssetKey) -> Option<SlotId> {
        self.cache.lookup(key)
    }

    /// Allocates a streaming slot with no storage. The texture is created
    /// when the first frame arrives and its dimensions are known.
    pub fn alloc_streaming(&mut self, kind: SlotKind, flip_on_upload: bool) -> SlotId {
        self.slots
            .push(TextureSlot::without_storage(kind, flip_on_upload));
        SlotId(self.slots.len() - 1)
    }

    /// Uploads a newly delivered video/camera frame, reallocating storage if
    /// the frame dimensions changed.
    pub fn update_streaming(&mut self, gpu: &GpuContext, id: SlotId, frame: &StreamFrame) {
        let needs_realloc = {
            let slot = &self.slots[id.0];
            slot.storage.is_none() || slot.width != frame.width || slot.height != frame.height
        };
        if needs_realloc {
            log::debug!(
                "allocating streaming texture at {}x{}",
                frame.width,
                frame.height
            );
            let slot = &mut self.slots[id.0];
            slot.storage = Some(create_streaming_storage(gpu, frame.width, frame.height));
            slot.width = frame.width;
            slot.height = frame.height;
        }

        let slot = &self.slots[id.0];
        let storage = slot.storage.as_ref().expect("allocated above");
        let flipped;
        let pixels: &[u8] = if slot.flip_on_upload {
            flipped = flip_rows(&frame.pixels, frame.width, frame.height);
            &flipped
        } else {
            &frame.pixels
        };
        write_layer(gpu, &storage.texture, pixels, frame.width, frame.height, 4);
        self.slots[id.0].playback_time = frame.time_secs;
    }

    /// Uploads an audio block into a 512x2 R8 texture (row 0 FFT, row 1
    /// waveform), allocating it on first use.
    pub fn update_audio(&mut self, gpu: &GpuContext, id: SlotId, block: &AudioBlock) {
        if self.slots[id.0].storage.is_none() {
            let slot = &mut self.slots[id.0];
            slot.storage = Some(create_r8_storage(
                gpu,
                AUDIO_SAMPLES as u32,
                2,
                "Audio Texture",
            ));
            slot.width = AUDIO_SAMPLES as u32;
            slot.height = 2;
        }
        let mut bytes = [0u8; AUDIO_SAMPLES * 2];
        for (row, samples) in block.rows.iter().enumerate() {
            for (col, &sample) in samples.iter().enumerate() {
                bytes[row * AUDIO_SAMPLES + col] = (sample >> 8) as u8;
            }
        }
        let storage = self.slots[id.0].storage.as_ref().expect("allocated above");
        write_layer(
            gpu,
            &storage.texture,
            &bytes,
            AUDIO_SAMPLES as u32,
            2,
            1,
        );
        self.slots[id.0].playback_time = block.time_secs;
    }

    /// Uploads the current keyboard-state table.
    pub fn write_keyboard(&self, gpu: &GpuContext, rows: &[[u8; KEYBOARD_KEYS]; KEYBOARD_ROWS]) {
        let storage = self.slots[self.keyboard().0]
            .storage
            .as_ref()
            .expect("keyboard slot always has storage");
        let mut bytes = [0u8; KEYBOARD_KEYS * KEYBOARD_ROWS];
        for (row, data) in rows.iter().enumerate() {
            bytes[row * KEYBOARD_KEYS..(row + 1) * KEYBOARD_KEYS].copy_from_slice(data);
        }
        write_layer(
            gpu,
            &storage.texture,
            &bytes,
            KEYBOARD_KEYS as u32,
            KEYBOARD_ROWS as u32,
            1,
        );
    }

    /// Drops every per-document slot (in reverse acquisition order) and
    /// clears the dedup cache. The shared placeholder and keyboard slots
    /// survive.
    pub fn teardown(&mut self) {
        while self.slots.len() > SPECIAL_SLOTS {
            self.slots.pop();
        }
        self.cache.clear();
    }

    fn create_placeholder_image(&mut self, gpu: &GpuContext) {
        let storage = upload_image(gpu, &[0, 0, 0, 255], 1, 1, false);
        self.slots.push(TextureSlot {
            kind: SlotKind::PlaceholderImage,
            resizable: false,
            playback_time: 0.0,
            flip_on_upload: false,
            width: 1,
            height: 1,
            storage: Some(storage),
        });
    }

    fn create_placeholder_cubemap(&mut self, gpu: &GpuContext) {
        let white = [255u8; 4];
        let pixels: Vec<u8> = white.repeat(6);
        let storage = upload_cubemap(gpu, &pixels, 1, 1, false);
        self.slots.push(TextureSlot {
            kind: SlotKind::PlaceholderCubemap,
            resizable: false,
            playback_time: 0.0,
            flip_on_upload: false,
            width: 1,
            height: 1,
            storage: Some(storage),
        });
    }

    fn create_keyboard_texture(&mut self, gpu: &GpuContext) {
        let storage = create_r8_storage(
            gpu,
            KEYBOARD_KEYS as u32,
            KEYBOARD_ROWS as u32,
            "Keyboard Texture",
        );
        self.slots.push(TextureSlot {
            kind: SlotKind::Keyboard,
            resizable: false,
            playback_time: 0.0,
            flip_on_upload: false,
            width: KEYBOARD_KEYS as u32,
            height: KEYBOARD_ROWS as u32,
            storage: Some(storage),
        });
    }
}

fn create_target_storage(gpu: &GpuContext, width: u32, height: u32) -> TextureStorage {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Pass Buffer"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: PASS_BUFFER_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureStorage { texture, view }
}

fn create_streaming_storage(gpu: &GpuContext, width: u32, height: u32) -> TextureStorage {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Streaming Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureStorage { texture, view }
}

fn create_r8_storage(gpu: &GpuContext, width: u32, height: u32, label: &str) -> TextureStorage {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureStorage { texture, view }
}

fn upload_image(
    gpu: &GpuContext,
    pixels: &[u8],
    width: u32,
    height: u32,
    srgb: bool,
) -> TextureStorage {
    let format = if srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };
    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some("Image Asset"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        pixels,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureStorage { texture, view }
}

fn upload_cubemap(
    gpu: &GpuContext,
    pixels: &[u8],
    width: u32,
    height: u32,
    srgb: bool,
) -> TextureStorage {
    let format = if srgb {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };
    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some("Cubemap Asset"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        pixels,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    });
    TextureStorage { texture, view }
}

fn write_layer(
    gpu: &GpuContext,
    texture: &wgpu::Texture,
    pixels: &[u8],
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
) {
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * bytes_per_pixel),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

fn flip_rows(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let row_bytes = (width * 4) as usize;
    let mut flipped = Vec::with_capacity(pixels.len());
    for row in (0..height as usize).rev() {
        flipped.extend_from_slice(&pixels[row * row_bytes..(row + 1) * row_bytes]);
    }
    flipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_cache_dedups_identical_keys() {
        let mut cache = AssetCache::default();
        let key = AssetKey {
            source: "tex/wood.png".into(),
            flip: true,
            srgb: true,
        };
        cache.remember(key.clone(), SlotId(7));
        assert_eq!(cache.lookup(&key), Some(SlotId(7)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn differing_flip_yields_distinct_cache_entries() {
        let mut cache = AssetCache::default();
        let flipped = AssetKey {
            source: "tex/wood.png".into(),
            flip: true,
            srgb: false,
        };
        let unflipped = AssetKey {
            flip: false,
            ..flipped.clone()
        };
        cache.remember(flipped.clone(), SlotId(3));
        assert_eq!(cache.lookup(&unflipped), None);
        cache.remember(unflipped.clone(), SlotId(4));
        assert_eq!(cache.lookup(&flipped), Some(SlotId(3)));
        assert_eq!(cache.lookup(&unflipped), Some(SlotId(4)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn sampler_types_match_slot_kinds() {
        assert_eq!(SlotKind::PassBuffer.glsl_sampler_type(), "sampler2D");
        assert_eq!(SlotKind::StaticCubemap.glsl_sampler_type(), "samplerCube");
        assert_eq!(
            SlotKind::PlaceholderCubemap.glsl_sampler_type(),
            "samplerCube"
        );
        assert_eq!(SlotKind::Keyboard.glsl_sampler_type(), "sampler2D");
    }

    #[test]
    fn flip_rows_reverses_row_order() {
        // 1x3 image, 4 bytes per row.
        let pixels = [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];
        let flipped = flip_rows(&pixels, 1, 3);
        assert_eq!(flipped, vec![3, 3, 3, 3, 2, 2, 2, 2, 1, 1, 1, 1]);
    }
}
