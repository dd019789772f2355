//! Asset loading and streaming-source plumbing.
//!
//! The engine never touches the filesystem or a codec directly. Everything
//! loadable comes through the [`AssetProvider`] trait: static images and
//! cubemaps are decoded synchronously, while video, webcam and audio sources
//! hand back a mailbox that some producer (a decoder thread, a capture
//! callback) fills at its own pace. [`FileAssets`] is the stock provider for
//! on-disk images and cubemaps; it reports streaming sources as unsupported,
//! which makes the resolver fall back to placeholder textures.
//!
//! The mailboxes are deliberately tiny: a mutex around `Option<T>` where only
//! the latest value matters. The producer overwrites, the frame loop drains
//! once per frame. Nothing else is shared across threads.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Number of samples per row in the audio waveform texture.
pub const AUDIO_SAMPLES: usize = 512;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to decode image '{source_path}': {source}")]
    Decode {
        source_path: String,
        source: image::ImageError,
    },
    #[error("cubemap '{0}' is missing face {1}")]
    MissingCubemapFace(String, usize),
    #[error("{0} sources are not supported by this asset provider")]
    Unsupported(&'static str),
}

/// Decoded RGBA8 pixels for one image or cubemap face.
#[derive(Debug)]
pub struct ImageData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Six decoded cubemap faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug)]
pub struct CubemapData {
    pub faces: [ImageData; 6],
    pub width: u32,
    pub height: u32,
}

/// One RGBA8 frame delivered by a video or camera producer.
#[derive(Debug)]
pub struct StreamFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Playback position of this frame, in seconds.
    pub time_secs: f32,
}

/// One audio buffer rendered into the ShaderToy 512x2 texture layout:
/// row 0 is the FFT, row 1 the waveform, both as unsigned 16-bit samples.
#[derive(Debug)]
pub struct AudioBlock {
    pub rows: [[u16; AUDIO_SAMPLES]; 2],
    pub sample_rate: f32,
    pub time_secs: f32,
}

/// A single-slot, latest-wins mailbox between a producer thread and the
/// frame loop.
///
/// `publish` replaces whatever is queued; `take` drains it. Dropped frames
/// are fine here; the renderer only ever wants the newest one.
pub struct Mailbox<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Queues a value, replacing any unconsumed one.
    pub fn publish(&self, value: T) {
        *self.slot.lock().unwrap() = Some(value);
    }

    /// Takes the queued value, if any. Called once per frame.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type FrameMailbox = Mailbox<StreamFrame>;
pub type AudioMailbox = Mailbox<AudioBlock>;

/// A running video or camera source. The producer half keeps a clone of the
/// mailbox and publishes frames into it.
pub struct StreamSource {
    pub mailbox: FrameMailbox,
}

/// A running audio source.
pub struct AudioSource {
    pub mailbox: AudioMailbox,
}

/// Where the engine gets its channel assets from.
///
/// Implementations decode images synchronously and spawn whatever machinery
/// a streaming source needs, returning its consumer-side mailbox. A failed
/// load is an error, not a panic; the resolver substitutes placeholders.
pub trait AssetProvider {
    fn load_image(&self, source: &str, flip: bool) -> Result<ImageData, AssetError>;

    fn load_cubemap(&self, source: &str, flip: bool) -> Result<CubemapData, AssetError>;

    fn open_video(&self, source: &str) -> Result<StreamSource, AssetError>;

    fn open_camera(&self) -> Result<StreamSource, AssetError>;

    fn open_audio(&self, source: &str) -> Result<AudioSource, AssetError>;
}

/// Loads images and cubemaps from disk, resolving relative paths against a
/// root directory. Video, webcam and audio need codec machinery this crate
/// doesn't ship, so they come back as [`AssetError::Unsupported`].
pub struct FileAssets {
    root: PathBuf,
}

impl FileAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn decode(&self, path: &Path, flip: bool) -> Result<ImageData, AssetError> {
        let mut img = image::open(path)
            .map_err(|source| AssetError::Decode {
                source_path: path.display().to_string(),
                source,
            })?
            .to_rgba8();
        if flip {
            image::imageops::flip_vertical_in_place(&mut img);
        }
        let (width, height) = img.dimensions();
        Ok(ImageData {
            pixels: img.into_raw(),
            width,
            height,
        })
    }
}

impl AssetProvider for FileAssets {
    fn load_image(&self, source: &str, flip: bool) -> Result<ImageData, AssetError> {
        self.decode(&self.resolve(source), flip)
    }

    fn load_cubemap(&self, source: &str, flip: bool) -> Result<CubemapData, AssetError> {
        let paths = cubemap_face_sources(source);
        let mut faces = Vec::with_capacity(6);
        for (i, face_path) in paths.iter().enumerate() {
            let face = self
                .decode(&self.resolve(face_path), flip)
                .map_err(|err| {
                    log::debug!("{err}");
                    AssetError::MissingCubemapFace(source.to_string(), i)
                })?;
            faces.push(face);
        }
        let width = faces[0].width;
        let height = faces[0].height;
        let faces: [ImageData; 6] = faces
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly six faces were pushed"));
        Ok(CubemapData {
            faces,
            width,
            height,
        })
    }

    fn open_video(&self, _source: &str) -> Result<StreamSource, AssetError> {
        Err(AssetError::Unsupported("video"))
    }

    fn open_camera(&self) -> Result<StreamSource, AssetError> {
        Err(AssetError::Unsupported("webcam"))
    }

    fn open_audio(&self, _source: &str) -> Result<AudioSource, AssetError> {
        Err(AssetError::Unsupported("audio"))
    }
}

/// The six file names a cubemap source expands to: `name.ext` for +X, then
/// `name_1.ext` through `name_5.ext` for the remaining faces.
pub fn cubemap_face_sources(source: &str) -> [String; 6] {
    let (stem, ext) = match source.rfind('.') {
        Some(dot) => (&source[..dot], &source[dot..]),
        None => (source, ""),
    };
    [
        format!("{stem}{ext}"),
        format!("{stem}_1{ext}"),
        format!("{stem}_2{ext}"),
        format!("{stem}_3{ext}"),
        format!("{stem}_4{ext}"),
        format!("{stem}_5{ext}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn mailbox_keeps_only_the_latest_value() {
        let mailbox = Mailbox::new();
        mailbox.publish(1);
        mailbox.publish(2);
        mailbox.publish(3);
        assert_eq!(mailbox.take(), Some(3));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn mailbox_crosses_threads() {
        let mailbox: Mailbox<u32> = Mailbox::new();
        let producer = mailbox.clone();
        let handle = thread::spawn(move || {
            for i in 0..100 {
                producer.publish(i);
            }
        });
        handle.join().unwrap();
        assert_eq!(mailbox.take(), Some(99));
    }

    #[test]
    fn cubemap_faces_follow_the_naming_scheme() {
        let faces = cubemap_face_sources("textures/sky.png");
        assert_eq!(faces[0], "textures/sky.png");
        assert_eq!(faces[1], "textures/sky_1.png");
        assert_eq!(faces[5], "textures/sky_5.png");
    }

    #[test]
    fn cubemap_faces_without_extension() {
        let faces = cubemap_face_sources("sky");
        assert_eq!(faces[0], "sky");
        assert_eq!(faces[3], "sky_3");
    }

    #[test]
    fn missing_image_reports_decode_error() {
        let assets = FileAssets::new("/nonexistent");
        let err = assets.load_image("nope.png", false).unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
    }
}
