//! # Toyview
//!
//! **A desktop player for ShaderToy-style multi-pass shaders.**
//!
//! Describe a shader as a document of passes (buffers, a cubemap, an image)
//! wired together through four input channels each, and toyview resolves it
//! into an execution graph, allocates ping-pong buffers for feedback, and
//! runs it with the full `iTime` / `iMouse` / `iChannel` uniform set.
//!
//! ## Quick Start
//!
//! ```no_run
//! use toyview::*;
//!
//! fn main() {
//!     let mut pass = RenderPassSpec::new(
//!         PassType::Image,
//!         "image",
//!         r#"
//!         void mainImage(out vec4 fragColor, in vec2 fragCoord) {
//!             vec2 uv = fragCoord / iResolution.xy;
//!             fragColor = vec4(uv, 0.5 + 0.5 * sin(iTime), 1.0);
//!         }
//!         "#,
//!     );
//!     pass.outputs.push(OutputSpec { id: OUTPUT_ID_IMAGE, channel: 0 });
//!
//!     run(ShaderDocument {
//!         name: "gradient".to_string(),
//!         passes: vec![pass],
//!     });
//! }
//! ```
//!
//! Playback, panning, zooming and the keyboard texture are driven by the
//! stock bindings: space pauses, enter restarts, arrows seek, the mouse
//! drags `iMouse` (alt-drag pans, ctrl-drag zooms), and F2 routes the
//! keyboard into the shader.

mod app;
mod assets;
mod blit;
mod clock;
mod display;
mod document;
mod engine;
mod fps;
mod gpu;
mod graph;
mod input;
mod pool;
mod shader;

pub use app::{run, run_with_config, AppConfig};
pub use assets::{
    cubemap_face_sources, AssetError, AssetProvider, AudioBlock, AudioMailbox, AudioSource,
    CubemapData, FileAssets, FrameMailbox, ImageData, Mailbox, StreamFrame, StreamSource,
    AUDIO_SAMPLES,
};
pub use blit::BlitPass;
pub use clock::PlaybackClock;
pub use display::{
    DisplayOptions, RenderSize, DEFAULT_RENDER_HEIGHT, DEFAULT_RENDER_WIDTH,
    DEFAULT_WINDOW_SCALE,
};
pub use document::{
    DocumentError, FilterMode, InputKind, InputSpec, OutputSpec, PassType, RenderPassSpec,
    SamplerSpec, ShaderDocument, WrapMode, MAX_BUFFER_PASSES, MAX_INPUTS, OUTPUT_ID_BUF_A,
    OUTPUT_ID_BUF_B, OUTPUT_ID_BUF_C, OUTPUT_ID_BUF_D, OUTPUT_ID_CUBE_A, OUTPUT_ID_IMAGE,
    OUTPUT_ID_SOUND,
};
pub use engine::{Engine, HUD_ALL, HUD_FPS, HUD_MOUSE_DOWN_POS, HUD_MOUSE_POS};
pub use fps::FpsCounter;
pub use gpu::GpuContext;
pub use graph::{
    AudioBinding, ExecutionGraph, GraphError, RenderPassNode, StreamBinding,
};
pub use input::{
    shadertoy_keycode, Action, InputRouter, KeyBinding, KeyboardState, MouseBinding, MouseMode,
    WheelBinding, WheelDirection, LARGE_STEP_MS, MEDIUM_STEP_MS, SMALL_STEP_MS,
};
pub use pool::{
    AssetKey, SlotId, SlotKind, TexturePool, TextureSlot, KEYBOARD_KEYS, KEYBOARD_ROWS,
    PASS_BUFFER_FORMAT,
};
pub use shader::{assemble_fragment_source, PassProgram, PassUniforms};

// Re-export the math and window types that appear in the public API.
pub use glam::Vec2;
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;
