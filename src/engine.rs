//! The frame executor: owns the GPU context, the pool, the mounted graph,
//! playback state and everything `iTime`-shaped.
//!
//! [`Engine::render_frame`] runs a fixed sequence every frame: document
//! swap / forced reload, deferred pass-buffer resize, frame-state recompute
//! (clock, date, streaming and keyboard texture refresh), a one-shot clear
//! of every pass output on frame zero and after a resize, one fullscreen
//! draw per graph node, the presentation blit, and finally the single
//! global ping-pong flip and the keyboard pressed-row clear.
//!
//! Nothing in the frame path panics on GPU trouble: lost surfaces skip the
//! frame, shader and asset failures were already downgraded at resolve
//! time, and uncaptured device errors only log.

use std::time::{SystemTime, UNIX_EPOCH};

use glam::Vec2;
use winit::event::MouseButton;
use winit::keyboard::{KeyCode, ModifiersState};

use crate::assets::AssetProvider;
use crate::blit::BlitPass;
use crate::clock::PlaybackClock;
use crate::display::{DisplayOptions, RenderSize};
use crate::document::{PassType, ShaderDocument, MAX_INPUTS};
use crate::fps::FpsCounter;
use crate::gpu::GpuContext;
use crate::graph::ExecutionGraph;
use crate::input::{Action, InputRouter, MouseMode, WheelDirection};
use crate::pool::TexturePool;
use crate::shader::{channel_sampler_binding, channel_texture_binding, PassUniforms, UNIFORM_BINDING};

// HUD element flags. Drawing is a collaborator concern; the engine only
// tracks which elements are enabled.
pub const HUD_FPS: u32 = 1 << 0;
pub const HUD_MOUSE_POS: u32 = 1 << 1;
pub const HUD_MOUSE_DOWN_POS: u32 = 1 << 2;
pub const HUD_ALL: u32 = HUD_FPS | HUD_MOUSE_POS | HUD_MOUSE_DOWN_POS;

// Unwritten pass output shows up as solid green rather than stale memory.
const PASS_CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.0,
    g: 1.0,
    b: 0.0,
    a: 1.0,
};

pub struct Engine {
    gpu: GpuContext,
    pool: TexturePool,
    graph: Option<ExecutionGraph>,
    assets: Box<dyn AssetProvider>,

    current_doc: Option<ShaderDocument>,
    pending_doc: Option<ShaderDocument>,
    force_reload: bool,

    playback: PlaybackClock,
    runtime: PlaybackClock,
    fps: FpsCounter,
    frame: i32,
    time: f32,
    time_delta: f32,
    prev_time: f32,
    sample_rate: f32,
    /// Sign-encoded like ShaderToy: zw hold the press position, negated
    /// while the button is up.
    mouse: [f32; 4],

    resized: bool,
    clear_buffers: bool,

    input: InputRouter,
    display: DisplayOptions,
    blit: BlitPass,

    quit_requested: bool,
    show_hud: bool,
    hud_flags: u32,
    show_inputs: bool,
    show_outputs: bool,

    mouse_pos: Vec2,
    mouse_down_pos: Vec2,
    initial_pan: Vec2,
    initial_scale: f32,
}

impl Engine {
    /// Creates the engine and queues `document` for mounting on the first
    /// frame.
    pub fn new(gpu: GpuContext, assets: Box<dyn AssetProvider>, document: ShaderDocument) -> Self {
        let pool = TexturePool::new(&gpu);
        let blit = BlitPass::new(&gpu);
        let display = DisplayOptions::new(gpu.width(), gpu.height());
        let runtime = PlaybackClock::started();
        let fps = FpsCounter::new(runtime.elapsed_ms());

        Self {
            gpu,
            pool,
            graph: None,
            assets,
            current_doc: None,
            pending_doc: Some(document),
            force_reload: false,
            playback: PlaybackClock::new(),
            runtime,
            fps,
            frame: 0,
            time: 0.0,
            time_delta: 0.0,
            prev_time: 0.0,
            sample_rate: 44100.0,
            mouse: [0.0, 0.0, -1.0, -1.0],
            resized: false,
            clear_buffers: false,
            input: InputRouter::new(),
            display,
            blit,
            quit_requested: false,
            show_hud: false,
            hud_flags: HUD_ALL,
            show_inputs: false,
            show_outputs: false,
            mouse_pos: Vec2::ZERO,
            mouse_down_pos: Vec2::ZERO,
            initial_pan: Vec2::ZERO,
            initial_scale: 1.0,
        }
    }

    // -- document control ---------------------------------------------------

    /// Queues a document to replace the current one at the start of the
    /// next frame.
    pub fn set_document(&mut self, document: ShaderDocument) {
        self.pending_doc = Some(document);
    }

    /// Queues a teardown-and-rebuild of the current document.
    pub fn force_reload(&mut self) {
        self.force_reload = true;
    }

    pub fn document(&self) -> Option<&ShaderDocument> {
        self.current_doc.as_ref()
    }

    /// Shows the `index`-th pass of `pass_type` instead of the image pass.
    pub fn set_display_pass_by_type(&mut self, pass_type: PassType, index: usize) {
        if let Some(graph) = self.graph.as_mut() {
            graph.set_display_pass_by_type(pass_type, index);
        }
    }

    // -- playback -----------------------------------------------------------

    /// Restarts playback from time zero and frame zero.
    pub fn start_playback(&mut self) {
        self.time = 0.0;
        self.prev_time = 0.0;
        self.frame = 0;
        self.playback.start();
    }

    pub fn stop_playback(&mut self) {
        self.playback.stop();
    }

    /// Resumes without a time jump, preserving the time delta from before
    /// the pause so the first resumed frame doesn't see a huge `iTimeDelta`.
    pub fn resume_playback(&mut self) {
        let prev_delta = self.time - self.prev_time;
        self.playback.resume();
        self.prev_time = self.playback.elapsed_secs() as f32 - prev_delta;
    }

    pub fn toggle_playback(&mut self) {
        if self.playback.running() {
            self.stop_playback();
        } else {
            self.resume_playback();
        }
    }

    pub fn adjust_playback_time_ms(&mut self, ms: f64) {
        self.playback.adjust_time_ms(ms);
    }

    pub fn playing(&self) -> bool {
        self.playback.running()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn frames_per_sec(&self) -> f64 {
        self.fps.frames_per_sec()
    }

    pub fn hud_visible(&self) -> bool {
        self.show_hud
    }

    pub fn hud_flags(&self) -> u32 {
        self.hud_flags
    }

    pub fn mouse_state(&self) -> [f32; 4] {
        self.mouse
    }

    pub fn inputs_visible(&self) -> bool {
        self.show_inputs
    }

    pub fn outputs_visible(&self) -> bool {
        self.show_outputs
    }

    // -- display ------------------------------------------------------------

    pub fn display(&self) -> &DisplayOptions {
        &self.display
    }

    pub fn set_fixed_render_resolution(&mut self, width: u32, height: u32) {
        self.display.set_fixed_render_resolution(width, height);
        self.resized = true;
    }

    pub fn set_relative_render_resolution(&mut self, window_scale: f32) {
        self.display.set_relative_render_resolution(window_scale);
        self.resized = true;
    }

    pub fn set_display_options(&mut self, fit_width: bool, fit_height: bool, scale: f32) {
        self.display.set_display_options(fit_width, fit_height, scale);
    }

    /// Handles a window resize. Pass buffers are only reallocated at the
    /// next frame start, and only when the render size tracks the window.
    pub fn window_resized(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.display.window_resized(width, height);
        if matches!(self.display.render_size(), RenderSize::WindowRelative(_)) {
            self.resized = true;
        }
    }

    // -- input --------------------------------------------------------------

    pub fn on_key_pressed(&mut self, key: KeyCode, mods: ModifiersState) {
        if let Some(action) = self.input.key_pressed(key, mods) {
            self.do_action(action);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode, mods: ModifiersState) {
        if let Some(action) = self.input.key_released(key, mods) {
            self.do_action(action);
        }
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton, mods: ModifiersState) {
        self.mouse_down_pos = self.mouse_pos;
        match self.input.mouse_pressed(button, mods) {
            Some(MouseMode::SendToShader) => self.update_shader_mouse(self.mouse_pos, true),
            Some(MouseMode::PanImage) => {
                self.initial_pan = self.display.pan();
            }
            Some(MouseMode::ZoomImage) => {
                self.initial_pan = self.display.pan();
                self.initial_scale = self.display.display_scale();
            }
            None => {}
        }
    }

    pub fn on_mouse_moved(&mut self, pos: Vec2) {
        self.mouse_pos = pos;
        match self.input.mouse_mode() {
            Some(MouseMode::SendToShader) => self.update_shader_mouse(pos, false),
            Some(MouseMode::PanImage) => {
                self.display
                    .set_pan(self.initial_pan + pos - self.mouse_down_pos);
            }
            Some(MouseMode::ZoomImage) => {
                let scale = (self.initial_scale + (pos.x - self.mouse_down_pos.x) / 200.0)
                    .max(self.display.min_scale());
                let relative = scale / self.initial_scale;
                self.display
                    .set_pan((self.initial_pan - self.mouse_down_pos) * relative
                        + self.mouse_down_pos);
                self.display.set_scale(scale);
            }
            None => {}
        }
    }

    pub fn on_mouse_released(&mut self) {
        if self.input.mouse_released() == Some(MouseMode::SendToShader) {
            // Negative zw signals "button up" to the shader.
            self.mouse[2] = -self.mouse[2];
            self.mouse[3] = -self.mouse[3];
        }
    }

    pub fn on_wheel(&mut self, direction: WheelDirection, mods: ModifiersState) {
        if let Some(action) = self.input.wheel(direction, mods) {
            self.do_action(action);
        }
    }

    pub fn do_action(&mut self, action: Action) {
        if let Some(ms) = action.seek_ms() {
            self.adjust_playback_time_ms(ms);
            return;
        }
        match action {
            Action::Quit => self.quit_requested = true,
            Action::ToggleHud => self.show_hud = !self.show_hud,
            Action::ToggleInputs => self.show_inputs = !self.show_inputs,
            Action::ToggleOutputs => self.show_outputs = !self.show_outputs,
            Action::TogglePlayback => self.toggle_playback(),
            Action::RestartPlayback => self.start_playback(),
            Action::ToggleKeyboardInput => {
                let enabled = !self.input.keyboard_shader_input();
                self.input.set_keyboard_shader_input(enabled);
            }
            Action::CenterImage => self.display.recenter(),
            Action::ZoomInCoarse => self.zoom_by(1.5),
            Action::ZoomInFine => self.zoom_by(1.05),
            Action::ZoomOutCoarse => self.zoom_by(0.5),
            Action::ZoomOutFine => self.zoom_by(0.95),
            _ => {}
        }
    }

    fn zoom_by(&mut self, factor: f32) {
        let scale = self.display.display_scale() * factor;
        self.display.zoom(self.mouse_pos, scale);
    }

    fn update_shader_mouse(&mut self, pos: Vec2, set_down: bool) {
        let render = self.display.window_to_render(pos);
        self.mouse[0] = render.x;
        self.mouse[1] = render.y;
        if set_down {
            self.mouse[2] = render.x;
            self.mouse[3] = render.y;
        }
    }

    // -- frame --------------------------------------------------------------

    /// Renders one frame. Never panics on GPU or document trouble; failed
    /// steps are logged and the frame degrades or is skipped.
    pub fn render_frame(&mut self) {
        self.fps.new_frame(self.runtime.elapsed_ms());

        self.update_render_data();

        if self.graph.is_some() {
            self.render_graph();
            self.frame += 1;
            self.prev_time = self.time;
        }

        // Pressed flags last exactly one frame.
        self.input.keyboard_mut().clear_pressed();
    }

    /// Applies pending document swaps, forced reloads and deferred resizes.
    fn update_render_data(&mut self) {
        if let Some(doc) = self.pending_doc.take() {
            self.mount_document(doc);
        } else if self.force_reload {
            self.force_reload = false;
            if let Some(doc) = self.current_doc.clone() {
                self.mount_document(doc);
            }
        } else if self.resized {
            let width = self.display.render_width();
            let height = self.display.render_height();
            self.pool.resize_all_pass_buffers(&self.gpu, width, height);
            self.resized = false;
            self.clear_buffers = true;
        }
    }

    /// Tears down the current graph and resolves `doc` in its place. An
    /// invalid document is rejected up front, leaving the current one
    /// mounted and untouched.
    fn mount_document(&mut self, doc: ShaderDocument) {
        if let Err(err) = doc.validate() {
            log::error!("rejecting document '{}': {err}", doc.name);
            return;
        }

        self.stop_playback();
        self.graph = None;
        self.pool.teardown();

        match ExecutionGraph::resolve(
            &self.gpu,
            &mut self.pool,
            self.assets.as_ref(),
            &doc,
            self.display.render_width(),
            self.display.render_height(),
        ) {
            Ok(graph) => {
                log::info!("mounted document '{}' ({} passes)", doc.name, graph.nodes.len());
                self.graph = Some(graph);
                self.current_doc = Some(doc);
                self.display.recenter();
                self.start_playback();
            }
            Err(err) => {
                log::error!("failed to resolve document '{}': {err}", doc.name);
                self.current_doc = None;
            }
        }
    }

    fn render_graph(&mut self) {
        if self.frame == 0 {
            self.clear_buffers = true;
        }

        self.time = self.playback.elapsed_secs() as f32;
        self.time_delta = self.time - self.prev_time;

        self.pool
            .write_keyboard(&self.gpu, self.input.keyboard().rows());

        // Drain the streaming mailboxes. Only the newest frame matters.
        if let Some(graph) = self.graph.as_ref() {
            for binding in &graph.videos {
                if let Some(frame) = binding.source.mailbox.take() {
                    self.pool.update_streaming(&self.gpu, binding.slot, &frame);
                }
            }
            for binding in &graph.audios {
                if let Some(block) = binding.source.mailbox.take() {
                    self.sample_rate = block.sample_rate;
                    self.pool.update_audio(&self.gpu, binding.slot, &block);
                }
            }
        }

        let surface_texture = match self.gpu.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost, reconfiguring");
                self.gpu.resize(self.gpu.width(), self.gpu.height());
                return;
            }
            Err(err) => {
                log::error!("failed to acquire surface texture: {err}");
                return;
            }
        };
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let graph = self.graph.as_ref().expect("graph checked by caller");
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // First frame and post-resize: clear both halves of every output so
        // feedback reads never see stale or uninitialised texels.
        if self.clear_buffers {
            for node in &graph.nodes {
                for &output in &node.outputs {
                    clear_target(&mut encoder, self.pool.binding_view(output));
                }
            }
            self.clear_buffers = false;
        }

        for (node_index, node) in graph.nodes.iter().enumerate() {
            let uniforms = self.pass_uniforms(graph, node_index);
            self.gpu
                .queue
                .write_buffer(&node.uniforms, 0, bytemuck::cast_slice(&[uniforms]));

            let mut entries = Vec::with_capacity(1 + MAX_INPUTS * 2);
            entries.push(wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: node.uniforms.as_entire_binding(),
            });
            for channel in 0..MAX_INPUTS {
                let slot = graph.input_slot(node_index, channel);
                entries.push(wgpu::BindGroupEntry {
                    binding: channel_texture_binding(channel),
                    resource: wgpu::BindingResource::TextureView(self.pool.binding_view(slot)),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: channel_sampler_binding(channel),
                    resource: wgpu::BindingResource::Sampler(&node.samplers[channel]),
                });
            }
            let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&node.name),
                layout: &node.program.bind_group_layout,
                entries: &entries,
            });

            let output_view = self.pool.binding_view(graph.output_slot(node_index));
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&node.name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(PASS_CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&node.program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        // Present: clear the window to black and draw the display pass's
        // fresh output into the display rect.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Display Blit"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let (origin, size) = self.display.display_rect();
            self.blit.render(
                &self.gpu,
                &mut pass,
                origin,
                size,
                self.pool.binding_view(graph.display_slot()),
            );
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();

        // One flip per frame, after every pass has run.
        self.graph
            .as_mut()
            .expect("graph checked by caller")
            .flip_buffers();
    }

    fn pass_uniforms(&self, graph: &ExecutionGraph, node_index: usize) -> PassUniforms {
        let mut uniforms = PassUniforms::zeroed();
        uniforms.resolution = [
            self.display.render_width() as f32,
            self.display.render_height() as f32,
            0.0,
        ];
        uniforms.time = self.time;
        uniforms.time_delta = self.time_delta;
        uniforms.frame = self.frame;
        uniforms.sample_rate = self.sample_rate;
        uniforms.mouse = self.mouse;
        uniforms.date = current_date();
        for channel in 0..MAX_INPUTS {
            let slot = self.pool.slot(graph.input_slot(node_index, channel));
            let (width, height) = if slot.has_storage() {
                (slot.width(), slot.height())
            } else {
                (1, 1)
            };
            uniforms.channel_resolution[channel] = [width as f32, height as f32, 1.0, 0.0];
            uniforms.channel_time[channel] = [slot.playback_time, 0.0, 0.0, 0.0];
        }
        uniforms
    }
}

fn clear_target(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Buffer Clear"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(PASS_CLEAR_COLOR),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

/// `iDate`: (year, month 0-based, day, seconds since midnight), UTC.
fn current_date() -> [f32; 4] {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let day_secs = (secs % 86_400) as f32;
    let (year, month, day) = civil_from_days(days);
    [year as f32, (month - 1) as f32, day as f32, day_secs]
}

/// Gregorian date from days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_dates_round_trip_known_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_017), (2000, 3, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
        assert_eq!(civil_from_days(-1), (1969, 12, 31));
    }

    #[test]
    fn hud_flags_cover_all_elements() {
        assert_eq!(HUD_ALL, HUD_FPS | HUD_MOUSE_POS | HUD_MOUSE_DOWN_POS);
        assert_eq!(HUD_FPS & HUD_MOUSE_POS, 0);
    }
}
