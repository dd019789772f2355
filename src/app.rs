//! Window lifecycle and the event loop.
//!
//! [`run`] opens a window, brings up the GPU, mounts a document into an
//! [`Engine`] and forwards winit events to it. The app starts in a pending
//! state because winit only hands out windows after `resumed`; everything
//! GPU-shaped is created there.

use std::sync::Arc;

use glam::Vec2;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{ModifiersState, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::assets::{AssetProvider, FileAssets};
use crate::document::ShaderDocument;
use crate::engine::Engine;
use crate::input::WheelDirection;

/// Configuration for the app window.
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Directory relative asset paths resolve against.
    pub asset_root: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Toyview".to_string(),
            width: 1280,
            height: 720,
            asset_root: ".".to_string(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn asset_root(mut self, root: impl Into<String>) -> Self {
        self.asset_root = root.into();
        self
    }
}

enum ToyApp {
    Pending {
        config: AppConfig,
        document: Option<ShaderDocument>,
    },
    Running {
        window: Arc<Window>,
        engine: Engine,
        modifiers: ModifiersState,
    },
}

impl ApplicationHandler for ToyApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let ToyApp::Pending { config, document } = self {
            let window_attrs = WindowAttributes::default()
                .with_title(&config.title)
                .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));

            let window = Arc::new(event_loop.create_window(window_attrs).unwrap());
            let gpu = crate::gpu::GpuContext::new(window.clone());

            let assets: Box<dyn AssetProvider> =
                Box::new(FileAssets::new(config.asset_root.clone()));
            let document = document.take().expect("document consumed on first resume");
            let engine = Engine::new(gpu, assets, document);

            window.request_redraw();
            *self = ToyApp::Running {
                window,
                engine,
                modifiers: ModifiersState::empty(),
            };
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let ToyApp::Running {
            window,
            engine,
            modifiers,
        } = self
        else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                engine.window_resized(size.width, size.height);
            }
            WindowEvent::ModifiersChanged(mods) => {
                *modifiers = mods.state();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed if !event.repeat => {
                            engine.on_key_pressed(key, *modifiers);
                        }
                        ElementState::Released => {
                            engine.on_key_released(key, *modifiers);
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                engine.on_mouse_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => engine.on_mouse_pressed(button, *modifiers),
                ElementState::Released => engine.on_mouse_released(),
            },
            WindowEvent::MouseWheel { delta, .. } => {
                let ticks = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                if ticks > 0.0 {
                    engine.on_wheel(WheelDirection::Up, *modifiers);
                } else if ticks < 0.0 {
                    engine.on_wheel(WheelDirection::Down, *modifiers);
                }
            }
            WindowEvent::RedrawRequested => {
                engine.render_frame();
                if engine.quit_requested() {
                    event_loop.exit();
                    return;
                }
                window.request_redraw();
            }
            _ => {}
        }
    }
}

/// Runs `document` in a window with the default configuration. Blocks until
/// the window closes.
pub fn run(document: ShaderDocument) {
    run_with_config(AppConfig::default(), document);
}

/// Runs `document` in a window. Blocks until the window closes.
pub fn run_with_config(config: AppConfig, document: ShaderDocument) {
    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ToyApp::Pending {
        config,
        document: Some(document),
    };
    event_loop.run_app(&mut app).unwrap();
}
