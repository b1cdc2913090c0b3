//! Window management using GLFW

use ash::vk;
use glfw::{Action, WindowEvent};

use super::{SurfaceWindow, WindowError, WindowResult};
use crate::config::WindowConfig;
use crate::events::{Event, EventArg, EventBus, EventKind};

/// GLFW window wrapper with proper resource management
pub struct GlfwWindow {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, WindowEvent)>,
    resized: bool,
}

impl GlfwWindow {
    /// Create a window without an OpenGL context
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| WindowError::InitializationFailed(format!("{e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Created window '{}' ({}x{})", config.title, config.width, config.height);

        Ok(Self {
            glfw,
            window,
            events,
            resized: false,
        })
    }

    /// Translate one GLFW event, updating window state on the way
    fn translate(&mut self, event: WindowEvent) -> Option<Event> {
        match event {
            WindowEvent::Close => {
                self.window.set_should_close(true);
                Some(Event::new(EventKind::QUIT))
            }
            WindowEvent::FramebufferSize(width, height) => {
                self.resized = true;
                let size = EventArg::Size(width.max(0) as u32, height.max(0) as u32);
                Some(Event::new(EventKind::WINDOW_RESIZED).with_arg("size", size))
            }
            WindowEvent::Key(key, _, Action::Release, _) => {
                Some(Event::new(EventKind::KEY_RELEASED).with_arg("key", EventArg::Key(format!("{key:?}"))))
            }
            _ => None,
        }
    }
}

impl SurfaceWindow for GlfwWindow {
    fn is_open(&self) -> bool {
        !self.window.should_close()
    }

    fn poll_events(&mut self, bus: &mut EventBus) {
        self.glfw.poll_events();
        let pending: Vec<_> = glfw::flush_messages(&self.events).map(|(_, event)| event).collect();
        for event in pending {
            if let Some(event) = self.translate(event) {
                bus.dispatch(&event);
            }
        }
    }

    fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    fn close(&mut self) {
        self.window.set_should_close(true);
    }

    fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::VulkanUnsupported)
    }

    fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreation(result))
        }
    }
}
