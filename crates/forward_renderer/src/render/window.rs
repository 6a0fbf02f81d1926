//! Window management using GLFW
//!
//! Owns the native window and its event stream; the renderer only borrows
//! the surface handle created from it.

use thiserror::Error;

/// Window management errors.
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW itself failed to initialize.
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created.
    #[error("window creation failed")]
    CreationFailed,

    /// Some other GLFW-level failure.
    #[error("GLFW error: {0}")]
    Glfw(String),
}

/// Result alias for window operations.
pub type WindowResult<T> = Result<T, WindowError>;

/// Events the frame loop cares about, drained once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    /// The user asked to close the window.
    CloseRequested,
    /// The framebuffer changed size; the swapchain is stale.
    Resized(u32, u32),
    /// A key changed state; forwarded to the caller, not acted on here.
    Key(glfw::Key, glfw::Action),
}

/// GLFW window wrapper configured for Vulkan.
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a resizable window with no client API (Vulkan renders into it).
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|_| WindowError::InitializationFailed)?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        Ok(Self {
            glfw,
            window,
            events,
        })
    }

    /// Whether a close was requested.
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Pump the event queue and drain it into frame-loop events.
    pub fn poll_events(&mut self) -> Vec<WindowEvent> {
        self.glfw.poll_events();

        let mut drained = Vec::new();
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::Close => drained.push(WindowEvent::CloseRequested),
                glfw::WindowEvent::FramebufferSize(w, h) => {
                    drained.push(WindowEvent::Resized(w as u32, h as u32));
                }
                glfw::WindowEvent::Key(key, _, action, _) => {
                    drained.push(WindowEvent::Key(key, action));
                }
                _ => {}
            }
        }
        drained
    }

    /// Current framebuffer size in pixels.
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width as u32, height as u32)
    }

    /// Mark the window for closing.
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Instance extensions GLFW needs for surface creation.
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::Glfw("no Vulkan-capable display found".to_string()))
    }

    /// Create the presentable surface bound to this window.
    pub fn create_surface(
        &mut self,
        instance: ash::vk::Instance,
    ) -> WindowResult<ash::vk::SurfaceKHR> {
        let mut surface = ash::vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == ash::vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::Glfw(format!(
                "surface creation failed: {result:?}"
            )))
        }
    }
}
