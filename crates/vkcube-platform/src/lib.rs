// SPDX-License-Identifier: CEPL-1.0
//! Window capabilities the renderer needs from the platform layer.
pub use winit;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;

/// A window a Vulkan surface can be created on and whose size can be polled.
pub trait PlatformWindow: HasWindowHandle + HasDisplayHandle {
    /// Drawable size in physical pixels.
    fn extent(&self) -> (u32, u32);

    /// Zero-area or iconified windows get no swapchain.
    fn is_minimized(&self) -> bool {
        let (w, h) = self.extent();
        w == 0 || h == 0
    }
}

impl PlatformWindow for Window {
    fn extent(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }

    fn is_minimized(&self) -> bool {
        let (w, h) = self.extent();
        w == 0 || h == 0 || Window::is_minimized(self).unwrap_or(false)
    }
}
