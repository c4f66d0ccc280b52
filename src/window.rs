//! Window and input notifications consumed by the renderer.
//!
//! The windowing layer itself lives outside this crate; it translates its
//! native events into [`WindowEvent`] and hands them to
//! `Renderer::on_window_event`.

/// Mouse buttons the renderer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// A window or input notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    /// New client area size in physical pixels.
    Resized { width: u32, height: u32 },
    /// Cursor position in physical pixels from the top-left corner.
    CursorMoved { x: f32, y: f32 },
    MouseButton { button: MouseButton, pressed: bool },
    /// Platform key code.
    Key { code: u32, pressed: bool },
    Focus(bool),
    CloseRequested,
}

/// Window state accumulated from events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowState {
    width: u32,
    height: u32,
    cursor: Option<(f32, f32)>,
    focused: bool,
    resized: bool,
    close_requested: bool,
}

impl WindowState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cursor: None,
            focused: true,
            resized: false,
            close_requested: false,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Last cursor position inside the window.
    pub fn cursor(&self) -> Option<(f32, f32)> {
        self.cursor
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Check if the window was resized since the flag was last cleared.
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match *event {
            WindowEvent::Resized { width, height } => {
                self.resized |= (width, height) != (self.width, self.height);
                self.width = width;
                self.height = height;
            }
            WindowEvent::CursorMoved { x, y } => {
                let inside = x >= 0.0 && y >= 0.0 && x < self.width as f32 && y < self.height as f32;
                self.cursor = inside.then_some((x, y));
            }
            WindowEvent::Focus(focused) => self.focused = focused,
            WindowEvent::CloseRequested => self.close_requested = true,
            WindowEvent::MouseButton { .. } | WindowEvent::Key { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_sets_flag_once() {
        let mut state = WindowState::new(800, 600);
        state.handle_event(&WindowEvent::Resized { width: 800, height: 600 });
        assert!(!state.was_resized());
        state.handle_event(&WindowEvent::Resized { width: 1024, height: 768 });
        assert!(state.was_resized());
        assert_eq!(state.dimensions(), (1024, 768));
        state.clear_resize_flag();
        assert!(!state.was_resized());
    }

    #[test]
    fn test_cursor_outside_window_is_none() {
        let mut state = WindowState::new(100, 100);
        state.handle_event(&WindowEvent::CursorMoved { x: 10.0, y: 20.0 });
        assert_eq!(state.cursor(), Some((10.0, 20.0)));
        state.handle_event(&WindowEvent::CursorMoved { x: 150.0, y: 20.0 });
        assert_eq!(state.cursor(), None);
    }
}
