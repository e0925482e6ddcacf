use super::{ActiveWindow, WindowError, WindowSource};
use log::warn;
use std::time::Duration;
use x11rb::connection::Connection;
use x11rb::protocol::screensaver;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt, Window};

/// Focused window from EWMH properties on an X11 (or XWayland) display.
pub struct X11Source {
    conn: Option<x11rb::rust_connection::RustConnection>,
    root: Window,
}

impl Default for X11Source {
    fn default() -> Self {
        Self::new()
    }
}

impl X11Source {
    pub fn new() -> Self {
        match x11rb::connect(None) {
            Ok((conn, screen_num)) => {
                let Some(root) = conn.setup().roots.get(screen_num).map(|screen| screen.root) else {
                    warn!(
                        "Invalid screen number {screen_num} (only {} screens available). Window tracking disabled.",
                        conn.setup().roots.len()
                    );
                    return Self {
                        conn: None,
                        root: 0,
                    };
                };
                Self {
                    conn: Some(conn),
                    root,
                }
            }
            Err(e) => {
                // Keep running; every query reports the missing display instead
                warn!("Failed to connect to X server: {e}. Window tracking disabled.");
                Self {
                    conn: None,
                    root: 0,
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn get_atom(&self, name: &str) -> Option<u32> {
        self.conn
            .as_ref()?
            .intern_atom(false, name.as_bytes())
            .ok()?
            .reply()
            .ok()
            .map(|r| r.atom)
    }

    fn get_window_property(&self, window: Window, atom: u32) -> Option<String> {
        let reply = self
            .conn
            .as_ref()?
            .get_property(false, window, atom, AtomEnum::ANY, 0, 1024)
            .ok()?
            .reply()
            .ok()?;

        if reply.value.is_empty() {
            return None;
        }

        String::from_utf8(reply.value).ok()
    }

    fn get_active_window_id(&self) -> Option<Window> {
        let conn = self.conn.as_ref()?;
        let atom = self.get_atom("_NET_ACTIVE_WINDOW")?;
        let reply = conn
            .get_property(false, self.root, atom, AtomEnum::WINDOW, 0, 1)
            .ok()?
            .reply()
            .ok()?;

        let bytes: [u8; 4] = reply.value.get(..4)?.try_into().ok()?;
        let window = u32::from_ne_bytes(bytes);
        // 0 means no window has focus
        (window != 0).then_some(window)
    }
}

impl WindowSource for X11Source {
    fn active_window(&self) -> Result<Option<ActiveWindow>, WindowError> {
        if self.conn.is_none() {
            return Err(WindowError::Unsupported("no X11 display".into()));
        }

        let Some(window_id) = self.get_active_window_id() else {
            return Ok(None);
        };

        let name_atom = self
            .get_atom("_NET_WM_NAME")
            .unwrap_or_else(|| AtomEnum::WM_NAME.into());

        let title = self
            .get_window_property(window_id, name_atom)
            .unwrap_or_default();

        // WM_CLASS is "instance\0class\0"; the instance name is the app id
        let app_id = self
            .get_window_property(window_id, AtomEnum::WM_CLASS.into())
            .and_then(|s| s.split('\0').next().map(str::to_string))
            .unwrap_or_default();

        Ok(Some(ActiveWindow { app_id, title }))
    }

    fn idle_time(&self) -> Option<Duration> {
        let conn = self.conn.as_ref()?;

        screensaver::query_info(conn, self.root)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|info| Duration::from_millis(u64::from(info.ms_since_user_input)))
    }

    fn name(&self) -> &'static str {
        "x11"
    }
}
