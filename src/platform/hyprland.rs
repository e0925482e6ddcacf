use super::shell::run_command;
use super::{ActiveWindow, WindowError, WindowSource};

const ACTIVE_WINDOW_COMMAND: &str = "hyprctl activewindow";

pub struct HyprlandSource;

impl HyprlandSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HyprlandSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowSource for HyprlandSource {
    fn active_window(&self) -> Result<Option<ActiveWindow>, WindowError> {
        let output = run_command(ACTIVE_WINDOW_COMMAND)?;
        Ok(parse_active_window(&output))
    }

    fn name(&self) -> &'static str {
        "hyprland"
    }
}

/// Pick the `class:` and `title:` lines out of `hyprctl activewindow`.
fn parse_active_window(output: &str) -> Option<ActiveWindow> {
    let mut window = ActiveWindow::default();

    for line in output.lines().map(str::trim) {
        if let Some(class) = line.strip_prefix("class:") {
            window.app_id = class.trim().to_string();
        } else if let Some(title) = line.strip_prefix("title:") {
            window.title = title.trim().to_string();
        }
    }

    if window.app_id.is_empty() {
        None
    } else {
        Some(window)
    }
}
