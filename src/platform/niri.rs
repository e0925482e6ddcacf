use super::shell::run_command;
use super::{ActiveWindow, WindowError, WindowSource};
use serde::Deserialize;

const WINDOWS_COMMAND: &str = "niri msg --json windows";

/// Subset of a window entry from `niri msg --json windows`.
#[derive(Debug, Deserialize)]
struct NiriWindow {
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    is_focused: bool,
}

pub struct NiriSource;

impl NiriSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NiriSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowSource for NiriSource {
    fn active_window(&self) -> Result<Option<ActiveWindow>, WindowError> {
        let output = run_command(WINDOWS_COMMAND)?;
        parse_windows(&output)
    }

    fn name(&self) -> &'static str {
        "niri"
    }
}

fn parse_windows(output: &str) -> Result<Option<ActiveWindow>, WindowError> {
    let windows: Vec<NiriWindow> =
        serde_json::from_str(output).map_err(|e| WindowError::Parse(e.to_string()))?;

    Ok(windows
        .into_iter()
        .find(|w| w.is_focused)
        .map(|w| ActiveWindow {
            app_id: w.app_id.unwrap_or_default(),
            title: w.title.unwrap_or_default(),
        }))
}
