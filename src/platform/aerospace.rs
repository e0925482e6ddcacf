use super::shell::run_command;
use super::{ActiveWindow, WindowError, WindowSource};

const FOCUSED_COMMAND: &str = "aerospace list-windows --focused";

pub struct AerospaceSource;

impl AerospaceSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AerospaceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowSource for AerospaceSource {
    fn active_window(&self) -> Result<Option<ActiveWindow>, WindowError> {
        let output = run_command(FOCUSED_COMMAND)?;
        parse_focused(&output)
    }

    fn name(&self) -> &'static str {
        "aerospace"
    }
}

/// Parse `<window-id> | <app name> | <title>`.
fn parse_focused(output: &str) -> Result<Option<ActiveWindow>, WindowError> {
    if output.contains("No window is focused") || output.trim().is_empty() {
        return Ok(None);
    }

    let mut fields = output.trim().splitn(3, '|').map(str::trim);
    let (Some(_id), Some(app_id), Some(title)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(WindowError::Parse(format!("unexpected aerospace output: {output}")));
    };

    Ok(Some(ActiveWindow {
        app_id: app_id.to_string(),
        title: title.to_string(),
    }))
}
