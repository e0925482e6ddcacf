use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveWindow {
    pub app_id: String,
    pub title: String,
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Could not parse window info: {0}")]
    Parse(String),

    #[error("Unsupported desktop: {0}")]
    Unsupported(String),

    #[error("No answer within {0:?}")]
    Timeout(Duration),
}

/// Source of the currently focused window.
pub trait WindowSource: Send + Sync {
    /// The focused window, or `None` when nothing has focus.
    fn active_window(&self) -> Result<Option<ActiveWindow>, WindowError>;

    /// Time since the last user input, when the source can tell.
    fn idle_time(&self) -> Option<Duration> {
        None
    }

    fn name(&self) -> &'static str;
}
