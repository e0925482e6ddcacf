pub mod aerospace;
pub mod hyprland;
pub mod niri;
mod shell;
pub mod types;

#[cfg(target_os = "linux")]
pub mod linux;

pub use types::{ActiveWindow, WindowError, WindowSource};

use log::info;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Niri,
    Hyprland,
    Aerospace,
    X11,
}

/// Choose a window source for the given `XDG_CURRENT_DESKTOP` value.
///
/// The variable may hold a colon-separated list (`niri:GNOME`); any entry
/// naming a supported compositor wins. Otherwise fall back to the platform
/// default, if there is one.
pub fn select_source(desktop: Option<&str>) -> Option<SourceKind> {
    let named = desktop.and_then(|desktop| {
        desktop
            .split(':')
            .map(|entry| entry.trim().to_lowercase())
            .find_map(|entry| match entry.as_str() {
                "niri" => Some(SourceKind::Niri),
                "hyprland" => Some(SourceKind::Hyprland),
                _ => None,
            })
    });

    named.or(if cfg!(target_os = "macos") {
        Some(SourceKind::Aerospace)
    } else if cfg!(target_os = "linux") {
        Some(SourceKind::X11)
    } else {
        None
    })
}

/// Detect the active-window source for this session.
pub fn detect() -> Result<Box<dyn WindowSource>, WindowError> {
    let desktop = env::var("XDG_CURRENT_DESKTOP").ok();
    let kind = select_source(desktop.as_deref()).ok_or_else(|| {
        WindowError::Unsupported(desktop.clone().unwrap_or_else(|| "unknown".into()))
    })?;

    let source = build_source(kind)?;
    info!("Using {} active window source", source.name());
    Ok(source)
}

fn build_source(kind: SourceKind) -> Result<Box<dyn WindowSource>, WindowError> {
    match kind {
        SourceKind::Niri => Ok(Box::new(niri::NiriSource::new())),
        SourceKind::Hyprland => Ok(Box::new(hyprland::HyprlandSource::new())),
        SourceKind::Aerospace => Ok(Box::new(aerospace::AerospaceSource::new())),
        SourceKind::X11 => x11_source(),
    }
}

#[cfg(target_os = "linux")]
fn x11_source() -> Result<Box<dyn WindowSource>, WindowError> {
    let source = linux::X11Source::new();
    if !source.is_connected() {
        return Err(WindowError::Unsupported("no X11 display".into()));
    }
    Ok(Box::new(source))
}

#[cfg(not(target_os = "linux"))]
fn x11_source() -> Result<Box<dyn WindowSource>, WindowError> {
    Err(WindowError::Unsupported("X11 is only supported on Linux".into()))
}
