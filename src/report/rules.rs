//! Report-time renaming rules read from the config directory.
//!
//! Neither rule set touches stored data; both only change how rows are
//! named in a report. A missing file means no rules, and so does a broken
//! one (after a warning).

use crate::constants::{ALIAS_FILE_NAME, SUBPROGRAM_FILE_NAMES};
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;

/// Splits one application into named sub-programs by window title.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubProgram {
    #[serde(default)]
    pub app_ids: Vec<String>,
    /// Title substrings; empty matches every title.
    #[serde(default)]
    pub title_list: Vec<String>,
    pub alias: String,
}

impl SubProgram {
    fn claims(&self, app_id: &str) -> bool {
        self.app_ids.iter().any(|id| id == app_id)
    }

    fn matches_title(&self, title: &str) -> bool {
        self.title_list.is_empty()
            || self
                .title_list
                .iter()
                .any(|part| title.contains(part.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubProgramRules {
    programs: Vec<SubProgram>,
}

impl SubProgramRules {
    pub fn new(programs: Vec<SubProgram>) -> Self {
        Self { programs }
    }

    /// Load the first of `subprograms.yaml`, `subprograms.yml`,
    /// `subprograms.json` that exists in `config_dir`.
    pub fn load(config_dir: &Path) -> Self {
        for file_name in SUBPROGRAM_FILE_NAMES {
            let path = config_dir.join(file_name);
            let Some(contents) = read_optional(&path) else {
                continue;
            };

            let parsed = if path.extension().is_some_and(|ext| ext == "json") {
                serde_json::from_str::<Vec<SubProgram>>(&contents).map_err(|e| e.to_string())
            } else {
                serde_yaml::from_str::<Vec<SubProgram>>(&contents).map_err(|e| e.to_string())
            };

            return match parsed {
                Ok(programs) => {
                    debug!("Loaded {} sub-program rules from {}", programs.len(), path.display());
                    Self::new(programs)
                }
                Err(e) => {
                    warn!("Ignoring malformed sub-program file {}: {e}", path.display());
                    Self::default()
                }
            };
        }

        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Report name for a record of `app_id` with `title`.
    ///
    /// Apps no rule claims keep their id. A claimed app takes the alias of
    /// the first claiming rule whose titles match, or `"<app_id> (Other)"`
    /// if none does.
    pub fn resolve(&self, app_id: &str, title: &str) -> String {
        let mut claimed = false;
        for program in self.programs.iter().filter(|p| p.claims(app_id)) {
            claimed = true;
            if program.matches_title(title) {
                return program.alias.clone();
            }
        }

        if claimed {
            format!("{app_id} (Other)")
        } else {
            app_id.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Alias {
    pub name: String,
    pub alias: String,
}

#[derive(Debug, Clone, Default)]
pub struct AliasRules {
    aliases: Vec<Alias>,
}

impl AliasRules {
    pub fn new(aliases: Vec<Alias>) -> Self {
        Self { aliases }
    }

    /// Load `alias.json` from `config_dir`.
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join(ALIAS_FILE_NAME);
        let Some(contents) = read_optional(&path) else {
            return Self::default();
        };

        match serde_json::from_str::<Vec<Alias>>(&contents) {
            Ok(aliases) => {
                debug!("Loaded {} aliases from {}", aliases.len(), path.display());
                Self::new(aliases)
            }
            Err(e) => {
                warn!("Ignoring malformed alias file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Replace every occurrence of each alias name, in file order.
    pub fn apply(&self, name: &str) -> String {
        self.aliases
            .iter()
            .filter(|alias| !alias.name.is_empty())
            .fold(name.to_string(), |name, alias| name.replace(&alias.name, &alias.alias))
    }
}

/// File contents, or `None` when the file is missing or unreadable.
fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Could not read {}: {e}", path.display());
            None
        }
    }
}
