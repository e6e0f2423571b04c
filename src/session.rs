//! Per-user browsing state for the parts catalog. The caller owns and
//! persists it; catalog operations never consult it.

use serde::{Deserialize, Serialize};

use crate::parts::{ParentLink, PartsCatalog, PartsError, normalize_part_number};
use crate::store::Collection;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartsSession {
    #[serde(default)]
    pub selected_part: Option<String>,
    #[serde(default)]
    pub edit_mode: bool,
}

impl Collection for PartsSession {
    const FILE_NAME: &'static str = "session.json";
}

impl PartsSession {
    pub fn select(&mut self, raw: &str) {
        let key = normalize_part_number(raw);
        self.selected_part = (!key.is_empty()).then_some(key);
        self.edit_mode = false;
    }

    pub fn clear(&mut self) {
        self.selected_part = None;
        self.edit_mode = false;
    }

    /// Flips edit mode for the current selection. Without a selection there
    /// is nothing to edit and the flag stays off.
    pub fn toggle_edit(&mut self) -> bool {
        self.edit_mode = self.selected_part.is_some() && !self.edit_mode;
        self.edit_mode
    }

    /// Moves the selection to the selected part's parent. Dangling parents
    /// are still followed so the caller can report them as not found.
    pub fn follow_parent(&mut self, catalog: &PartsCatalog) -> Result<ParentLink, PartsError> {
        let selected = self
            .selected_part
            .clone()
            .ok_or(PartsError::NoSelection)?;
        let link = catalog.parent_link(&selected)?;
        match &link {
            ParentLink::Found(parent) | ParentLink::Dangling(parent) => self.select(parent),
            ParentLink::None => {}
        }
        Ok(link)
    }
}
