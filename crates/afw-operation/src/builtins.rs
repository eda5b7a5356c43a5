//! Operations the framework itself invokes.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::Operation;

pub const SHOW_UNDO_KEY: &str = "afw.undo.show";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShowUndoInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

static SHOW_UNDO: Lazy<Operation<ShowUndoInput, ()>> = Lazy::new(|| {
    Operation::new(SHOW_UNDO_KEY)
        .with_name("Show undo")
        .with_description("Surface an undo affordance for the most recent undoable operation.")
});

/// Scheduled by the history tracker after recording an entry whose mapping
/// carries a message. Applications register a resolver to display it.
pub fn show_undo() -> Operation<ShowUndoInput, ()> {
    SHOW_UNDO.clone()
}
