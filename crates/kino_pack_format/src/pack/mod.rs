mod video;

use serde::{Deserialize, Serialize};

pub use video::*;

/// A marker pack: a named, ordered collection of position annotated markers that is
/// edited (and shared) as a unit. The pack directory's name serves as the pack's id,
/// so the pack itself only stores the markers.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pack {
    #[serde(default)]
    pub videos: Vec<VideoMarker>,
}
