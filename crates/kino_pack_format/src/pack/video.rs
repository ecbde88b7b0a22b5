use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// What kind of media a [VideoSource] points at. Image sources loop a single frame,
/// video sources stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Video,
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSource {
    pub kind: SourceKind,
    pub url: Url,
    /// width over height of the source, used to size the screen quad. `[16, 9]` means
    /// a screen 16 meters wide and 9 meters tall at scale 1
    pub ratio: Vec2,
}

/// A marker that plays video/image content on a screen placed in the world.
///
/// Equality is plain value equality over the whole record. The overlay relies on it to
/// decide whether an activation is a no-op, so every field that affects playback or
/// placement must take part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMarker {
    pub guid: Uuid,
    /// id of the map this marker belongs to
    pub map_id: u32,
    pub source: VideoSource,
    pub position: Vec3,
    /// euler angles in radians, applied x then y then z
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// camera distance below which the screen shows up at all. a marker without one
    /// never activates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_distance: Option<f32>,
    /// camera distance at (and inside) which the screen is fully opaque and audible.
    /// between this and `visible_distance` opacity and volume fade linearly to zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in_distance: Option<f32>,
}

fn default_scale() -> f32 {
    1.0
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    fn marker() -> VideoMarker {
        VideoMarker {
            guid: Uuid::nil(),
            map_id: 15,
            source: VideoSource {
                kind: SourceKind::Video,
                url: Url::parse("https://cdn.example.com/intro.webm").unwrap(),
                ratio: glam::vec2(16.0, 9.0),
            },
            position: glam::vec3(10.0, 1.5, -4.0),
            rotation: Vec3::ZERO,
            scale: 1.0,
            visible_distance: Some(30.0),
            fade_in_distance: Some(10.0),
        }
    }

    #[test]
    fn json_round_trip() {
        let marker = marker();
        let json = serde_json::to_string_pretty(&marker).unwrap();
        let back: VideoMarker = serde_json::from_str(&json).unwrap();
        assert_eq!(marker, back);
    }

    #[test]
    fn omitted_fields_get_defaults() {
        let json = r#"{
            "guid": "00000000-0000-0000-0000-000000000000",
            "map_id": 3,
            "source": { "kind": "image", "url": "file:///poster.png", "ratio": [4.0, 3.0] },
            "position": [0.0, 0.0, 0.0]
        }"#;
        let marker: VideoMarker = serde_json::from_str(json).unwrap();
        assert_eq!(marker.scale, 1.0);
        assert_eq!(marker.rotation, Vec3::ZERO);
        assert_eq!(marker.visible_distance, None);
        assert_eq!(marker.fade_in_distance, None);
    }

    #[test]
    fn equality_is_field_by_field() {
        let a = marker();
        let mut b = a.clone();
        assert_eq!(a, b);
        b.scale = 2.0;
        assert!(a != b);
        let mut c = a.clone();
        c.source.ratio = glam::vec2(4.0, 3.0);
        assert!(a != c);
    }
}
