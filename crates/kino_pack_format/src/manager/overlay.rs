use glam::Vec3;
use kino_render::screen::ScreenMesh;
use tracing::debug;

use crate::pack::{VideoMarker, VideoSource};

/// The seam towards whatever actually plays the media. kinolay ships an image player,
/// video backends plug in behind the same trait.
///
/// `set_source` is allowed to be asynchronous internally: `texture` simply returns
/// `None` until a frame is ready and the overlay skips drawing meanwhile.
pub trait MediaPlayer {
    fn play(&mut self);
    fn pause(&mut self);
    fn set_source(&mut self, source: &VideoSource);
    /// volume in `0.0..=1.0`, driven by the distance fade
    fn set_volume(&mut self, volume: f32);
    /// whether the media ran to its end since the last call (edge triggered)
    fn ended(&mut self) -> bool;
    /// per frame work: decoding, uploads through egui's texture manager
    fn tick(&mut self, etx: &egui::Context);
    /// managed texture id of the current frame, if one is ready
    fn texture(&self) -> Option<u64>;
    /// releases whatever the player holds. called exactly once, on overlay teardown
    fn dispose(&mut self);
}

/// Owns the "at most one active video screen" state of the overlay.
///
/// Fed with the video markers of the current map, it picks the active one by camera
/// distance, keeps the screen quad in sync with the active marker's source, and fades
/// opacity/volume as the camera moves.
pub struct VideoOverlay {
    player: Box<dyn MediaPlayer>,
    screen: Option<ScreenMesh>,
    active: Option<VideoMarker>,
    /// known markers with their positions precomputed at insertion
    videos: Vec<(VideoMarker, Vec3)>,
    is_playing: bool,
    is_active: bool,
    disposed: bool,
}

impl VideoOverlay {
    pub fn new(player: Box<dyn MediaPlayer>) -> Self {
        Self {
            player,
            screen: None,
            active: None,
            videos: Vec::new(),
            is_playing: false,
            is_active: false,
            disposed: false,
        }
    }

    pub fn add_video(&mut self, marker: VideoMarker) {
        let pos = marker.position;
        self.videos.push((marker, pos));
    }

    pub fn clear_videos(&mut self) {
        self.videos.clear();
    }

    pub fn active_marker(&self) -> Option<&VideoMarker> {
        self.active.as_ref()
    }

    pub fn screen(&self) -> Option<&ScreenMesh> {
        self.screen.as_ref()
    }

    /// Scans the known markers in list order and activates the first one whose camera
    /// distance is inside its visible distance. Order wins over closeness on purpose:
    /// packs rely on earlier markers taking precedence. Markers without a visible
    /// distance never match. When nothing matches, playback stops.
    pub fn check_distance(&mut self, cam_pos: Vec3) {
        let candidate = self
            .videos
            .iter()
            .find(|(marker, pos)| match marker.visible_distance {
                Some(visible_distance) => pos.distance(cam_pos) < visible_distance,
                None => false,
            })
            .map(|(marker, _)| marker.clone());
        match candidate {
            Some(marker) => self.activate(marker),
            None => self.stop(),
        }
    }

    /// Makes `marker` the active one. Re-activating the marker that is already active
    /// is a no-op. A changed source resets playback, a changed aspect ratio rebuilds
    /// the screen quad (releasing the old geometry first), and the placement transform
    /// is re-applied every time.
    fn activate(&mut self, marker: VideoMarker) {
        if self.active.as_ref() == Some(&marker) {
            return;
        }
        self.is_active = true;
        if self.active.as_ref().map(|active| &active.source) != Some(&marker.source) {
            debug!(%marker.source.url, "switching video source");
            self.stop();
            self.player.set_source(&marker.source);
        }
        let ratio = marker.source.ratio;
        let mut screen = match self.screen.take() {
            Some(mut screen) => {
                if screen.ratio != ratio {
                    screen.rebuild_geometry(ratio);
                }
                screen
            }
            None => ScreenMesh::new(ratio),
        };
        screen.position = marker.position;
        screen.rotation = marker.rotation;
        screen.scale = marker.scale;
        self.screen = Some(screen);
        self.active = Some(marker);
    }

    /// The per frame visibility/fade pass. Recomputes whether the screen is visible
    /// from the camera distance, fades opacity and volume inside the fade band, and
    /// starts/stops playback on the visibility edges.
    pub fn update_fade(&mut self, cam_pos: Vec3) {
        let (Some(marker), Some(screen)) = (self.active.as_ref(), self.screen.as_mut()) else {
            return;
        };
        let visible = if let Some(visible_distance) = marker.visible_distance {
            let distance = screen.position.distance(cam_pos);
            screen.visible = distance < visible_distance;
            if let (Some(fade_in), true) = (marker.fade_in_distance, screen.visible) {
                let opacity = if distance > fade_in {
                    fade_opacity(distance, fade_in, visible_distance)
                } else {
                    1.0
                };
                screen.opacity = opacity;
                self.player.set_volume(opacity);
            }
            screen.visible
        } else {
            screen.visible
        };
        if visible && !self.is_playing {
            self.play();
        }
        if !visible && self.is_playing {
            self.stop();
        }
    }

    /// Player upkeep: decode work, end-of-media handling and the frame texture sync.
    pub fn tick(&mut self, etx: &egui::Context) {
        self.player.tick(etx);
        if self.player.ended() {
            self.stop();
        }
        if let Some(screen) = self.screen.as_mut() {
            screen.texture = self.player.texture();
        }
    }

    pub fn play(&mut self) {
        if self.is_active {
            self.player.play();
            self.is_playing = true;
        }
    }

    pub fn stop(&mut self) {
        self.is_playing = false;
        self.player.pause();
    }

    /// Disposes the player. Idempotent, and also runs on drop, so teardown cannot leak
    /// the player whichever path the app exits through.
    pub fn cleanup(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.player.dispose();
        }
    }
}

impl Drop for VideoOverlay {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// linear remap of `distance` from `[fade_in, visible]` onto `[1, 0]`
fn fade_opacity(distance: f32, fade_in: f32, visible: f32) -> f32 {
    1.0 - (distance - fade_in) / (visible - fade_in)
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use glam::{vec2, vec3};
    use rstest::*;
    use similar_asserts::assert_eq;
    use url::Url;
    use uuid::Uuid;

    use super::*;
    use crate::pack::{SourceKind, VideoSource};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Play,
        Pause,
        SetSource(Url),
        SetVolume(f32),
        Dispose,
    }

    #[derive(Debug, Default)]
    struct PlayerState {
        calls: Vec<Call>,
        ended: bool,
    }

    /// records every call so tests can assert on exactly what the overlay did
    struct TestPlayer(Arc<Mutex<PlayerState>>);

    impl MediaPlayer for TestPlayer {
        fn play(&mut self) {
            self.0.lock().unwrap().calls.push(Call::Play);
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().calls.push(Call::Pause);
        }
        fn set_source(&mut self, source: &VideoSource) {
            self.0
                .lock()
                .unwrap()
                .calls
                .push(Call::SetSource(source.url.clone()));
        }
        fn set_volume(&mut self, volume: f32) {
            self.0.lock().unwrap().calls.push(Call::SetVolume(volume));
        }
        fn ended(&mut self) -> bool {
            std::mem::take(&mut self.0.lock().unwrap().ended)
        }
        fn tick(&mut self, _etx: &egui::Context) {}
        fn texture(&self) -> Option<u64> {
            None
        }
        fn dispose(&mut self) {
            self.0.lock().unwrap().calls.push(Call::Dispose);
        }
    }

    fn overlay() -> (VideoOverlay, Arc<Mutex<PlayerState>>) {
        let state = Arc::new(Mutex::new(PlayerState::default()));
        let overlay = VideoOverlay::new(Box::new(TestPlayer(state.clone())));
        (overlay, state)
    }

    fn marker(url: &str, position: Vec3, visible: Option<f32>, fade_in: Option<f32>) -> VideoMarker {
        VideoMarker {
            guid: Uuid::nil(),
            map_id: 1,
            source: VideoSource {
                kind: SourceKind::Video,
                url: Url::parse(url).unwrap(),
                ratio: vec2(16.0, 9.0),
            },
            position,
            rotation: Vec3::ZERO,
            scale: 1.0,
            visible_distance: visible,
            fade_in_distance: fade_in,
        }
    }

    fn calls(state: &Arc<Mutex<PlayerState>>) -> Vec<Call> {
        state.lock().unwrap().calls.clone()
    }

    #[fixture]
    fn far_and_near() -> (VideoMarker, VideoMarker) {
        // both markers sit 15 meters from the origin. a only shows within 10, b within 20
        let a = marker("https://cdn.example.com/a.webm", vec3(15.0, 0.0, 0.0), Some(10.0), None);
        let b = marker("https://cdn.example.com/b.webm", vec3(0.0, 0.0, 15.0), Some(20.0), None);
        (a, b)
    }

    #[rstest]
    fn first_match_in_list_order_wins(far_and_near: (VideoMarker, VideoMarker)) {
        let (a, b) = far_and_near;
        let (mut overlay, _state) = overlay();
        overlay.add_video(a);
        overlay.add_video(b.clone());
        overlay.check_distance(Vec3::ZERO);
        // a fails its threshold, so b activates even though both are equally far
        assert_eq!(overlay.active_marker(), Some(&b));
    }

    #[rstest]
    fn order_beats_closeness() {
        // both match, the closer one is second in the list, the first one still wins
        let first = marker("https://cdn.example.com/a.webm", vec3(18.0, 0.0, 0.0), Some(20.0), None);
        let close = marker("https://cdn.example.com/b.webm", vec3(2.0, 0.0, 0.0), Some(20.0), None);
        let (mut overlay, _state) = overlay();
        overlay.add_video(first.clone());
        overlay.add_video(close);
        overlay.check_distance(Vec3::ZERO);
        assert_eq!(overlay.active_marker(), Some(&first));
    }

    #[rstest]
    fn markers_without_visible_distance_never_match() {
        let m = marker("https://cdn.example.com/a.webm", Vec3::ZERO, None, None);
        let (mut overlay, _state) = overlay();
        overlay.add_video(m);
        overlay.check_distance(Vec3::ZERO);
        assert_eq!(overlay.active_marker(), None);
    }

    #[rstest]
    fn no_candidate_stops_playback() {
        let m = marker("https://cdn.example.com/a.webm", Vec3::ZERO, Some(10.0), None);
        let (mut overlay, state) = overlay();
        overlay.add_video(m);
        overlay.check_distance(Vec3::ZERO);
        overlay.update_fade(Vec3::ZERO);
        assert!(calls(&state).contains(&Call::Play));
        // camera leaves. the scan finds nothing and playback stops
        overlay.check_distance(vec3(100.0, 0.0, 0.0));
        assert_eq!(calls(&state).last(), Some(&Call::Pause));
    }

    #[rstest]
    fn fade_band_interpolates_opacity_and_volume() {
        let m = marker(
            "https://cdn.example.com/a.webm",
            Vec3::ZERO,
            Some(10.0),
            Some(5.0),
        );
        let (mut overlay, state) = overlay();
        overlay.add_video(m);
        overlay.check_distance(vec3(7.5, 0.0, 0.0));
        overlay.update_fade(vec3(7.5, 0.0, 0.0));
        assert_eq!(overlay.screen().unwrap().opacity, 0.5);
        assert!(calls(&state).contains(&Call::SetVolume(0.5)));
        // at the fade-in boundary and inside it, fully opaque and audible
        overlay.update_fade(vec3(5.0, 0.0, 0.0));
        assert_eq!(overlay.screen().unwrap().opacity, 1.0);
        assert_eq!(calls(&state).last(), Some(&Call::SetVolume(1.0)));
        // at the visible boundary the screen is simply not visible anymore
        overlay.update_fade(vec3(10.0, 0.0, 0.0));
        assert!(!overlay.screen().unwrap().visible);
    }

    #[test]
    fn fade_opacity_is_linear() {
        assert_eq!(fade_opacity(5.0, 5.0, 10.0), 1.0);
        assert_eq!(fade_opacity(7.5, 5.0, 10.0), 0.5);
        assert_eq!(fade_opacity(10.0, 5.0, 10.0), 0.0);
    }

    #[rstest]
    fn visibility_edges_start_and_stop_playback() {
        let m = marker("https://cdn.example.com/a.webm", Vec3::ZERO, Some(10.0), None);
        let (mut overlay, state) = overlay();
        overlay.add_video(m);
        overlay.check_distance(vec3(5.0, 0.0, 0.0));
        overlay.update_fade(vec3(5.0, 0.0, 0.0));
        assert_eq!(
            calls(&state)
                .iter()
                .filter(|c| **c == Call::Play)
                .count(),
            1
        );
        // still visible: no second play
        overlay.update_fade(vec3(6.0, 0.0, 0.0));
        assert_eq!(
            calls(&state)
                .iter()
                .filter(|c| **c == Call::Play)
                .count(),
            1
        );
        // out of range: one pause
        overlay.update_fade(vec3(50.0, 0.0, 0.0));
        assert_eq!(calls(&state).last(), Some(&Call::Pause));
    }

    #[rstest]
    fn reactivating_the_active_marker_is_a_noop() {
        let m = marker("https://cdn.example.com/a.webm", Vec3::ZERO, Some(10.0), None);
        let (mut overlay, state) = overlay();
        overlay.add_video(m);
        overlay.check_distance(vec3(5.0, 0.0, 0.0));
        let generation = overlay.screen().unwrap().generation;
        let before = calls(&state);
        overlay.check_distance(vec3(5.0, 0.0, 0.0));
        // no source change, no geometry rebuild, not even a transform write
        assert_eq!(calls(&state), before);
        assert_eq!(overlay.screen().unwrap().generation, generation);
    }

    #[rstest]
    fn ratio_switch_rebuilds_geometry_exactly_once() {
        let near = marker("https://cdn.example.com/a.webm", Vec3::ZERO, Some(10.0), None);
        let mut far = marker(
            "https://cdn.example.com/b.webm",
            vec3(0.0, 0.0, 30.0),
            Some(10.0),
            None,
        );
        far.source.ratio = vec2(4.0, 3.0);
        let (mut overlay, state) = overlay();
        overlay.add_video(near);
        overlay.add_video(far.clone());
        overlay.check_distance(Vec3::ZERO);
        let generation = overlay.screen().unwrap().generation;
        // walk over to the other marker
        overlay.check_distance(vec3(0.0, 0.0, 30.0));
        assert_eq!(overlay.screen().unwrap().generation, generation + 1);
        assert_eq!(overlay.screen().unwrap().ratio, vec2(4.0, 3.0));
        // the source changed too, so playback was reset onto the new url
        assert!(calls(&state).contains(&Call::SetSource(far.source.url)));
    }

    #[rstest]
    fn same_source_keeps_streaming_across_markers() {
        // two placements of the same media: switching must not reset playback
        let here = marker("https://cdn.example.com/a.webm", Vec3::ZERO, Some(10.0), None);
        let there = marker(
            "https://cdn.example.com/a.webm",
            vec3(0.0, 0.0, 30.0),
            Some(10.0),
            None,
        );
        let (mut overlay, state) = overlay();
        overlay.add_video(here);
        overlay.add_video(there.clone());
        overlay.check_distance(Vec3::ZERO);
        let sources = calls(&state)
            .iter()
            .filter(|c| matches!(c, Call::SetSource(_)))
            .count();
        overlay.check_distance(vec3(0.0, 0.0, 30.0));
        assert_eq!(
            calls(&state)
                .iter()
                .filter(|c| matches!(c, Call::SetSource(_)))
                .count(),
            sources
        );
        // but the screen moved to the new placement
        assert_eq!(overlay.screen().unwrap().position, there.position);
    }

    #[rstest]
    fn end_of_media_stops_playback() {
        let m = marker("https://cdn.example.com/a.webm", Vec3::ZERO, Some(10.0), None);
        let (mut overlay, state) = overlay();
        overlay.add_video(m);
        overlay.check_distance(Vec3::ZERO);
        overlay.update_fade(Vec3::ZERO);
        state.lock().unwrap().ended = true;
        let etx = egui::Context::default();
        overlay.tick(&etx);
        assert_eq!(calls(&state).last(), Some(&Call::Pause));
    }

    #[rstest]
    fn cleanup_disposes_exactly_once() {
        let (mut overlay, state) = overlay();
        overlay.cleanup();
        drop(overlay);
        assert_eq!(
            calls(&state)
                .iter()
                .filter(|c| **c == Call::Dispose)
                .count(),
            1
        );
    }
}
