use std::io::Read;
use std::sync::{Arc, Mutex};

use kino_pack_format::pack::VideoSource;
use kino_pack_format::MediaPlayer;
use miette::{Context, IntoDiagnostic, Result};
use tracing::{error, info};
use url::Url;

/// media files bigger than this fail to load instead of eating all the memory
const MAX_MEDIA_SIZE: u64 = 50 * 1024 * 1024;

/// The built-in [MediaPlayer]: still images only.
///
/// `set_source` fetches and decodes the image on a rayon thread; `tick` picks the
/// decoded frame up and uploads it through egui's texture manager. Video backends
/// plug in behind the same trait, this one covers image markers and keeps the app
/// free of codec dependencies.
pub struct ImagePlayer {
    /// the decode result waiting for upload. `set_source` replaces the whole Arc, so
    /// a thread still decoding the previous source writes into an abandoned slot
    pending: Arc<Mutex<Option<Result<egui::ColorImage>>>>,
    /// keeps the managed texture alive. dropping it frees the texture
    texture: Option<egui::TextureHandle>,
}

impl ImagePlayer {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(None)),
            texture: None,
        }
    }
}

impl Default for ImagePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPlayer for ImagePlayer {
    fn play(&mut self) {
        // a still frame has nothing to stream
    }

    fn pause(&mut self) {}

    fn set_source(&mut self, source: &VideoSource) {
        info!(%source.url, "loading media source");
        self.texture = None;
        self.pending = Arc::new(Mutex::new(None));
        let pending = self.pending.clone();
        let url = source.url.clone();
        rayon::spawn(move || {
            let result = fetch_source_bytes(&url).and_then(|bytes| decode_frame(&bytes));
            if let Err(e) = &result {
                error!(?e, %url, "failed to load media source");
            }
            *pending.lock().unwrap() = Some(result);
        });
    }

    fn set_volume(&mut self, _volume: f32) {
        // images are silent. a video backend maps this onto its audio track
    }

    fn ended(&mut self) -> bool {
        // a still image never runs out
        false
    }

    fn tick(&mut self, etx: &egui::Context) {
        let frame = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.take());
        if let Some(Ok(image)) = frame {
            self.texture = Some(etx.load_texture(
                "video marker frame",
                image,
                egui::TextureOptions::LINEAR,
            ));
        }
    }

    fn texture(&self) -> Option<u64> {
        self.texture.as_ref().and_then(|handle| match handle.id() {
            egui::TextureId::Managed(id) => Some(id),
            egui::TextureId::User(_) => None,
        })
    }

    fn dispose(&mut self) {
        self.texture = None;
        self.pending = Arc::new(Mutex::new(None));
    }
}

/// file urls read from disk, everything else goes over http
fn fetch_source_bytes(url: &Url) -> Result<Vec<u8>> {
    if url.scheme() == "file" {
        let path = url
            .to_file_path()
            .map_err(|_| miette::miette!("media url is not a valid file path: {url}"))?;
        return std::fs::read(&path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read media file {}", path.display()));
    }
    let response = ureq::get(url.as_str())
        .call()
        .into_diagnostic()
        .wrap_err("failed to download media source")?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_MEDIA_SIZE)
        .read_to_end(&mut bytes)
        .into_diagnostic()
        .wrap_err("failed to read media download")?;
    Ok(bytes)
}

fn decode_frame(bytes: &[u8]) -> Result<egui::ColorImage> {
    let image = image::load_from_memory(bytes)
        .into_diagnostic()
        .wrap_err("failed to decode media source as an image")?;
    let image = image.to_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(
        size,
        image.as_raw(),
    ))
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut bytes, image::ImageOutputFormat::Png)
            .expect("failed to encode test png");
        bytes.into_inner()
    }

    #[test]
    fn decode_keeps_dimensions() {
        let frame = decode_frame(&png_bytes(4, 2)).expect("failed to decode");
        assert_eq!(frame.size, [4, 2]);
    }

    #[test]
    fn garbage_bytes_are_an_error() {
        assert!(decode_frame(b"definitely not an image").is_err());
    }

    #[test]
    fn tick_uploads_the_decoded_frame() {
        let mut player = ImagePlayer::new();
        *player.pending.lock().unwrap() = Some(decode_frame(&png_bytes(2, 2)));
        let etx = egui::Context::default();
        assert_eq!(player.texture(), None);
        player.tick(&etx);
        assert!(player.texture().is_some());
        // the frame is consumed, another tick must not re-upload
        let id = player.texture();
        player.tick(&etx);
        assert_eq!(player.texture(), id);
    }

    #[test]
    fn dispose_releases_the_frame_texture() {
        let mut player = ImagePlayer::new();
        *player.pending.lock().unwrap() = Some(decode_frame(&png_bytes(2, 2)));
        let etx = egui::Context::default();
        player.tick(&etx);
        player.dispose();
        assert_eq!(player.texture(), None);
    }
}
