use bytemuck::{Pod, Zeroable};

/// The total size of the link struct. The game (or its companion shim) writes at least
/// this many bytes into the link file on every frame it renders.
pub const C_KINO_LINK_SIZE: usize = std::mem::size_of::<CKinoLink>();

/// The raw link as it sits in the link file. We rarely use it as it is and instead
/// convert it into [crate::KinoLink] before handing it to the rest of kinolay.
///
/// All vectors are `[x, y, z]` in the game's world space (meters, y up). Strings are
/// nul padded utf-8.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct CKinoLink {
    /// bumped if the layout of this struct ever changes. writers with a different
    /// version are ignored.
    pub ui_version: u32,
    /// update count of the link since the game started writing it. more or less the
    /// frame number. zero means the writer is gone (or never existed).
    pub ui_tick: u32,
    /// position of the camera
    pub f_camera_position: [f32; 3],
    /// direction towards which the camera is facing
    pub f_camera_front: [f32; 3],
    /// position of the player character
    pub f_player_position: [f32; 3],
    /// vertical field of view in radians
    pub fov: f32,
    /// id of the map the player is currently on
    pub map_id: u32,
    /// pid of the game process that last wrote the link
    pub process_id: u32,
    /// position of the game's client area relative to the top left corner of the
    /// desktop, in screen coordinates
    pub client_pos: [i32; 2],
    /// size of the game's client area in screen coordinates
    pub client_size: [i32; 2],
    /// name of the character currently logged in. nul padded utf-8
    pub name: [u8; 64],
}

impl Default for CKinoLink {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl CKinoLink {
    /// The only version of the link layout so far.
    pub const UI_VERSION: u32 = 1;

    /// name with the nul padding stripped. invalid utf-8 yields an empty name
    /// instead of an error, a garbage writer should not take the overlay down.
    pub fn name_str(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..end]).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::CKinoLink;

    #[test]
    fn name_parsing() {
        let mut cl = CKinoLink::default();
        cl.name[..5].copy_from_slice(b"kirin");
        assert_eq!(cl.name_str(), "kirin");
        // unpadded name uses the whole field
        let mut cl = CKinoLink::default();
        cl.name = [b'a'; 64];
        assert_eq!(cl.name_str().len(), 64);
        // invalid utf-8 degrades to an empty name
        let mut cl = CKinoLink::default();
        cl.name[0] = 0xff;
        cl.name[1] = 0xfe;
        assert_eq!(cl.name_str(), "");
    }
}
