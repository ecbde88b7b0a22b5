//! How packs sit on disk: each pack is a directory under `packs/` whose name is the
//! pack's id, holding a single `pack.json`. Packs travel between users either as that
//! bare json file or as a zip archive with `pack.json` at its root.

use std::io::Read;

use kino_core::prelude::*;

use crate::pack::Pack;

pub const PACK_FILE_NAME: &str = "pack.json";

pub fn load_pack_from_dir(dir: &Dir) -> Result<Pack> {
    let pack_json = dir
        .read_to_string(PACK_FILE_NAME)
        .into_diagnostic()
        .wrap_err("failed to read pack file")?;
    serde_json::from_str(&pack_json)
        .into_diagnostic()
        .wrap_err("failed to deserialize pack file")
}

pub fn save_pack_to_dir(pack: &Pack, dir: &Dir) -> Result<()> {
    let pack_json = to_string_pretty(pack)
        .into_diagnostic()
        .wrap_err("failed to serialize pack")?;
    dir.write(PACK_FILE_NAME, pack_json)
        .into_diagnostic()
        .wrap_err("failed to write pack file")
}

/// Imports a pack someone shared as a file. Zip archives are recognized by their
/// magic bytes, anything else is treated as a bare pack json.
pub fn import_pack_from_bytes(bytes: &[u8]) -> Result<Pack> {
    if bytes.starts_with(b"PK") {
        import_pack_from_zip(bytes)
    } else {
        serde_json::from_slice(bytes)
            .into_diagnostic()
            .wrap_err("failed to deserialize pack json")
    }
}

fn import_pack_from_zip(bytes: &[u8]) -> Result<Pack> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .into_diagnostic()
        .wrap_err("failed to open pack archive")?;
    let mut pack_file = archive
        .by_name(PACK_FILE_NAME)
        .into_diagnostic()
        .wrap_err("pack archive has no pack.json")?;
    let mut pack_json = String::new();
    pack_file
        .read_to_string(&mut pack_json)
        .into_diagnostic()
        .wrap_err("failed to read pack.json from archive")?;
    serde_json::from_str(&pack_json)
        .into_diagnostic()
        .wrap_err("failed to deserialize pack.json from archive")
}
