use cap_std::{ambient_authority, fs_utf8::camino::Utf8PathBuf, fs_utf8::Dir};
use miette::{Context, IntoDiagnostic, Result};

/// Resolves the kinolay data directory.
///
/// If `KINOLAY_DATA_DIR` is set, that path is created (if needed) and used. Otherwise
/// the platform's local data dir gets a `kinolay` folder. Everything kinolay persists
/// (packs, themes, logs, configs) lives below this directory.
pub fn get_kinolay_dir() -> Result<Dir> {
    let authority = ambient_authority();
    if let Ok(env_dir) = std::env::var("KINOLAY_DATA_DIR") {
        let kdir_path = Utf8PathBuf::try_from(&env_dir)
            .into_diagnostic()
            .wrap_err(env_dir)
            .wrap_err("KINOLAY_DATA_DIR is not a utf-8 path")?;
        Dir::create_ambient_dir_all(&kdir_path, authority)
            .into_diagnostic()
            .wrap_err(kdir_path.clone())
            .wrap_err("failed to create kinolay data dir")?;
        Dir::open_ambient_dir(&kdir_path, authority)
            .into_diagnostic()
            .wrap_err(kdir_path)
            .wrap_err("failed to open kinolay data dir")
    } else {
        let dir = cap_directories::ProjectDirs::from("com.kinolay", "", "kinolay", authority)
            .ok_or_else(|| miette::miette!("failed to get project dirs"))?
            .data_local_dir()
            .into_diagnostic()
            .wrap_err("failed to get data local dir")?;
        Ok(Dir::from_cap_std(dir))
    }
}
