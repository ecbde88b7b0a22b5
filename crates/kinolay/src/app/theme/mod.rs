use std::collections::BTreeMap;

use cap_std::fs_utf8::Dir;
use egui::Style;
use miette::{Context, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Owns the themes directory: every `themes/<name>.json` is a serialized egui style.
/// The configured default theme is applied at startup, the window switches at runtime.
pub struct ThemeManager {
    dir: Dir,
    themes_dir: Dir,
    themes: BTreeMap<String, Theme>,
    config: ThemeManagerConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Theme {
    pub style: Style,
}

#[derive(Debug, Serialize, Deserialize)]
struct ThemeManagerConfig {
    default_theme: String,
}

impl Default for ThemeManagerConfig {
    fn default() -> Self {
        Self {
            default_theme: ThemeManager::DEFAULT_THEME_NAME.to_owned(),
        }
    }
}

impl ThemeManager {
    const THEME_MANAGER_DIR_NAME: &str = "theme_manager";
    const THEMES_DIR_NAME: &str = "themes";
    const DEFAULT_THEME_NAME: &str = "default";
    const THEME_MANAGER_CONFIG_NAME: &str = "theme_manager_config.json";

    pub fn new(kdir: &Dir) -> Result<Self> {
        kdir.create_dir_all(Self::THEME_MANAGER_DIR_NAME)
            .into_diagnostic()
            .wrap_err("failed to create theme manager dir")?;
        let dir = kdir
            .open_dir(Self::THEME_MANAGER_DIR_NAME)
            .into_diagnostic()
            .wrap_err("failed to open theme manager dir")?;
        dir.create_dir_all(Self::THEMES_DIR_NAME)
            .into_diagnostic()
            .wrap_err("failed to create themes dir")?;
        let themes_dir = dir
            .open_dir(Self::THEMES_DIR_NAME)
            .into_diagnostic()
            .wrap_err("failed to open themes dir")?;

        let default_theme_file = format!("{}.json", Self::DEFAULT_THEME_NAME);
        if !themes_dir.exists(&default_theme_file) {
            themes_dir
                .write(
                    &default_theme_file,
                    serde_json::to_string_pretty(&Theme::default())
                        .into_diagnostic()
                        .wrap_err("failed to serialize default theme")?,
                )
                .into_diagnostic()
                .wrap_err("failed to write default theme file")?;
        }

        let mut themes: BTreeMap<String, Theme> = Default::default();
        for entry in themes_dir
            .entries()
            .into_diagnostic()
            .wrap_err("failed to read themes dir entries")?
        {
            let entry = entry.into_diagnostic()?;
            if !entry.metadata().into_diagnostic()?.is_file() {
                continue;
            }
            let name = entry
                .file_name()
                .into_diagnostic()?
                .trim_end_matches(".json")
                .to_string();
            let theme_json = themes_dir
                .read_to_string(format!("{name}.json"))
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to read theme file: {name}"))?;
            match serde_json::from_str(&theme_json) {
                Ok(theme) => {
                    themes.insert(name, theme);
                }
                Err(e) => {
                    // a broken theme shouldn't keep the app from starting
                    error!(?e, name, "failed to deserialize theme");
                }
            }
        }

        let config = if dir.exists(Self::THEME_MANAGER_CONFIG_NAME) {
            serde_json::from_str(
                &dir.read_to_string(Self::THEME_MANAGER_CONFIG_NAME)
                    .into_diagnostic()
                    .wrap_err("failed to read theme manager config")?,
            )
            .into_diagnostic()
            .wrap_err("failed to deserialize theme manager config")?
        } else {
            let config = ThemeManagerConfig::default();
            dir.write(
                Self::THEME_MANAGER_CONFIG_NAME,
                serde_json::to_string_pretty(&config)
                    .into_diagnostic()
                    .wrap_err("failed to serialize theme manager config")?,
            )
            .into_diagnostic()
            .wrap_err("failed to write theme manager config")?;
            config
        };

        Ok(Self {
            dir,
            themes_dir,
            themes,
            config,
        })
    }

    /// applies the configured default theme. called once, before the first frame
    pub fn init_egui(&mut self, etx: &egui::Context) {
        match self.themes.get(&self.config.default_theme) {
            Some(theme) => etx.set_style(theme.style.clone()),
            None => {
                error!(%self.config.default_theme, "default theme is not among the loaded themes");
            }
        }
    }

    pub fn gui(&mut self, etx: &egui::Context, open: &mut bool) {
        egui::Window::new("Theme Manager").open(open).show(etx, |ui| {
            egui::Grid::new("themes")
                .striped(true)
                .num_columns(2)
                .show(ui, |ui| {
                    let mut apply = None;
                    for name in self.themes.keys() {
                        ui.label(name);
                        if ui.button("apply").clicked() {
                            apply = Some(name.clone());
                        }
                        ui.end_row();
                    }
                    if let Some(name) = apply {
                        if let Some(theme) = self.themes.get(&name) {
                            etx.set_style(theme.style.clone());
                        }
                        self.config.default_theme = name;
                        self.save_config();
                    }
                });
        });
    }

    fn save_config(&self) {
        match serde_json::to_string_pretty(&self.config) {
            Ok(config_json) => {
                if let Err(e) = self.dir.write(Self::THEME_MANAGER_CONFIG_NAME, config_json) {
                    error!(?e, "failed to write theme manager config");
                }
            }
            Err(e) => {
                error!(?e, "failed to serialize theme manager config");
            }
        }
    }

    #[allow(unused)]
    pub fn themes_dir(&self) -> &Dir {
        &self.themes_dir
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cap_std::ambient_authority;
    use similar_asserts::assert_eq;

    use super::*;

    static TEST_DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_kdir() -> Dir {
        let unique = format!(
            "kinolay_theme_test_{}_{}",
            std::process::id(),
            TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = std::env::temp_dir().join(unique);
        std::fs::create_dir_all(&path).expect("failed to create temp dir");
        Dir::open_ambient_dir(path.to_str().expect("temp dir is not utf-8"), ambient_authority())
            .expect("failed to open temp dir")
    }

    #[test]
    fn first_run_creates_the_default_theme() {
        let kdir = temp_kdir();
        let manager = ThemeManager::new(&kdir).expect("failed to create theme manager");
        assert!(manager.themes.contains_key(ThemeManager::DEFAULT_THEME_NAME));
        assert_eq!(
            manager.config.default_theme,
            ThemeManager::DEFAULT_THEME_NAME
        );
        // the files survive on disk for the next run
        assert!(kdir.exists("theme_manager/themes/default.json"));
        assert!(kdir.exists("theme_manager/theme_manager_config.json"));
    }

    #[test]
    fn saved_themes_load_on_the_next_run() {
        let kdir = temp_kdir();
        {
            let manager = ThemeManager::new(&kdir).expect("first run failed");
            let mut theme = Theme::default();
            theme.style.animation_time = 0.75;
            manager
                .themes_dir()
                .write("slow.json", serde_json::to_string_pretty(&theme).unwrap())
                .expect("failed to write theme");
        }
        let manager = ThemeManager::new(&kdir).expect("second run failed");
        assert!(manager.themes.contains_key("slow"));
        assert_eq!(manager.themes["slow"].style.animation_time, 0.75);
    }
}
