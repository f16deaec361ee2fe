use crate::config::load::SETTINGS_FILE;
use crate::config::types::{MAX_RECENT_SOURCES, UserSettings};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn save_settings(settings: &UserSettings) -> Result<()> {
    save_settings_to(settings, Path::new(SETTINGS_FILE))
}

pub fn save_settings_to(settings: &UserSettings, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;

    Ok(())
}

/// 更新最近使用的來源
/// 將新來源加入最前面，去重並限制數量
pub fn add_recent_source(settings: &mut UserSettings, source: &str) {
    settings.recent_sources.retain(|s| s != source);
    settings.recent_sources.insert(0, source.to_string());
    settings.recent_sources.truncate(MAX_RECENT_SOURCES);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_add_recent_source_dedups_and_truncates() {
        let mut settings = UserSettings::default();
        for i in 0..15 {
            add_recent_source(&mut settings, &format!("/videos/{i}.mp4"));
        }
        add_recent_source(&mut settings, "/videos/12.mp4");

        assert_eq!(settings.recent_sources.len(), MAX_RECENT_SOURCES);
        assert_eq!(settings.recent_sources[0], "/videos/12.mp4");
        assert_eq!(
            settings
                .recent_sources
                .iter()
                .filter(|s| *s == "/videos/12.mp4")
                .count(),
            1
        );
    }

    #[test]
    fn test_save_then_load_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut settings = UserSettings::default();
        settings.keyframe.blur_threshold = 33.5;
        settings.keyframe.min_scene_len = 7;
        save_settings_to(&settings, &path).unwrap();

        let loaded = Config::load_settings(&path).unwrap();
        assert!((loaded.keyframe.blur_threshold - 33.5).abs() < f64::EPSILON);
        assert_eq!(loaded.keyframe.min_scene_len, 7);
    }
}
