use crate::config::save::save_settings;
use crate::config::types::{Config, ImageFormat, KeyframePolicy, KeyframeSettings, Language};
use crate::menu::handlers::run_keyframe_extractor;
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use rust_i18n::t;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub fn show_main_menu(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style(t!("main_menu.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let options = vec![
        t!("main_menu.opt_extract"),
        t!("main_menu.opt_settings"),
        t!("main_menu.exit"),
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(t!("main_menu.prompt"))
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => {
            run_keyframe_extractor(term, shutdown_signal, config)?;
            Ok(true)
        }
        Some(1) => {
            show_settings_menu(term, config)?;
            Ok(true)
        }
        Some(2) | None => Ok(false), // ESC pressed - exit
        _ => unreachable!(),
    }
}

/// 設定選單
fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style(t!("settings.title")).cyan().bold());
        println!("{}", style(t!("common.esc_hint")).dim());

        let options = vec![
            t!("settings.opt_keyframe"),
            t!("settings.opt_language"),
            t!("settings.back"),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("settings.prompt"))
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        match selection {
            Some(0) => show_keyframe_settings_menu(term, config)?,
            Some(1) => show_language_menu(term, config)?,
            Some(2) | None => break, // ESC or back
            _ => unreachable!(),
        }
    }

    Ok(())
}

/// 可編輯的擷取設定欄位
#[derive(Debug, Clone, Copy)]
enum KeyframeField {
    BlurThreshold,
    ContentThreshold,
    MinSceneLen,
    FrameCap,
    OutputDir,
    ImageFormat,
    KeyframePolicy,
    SaveSceneChanges,
    SaveBlurFrames,
    VerifyWrites,
    WriteReport,
    CameraSize,
}

impl KeyframeField {
    const ALL: [Self; 12] = [
        Self::BlurThreshold,
        Self::ContentThreshold,
        Self::MinSceneLen,
        Self::FrameCap,
        Self::OutputDir,
        Self::ImageFormat,
        Self::KeyframePolicy,
        Self::SaveSceneChanges,
        Self::SaveBlurFrames,
        Self::VerifyWrites,
        Self::WriteReport,
        Self::CameraSize,
    ];

    fn label(self) -> String {
        let key = match self {
            Self::BlurThreshold => "settings.keyframe.blur_threshold",
            Self::ContentThreshold => "settings.keyframe.content_threshold",
            Self::MinSceneLen => "settings.keyframe.min_scene_len",
            Self::FrameCap => "settings.keyframe.frame_cap",
            Self::OutputDir => "settings.keyframe.output_dir",
            Self::ImageFormat => "settings.keyframe.image_format",
            Self::KeyframePolicy => "settings.keyframe.keyframe_policy",
            Self::SaveSceneChanges => "settings.keyframe.save_scene_changes",
            Self::SaveBlurFrames => "settings.keyframe.save_blur_frames",
            Self::VerifyWrites => "settings.keyframe.verify_writes",
            Self::WriteReport => "settings.keyframe.write_report",
            Self::CameraSize => "settings.keyframe.camera_size",
        };
        t!(key).to_string()
    }

    fn current_value(self, settings: &KeyframeSettings) -> String {
        match self {
            Self::BlurThreshold => settings.blur_threshold.to_string(),
            Self::ContentThreshold => settings.content_threshold.to_string(),
            Self::MinSceneLen => settings.min_scene_len.to_string(),
            Self::FrameCap => settings.frame_cap.to_string(),
            Self::OutputDir => settings.output_dir.display().to_string(),
            Self::ImageFormat => settings.image_format.to_string(),
            Self::KeyframePolicy => settings.keyframe_policy.to_string(),
            Self::SaveSceneChanges => settings.save_scene_changes.to_string(),
            Self::SaveBlurFrames => settings.save_blur_frames.to_string(),
            Self::VerifyWrites => settings.verify_writes.to_string(),
            Self::WriteReport => settings.write_report.to_string(),
            Self::CameraSize => format!("{}x{}", settings.camera_width, settings.camera_height),
        }
    }
}

/// 關鍵幀擷取設定選單
fn show_keyframe_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style(t!("settings.keyframe.title")).cyan().bold());
        println!("{}", style(t!("common.esc_hint")).dim());

        let settings = &config.settings.keyframe;
        let mut items: Vec<String> = KeyframeField::ALL
            .iter()
            .map(|field| format!("{}: {}", field.label(), field.current_value(settings)))
            .collect();
        items.push(t!("settings.back").to_string());

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("settings.keyframe.prompt"))
            .items(&items)
            .default(0)
            .interact_on_opt(term)?;

        let Some(index) = selection else {
            break;
        };
        let Some(&field) = KeyframeField::ALL.get(index) else {
            break;
        };

        // ESC pressed - keep current value
        let Some(edited) = edit_field(term, field, &config.settings.keyframe)? else {
            continue;
        };

        if let Err(e) = edited.validate() {
            println!("\n{} {e}", style(t!("settings.invalid")).red());
            std::thread::sleep(std::time::Duration::from_secs(2));
            continue;
        }

        config.settings.keyframe = edited;
        save_settings(&config.settings)?;
        println!(
            "\n{} {}",
            style(t!("settings.saved")).green(),
            field.current_value(&config.settings.keyframe)
        );
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    Ok(())
}

/// 回傳修改後的設定，`None` 代表取消
fn edit_field(
    term: &Term,
    field: KeyframeField,
    current: &KeyframeSettings,
) -> Result<Option<KeyframeSettings>> {
    let mut edited = current.clone();
    let prompt = field.label();
    let theme = ColorfulTheme::default();

    match field {
        KeyframeField::BlurThreshold => {
            edited.blur_threshold = Input::with_theme(&theme)
                .with_prompt(prompt)
                .default(current.blur_threshold)
                .interact_text_on(term)?;
        }
        KeyframeField::ContentThreshold => {
            edited.content_threshold = Input::with_theme(&theme)
                .with_prompt(prompt)
                .default(current.content_threshold)
                .interact_text_on(term)?;
        }
        KeyframeField::MinSceneLen => {
            edited.min_scene_len = Input::with_theme(&theme)
                .with_prompt(prompt)
                .default(current.min_scene_len)
                .interact_text_on(term)?;
        }
        KeyframeField::FrameCap => {
            edited.frame_cap = Input::with_theme(&theme)
                .with_prompt(prompt)
                .default(current.frame_cap)
                .interact_text_on(term)?;
        }
        KeyframeField::OutputDir => {
            let path: String = Input::with_theme(&theme)
                .with_prompt(prompt)
                .default(current.output_dir.display().to_string())
                .interact_text_on(term)?;
            edited.output_dir = PathBuf::from(path.trim());
        }
        KeyframeField::ImageFormat => {
            let formats = [ImageFormat::Png, ImageFormat::Jpg];
            let Some(index) = select_from(term, &prompt, &formats, current.image_format)? else {
                return Ok(None);
            };
            edited.image_format = formats[index];
        }
        KeyframeField::KeyframePolicy => {
            let policies = [KeyframePolicy::ContinueToCap, KeyframePolicy::StopAtNextCut];
            let Some(index) = select_from(term, &prompt, &policies, current.keyframe_policy)? else {
                return Ok(None);
            };
            edited.keyframe_policy = policies[index];
        }
        KeyframeField::SaveSceneChanges => {
            let Some(value) = confirm(term, &prompt, current.save_scene_changes)? else {
                return Ok(None);
            };
            edited.save_scene_changes = value;
        }
        KeyframeField::SaveBlurFrames => {
            let Some(value) = confirm(term, &prompt, current.save_blur_frames)? else {
                return Ok(None);
            };
            edited.save_blur_frames = value;
        }
        KeyframeField::VerifyWrites => {
            let Some(value) = confirm(term, &prompt, current.verify_writes)? else {
                return Ok(None);
            };
            edited.verify_writes = value;
        }
        KeyframeField::WriteReport => {
            let Some(value) = confirm(term, &prompt, current.write_report)? else {
                return Ok(None);
            };
            edited.write_report = value;
        }
        KeyframeField::CameraSize => {
            edited.camera_width = Input::with_theme(&theme)
                .with_prompt(t!("settings.keyframe.camera_width"))
                .default(current.camera_width)
                .interact_text_on(term)?;
            edited.camera_height = Input::with_theme(&theme)
                .with_prompt(t!("settings.keyframe.camera_height"))
                .default(current.camera_height)
                .interact_text_on(term)?;
        }
    }

    Ok(Some(edited))
}

fn select_from<T: ToString + PartialEq + Copy>(
    term: &Term,
    prompt: &str,
    choices: &[T],
    current: T,
) -> Result<Option<usize>> {
    let items: Vec<String> = choices.iter().map(ToString::to_string).collect();
    let default_index = choices.iter().position(|&c| c == current).unwrap_or(0);

    Ok(Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&items)
        .default(default_index)
        .interact_on_opt(term)?)
}

fn confirm(term: &Term, prompt: &str, current: bool) -> Result<Option<bool>> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(current)
        .interact_on_opt(term)?)
}

/// 語言設定選單
fn show_language_menu(term: &Term, config: &mut Config) -> Result<()> {
    term.clear_screen()?;

    println!("{}", style(t!("settings.language.title")).cyan().bold());
    println!("{}", style(t!("common.esc_hint")).dim());

    let languages = [Language::EnUs, Language::ZhTw];

    let Some(selection) = select_from(
        term,
        &t!("settings.language.prompt"),
        &languages,
        config.settings.language,
    )?
    else {
        return Ok(());
    };

    let selected_lang = languages[selection];

    if selected_lang != config.settings.language {
        config.settings.language = selected_lang;
        rust_i18n::set_locale(selected_lang.as_str());
        save_settings(&config.settings)?;
        println!(
            "\n{} {}",
            style(t!("settings.saved")).green(),
            selected_lang
        );
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    Ok(())
}
