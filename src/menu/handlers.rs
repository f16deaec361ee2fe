use crate::component::KeyframeExtractor;
use crate::config::Config;
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use rust_i18n::t;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn run_keyframe_extractor(
    term: &Term,
    shutdown_signal: &Arc<AtomicBool>,
    config: &mut Config,
) -> Result<()> {
    // 上一次擷取的中斷不影響這一次
    shutdown_signal.store(false, Ordering::SeqCst);
    let mut extractor = KeyframeExtractor::new(config.clone(), Arc::clone(shutdown_signal));

    if let Err(e) = extractor.run() {
        eprintln!("{} {:#}", style(t!("common.error_prefix")).red().bold(), e);
    }

    // 最近使用的來源由擷取器更新
    config.settings.recent_sources = extractor.config().settings.recent_sources.clone();

    pause(term)?;
    Ok(())
}
