pub mod load;
pub mod save;
pub mod types;

pub use types::{
    Config, ImageFormat, KeyframePolicy, KeyframeSettings, Language, MAX_RECENT_SOURCES,
    MediaTypeTable, UserSettings,
};
