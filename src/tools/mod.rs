mod ffprobe_info;
mod file_hasher;
mod path_validator;

pub use ffprobe_info::{VideoInfo, get_video_info};
pub use file_hasher::calculate_pixel_hash;
pub use path_validator::{ensure_directory_exists, validate_directory_exists};
