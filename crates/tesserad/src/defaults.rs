use camino::{Utf8Path, Utf8PathBuf};
use dirs::home_dir;

pub const DEFAULT_TESSERA_HOME: &str = ".tessera";

pub const DEFAULT_TOPIC: &str = "/tessera/ads";

pub const DEFAULT_BASE_TOKEN_RATE: f64 = 10.0;
pub const DEFAULT_GLOBAL_TOTAL_RATE: f64 = 100.0;
pub const DEFAULT_GLOBAL_BURST: u32 = 100;
pub const DEFAULT_LEVEL_COUNT: u32 = 4;

pub fn default_home_dir() -> Utf8PathBuf {
    home_dir()
        .as_deref()
        .and_then(Utf8Path::from_path)
        .map_or_else(Utf8PathBuf::default, |home| home.join(DEFAULT_TESSERA_HOME))
}
