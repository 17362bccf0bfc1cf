pub mod config;
pub mod logger;
pub mod tempfiles;
pub(crate) mod tracking_toml;

pub use config::*;
pub use logger::{Colors, setup_logging};
pub use tempfiles::{discard_temp, prepare_output_path, rename_temp_to_final, temp_path_for};
pub use tracking_toml::RegionSpec;
