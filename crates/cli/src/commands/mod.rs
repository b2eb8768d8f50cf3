pub mod config;
pub mod render;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use render::{list_groups, render_group, RenderOptions};
