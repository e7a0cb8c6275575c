pub mod replay;
pub mod show_config;

pub use replay::{ReplayOptions, handle_replay};
pub use show_config::handle_show_config;
