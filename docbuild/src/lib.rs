pub mod config;
pub mod html;
pub mod render;
pub mod sync;
