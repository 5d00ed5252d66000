pub mod chat;
pub mod diagnose;
pub mod local_images;
pub mod notice;
pub mod render;
