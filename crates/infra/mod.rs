pub mod events;
pub mod filesystem;
pub mod media;
pub mod process;
