pub mod jobs;
pub mod recordings;
