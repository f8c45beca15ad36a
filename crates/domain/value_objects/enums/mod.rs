pub mod job_statuses;
pub mod mute_statuses;
pub mod pipeline_states;
pub mod platforms;
pub mod recording_statuses;
