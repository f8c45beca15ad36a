pub mod binaries;
pub mod job_process;
pub mod job_supervisor;
