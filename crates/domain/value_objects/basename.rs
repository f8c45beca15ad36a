use chrono::{DateTime, SecondsFormat, Utc};

/// Builds the channel-scoped identifier of one capture session:
/// `{login}_{started_at}_{session_id}` with `:` swapped for `_` so it is safe on every filesystem.
pub fn recording_basename(channel_login: &str, started_at: DateTime<Utc>, session_id: &str) -> String {
    let stamp = started_at
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace(':', "_");

    let raw = format!("{}_{}_{}", channel_login, stamp, session_id);
    sanitize(&raw)
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn capture_job_name(basename: &str) -> String {
    format!("capture_{}", basename)
}

pub fn remux_job_name(basename: &str) -> String {
    format!("remux_{}", basename)
}

pub fn chat_dump_job_name(basename: &str) -> String {
    format!("chatdump_{}", basename)
}
