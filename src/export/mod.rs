//! Plain-text rendering of a session and export to disk.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

use crate::session::SessionRecord;

/// Transcript as readable text: one speaker heading per block.
pub fn transcript_text(record: &SessionRecord) -> String {
    let mut out = String::new();
    for block in &record.transcript {
        out.push_str(&format!(
            "{} ({})\n{}\n\n",
            block.speaker_name, block.timestamp_iso, block.text
        ));
    }
    out.trim_end().to_string()
}

pub fn chat_text(record: &SessionRecord) -> String {
    let mut out = String::new();
    for block in &record.chat_messages {
        out.push_str(&format!(
            "{} ({})\n{}\n\n",
            block.sender_name, block.timestamp_iso, block.text
        ));
    }
    out.trim_end().to_string()
}

/// Full session as one text document.
pub fn session_text(record: &SessionRecord) -> String {
    let mut out = format!(
        "Title: {}\nStarted: {}\n",
        record.meeting_title, record.meeting_start_timestamp
    );
    if let Some(end) = &record.meeting_end_timestamp {
        out.push_str(&format!("Ended: {}\n", end));
    }
    let participants = record.participants();
    if !participants.is_empty() {
        out.push_str(&format!("Participants: {}\n", participants.join(", ")));
    }
    out.push_str("\n---- Transcript ----\n\n");
    let transcript = transcript_text(record);
    out.push_str(if transcript.is_empty() {
        "(no transcript captured)"
    } else {
        &transcript
    });
    out.push('\n');
    if !record.chat_messages.is_empty() {
        out.push_str("\n---- Chat ----\n\n");
        out.push_str(&chat_text(record));
        out.push('\n');
    }
    out
}

/// Write the session as a text file under `dir`, named after the title and
/// start time. Returns the written path.
pub async fn export_to_dir(record: &SessionRecord, dir: &PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .context("Failed to create export directory")?;
    let path = dir.join(format!(
        "{}-{}.txt",
        sanitize(&record.meeting_title),
        sanitize(&record.meeting_start_timestamp)
    ));
    fs::write(&path, session_text(record))
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!("Exported session to {:?}", path);
    Ok(path)
}

/// Keep file names portable.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
