//! Plain-text rendering of session updates

use std::io::{self, Write};

use colloquy_core::{
    Attachment, GroundingMetadata, Message, MessageState, Participant, RequestOutcome,
    SessionUpdate,
};

const ASSISTANT_PREFIX: &str = "assistant: ";

/// Render one update as it arrives
///
/// User messages are not echoed; the user just typed them.
pub fn update(out: &mut impl Write, update: &SessionUpdate) -> io::Result<()> {
    match update {
        SessionUpdate::MessageAdded { message } if message.participant == Participant::Assistant => {
            write!(out, "{ASSISTANT_PREFIX}")?;
        }
        SessionUpdate::Delta { text, .. } => write!(out, "{text}")?,
        SessionUpdate::ContentSet { content, .. } => {
            write!(out, "{}", content.as_deref().unwrap_or(""))?;
        }
        SessionUpdate::MessageState { state, .. } => match state {
            MessageState::Complete => writeln!(out)?,
            MessageState::Failed(error) => writeln!(out, "\n[error: {error}]")?,
            MessageState::Pending | MessageState::Streaming => {}
        },
        SessionUpdate::Grounding { grounding, .. } => sources(out, grounding)?,
        SessionUpdate::RequestFinished {
            outcome: RequestOutcome::Cancelled,
            ..
        } => writeln!(out, "\n[stopped]")?,
        SessionUpdate::AttachmentsChanged { count } if *count > 0 => {
            writeln!(out, "[{count} attachment(s) queued]")?;
        }
        SessionUpdate::Cleared => writeln!(out, "[new chat]")?,
        _ => {}
    }
    out.flush()
}

fn sources(out: &mut impl Write, grounding: &GroundingMetadata) -> io::Result<()> {
    if grounding.sources.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nSources:")?;
    for source in &grounding.sources {
        match source.title {
            Some(ref title) => writeln!(out, "  - {title} <{}>", source.uri)?,
            None => writeln!(out, "  - <{}>", source.uri)?,
        }
    }
    Ok(())
}

/// Render the whole conversation
pub fn history(out: &mut impl Write, messages: &[Message]) -> io::Result<()> {
    if messages.is_empty() {
        return writeln!(out, "(no messages)");
    }
    for message in messages {
        let who = match message.participant {
            Participant::User => "you",
            Participant::Assistant => "assistant",
        };
        let marker = match message.state {
            MessageState::Pending | MessageState::Streaming => " (in progress)",
            MessageState::Failed(_) => " (failed)",
            MessageState::Complete => "",
        };
        writeln!(out, "{who}{marker}: {}", message.text())?;
        for attachment in &message.attachments {
            writeln!(out, "    [{}] {}", attachment.mime_type, attachment.display_name)?;
        }
    }
    Ok(())
}

/// Render the pending attachment list
pub fn attachments(out: &mut impl Write, pending: &[Attachment]) -> io::Result<()> {
    if pending.is_empty() {
        return writeln!(out, "(no attachments queued)");
    }
    for attachment in pending {
        let short_id: String = attachment.id.0.chars().take(8).collect();
        writeln!(
            out,
            "  {}  {} ({}, {} bytes)",
            short_id,
            attachment.display_name,
            attachment.mime_type,
            attachment.size()
        )?;
    }
    Ok(())
}
