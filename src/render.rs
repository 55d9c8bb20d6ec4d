//! Row rendering for the chat panel.
//!
//! Rows are plain view models so any host can draw them; `render_line` is
//! the terminal drawing used by the binary.

use crate::state::chat::{Message, PanelNotice};

const BOLD: &str = "\x1b[1m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
}

/// Whether a row was written by the viewing user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowStyle {
    Mine,
    Other,
}

impl RowStyle {
    #[must_use]
    pub fn class(self) -> &'static str {
        match self {
            Self::Mine => "my-msg",
            Self::Other => "other-msg",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRow {
    pub key: String,
    pub alignment: Alignment,
    pub style: RowStyle,
    /// Bold sender label; `None` for system messages.
    pub label: Option<String>,
    pub content: String,
}

#[must_use]
pub fn message_row(message: &Message, user_id: &str) -> MessageRow {
    let mine = message.sender_id == user_id;
    MessageRow {
        key: message.id.clone(),
        alignment: if mine { Alignment::Right } else { Alignment::Left },
        style: if mine { RowStyle::Mine } else { RowStyle::Other },
        label: (!message.sender.is_empty()).then(|| message.sender.clone()),
        content: message.content.clone(),
    }
}

#[must_use]
pub fn rows(messages: &[Message], user_id: &str) -> Vec<MessageRow> {
    messages.iter().map(|m| message_row(m, user_id)).collect()
}

/// Draw one row for a terminal of `width` columns.
#[must_use]
pub fn render_line(row: &MessageRow, width: usize) -> String {
    let (text, visible) = match &row.label {
        Some(label) => (
            format!("{BOLD}{label}: {RESET}{}", row.content),
            display_width(label) + 2 + display_width(&row.content),
        ),
        None => (row.content.clone(), display_width(&row.content)),
    };

    match row.alignment {
        Alignment::Left => text,
        Alignment::Right => format!("{}{text}", " ".repeat(width.saturating_sub(visible))),
    }
}

/// Terminal columns taken by `s`. Emoji pictographs (the owner marker among
/// them) and CJK ideographs take two columns; everything else takes one.
/// Combining marks and zero-width joiners are not special-cased.
#[must_use]
pub fn display_width(s: &str) -> usize {
    s.chars().map(|c| if is_wide(c) { 2 } else { 1 }).sum()
}

fn is_wide(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF | 0xFF00..=0xFF60 | 0x1F300..=0x1FAFF
    )
}

/// Draw an inline notice.
#[must_use]
pub fn render_notice(notice: &PanelNotice) -> String {
    format!("{YELLOW}! {notice}{RESET}")
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
