use std::fmt::Write as _;

use chrono::Local;
use crossterm::style::{Attribute, Color, ContentStyle};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::cli::chat::conversation_state::{ConversationState, Message, Role};
use crate::cli::chat::history::HistoryEntry;

const RULE: &str = "────────────────────";

/// Render server supplied markdown as terminal prose.
///
/// With `styled` unset the output is plain text, which is what tests and
/// non-interactive callers compare against.
pub fn render_markdown(text: &str, styled: bool) -> String {
    let mut writer = MarkdownWriter::new(styled);
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    for event in Parser::new_ext(text, options) {
        writer.event(event);
    }
    writer.finish()
}

#[derive(Default)]
struct MarkdownWriter {
    out: String,
    styled: bool,
    bold: usize,
    italic: usize,
    strike: usize,
    heading: bool,
    code_block: bool,
    lists: Vec<Option<u64>>,
    links: Vec<String>,
}

impl MarkdownWriter {
    fn new(styled: bool) -> Self {
        Self {
            styled,
            ..Self::default()
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) if self.code_block => {
                for line in text.lines() {
                    let line = format!("    {line}");
                    self.push_styled(&line, ContentStyle {
                        foreground_color: Some(Color::DarkGrey),
                        ..ContentStyle::default()
                    });
                    self.out.push('\n');
                }
            }
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                if self.styled {
                    self.push_styled(&code, ContentStyle {
                        foreground_color: Some(Color::Yellow),
                        ..ContentStyle::default()
                    });
                } else {
                    let _ = write!(self.out, "`{code}`");
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => self.out.push_str(&html),
            Event::SoftBreak | Event::HardBreak => {
                self.out.push('\n');
                self.indent();
            }
            Event::Rule => {
                self.ensure_newline();
                self.out.push_str(RULE);
                self.out.push_str("\n\n");
            }
            Event::TaskListMarker(done) => self.out.push_str(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { .. } => {
                self.ensure_blank_line();
                self.heading = true;
            }
            Tag::Paragraph if self.lists.is_empty() => self.ensure_blank_line(),
            Tag::CodeBlock(_) => {
                self.ensure_blank_line();
                self.code_block = true;
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.ensure_blank_line();
                }
                self.lists.push(start);
            }
            Tag::Item => {
                self.ensure_newline();
                let depth = self.lists.len().saturating_sub(1);
                self.out.push_str(&"  ".repeat(depth));
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.out.push_str(&marker);
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.links.push(dest_url.to_string()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) => {
                self.heading = false;
                self.out.push_str("\n\n");
            }
            TagEnd::Paragraph if self.lists.is_empty() => self.out.push_str("\n\n"),
            TagEnd::Paragraph => self.ensure_newline(),
            TagEnd::CodeBlock => {
                self.code_block = false;
                self.out.push('\n');
            }
            TagEnd::List(_) => {
                self.lists.pop();
                self.ensure_newline();
                if self.lists.is_empty() {
                    self.out.push('\n');
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = self.links.pop() {
                    let _ = write!(self.out, " ({url})");
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        let mut style = ContentStyle::default();
        if self.bold > 0 || self.heading {
            style.attributes.set(Attribute::Bold);
        }
        if self.heading {
            style.attributes.set(Attribute::Underlined);
        }
        if self.italic > 0 {
            style.attributes.set(Attribute::Italic);
        }
        if self.strike > 0 {
            style.attributes.set(Attribute::CrossedOut);
        }
        if !self.links.is_empty() {
            style.foreground_color = Some(Color::Blue);
        }
        self.push_styled(text, style);
    }

    fn push_styled(&mut self, text: &str, style: ContentStyle) {
        if self.styled {
            let _ = write!(self.out, "{}", style.apply(text));
        } else {
            self.out.push_str(text);
        }
    }

    /// Continuation lines inside list items line up with the item text.
    fn indent(&mut self) {
        if !self.lists.is_empty() {
            self.out.push_str(&"  ".repeat(self.lists.len()));
        }
    }

    fn ensure_newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn ensure_blank_line(&mut self) {
        if self.out.is_empty() {
            return;
        }
        self.ensure_newline();
        if !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        self.out.trim_end().to_string()
    }
}

fn styled_label(label: &str, color: Color, styled: bool) -> String {
    if !styled {
        return label.to_string();
    }
    let mut style = ContentStyle {
        foreground_color: Some(color),
        ..ContentStyle::default()
    };
    style.attributes.set(Attribute::Bold);
    style.apply(label).to_string()
}

/// Render one transcript entry: header, optional image line, body.
pub fn render_message(message: &Message, state: &ConversationState, styled: bool) -> String {
    let (author, color) = match message.role {
        Role::User => ("You", Color::Green),
        Role::Assistant => (message.agent_label.as_deref().unwrap_or("Assistant"), Color::Cyan),
    };
    let time = message.timestamp.with_timezone(&Local).format("%H:%M");

    let mut out = format!("{} · {}", styled_label(author, color, styled), time);

    if let Some(image_ref) = &message.image {
        match state.image(image_ref) {
            Some(blob) => {
                let _ = write!(
                    out,
                    "\n[image] {} · {} · {}",
                    blob.file_name(),
                    blob.mime(),
                    blob.display_size()
                );
            }
            None => out.push_str("\n[image unavailable]"),
        }
    }

    if !message.content.is_empty() {
        out.push('\n');
        match message.role {
            Role::User => out.push_str(&message.content),
            Role::Assistant => out.push_str(&render_markdown(&message.content, styled)),
        }
    }

    out
}

/// Render the history listing, newest user turn last.
pub fn render_history(entries: &[HistoryEntry<'_>], styled: bool) -> String {
    if entries.is_empty() {
        return "No history yet. Start a conversation to see your queries and replies here.".to_string();
    }

    let mut out = String::new();
    for (index, entry) in entries.iter().enumerate() {
        let time = entry.prompt.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let _ = writeln!(
            out,
            "{}. [{}] {}",
            index + 1,
            styled_label(entry.kind.label(), Color::Magenta, styled),
            time
        );
        if !entry.prompt.content.is_empty() {
            let _ = writeln!(out, "   Q: {}", entry.prompt.content);
        }
        match entry.reply {
            Some(reply) => {
                let _ = writeln!(out, "   A: {}", summarize(&reply.content));
            }
            None => out.push_str("   A: (no reply)\n"),
        }
    }
    out.trim_end().to_string()
}

/// First line of a reply, shortened for list display
fn summarize(text: &str) -> String {
    const LIMIT: usize = 120;
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first_line.chars().count() > LIMIT {
        let cut: String = first_line.chars().take(LIMIT).collect();
        format!("{cut}…")
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::attachment::tests::png;
    use crate::cli::chat::history::history;

    #[test]
    fn renders_lists_and_emphasis_as_plain_text() {
        let text = "## Tomato care\n\nWater **deeply** twice a week.\n\n- Mulch beds\n- Stake plants\n\n1. Prune\n2. Feed";
        let rendered = render_markdown(text, false);
        assert_eq!(
            rendered,
            "Tomato care\n\nWater deeply twice a week.\n\n• Mulch beds\n• Stake plants\n\n1. Prune\n2. Feed"
        );
    }

    #[test]
    fn renders_links_and_code() {
        let rendered = render_markdown("See [guide](https://example.org) and run `ph-test`.", false);
        assert_eq!(rendered, "See guide (https://example.org) and run `ph-test`.");
    }

    #[test]
    fn styled_output_carries_escape_codes() {
        let rendered = render_markdown("**bold**", true);
        assert!(rendered.contains("\u{1b}["));
        assert!(rendered.contains("bold"));
    }

    #[test]
    fn message_shows_image_details() {
        let mut state = ConversationState::new();
        state.append_image_message(png("leaf.png"));
        let rendered = render_message(&state.messages()[0], &state, false);
        assert!(rendered.starts_with("You · "));
        assert!(rendered.contains("[image] leaf.png · image/png"));
    }

    #[test]
    fn assistant_message_uses_agent_label() {
        let mut state = ConversationState::new();
        state.append_message(Role::Assistant, "*Healthy* leaf", Some("AgriGPT"));
        let rendered = render_message(&state.messages()[0], &state, false);
        assert!(rendered.starts_with("AgriGPT · "));
        assert!(rendered.ends_with("\nHealthy leaf"));
    }

    #[test]
    fn history_lists_unanswered_turns() {
        let mut state = ConversationState::new();
        state.append_message(Role::User, "pests on kale?", None);
        let rendered = render_history(&history(state.messages()), false);
        assert!(rendered.starts_with("1. [Text] "));
        assert!(rendered.contains("Q: pests on kale?"));
        assert!(rendered.ends_with("A: (no reply)"));
    }

    #[test]
    fn summarize_cuts_long_lines() {
        let long = "a".repeat(200);
        assert_eq!(summarize(&long).chars().count(), 121);
        assert_eq!(summarize("\n\nfirst\nsecond"), "first");
    }
}
