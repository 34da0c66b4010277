//! Output rendering for conversations.
//!
//! This module provides the view trait a conversation drives during a turn and a plain-text
//! terminal implementation of it.

use std::io::{self, Write};

use crate::reply::extract_display_text;
use crate::{ChatMessage, ChatRole};

/// ANSI escape code for bold text.
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code ending bold text.
const ANSI_BOLD_OFF: &str = "\x1b[22m";

/// ANSI escape code for italic text.
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code ending italic text.
const ANSI_ITALIC_OFF: &str = "\x1b[23m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the NPC's name).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the player's name).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for dim text (used for info).
const ANSI_DIM: &str = "\x1b[2m";

/// What a conversation needs from its user interface.
pub trait ConversationView {
    /// The history changed; show it.  Called in order, once per applied result.
    fn refresh(&mut self, history: &[ChatMessage]);

    /// Allow or block player input.
    fn set_input_enabled(&mut self, enabled: bool);

    /// Print an error message.
    fn print_error(&mut self, message: &str);

    /// Print an informational message.
    fn print_info(&mut self, message: &str);
}

/// Turns `**bold**` and `*italic*` markers into ANSI styling, one fragment at a time.
///
/// A `*` at the end of a fragment is held back until the next fragment shows whether it opens
/// bold or italic.
#[derive(Debug, Default)]
struct MarkdownStyler {
    bold: bool,
    italic: bool,
    pending_star: bool,
}

impl MarkdownStyler {
    fn push(&mut self, text: &str, out: &mut String) {
        for c in text.chars() {
            if std::mem::take(&mut self.pending_star) {
                if c == '*' {
                    self.bold = !self.bold;
                    out.push_str(if self.bold { ANSI_BOLD } else { ANSI_BOLD_OFF });
                    continue;
                }
                self.toggle_italic(out);
            }
            if c == '*' {
                self.pending_star = true;
            } else {
                out.push(c);
            }
        }
    }

    fn toggle_italic(&mut self, out: &mut String) {
        self.italic = !self.italic;
        out.push_str(if self.italic {
            ANSI_ITALIC
        } else {
            ANSI_ITALIC_OFF
        });
    }

    fn finish(&mut self, out: &mut String) {
        if std::mem::take(&mut self.pending_star) {
            if self.italic {
                self.toggle_italic(out);
            } else {
                out.push('*');
            }
        }
        if self.bold || self.italic {
            out.push_str(ANSI_RESET);
        }
        *self = Self::default();
    }
}

/// The message currently being written, which may still grow.
#[derive(Debug)]
struct OpenMessage {
    role: ChatRole,
    shown: String,
}

/// Plain text renderer with optional ANSI styling.
///
/// Messages are written as they grow.  The leading system message (the NPC's backstory) and the
/// player's own messages are not echoed; the line editor already shows what the player typed.
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    use_color: bool,
    npc_name: String,
    committed: usize,
    seen: usize,
    open: Option<OpenMessage>,
    styler: MarkdownStyler,
    input_enabled: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(Box::new(io::stdout()), use_color)
    }

    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: Box<dyn Write + Send>, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            npc_name: "NPC".to_string(),
            committed: 0,
            seen: 0,
            open: None,
            styler: MarkdownStyler::default(),
            input_enabled: true,
        }
    }

    /// Label the NPC's replies with `name`.
    pub fn with_npc_name(mut self, name: impl Into<String>) -> Self {
        self.npc_name = name.into();
        self
    }

    /// Whether player input is currently allowed.
    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn header(&self, role: ChatRole) -> String {
        let (color, label) = match role {
            ChatRole::Assistant => (ANSI_CYAN, self.npc_name.as_str()),
            ChatRole::User => (ANSI_GREEN, "You"),
            ChatRole::System => (ANSI_RED, "!"),
        };
        if self.use_color {
            format!("{color}{label}:{ANSI_RESET} ")
        } else {
            format!("{label}: ")
        }
    }

    fn styled(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        if self.use_color {
            self.styler.push(text, &mut out);
        } else {
            out.push_str(text);
        }
        out
    }

    /// End the open message, if any, with a newline.
    fn close(&mut self) {
        if self.open.take().is_some() {
            let mut tail = String::new();
            if self.use_color {
                self.styler.finish(&mut tail);
            }
            tail.push('\n');
            self.write(&tail);
        }
    }

    /// Bring the open message up to date with `role` and `text`.
    fn update(&mut self, role: ChatRole, text: &str) {
        let continued = self
            .open
            .as_ref()
            .filter(|open| open.role == role && text.starts_with(&open.shown))
            .map(|open| text[open.shown.len()..].to_string());
        let delta = match continued {
            Some(delta) => delta,
            None => {
                self.close();
                let header = self.header(role);
                self.write(&header);
                self.open = Some(OpenMessage {
                    role,
                    shown: String::new(),
                });
                text.to_string()
            }
        };
        if !delta.is_empty() {
            let styled = self.styled(&delta);
            self.write(&styled);
        }
        if let Some(open) = self.open.as_mut() {
            open.shown = text.to_string();
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn display_text(message: &ChatMessage) -> String {
    match message.role {
        ChatRole::Assistant => extract_display_text(&message.content),
        ChatRole::User | ChatRole::System => message.content.clone(),
    }
}

fn is_shown(idx: usize, message: &ChatMessage) -> bool {
    match message.role {
        ChatRole::User => false,
        ChatRole::System => idx != 0,
        ChatRole::Assistant => true,
    }
}

impl ConversationView for PlainTextRenderer {
    fn refresh(&mut self, history: &[ChatMessage]) {
        if history.len() < self.committed {
            // The conversation was reset.
            self.close();
            self.committed = 0;
        }
        let last = history.len().saturating_sub(1);
        for (idx, message) in history.iter().enumerate().skip(self.committed) {
            if is_shown(idx, message) {
                let text = display_text(message);
                self.update(message.role, &text);
            }
            if idx < last {
                self.close();
                self.committed = idx + 1;
            }
        }
        self.seen = history.len();
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        if enabled {
            // The turn is over; everything shown so far is final.
            self.close();
            self.committed = self.seen;
        }
        self.input_enabled = enabled;
    }

    fn print_error(&mut self, message: &str) {
        self.close();
        let line = if self.use_color {
            format!("{ANSI_RED}Error:{ANSI_RESET} {message}\n")
        } else {
            format!("Error: {message}\n")
        };
        self.write(&line);
    }

    fn print_info(&mut self, message: &str) {
        self.close();
        let line = if self.use_color {
            format!("{ANSI_DIM}{message}{ANSI_RESET}\n")
        } else {
            format!("{message}\n")
        };
        self.write(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn renderer(use_color: bool) -> (PlainTextRenderer, Capture) {
        let capture = Capture::default();
        let renderer = PlainTextRenderer::with_writer(Box::new(capture.clone()), use_color)
            .with_npc_name("Mira");
        (renderer, capture)
    }

    fn style(text: &str) -> String {
        let mut styler = MarkdownStyler::default();
        let mut out = String::new();
        styler.push(text, &mut out);
        styler.finish(&mut out);
        out
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
        assert!(renderer.input_enabled());
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn markdown_markers_become_ansi() {
        assert_eq!(
            style("a **b** c"),
            format!("a {ANSI_BOLD}b{ANSI_BOLD_OFF} c")
        );
        assert_eq!(
            style("a *b* c"),
            format!("a {ANSI_ITALIC}b{ANSI_ITALIC_OFF} c")
        );
        assert_eq!(style("5 * 3"), format!("5 {ANSI_ITALIC} 3{ANSI_RESET}"));
        assert_eq!(style("trailing *"), "trailing *");
    }

    #[test]
    fn markdown_split_across_fragments() {
        let mut styler = MarkdownStyler::default();
        let mut out = String::new();
        styler.push("so *", &mut out);
        styler.push("*very** sure", &mut out);
        styler.finish(&mut out);
        assert_eq!(out, format!("so {ANSI_BOLD}very{ANSI_BOLD_OFF} sure"));
    }

    #[test]
    fn streams_reply_deltas_without_repeating() {
        let (mut renderer, capture) = renderer(false);
        let mut history = vec![
            ChatMessage::system("You are Mira."),
            ChatMessage::user("Hi"),
            ChatMessage::assistant(""),
        ];
        renderer.set_input_enabled(false);
        renderer.refresh(&history);
        history[2].content = r#"{"message":"Ahoy"#.to_string();
        renderer.refresh(&history);
        history[2].content = r#"{"message":"Ahoy there","signal":null}"#.to_string();
        renderer.refresh(&history);
        renderer.set_input_enabled(true);
        assert_eq!(capture.text(), "Mira: Ahoy there\n");
    }

    #[test]
    fn failure_replaces_the_open_reply() {
        let (mut renderer, capture) = renderer(false);
        let mut history = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Ah")];
        renderer.refresh(&history);
        history[1] = ChatMessage::system("Error: request aborted");
        renderer.refresh(&history);
        renderer.set_input_enabled(true);
        assert_eq!(capture.text(), "Mira: Ah\n!: Error: request aborted\n");
    }

    #[test]
    fn second_turn_continues_after_the_first() {
        let (mut renderer, capture) = renderer(false);
        let mut history = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello")];
        renderer.refresh(&history);
        renderer.set_input_enabled(true);
        history.push(ChatMessage::user("Bye"));
        history.push(ChatMessage::assistant("Farewell"));
        renderer.refresh(&history);
        renderer.set_input_enabled(true);
        assert_eq!(capture.text(), "Mira: Hello\nMira: Farewell\n");
    }

    #[test]
    fn reset_starts_over() {
        let (mut renderer, capture) = renderer(false);
        renderer.refresh(&[
            ChatMessage::system("You are Mira."),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::user("More"),
            ChatMessage::assistant("Sure"),
        ]);
        renderer.refresh(&[ChatMessage::system("You are Mira.")]);
        renderer.refresh(&[
            ChatMessage::system("You are Mira."),
            ChatMessage::user("Again"),
            ChatMessage::assistant("Welcome back"),
        ]);
        renderer.set_input_enabled(true);
        assert_eq!(capture.text(), "Mira: Hello\nMira: Sure\nMira: Welcome back\n");
    }

    #[test]
    fn colored_output_styles_names_and_markdown() {
        let (mut renderer, capture) = renderer(true);
        renderer.refresh(&[ChatMessage::user("Hi"), ChatMessage::assistant("**Hello**")]);
        renderer.set_input_enabled(true);
        renderer.print_error("boom");
        let text = capture.text();
        assert!(text.starts_with(&format!("{ANSI_CYAN}Mira:{ANSI_RESET} {ANSI_BOLD}Hello")));
        assert!(text.contains(&format!("{ANSI_RED}Error:{ANSI_RESET} boom\n")));
    }
}
