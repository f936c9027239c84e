use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `$ <command line>` echo.
    Header,
    Stdout,
    Stderr,
    /// Terminal failure of a run.
    Failure,
    /// Plain text such as a query body.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub kind: LineKind,
    pub text: String,
}

/// Bounded scrollback for the output pane.
///
/// `scroll` counts lines back from the tail; zero follows new output. It
/// never exceeds the number of lines above the last rendered pane.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: VecDeque<OutputLine>,
    max_lines: usize,
    scroll: usize,
    view_rows: usize,
}

impl OutputBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            scroll: 0,
            view_rows: 1,
        }
    }

    pub fn push(&mut self, kind: LineKind, text: impl Into<String>) {
        if self.lines.len() == self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(OutputLine {
            kind,
            text: text.into(),
        });
        if self.scroll > 0 {
            // Keep a scrolled-back view pinned to the same lines.
            self.scroll = (self.scroll + 1).min(self.max_scroll());
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll = 0;
    }

    pub fn lines(&self) -> impl Iterator<Item = &OutputLine> {
        self.lines.iter()
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll());
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    /// Records how many rows the pane showed on the last draw.
    pub fn set_view_rows(&mut self, rows: usize) {
        self.view_rows = rows.max(1);
        self.scroll = self.scroll.min(self.max_scroll());
    }

    fn max_scroll(&self) -> usize {
        self.lines.len().saturating_sub(self.view_rows)
    }

    /// Lines that fit in a pane `height` rows tall at the current scroll.
    pub fn visible(&self, height: usize) -> impl Iterator<Item = &OutputLine> {
        let height = height.max(1);
        let max_offset = self.lines.len().saturating_sub(height);
        let offset = self.scroll.min(max_offset);
        let start = self.lines.len().saturating_sub(height + offset);
        self.lines.iter().skip(start).take(height)
    }
}
