use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use unicode_width::UnicodeWidthStr;

/// Single-buffer text field with a character cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    value: String,
    cursor: usize,
}

impl TextInput {
    pub fn with_value(value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Cursor position in characters.
    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    pub fn insert(&mut self, ch: char) {
        insert_char_at(&mut self.value, self.cursor, ch);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor > 0 && remove_char_at(&mut self.value, self.cursor - 1) {
            self.cursor -= 1;
            return true;
        }
        false
    }

    pub fn delete(&mut self) -> bool {
        remove_char_at(&mut self.value, self.cursor)
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        if self.cursor < self.value.chars().count() {
            self.cursor += 1;
        }
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    /// Applies an editing key. Returns true when the text changed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Left => self.left(),
            KeyCode::Right => self.right(),
            KeyCode::Home => self.home(),
            KeyCode::End => self.end(),
            KeyCode::Backspace => return self.backspace(),
            KeyCode::Delete => return self.delete(),
            KeyCode::Char(ch) if is_plain(key.modifiers) => {
                self.insert(ch);
                return true;
            }
            _ => {}
        }
        false
    }

    /// Line and display column of the cursor, counting `\n` as a line break.
    /// Wide characters take two columns.
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let before: String = self.value.chars().take(self.cursor).collect();
        let line = before.matches('\n').count();
        let col = before
            .rsplit('\n')
            .next()
            .map(UnicodeWidthStr::width)
            .unwrap_or_default();
        (line, col)
    }
}

pub fn is_plain(modifiers: KeyModifiers) -> bool {
    modifiers.is_empty() || modifiers == KeyModifiers::SHIFT
}

fn insert_char_at(value: &mut String, char_index: usize, ch: char) {
    let byte_index = byte_index_for_char(value, char_index);
    value.insert(byte_index, ch);
}

fn remove_char_at(value: &mut String, char_index: usize) -> bool {
    let start = byte_index_for_char(value, char_index);
    if start >= value.len() {
        return false;
    }
    let end = byte_index_for_char(value, char_index + 1);
    value.replace_range(start..end, "");
    true
}

fn byte_index_for_char(value: &str, char_index: usize) -> usize {
    if char_index == 0 {
        return 0;
    }
    value
        .char_indices()
        .nth(char_index)
        .map(|(index, _)| index)
        .unwrap_or(value.len())
}
