//! Turns ANSI-colored command output into styled ratatui spans.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

const ESC: char = '\u{1b}';

/// Splits `text` into spans, applying SGR escapes on top of `base`.
///
/// Other CSI sequences (cursor movement, erase) are dropped. A bare escape
/// not followed by `[` is dropped as well.
pub fn styled_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut style = base;
    let mut buffer = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != ESC {
            buffer.push(ch);
            continue;
        }
        if chars.peek() != Some(&'[') {
            continue;
        }
        chars.next();

        let mut params = String::new();
        let mut terminator = None;
        for next in chars.by_ref() {
            if ('\u{40}'..='\u{7e}').contains(&next) {
                terminator = Some(next);
                break;
            }
            params.push(next);
        }

        if terminator == Some('m') {
            if !buffer.is_empty() {
                spans.push(Span::styled(std::mem::take(&mut buffer), style));
            }
            style = apply_sgr(&params, style, base);
        }
    }

    if !buffer.is_empty() || spans.is_empty() {
        spans.push(Span::styled(buffer, style));
    }
    spans
}

fn apply_sgr(params: &str, mut style: Style, base: Style) -> Style {
    let codes: Vec<u16> = params
        .split(';')
        .map(|part| part.parse::<u16>().unwrap_or(0))
        .collect();

    let mut codes = codes.into_iter();
    while let Some(code) = codes.next() {
        style = match code {
            0 => base,
            1 => style.add_modifier(Modifier::BOLD),
            2 => style.add_modifier(Modifier::DIM),
            3 => style.add_modifier(Modifier::ITALIC),
            4 => style.add_modifier(Modifier::UNDERLINED),
            7 => style.add_modifier(Modifier::REVERSED),
            9 => style.add_modifier(Modifier::CROSSED_OUT),
            22 => style.remove_modifier(Modifier::BOLD | Modifier::DIM),
            23 => style.remove_modifier(Modifier::ITALIC),
            24 => style.remove_modifier(Modifier::UNDERLINED),
            27 => style.remove_modifier(Modifier::REVERSED),
            29 => style.remove_modifier(Modifier::CROSSED_OUT),
            30..=37 | 90..=97 => style.fg(basic_color(code)),
            39 => style.fg(base.fg.unwrap_or(Color::Reset)),
            40..=47 | 100..=107 => style.bg(basic_color(code - 10)),
            49 => style.bg(base.bg.unwrap_or(Color::Reset)),
            38 | 48 => match extended_color(&mut codes) {
                Some(color) if code == 38 => style.fg(color),
                Some(color) => style.bg(color),
                None => style,
            },
            _ => style,
        };
    }
    style
}

/// Reads the `5;n` or `2;r;g;b` tail of a 38/48 code.
fn extended_color(codes: &mut impl Iterator<Item = u16>) -> Option<Color> {
    let channel = |value: u16| value.min(u16::from(u8::MAX)) as u8;
    match codes.next()? {
        5 => codes.next().map(|index| Color::Indexed(channel(index))),
        2 => {
            let r = codes.next()?;
            let g = codes.next()?;
            let b = codes.next()?;
            Some(Color::Rgb(channel(r), channel(g), channel(b)))
        }
        _ => None,
    }
}

fn basic_color(code: u16) -> Color {
    match code {
        30 => Color::Black,
        31 => Color::Red,
        32 => Color::Green,
        33 => Color::Yellow,
        34 => Color::Blue,
        35 => Color::Magenta,
        36 => Color::Cyan,
        37 => Color::Gray,
        90 => Color::DarkGray,
        91 => Color::LightRed,
        92 => Color::LightGreen,
        93 => Color::LightYellow,
        94 => Color::LightBlue,
        95 => Color::LightMagenta,
        96 => Color::LightCyan,
        97 => Color::White,
        _ => Color::Reset,
    }
}
