use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph};
use unicode_width::UnicodeWidthStr;

use crate::ansi;
use crate::app::{AppState, FormField, FormState, Mode};
use crate::config::Theme;
use crate::model::ItemKind;
use crate::output::{LineKind, OutputLine};

const SEARCH_LABEL: &str = "Search: ";
const PARAM_LABEL: &str = "Params: ";
const MAX_LIST_ROWS: u16 = 12;

/// Renders one frame and returns the number of output rows it showed.
pub fn draw_ui(frame: &mut Frame, app: &AppState, theme: &Theme) -> usize {
    let list_rows = (app.visible_items().count() as u16).clamp(1, MAX_LIST_ROWS);
    let prompt_rows = match app.mode() {
        Mode::Delete(_) | Mode::Param(_) => 2,
        _ => 0,
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(list_rows + 2),
            Constraint::Length(prompt_rows),
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_tabs(frame, app, theme, chunks[0]);
    draw_search_bar(frame, app, theme, chunks[1]);
    draw_items(frame, app, theme, chunks[2]);
    draw_prompt(frame, app, theme, chunks[3]);
    draw_output(frame, app, theme, chunks[4]);
    draw_status(frame, app, theme, chunks[5]);
    draw_help_bar(frame, app, theme, chunks[6]);

    match app.mode() {
        Mode::Normal => {
            let (_, col) = app.search().cursor_line_col();
            let x = chunks[1]
                .x
                .saturating_add((SEARCH_LABEL.width() + col) as u16);
            frame.set_cursor_position((x, chunks[1].y));
        }
        Mode::Param(state) => {
            let (_, col) = state.input.cursor_line_col();
            let x = chunks[3]
                .x
                .saturating_add((PARAM_LABEL.width() + col) as u16);
            frame.set_cursor_position((x, chunks[3].y));
        }
        Mode::Add(form) | Mode::Edit(form) => draw_form_popup(frame, form, theme),
        Mode::Delete(_) => {}
    }

    output_rows(chunks[4])
}

fn output_rows(area: Rect) -> usize {
    area.height.saturating_sub(2) as usize
}

fn draw_tabs(frame: &mut Frame, app: &AppState, theme: &Theme, area: Rect) {
    let tab = |kind: ItemKind, label: &'static str| {
        if app.tab() == kind {
            Span::styled(
                format!("[{label}]"),
                Style::default()
                    .fg(theme.primary)
                    .add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled(format!(" {label} "), Style::default().fg(theme.muted))
        }
    };
    let line = Line::from(vec![
        Span::styled(
            "cmdbox  ",
            Style::default()
                .fg(theme.primary)
                .add_modifier(Modifier::BOLD),
        ),
        tab(ItemKind::Command, "Bash"),
        Span::raw(" "),
        tab(ItemKind::Query, "SQL"),
        Span::styled("  (tab to switch)", Style::default().fg(theme.secondary)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_search_bar(frame: &mut Frame, app: &AppState, theme: &Theme, area: Rect) {
    let line = Line::from(vec![
        Span::styled(SEARCH_LABEL, Style::default().fg(theme.accent)),
        Span::styled(app.search().value().to_string(), Style::default().fg(theme.text)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_items(frame: &mut Frame, app: &AppState, theme: &Theme, area: Rect) {
    let noun = match app.tab() {
        ItemKind::Command => "Commands",
        ItemKind::Query => "Queries",
    };
    let shown = app.visible_items().count();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("{noun} ({shown}/{})", app.total_items()))
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.secondary));

    if shown == 0 {
        let message = if app.total_items() == 0 {
            format!("No {} found. Press 'A' to add one.", noun.to_lowercase())
        } else {
            format!("No matching {}", noun.to_lowercase())
        };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(theme.muted))
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem<'_>> = app
        .visible_items()
        .map(|item| {
            let mut spans = vec![
                Span::styled(item.name.clone(), Style::default().fg(theme.text)),
                Span::styled(
                    format!("  {}", item.preview()),
                    Style::default().fg(theme.muted),
                ),
            ];
            if !item.description.is_empty() {
                spans.push(Span::styled(
                    format!(" | {}", item.description),
                    Style::default().fg(theme.secondary),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let mut list_state = ListState::default();
    list_state.select(Some(app.selected()));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .fg(theme.primary)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_prompt(frame: &mut Frame, app: &AppState, theme: &Theme, area: Rect) {
    let lines = match app.mode() {
        Mode::Delete(state) => vec![Line::from(Span::styled(
            format!("Delete '{}'? (y/n)", state.name),
            Style::default()
                .fg(theme.warning)
                .add_modifier(Modifier::BOLD),
        ))],
        Mode::Param(state) => vec![
            Line::from(vec![
                Span::styled(PARAM_LABEL, Style::default().fg(theme.accent)),
                Span::styled(
                    state.input.value().to_string(),
                    Style::default().fg(theme.text),
                ),
            ]),
            Line::from(Span::styled(
                format!(
                    "  {}: edit values inline, enter to run, esc to cancel",
                    state.item_name
                ),
                Style::default().fg(theme.muted),
            )),
        ],
        _ => return,
    };
    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_output(frame: &mut Frame, app: &AppState, theme: &Theme, area: Rect) {
    let visible = output_rows(area);
    let items: Vec<ListItem<'_>> = app
        .output()
        .visible(visible)
        .map(|line| render_output_line(line, theme))
        .collect();

    let mut title = String::from("Output");
    if let Some(command) = app.running_command() {
        title.push_str(&format!(" [running: {command}]"));
    }
    if app.output().scroll() > 0 {
        title.push_str(&format!(" [+{}]", app.output().scroll()));
    }

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(theme.secondary)),
    );
    frame.render_widget(list, area);
}

fn render_output_line(line: &OutputLine, theme: &Theme) -> ListItem<'static> {
    match line.kind {
        LineKind::Header => ListItem::new(Line::from(Span::styled(
            line.text.clone(),
            Style::default()
                .fg(theme.muted)
                .add_modifier(Modifier::ITALIC),
        ))),
        LineKind::Failure => ListItem::new(Line::from(Span::styled(
            line.text.clone(),
            Style::default().fg(theme.danger),
        ))),
        LineKind::Stderr => ListItem::new(Line::from(ansi::styled_spans(
            &line.text,
            Style::default().fg(theme.danger),
        ))),
        LineKind::Stdout | LineKind::Text => ListItem::new(Line::from(ansi::styled_spans(
            &line.text,
            Style::default().fg(theme.text),
        ))),
    }
}

fn draw_status(frame: &mut Frame, app: &AppState, theme: &Theme, area: Rect) {
    let line = if let Some(error) = app.error() {
        Span::styled(format!("Error: {error}"), Style::default().fg(theme.danger))
    } else if let Some(status) = app.status() {
        Span::styled(status.to_string(), Style::default().fg(theme.accent))
    } else {
        Span::raw("")
    };
    frame.render_widget(Paragraph::new(Line::from(line)), area);
}

fn draw_help_bar(frame: &mut Frame, app: &AppState, theme: &Theme, area: Rect) {
    let run_label = match app.tab() {
        ItemKind::Command => "run",
        ItemKind::Query => "view",
    };
    let key_style = Style::default().fg(theme.accent);
    let text_style = Style::default().fg(theme.muted);
    let keys = [
        ("enter", run_label),
        ("A", "dd"),
        ("E", "dit"),
        ("D", "elete"),
        ("Y", "ank"),
        ("C", "lear"),
        ("Q", "uit"),
        ("pgup/pgdn", "scroll"),
    ];

    let mut spans = Vec::new();
    for (index, (key, label)) in keys.into_iter().enumerate() {
        if index > 0 {
            spans.push(Span::styled(" • ", text_style));
        }
        spans.push(Span::styled(key, key_style));
        if key.len() > 1 {
            spans.push(Span::styled(format!(" {label}"), text_style));
        } else {
            spans.push(Span::styled(label, text_style));
        }
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_form_popup(frame: &mut Frame, form: &FormState, theme: &Theme) {
    let area = centered_rect(80, 70, frame.area());
    frame.render_widget(Clear, area);

    let verb = if form.editing.is_some() { "Edit" } else { "Add" };
    let title = format!("{verb} {}", form.kind.noun());
    frame.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(theme.primary)),
        area,
    );

    let body_rows = match form.kind {
        ItemKind::Command => 1,
        ItemKind::Query => 8,
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(body_rows),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .margin(1)
        .split(area);

    let fields = [
        (FormField::Name, "Name", rows[0], rows[1]),
        (FormField::Body, form.kind.body_label(), rows[2], rows[3]),
        (FormField::Description, "Description", rows[4], rows[5]),
    ];
    for (field, label, label_area, input_area) in fields {
        let focused = form.focus == field;
        let label_style = if focused {
            Style::default()
                .fg(theme.primary)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.muted)
        };
        frame.render_widget(Paragraph::new(Span::styled(label, label_style)), label_area);

        let input = form.field(field);
        let lines: Vec<Line<'_>> = input
            .value()
            .split('\n')
            .map(|line| Line::from(Span::styled(line, Style::default().fg(theme.text))))
            .collect();
        frame.render_widget(Paragraph::new(lines), input_area);

        if focused {
            let (line, col) = input.cursor_line_col();
            let x = input_area.x.saturating_add(col as u16);
            let y = input_area
                .y
                .saturating_add((line as u16).min(input_area.height.saturating_sub(1)));
            frame.set_cursor_position((x, y));
        }
    }

    let hint = match form.kind {
        ItemKind::Command => "tab/down: next field • enter or ctrl+s: save • esc: cancel",
        ItemKind::Query => "tab/down: next field • enter: newline in SQL • ctrl+s: save • esc: cancel",
    };
    frame.render_widget(
        Paragraph::new(Span::styled(hint, Style::default().fg(theme.muted))),
        rows[7],
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, rect: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(rect);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
