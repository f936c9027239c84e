use std::collections::HashMap;

use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use fuzzy_matcher::skim::SkimMatcherV2;
use tracing::{debug, warn};

use crate::input::{TextInput, is_plain};
use crate::model::{Item, ItemKind};
use crate::output::{LineKind, OutputBuffer};
use crate::placeholder::{self, Placeholder};
use crate::runner::{OutputEvent, OutputStream};
use crate::search;
use crate::store::{Store, StoreError};

const PAGE_SCROLL: usize = 10;

/// Side effect requested by a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    None,
    Quit,
    /// Start the streamer for this fully substituted command line and hand
    /// the stream back through [`AppState::attach_stream`].
    Execute(String),
    /// Put this text on the system clipboard and report back through
    /// [`AppState::on_copy_result`].
    Copy(String),
}

pub enum Mode {
    Normal,
    Add(FormState),
    Edit(FormState),
    Delete(DeleteState),
    Param(ParamState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Body,
    Description,
}

impl FormField {
    fn next(self) -> Self {
        match self {
            FormField::Name => FormField::Body,
            FormField::Body => FormField::Description,
            FormField::Description => FormField::Name,
        }
    }

    fn prev(self) -> Self {
        match self {
            FormField::Name => FormField::Description,
            FormField::Body => FormField::Name,
            FormField::Description => FormField::Body,
        }
    }
}

pub struct FormState {
    pub kind: ItemKind,
    /// Id of the item being edited; `None` when adding.
    pub editing: Option<i64>,
    pub name: TextInput,
    pub body: TextInput,
    pub description: TextInput,
    pub focus: FormField,
}

impl FormState {
    fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            editing: None,
            name: TextInput::default(),
            body: TextInput::default(),
            description: TextInput::default(),
            focus: FormField::Name,
        }
    }

    fn for_item(kind: ItemKind, item: &Item) -> Self {
        Self {
            kind,
            editing: Some(item.id),
            name: TextInput::with_value(item.name.clone()),
            body: TextInput::with_value(item.body.clone()),
            description: TextInput::with_value(item.description.clone()),
            focus: FormField::Name,
        }
    }

    pub fn field(&self, field: FormField) -> &TextInput {
        match field {
            FormField::Name => &self.name,
            FormField::Body => &self.body,
            FormField::Description => &self.description,
        }
    }

    fn focused_mut(&mut self) -> &mut TextInput {
        match self.focus {
            FormField::Name => &mut self.name,
            FormField::Body => &mut self.body,
            FormField::Description => &mut self.description,
        }
    }

    fn into_mode(self) -> Mode {
        if self.editing.is_some() {
            Mode::Edit(self)
        } else {
            Mode::Add(self)
        }
    }
}

pub struct DeleteState {
    pub kind: ItemKind,
    pub id: i64,
    pub name: String,
}

pub struct ParamState {
    pub item_id: i64,
    pub item_name: String,
    template: String,
    placeholders: Vec<Placeholder>,
    pub input: TextInput,
}

/// The command currently streaming output.
struct ExecutionSession {
    item_id: i64,
    command_line: String,
    placeholders: Vec<Placeholder>,
    values: HashMap<String, String>,
    stream: Option<OutputStream>,
}

pub struct AppState {
    store: Box<dyn Store>,
    matcher: SkimMatcherV2,
    tab: ItemKind,
    items: Vec<Item>,
    filtered: Vec<usize>,
    selected: usize,
    search: TextInput,
    mode: Mode,
    output: OutputBuffer,
    session: Option<ExecutionSession>,
    status: Option<String>,
    error: Option<String>,
}

impl AppState {
    pub fn new(store: Box<dyn Store>, max_output_lines: usize) -> Self {
        let mut app = Self {
            store,
            matcher: SkimMatcherV2::default(),
            tab: ItemKind::Command,
            items: Vec::new(),
            filtered: Vec::new(),
            selected: 0,
            search: TextInput::default(),
            mode: Mode::Normal,
            output: OutputBuffer::new(max_output_lines),
            session: None,
            status: None,
            error: None,
        };
        app.reload_items();
        app
    }

    pub fn tab(&self) -> ItemKind {
        self.tab
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn search(&self) -> &TextInput {
        &self.search
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Height of the output pane on the last draw; bounds PgUp.
    pub fn set_output_rows(&mut self, rows: usize) {
        self.output.set_view_rows(rows);
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Items passing the current filter, in display order.
    pub fn visible_items(&self) -> impl Iterator<Item = &Item> {
        self.filtered.iter().map(|&index| &self.items[index])
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_item(&self) -> Option<&Item> {
        self.filtered
            .get(self.selected)
            .map(|&index| &self.items[index])
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn running_command(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.command_line.as_str())
    }

    pub fn output_stream(&self) -> Option<&OutputStream> {
        self.session
            .as_ref()
            .and_then(|session| session.stream.as_ref())
    }

    pub fn on_key(&mut self, key: KeyEvent) -> UiAction {
        self.status = None;
        self.error = None;

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return UiAction::Quit;
        }

        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => self.on_normal_key(key),
            Mode::Add(form) | Mode::Edit(form) => self.on_form_key(form, key),
            Mode::Delete(state) => self.on_delete_key(state, key),
            Mode::Param(state) => self.on_param_key(state, key),
        }
    }

    fn on_normal_key(&mut self, key: KeyEvent) -> UiAction {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        let plain = is_plain(key.modifiers);

        match key.code {
            KeyCode::Esc => {
                if !self.search.is_empty() {
                    self.search.clear();
                    self.refresh_filtered();
                }
                UiAction::None
            }
            KeyCode::Enter => self.run_selected(),
            KeyCode::Tab => {
                self.switch_tab();
                UiAction::None
            }
            KeyCode::Up => {
                self.move_selection(-1);
                UiAction::None
            }
            KeyCode::Down => {
                self.move_selection(1);
                UiAction::None
            }
            KeyCode::Char('k') if control => {
                self.move_selection(-1);
                UiAction::None
            }
            KeyCode::Char('j') if control => {
                self.move_selection(1);
                UiAction::None
            }
            KeyCode::PageUp => {
                self.output.scroll_up(PAGE_SCROLL);
                UiAction::None
            }
            KeyCode::PageDown => {
                self.output.scroll_down(PAGE_SCROLL);
                UiAction::None
            }
            KeyCode::Char('A') if plain => {
                debug!(kind = self.tab.noun(), "opening add form");
                self.mode = Mode::Add(FormState::new(self.tab));
                UiAction::None
            }
            KeyCode::Char('E') if plain => {
                if let Some(item) = self.selected_item() {
                    debug!(id = item.id, "opening edit form");
                    self.mode = Mode::Edit(FormState::for_item(self.tab, item));
                }
                UiAction::None
            }
            KeyCode::Char('D') if plain => {
                if let Some(item) = self.selected_item() {
                    self.mode = Mode::Delete(DeleteState {
                        kind: self.tab,
                        id: item.id,
                        name: item.name.clone(),
                    });
                }
                UiAction::None
            }
            KeyCode::Char('C') if plain => {
                self.output.clear();
                UiAction::None
            }
            KeyCode::Char('Y') if plain => match self.selected_item() {
                Some(item) => UiAction::Copy(item.body.clone()),
                None => UiAction::None,
            },
            KeyCode::Char('Q') if plain => UiAction::Quit,
            _ => {
                if self.search.handle_key(key) {
                    self.refresh_filtered();
                }
                UiAction::None
            }
        }
    }

    fn run_selected(&mut self) -> UiAction {
        let Some(item) = self.selected_item().cloned() else {
            return UiAction::None;
        };

        match self.tab {
            ItemKind::Query => {
                self.output.clear();
                for line in item.body.lines() {
                    self.output.push(LineKind::Text, line);
                }
                if let Err(err) = self.store.mark_used(ItemKind::Query, item.id, Utc::now()) {
                    self.report_store_error("mark query used", err);
                }
                self.reload_items();
                UiAction::None
            }
            ItemKind::Command => {
                if self.is_running() {
                    self.error = Some("A command is already running".to_string());
                    return UiAction::None;
                }

                let placeholders = placeholder::extract_placeholders(&item.body);
                if placeholders.is_empty() {
                    return self.execute(item.id, &item.body, placeholders, HashMap::new());
                }

                let line = placeholder::format_param_line(&placeholders, &item.last_params);
                debug!(id = item.id, count = placeholders.len(), "collecting parameters");
                self.mode = Mode::Param(ParamState {
                    item_id: item.id,
                    item_name: item.name,
                    template: item.body,
                    placeholders,
                    input: TextInput::with_value(line),
                });
                UiAction::None
            }
        }
    }

    fn on_param_key(&mut self, mut state: ParamState, key: KeyEvent) -> UiAction {
        match key.code {
            KeyCode::Esc => UiAction::None,
            KeyCode::Enter => {
                let values = placeholder::parse_param_line(state.input.value());
                let missing = placeholder::missing_names(&state.placeholders, &values).join(", ");
                if !missing.is_empty() {
                    self.error = Some(format!("Missing params: {missing}"));
                    self.mode = Mode::Param(state);
                    return UiAction::None;
                }
                if self.is_running() {
                    self.error = Some("A command is already running".to_string());
                    self.mode = Mode::Param(state);
                    return UiAction::None;
                }
                self.execute(state.item_id, &state.template, state.placeholders, values)
            }
            _ => {
                state.input.handle_key(key);
                self.mode = Mode::Param(state);
                UiAction::None
            }
        }
    }

    fn execute(
        &mut self,
        item_id: i64,
        template: &str,
        placeholders: Vec<Placeholder>,
        values: HashMap<String, String>,
    ) -> UiAction {
        let command_line = placeholder::substitute(template, &values);

        if let Err(err) = self.store.mark_used(ItemKind::Command, item_id, Utc::now()) {
            self.report_store_error("mark command used", err);
        }
        if !placeholders.is_empty() {
            let saved = placeholder::persistable_values(&placeholders, &values);
            if let Err(err) = self.store.save_last_params(item_id, &saved) {
                self.report_store_error("save parameters", err);
            }
        }

        self.output.clear();
        self.output.push(LineKind::Header, format!("$ {command_line}"));
        self.output.push(LineKind::Text, "");

        debug!(id = item_id, "starting command");
        self.session = Some(ExecutionSession {
            item_id,
            command_line: command_line.clone(),
            placeholders,
            values,
            stream: None,
        });
        self.mode = Mode::Normal;
        self.reload_items();
        UiAction::Execute(command_line)
    }

    /// Hands over the stream started for the last [`UiAction::Execute`].
    pub fn attach_stream(&mut self, stream: OutputStream) {
        match self.session.as_mut() {
            Some(session) => session.stream = Some(stream),
            None => stream.terminate(),
        }
    }

    pub fn on_output(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Line { text, is_error } => {
                let kind = if is_error {
                    LineKind::Stderr
                } else {
                    LineKind::Stdout
                };
                self.output.push(kind, text);
            }
            OutputEvent::Done { failure } => {
                if let Some(failure) = &failure {
                    self.output.push(LineKind::Failure, format!("Error: {failure}"));
                }
                if let Some(session) = self.session.take() {
                    let sensitive = session
                        .placeholders
                        .iter()
                        .filter(|placeholder| placeholder.sensitive)
                        .count();
                    debug!(
                        id = session.item_id,
                        params = session.values.len(),
                        sensitive,
                        failure = ?failure,
                        "command finished"
                    );
                }
            }
        }
    }

    /// Kills the running command, if any. Called once before exit.
    pub fn shutdown(&mut self) {
        if let Some(stream) = self.session.take().and_then(|session| session.stream) {
            stream.terminate();
        }
    }

    pub fn on_copy_result(&mut self, result: Result<(), String>) {
        match result {
            Ok(()) => self.status = Some("Copied!".to_string()),
            Err(err) => {
                warn!(error = %err, "clipboard write failed");
                self.error = Some(format!("Failed to copy: {err}"));
            }
        }
    }

    fn on_form_key(&mut self, mut form: FormState, key: KeyEvent) -> UiAction {
        match key.code {
            KeyCode::Esc => return UiAction::None,
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return self.submit_form(form);
            }
            KeyCode::Enter if form.kind == ItemKind::Query && form.focus == FormField::Body => {
                form.body.insert('\n');
            }
            KeyCode::Enter => return self.submit_form(form),
            KeyCode::Tab | KeyCode::Down => form.focus = form.focus.next(),
            KeyCode::BackTab | KeyCode::Up => form.focus = form.focus.prev(),
            _ => {
                form.focused_mut().handle_key(key);
            }
        }
        self.mode = form.into_mode();
        UiAction::None
    }

    fn submit_form(&mut self, form: FormState) -> UiAction {
        let kind = form.kind;
        let name = form.name.value().trim().to_string();
        // Query bodies keep their layout; command bodies are single lines.
        let body = match kind {
            ItemKind::Command => form.body.value().trim().to_string(),
            ItemKind::Query => form.body.value().to_string(),
        };
        let description = form.description.value().trim().to_string();

        if name.is_empty() || body.trim().is_empty() {
            self.error = Some(format!("Name and {} are required", kind.body_phrase()));
            self.mode = form.into_mode();
            return UiAction::None;
        }

        match self.duplicate_message(kind, &name, &body, form.editing) {
            Ok(None) => {}
            Ok(Some(message)) => {
                self.error = Some(message);
                self.mode = form.into_mode();
                return UiAction::None;
            }
            Err(err) => {
                self.report_store_error("check duplicates", err);
                self.mode = form.into_mode();
                return UiAction::None;
            }
        }

        let saved = match form.editing {
            None => self
                .store
                .add(kind, &name, &body, &description)
                .map(|_| "Added!"),
            Some(id) => self
                .store
                .update(kind, id, &name, &body, &description)
                .map(|()| "Updated!"),
        };

        match saved {
            Ok(message) => {
                self.status = Some(message.to_string());
                self.reload_items();
            }
            Err(err) => {
                self.report_store_error("save item", err);
                self.mode = form.into_mode();
            }
        }
        UiAction::None
    }

    fn duplicate_message(
        &self,
        kind: ItemKind,
        name: &str,
        body: &str,
        exclude_id: Option<i64>,
    ) -> Result<Option<String>, StoreError> {
        if self.store.is_duplicate_name(kind, name, exclude_id)? {
            return Ok(Some(format!(
                "A {} with this name already exists",
                kind.noun()
            )));
        }
        if self.store.is_duplicate_body(kind, body, exclude_id)? {
            return Ok(Some(format!(
                "A {} with this exact {} already exists",
                kind.noun(),
                kind.body_phrase()
            )));
        }
        Ok(None)
    }

    fn on_delete_key(&mut self, state: DeleteState, key: KeyEvent) -> UiAction {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.store.delete(state.kind, state.id) {
                    Ok(()) => {
                        debug!(id = state.id, "item deleted");
                        self.status = Some("Deleted!".to_string());
                    }
                    Err(err) => self.report_store_error("delete item", err),
                }
                self.reload_items();
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {}
            _ => self.mode = Mode::Delete(state),
        }
        UiAction::None
    }

    fn switch_tab(&mut self) {
        self.tab = self.tab.other();
        self.search.clear();
        self.items.clear();
        self.filtered.clear();
        self.selected = 0;
        self.output.clear();
        self.reload_items();
        debug!(tab = self.tab.noun(), "switched tab");
    }

    /// Re-reads the current tab from the store, keeping the selection on the
    /// same item when it is still listed.
    fn reload_items(&mut self) {
        let selected_id = self.selected_item().map(|item| item.id);
        match self.store.list(self.tab) {
            Ok(items) => self.items = items,
            Err(err) => self.report_store_error("list items", err),
        }
        self.refresh_filtered();

        if let Some(position) = selected_id.and_then(|id| {
            self.filtered
                .iter()
                .position(|&index| self.items[index].id == id)
        }) {
            self.selected = position;
        }
    }

    fn refresh_filtered(&mut self) {
        let candidates: Vec<String> = self.items.iter().map(Item::search_text).collect();
        self.filtered = search::rank(&self.matcher, self.search.value(), &candidates);
        self.selected = self.selected.min(self.filtered.len().saturating_sub(1));
    }

    fn move_selection(&mut self, direction: isize) {
        if self.filtered.is_empty() {
            self.selected = 0;
            return;
        }

        let len = self.filtered.len() as isize;
        let next = (self.selected as isize + direction).rem_euclid(len);
        self.selected = next as usize;
    }

    fn report_store_error(&mut self, action: &str, err: StoreError) {
        warn!(action, error = %err, "store operation failed");
        self.error = Some(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::store::{self, JsonStore};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn shifted(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::SHIFT)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    fn type_text(app: &mut AppState, text: &str) {
        for ch in text.chars() {
            app.on_key(key(KeyCode::Char(ch)));
        }
    }

    fn app_with(commands: &[(&str, &str)]) -> AppState {
        let mut store = JsonStore::in_memory();
        for (name, body) in commands {
            store.add(ItemKind::Command, name, body, "").unwrap();
        }
        AppState::new(Box::new(store), 500)
    }

    fn output_texts(app: &AppState) -> Vec<String> {
        app.output().lines().map(|line| line.text.clone()).collect()
    }

    fn set_param_line(app: &mut AppState, line: &str) {
        let Mode::Param(state) = &mut app.mode else {
            panic!("expected param mode");
        };
        state.input = TextInput::with_value(line);
    }

    struct FailingStore {
        items: Vec<Item>,
    }

    fn disk_full() -> StoreError {
        StoreError::Io(io::Error::other("disk full"))
    }

    impl Store for FailingStore {
        fn list(&self, kind: ItemKind) -> store::Result<Vec<Item>> {
            Ok(match kind {
                ItemKind::Command => self.items.clone(),
                ItemKind::Query => Vec::new(),
            })
        }

        fn add(&mut self, _: ItemKind, _: &str, _: &str, _: &str) -> store::Result<i64> {
            Err(disk_full())
        }

        fn update(&mut self, _: ItemKind, _: i64, _: &str, _: &str, _: &str) -> store::Result<()> {
            Err(disk_full())
        }

        fn delete(&mut self, _: ItemKind, _: i64) -> store::Result<()> {
            Err(disk_full())
        }

        fn mark_used(&mut self, _: ItemKind, _: i64, _: DateTime<Utc>) -> store::Result<()> {
            Err(disk_full())
        }

        fn save_last_params(&mut self, _: i64, _: &HashMap<String, String>) -> store::Result<()> {
            Err(disk_full())
        }

        fn is_duplicate_body(&self, _: ItemKind, _: &str, _: Option<i64>) -> store::Result<bool> {
            Ok(false)
        }

        fn is_duplicate_name(&self, _: ItemKind, _: &str, _: Option<i64>) -> store::Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn typing_filters_and_esc_clears() {
        let mut app = app_with(&[("deploy", "kubectl apply"), ("build", "make all")]);
        assert_eq!(app.visible_items().count(), 2);

        type_text(&mut app, "dep");
        let names: Vec<&str> = app.visible_items().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec!["deploy"]);

        app.on_key(key(KeyCode::Esc));
        assert!(app.search().is_empty());
        assert_eq!(app.visible_items().count(), 2);
    }

    #[test]
    fn command_without_placeholders_runs_immediately() {
        let mut app = app_with(&[("list", "ls -la")]);

        let action = app.on_key(key(KeyCode::Enter));
        assert_eq!(action, UiAction::Execute("ls -la".to_string()));
        assert!(matches!(app.mode(), Mode::Normal));
        assert!(app.is_running());
        assert_eq!(output_texts(&app), vec!["$ ls -la", ""]);
        assert!(app.items[0].last_used_at.is_some());
    }

    #[test]
    fn filled_params_execute_and_persist() {
        let mut app = app_with(&[("ssh", "ssh {{user}}@{{host}}")]);

        assert_eq!(app.on_key(key(KeyCode::Enter)), UiAction::None);
        let Mode::Param(state) = app.mode() else {
            panic!("expected param mode");
        };
        assert_eq!(state.input.value(), "user= host=");

        set_param_line(&mut app, "user=alice host=box1");
        let action = app.on_key(key(KeyCode::Enter));
        assert_eq!(action, UiAction::Execute("ssh alice@box1".to_string()));
        assert_eq!(app.running_command(), Some("ssh alice@box1"));

        let saved = &app.store.list(ItemKind::Command).unwrap()[0].last_params;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.get("user").map(String::as_str), Some("alice"));
        assert_eq!(saved.get("host").map(String::as_str), Some("box1"));
    }

    #[test]
    fn missing_param_is_rejected_without_running() {
        let mut app = app_with(&[("ssh", "ssh {{user}}@{{host}}")]);
        app.on_key(key(KeyCode::Enter));
        set_param_line(&mut app, "user=alice");

        let action = app.on_key(key(KeyCode::Enter));
        assert_eq!(action, UiAction::None);
        assert_eq!(app.error(), Some("Missing params: host"));
        assert!(matches!(app.mode(), Mode::Param(_)));
        assert!(!app.is_running());
        assert!(app.store.list(ItemKind::Command).unwrap()[0].last_used_at.is_none());
    }

    #[test]
    fn sensitive_values_are_used_but_never_saved() {
        let mut app = app_with(&[("db", "mysql -u {{user}} -p{{!password}}")]);
        app.on_key(key(KeyCode::Enter));
        set_param_line(&mut app, "user=root password=hunter2");

        let action = app.on_key(key(KeyCode::Enter));
        assert_eq!(
            action,
            UiAction::Execute("mysql -u root -phunter2".to_string())
        );
        let saved = &app.store.list(ItemKind::Command).unwrap()[0].last_params;
        assert_eq!(saved.len(), 1);
        assert!(!saved.contains_key("password"));

        // Next run pre-fills only the non-sensitive value.
        app.on_output(OutputEvent::Done { failure: None });
        app.on_key(key(KeyCode::Enter));
        let Mode::Param(state) = app.mode() else {
            panic!("expected param mode");
        };
        assert_eq!(state.input.value(), "user=root password=");
    }

    #[test]
    fn esc_cancels_param_entry() {
        let mut app = app_with(&[("ssh", "ssh {{host}}")]);
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.on_key(key(KeyCode::Esc)), UiAction::None);
        assert!(matches!(app.mode(), Mode::Normal));
        assert!(!app.is_running());
    }

    #[test]
    fn second_run_is_rejected_while_one_is_active() {
        let mut app = app_with(&[("sleep", "sleep 5")]);
        assert!(matches!(app.on_key(key(KeyCode::Enter)), UiAction::Execute(_)));

        assert_eq!(app.on_key(key(KeyCode::Enter)), UiAction::None);
        assert_eq!(app.error(), Some("A command is already running"));
    }

    #[test]
    fn page_up_on_short_output_keeps_the_tail() {
        let mut app = app_with(&[]);
        app.set_output_rows(8);
        for i in 0..5 {
            app.on_output(OutputEvent::Line {
                text: i.to_string(),
                is_error: false,
            });
        }

        app.on_key(key(KeyCode::PageUp));
        assert_eq!(app.output().scroll(), 0);

        for i in 5..20 {
            app.on_output(OutputEvent::Line {
                text: i.to_string(),
                is_error: false,
            });
        }
        app.on_key(key(KeyCode::PageUp));
        assert_eq!(app.output().scroll(), 10);
        app.on_key(key(KeyCode::PageUp));
        assert_eq!(app.output().scroll(), 12);
        app.on_key(key(KeyCode::PageDown));
        assert_eq!(app.output().scroll(), 2);
    }

    #[test]
    fn output_events_append_until_done() {
        let mut app = app_with(&[("fail", "false")]);
        app.on_key(key(KeyCode::Enter));

        app.on_output(OutputEvent::Line {
            text: "out".to_string(),
            is_error: false,
        });
        app.on_output(OutputEvent::Line {
            text: "err".to_string(),
            is_error: true,
        });
        app.on_output(OutputEvent::Done {
            failure: Some("exit status: 1".to_string()),
        });

        assert!(!app.is_running());
        let kinds: Vec<LineKind> = app.output().lines().map(|line| line.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LineKind::Header,
                LineKind::Text,
                LineKind::Stdout,
                LineKind::Stderr,
                LineKind::Failure
            ]
        );
        assert_eq!(
            output_texts(&app).last().map(String::as_str),
            Some("Error: exit status: 1")
        );
    }

    #[test]
    fn duplicate_body_is_rejected_without_store_write() {
        let mut app = app_with(&[("list", "ls -la")]);

        app.on_key(shifted('A'));
        assert!(matches!(app.mode(), Mode::Add(_)));
        type_text(&mut app, "other");
        app.on_key(key(KeyCode::Tab));
        type_text(&mut app, "  ls -la  ");
        app.on_key(key(KeyCode::Enter));

        assert_eq!(
            app.error(),
            Some("A command with this exact command already exists")
        );
        assert!(matches!(app.mode(), Mode::Add(_)));
        assert_eq!(app.store.list(ItemKind::Command).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_name_and_empty_fields_are_rejected() {
        let mut app = app_with(&[("list", "ls -la")]);

        app.on_key(shifted('A'));
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.error(), Some("Name and command are required"));

        type_text(&mut app, " list ");
        app.on_key(key(KeyCode::Tab));
        type_text(&mut app, "ls");
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.error(), Some("A command with this name already exists"));
    }

    #[test]
    fn add_then_edit_updates_the_store() {
        let mut app = app_with(&[]);

        app.on_key(shifted('A'));
        type_text(&mut app, "greet");
        app.on_key(key(KeyCode::Down));
        type_text(&mut app, "echo hi");
        app.on_key(key(KeyCode::Down));
        type_text(&mut app, "says hi");
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.status(), Some("Added!"));
        assert!(matches!(app.mode(), Mode::Normal));

        app.on_key(shifted('E'));
        assert!(matches!(app.mode(), Mode::Edit(_)));
        // Saving unchanged values must not trip the duplicate checks.
        app.on_key(ctrl('s'));
        assert_eq!(app.status(), Some("Updated!"));

        let items = app.store.list(ItemKind::Command).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "greet");
        assert_eq!(items[0].description, "says hi");
    }

    #[test]
    fn status_is_cleared_by_the_next_key() {
        let mut app = app_with(&[]);
        app.on_key(shifted('A'));
        type_text(&mut app, "x");
        app.on_key(key(KeyCode::Tab));
        type_text(&mut app, "true");
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.status(), Some("Added!"));

        app.on_key(key(KeyCode::Down));
        assert_eq!(app.status(), None);
    }

    #[test]
    fn delete_requires_confirmation() {
        let mut app = app_with(&[("list", "ls -la")]);

        app.on_key(shifted('D'));
        assert!(matches!(app.mode(), Mode::Delete(_)));
        app.on_key(key(KeyCode::Char('x')));
        assert!(matches!(app.mode(), Mode::Delete(_)));
        app.on_key(key(KeyCode::Char('n')));
        assert!(matches!(app.mode(), Mode::Normal));
        assert_eq!(app.total_items(), 1);

        app.on_key(shifted('D'));
        app.on_key(key(KeyCode::Char('y')));
        assert_eq!(app.status(), Some("Deleted!"));
        assert_eq!(app.total_items(), 0);
        assert!(app.selected_item().is_none());
    }

    #[test]
    fn failed_store_write_keeps_the_form_open() {
        let store = FailingStore { items: Vec::new() };
        let mut app = AppState::new(Box::new(store), 100);

        app.on_key(shifted('A'));
        type_text(&mut app, "name");
        app.on_key(key(KeyCode::Tab));
        type_text(&mut app, "echo");
        app.on_key(key(KeyCode::Enter));

        assert!(app.error().is_some_and(|err| err.contains("disk full")));
        assert!(matches!(app.mode(), Mode::Add(_)));
        assert_eq!(app.status(), None);
    }

    #[test]
    fn failed_mark_used_still_runs_the_command() {
        let item = Item {
            id: 1,
            name: "hello".to_string(),
            body: "echo hello".to_string(),
            description: String::new(),
            created_at: Utc::now(),
            last_used_at: None,
            last_params: HashMap::new(),
        };
        let mut app = AppState::new(Box::new(FailingStore { items: vec![item] }), 100);

        let action = app.on_key(key(KeyCode::Enter));
        assert_eq!(action, UiAction::Execute("echo hello".to_string()));
        assert!(app.error().is_some_and(|err| err.contains("disk full")));
    }

    #[test]
    fn query_tab_shows_sql_instead_of_running() {
        let mut store = JsonStore::in_memory();
        store
            .add(ItemKind::Query, "users", "SELECT *\nFROM users", "")
            .unwrap();
        let mut app = AppState::new(Box::new(store), 100);
        assert_eq!(app.total_items(), 0);

        app.on_key(key(KeyCode::Tab));
        assert_eq!(app.tab(), ItemKind::Query);
        assert_eq!(app.total_items(), 1);

        assert_eq!(app.on_key(key(KeyCode::Enter)), UiAction::None);
        assert!(!app.is_running());
        assert_eq!(output_texts(&app), vec!["SELECT *", "FROM users"]);
        assert!(app.items[0].last_used_at.is_some());
    }

    #[test]
    fn query_form_body_accepts_newlines() {
        let mut app = app_with(&[]);
        app.on_key(key(KeyCode::Tab));

        app.on_key(shifted('A'));
        type_text(&mut app, "recent");
        app.on_key(key(KeyCode::Tab));
        type_text(&mut app, "SELECT 1");
        app.on_key(key(KeyCode::Enter));
        type_text(&mut app, "FROM dual");
        assert!(matches!(app.mode(), Mode::Add(_)));

        app.on_key(ctrl('s'));
        assert_eq!(app.status(), Some("Added!"));
        let queries = app.store.list(ItemKind::Query).unwrap();
        assert_eq!(queries[0].body, "SELECT 1\nFROM dual");
    }

    #[test]
    fn query_duplicate_uses_query_wording() {
        let mut store = JsonStore::in_memory();
        store.add(ItemKind::Query, "one", "SELECT 1", "").unwrap();
        let mut app = AppState::new(Box::new(store), 100);
        app.on_key(key(KeyCode::Tab));

        app.on_key(shifted('A'));
        type_text(&mut app, "two");
        app.on_key(key(KeyCode::Tab));
        type_text(&mut app, "SELECT 1 ");
        app.on_key(ctrl('s'));
        assert_eq!(app.error(), Some("A query with this exact SQL already exists"));
    }

    #[test]
    fn yank_requests_clipboard_copy() {
        let mut app = app_with(&[("list", "ls -la")]);
        assert_eq!(
            app.on_key(shifted('Y')),
            UiAction::Copy("ls -la".to_string())
        );

        app.on_copy_result(Ok(()));
        assert_eq!(app.status(), Some("Copied!"));

        app.on_copy_result(Err("no display".to_string()));
        assert_eq!(app.error(), Some("Failed to copy: no display"));
    }

    #[test]
    fn clear_empties_output_only() {
        let mut app = app_with(&[("list", "ls -la")]);
        app.on_key(key(KeyCode::Enter));
        app.on_key(shifted('C'));
        assert_eq!(app.output().lines().count(), 0);
        assert!(app.is_running());
    }

    #[test]
    fn ctrl_c_quits_from_any_mode() {
        let mut app = app_with(&[("ssh", "ssh {{host}}")]);
        app.on_key(key(KeyCode::Enter));
        assert!(matches!(app.mode(), Mode::Param(_)));
        assert_eq!(app.on_key(ctrl('c')), UiAction::Quit);

        let mut app = app_with(&[]);
        app.on_key(shifted('A'));
        assert_eq!(app.on_key(ctrl('c')), UiAction::Quit);

        app.on_key(key(KeyCode::Esc));
        assert_eq!(app.on_key(shifted('Q')), UiAction::Quit);
    }

    #[test]
    fn selection_wraps_and_clamps_on_filter() {
        let mut app = app_with(&[("a", "echo a"), ("b", "echo b"), ("c", "echo c")]);
        app.on_key(key(KeyCode::Up));
        assert_eq!(app.selected(), 2);
        app.on_key(ctrl('j'));
        assert_eq!(app.selected(), 0);
        app.on_key(ctrl('k'));
        assert_eq!(app.selected(), 2);

        type_text(&mut app, "echo b");
        assert_eq!(app.visible_items().count(), 1);
        assert_eq!(app.selected(), 0);
    }
}
