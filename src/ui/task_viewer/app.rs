use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::config::Config;
use crate::error::Result;
use crate::filter::{Selection, StatusFilter};
use crate::reorder::ReorderController;
use crate::session::TaskSession;
use crate::task::{Category, Priority, Task, TaskDraft};
use crate::view::{self as derived, Page};

use super::view;

const EVENT_POLL_MS: u64 = 120;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Theme {
    Dark,
    Light,
}

#[derive(Clone, Copy)]
pub(crate) enum StatusKind {
    Error,
    Info,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InputMode {
    Normal,
    Search,
    AddTitle,
    Move,
}

pub(crate) struct DeleteConfirmState {
    pub(crate) task_id: String,
    pub(crate) title: String,
}

/// Counts shown on the status tabs.
pub(crate) struct TabCounts {
    pub(crate) all: usize,
    pub(crate) incomplete: usize,
    pub(crate) completed: usize,
    pub(crate) due_soon: usize,
}

impl TabCounts {
    pub(crate) fn get(&self, status: StatusFilter) -> usize {
        match status {
            StatusFilter::All => self.all,
            StatusFilter::Incomplete => self.incomplete,
            StatusFilter::Completed => self.completed,
            StatusFilter::DueSoon => self.due_soon,
        }
    }
}

pub struct AppState {
    pub(crate) session: TaskSession,
    pub(crate) page_size: usize,
    /// 1-based, clamped on every state change.
    pub(crate) page: usize,
    /// Row within the current page.
    pub(crate) selected: usize,
    pub(crate) mode: InputMode,
    pub(crate) input: String,
    pub(crate) delete_confirm: Option<DeleteConfirmState>,
    pub(crate) reorder: ReorderController,
    pub(crate) theme: Theme,
    pub(crate) show_notifications: bool,
    info_message: Option<String>,
}

impl AppState {
    fn new(session: TaskSession, page_size: usize) -> Self {
        let mut app = Self {
            session,
            page_size: page_size.max(1),
            page: 1,
            selected: 0,
            mode: InputMode::Normal,
            input: String::new(),
            delete_confirm: None,
            reorder: ReorderController::new(),
            theme: Theme::Dark,
            show_notifications: false,
            info_message: None,
        };
        app.clamp();
        app
    }

    pub(crate) fn visible_ids(&self) -> Vec<String> {
        self.session
            .visible()
            .into_iter()
            .map(|task| task.id.clone())
            .collect()
    }

    pub(crate) fn current_page(&self) -> Page<Task> {
        let visible: Vec<Task> = self.session.visible().into_iter().cloned().collect();
        derived::paginate(&visible, self.page_size, self.page)
    }

    pub(crate) fn selected_task(&self) -> Option<Task> {
        self.current_page().items.get(self.selected).cloned()
    }

    pub(crate) fn tab_counts(&self) -> TabCounts {
        let tasks = self.session.tasks();
        let completed = tasks.iter().filter(|task| task.completed).count();
        let notifications = self.session.notifications();
        TabCounts {
            all: tasks.len(),
            incomplete: tasks.len() - completed,
            completed,
            due_soon: tasks
                .iter()
                .filter(|task| !task.completed && notifications.contains(&task.id))
                .count(),
        }
    }

    pub(crate) fn notification_messages(&self) -> Vec<String> {
        self.session.notifications().messages(self.session.tasks())
    }

    pub(crate) fn status_line(&self) -> Option<(String, StatusKind)> {
        if let Some(error) = self.session.last_error() {
            return Some((error.to_string(), StatusKind::Error));
        }
        if let Some(info) = self.info_message.as_ref() {
            return Some((info.clone(), StatusKind::Info));
        }
        None
    }

    pub(crate) fn footer_hint(&self) -> String {
        if self.delete_confirm.is_some() {
            return "y confirm delete  esc cancel".to_string();
        }
        match self.mode {
            InputMode::Search => "type to search  backspace delete  enter done  esc clear".to_string(),
            InputMode::AddTitle => "type a title  enter add  esc cancel".to_string(),
            InputMode::Move => "j/k move task  enter/m drop".to_string(),
            InputMode::Normal => {
                "j/k move  h/l page  tab status  c category  p priority  / search  a add  space done  d delete  m move  n alerts  x dismiss  t theme  q quit"
                    .to_string()
            }
        }
    }

    pub(crate) fn filter_summary(&self) -> String {
        let state = self.session.filters().state();
        let mut parts = vec![
            format!("category: {}", state.category),
            format!("priority: {}", state.priority),
        ];
        if !state.search_term.is_empty() {
            parts.push(format!("search: {}", state.search_term));
        }
        parts.join("  ")
    }

    fn clamp(&mut self) {
        let page = self.current_page();
        self.page = page.number;
        self.selected = self.selected.min(page.items.len().saturating_sub(1));
    }

    fn absolute_index(&self) -> usize {
        (self.page - 1) * self.page_size + self.selected
    }

    fn select_absolute(&mut self, index: usize) {
        self.page = index / self.page_size + 1;
        self.selected = index % self.page_size;
        self.clamp();
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.session.visible().len();
        if len == 0 {
            return;
        }
        let current = self.absolute_index() as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.select_absolute(next as usize);
    }

    fn change_page(&mut self, delta: isize) {
        let next = (self.page as isize + delta).max(1) as usize;
        self.page = next;
        self.selected = 0;
        self.clamp();
    }

    fn reset_position(&mut self) {
        self.page = 1;
        self.selected = 0;
        self.clamp();
    }

    fn set_status(&mut self, status: StatusFilter) {
        self.session.filters_mut().set_status(status);
        self.reset_position();
    }

    fn cycle_status(&mut self) {
        let current = self.session.filters().state().status;
        let pos = StatusFilter::ALL
            .iter()
            .position(|status| *status == current)
            .unwrap_or(0);
        self.set_status(StatusFilter::ALL[(pos + 1) % StatusFilter::ALL.len()]);
    }

    fn cycle_category(&mut self) {
        let next = next_selection(self.session.filters().state().category, &Category::ALL);
        self.session.filters_mut().set_category(next);
        self.reset_position();
    }

    fn cycle_priority(&mut self) {
        let next = next_selection(self.session.filters().state().priority, &Priority::ALL);
        self.session.filters_mut().set_priority(next);
        self.reset_position();
    }

    fn update_search(&mut self) {
        let term = self.input.clone();
        self.session.filters_mut().set_search_term(term);
        self.reset_position();
    }

    fn toggle_selected(&mut self) {
        let Some(task) = self.selected_task() else {
            return;
        };
        if let Some(updated) = self.session.toggle_completion(&task.id) {
            let verb = if updated.completed { "completed" } else { "reopened" };
            self.set_info(format!("{verb} \"{}\"", updated.title));
        }
        self.clamp();
    }

    fn request_delete(&mut self) {
        if let Some(task) = self.selected_task() {
            self.delete_confirm = Some(DeleteConfirmState {
                task_id: task.id,
                title: task.title,
            });
        }
    }

    fn confirm_delete(&mut self, state: DeleteConfirmState) {
        if self.session.delete_task(&state.task_id).is_some() {
            self.set_info(format!("deleted \"{}\"", state.title));
        }
        self.clamp();
    }

    fn submit_new_task(&mut self) {
        let title = std::mem::take(&mut self.input);
        match self.session.add_task(&TaskDraft::new(title)) {
            Ok(task) => {
                self.mode = InputMode::Normal;
                self.set_info(format!("added \"{}\"", task.title));
                if let Some(index) = self.visible_ids().iter().position(|id| id == &task.id) {
                    self.select_absolute(index);
                }
            }
            Err(err) => {
                self.set_info(err.to_string());
            }
        }
    }

    fn begin_move(&mut self) {
        if self.selected_task().is_none() {
            return;
        }
        self.reorder.begin(self.absolute_index());
        self.mode = InputMode::Move;
    }

    /// One hover step of the drag: the dragged task moves as soon as it passes
    /// over a neighbouring row.
    fn move_step(&mut self, delta: isize) {
        let Some(source) = self.reorder.source() else {
            return;
        };
        let visible_ids = self.visible_ids();
        let target = source as isize + delta;
        if target < 0 || target as usize >= visible_ids.len() {
            return;
        }
        let target = target as usize;
        if let Some(order) = self.reorder.hover(target, &visible_ids, self.session.tasks()) {
            self.session.reorder(order);
            self.select_absolute(target);
        }
    }

    fn end_move(&mut self) {
        if let Some(index) = self.reorder.end() {
            self.select_absolute(index);
        }
        self.mode = InputMode::Normal;
    }

    fn dismiss_selected(&mut self) {
        let Some(task) = self.selected_task() else {
            return;
        };
        if self.session.dismiss_notification(&task.id) {
            self.set_info(format!("dismissed \"{}\"", task.title));
            self.clamp();
        }
    }

    fn toggle_theme(&mut self) {
        self.theme = match self.theme {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        };
    }

    fn set_info(&mut self, message: String) {
        self.info_message = Some(message);
    }

    fn clear_messages(&mut self) {
        self.info_message = None;
        self.session.clear_error();
    }

    /// Apply backend snapshots, write failures and monitor ticks.
    fn sync(&mut self) -> bool {
        if self.session.pump() == 0 {
            return false;
        }
        if !self.reorder.is_dragging() {
            self.clamp();
        }
        true
    }
}

fn next_selection<T: Copy + PartialEq>(current: Selection<T>, all: &[T]) -> Selection<T> {
    match current {
        Selection::All => all.first().copied().map(Selection::Only).unwrap_or(Selection::All),
        Selection::Only(value) => match all.iter().position(|candidate| *candidate == value) {
            Some(pos) if pos + 1 < all.len() => Selection::Only(all[pos + 1]),
            _ => Selection::All,
        },
    }
}

/// Run the viewer until the user quits. The due-soon monitor runs for the
/// lifetime of the viewer.
pub fn run(session: TaskSession, config: &Config) -> Result<()> {
    let monitor = session.spawn_monitor(config.due_soon.interval())?;
    let mut app = AppState::new(session, config.view.page_size);
    let result = run_terminal(&mut app);
    monitor.stop();
    result
}

fn run_terminal(app: &mut AppState) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut AppState) -> Result<()> {
    let mut dirty = true;
    loop {
        if app.sync() {
            dirty = true;
        }

        if dirty {
            terminal.draw(|frame| view::render(frame, app))?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(EVENT_POLL_MS))? {
            match event::read()? {
                Event::Key(key) => {
                    if handle_key(app, key) {
                        break;
                    }
                    dirty = true;
                }
                Event::Resize(_, _) => {
                    dirty = true;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Returns `true` when the viewer should exit.
fn handle_key(app: &mut AppState, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    if let Some(confirm) = app.delete_confirm.take() {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('c') | KeyCode::Enter => {
                app.confirm_delete(confirm);
            }
            KeyCode::Char('n') | KeyCode::Char('q') | KeyCode::Esc => {
                app.set_info("cancelled".to_string());
            }
            _ => {
                app.delete_confirm = Some(confirm);
            }
        }
        return false;
    }

    match app.mode {
        InputMode::Search => {
            match key.code {
                KeyCode::Enter => app.mode = InputMode::Normal,
                KeyCode::Esc => {
                    app.input.clear();
                    app.update_search();
                    app.mode = InputMode::Normal;
                }
                KeyCode::Backspace => {
                    app.input.pop();
                    app.update_search();
                }
                KeyCode::Char(ch) => {
                    app.input.push(ch);
                    app.update_search();
                }
                _ => {}
            }
            return false;
        }
        InputMode::AddTitle => {
            match key.code {
                KeyCode::Enter => app.submit_new_task(),
                KeyCode::Esc => {
                    app.input.clear();
                    app.mode = InputMode::Normal;
                }
                KeyCode::Backspace => {
                    app.input.pop();
                }
                KeyCode::Char(ch) => app.input.push(ch),
                _ => {}
            }
            return false;
        }
        InputMode::Move => {
            match key.code {
                KeyCode::Char('j') | KeyCode::Down => app.move_step(1),
                KeyCode::Char('k') | KeyCode::Up => app.move_step(-1),
                KeyCode::Enter | KeyCode::Char('m') | KeyCode::Esc => app.end_move(),
                _ => {}
            }
            return false;
        }
        InputMode::Normal => {}
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Esc => app.clear_messages(),
        KeyCode::Char('j') | KeyCode::Down => app.move_selection(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_selection(-1),
        KeyCode::Char('l') | KeyCode::Right | KeyCode::PageDown => app.change_page(1),
        KeyCode::Char('h') | KeyCode::Left | KeyCode::PageUp => app.change_page(-1),
        KeyCode::Tab => app.cycle_status(),
        KeyCode::Char(ch @ '1'..='4') => {
            let index = ch as usize - '1' as usize;
            app.set_status(StatusFilter::ALL[index]);
        }
        KeyCode::Char('c') => app.cycle_category(),
        KeyCode::Char('p') => app.cycle_priority(),
        KeyCode::Char('/') => {
            app.input = app.session.filters().state().search_term.clone();
            app.mode = InputMode::Search;
        }
        KeyCode::Char('a') => {
            app.input.clear();
            app.mode = InputMode::AddTitle;
        }
        KeyCode::Char(' ') | KeyCode::Enter => app.toggle_selected(),
        KeyCode::Char('d') => app.request_delete(),
        KeyCode::Char('m') => app.begin_move(),
        KeyCode::Char('n') => app.show_notifications = !app.show_notifications,
        KeyCode::Char('x') => app.dismiss_selected(),
        KeyCode::Char('t') => app.toggle_theme(),
        _ => {}
    }
    false
}
