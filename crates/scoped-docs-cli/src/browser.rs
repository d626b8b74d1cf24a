//! Terminal browser over a document tree

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use ratatui::{
    Frame, Terminal,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use scoped_docs_engine::VirtualFileHandle;

/// Files larger than this are summarized instead of shown
const PREVIEW_LIMIT: u64 = 64 * 1024;

pub struct App {
    /// Directories entered so far, the tree root first
    trail: Vec<VirtualFileHandle>,
    entries: Vec<VirtualFileHandle>,
    list_state: ListState,
    current_content: Vec<String>,
}

impl App {
    pub fn new(root: VirtualFileHandle) -> Self {
        let mut app = Self {
            trail: vec![root],
            entries: Vec::new(),
            list_state: ListState::default(),
            current_content: Vec::new(),
        };
        app.reload();
        app
    }

    fn current_dir(&self) -> &VirtualFileHandle {
        // `trail` always holds at least the root
        &self.trail[self.trail.len() - 1]
    }

    fn selected(&self) -> Option<&VirtualFileHandle> {
        self.entries.get(self.list_state.selected()?)
    }

    fn reload(&mut self) {
        match self.current_dir().list() {
            Ok(entries) => self.entries = entries,
            Err(e) => {
                self.entries = Vec::new();
                self.current_content = vec![format!("Error listing directory: {e}")];
            }
        }
        self.list_state
            .select(if self.entries.is_empty() { None } else { Some(0) });
        self.update_content_for_selection();
    }

    fn next_entry(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => (i + 1) % self.entries.len(),
            None => 0,
        };
        self.list_state.select(Some(i));
        self.update_content_for_selection();
    }

    fn previous_entry(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => self.entries.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
        self.update_content_for_selection();
    }

    fn enter_selected(&mut self) {
        if let Some(entry) = self.selected()
            && entry.is_directory()
        {
            let entry = entry.clone();
            self.trail.push(entry);
            self.reload();
        }
    }

    fn leave_directory(&mut self) {
        if self.trail.len() > 1 {
            self.trail.pop();
            self.reload();
        }
    }

    fn update_content_for_selection(&mut self) {
        let Some(entry) = self.selected() else {
            if self.entries.is_empty() {
                self.current_content = vec!["(empty directory)".to_string()];
            }
            return;
        };
        self.current_content = describe(entry);
    }

    fn title(&self) -> String {
        let names: Vec<String> = self
            .trail
            .iter()
            .map(|dir| dir.name().unwrap_or_else(|_| "?".to_string()))
            .collect();
        names.join("/")
    }
}

fn describe(entry: &VirtualFileHandle) -> Vec<String> {
    let name = entry.name().unwrap_or_else(|_| entry.path().to_string());
    if entry.is_directory() {
        let count = entry.list().map(|children| children.len()).unwrap_or(0);
        return vec![
            format!("📁 {name}"),
            String::new(),
            format!("{count} entries"),
            "Press Enter or → to open, ← to go back".to_string(),
        ];
    }

    let length = entry.length().unwrap_or(0);
    let mut lines = vec![
        format!("📄 {name}"),
        format!("{length} bytes, modified {}", entry.last_modified().unwrap_or(0)),
        String::new(),
    ];
    if length > PREVIEW_LIMIT {
        lines.push("(too large to preview)".to_string());
        return lines;
    }
    match entry.read_string() {
        Ok(text) => lines.extend(text.lines().map(str::to_string)),
        Err(e) => lines.push(format!("Error reading file: {e}")),
    }
    lines
}

pub fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Down | KeyCode::Char('j') => app.next_entry(),
                KeyCode::Up | KeyCode::Char('k') => app.previous_entry(),
                KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => app.enter_selected(),
                KeyCode::Left | KeyCode::Backspace | KeyCode::Char('h') => app.leave_directory(),
                KeyCode::Char('r') => app.reload(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(f.area());
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .margin(1)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)].as_ref())
        .split(rows[0]);

    let items: Vec<ListItem> = app
        .entries
        .iter()
        .map(|entry| {
            let icon = if entry.is_directory() { "📁 " } else { "📄 " };
            let name = entry.name().unwrap_or_else(|_| entry.path().to_string());
            ListItem::new(vec![Line::from(vec![Span::raw(format!("{icon}{name}"))])])
        })
        .collect();

    let entries = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(app.title()))
        .highlight_style(Style::default().bg(Color::Yellow).fg(Color::Black));

    f.render_stateful_widget(entries, chunks[0], &mut app.list_state);

    let content_text: Vec<Line> = app
        .current_content
        .iter()
        .map(|line| Line::from(vec![Span::raw(line.clone())]))
        .collect();

    let content = Paragraph::new(content_text)
        .block(Block::default().borders(Borders::ALL).title("Content"))
        .wrap(ratatui::widgets::Wrap { trim: false });

    f.render_widget(content, chunks[1]);

    let help = Line::from(vec![
        Span::raw("q: Quit | "),
        Span::raw("↑/k: Previous | "),
        Span::raw("↓/j: Next | "),
        Span::raw("Enter/→: Open | ←: Back | r: Reload"),
    ]);
    f.render_widget(Paragraph::new(vec![help]), rows[1]);
}
