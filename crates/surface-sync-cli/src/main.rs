use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent as TermKey,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{error, info};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use std::{
    env,
    fs::File,
    io::stdout,
    path::PathBuf,
    process,
    time::{Duration, Instant},
};
use surface_sync_config::Config;
use surface_sync_engine::{
    ClipboardPayload, Key, KeyEvent, ModelDocument, SequenceSpec, Surface, SurfaceConfig,
    SurfaceNotification, TypeRegistry, read_document, to_text, write_document,
};

const NOTIFICATION_HISTORY: usize = 12;

struct App {
    document_path: PathBuf,
    surface: Surface,
    clipboard: Option<ClipboardPayload>,
    notifications: Vec<String>,
    status: String,
}

impl App {
    fn new(document_path: PathBuf, config: &SurfaceConfig) -> Result<Self> {
        let data = if document_path.exists() {
            read_document(&document_path)?
        } else {
            surface_sync_engine::parse_text("")
        };
        let document = ModelDocument::new(data, TypeRegistry::standard())
            .with_context(|| format!("invalid document {}", document_path.display()))?;
        let mut surface = Surface::new(document, config)?;
        surface.focus()?;
        info!("editing {}", document_path.display());

        Ok(Self {
            document_path,
            surface,
            clipboard: None,
            notifications: Vec::new(),
            status: String::new(),
        })
    }

    fn handle_key(&mut self, key: TermKey) -> Result<bool> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') if ctrl => return Ok(false),
            KeyCode::Char('s') if ctrl => self.save(),
            KeyCode::Char('c') if ctrl => {
                self.clipboard = self.surface.copy();
            }
            KeyCode::Char('x') if ctrl => {
                self.clipboard = self.surface.cut()?;
            }
            KeyCode::Char('v') if ctrl => {
                if let Some(payload) = &self.clipboard {
                    self.surface.paste(Some(&payload.key), &payload.text)?;
                }
            }
            KeyCode::Tab => {
                if self.surface.is_deactivated() {
                    self.surface.activate()?;
                } else {
                    self.surface.deactivate()?;
                }
            }
            _ => {
                if let Some(event) = surface_key(&key) {
                    self.surface.press(event)?;
                }
            }
        }
        Ok(true)
    }

    fn save(&mut self) {
        self.status = match write_document(&self.document_path, self.surface.document().data()) {
            Ok(()) => format!("Saved {}", self.document_path.display()),
            Err(e) => {
                error!("save failed: {e:#}");
                format!("Error saving: {e:#}")
            }
        };
    }

    fn collect_notifications(&mut self) {
        for notification in self.surface.take_notifications() {
            // Selection changes arrive on every poll and drown out the rest
            if matches!(notification, SurfaceNotification::SelectionChanged(_)) {
                continue;
            }
            self.notifications.push(format!("{notification:?}"));
        }
        let excess = self.notifications.len().saturating_sub(NOTIFICATION_HISTORY);
        self.notifications.drain(..excess);
    }

    /// One line per top-level element of the rendered tree
    fn tree_lines(&self) -> Vec<String> {
        let Some(root) = self.surface.root_element() else {
            return Vec::new();
        };
        let dom = self.surface.dom();
        dom.children(root)
            .iter()
            .map(|&child| dom.serialize(child))
            .collect()
    }

    fn state_lines(&self) -> Vec<String> {
        let native = self.surface.dom().selection().map(|selection| {
            let anchor = self.surface.get_offset_at(selection.anchor);
            let focus = self.surface.get_offset_at(selection.focus);
            format!("{anchor:?} -> {focus:?}")
        });
        let markers = self
            .surface
            .markers()
            .holder()
            .map(|holder| format!("view {} {:?}", holder.branch, holder.annotations.names()));

        let mut lines = vec![
            format!("Model selection: {:?}", self.surface.selection()),
            format!("Native selection: {}", native.unwrap_or_else(|| "none".to_string())),
            format!(
                "Insertion annotations: {:?}",
                self.surface.model().insertion_annotations().names()
            ),
            format!("Markers: {}", markers.unwrap_or_else(|| "none".to_string())),
            format!("Focused node: {:?}", self.surface.focused_node()),
            format!("Deactivated: {}", self.surface.is_deactivated()),
            format!("Polling: {}", self.surface.observer().timer().is_running()),
            String::new(),
            "Notifications:".to_string(),
        ];
        lines.extend(self.notifications.iter().rev().cloned());
        lines
    }
}

/// Keys the surface understands; everything else is ignored
fn surface_key(key: &TermKey) -> Option<KeyEvent> {
    let surface_key = match key.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        _ => return None,
    };
    let mut event = KeyEvent::new(surface_key);
    // Shifted characters already arrive in the right case
    if key.modifiers.contains(KeyModifiers::SHIFT) && !matches!(surface_key, Key::Char(_)) {
        event = event.with_shift();
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        event = event.with_ctrl();
    }
    event.alt = key.modifiers.contains(KeyModifiers::ALT);
    Some(event)
}

fn surface_config(config: &Config) -> SurfaceConfig {
    SurfaceConfig {
        poll_interval_ms: config.surface.poll_interval_ms,
        slug_filler: config.surface.slug_filler,
        leaf_placeholder: config.surface.leaf_placeholder,
        sequences: config
            .sequences
            .iter()
            .map(|sequence| SequenceSpec {
                name: sequence.name.clone(),
                pattern: sequence.pattern.clone(),
                replacement: sequence.replacement.clone(),
            })
            .collect(),
    }
}

/// Log to the file named by `SURFACE_SYNC_LOG`; the terminal belongs to the UI
fn init_logging() -> Result<()> {
    let Some(log_path) = env::var_os("SURFACE_SYNC_LOG") else {
        return Ok(());
    };
    let file = File::create(&log_path)
        .with_context(|| format!("failed to create log file {}", log_path.to_string_lossy()))?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    // Determine document path from CLI args or config file
    let args: Vec<String> = env::args().collect();
    let config_path = Config::config_path();

    let config = match Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let document_path = match args.len() {
        2 => PathBuf::from(&args[1]),
        1 => match config.document_path.clone() {
            Some(path) => path,
            None => {
                eprintln!("Error: No document path provided and none configured");
                eprintln!("Usage: {} <document>", args[0]);
                eprintln!(
                    "Or set document_path in the config file at {}",
                    config_path.display()
                );
                process::exit(1);
            }
        },
        _ => {
            eprintln!("Usage: {} [document]", args[0]);
            process::exit(1);
        }
    };

    // Create app before touching the terminal so errors print normally
    let mut app = App::new(document_path, &surface_config(&config))?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let res = run_app(&mut terminal, &mut app, config.surface.poll_interval_ms);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    poll_interval_ms: u64,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let mut last_tick = Instant::now();
    loop {
        app.collect_notifications();
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(poll_interval_ms))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && !app.handle_key(key)?
        {
            return Ok(());
        }

        let elapsed = last_tick.elapsed().as_millis() as u64;
        last_tick = Instant::now();
        app.surface.advance_timer(elapsed)?;
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(f.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .margin(1)
        .constraints(
            [
                Constraint::Percentage(40),
                Constraint::Percentage(30),
                Constraint::Percentage(30),
            ]
            .as_ref(),
        )
        .split(rows[0]);

    // Rendered surface tree
    let tree_items: Vec<ListItem> = app
        .tree_lines()
        .into_iter()
        .map(|line| ListItem::new(vec![Line::from(vec![Span::raw(line)])]))
        .collect();
    let tree = List::new(tree_items).block(Block::default().borders(Borders::ALL).title("Surface"));
    f.render_widget(tree, columns[0]);

    // Model as plain text
    let model_text: Vec<Line> = to_text(app.surface.document().data())
        .lines()
        .map(|line| Line::from(vec![Span::raw(line.to_string())]))
        .collect();
    let model = Paragraph::new(model_text)
        .block(Block::default().borders(Borders::ALL).title("Model"))
        .wrap(Wrap { trim: false });
    f.render_widget(model, columns[1]);

    let state_text: Vec<Line> = app
        .state_lines()
        .into_iter()
        .map(|line| Line::from(vec![Span::raw(line)]))
        .collect();
    let state_title = if app.surface.is_deactivated() {
        "State (deactivated)"
    } else {
        "State"
    };
    let state = Paragraph::new(state_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(state_title)
                .border_style(Style::default().fg(if app.surface.is_deactivated() {
                    Color::Yellow
                } else {
                    Color::Reset
                })),
        )
        .wrap(Wrap { trim: true });
    f.render_widget(state, columns[2]);

    // Instructions
    let mut help_spans = vec![
        Span::raw("Ctrl+Q: Quit | "),
        Span::raw("Ctrl+S: Save | "),
        Span::raw("Ctrl+B/I/U: Bold/Italic/Underline | "),
        Span::raw("Ctrl+C/X/V: Copy/Cut/Paste | "),
        Span::raw("Tab: (De)activate"),
    ];
    if !app.status.is_empty() {
        help_spans.push(Span::styled(
            format!("  {}", app.status),
            Style::default().fg(Color::Green),
        ));
    }
    let help = Paragraph::new(vec![Line::from(help_spans)]).block(Block::default());
    f.render_widget(help, rows[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use surface_sync_config::{SequenceConfig, SurfaceSection};
    use tempfile::TempDir;

    #[test]
    fn test_surface_key_mapping() {
        let shifted_left = TermKey::new(KeyCode::Left, KeyModifiers::SHIFT);
        assert_eq!(
            surface_key(&shifted_left),
            Some(KeyEvent::new(Key::Left).with_shift())
        );

        let upper = TermKey::new(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(surface_key(&upper), Some(KeyEvent::new(Key::Char('A'))));

        let bold = TermKey::new(KeyCode::Char('b'), KeyModifiers::CONTROL);
        assert_eq!(
            surface_key(&bold),
            Some(KeyEvent::new(Key::Char('b')).with_ctrl())
        );

        assert_eq!(surface_key(&TermKey::from(KeyCode::F(1))), None);
    }

    #[test]
    fn test_surface_config_from_file_config() {
        let config = Config {
            document_path: None,
            surface: SurfaceSection {
                poll_interval_ms: 50,
                slug_filler: '~',
                leaf_placeholder: '*',
            },
            sequences: vec![SequenceConfig {
                name: "arrow".to_string(),
                pattern: "->".to_string(),
                replacement: Some("→".to_string()),
            }],
        };

        let surface_config = surface_config(&config);

        assert_eq!(surface_config.poll_interval_ms, 50);
        assert_eq!(surface_config.slug_filler, '~');
        assert_eq!(surface_config.leaf_placeholder, '*');
        assert_eq!(
            surface_config.sequences,
            vec![SequenceSpec::new("arrow", "->").with_replacement("→")]
        );
    }

    #[test]
    fn test_typing_and_saving() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.txt");
        std::fs::write(&path, "hello\n").unwrap();
        let mut app = App::new(path.clone(), &SurfaceConfig::default()).unwrap();
        app.surface
            .apply_model_change(None, Some(surface_sync_engine::Selection::collapsed(6)))
            .unwrap();

        for c in "!!".chars() {
            assert!(app.handle_key(TermKey::from(KeyCode::Char(c))).unwrap());
        }
        assert!(
            app.handle_key(TermKey::new(KeyCode::Char('s'), KeyModifiers::CONTROL))
                .unwrap()
        );

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello!!\n");
        assert!(app.status.starts_with("Saved"));
        assert!(
            !app.handle_key(TermKey::new(KeyCode::Char('q'), KeyModifiers::CONTROL))
                .unwrap()
        );
    }

    #[test]
    fn test_tab_toggles_deactivation() {
        let temp_dir = TempDir::new().unwrap();
        let mut app = App::new(temp_dir.path().join("new.txt"), &SurfaceConfig::default()).unwrap();

        app.handle_key(TermKey::from(KeyCode::Tab)).unwrap();
        assert!(app.surface.is_deactivated());
        app.handle_key(TermKey::from(KeyCode::Tab)).unwrap();
        assert!(!app.surface.is_deactivated());
    }
}
