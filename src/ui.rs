use crate::client::{
    AppSnapshot,
    Tone,
};
use color_eyre::eyre::Result;
use crossterm::{
    event::{
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Connect,
    ToggleSide,
    Flip(String),
    Deposit(String),
    Refresh,
    Redraw,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    spinner: usize,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl UiState {
    pub fn advance_spinner(&mut self) {
        self.spinner = (self.spinner + 1) % SPINNER.len();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    AmountModal(AmountState),
    QuitModal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AmountAction {
    Flip,
    Deposit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AmountState {
    action: AmountAction,
    input: String,
}

impl AmountState {
    fn new(action: AmountAction) -> Self {
        Self {
            action,
            input: String::new(),
        }
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Maps one terminal event onto a user intent, updating modal state on the way.
pub fn handle_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(state, key),
        Event::Resize(..) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn handle_key(state: &mut UiState, key: KeyEvent) -> Option<UserEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    match &mut state.mode {
        Mode::Normal => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('c') => Some(UserEvent::Connect),
            KeyCode::Char('r') => Some(UserEvent::Refresh),
            KeyCode::Char('s') | KeyCode::Tab | KeyCode::Left | KeyCode::Right => {
                Some(UserEvent::ToggleSide)
            }
            KeyCode::Char('f') => {
                state.mode = Mode::AmountModal(AmountState::new(AmountAction::Flip));
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('d') => {
                state.mode = Mode::AmountModal(AmountState::new(AmountAction::Deposit));
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::AmountModal(amount) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let input = std::mem::take(&mut amount.input);
                let action = amount.action;
                state.mode = Mode::Normal;
                Some(match action {
                    AmountAction::Flip => UserEvent::Flip(input),
                    AmountAction::Deposit => UserEvent::Deposit(input),
                })
            }
            KeyCode::Backspace => {
                amount.input.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => {
                amount.input.push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::QuitModal => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // status
            Constraint::Length(3), // wager
            Constraint::Min(6),    // history
            Constraint::Length(6), // errors + help
        ])
        .split(f.area());

    draw_top(f, chunks[0], snap);
    draw_wager(f, state, chunks[1], snap);
    draw_history(f, chunks[2], snap);
    draw_bottom(f, chunks[3], snap);
    draw_modals(f, state);
}

fn draw_top(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let wallet = snap
        .wallet
        .map(|address| address.to_string())
        .unwrap_or_else(|| "not connected".to_owned());
    let balance = snap.balance.as_deref().unwrap_or("-");
    let mut lines = vec![Line::from(format!(
        "Wallet: {} | Balance: {} | Program: {} | Side: {}",
        wallet, balance, snap.variant, snap.side
    ))];
    if snap.agent_missing {
        lines.push(Line::styled(
            "No signing agent found. Install a wallet and press c to retry.",
            Style::default().fg(Color::Red),
        ));
    } else {
        lines.push(Line::from(snap.status.clone()));
    }
    let status =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, area);
}

fn draw_wager(f: &mut Frame, state: &UiState, area: Rect, snap: &AppSnapshot) {
    let line = if snap.wager_state.is_idle() {
        Line::styled("Ready", Style::default().fg(Color::DarkGray))
    } else {
        Line::styled(
            format!("{} {}", SPINNER[state.spinner], snap.wager_state.label()),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    };
    let wager = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Wager"));
    f.render_widget(wager, area);
}

fn tone_style(tone: Tone) -> Style {
    match tone {
        Tone::Success => Style::default().fg(Color::Green),
        Tone::Failure => Style::default().fg(Color::Red),
        Tone::Neutral => Style::default(),
    }
}

fn draw_history(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines: Vec<Line> = snap
        .history
        .iter()
        .map(|row| Line::styled(row.text.clone(), tone_style(row.tone)))
        .collect();
    if lines.is_empty() {
        lines.push(Line::styled("None", Style::default().fg(Color::DarkGray)));
    }
    // most recent last; keep the tail in view
    let visible = usize::from(area.height.saturating_sub(2));
    let skip = lines.len().saturating_sub(visible);
    let history = Paragraph::new(lines.split_off(skip))
        .block(Block::default().borders(Borders::ALL).title("History"));
    f.render_widget(history, area);
}

fn draw_bottom(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let mut lines: Vec<Line> = Vec::new();
    for err in snap.errors.iter().rev().take(4) {
        lines.push(Line::from(err.clone()));
    }
    let color = if snap.errors.is_empty() {
        Color::DarkGray
    } else {
        Color::Red
    };
    let errors = Paragraph::new(lines)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Errors"));
    f.render_widget(errors, chunks[0]);

    let help = Paragraph::new(
        "c connect | s/Tab side | f flip | d deposit\nr refresh balance | q quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[1]);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match &state.mode {
        Mode::AmountModal(amount) => {
            let title = match amount.action {
                AmountAction::Flip => "Flip Amount",
                AmountAction::Deposit => "Deposit Amount",
            };
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title(title);
            let p = Paragraph::new(format!(
                "Amount: {}\nEnter=confirm Esc=cancel",
                amount.input
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
