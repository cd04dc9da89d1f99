use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use ratatui::Frame;

use crate::error::Result;
use crate::fmt::amount;

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Yellow)
    .add_modifier(Modifier::BOLD);

pub const FOOTER_STYLE: Style = Style::new().fg(Color::DarkGray);

pub const AMOUNT_STYLE: Style = Style::new().fg(Color::Rgb(80, 220, 100));
pub const ERROR_STYLE: Style = Style::new().fg(Color::Red);
pub const FOCUS_STYLE: Style = Style::new().fg(Color::Cyan);

/// Right-aligned amount with thousands separators.
pub fn amount_span(val: f64, width: usize) -> Span<'static> {
    Span::styled(format!("{:>width$}", amount(val)), AMOUNT_STYLE)
}

/// Wrap text to a given width. Returns (wrapped_string, line_count).
pub fn wrap_text(text: &str, width: usize) -> (String, u16) {
    if width == 0 {
        return (text.to_string(), 1);
    }
    let wrapped = textwrap::fill(text, width);
    let lines = wrapped.lines().count().max(1) as u16;
    (wrapped, lines)
}

pub enum ViewAction {
    Continue,
    Close,
}

pub trait View {
    fn draw(&mut self, frame: &mut Frame);
    fn handle_key(&mut self, code: KeyCode) -> ViewAction;
}

/// Restores the terminal when the view loop ends, however it ends.
struct RestoreGuard;

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        ratatui::restore();
    }
}

/// Next key press; releases, repeats and non-key events yield `None`.
fn next_press() -> Result<Option<KeyEvent>> {
    match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
        _ => Ok(None),
    }
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
}

/// Drive `view` until it closes or the user presses Ctrl-C.
pub fn run_view(view: &mut dyn View) -> Result<()> {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        ratatui::restore();
        previous(info);
    }));

    let mut terminal = ratatui::init();
    let _restore = RestoreGuard;

    loop {
        terminal.draw(|frame| view.draw(frame))?;
        let Some(key) = next_press()? else {
            continue;
        };
        if is_interrupt(&key) {
            return Ok(());
        }
        if let ViewAction::Close = view.handle_key(key.code) {
            return Ok(());
        }
    }
}
