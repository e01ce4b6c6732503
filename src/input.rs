//! Input Module - Terminal input pumping and event conversion
//!
//! Bridges crossterm's event system with the tesserae event bus: converts
//! crossterm key/mouse/resize events and emits them as bus events. Terminal
//! resize arrives through crossterm's `Resize` event, so no signal handler
//! is installed here.
//!
//! # API
//!
//! - `InputPump::poll` - drain pending terminal events onto the bus
//! - `convert_key_event` - crossterm KeyEvent to [`KeyboardEvent`]
//! - `enable_mouse` / `disable_mouse` - control mouse capture

use crossterm::event::{
    poll, read, DisableMouseCapture, EnableMouseCapture, Event as CrosstermEvent, KeyCode,
    KeyEvent as CrosstermKeyEvent, KeyEventKind, KeyModifiers,
    MouseButton as CrosstermMouseButton, MouseEvent as CrosstermMouseEvent, MouseEventKind,
};
use crossterm::execute;
use std::io::stdout;
use std::time::{Duration, Instant};

use crate::events::{EventBus, EventData, EventType};
use crate::types::V2;

/// A release this close (in time and position) to the matching press counts
/// as a click.
const CLICK_WINDOW: Duration = Duration::from_millis(300);

// =============================================================================
// TYPES
// =============================================================================

/// Keyboard modifier state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Create empty modifiers
    pub fn none() -> Self {
        Self::default()
    }

    /// Create modifiers with ctrl
    pub fn ctrl() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    /// Create modifiers with alt
    pub fn alt() -> Self {
        Self {
            alt: true,
            ..Self::default()
        }
    }

    /// Create modifiers with shift
    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }
}

/// Key event state (press, repeat, release)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyState {
    #[default]
    Press,
    Repeat,
    Release,
}

/// A decoded key press, carried as the payload of `KEY_PRESS` events.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyboardEvent {
    /// The key that was pressed (e.g., "a", "Enter", "ArrowUp")
    pub key: String,
    /// Modifier keys state
    pub modifiers: Modifiers,
    /// Press/repeat/release state
    pub state: KeyState,
}

impl KeyboardEvent {
    /// Create a simple key press event
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifiers: Modifiers::default(),
            state: KeyState::Press,
        }
    }

    /// Create a key press with modifiers
    pub fn with_modifiers(key: impl Into<String>, modifiers: Modifiers) -> Self {
        Self {
            key: key.into(),
            modifiers,
            state: KeyState::Press,
        }
    }
}

/// Mouse button
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    #[default]
    None,
}

// =============================================================================
// EVENT CONVERSION
// =============================================================================

/// Convert a crossterm KeyEvent to a [`KeyboardEvent`].
pub fn convert_key_event(event: CrosstermKeyEvent) -> KeyboardEvent {
    let key = match event.code {
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::Delete => "Delete".to_string(),
        KeyCode::Esc => "Escape".to_string(),
        KeyCode::Up => "ArrowUp".to_string(),
        KeyCode::Down => "ArrowDown".to_string(),
        KeyCode::Left => "ArrowLeft".to_string(),
        KeyCode::Right => "ArrowRight".to_string(),
        KeyCode::Home => "Home".to_string(),
        KeyCode::End => "End".to_string(),
        KeyCode::PageUp => "PageUp".to_string(),
        KeyCode::PageDown => "PageDown".to_string(),
        KeyCode::F(n) => format!("F{}", n),
        KeyCode::Insert => "Insert".to_string(),
        _ => String::new(),
    };

    let state = match event.kind {
        KeyEventKind::Press => KeyState::Press,
        KeyEventKind::Repeat => KeyState::Repeat,
        KeyEventKind::Release => KeyState::Release,
    };

    KeyboardEvent {
        key,
        modifiers: convert_modifiers(event.modifiers),
        state,
    }
}

/// Convert crossterm KeyModifiers to [`Modifiers`].
fn convert_modifiers(mods: KeyModifiers) -> Modifiers {
    Modifiers {
        ctrl: mods.contains(KeyModifiers::CONTROL),
        alt: mods.contains(KeyModifiers::ALT),
        shift: mods.contains(KeyModifiers::SHIFT),
        meta: false, // Not exposed by crossterm
    }
}

/// Convert crossterm MouseButton to [`MouseButton`].
fn convert_mouse_button(btn: CrosstermMouseButton) -> MouseButton {
    match btn {
        CrosstermMouseButton::Left => MouseButton::Left,
        CrosstermMouseButton::Right => MouseButton::Right,
        CrosstermMouseButton::Middle => MouseButton::Middle,
    }
}

// =============================================================================
// INPUT PUMP
// =============================================================================

/// Drains pending terminal events and emits them onto an [`EventBus`].
///
/// Key presses become `KEY_PRESS` events, mouse activity becomes
/// `MOUSE_PRESS`/`MOUSE_RELEASE`/`MOUSE_MOVE` (plus a synthesized
/// `MOUSE_CLICK` when a release lands on the cell it was pressed on within
/// [`CLICK_WINDOW`]), and terminal resize becomes `TERMINAL_SIZE_CHANGE`.
///
/// Exactly one pump should own the terminal's input at a time - two pumps
/// would split the event stream between them.
pub struct InputPump {
    bus: EventBus,
    last_press: Option<(V2, Instant)>,
}

impl InputPump {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            last_press: None,
        }
    }

    /// Drain every pending terminal event without blocking.
    ///
    /// Returns the number of bus events emitted. The queued events become
    /// visible to subscribers on the next `process()` pass.
    pub fn poll(&mut self) -> std::io::Result<usize> {
        let mut emitted = 0;
        while poll(Duration::ZERO)? {
            match read()? {
                CrosstermEvent::Key(key) => emitted += self.handle_key(key),
                CrosstermEvent::Mouse(mouse) => emitted += self.handle_mouse(mouse),
                CrosstermEvent::Resize(width, height) => {
                    self.bus.emit(
                        EventType::TERMINAL_SIZE_CHANGE,
                        EventData::Size(V2::from((width, height))),
                    );
                    emitted += 1;
                }
                _ => {}
            }
        }
        Ok(emitted)
    }

    fn handle_key(&mut self, key: CrosstermKeyEvent) -> usize {
        let converted = convert_key_event(key);
        // Repeats and releases don't become events, matching what a raw
        // terminal read would deliver.
        if converted.state != KeyState::Press || converted.key.is_empty() {
            return 0;
        }
        self.bus.emit(EventType::KEY_PRESS, EventData::Key(converted));
        1
    }

    fn handle_mouse(&mut self, mouse: CrosstermMouseEvent) -> usize {
        let pos = V2::from((mouse.column, mouse.row));
        match mouse.kind {
            MouseEventKind::Down(btn) => {
                let button = convert_mouse_button(btn);
                self.last_press = Some((pos, Instant::now()));
                self.bus
                    .emit(EventType::MOUSE_PRESS, EventData::Mouse { pos, button });
                1
            }
            MouseEventKind::Up(btn) => {
                let button = convert_mouse_button(btn);
                self.bus
                    .emit(EventType::MOUSE_RELEASE, EventData::Mouse { pos, button });
                let clicked = matches!(
                    self.last_press.take(),
                    Some((press_pos, at)) if press_pos == pos && at.elapsed() <= CLICK_WINDOW
                );
                if clicked {
                    self.bus
                        .emit(EventType::MOUSE_CLICK, EventData::Mouse { pos, button });
                    2
                } else {
                    1
                }
            }
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                self.bus.emit(
                    EventType::MOUSE_MOVE,
                    EventData::Mouse {
                        pos,
                        button: MouseButton::None,
                    },
                );
                1
            }
            // No event kind models scroll wheels.
            _ => 0,
        }
    }
}

// =============================================================================
// MOUSE CAPTURE
// =============================================================================

/// Enable mouse event reporting in the terminal.
pub fn enable_mouse() -> std::io::Result<()> {
    execute!(stdout(), EnableMouseCapture)
}

/// Disable mouse event reporting in the terminal.
pub fn disable_mouse() -> std::io::Result<()> {
    execute!(stdout(), DisableMouseCapture)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Propagation;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn key(code: KeyCode, mods: KeyModifiers) -> CrosstermKeyEvent {
        CrosstermKeyEvent::new(code, mods)
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> CrosstermMouseEvent {
        CrosstermMouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn test_convert_plain_char() {
        let converted = convert_key_event(key(KeyCode::Char('a'), KeyModifiers::NONE));
        assert_eq!(converted, KeyboardEvent::new("a"));
    }

    #[test]
    fn test_convert_named_keys() {
        for (code, name) in [
            (KeyCode::Enter, "Enter"),
            (KeyCode::Esc, "Escape"),
            (KeyCode::Up, "ArrowUp"),
            (KeyCode::F(5), "F5"),
        ] {
            let converted = convert_key_event(key(code, KeyModifiers::NONE));
            assert_eq!(converted.key, name);
        }
    }

    #[test]
    fn test_convert_modifiers() {
        let converted = convert_key_event(key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(converted.modifiers, Modifiers::ctrl());

        let converted = convert_key_event(key(
            KeyCode::Char('x'),
            KeyModifiers::ALT | KeyModifiers::SHIFT,
        ));
        assert!(converted.modifiers.alt && converted.modifiers.shift);
        assert!(!converted.modifiers.ctrl);
    }

    #[test]
    fn test_key_press_reaches_the_bus() {
        let bus = EventBus::new();
        let keys: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let keys_clone = keys.clone();
        let _sub = bus.subscribe(EventType::KEY_PRESS, move |event| {
            if let EventData::Key(key) = &event.data {
                keys_clone.borrow_mut().push(key.key.clone());
            }
            Propagation::Continue
        });

        let mut pump = InputPump::new(bus.clone());
        assert_eq!(pump.handle_key(key(KeyCode::Char('q'), KeyModifiers::NONE)), 1);
        bus.process();

        assert_eq!(*keys.borrow(), vec!["q".to_string()]);
    }

    #[test]
    fn test_release_on_same_cell_synthesizes_click() {
        let bus = EventBus::new();
        let sub = bus.listen(EventType::MOUSE_CLICK);
        let mut pump = InputPump::new(bus.clone());

        pump.handle_mouse(mouse(MouseEventKind::Down(CrosstermMouseButton::Left), 3, 4));
        let emitted = pump.handle_mouse(mouse(MouseEventKind::Up(CrosstermMouseButton::Left), 3, 4));
        assert_eq!(emitted, 2); // Release plus synthesized click
        bus.process();

        assert_eq!(sub.pending(), 1);
        let click = sub.events().unwrap().next().unwrap();
        assert_eq!(
            click.data,
            EventData::Mouse {
                pos: V2::new(3, 4),
                button: MouseButton::Left
            }
        );
    }

    #[test]
    fn test_release_elsewhere_is_not_a_click() {
        let bus = EventBus::new();
        let clicks = bus.listen(EventType::MOUSE_CLICK);
        let releases = bus.listen(EventType::MOUSE_RELEASE);
        let mut pump = InputPump::new(bus.clone());

        pump.handle_mouse(mouse(MouseEventKind::Down(CrosstermMouseButton::Left), 3, 4));
        pump.handle_mouse(mouse(MouseEventKind::Up(CrosstermMouseButton::Left), 9, 4));
        bus.process();

        assert_eq!(clicks.pending(), 0);
        assert_eq!(releases.pending(), 1);
    }

    #[test]
    fn test_moves_and_drags_become_mouse_move() {
        let bus = EventBus::new();
        let moves = bus.listen(EventType::MOUSE_MOVE);
        let mut pump = InputPump::new(bus.clone());

        pump.handle_mouse(mouse(MouseEventKind::Moved, 1, 1));
        pump.handle_mouse(mouse(
            MouseEventKind::Drag(CrosstermMouseButton::Left),
            2,
            1,
        ));
        bus.process();

        assert_eq!(moves.pending(), 2);
    }
}
