// Physical input simulation through enigo.
use async_trait::async_trait;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{ReplayError, ReplayResult};
use crate::workflow::types::ScrollDirection;

/// OS-level mouse and keyboard injection.
#[async_trait]
pub trait InputInjector: Send + Sync {
    async fn click(&self, x: i32, y: i32) -> ReplayResult<()>;
    async fn type_text(&self, text: &str) -> ReplayResult<()>;
    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> ReplayResult<()>;
    async fn key_press(&self, key: &str) -> ReplayResult<()>;

    /// Current pointer position, used by the corner failsafe.
    /// Injectors that cannot read it return `None`.
    async fn pointer_position(&self) -> ReplayResult<Option<(i32, i32)>> {
        Ok(None)
    }
}

/// Injects input through `enigo`. A fresh connection is opened per call on a
/// blocking thread.
#[derive(Debug, Default, Clone)]
pub struct EnigoInjector;

impl EnigoInjector {
    pub fn new() -> Self {
        Self
    }
}

async fn with_enigo<T, F>(op: F) -> ReplayResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Enigo) -> Result<T, String> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| ReplayError::Input(format!("enigo init: {e}")))?;
        op(&mut enigo).map_err(ReplayError::Input)
    })
    .await
    .map_err(|e| ReplayError::Input(format!("join: {e}")))?
}

#[async_trait]
impl InputInjector for EnigoInjector {
    async fn click(&self, x: i32, y: i32) -> ReplayResult<()> {
        tracing::debug!(x, y, "mouse click");
        with_enigo(move |enigo| {
            enigo
                .move_mouse(x, y, Coordinate::Abs)
                .map_err(|e| format!("move: {e}"))?;
            enigo
                .button(Button::Left, Direction::Click)
                .map_err(|e| format!("click: {e}"))
        })
        .await
    }

    async fn type_text(&self, text: &str) -> ReplayResult<()> {
        tracing::debug!(chars = text.chars().count(), "typing text");
        let text = text.to_string();
        with_enigo(move |enigo| enigo.text(&text).map_err(|e| format!("text: {e}"))).await
    }

    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> ReplayResult<()> {
        tracing::debug!(?direction, amount, "scroll");
        let (length, axis) = match direction {
            ScrollDirection::Up => (-amount, Axis::Vertical),
            ScrollDirection::Down => (amount, Axis::Vertical),
            ScrollDirection::Left => (-amount, Axis::Horizontal),
            ScrollDirection::Right => (amount, Axis::Horizontal),
        };
        with_enigo(move |enigo| enigo.scroll(length, axis).map_err(|e| format!("scroll: {e}"))).await
    }

    async fn key_press(&self, key: &str) -> ReplayResult<()> {
        let parsed = parse_key(key)
            .ok_or_else(|| ReplayError::Input(format!("unknown key '{key}'")))?;
        tracing::debug!(key, "key press");
        with_enigo(move |enigo| {
            enigo
                .key(parsed, Direction::Click)
                .map_err(|e| format!("key: {e}"))
        })
        .await
    }

    async fn pointer_position(&self) -> ReplayResult<Option<(i32, i32)>> {
        with_enigo(|enigo| enigo.location().map(Some).map_err(|e| format!("location: {e}"))).await
    }
}

/// Maps a recorded key name (`enter`, `Key.tab`, `a`) to an enigo key.
fn parse_key(name: &str) -> Option<Key> {
    let name = name.trim();
    let lower = name.trim_start_matches("Key.").to_lowercase();
    let key = match lower.as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "space" => Key::Space,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" => Key::PageUp,
        "pagedown" | "page_down" => Key::PageDown,
        _ => {
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return None,
            }
        }
    };
    Some(key)
}
