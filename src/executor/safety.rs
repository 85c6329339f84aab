// Abort flag and pointer-in-corner failsafe.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop flag checked between steps. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// True when `pointer` sits within `margin` pixels of any screen corner.
/// Without a known screen size only the top-left corner is checked.
pub fn in_failsafe_corner(pointer: (i32, i32), screen: Option<(u32, u32)>, margin: i32) -> bool {
    let (x, y) = pointer;
    let near = |v: i32, edge: i32| (v - edge).abs() <= margin;

    if near(x, 0) && near(y, 0) {
        return true;
    }
    let Some((w, h)) = screen else {
        return false;
    };
    let (right, bottom) = (w as i32 - 1, h as i32 - 1);
    (near(x, right) && near(y, 0)) || (near(x, 0) && near(y, bottom)) || (near(x, right) && near(y, bottom))
}
