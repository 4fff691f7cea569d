use serde::{Deserialize, Serialize};

/// A named rolling duration, e.g. `5m` = 300 000 ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub name: String,
    pub duration_ms: i64,
}

impl WindowSpec {
    pub fn seconds(n: i64) -> Self {
        Self { name: format!("{n}s"), duration_ms: n * 1_000 }
    }

    pub fn minutes(n: i64) -> Self {
        Self { name: format!("{n}m"), duration_ms: n * 60_000 }
    }
}

/// One retained sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point<V> {
    pub value: V,
    pub timestamp: i64,
}

/// Current statistic of one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowValue<S> {
    pub name: String,
    pub duration_ms: i64,
    pub stat: S,
}

/// The full, fixed set of windows of one symbol, in declaration order.
/// Every declared window is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSet<S> {
    windows: Vec<WindowValue<S>>,
}

impl<S: Default> WindowSet<S> {
    pub(crate) fn new(specs: &[WindowSpec]) -> Self {
        let windows = specs
            .iter()
            .map(|spec| WindowValue {
                name: spec.name.clone(),
                duration_ms: spec.duration_ms,
                stat: S::default(),
            })
            .collect();
        Self { windows }
    }
}

impl<S> WindowSet<S> {
    pub fn get(&self, name: &str) -> Option<&S> {
        self.windows.iter().find(|w| w.name == name).map(|w| &w.stat)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowValue<S>> {
        self.windows.iter()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut WindowValue<S>> {
        self.windows.iter_mut()
    }
}
