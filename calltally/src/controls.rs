use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::DriverError;
use crate::selector::Selector;

/// Platform-facing face of a single live control.
///
/// Implementations wrap a native accessibility element; every method is a
/// blocking round-trip into the platform API.
pub trait ControlImpl: Send + Sync + Debug {
    fn role(&self) -> String;
    fn name(&self) -> Option<String>;
    fn automation_id(&self) -> Option<String>;
    fn is_visible(&self) -> Result<bool, DriverError>;
    fn is_toggled(&self) -> Result<bool, DriverError>;
    fn toggle(&self) -> Result<(), DriverError>;
    fn click(&self) -> Result<(), DriverError>;
    fn right_click(&self) -> Result<(), DriverError>;
    fn focus(&self) -> Result<(), DriverError>;
    fn type_text(&self, text: &str) -> Result<(), DriverError>;
    fn press_key(&self, key: &str) -> Result<(), DriverError>;
    /// Visible text of the control (its value if it has one, else its name).
    fn text(&self) -> Result<String, DriverError>;
    fn children(&self) -> Result<Vec<Control>, DriverError>;
    /// Downcast hook for backends that need their native element back.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A handle to a control in the host application's UI tree.
#[derive(Clone, Debug)]
pub struct Control {
    inner: Arc<dyn ControlImpl>,
}

impl Control {
    pub fn new(inner: Arc<dyn ControlImpl>) -> Self {
        Self { inner }
    }

    pub fn role(&self) -> String {
        self.inner.role()
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name()
    }

    pub fn automation_id(&self) -> Option<String> {
        self.inner.automation_id()
    }

    pub fn is_visible(&self) -> Result<bool, DriverError> {
        self.inner.is_visible()
    }

    pub fn is_toggled(&self) -> Result<bool, DriverError> {
        self.inner.is_toggled()
    }

    pub fn toggle(&self) -> Result<(), DriverError> {
        self.inner.toggle()
    }

    pub fn click(&self) -> Result<(), DriverError> {
        self.inner.click()
    }

    pub fn right_click(&self) -> Result<(), DriverError> {
        self.inner.right_click()
    }

    pub fn focus(&self) -> Result<(), DriverError> {
        self.inner.focus()
    }

    pub fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.inner.type_text(text)
    }

    pub fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.inner.press_key(key)
    }

    pub fn text(&self) -> Result<String, DriverError> {
        self.inner.text()
    }

    pub fn children(&self) -> Result<Vec<Control>, DriverError> {
        self.inner.children()
    }

    /// Downcast hook for backend implementations.
    pub fn impl_as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }

    /// Number of direct children with the given role, case-insensitive.
    ///
    /// The results grid surfaces one child per data row, so this doubles as
    /// the query-completion signal.
    pub fn child_count_by_role(&self, role: &str) -> Result<usize, DriverError> {
        let children = self.inner.children()?;
        Ok(children
            .iter()
            .filter(|c| c.role().eq_ignore_ascii_case(role))
            .count())
    }
}

/// The seam between the pipeline and a platform accessibility API.
///
/// Selector semantics shared by all backends: `Id` compares the native
/// automation id, `Title` the exact name, `TitlePattern` a regex over the
/// name, `Role` the control role (case-insensitive) plus an exact name when
/// one is given, and `Chain` resolves each step inside the previous match.
pub trait UiBackend: Send + Sync {
    /// Top-level window whose title matches the given regex.
    fn find_window(&self, title_pattern: &str, timeout: Duration)
        -> Result<Control, DriverError>;

    /// Resolve `selector` beneath `root`, or beneath the desktop when `root`
    /// is `None`, waiting up to `timeout` for it to appear.
    fn find(
        &self,
        root: Option<&Control>,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Control, DriverError>;

    /// Launch an executable; used when the host application is not running.
    fn launch(&self, path: &str) -> Result<(), DriverError>;

    /// All top-level windows belonging to the process that owns `window`.
    /// Dialog boxes raised by that process show up here.
    fn process_windows(&self, window: &Control) -> Result<Vec<Control>, DriverError>;
}

/// Render the accessibility tree under `root` as indented `[role] name aid`
/// lines, one per node, up to `max_depth` levels.
///
/// Diagnostic used to recover automation ids after a host-app update.
pub fn dump_tree(root: &Control, max_depth: usize) -> Vec<String> {
    let mut lines = Vec::new();
    walk(root, 0, max_depth, &mut lines);
    lines
}

fn walk(control: &Control, depth: usize, max_depth: usize, lines: &mut Vec<String>) {
    if depth > max_depth {
        return;
    }
    let indent = "  ".repeat(depth);
    lines.push(format!(
        "{indent}[{}] name='{}' aid='{}'",
        control.role(),
        control.name().unwrap_or_default(),
        control.automation_id().unwrap_or_default(),
    ));
    if let Ok(children) = control.children() {
        for child in children {
            walk(&child, depth + 1, max_depth, lines);
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory control tree used by the unit tests in place of a desktop.

    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug)]
    pub struct FakeControl {
        pub role: String,
        pub name: Option<String>,
        pub automation_id: Option<String>,
        pub toggled: Mutex<bool>,
        pub children: Mutex<Vec<Control>>,
        pub fail_click: bool,
        pub actions: Arc<Mutex<Vec<String>>>,
    }

    impl FakeControl {
        pub fn node(role: &str, name: Option<&str>, aid: Option<&str>) -> Arc<FakeControl> {
            Arc::new(FakeControl {
                role: role.to_string(),
                name: name.map(str::to_string),
                automation_id: aid.map(str::to_string),
                toggled: Mutex::new(false),
                children: Mutex::new(Vec::new()),
                fail_click: false,
                actions: Arc::new(Mutex::new(Vec::new())),
            })
        }

        pub fn with_children(self: Arc<Self>, children: Vec<Arc<FakeControl>>) -> Arc<Self> {
            *self.children.lock().unwrap() = children
                .into_iter()
                .map(|c| Control::new(c as Arc<dyn ControlImpl>))
                .collect();
            self
        }

        fn label(&self) -> String {
            self.name
                .clone()
                .or_else(|| self.automation_id.clone())
                .unwrap_or_else(|| self.role.clone())
        }

        fn record(&self, action: &str) {
            self.actions.lock().unwrap().push(action.to_string());
        }
    }

    impl ControlImpl for FakeControl {
        fn role(&self) -> String {
            self.role.clone()
        }

        fn name(&self) -> Option<String> {
            self.name.clone()
        }

        fn automation_id(&self) -> Option<String> {
            self.automation_id.clone()
        }

        fn is_visible(&self) -> Result<bool, DriverError> {
            Ok(true)
        }

        fn is_toggled(&self) -> Result<bool, DriverError> {
            Ok(*self.toggled.lock().unwrap())
        }

        fn toggle(&self) -> Result<(), DriverError> {
            let mut toggled = self.toggled.lock().unwrap();
            *toggled = !*toggled;
            self.record(&format!("toggle:{}", self.label()));
            Ok(())
        }

        fn click(&self) -> Result<(), DriverError> {
            if self.fail_click {
                return Err(DriverError::PlatformError("click rejected".into()));
            }
            self.record(&format!("click:{}", self.label()));
            Ok(())
        }

        fn right_click(&self) -> Result<(), DriverError> {
            self.record(&format!("right_click:{}", self.label()));
            Ok(())
        }

        fn focus(&self) -> Result<(), DriverError> {
            self.record(&format!("focus:{}", self.label()));
            Ok(())
        }

        fn type_text(&self, text: &str) -> Result<(), DriverError> {
            self.record(&format!("type:{}:{}", self.label(), text));
            Ok(())
        }

        fn press_key(&self, key: &str) -> Result<(), DriverError> {
            self.record(&format!("key:{}:{}", self.label(), key));
            Ok(())
        }

        fn text(&self) -> Result<String, DriverError> {
            Ok(self.name.clone().unwrap_or_default())
        }

        fn children(&self) -> Result<Vec<Control>, DriverError> {
            Ok(self.children.lock().unwrap().clone())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    pub struct FakeBackend {
        pub windows: Mutex<Vec<Control>>,
    }

    impl FakeBackend {
        pub fn new(windows: Vec<Arc<FakeControl>>) -> Self {
            Self {
                windows: Mutex::new(
                    windows
                        .into_iter()
                        .map(|c| Control::new(c as Arc<dyn ControlImpl>))
                        .collect(),
                ),
            }
        }

        fn matches(control: &Control, selector: &Selector) -> bool {
            match selector {
                Selector::Id(id) => control.automation_id().as_deref() == Some(id.as_str()),
                Selector::Title(t) => control.name().as_deref() == Some(t.as_str()),
                Selector::TitlePattern(p) => regex::Regex::new(p)
                    .map(|re| control.name().map(|n| re.is_match(&n)).unwrap_or(false))
                    .unwrap_or(false),
                Selector::Role { role, name } => {
                    control.role().eq_ignore_ascii_case(role)
                        && name
                            .as_ref()
                            .map(|n| control.name().as_deref() == Some(n.as_str()))
                            .unwrap_or(true)
                }
                Selector::Chain(_) | Selector::Invalid(_) => false,
            }
        }

        fn search(root: &Control, selector: &Selector) -> Option<Control> {
            if Self::matches(root, selector) {
                return Some(root.clone());
            }
            for child in root.children().ok()? {
                if let Some(found) = Self::search(&child, selector) {
                    return Some(found);
                }
            }
            None
        }
    }

    impl UiBackend for FakeBackend {
        fn find_window(
            &self,
            title_pattern: &str,
            _timeout: Duration,
        ) -> Result<Control, DriverError> {
            let re = regex::Regex::new(title_pattern)
                .map_err(|e| DriverError::InvalidSelector(e.to_string()))?;
            self.windows
                .lock()
                .unwrap()
                .iter()
                .find(|w| w.name().map(|n| re.is_match(&n)).unwrap_or(false))
                .cloned()
                .ok_or_else(|| {
                    DriverError::ControlNotFound(format!("no window matching {title_pattern:?}"))
                })
        }

        fn find(
            &self,
            root: Option<&Control>,
            selector: &Selector,
            timeout: Duration,
        ) -> Result<Control, DriverError> {
            if let Selector::Chain(steps) = selector {
                let mut current = root.cloned();
                for step in steps {
                    current = Some(self.find(current.as_ref(), step, timeout)?);
                }
                return current
                    .ok_or_else(|| DriverError::InvalidSelector("empty chain".to_string()));
            }

            let roots: Vec<Control> = match root {
                Some(r) => vec![r.clone()],
                None => self.windows.lock().unwrap().clone(),
            };
            roots
                .iter()
                .find_map(|r| Self::search(r, selector))
                .ok_or_else(|| DriverError::ControlNotFound(selector.to_string()))
        }

        fn launch(&self, _path: &str) -> Result<(), DriverError> {
            Ok(())
        }

        fn process_windows(&self, _window: &Control) -> Result<Vec<Control>, DriverError> {
            Ok(self.windows.lock().unwrap().clone())
        }
    }
}
