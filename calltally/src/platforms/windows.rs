//! Windows accessibility backend built on UI Automation.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uiautomation::controls::ControlType;
use uiautomation::patterns;
use uiautomation::types::{ToggleState, TreeScope};
use uiautomation::UIAutomation;

use crate::controls::{Control, ControlImpl, UiBackend};
use crate::errors::DriverError;
use crate::selector::Selector;

// UIAutomation and its elements are COM pointers the crate marks !Send; the
// pipeline only touches them from one blocking section at a time.
#[derive(Clone)]
struct ThreadSafeWinUIAutomation(Arc<UIAutomation>);

#[allow(clippy::non_send_fields_in_send_ty)]
unsafe impl Send for ThreadSafeWinUIAutomation {}
unsafe impl Sync for ThreadSafeWinUIAutomation {}

#[derive(Clone)]
struct ThreadSafeWinUIElement(Arc<uiautomation::UIElement>);

unsafe impl Send for ThreadSafeWinUIElement {}
unsafe impl Sync for ThreadSafeWinUIElement {}

impl std::fmt::Debug for ThreadSafeWinUIAutomation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UIAutomation")
    }
}

impl std::fmt::Debug for ThreadSafeWinUIElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UIElement({:?})", self.0.get_name().unwrap_or_default())
    }
}

pub struct WindowsBackend {
    automation: ThreadSafeWinUIAutomation,
}

impl WindowsBackend {
    pub fn new() -> Result<Self, DriverError> {
        let automation =
            UIAutomation::new().map_err(|e| DriverError::PlatformError(e.to_string()))?;
        Ok(Self {
            automation: ThreadSafeWinUIAutomation(Arc::new(automation)),
        })
    }

    fn wrap(&self, element: uiautomation::UIElement) -> Control {
        Control::new(Arc::new(WindowsControl {
            element: ThreadSafeWinUIElement(Arc::new(element)),
            automation: self.automation.clone(),
        }))
    }

    fn control_type_for(role: &str) -> Result<ControlType, DriverError> {
        let ct = match role.to_ascii_lowercase().as_str() {
            "window" => ControlType::Window,
            "pane" => ControlType::Pane,
            "button" => ControlType::Button,
            "checkbox" => ControlType::CheckBox,
            "menuitem" => ControlType::MenuItem,
            "menubar" => ControlType::MenuBar,
            "table" => ControlType::Table,
            "datagrid" => ControlType::DataGrid,
            "dataitem" => ControlType::DataItem,
            "edit" => ControlType::Edit,
            "document" => ControlType::Document,
            "group" => ControlType::Group,
            "custom" => ControlType::Custom,
            "text" => ControlType::Text,
            other => {
                return Err(DriverError::InvalidSelector(format!(
                    "unknown control role {other:?}"
                )))
            }
        };
        Ok(ct)
    }

    fn native(control: &Control) -> Result<Arc<uiautomation::UIElement>, DriverError> {
        control
            .impl_as_any()
            .downcast_ref::<WindowsControl>()
            .map(|c| c.element.0.clone())
            .ok_or_else(|| {
                DriverError::PlatformError("control does not belong to the Windows backend".into())
            })
    }

    fn find_one(
        &self,
        root: Option<&Control>,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<uiautomation::UIElement, DriverError> {
        let root_element = match root {
            Some(control) => Self::native(control)?,
            None => Arc::new(
                self.automation
                    .0
                    .get_root_element()
                    .map_err(|e| DriverError::PlatformError(e.to_string()))?,
            ),
        };

        let mut matcher = self
            .automation
            .0
            .create_matcher()
            .from_ref(&root_element)
            .depth(10)
            .timeout(timeout.as_millis() as u64);

        match selector {
            Selector::Id(id) => {
                let id = id.clone();
                matcher = matcher.filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                    Ok(e.get_automation_id().unwrap_or_default() == id)
                }));
            }
            Selector::Title(title) => {
                let title = title.clone();
                matcher = matcher.filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                    Ok(e.get_name().unwrap_or_default() == title)
                }));
            }
            Selector::TitlePattern(pattern) => {
                let re = regex::Regex::new(pattern)
                    .map_err(|e| DriverError::InvalidSelector(e.to_string()))?;
                matcher = matcher.filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                    Ok(re.is_match(&e.get_name().unwrap_or_default()))
                }));
            }
            Selector::Role { role, name } => {
                matcher = matcher.control_type(Self::control_type_for(role)?);
                if let Some(name) = name {
                    let name = name.clone();
                    matcher = matcher.filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                        Ok(e.get_name().unwrap_or_default() == name)
                    }));
                }
            }
            Selector::Chain(_) => {
                return Err(DriverError::InvalidSelector(
                    "chains are resolved step by step".into(),
                ))
            }
            Selector::Invalid(reason) => {
                return Err(DriverError::InvalidSelector(reason.clone()));
            }
        }

        matcher
            .find_first()
            .map_err(|e| DriverError::ControlNotFound(format!("{selector}: {e}")))
    }
}

impl UiBackend for WindowsBackend {
    fn find_window(
        &self,
        title_pattern: &str,
        timeout: Duration,
    ) -> Result<Control, DriverError> {
        let re = regex::Regex::new(title_pattern)
            .map_err(|e| DriverError::InvalidSelector(e.to_string()))?;
        let root = self
            .automation
            .0
            .get_root_element()
            .map_err(|e| DriverError::PlatformError(e.to_string()))?;

        let matcher = self
            .automation
            .0
            .create_matcher()
            .from_ref(&root)
            .control_type(ControlType::Window)
            .filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                Ok(re.is_match(&e.get_name().unwrap_or_default()))
            }))
            .depth(2)
            .timeout(timeout.as_millis() as u64);

        let element = matcher.find_first().map_err(|e| {
            DriverError::ControlNotFound(format!("no window matching {title_pattern:?}: {e}"))
        })?;
        debug!(
            "matched window '{}'",
            element.get_name().unwrap_or_default()
        );
        Ok(self.wrap(element))
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
            return current.ok_or_else(|| DriverError::InvalidSelector("empty chain".into()));
        }
        let element = self.find_one(root, selector, timeout)?;
        Ok(self.wrap(element))
    }

    fn launch(&self, path: &str) -> Result<(), DriverError> {
        Command::new(path)
            .spawn()
            .map_err(|e| DriverError::PlatformError(format!("failed to launch {path:?}: {e}")))?;
        Ok(())
    }

    fn process_windows(&self, window: &Control) -> Result<Vec<Control>, DriverError> {
        let element = Self::native(window)?;
        let pid = element
            .get_process_id()
            .map_err(|e| DriverError::PlatformError(e.to_string()))?;

        let root = self
            .automation
            .0
            .get_root_element()
            .map_err(|e| DriverError::PlatformError(e.to_string()))?;
        let matcher = self
            .automation
            .0
            .create_matcher()
            .from_ref(&root)
            .filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                Ok(e.get_process_id().map(|p| p == pid).unwrap_or(false))
            }))
            .depth(2)
            .timeout(1000);

        let elements = matcher.find_all().unwrap_or_default();
        Ok(elements.into_iter().map(|e| self.wrap(e)).collect())
    }
}

#[derive(Debug)]
struct WindowsControl {
    element: ThreadSafeWinUIElement,
    automation: ThreadSafeWinUIAutomation,
}

impl WindowsControl {
    fn err(e: impl std::fmt::Display) -> DriverError {
        DriverError::PlatformError(e.to_string())
    }
}

impl ControlImpl for WindowsControl {
    fn role(&self) -> String {
        self.element
            .0
            .get_control_type()
            .map(|ct| format!("{ct:?}"))
            .unwrap_or_default()
    }

    fn name(&self) -> Option<String> {
        self.element.0.get_name().ok().filter(|n| !n.is_empty())
    }

    fn automation_id(&self) -> Option<String> {
        self.element
            .0
            .get_automation_id()
            .ok()
            .filter(|id| !id.is_empty())
    }

    fn is_visible(&self) -> Result<bool, DriverError> {
        self.element
            .0
            .is_offscreen()
            .map(|off| !off)
            .map_err(Self::err)
    }

    fn is_toggled(&self) -> Result<bool, DriverError> {
        let pattern = self
            .element
            .0
            .get_pattern::<patterns::UITogglePattern>()
            .map_err(Self::err)?;
        let state = pattern.get_toggle_state().map_err(Self::err)?;
        Ok(state == ToggleState::On)
    }

    fn toggle(&self) -> Result<(), DriverError> {
        let pattern = self
            .element
            .0
            .get_pattern::<patterns::UITogglePattern>()
            .map_err(Self::err)?;
        pattern.toggle().map_err(Self::err)
    }

    fn click(&self) -> Result<(), DriverError> {
        let _ = self.element.0.try_focus();
        self.element.0.click().map_err(Self::err)
    }

    fn right_click(&self) -> Result<(), DriverError> {
        let _ = self.element.0.try_focus();
        self.element.0.right_click().map_err(Self::err)
    }

    fn focus(&self) -> Result<(), DriverError> {
        self.element.0.set_focus().map_err(Self::err)
    }

    fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.element.0.send_text(text, 10).map_err(Self::err)
    }

    fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.element.0.send_keys(key, 10).map_err(Self::err)
    }

    fn text(&self) -> Result<String, DriverError> {
        if let Ok(pattern) = self.element.0.get_pattern::<patterns::UIValuePattern>() {
            if let Ok(value) = pattern.get_value() {
                if !value.is_empty() {
                    return Ok(value);
                }
            }
        }
        self.element.0.get_name().map_err(Self::err)
    }

    fn children(&self) -> Result<Vec<Control>, DriverError> {
        let condition = self
            .automation
            .0
            .create_true_condition()
            .map_err(Self::err)?;
        let children = self
            .element
            .0
            .find_all(TreeScope::Children, &condition)
            .map_err(Self::err)?;
        Ok(children
            .into_iter()
            .map(|e| {
                Control::new(Arc::new(WindowsControl {
                    element: ThreadSafeWinUIElement(Arc::new(e)),
                    automation: self.automation.clone(),
                }))
            })
            .collect())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
