use std::sync::Arc;

use crate::controls::UiBackend;
use crate::errors::DriverError;

#[cfg(target_os = "windows")]
pub mod windows;

/// Create the accessibility backend for the current platform.
pub fn create_backend() -> Result<Arc<dyn UiBackend>, DriverError> {
    #[cfg(target_os = "windows")]
    {
        let backend = windows::WindowsBackend::new()?;
        Ok(Arc::new(backend))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(DriverError::UnsupportedPlatform(format!(
            "the host call-center application only runs on Windows (current platform: {})",
            std::env::consts::OS
        )))
    }
}
