//! Live session against the host application's report screen.
//!
//! The host exposes no automation API and no completion events; everything
//! here is driven through the accessibility tree and bounded waits. A
//! concurrently-acting operator can invalidate any step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use tokio::task;
use tracing::{debug, info, warn};

use crate::controls::{Control, UiBackend};
use crate::errors::DriverError;
use crate::selector::Selector;

/// Fixed addressing scheme of the host application's report screen.
///
/// Inherently fragile to UI version changes; an environment assumption, not a
/// guarantee. `dump-controls` recovers the ids after a host update.
#[derive(Debug, Clone)]
pub struct UiProfile {
    /// Regex matched against top-level window titles.
    pub window_title_pattern: String,
    /// Executable launched when no matching window exists.
    pub exec_path: String,
    /// Top menu entry leading to the report screen.
    pub menu_label: String,
    /// Submenu entry and title of the report screen itself.
    pub screen_name: String,
    /// Label of the filter checkbox forced before every query.
    pub checkbox_label: String,
    /// State the checkbox is forced into.
    pub checkbox_target: bool,
    /// Regex for the query button caption (the host pads it with spaces).
    pub query_button_pattern: String,
    /// Regex for the export context-menu item.
    pub export_item_pattern: String,
    /// Regex for the login button.
    pub login_button_pattern: String,
    /// Automation ids of the period inputs and the results grid.
    pub date_start_id: String,
    pub date_end_id: String,
    pub results_table_id: String,
    /// Role the grid's data rows surface as.
    pub row_role: String,
}

impl Default for UiProfile {
    fn default() -> Self {
        Self {
            window_title_pattern: r".*Call\s?Center.*|.*SmartCS.*".to_string(),
            exec_path: r"C:\SmartCS\update.exe".to_string(),
            menu_label: "Staff".to_string(),
            screen_name: "Calls by Period".to_string(),
            checkbox_label: "Answered calls only".to_string(),
            checkbox_target: true,
            query_button_pattern: r"Run\s*Query.*".to_string(),
            export_item_pattern: r".*Open in Spreadsheet.*".to_string(),
            login_button_pattern: r".*Log\s?in.*".to_string(),
            date_start_id: "1204".to_string(),
            date_end_id: "1206".to_string(),
            results_table_id: "1780".to_string(),
            row_role: "custom".to_string(),
        }
    }
}

/// Settle/poll parameters for query-completion detection.
#[derive(Debug, Clone)]
pub struct PollTimings {
    /// Wait after triggering the query before the first poll.
    pub settle: Duration,
    /// Interval between polls.
    pub interval: Duration,
    /// Hard ceiling; past it the pipeline proceeds regardless.
    pub max_wait: Duration,
    /// Consecutive equal reads required to declare completion.
    pub stable_reads: u32,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(60),
            stable_reads: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionTimings {
    /// Wait for the host window after launching the executable.
    pub launch_wait: Duration,
    /// Wait for the main screen after submitting credentials.
    pub login_wait: Duration,
    /// Wait after each menu click before the screen settles.
    pub menu_wait: Duration,
    /// Wait for the main window to become addressable.
    pub window_wait: Duration,
    /// Wait for the report panel after navigation.
    pub panel_wait: Duration,
    /// Short wait used when probing for optional controls.
    pub probe_wait: Duration,
    pub poll: PollTimings,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            launch_wait: Duration::from_secs(30),
            login_wait: Duration::from_secs(12),
            menu_wait: Duration::from_millis(1500),
            window_wait: Duration::from_secs(20),
            panel_wait: Duration::from_secs(10),
            probe_wait: Duration::from_secs(2),
            poll: PollTimings::default(),
        }
    }
}

/// Host application credentials for the fully automated path.
#[derive(Debug, Clone)]
pub struct HostCredentials {
    pub user: String,
    pub password: String,
}

/// Poll `read` until it yields the same value as the previous poll for
/// `stable_reads` consecutive polls, after an initial settle delay.
///
/// A single stable read is not enough: the grid passes through a transient
/// zero-row state while the host is still fetching. Returns the stable count,
/// or `None` when `max_wait` elapses first.
pub fn wait_for_stable_count<F>(mut read: F, timings: &PollTimings) -> Option<usize>
where
    F: FnMut() -> Option<usize>,
{
    std::thread::sleep(timings.settle);

    let mut prev: Option<usize> = None;
    let mut stable = 0u32;
    let deadline = Instant::now() + timings.max_wait;

    while Instant::now() <= deadline {
        if let Some(count) = read() {
            if prev == Some(count) {
                stable += 1;
                if stable >= timings.stable_reads {
                    return Some(count);
                }
            } else {
                stable = 0;
                prev = Some(count);
            }
        }
        std::thread::sleep(timings.interval);
    }
    None
}

/// A connected report screen, ready for date-scoped queries.
pub struct ReportSession {
    backend: Arc<dyn UiBackend>,
    profile: UiProfile,
    timings: SessionTimings,
    window: Control,
    panel: Control,
}

impl ReportSession {
    /// Attach to an already-open, already-navigated report screen.
    ///
    /// GUI-assisted mode: the operator logs in and opens the screen by hand.
    pub async fn connect(
        backend: Arc<dyn UiBackend>,
        profile: UiProfile,
        timings: SessionTimings,
    ) -> Result<Self, DriverError> {
        let window = Self::find_window(&backend, &profile, timings.probe_wait)
            .await
            .map_err(|_| {
                DriverError::ScreenNotFound(format!(
                    "no host window matching {:?}; log in and open the '{}' screen, then retry",
                    profile.window_title_pattern, profile.screen_name
                ))
            })?;

        let panel = Self::find_panel(&backend, &profile, &window, timings.probe_wait)
            .await
            .ok_or_else(|| {
                DriverError::ScreenNotFound(format!(
                    "'{}' screen not open; navigate to [{}] > [{}] in the host, then retry",
                    profile.screen_name, profile.menu_label, profile.screen_name
                ))
            })?;

        info!("attached to '{}' screen", profile.screen_name);
        Ok(Self {
            backend,
            profile,
            timings,
            window,
            panel,
        })
    }

    /// Fully automated path: launch the host if needed, enter credentials,
    /// wait for the main screen and navigate to the report screen.
    pub async fn login(
        backend: Arc<dyn UiBackend>,
        profile: UiProfile,
        timings: SessionTimings,
        credentials: &HostCredentials,
    ) -> Result<Self, DriverError> {
        let window = match Self::find_window(&backend, &profile, timings.probe_wait).await {
            Ok(window) => {
                debug!("host already running");
                window
            }
            Err(_) => {
                info!("launching host application: {}", profile.exec_path);
                backend.launch(&profile.exec_path)?;
                Self::find_window(&backend, &profile, timings.launch_wait)
                    .await
                    .map_err(|_| {
                        DriverError::LoginTimeout(format!(
                            "host window did not appear within {:?}",
                            timings.launch_wait
                        ))
                    })?
            }
        };

        Self::submit_credentials(&backend, &profile, &timings, &window, credentials).await;

        // The window title can change after login; re-resolve before navigating.
        let window = Self::find_window(&backend, &profile, timings.window_wait)
            .await
            .map_err(|_| {
                DriverError::LoginTimeout(format!(
                    "main window not visible within {:?} after login",
                    timings.window_wait
                ))
            })?;
        info!("host main screen confirmed");

        let mut session = Self {
            backend,
            profile,
            timings,
            panel: window.clone(),
            window,
        };
        session.navigate().await?;
        Ok(session)
    }

    /// Menu-navigate into the report screen. No-op when it is already open.
    pub async fn navigate(&mut self) -> Result<(), DriverError> {
        if let Some(panel) = Self::find_panel(
            &self.backend,
            &self.profile,
            &self.window,
            self.timings.probe_wait,
        )
        .await
        {
            debug!("'{}' screen already active", self.profile.screen_name);
            self.panel = panel;
            return Ok(());
        }

        for label in [&self.profile.menu_label, &self.profile.screen_name] {
            let item = self
                .find(
                    Some(&self.window),
                    Selector::role_named("menuitem", label.as_str()),
                    self.timings.probe_wait,
                )
                .await
                .map_err(|e| {
                    DriverError::NavigationFailed(format!("menu item {label:?} not found: {e}"))
                })?;
            item.click().map_err(|e| {
                DriverError::NavigationFailed(format!("menu item {label:?} click failed: {e}"))
            })?;
            tokio::time::sleep(self.timings.menu_wait).await;
        }
        info!("entered '{}' screen", self.profile.screen_name);

        let deadline = Instant::now() + self.timings.panel_wait;
        while Instant::now() < deadline {
            if let Some(panel) = Self::find_panel(
                &self.backend,
                &self.profile,
                &self.window,
                Duration::from_millis(500),
            )
            .await
            {
                self.panel = panel;
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        warn!(
            "'{}' panel not located after navigation; falling back to the main window",
            self.profile.screen_name
        );
        self.panel = self.window.clone();
        Ok(())
    }

    /// Configure a query spanning exactly [date 00:00, date+1 00:00), trigger
    /// it, and block until completion is detected or the poll ceiling passes.
    pub async fn query_date(&self, date: NaiveDate) -> Result<(), DriverError> {
        let next = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| DriverError::QueryTriggerFailed(format!("no day after {date}")))?;
        info!("[{date}] period {date} 00:00 .. {next} 00:00");

        self.force_checkbox().await;
        let (start_id, end_id) = (
            self.profile.date_start_id.clone(),
            self.profile.date_end_id.clone(),
        );
        self.set_period_field(&start_id, date).await?;
        self.set_period_field(&end_id, next).await?;

        let button = self
            .find(
                Some(&self.panel),
                Selector::TitlePattern(self.profile.query_button_pattern.clone()),
                self.timings.probe_wait,
            )
            .await
            .map_err(|e| DriverError::QueryTriggerFailed(format!("query button: {e}")))?;
        button
            .click()
            .map_err(|e| DriverError::QueryTriggerFailed(format!("query button click: {e}")))?;
        debug!("[{date}] query triggered");

        self.wait_for_query_complete(date).await;
        Ok(())
    }

    /// Trigger the grid's export context action, opening the companion
    /// spreadsheet application on the current result set.
    pub async fn open_export(&self) -> Result<(), DriverError> {
        let grid = match self
            .find(
                Some(&self.panel),
                Selector::Id(self.profile.results_table_id.clone()),
                self.timings.probe_wait,
            )
            .await
        {
            Ok(grid) => grid,
            // The id moves between host builds; any grid on the panel will do.
            Err(_) => self
                .find(
                    Some(&self.panel),
                    Selector::role("table"),
                    self.timings.probe_wait,
                )
                .await
                .map_err(|e| {
                    DriverError::ExportTriggerFailed(format!("results grid not found: {e}"))
                })?,
        };

        grid.right_click()
            .map_err(|e| DriverError::ExportTriggerFailed(format!("grid right-click: {e}")))?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        // The context menu opens as a popup on the window, not the panel.
        let item = self
            .find(
                Some(&self.window),
                Selector::TitlePattern(self.profile.export_item_pattern.clone()),
                self.timings.probe_wait,
            )
            .await
            .map_err(|e| DriverError::ExportTriggerFailed(format!("export menu item: {e}")))?;
        item.click()
            .map_err(|e| DriverError::ExportTriggerFailed(format!("export menu click: {e}")))?;
        info!("export to spreadsheet triggered");

        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(())
    }

    async fn wait_for_query_complete(&self, date: NaiveDate) {
        let backend = self.backend.clone();
        let panel = self.panel.clone();
        let table_id = self.profile.results_table_id.clone();
        let row_role = self.profile.row_role.clone();
        let timings = self.timings.poll.clone();
        let max_wait = timings.max_wait;

        let outcome = task::spawn_blocking(move || {
            wait_for_stable_count(
                || {
                    backend
                        .find(
                            Some(&panel),
                            &Selector::Id(table_id.clone()),
                            Duration::from_millis(500),
                        )
                        .ok()
                        .and_then(|grid| grid.child_count_by_role(&row_role).ok())
                },
                &timings,
            )
        })
        .await
        .ok()
        .flatten();

        match outcome {
            Some(count) => info!("[{date}] query complete ({count} rows)"),
            None => warn!(
                "[{date}] query completion not detected within {max_wait:?}; proceeding anyway"
            ),
        }
    }

    /// Force the filter checkbox into its target state. Best-effort: a
    /// missing or unreadable checkbox is logged and skipped.
    async fn force_checkbox(&self) {
        let selector = Selector::role_named("checkbox", self.profile.checkbox_label.as_str());
        let checkbox = match self
            .find(Some(&self.panel), selector, self.timings.probe_wait)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "checkbox {:?} not handled (ignored): {e}",
                    self.profile.checkbox_label
                );
                return;
            }
        };

        match checkbox.is_toggled() {
            Ok(state) if state == self.profile.checkbox_target => {
                debug!(
                    "checkbox {:?} already {}",
                    self.profile.checkbox_label, state
                );
            }
            Ok(state) => {
                if let Err(e) = checkbox.toggle() {
                    warn!(
                        "checkbox {:?} toggle failed (ignored): {e}",
                        self.profile.checkbox_label
                    );
                } else {
                    debug!(
                        "checkbox {:?}: {} -> {}",
                        self.profile.checkbox_label, state, self.profile.checkbox_target
                    );
                }
            }
            Err(e) => {
                warn!(
                    "checkbox {:?} state unreadable (ignored): {e}",
                    self.profile.checkbox_label
                );
            }
        }
    }

    /// Enter one boundary of the period into a date-time picker pane.
    ///
    /// The picker takes its parts in order, moving the caret itself: year,
    /// month, day, hour, then Enter to commit.
    async fn set_period_field(&self, field_id: &str, date: NaiveDate) -> Result<(), DriverError> {
        let field = self
            .find(
                Some(&self.panel),
                Selector::Id(field_id.to_string()),
                self.timings.probe_wait,
            )
            .await
            .map_err(|e| {
                DriverError::QueryTriggerFailed(format!(
                    "period field (id={field_id}) not found: {e}; \
                     run dump-controls and update the automation ids"
                ))
            })?;

        field.click().map_err(|e| {
            DriverError::QueryTriggerFailed(format!("period field (id={field_id}) click: {e}"))
        })?;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let parts = [
            format!("{:04}", chrono::Datelike::year(&date)),
            format!("{:02}", chrono::Datelike::month(&date)),
            format!("{:02}", chrono::Datelike::day(&date)),
            "00".to_string(),
        ];
        for part in &parts {
            field.type_text(part).map_err(|e| {
                DriverError::QueryTriggerFailed(format!("period field (id={field_id}) input: {e}"))
            })?;
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        field.press_key("{enter}").map_err(|e| {
            DriverError::QueryTriggerFailed(format!("period field (id={field_id}) commit: {e}"))
        })?;
        tokio::time::sleep(Duration::from_millis(200)).await;

        debug!("period field {field_id} set to {date} 00:00");
        Ok(())
    }

    async fn submit_credentials(
        backend: &Arc<dyn UiBackend>,
        profile: &UiProfile,
        timings: &SessionTimings,
        window: &Control,
        credentials: &HostCredentials,
    ) {
        // A login form only shows on a cold start; absence means an active
        // session is being reused.
        let user_field = match Self::find_static(
            backend,
            Some(window),
            Selector::role("edit"),
            timings.probe_wait,
        )
        .await
        {
            Ok(field) => field,
            Err(_) => {
                debug!("no login form; assuming an existing session");
                return;
            }
        };

        let filled = async {
            user_field.focus()?;
            user_field.type_text(&credentials.user)?;

            let edits: Vec<Control> = window
                .children()?
                .into_iter()
                .filter(|c| c.role().eq_ignore_ascii_case("edit"))
                .collect();
            if let Some(password_field) = edits.get(1) {
                password_field.focus()?;
                password_field.type_text(&credentials.password)?;
            }

            let login_button = Self::find_static(
                backend,
                Some(window),
                Selector::TitlePattern(profile.login_button_pattern.clone()),
                timings.probe_wait,
            )
            .await?;
            login_button.click()?;
            Ok::<(), DriverError>(())
        }
        .await;

        match filled {
            Ok(()) => {
                info!("credentials submitted");
                tokio::time::sleep(timings.login_wait).await;
            }
            Err(e) => debug!("login form not completed (may already be signed in): {e}"),
        }
    }

    async fn find_window(
        backend: &Arc<dyn UiBackend>,
        profile: &UiProfile,
        timeout: Duration,
    ) -> Result<Control, DriverError> {
        let backend = backend.clone();
        let pattern = profile.window_title_pattern.clone();
        task::spawn_blocking(move || backend.find_window(&pattern, timeout))
            .await
            .map_err(|e| DriverError::PlatformError(format!("task join error: {e}")))?
    }

    /// The report screen may surface as a child pane, a separate window or a
    /// pane embedded in the main window; probe each shape in turn.
    async fn find_panel(
        backend: &Arc<dyn UiBackend>,
        profile: &UiProfile,
        window: &Control,
        timeout: Duration,
    ) -> Option<Control> {
        for role in ["pane", "window", "custom", "document", "group"] {
            let selector = Selector::role_named(role, profile.screen_name.as_str());
            if let Ok(panel) = Self::find_static(backend, Some(window), selector, timeout).await {
                return Some(panel);
            }
        }
        let fuzzy = Selector::TitlePattern(format!(".*{}.*", regex::escape(&profile.screen_name)));
        Self::find_static(backend, Some(window), fuzzy, timeout)
            .await
            .ok()
    }

    async fn find(
        &self,
        root: Option<&Control>,
        selector: Selector,
        timeout: Duration,
    ) -> Result<Control, DriverError> {
        Self::find_static(&self.backend, root, selector, timeout).await
    }

    async fn find_static(
        backend: &Arc<dyn UiBackend>,
        root: Option<&Control>,
        selector: Selector,
        timeout: Duration,
    ) -> Result<Control, DriverError> {
        let backend = backend.clone();
        let root = root.cloned();
        task::spawn_blocking(move || backend.find(root.as_ref(), &selector, timeout))
            .await
            .map_err(|e| DriverError::PlatformError(format!("task join error: {e}")))?
    }

    pub fn window(&self) -> &Control {
        &self.window
    }

    pub fn backend(&self) -> &Arc<dyn UiBackend> {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::controls::fake::{FakeBackend, FakeControl};

    fn zero_poll(stable_reads: u32) -> PollTimings {
        PollTimings {
            settle: Duration::ZERO,
            interval: Duration::ZERO,
            max_wait: Duration::from_millis(200),
            stable_reads,
        }
    }

    #[test]
    fn stable_count_requires_two_consecutive_matches() {
        let reads = Arc::new(Mutex::new(vec![5usize, 5, 3, 3, 3]));
        let consumed = Arc::new(Mutex::new(0usize));

        let reads_src = reads.clone();
        let consumed_ctr = consumed.clone();
        let result = wait_for_stable_count(
            move || {
                let mut reads = reads_src.lock().unwrap();
                if reads.is_empty() {
                    None
                } else {
                    *consumed_ctr.lock().unwrap() += 1;
                    Some(reads.remove(0))
                }
            },
            &zero_poll(2),
        );

        // Completion lands on the third 3 - the second consecutive match -
        // not on the earlier [5, 5] pair, which only counts one match.
        assert_eq!(result, Some(3));
        assert_eq!(*consumed.lock().unwrap(), 5);
    }

    #[test]
    fn stable_count_times_out_on_a_changing_signal() {
        let mut n = 0usize;
        let result = wait_for_stable_count(
            move || {
                n += 1;
                Some(n)
            },
            &zero_poll(2),
        );
        assert_eq!(result, None);
    }

    #[test]
    fn stable_count_ignores_unreadable_polls() {
        let reads = Arc::new(Mutex::new(vec![None, Some(4), None, Some(4), Some(4)]));
        let reads_src = reads.clone();
        let result = wait_for_stable_count(
            move || {
                let mut reads = reads_src.lock().unwrap();
                if reads.is_empty() {
                    None
                } else {
                    reads.remove(0)
                }
            },
            &zero_poll(2),
        );
        assert_eq!(result, Some(4));
    }

    fn report_screen() -> (Arc<FakeBackend>, Arc<Mutex<Vec<String>>>) {
        let actions = Arc::new(Mutex::new(Vec::new()));

        let mk = |role: &str, name: Option<&str>, aid: Option<&str>| {
            let node = FakeControl::node(role, name, aid);
            // Share one action log across the whole tree
            let node = Arc::try_unwrap(node).unwrap();
            Arc::new(FakeControl {
                actions: actions.clone(),
                ..node
            })
        };

        let grid = mk("table", Some("Report"), Some("1780")).with_children(vec![
            mk("custom", Some("row 1"), None),
            mk("custom", Some("row 2"), None),
        ]);
        let panel = mk("pane", Some("Calls by Period"), None).with_children(vec![
            mk("checkbox", Some("Answered calls only"), None),
            mk("pane", None, Some("1204")),
            mk("pane", None, Some("1206")),
            mk("button", Some("Run  Query(V)"), None),
            grid,
        ]);
        let window = mk("window", Some("Call Center - operator"), None).with_children(vec![
            panel,
            mk("menuitem", Some("Open in Spreadsheet"), None),
        ]);

        (Arc::new(FakeBackend::new(vec![window])), actions)
    }

    fn fast_timings() -> SessionTimings {
        SessionTimings {
            launch_wait: Duration::from_millis(50),
            login_wait: Duration::ZERO,
            menu_wait: Duration::ZERO,
            window_wait: Duration::from_millis(50),
            panel_wait: Duration::from_millis(50),
            probe_wait: Duration::from_millis(50),
            poll: PollTimings {
                settle: Duration::ZERO,
                interval: Duration::ZERO,
                max_wait: Duration::from_millis(100),
                stable_reads: 2,
            },
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_fails_with_screen_not_found_when_no_window_matches() {
        let backend = Arc::new(FakeBackend::new(vec![]));
        let result = ReportSession::connect(backend, UiProfile::default(), fast_timings()).await;
        assert!(matches!(result, Err(DriverError::ScreenNotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_date_forces_checkbox_sets_period_and_clicks_query() {
        let (backend, actions) = report_screen();
        let session = ReportSession::connect(backend, UiProfile::default(), fast_timings())
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 2, 18).unwrap();
        session.query_date(date).await.unwrap();

        let log = actions.lock().unwrap().clone();
        // Checkbox starts unchecked and the target is checked
        assert!(log.contains(&"toggle:Answered calls only".to_string()));
        assert!(log.contains(&"type:1204:2026".to_string()));
        assert!(log.contains(&"type:1204:18".to_string()));
        // End boundary is the following midnight
        assert!(log.contains(&"type:1206:19".to_string()));
        assert!(log.contains(&"key:1206:{enter}".to_string()));
        assert!(log.contains(&"click:Run  Query(V)".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_date_skips_checkbox_already_in_target_state() {
        let (backend, actions) = report_screen();
        let session =
            ReportSession::connect(backend.clone(), UiProfile::default(), fast_timings())
                .await
                .unwrap();

        let checkbox = backend
            .find(
                None,
                &Selector::role_named("checkbox", "Answered calls only"),
                Duration::ZERO,
            )
            .unwrap();
        checkbox.toggle().unwrap();
        actions.lock().unwrap().clear();

        let date = NaiveDate::from_ymd_opt(2026, 2, 18).unwrap();
        session.query_date(date).await.unwrap();

        let log = actions.lock().unwrap().clone();
        assert!(!log.contains(&"toggle:Answered calls only".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_export_right_clicks_grid_and_picks_menu_item() {
        let (backend, actions) = report_screen();
        let session = ReportSession::connect(backend, UiProfile::default(), fast_timings())
            .await
            .unwrap();

        session.open_export().await.unwrap();

        let log = actions.lock().unwrap().clone();
        assert!(log.contains(&"right_click:Report".to_string()));
        assert!(log.contains(&"click:Open in Spreadsheet".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_export_fails_when_menu_item_missing() {
        let actions = Arc::new(Mutex::new(Vec::new()));
        let mk = |role: &str, name: Option<&str>, aid: Option<&str>| {
            let node = Arc::try_unwrap(FakeControl::node(role, name, aid)).unwrap();
            Arc::new(FakeControl {
                actions: actions.clone(),
                ..node
            })
        };
        let grid = mk("table", Some("Report"), Some("1780"));
        let panel = mk("pane", Some("Calls by Period"), None).with_children(vec![grid]);
        let window = mk("window", Some("Call Center"), None).with_children(vec![panel]);
        let backend = Arc::new(FakeBackend::new(vec![window]));

        let session = ReportSession::connect(backend, UiProfile::default(), fast_timings())
            .await
            .unwrap();
        let result = session.open_export().await;
        assert!(matches!(result, Err(DriverError::ExportTriggerFailed(_))));
    }
}
