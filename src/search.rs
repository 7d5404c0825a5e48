use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::filters::SearchFilters;
use crate::models::{Job, LoadingState};
use crate::provider::{fetch_with_timeout, FetchError, JobSource};

/// Shown for every provider failure; the only recovery is a manual retry.
pub const SEARCH_FAILED_MESSAGE: &str = "無法取得職缺資訊。請檢查網路或稍後再試。";

/// Identifies one issued search. Only the most recent ticket may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

impl SearchTicket {
    pub fn seq(self) -> u64 {
        self.0
    }
}

/// Owns the job list and the lifecycle of the search that produced it.
#[derive(Debug, Default)]
pub struct SearchController {
    state: LoadingState,
    jobs: Vec<Job>,
    error: Option<String>,
    issued: u64,
    completed_at: Option<DateTime<Local>>,
}

impl SearchController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LoadingState {
        self.state
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Local>> {
        self.completed_at
    }

    /// Enters `Loading` and hands out the ticket the response must carry.
    /// The current job list stays in place until the response lands.
    pub fn begin(&mut self, filters: &SearchFilters) -> SearchTicket {
        self.issued += 1;
        self.state = LoadingState::Loading;
        self.error = None;
        debug!(seq = self.issued, filters = %filters.summary(), "search started");
        SearchTicket(self.issued)
    }

    /// Applies a response. Returns false when a newer search has been issued
    /// since `ticket`, in which case nothing changes.
    pub fn complete(&mut self, ticket: SearchTicket, outcome: Result<Vec<Job>, FetchError>) -> bool {
        if ticket.0 != self.issued {
            debug!(seq = ticket.0, latest = self.issued, "dropping stale search response");
            return false;
        }

        match outcome {
            Ok(jobs) => {
                info!(seq = ticket.0, count = jobs.len(), "search succeeded");
                self.jobs = jobs;
                self.state = LoadingState::Success;
                self.error = None;
            }
            Err(e) => {
                warn!(seq = ticket.0, error = %e, "search failed");
                self.jobs.clear();
                self.state = LoadingState::Error;
                self.error = Some(SEARCH_FAILED_MESSAGE.to_string());
            }
        }
        self.completed_at = Some(Local::now());
        true
    }

    /// Runs a full search and returns the resulting job list, empty on failure.
    /// Retrying after an error is calling this again with the same filters.
    pub async fn search(
        &mut self,
        source: &Arc<dyn JobSource>,
        filters: &SearchFilters,
        timeout: Duration,
    ) -> &[Job] {
        let ticket = self.begin(filters);
        let outcome = fetch_with_timeout(Arc::clone(source), filters.clone(), timeout).await;
        self.complete(ticket, outcome);
        &self.jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::marks::Marks;
    use crate::models::sample_job;
    use crate::views::JobViews;
    use std::sync::Mutex;

    /// Plays back scripted outcomes and records the filters it was called with.
    struct ScriptedSource {
        outcomes: Mutex<Vec<Result<Vec<Job>, String>>>,
        calls: Mutex<Vec<SearchFilters>>,
    }

    impl ScriptedSource {
        fn new(outcomes: Vec<Result<Vec<Job>, String>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<SearchFilters> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl JobSource for ScriptedSource {
        fn fetch_jobs(&self, filters: &SearchFilters) -> Result<Vec<Job>, FetchError> {
            self.calls.lock().unwrap().push(filters.clone());
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                return Err(FetchError::Provider("script exhausted".to_string()));
            }
            outcomes.remove(0).map_err(FetchError::Provider)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn jobs(n: usize) -> Vec<Job> {
        (1..=n).map(|i| sample_job(&format!("job-{}", i))).collect()
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_starts_idle() {
        let controller = SearchController::new();
        assert_eq!(controller.state(), LoadingState::Idle);
        assert!(controller.jobs().is_empty());
        assert!(controller.error().is_none());
    }

    #[test]
    fn test_begin_keeps_jobs_and_clears_error() {
        let mut controller = SearchController::new();
        let ticket = controller.begin(&SearchFilters::default());
        controller.complete(ticket, Ok(jobs(3)));

        let ticket = controller.begin(&SearchFilters::default());
        controller.complete(ticket, Err(FetchError::Timeout(TIMEOUT)));
        assert_eq!(controller.error(), Some(SEARCH_FAILED_MESSAGE));

        controller.begin(&SearchFilters::default());
        assert_eq!(controller.state(), LoadingState::Loading);
        assert!(controller.error().is_none());
    }

    #[test]
    fn test_jobs_untouched_while_loading() {
        let mut controller = SearchController::new();
        let ticket = controller.begin(&SearchFilters::default());
        controller.complete(ticket, Ok(jobs(4)));

        controller.begin(&SearchFilters::default().with_job_title("PM"));
        assert_eq!(controller.state(), LoadingState::Loading);
        assert_eq!(controller.jobs().len(), 4);
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut controller = SearchController::new();
        let first = controller.begin(&SearchFilters::default());
        let second = controller.begin(&SearchFilters::default().with_job_title("Rust"));
        assert_eq!(second.seq(), first.seq() + 1);

        assert!(controller.complete(second, Ok(jobs(2))));
        assert!(!controller.complete(first, Err(FetchError::Transport("late".to_string()))));
        assert_eq!(controller.state(), LoadingState::Success);
        assert_eq!(controller.jobs().len(), 2);
    }

    #[test]
    fn test_stale_success_does_not_end_loading() {
        let mut controller = SearchController::new();
        let first = controller.begin(&SearchFilters::default());
        controller.begin(&SearchFilters::default());

        assert!(!controller.complete(first, Ok(jobs(9))));
        assert_eq!(controller.state(), LoadingState::Loading);
        assert!(controller.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_initial_browse_all_search() {
        let source = ScriptedSource::new(vec![Ok(jobs(25))]);
        let dyn_source: Arc<dyn JobSource> = source.clone();
        let mut controller = SearchController::new();
        let marks = Marks::load(Database::open_in_memory().unwrap());

        let found = controller.search(&dyn_source, &SearchFilters::default(), TIMEOUT).await.len();
        assert_eq!(found, 25);
        assert_eq!(controller.state(), LoadingState::Success);
        assert!(controller.completed_at().is_some());
        assert_eq!(source.calls(), vec![SearchFilters::default()]);

        let views = JobViews::build(controller.jobs(), marks.saved(), marks.applied());
        assert_eq!(views.visible.len(), 25);
        assert!(views.saved.is_empty());
        assert!(views.applied.is_empty());
    }

    #[tokio::test]
    async fn test_applying_hides_job_without_new_search() {
        let source = ScriptedSource::new(vec![Ok(jobs(10))]);
        let dyn_source: Arc<dyn JobSource> = source.clone();
        let mut controller = SearchController::new();
        let mut marks = Marks::load(Database::open_in_memory().unwrap());

        controller.search(&dyn_source, &SearchFilters::default(), TIMEOUT).await;
        assert!(marks.toggle_applied("job-7"));

        let views = JobViews::build(controller.jobs(), marks.saved(), marks.applied());
        assert!(marks.is_applied("job-7"));
        assert!(views.visible.iter().all(|j| j.id != "job-7"));
        assert_eq!(views.applied.len(), 1);
        assert_eq!(views.applied[0], &controller.jobs()[6]);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_clears_jobs_and_retry_reuses_filters() {
        let source = ScriptedSource::new(vec![
            Ok(jobs(5)),
            Err("503 Service Unavailable".to_string()),
            Ok(jobs(2)),
        ]);
        let dyn_source: Arc<dyn JobSource> = source.clone();
        let mut controller = SearchController::new();

        controller.search(&dyn_source, &SearchFilters::default(), TIMEOUT).await;
        assert_eq!(controller.jobs().len(), 5);

        let filters = SearchFilters::default()
            .with_job_title("韌體工程師")
            .with_locations(vec!["新竹縣市".to_string()]);
        let found = controller.search(&dyn_source, &filters, TIMEOUT).await.len();
        assert_eq!(found, 0);
        assert_eq!(controller.state(), LoadingState::Error);
        assert_eq!(controller.error(), Some(SEARCH_FAILED_MESSAGE));
        assert!(controller.jobs().is_empty());

        // Retry is simply the same search again
        controller.search(&dyn_source, &filters, TIMEOUT).await;
        assert_eq!(controller.state(), LoadingState::Success);
        assert_eq!(controller.jobs().len(), 2);
        assert!(controller.error().is_none());

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], filters);
        assert_eq!(calls[2], filters);
    }

    #[tokio::test]
    async fn test_saved_id_outlives_result_set() {
        let mut second = jobs(4);
        second.retain(|j| j.id != "job-3");
        let source = ScriptedSource::new(vec![Ok(jobs(4)), Ok(second)]);
        let dyn_source: Arc<dyn JobSource> = source.clone();
        let mut controller = SearchController::new();
        let mut marks = Marks::load(Database::open_in_memory().unwrap());

        controller.search(&dyn_source, &SearchFilters::default(), TIMEOUT).await;
        marks.toggle_saved("job-3");
        assert_eq!(
            JobViews::build(controller.jobs(), marks.saved(), marks.applied()).saved.len(),
            1
        );

        controller.search(&dyn_source, &SearchFilters::default(), TIMEOUT).await;
        assert!(marks.is_saved("job-3"));
        let views = JobViews::build(controller.jobs(), marks.saved(), marks.applied());
        assert!(views.saved.is_empty());
        assert_eq!(views.visible.len(), 3);
    }

    #[test]
    fn test_toggle_save_twice_has_no_net_effect() {
        let mut marks = Marks::load(Database::open_in_memory().unwrap());
        marks.toggle_saved("job-1");
        let before = marks.saved().clone();

        marks.toggle_saved("job-5");
        marks.toggle_saved("job-5");
        assert_eq!(marks.saved(), &before);
    }

    #[tokio::test]
    async fn test_every_search_resolves_out_of_loading() {
        let filter_sets = vec![
            SearchFilters::default(),
            SearchFilters::default().with_job_title("設計師"),
            SearchFilters::default().with_experience_levels(vec!["10年以上".to_string()]),
        ];
        let source = ScriptedSource::new(vec![Ok(jobs(1)), Err("boom".to_string())]);
        let dyn_source: Arc<dyn JobSource> = source.clone();
        let mut controller = SearchController::new();

        for filters in &filter_sets {
            controller.search(&dyn_source, filters, TIMEOUT).await;
            assert!(matches!(
                controller.state(),
                LoadingState::Success | LoadingState::Error
            ));
        }
    }
}
