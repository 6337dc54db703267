#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use url::Url;

    use crate::browser::{BrowserCapability, WaitPolicy};
    use crate::error::{as_scraping_error, ScrapingError};
    use crate::events::{EventBus, RunOutcome, ScrapeEvent, Topic};
    use crate::scraper::extractor::{ExtractionStep, FailureKind, ListingExtractor, ListingTarget};
    use crate::scraper::fake_browser::{page, FakeBrowser, FakeListing, FakeSite, SEARCH_URL};
    use crate::scraper::orchestrator::{ScrapeOrchestrator, ScrapeSettings};
    use crate::scraper::pagination::{PaginationController, PaginationOutcome, DEFAULT_PAGE_SIZE};
    use crate::scraper::query::{Query, QueryOptions};
    use crate::scraper::selectors::SelectorSet;
    use crate::scraper::session::{CredentialToken, SessionManager, SessionSettings};

    fn short_wait() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(30), Duration::from_millis(5))
    }

    fn settings() -> ScrapeSettings {
        let mut settings = ScrapeSettings::new(Url::parse(SEARCH_URL).unwrap());
        settings.container_wait = short_wait();
        settings.detail_wait = short_wait();
        settings.pagination_wait = short_wait();
        settings
    }

    fn orchestrator(bus: Arc<EventBus>) -> ScrapeOrchestrator {
        let session = SessionManager::new(SessionSettings::default(), CredentialToken::new("secret-token"));
        ScrapeOrchestrator::new(session, SelectorSet::default(), settings(), bus)
    }

    fn query(limit: usize) -> Query {
        let options = QueryOptions {
            limit,
            ..Default::default()
        };
        Query::new("rust", options).unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<ScrapeEvent>) -> Vec<ScrapeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn data_indices(events: &[ScrapeEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                ScrapeEvent::Data(data) => Some(data.job_index),
                _ => None,
            })
            .collect()
    }

    fn count(events: &[ScrapeEvent], topic: Topic) -> usize {
        events.iter().filter(|e| e.topic() == topic).count()
    }

    fn assert_single_trailing_end(events: &[ScrapeEvent]) {
        assert_eq!(count(events, Topic::End), 1);
        assert_eq!(events.last().map(ScrapeEvent::topic), Some(Topic::End));
    }

    async fn run_site(site: FakeSite, limit: usize) -> (Vec<ScrapeEvent>, FakeBrowser, crate::error::Result<crate::events::RunSummary>) {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let browser = FakeBrowser::new(site);

        let result = orchestrator(bus).run(&browser, &query(limit), "Morocco").await;
        (drain(&mut rx), browser, result)
    }

    #[tokio::test]
    async fn test_stalled_detail_pane_skips_only_that_listing() {
        let listings = vec![FakeListing::new(0), FakeListing::new(1).without_detail(), FakeListing::new(2)];
        let (events, _, result) = run_site(FakeSite::with_pages(vec![listings]), 25).await;

        let summary = result.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.outcome, RunOutcome::Done);

        assert_eq!(data_indices(&events), vec![0, 2]);
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ScrapeEvent::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].job_index, Some(1));
        assert!(errors[0].message.contains("Timeout on loading job details"));

        // DATA 0, ERROR 1, DATA 2 in emission order.
        assert_eq!(events[0].topic(), Topic::Data);
        assert_eq!(events[1].topic(), Topic::Error);
        assert_eq!(events[2].topic(), Topic::Data);
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_limit_caps_data_events_across_pages() {
        let site = FakeSite::with_pages(vec![page(0..25), page(25..50)]);
        let (events, browser, result) = run_site(site, 30).await;

        assert_eq!(result.unwrap().processed, 30);
        let indices = data_indices(&events);
        assert_eq!(indices.len(), 30);
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(indices, (0..30).collect::<Vec<_>>());
        assert!(browser.navigations().iter().any(|url| url.contains("start=25")));
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_missing_next_page_ends_run_without_error() {
        let site = FakeSite::with_pages(vec![page(0..25), page(25..28)]);
        let (events, _, result) = run_site(site, 100).await;

        let summary = result.unwrap();
        assert_eq!(summary.processed, 28);
        assert_eq!(summary.outcome, RunOutcome::Done);
        assert_eq!(count(&events, Topic::Error), 0);
        // Indices keep counting on the second page.
        assert_eq!(data_indices(&events)[25], 25);
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_pagination_reports_no_more_pages_on_last_page() {
        let browser = FakeBrowser::new(FakeSite::with_pages(vec![page(0..25), page(25..28)]));
        browser.navigate(&format!("{}?keywords=rust&start=25", SEARCH_URL)).await.unwrap();

        let controller = PaginationController::new(SelectorSet::default(), DEFAULT_PAGE_SIZE, short_wait());
        let outcome = controller.paginate(&browser, 25, "[rust][Morocco]").await.unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome, PaginationOutcome::NoMorePages);
        assert!(outcome.error().unwrap().contains("no more pages"));
    }

    #[tokio::test]
    async fn test_next_page_without_listings_ends_run_without_error() {
        let site = FakeSite::with_pages(vec![page(0..25), Vec::new()]);
        let (events, browser, result) = run_site(site, 100).await;

        let summary = result.unwrap();
        assert_eq!(summary.processed, 25);
        assert_eq!(summary.outcome, RunOutcome::Done);
        assert_eq!(count(&events, Topic::Error), 0);
        assert!(browser.navigations().last().unwrap().contains("start=25"));
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_pagination_times_out_when_next_page_stays_empty() {
        let browser = FakeBrowser::new(FakeSite::with_pages(vec![page(0..25), Vec::new()]));
        browser.navigate(&format!("{}?keywords=rust", SEARCH_URL)).await.unwrap();

        let controller = PaginationController::new(SelectorSet::default(), DEFAULT_PAGE_SIZE, short_wait());
        let outcome = controller.paginate(&browser, 0, "[rust][Morocco]").await.unwrap();

        assert_eq!(outcome, PaginationOutcome::TimedOut);
        assert_eq!(outcome.error().unwrap(), "Timeout on pagination");
    }

    #[tokio::test]
    async fn test_pagination_without_paginator_has_no_more_pages() {
        let mut site = FakeSite::with_pages(vec![page(0..25), page(25..50)]);
        site.hide_paginator = true;
        let browser = FakeBrowser::new(site);
        browser.navigate(&format!("{}?keywords=rust", SEARCH_URL)).await.unwrap();

        let controller = PaginationController::new(SelectorSet::default(), DEFAULT_PAGE_SIZE, short_wait());
        let outcome = controller.paginate(&browser, 0, "[rust][Morocco]").await.unwrap();

        assert_eq!(outcome, PaginationOutcome::NoMorePages);
        assert_eq!(browser.navigations().len(), 1);
    }

    #[tokio::test]
    async fn test_container_check_failure_finishes_quietly() {
        let mut site = FakeSite::with_pages(vec![page(0..3)]);
        site.fail_container_check = true;
        let (events, _, result) = run_site(site, 25).await;

        let summary = result.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.outcome, RunOutcome::Done);
        assert_eq!(count(&events, Topic::Error), 0);
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_pagination_advances_offset() {
        let browser = FakeBrowser::new(FakeSite::with_pages(vec![page(0..25), page(25..50)]));
        browser.navigate(&format!("{}?keywords=rust", SEARCH_URL)).await.unwrap();

        let controller = PaginationController::new(SelectorSet::default(), DEFAULT_PAGE_SIZE, short_wait());
        let outcome = controller.paginate(&browser, 0, "[rust][Morocco]").await.unwrap();

        assert_eq!(outcome, PaginationOutcome::Advanced { offset: 25 });
        assert_eq!(
            browser.navigations().last().unwrap(),
            "https://www.linkedin.com/jobs/search?keywords=rust&start=25"
        );
    }

    #[tokio::test]
    async fn test_pagination_navigation_failure_emits_one_error() {
        let mut site = FakeSite::with_pages(vec![page(0..25), page(25..50)]);
        site.fail_navigation_to_page = Some(1);
        let (events, _, result) = run_site(site, 100).await;

        assert_eq!(result.unwrap().outcome, RunOutcome::Done);
        assert_eq!(data_indices(&events).len(), 25);
        assert_eq!(count(&events, Topic::Error), 1);
        match events.iter().find(|e| e.topic() == Topic::Error) {
            Some(ScrapeEvent::Error(error)) => assert_eq!(error.job_index, None),
            other => panic!("expected error event, got {:?}", other),
        }
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_rejected_injection_aborts_before_any_data() {
        let mut site = FakeSite::with_pages(vec![page(0..3)]);
        site.reject_injection = true;
        let (events, browser, result) = run_site(site, 25).await;

        let err = result.unwrap_err();
        let err = as_scraping_error(err.as_ref()).expect("typed error");
        assert!(matches!(err, ScrapingError::SessionSetupError(_)));

        assert_eq!(count(&events, Topic::Data), 0);
        match events.last() {
            Some(ScrapeEvent::End(summary)) => assert!(summary.outcome.is_aborted()),
            other => panic!("expected END, got {:?}", other),
        }
        assert_single_trailing_end(&events);
        assert!(!browser.navigations().iter().any(|url| url.contains("/jobs/search")));
    }

    #[tokio::test]
    async fn test_cookie_missing_on_search_page_is_invalid_session() {
        let mut site = FakeSite::with_pages(vec![page(0..3)]);
        site.drop_injected_cookie = true;
        let (events, _, result) = run_site(site, 25).await;

        let err = result.unwrap_err();
        let err = as_scraping_error(err.as_ref()).expect("typed error");
        assert!(matches!(err, ScrapingError::InvalidSession(_)));
        assert!(err.is_credential_failure());

        assert_eq!(count(&events, Topic::Data), 0);
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_session_expiry_mid_run_is_reported_once() {
        let mut site = FakeSite::with_pages(vec![page(0..4)]);
        site.cookie_preset = true;
        site.expire_session_after_opens = Some(1);
        let (events, _, result) = run_site(site, 25).await;

        assert_eq!(result.unwrap().processed, 4);
        assert_eq!(count(&events, Topic::InvalidSession), 1);
        assert_eq!(data_indices(&events), vec![0, 1, 2, 3]);
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_missing_container_finishes_quietly() {
        let mut site = FakeSite::with_pages(vec![page(0..3)]);
        site.container_present = false;
        let (events, _, result) = run_site(site, 25).await;

        let summary = result.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.outcome, RunOutcome::Done);
        assert_eq!(events.len(), 1);
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_empty_page_finishes_quietly() {
        let (events, _, result) = run_site(FakeSite::with_pages(vec![Vec::new()]), 25).await;

        assert_eq!(result.unwrap().processed, 0);
        assert_eq!(count(&events, Topic::Error), 0);
        assert_single_trailing_end(&events);
    }

    #[tokio::test]
    async fn test_lazy_loaded_listings_are_picked_up() {
        let mut site = FakeSite::with_pages(vec![page(0..5)]);
        site.lazy_loaded = 2;
        let (events, _, result) = run_site(site, 25).await;

        assert_eq!(result.unwrap().processed, 5);
        assert_eq!(data_indices(&events), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_typed_listeners_receive_run_events() {
        let bus = Arc::new(EventBus::new());
        let titles = Arc::new(std::sync::Mutex::new(Vec::new()));
        let ended = Arc::new(std::sync::Mutex::new(None));

        let sink = titles.clone();
        bus.on_data(move |data| {
            sink.lock().unwrap().push(data.summary.title.clone());
            Ok(())
        });
        let end = ended.clone();
        bus.on_end(move |summary| {
            *end.lock().unwrap() = Some(summary.processed);
            Ok(())
        });

        let browser = FakeBrowser::new(FakeSite::with_pages(vec![page(0..2)]));
        orchestrator(bus).run(&browser, &query(25), "Morocco").await.unwrap();

        assert_eq!(*titles.lock().unwrap(), vec!["Engineer 0", "Engineer 1"]);
        assert_eq!(*ended.lock().unwrap(), Some(2));
    }

    fn extractor() -> ListingExtractor {
        ListingExtractor::new(SelectorSet::default(), short_wait(), Duration::ZERO)
    }

    fn target(page_position: usize) -> ListingTarget<'static> {
        ListingTarget {
            run_id: uuid::Uuid::nil(),
            query: "rust",
            location: "Morocco",
            page_position,
            job_index: page_position,
        }
    }

    #[tokio::test]
    async fn test_extraction_is_idempotent() {
        let browser = FakeBrowser::new(FakeSite::with_pages(vec![page(0..3)]));
        browser.navigate(SEARCH_URL).await.unwrap();

        let first = extractor().extract(&browser, target(1), "[rust][Morocco]").await.unwrap();
        let second = extractor().extract(&browser, target(1), "[rust][Morocco]").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(serde_json::to_vec(&first).unwrap(), serde_json::to_vec(&second).unwrap());
        assert_eq!(first.link, "/jobs/view/1");
        assert_eq!(first.summary.company, "Company 1");
        assert_eq!(first.detail.description_html, "<div>Description 1</div>");
        assert!(first.detail.apply_link.is_none());
    }

    #[tokio::test]
    async fn test_criteria_extraction_leaves_absent_labels_empty() {
        let browser = FakeBrowser::new(FakeSite::with_pages(vec![page(0..1)]));
        browser.navigate(SEARCH_URL).await.unwrap();

        let data = extractor().extract(&browser, target(0), "[rust][Morocco]").await.unwrap();

        assert_eq!(data.detail.seniority_level, "Mid");
        assert_eq!(data.detail.employment_type, "Full-time");
        assert_eq!(data.detail.industries, "");
        assert_eq!(data.detail.job_function, "");
    }

    #[tokio::test]
    async fn test_missing_link_is_a_script_failure() {
        let browser = FakeBrowser::new(FakeSite::with_pages(vec![page(0..1)]));
        browser.navigate(SEARCH_URL).await.unwrap();

        let failure = extractor().extract(&browser, target(5), "[rust][Morocco]").await.unwrap_err();

        assert_eq!(failure.step, ExtractionStep::OpenDetail);
        assert_eq!(failure.kind, FailureKind::Script);
        assert!(!failure.is_timeout());
    }

    #[tokio::test]
    async fn test_detail_timeout_is_tagged() {
        let browser = FakeBrowser::new(FakeSite::with_pages(vec![vec![FakeListing::new(0).without_detail()]]));
        browser.navigate(SEARCH_URL).await.unwrap();

        let failure = extractor().extract(&browser, target(0), "[rust][Morocco]").await.unwrap_err();

        assert_eq!(failure.step, ExtractionStep::AwaitDetail);
        assert!(failure.is_timeout());
    }
}
