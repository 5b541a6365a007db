use std::sync::Arc;
use std::time::{Duration, Instant};

use pageturn::pdf::{
    DocumentSource, PageSize, PageState, PdfViewer, PresenterState, ViewerError, ViewerEvent,
    ViewerPhase,
};
use pageturn::settings::{ViewerMode, ViewerSettings};
use pageturn::test_utils::{FakeEngine, page_color};

const WAIT: Duration = Duration::from_secs(5);

fn settings(mode: ViewerMode) -> ViewerSettings {
    ViewerSettings {
        mode,
        retry_delay_ms: 0,
        transition_ms: 0,
        scroll_throttle_ms: 0,
        ..ViewerSettings::default()
    }
}

fn viewer_with(engine: &FakeEngine, settings: ViewerSettings) -> PdfViewer {
    let mut viewer = PdfViewer::new(Arc::new(engine.clone()), settings).expect("viewer");
    viewer.set_viewport_height(400.0);
    viewer.open(engine.source());
    assert!(viewer.wait_idle(WAIT), "viewer did not settle after open");
    viewer
}

fn viewer(engine: &FakeEngine, mode: ViewerMode) -> PdfViewer {
    viewer_with(engine, settings(mode))
}

#[test]
fn five_page_document_keeps_current_first_and_last() {
    let engine = FakeEngine::with_pages(5);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);

    viewer.go_to_page(5);
    assert!(viewer.wait_idle(WAIT));
    viewer.go_to_page(3);
    assert!(viewer.wait_idle(WAIT));

    assert_eq!(viewer.current_page(), 3);
    assert!(viewer.presented_canvas().shows(3, 1.0));
    for page in [1, 3, 5] {
        assert!(viewer.buffer().contains(page, 1.0), "page {page} missing");
    }
    assert!(viewer.buffer().len() <= viewer.buffer().capacity());
}

#[test]
fn every_page_ends_cached_or_failed() {
    let engine = FakeEngine::with_pages(6);
    // Two attempts as a preload, two more as the visible page
    engine.fail_renders(4, 4);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);

    for page in 1..=6 {
        viewer.go_to_page(page);
        assert!(viewer.wait_idle(WAIT));

        let cached = viewer.buffer().contains(page, 1.0);
        let failed = matches!(viewer.page_state(page), Some(PageState::Failed(_)));
        assert!(cached ^ failed, "page {page}: cached={cached} failed={failed}");
    }
    assert!(matches!(
        viewer.page_state(4),
        Some(PageState::Failed(ViewerError::Render { page: 4, .. }))
    ));
}

#[test]
fn superseded_scale_never_reaches_the_screen() {
    let engine = FakeEngine::with_pages(3);
    engine.ignore_cancellation();
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);
    viewer.go_to_page(2);
    assert!(viewer.wait_idle(WAIT));
    let writes_before = viewer.presented_canvas().writes();

    engine.hold_renders();
    let started = engine.rendered().len();
    viewer.zoom_in();
    assert!(engine.wait_for_renders_started(started + 1, WAIT));
    viewer.zoom_in();
    engine.release_renders();
    assert!(viewer.wait_idle(WAIT));

    assert!(viewer.presented_canvas().shows(2, 1.5));
    assert_eq!(viewer.presented_canvas().writes(), writes_before + 1);
    assert!(!viewer.buffer().contains(2, 1.25));
    assert_eq!(viewer.scheduler().in_flight(pageturn::pdf::Slot::Primary), 0);
}

#[test]
fn fit_to_width_sets_base_scale() {
    let engine = FakeEngine::with_sizes(vec![PageSize::new(400.0, 600.0); 3]);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);

    viewer.fit_to_width(1000.0);
    assert!(viewer.wait_idle(WAIT));

    assert!((viewer.base_scale() - 2.5).abs() < 1e-6);
    assert!((viewer.scale() - 2.5).abs() < 1e-6);
    assert!(viewer.presented_canvas().shows(1, 2.5));
    assert_eq!(viewer.presented_canvas().dimensions(), (1000, 1500));

    // Zoom multiplies on top of the fitted base
    viewer.zoom_in();
    assert!(viewer.wait_idle(WAIT));
    assert!((viewer.scale() - 2.5 * 1.25).abs() < 1e-5);

    viewer.reset_view();
    assert!(viewer.wait_idle(WAIT));
    assert!((viewer.scale() - 2.5).abs() < 1e-6);
}

#[test]
fn fit_to_width_in_continuous_mode_rerenders_visible_pages() {
    let engine = FakeEngine::with_sizes(vec![PageSize::new(500.0, 700.0); 4]);
    let mut viewer = viewer(&engine, ViewerMode::Continuous);

    viewer.fit_to_width(250.0);
    assert!(viewer.wait_idle(WAIT));

    assert!(viewer.canvas(1).is_some_and(|c| c.shows(1, 0.5)));
    assert!(!viewer.buffer().contains(1, 1.0));
    assert!(viewer
        .take_events()
        .contains(&ViewerEvent::ScaleChanged(0.5)));
}

#[test]
fn load_error_then_retry_reopens_same_source() {
    let engine = FakeEngine::with_pages(2);
    engine.fail_next_opens(1);

    let mut viewer =
        PdfViewer::new(Arc::new(engine.clone()), settings(ViewerMode::SinglePage)).expect("viewer");
    viewer.open(engine.source());
    assert!(viewer.wait_idle(WAIT));

    assert!(matches!(
        viewer.phase(),
        ViewerPhase::Error(ViewerError::Load { .. })
    ));
    assert!(viewer
        .take_events()
        .iter()
        .any(|e| matches!(e, ViewerEvent::Error(ViewerError::Load { .. }))));

    // Navigation is blocked while in the error state
    viewer.go_to_page(2);
    assert_eq!(viewer.current_page(), 0);

    assert!(viewer.retry_load());
    assert_eq!(viewer.phase(), &ViewerPhase::Loading);
    assert!(viewer.wait_idle(WAIT));

    assert_eq!(viewer.phase(), &ViewerPhase::Ready);
    assert_eq!(engine.opened_sources(), vec!["fake.pdf", "fake.pdf"]);
    assert!(viewer.presented_canvas().shows(1, 1.0));
}

#[test]
fn render_error_is_retried_once() {
    let engine = FakeEngine::with_pages(2);
    engine.fail_renders(1, 1);
    let viewer = viewer(&engine, ViewerMode::SinglePage);

    assert!(viewer.presented_canvas().shows(1, 1.0));
    assert_eq!(viewer.page_state(1), Some(&PageState::Rendered));
    assert_eq!(viewer.scheduler().stats().retried, 1);
    assert_eq!(viewer.scheduler().stats().failed, 0);
}

#[test]
fn second_render_failure_is_terminal_and_local() {
    let engine = FakeEngine::with_pages(3);
    engine.fail_renders(1, 2);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);

    assert!(matches!(viewer.page_state(1), Some(PageState::Failed(_))));
    assert_eq!(viewer.presenter().state(), PresenterState::Idle);
    assert_eq!(viewer.phase(), &ViewerPhase::Ready);
    assert!(viewer
        .take_events()
        .iter()
        .any(|e| matches!(e, ViewerEvent::PageFailed { page: 1, .. })));

    viewer.next_page();
    assert!(viewer.wait_idle(WAIT));
    assert!(viewer.presented_canvas().shows(2, 1.0));
    assert!(viewer.take_events().contains(&ViewerEvent::Ready));
}

#[test]
fn changing_source_destroys_previous_session_first() {
    let engine = FakeEngine::with_pages(3);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);

    viewer.open(DocumentSource::from(b"%PDF-second".to_vec()));
    assert!(viewer.buffer().is_empty());
    assert!(viewer.presented_canvas().is_blank());
    assert!(viewer.wait_idle(WAIT));

    assert_eq!(engine.lifecycle_log(), vec!["open", "close", "open"]);
    assert_eq!(engine.opened_sources()[1], "<11 bytes>");

    drop(viewer);
    assert_eq!(engine.close_count(), 2);
}

#[test]
fn stale_renders_from_previous_document_are_dropped() {
    let engine = FakeEngine::with_pages(3);
    engine.ignore_cancellation();
    let mut viewer =
        PdfViewer::new(Arc::new(engine.clone()), settings(ViewerMode::SinglePage)).expect("viewer");

    engine.hold_renders();
    viewer.open(engine.source());
    let deadline = Instant::now() + WAIT;
    while !engine.wait_for_renders_started(1, Duration::from_millis(10)) {
        viewer.poll(Instant::now());
        assert!(Instant::now() < deadline, "first render never started");
    }

    viewer.open(DocumentSource::from(b"%PDF-next".to_vec()));
    engine.release_renders();
    assert!(viewer.wait_idle(WAIT));

    assert!(viewer.presented_canvas().shows(1, 1.0));
    assert_eq!(viewer.presented_canvas().writes(), 1);
    assert!(viewer.scheduler().stats().discarded + viewer.scheduler().stats().cancelled >= 1);
}

#[test]
fn single_page_transition_commits_complete_frames_only() {
    let engine = FakeEngine::with_pages(4);
    let mut viewer = viewer_with(
        &engine,
        ViewerSettings {
            transition_ms: 50,
            ..settings(ViewerMode::SinglePage)
        },
    );
    assert!(viewer.presented_canvas().shows(1, 1.0));
    assert_eq!(viewer.presented_canvas().writes(), 1);

    engine.hold_renders();
    // Page 2 is preloaded and starts fading in right away
    viewer.next_page();
    assert!(matches!(
        viewer.presenter().state(),
        PresenterState::Transitioning { page: 2, .. }
    ));
    assert!(viewer.presented_canvas().shows(1, 1.0));

    // Leaving mid-fade abandons page 2; page 3 has to render
    viewer.next_page();
    assert!(matches!(
        viewer.presenter().state(),
        PresenterState::Rendering { page: 3, .. }
    ));
    assert!(viewer.presented_canvas().shows(1, 1.0));
    assert!(viewer.presenter().secondary().is_blank());

    engine.release_renders();
    assert!(viewer.wait_idle(WAIT));

    assert!(viewer.presented_canvas().shows(3, 1.0));
    assert_eq!(viewer.presented_canvas().pixel(0, 0), Some(page_color(3)));
    assert_eq!(viewer.presented_canvas().writes(), 2);
    assert_eq!(viewer.presenter().secondary().opacity(), 0.0);
}

#[test]
fn showing_current_page_again_is_a_noop() {
    let engine = FakeEngine::with_pages(2);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);
    let renders = engine.render_count();

    viewer.go_to_page(1);
    assert!(viewer.wait_idle(WAIT));
    assert_eq!(engine.render_count(), renders);
    assert_eq!(viewer.presented_canvas().writes(), 1);
}

#[test]
fn continuous_scroll_renders_ahead_and_clears_far_pages() {
    // 300px pages with 10px gaps
    let engine = FakeEngine::with_pages(20);
    let mut viewer = viewer(&engine, ViewerMode::Continuous);
    assert!(viewer.canvas(1).is_some_and(|c| c.shows(1, 1.0)));

    viewer.scroll_to(3100.0, Instant::now());
    assert!(viewer.wait_idle(WAIT));

    assert_eq!(viewer.current_page(), 11);
    assert!(viewer.take_events().contains(&ViewerEvent::PageChanged(11)));
    for page in [10, 11, 12] {
        assert!(viewer.canvas(page).is_some_and(|c| c.shows(page, 1.0)), "page {page}");
    }

    // Far away: pixels gone, buffer entry untouched
    let first = viewer.canvas(1).expect("canvas");
    assert!(first.is_blank());
    assert_eq!(first.dimensions(), (0, 0));
    assert_eq!(viewer.page_state(1), Some(&PageState::Blank));
    assert!(viewer.buffer().contains(1, 1.0));

    assert_eq!(engine.max_active_renders(), 1);
}

#[test]
fn continuous_scroll_back_reuses_buffer() {
    let engine = FakeEngine::with_pages(20);
    let mut viewer = viewer(&engine, ViewerMode::Continuous);
    viewer.scroll_to(3100.0, Instant::now());
    assert!(viewer.wait_idle(WAIT));
    let renders = engine.render_count();

    viewer.scroll_to(0.0, Instant::now());
    assert!(viewer.wait_idle(WAIT));

    assert!(viewer.canvas(1).is_some_and(|c| c.shows(1, 1.0)));
    // Page 1 is always protected, page 2 was rendered again or kept
    assert!(engine.render_count() <= renders + 1);
}

#[test]
fn scroll_updates_are_throttled() {
    let engine = FakeEngine::with_pages(20);
    let mut viewer = viewer_with(
        &engine,
        ViewerSettings {
            scroll_throttle_ms: 100,
            ..settings(ViewerMode::Continuous)
        },
    );
    let start = Instant::now();

    viewer.scroll_to(310.0, start);
    assert_eq!(viewer.scroll_top(), 310.0);

    viewer.scroll_to(620.0, start + Duration::from_millis(10));
    viewer.scroll_to(930.0, start + Duration::from_millis(20));
    assert_eq!(viewer.scroll_top(), 310.0);

    viewer.poll(start + Duration::from_millis(50));
    assert_eq!(viewer.scroll_top(), 310.0);

    viewer.poll(start + Duration::from_millis(100));
    assert_eq!(viewer.scroll_top(), 930.0);
}

#[test]
fn navigation_clamps_to_document() {
    let engine = FakeEngine::with_pages(4);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);

    viewer.go_to_page(99);
    assert!(viewer.wait_idle(WAIT));
    assert_eq!(viewer.current_page(), 4);
    viewer.next_page();
    assert_eq!(viewer.current_page(), 4);

    viewer.go_to_page(0);
    assert!(viewer.wait_idle(WAIT));
    assert_eq!(viewer.current_page(), 1);
    viewer.prev_page();
    assert_eq!(viewer.current_page(), 1);
}

#[test]
fn engine_giving_up_on_its_own_is_retried_in_single_page_mode() {
    let engine = FakeEngine::with_pages(3);
    engine.drop_renders(1, 1);
    let viewer = viewer(&engine, ViewerMode::SinglePage);

    assert!(viewer.presented_canvas().shows(1, 1.0));
    assert_eq!(viewer.page_state(1), Some(&PageState::Rendered));
    assert_eq!(viewer.presenter().state(), PresenterState::Idle);
    assert_eq!(viewer.scheduler().stats().retried, 1);
}

#[test]
fn engine_giving_up_twice_marks_page_failed() {
    let engine = FakeEngine::with_pages(3);
    engine.drop_renders(1, 2);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);

    assert!(matches!(
        viewer.page_state(1),
        Some(PageState::Failed(ViewerError::Render { page: 1, .. }))
    ));
    assert!(viewer.presenter().is_idle());
    assert!(
        viewer
            .take_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::PageFailed { page: 1, .. }))
    );
}

#[test]
fn engine_giving_up_on_its_own_is_retried_in_continuous_mode() {
    let engine = FakeEngine::with_pages(3);
    engine.drop_renders(1, 1);
    let viewer = viewer(&engine, ViewerMode::Continuous);

    assert!(viewer.canvas(1).is_some_and(|c| c.shows(1, 1.0)));
    assert_eq!(viewer.page_state(1), Some(&PageState::Rendered));
}

#[test]
fn on_screen_pages_stay_buffered_in_continuous_mode() {
    // 30px pages with 10px gaps: ten pages fill the 400px viewport
    let engine = FakeEngine::with_sizes(vec![PageSize::new(40.0, 30.0); 40]);
    let mut viewer = viewer(&engine, ViewerMode::Continuous);

    assert_eq!(viewer.visible_pages(), (1..=10).collect::<Vec<_>>());
    for page in viewer.visible_pages() {
        assert!(viewer.buffer().contains(page, 1.0), "on-screen page {page} evicted");
    }

    viewer.scroll_to(800.0, Instant::now());
    assert!(viewer.wait_idle(WAIT));

    assert_eq!(viewer.visible_pages(), (21..=30).collect::<Vec<_>>());
    for page in viewer.visible_pages() {
        assert!(viewer.canvas(page).is_some_and(|c| c.shows(page, 1.0)));
        assert!(viewer.buffer().contains(page, 1.0), "on-screen page {page} evicted");
    }
    assert!(viewer.buffer().len() <= viewer.buffer().capacity());
}

#[test]
fn failed_preload_stays_quiet_until_shown() {
    let engine = FakeEngine::with_pages(3);
    engine.fail_renders(2, 2);
    let mut viewer = viewer(&engine, ViewerMode::SinglePage);

    assert_eq!(viewer.page_state(2), Some(&PageState::Blank));
    assert!(!viewer.buffer().contains(2, 1.0));
    assert!(
        !viewer
            .take_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::PageFailed { .. }))
    );

    viewer.go_to_page(2);
    assert!(viewer.wait_idle(WAIT));
    assert!(viewer.presented_canvas().shows(2, 1.0));
    assert_eq!(viewer.page_state(2), Some(&PageState::Rendered));
}

#[test]
fn scale_change_marks_offscreen_pages_for_redraw() {
    let engine = FakeEngine::with_pages(20);
    let mut viewer = viewer(&engine, ViewerMode::Continuous);

    // Page 2 leaves the lookahead area but is not far enough to be cleared
    viewer.scroll_to(1000.0, Instant::now());
    assert!(viewer.wait_idle(WAIT));
    assert_eq!(viewer.page_state(2), Some(&PageState::Rendered));

    viewer.zoom_in();
    assert!(viewer.wait_idle(WAIT));

    assert_eq!(viewer.page_state(2), Some(&PageState::Blank));
    assert!(viewer.canvas(2).is_some_and(|c| !c.shows(2, 1.25)));
    let current = viewer.current_page();
    assert_eq!(viewer.page_state(current), Some(&PageState::Rendered));
    assert!(viewer.canvas(current).is_some_and(|c| c.shows(current, 1.25)));
}
