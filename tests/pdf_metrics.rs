mod support;

use std::collections::HashSet;

use metrics_util::debugging::DebuggingRecorder;
use stampa::{
    application::pdf::{ForwardedCookies, RenderRequest},
    domain::types::RenderMode,
};

use support::{Harness, document};

fn download(id: uuid::Uuid, bypass_cache: bool) -> RenderRequest {
    RenderRequest {
        document_id: id,
        mode: RenderMode::Download,
        bypass_cache,
        cookies: ForwardedCookies::default(),
    }
}

#[tokio::test]
async fn pipeline_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let harness = Harness::new(true);
    let id = harness.add(document("annual-report", "post", "Annual Report"));

    // miss, then hit
    harness
        .service
        .render(&download(id, false))
        .await
        .expect("first render");
    harness
        .service
        .render(&download(id, false))
        .await
        .expect("cached render");

    harness.service.invalidator().on_document_saved(id, false).await;

    harness.engine.fail();
    assert!(harness.service.render(&download(id, true)).await.is_err());

    let failing = Harness::new(true);
    let other = failing.add(document("brand-kit", "post", "Brand Kit"));
    failing.fetcher.fail_with_status();
    assert!(failing.service.render(&download(other, false)).await.is_err());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "stampa_pdf_cache_hit_total",
        "stampa_pdf_cache_miss_total",
        "stampa_pdf_render_ms",
        "stampa_pdf_render_error_total",
        "stampa_pdf_fetch_error_total",
        "stampa_pdf_invalidate_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
