//! End-to-end HTTP surface tests (spec §8's literal scenarios), run against
//! the real `datas3t` binary and an ephemeral MinIO container.
//!
//! Requires Docker; skips gracefully when unavailable.

mod common;

use common::{build_tar, TestServer};
use serde_json::{json, Value};

#[tokio::test]
async fn create_and_ingest_then_plan_download() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    let resp = client.put(format!("{base}/api/v1/datas3t/A")).send().await.unwrap();
    assert_eq!(resp.status(), 204);

    let tar = build_tar(&[(1, b"{}"), (2, b"{}"), (3, b"{}")]);
    let resp = client.post(format!("{base}/api/v1/datas3t/A")).body(tar).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["dataset_id"], "A");
    assert_eq!(body["num_data_points"], 3);

    let resp = client.get(format!("{base}/api/v1/datas3t/A/dataranges")).send().await.unwrap();
    let dataranges: Value = resp.json().await.unwrap();
    assert_eq!(dataranges.as_array().unwrap().len(), 1);
    assert_eq!(dataranges[0]["min_datapoint_key"], 1);
    assert_eq!(dataranges[0]["max_datapoint_key"], 3);
    assert!(dataranges[0]["size_bytes"].as_i64().unwrap() > 0);

    let resp = client.get(format!("{base}/api/v1/datas3t/A/datarange/1/3")).send().await.unwrap();
    let plan: Value = resp.json().await.unwrap();
    let plan = plan.as_array().unwrap();
    assert_eq!(plan.len(), 1);
    let start = plan[0]["start"].as_i64().unwrap();
    let end = plan[0]["end"].as_i64().unwrap();
    assert_eq!(start % 512, 0);
    assert_eq!((end + 1) % 512, 0);

    // Download the planned range directly from S3 and confirm it's a valid
    // tar prefix (entry names carry the zero-padded key prefix).
    let get_url = plan[0]["get_url"].as_str().unwrap();
    let bytes = client.get(get_url).send().await.unwrap().bytes().await.unwrap();
    assert!(bytes.len() >= (end - start + 1) as usize);
    let name = std::str::from_utf8(&bytes[0..26]).unwrap().trim_end_matches('\0');
    assert_eq!(name, "00000000000000000001.json");
}

#[tokio::test]
async fn gap_rejection() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/GAP")).send().await.unwrap();
    let tar = build_tar(&[(1, b"{}"), (3, b"{}")]);
    let resp = client.post(format!("{base}/api/v1/datas3t/GAP")).body(tar).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "GapDetected");
}

#[tokio::test]
async fn overlap_rejection() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/OV")).send().await.unwrap();
    let first = build_tar(&[(1, b"{}"), (2, b"{}"), (3, b"{}")]);
    let resp = client.post(format!("{base}/api/v1/datas3t/OV")).body(first).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let second = build_tar(&[(2, b"{}"), (4, b"{}")]);
    let resp = client.post(format!("{base}/api/v1/datas3t/OV")).body(second).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "RangeOverlap");
}

#[tokio::test]
async fn compaction_merges_adjacent_dataranges() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/B")).send().await.unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/B"))
        .body(build_tar(&[(1, b"{}"), (2, b"{}")]))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/B"))
        .body(build_tar(&[(3, b"{}"), (4, b"{}")]))
        .send()
        .await
        .unwrap();

    let resp = client.post(format!("{base}/api/v1/datas3t/B/aggregate/1/4")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ranges_replaced"], 2);
    assert_eq!(
        body["new_object_key"],
        "dataset/B/datapoints/00000000000000000001-00000000000000000004.tar"
    );

    let resp = client.get(format!("{base}/api/v1/datas3t/B/dataranges")).send().await.unwrap();
    let dataranges: Value = resp.json().await.unwrap();
    assert_eq!(dataranges.as_array().unwrap().len(), 1);
    assert_eq!(dataranges[0]["min_datapoint_key"], 1);
    assert_eq!(dataranges[0]["max_datapoint_key"], 4);
}

#[tokio::test]
async fn missing_ranges_reports_gaps_between_dataranges() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/C")).send().await.unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/C"))
        .body(build_tar(&[(1, b"{}"), (2, b"{}")]))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/C"))
        .body(build_tar(&[(5, b"{}"), (6, b"{}"), (7, b"{}")]))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/C"))
        .body(build_tar(&[(10, b"{}")]))
        .send()
        .await
        .unwrap();

    let resp = client.get(format!("{base}/api/v1/datas3t/C/missing-ranges")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["first_datapoint"], 1);
    assert_eq!(body["last_datapoint"], 10);
    assert_eq!(
        body["missing_ranges"],
        json!([{"start": 3, "end": 4}, {"start": 8, "end": 9}])
    );
}

#[tokio::test]
async fn wait_returns_immediately_when_already_satisfied() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/W")).send().await.unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/W"))
        .body(build_tar(&[(1, b"{}"), (2, b"{}"), (3, b"{}")]))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/api/v1/datas3t/wait"))
        .json(&json!({"datasets": {"W": 3}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["datasets"]["W"], 3);
}

#[tokio::test]
async fn wait_times_out_with_202_when_never_satisfied() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/W2")).send().await.unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/W2"))
        .body(build_tar(&[(1, b"{}"), (2, b"{}"), (3, b"{}")]))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/api/v1/datas3t/wait"))
        .json(&json!({"datasets": {"W2": 5}}))
        .timeout(std::time::Duration::from_secs(25))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
}

#[tokio::test]
async fn delete_dataset_enqueues_its_objects_for_removal() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/D")).send().await.unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/D"))
        .body(build_tar(&[(1, b"{}")]))
        .send()
        .await
        .unwrap();

    let resp = client.delete(format!("{base}/api/v1/datas3t/D")).send().await.unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client.get(format!("{base}/api/v1/datas3t/D")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn multipart_upload_completes_and_ingests() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/M")).send().await.unwrap();

    let resp = client.post(format!("{base}/api/v1/datas3t/M/upload")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let upload_id = body["upload_id"].as_str().unwrap().to_string();
    assert_eq!(body["dataset_id"], "M");

    // Split one tar archive across two parts at an entry boundary.
    let whole = build_tar(&[(1, b"{}"), (2, b"{}")]);
    let (part1, part2) = whole.split_at(1024);

    let resp = client
        .put(format!("{base}/api/v1/datas3t/M/upload/{upload_id}/1"))
        .body(part1.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .put(format!("{base}/api/v1/datas3t/M/upload/{upload_id}/2"))
        .body(part2.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let status_resp: Value = client
        .get(format!("{base}/api/v1/datas3t/M/upload/{upload_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status_resp["part_numbers"], json!([1, 2]));

    let resp = client
        .post(format!("{base}/api/v1/datas3t/M/upload/{upload_id}/complete"))
        .json(&json!({"part_ids": [1, 2]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["dataset_id"], "M");
    assert_eq!(body["num_data_points"], 2);

    // The completed upload is gone; re-querying its status is a 404.
    let resp = client.get(format!("{base}/api/v1/datas3t/M/upload/{upload_id}")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn multipart_complete_discards_entry_on_validation_failure() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/MF")).send().await.unwrap();
    let body: Value = client
        .post(format!("{base}/api/v1/datas3t/MF/upload"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let upload_id = body["upload_id"].as_str().unwrap().to_string();

    // Keys 1 and 3 with no entry for 2 — a gap, which `complete` must
    // treat as a fatal validation failure.
    client
        .put(format!("{base}/api/v1/datas3t/MF/upload/{upload_id}/1"))
        .body(build_tar(&[(1, b"{}"), (3, b"{}")]))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/api/v1/datas3t/MF/upload/{upload_id}/complete"))
        .json(&json!({"part_ids": [1]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "GapDetected");

    // The fatal failure must have discarded the upload, not left it for retry.
    let resp = client.get(format!("{base}/api/v1/datas3t/MF/upload/{upload_id}")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn multipart_cancel_discards_staged_parts() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/N")).send().await.unwrap();
    let body: Value = client
        .post(format!("{base}/api/v1/datas3t/N/upload"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let upload_id = body["upload_id"].as_str().unwrap().to_string();

    client
        .put(format!("{base}/api/v1/datas3t/N/upload/{upload_id}/1"))
        .body(build_tar(&[(1, b"{}")]))
        .send()
        .await
        .unwrap();

    let resp = client.delete(format!("{base}/api/v1/datas3t/N/upload/{upload_id}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "cancelled");

    let resp = client.get(format!("{base}/api/v1/datas3t/N/upload/{upload_id}")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn aggregate_on_non_boundary_window_rejects_with_splits_boundary() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/S")).send().await.unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/S"))
        .body(build_tar(&[(1, b"{}"), (2, b"{}"), (3, b"{}"), (4, b"{}")]))
        .send()
        .await
        .unwrap();

    // A single datarange covers [1,4]; asking to aggregate [2,3] splits it.
    let resp = client.post(format!("{base}/api/v1/datas3t/S/aggregate/2/3")).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "SplitsBoundary");
}

#[tokio::test]
async fn aggregate_across_a_gap_between_dataranges_rejects_with_gap_detected() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/G")).send().await.unwrap();
    // Two separately-ingested dataranges with keys 3-4 missing between them.
    client
        .post(format!("{base}/api/v1/datas3t/G"))
        .body(build_tar(&[(1, b"{}"), (2, b"{}")]))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/api/v1/datas3t/G"))
        .body(build_tar(&[(5, b"{}"), (6, b"{}"), (7, b"{}")]))
        .send()
        .await
        .unwrap();

    // Boundary offsets line up (each datarange is whole), but the combined
    // footprint of [1,7] has a gap at 3-4 — must not be mergeable.
    let resp = client.post(format!("{base}/api/v1/datas3t/G/aggregate/1/7")).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "GapDetected");
}

#[tokio::test]
async fn unknown_dataset_routes_404() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    assert_eq!(
        client.get(format!("{base}/api/v1/datas3t/nope")).send().await.unwrap().status(),
        404
    );
    assert_eq!(
        client.get(format!("{base}/api/v1/datas3t/nope/dataranges")).send().await.unwrap().status(),
        404
    );
    assert_eq!(
        client.get(format!("{base}/api/v1/datas3t/nope/datarange/1/2")).send().await.unwrap().status(),
        404
    );
    assert_eq!(
        client.post(format!("{base}/api/v1/datas3t/nope/aggregate/1/2")).send().await.unwrap().status(),
        404
    );
}

#[tokio::test]
async fn uploads_dir_has_no_leftover_temp_files_after_ingest() {
    skip_unless_docker!();
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let base = &server.base_url;

    client.put(format!("{base}/api/v1/datas3t/CLEAN")).send().await.unwrap();
    let resp = client
        .post(format!("{base}/api/v1/datas3t/CLEAN"))
        .body(build_tar(&[(1, b"{}"), (2, b"{}")]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let leftover_files: Vec<_> = walkdir::WalkDir::new(server.uploads_dir_path())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();
    assert!(
        leftover_files.is_empty(),
        "staged temp files were not cleaned up: {leftover_files:?}"
    );
}
