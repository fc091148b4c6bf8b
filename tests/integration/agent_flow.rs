use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Agent contract over HTTP
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_run_algo_data_result() {
    let agent = spawn_agent(sh_sandbox("flow"), 0).await.unwrap();
    let base = agent.base_url();

    let ack: serde_json::Value = post(&format!("{base}/sessions"), r#"{"id":"job-1","name":"demo"}"#)
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = ack["session_id"].as_str().unwrap().to_string();
    let canonical: serde_json::Value =
        serde_json::from_str(ack["computation"].as_str().unwrap()).unwrap();
    assert_eq!(canonical["id"], "job-1");
    assert_eq!(canonical["name"], "demo");

    let session = format!("{base}/sessions/{session_id}");
    wait_for_state(&session, "receiving_algorithms").await.unwrap();

    let resp = post(&format!("{session}/algo"), ARTIFACT_ALGO).await.unwrap();
    assert!(resp.status().is_success());
    wait_for_state(&session, "receiving_data").await.unwrap();

    let resp = post(&format!("{session}/data"), "1,2,3").await.unwrap();
    assert!(resp.status().is_success());
    wait_for_state(&session, "running").await.unwrap();

    let resp = get(&format!("{session}/result")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"ABC123");
    wait_for_state(&session, "complete").await.unwrap();

    // Cached: a second fetch returns the same bytes.
    let again = get(&format!("{session}/result")).await.unwrap().bytes().await.unwrap();
    assert_eq!(again.as_ref(), b"ABC123");
}

#[tokio::test]
async fn test_dataset_reaches_algorithm() {
    let agent = spawn_agent(sh_sandbox("dataset"), 0).await.unwrap();
    let base = agent.base_url();

    let ack: serde_json::Value = post(&format!("{base}/sessions"), "{}").await.unwrap().json().await.unwrap();
    let session = format!("{base}/sessions/{}", ack["session_id"].as_str().unwrap());

    // Under `sh -c`, the dataset is $0 and the output path is $1.
    let algo = r#"printf '===MODEL_MARKER===%s===MODEL_MARKER===' "$0""#;
    post(&format!("{session}/algo"), algo).await.unwrap();
    post(&format!("{session}/data"), "rows=42").await.unwrap();
    // Later submissions do not replace the first ones.
    post(&format!("{session}/algo"), "exit 9").await.unwrap();
    post(&format!("{session}/data"), "rows=0").await.unwrap();

    let body = get(&format!("{session}/result")).await.unwrap().bytes().await.unwrap();
    assert_eq!(body.as_ref(), b"rows=42");
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let agent = spawn_agent(sh_sandbox("independent"), 0).await.unwrap();
    let base = agent.base_url();

    let mut sessions = Vec::new();
    for tag in ["AAA", "BBB"] {
        let ack: serde_json::Value = post(&format!("{base}/sessions"), "{}").await.unwrap().json().await.unwrap();
        let session = format!("{base}/sessions/{}", ack["session_id"].as_str().unwrap());
        post(&format!("{session}/algo"), format!("printf '===MODEL_MARKER==={tag}===MODEL_MARKER==='"))
            .await
            .unwrap();
        post(&format!("{session}/data"), "x").await.unwrap();
        sessions.push((session, tag));
    }

    for (session, tag) in &sessions {
        let body = get(&format!("{session}/result")).await.unwrap().bytes().await.unwrap();
        assert_eq!(body.as_ref(), tag.as_bytes());
    }

    let list: serde_json::Value = get(&format!("{base}/sessions")).await.unwrap().json().await.unwrap();
    assert_eq!(list["sessions"].as_array().unwrap().len(), 2);
    let status: serde_json::Value = get(&format!("{base}/status")).await.unwrap().json().await.unwrap();
    assert_eq!(status["sessions"], 2);
    assert_eq!(status["marker"], "===MODEL_MARKER===");
}
