use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Failure propagation
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_provisioning_failure_reaches_caller() {
    let config = manager_config();
    let manager = spawn_manager(Arc::new(NoHypervisor), &config).await.unwrap();

    let resp = post(&format!("{manager}/run"), "{}").await.unwrap();
    assert_eq!(resp.status().as_u16(), 502);
    assert_eq!(resp.text().await.unwrap(), "no hypervisor available");

    let vms: serde_json::Value = get(&format!("{manager}/vms")).await.unwrap().json().await.unwrap();
    assert!(vms["vms"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_dead_agent_is_remote_failure() {
    let config = manager_config();
    let mut provisioner = LoopbackProvisioner::new(sh_sandbox("dead"));
    provisioner.without_agent = true;
    let manager = spawn_manager(Arc::new(provisioner), &config).await.unwrap();

    let resp = post(&format!("{manager}/run"), "{}").await.unwrap();
    assert_eq!(resp.status().as_u16(), 502);
    let msg = resp.text().await.unwrap();
    assert!(msg.contains("agent request"), "unexpected message: {msg}");

    // The VM exists even though the handoff failed.
    let vms: serde_json::Value = get(&format!("{manager}/vms")).await.unwrap().json().await.unwrap();
    assert_eq!(vms["vms"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_algorithm_is_not_cached() {
    let agent = spawn_agent(sh_sandbox("nocache"), 0).await.unwrap();
    let base = agent.base_url();
    let ack: serde_json::Value = post(&format!("{base}/sessions"), "{}").await.unwrap().json().await.unwrap();
    let session = format!("{base}/sessions/{}", ack["session_id"].as_str().unwrap());

    post(&format!("{session}/algo"), "echo boom >&2; exit 3").await.unwrap();
    post(&format!("{session}/data"), "x").await.unwrap();

    for _ in 0..2 {
        let resp = get(&format!("{session}/result")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 500);
        let msg = resp.text().await.unwrap();
        assert!(msg.contains("boom"), "stderr missing from: {msg}");
    }
    // Never reached results_ready.
    wait_for_state(&session, "running").await.unwrap();
}

#[tokio::test]
async fn test_single_marker_is_extraction_failure() {
    let agent = spawn_agent(sh_sandbox("onemarker"), 0).await.unwrap();
    let base = agent.base_url();
    let ack: serde_json::Value = post(&format!("{base}/sessions"), "{}").await.unwrap().json().await.unwrap();
    let session = format!("{base}/sessions/{}", ack["session_id"].as_str().unwrap());

    post(&format!("{session}/algo"), "printf '===MODEL_MARKER===ABC123'").await.unwrap();
    post(&format!("{session}/data"), "x").await.unwrap();

    let resp = get(&format!("{session}/result")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}
