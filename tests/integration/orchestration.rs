use std::collections::HashSet;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Manager → VM → agent
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_submit_through_manager() {
    let config = manager_config();
    let provisioner = Arc::new(LoopbackProvisioner::new(sh_sandbox("manager")));
    let manager = spawn_manager(provisioner.clone(), &config).await.unwrap();

    let resp = post(&format!("{manager}/run"), r#"{"id":"job-7"}"#).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let run: serde_json::Value = resp.json().await.unwrap();

    let agent_port = run["ports"]["agent"].as_u64().unwrap() as u16;
    assert_eq!(agent_port, config.vm.base_ports.agent);
    assert_eq!(run["ports"]["ssh"], 2222);
    assert_eq!(run["ports"]["aux"], 9301);

    // Continue the protocol directly against the VM's forwarded agent port.
    let session = format!(
        "http://127.0.0.1:{agent_port}/api/sessions/{}",
        run["session_id"].as_str().unwrap()
    );
    wait_for_state(&session, "receiving_algorithms").await.unwrap();
    post(&format!("{session}/algo"), ARTIFACT_ALGO).await.unwrap();
    post(&format!("{session}/data"), "payload").await.unwrap();
    let body = get(&format!("{session}/result")).await.unwrap().bytes().await.unwrap();
    assert_eq!(body.as_ref(), b"ABC123");

    let vms: serde_json::Value = get(&format!("{manager}/vms")).await.unwrap().json().await.unwrap();
    let vms = vms["vms"].as_array().unwrap();
    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0]["vm_id"], run["vm_id"]);
}

#[tokio::test]
async fn test_each_run_gets_its_own_vm() {
    let config = manager_config();
    let provisioner = Arc::new(LoopbackProvisioner::new(sh_sandbox("many")));
    let manager = spawn_manager(provisioner.clone(), &config).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let url = format!("{manager}/run");
        handles.push(tokio::spawn(async move {
            let resp = post(&url, format!(r#"{{"id":"job-{i}"}}"#)).await.unwrap();
            assert_eq!(resp.status().as_u16(), 200);
            resp.json::<serde_json::Value>().await.unwrap()
        }));
    }

    let mut triples = HashSet::new();
    let mut vm_ids = HashSet::new();
    for h in handles {
        let run = h.await.unwrap();
        triples.insert((
            run["ports"]["ssh"].as_u64().unwrap(),
            run["ports"]["aux"].as_u64().unwrap(),
            run["ports"]["agent"].as_u64().unwrap(),
        ));
        vm_ids.insert(run["vm_id"].as_str().unwrap().to_string());
    }
    assert_eq!(triples.len(), 4);
    assert_eq!(vm_ids.len(), 4);
    assert_eq!(provisioner.agents.lock().await.len(), 4);
}

#[test]
fn test_reserved_agent_ports_are_all_bindable() {
    let base = manager_config().vm.base_ports.agent;
    let held: Vec<_> = (base..base + MAX_VMS_PER_TEST)
        .map(|p| std::net::TcpListener::bind(("127.0.0.1", p)))
        .collect();
    // Another process may grab a port between the two scans; tolerate one.
    let bound = held.iter().filter(|r| r.is_ok()).count();
    assert!(bound + 1 >= MAX_VMS_PER_TEST as usize, "only {bound} ports bindable");
}
