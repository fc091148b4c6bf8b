use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Default python3 sandbox
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_python_algorithm() {
    if !python3_available() {
        eprintln!("SKIP: python3 not installed");
        return;
    }

    let sandbox = SandboxSettings {
        work_dir: scratch_dir("python"),
        ..SandboxSettings::default()
    };
    let agent = spawn_agent(sandbox, 0).await.unwrap();
    let base = agent.base_url();
    let ack: serde_json::Value = post(&format!("{base}/sessions"), "{}").await.unwrap().json().await.unwrap();
    let session = format!("{base}/sessions/{}", ack["session_id"].as_str().unwrap());

    let algo = "import sys\n\
                rows = sys.argv[1].split(',')\n\
                print('training on', len(rows), 'rows')\n\
                open(sys.argv[2], 'w').write('done')\n\
                print('===MODEL_MARKER===ABC123===MODEL_MARKER===')\n";
    post(&format!("{session}/algo"), algo).await.unwrap();
    post(&format!("{session}/data"), "1,2,3").await.unwrap();

    let resp = get(&format!("{session}/result")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"ABC123");
}
