//! Manager commands: submit a computation, list VMs.

use anyhow::{Context, Result};

use enclave_core::wire::{ManagerRunResponse, VmList};

use super::http::{base_url, get_json, post_bytes, read_file};

pub async fn cmd_submit(port: u16, path: &str) -> Result<()> {
    let body = read_file(path)?;
    serde_json::from_slice::<serde_json::Value>(&body)
        .with_context(|| format!("{} is not valid JSON", path))?;

    let resp: ManagerRunResponse =
        post_bytes(&format!("{}/run", base_url(port)), body, "application/json").await?;

    println!("═══════════════════════════════════════");
    println!("  Computation Submitted");
    println!("═══════════════════════════════════════");
    println!("  VM         : {}", resp.vm_id);
    println!("  ssh port   : {}", resp.ports.ssh);
    println!("  aux port   : {}", resp.ports.aux);
    println!("  agent port : {}", resp.ports.agent);
    println!("  session    : {}", resp.session_id);
    println!();
    println!("  Upload with:");
    println!(
        "    enclave-ctl --agent-port {} algo {} <file>",
        resp.ports.agent, resp.session_id
    );

    Ok(())
}

pub async fn cmd_vms(port: u16) -> Result<()> {
    let resp: VmList = get_json(&format!("{}/vms", base_url(port))).await?;

    if resp.vms.is_empty() {
        println!("No VMs provisioned.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  VMs ({})", resp.vms.len());
    println!("═══════════════════════════════════════");

    for vm in &resp.vms {
        let pid = vm
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  ┌─ {}", vm.vm_id);
        println!("  │  pid     : {}", pid);
        println!(
            "  │  ports   : ssh {} / aux {} / agent {}",
            vm.ports.ssh, vm.ports.aux, vm.ports.agent
        );
        println!("  └─ created : {}", vm.created_at);
    }

    Ok(())
}
