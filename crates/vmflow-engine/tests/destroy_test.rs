mod common;

use common::{FakeHypervisor, ScriptedPrompt};
use std::path::Path;
use std::time::Duration;
use vmflow_core::WorkPaths;
use vmflow_engine::{
    Authorization, ConfirmationGate, DESTROY_ALL_PHRASE, DestroyAuthorization, DestroyError,
    DestroyWorkflow, find_matching,
};

fn authorize(vms: &[&str]) -> DestroyAuthorization {
    let names: Vec<String> = vms.iter().map(|v| v.to_string()).collect();
    let prompt = ScriptedPrompt::new(&["yes"]);
    ConfirmationGate::new(&prompt)
        .confirm_bulk(&names)
        .unwrap()
        .granted()
        .expect("authorization granted")
}

fn work_paths(dir: &Path) -> WorkPaths {
    let paths = WorkPaths::under(dir);
    std::fs::create_dir_all(&paths.work_dir).unwrap();
    paths
}

fn steps_for(hv: &FakeHypervisor, vm: &str) -> Vec<String> {
    hv.calls()
        .into_iter()
        .filter(|c| c.ends_with(&format!("({vm})")))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_destroy_order() {
    let hv = FakeHypervisor::new().with_vms(&["vm-1"]);
    let dir = tempfile::tempdir().unwrap();

    let report = DestroyWorkflow::new(&hv, work_paths(dir.path()), Duration::from_secs(3))
        .destroy(&authorize(&["vm-1"]))
        .await;

    assert_eq!(report.destroyed(), 1);
    assert_eq!(
        steps_for(&hv, "vm-1"),
        vec!["power_off(vm-1)", "remove_snapshots(vm-1)", "destroy_vm(vm-1)"]
    );
}

/// 既に電源オフでも残りの手順は実行される
#[tokio::test(start_paused = true)]
async fn test_power_off_noop_still_destroys() {
    let hv = FakeHypervisor::new()
        .with_vms(&["vm-1"])
        .fail_on("power_off")
        .fail_on("remove_snapshots");
    let dir = tempfile::tempdir().unwrap();

    let report = DestroyWorkflow::new(&hv, work_paths(dir.path()), Duration::from_secs(3))
        .destroy(&authorize(&["vm-1"]))
        .await;

    let vm = &report.reports[0];
    assert!(!vm.powered_off);
    assert!(!vm.snapshots_removed);
    assert!(vm.destroyed);
    assert_eq!(
        steps_for(&hv, "vm-1"),
        vec!["power_off(vm-1)", "remove_snapshots(vm-1)", "destroy_vm(vm-1)"]
    );
}

/// 1台の失敗で他の削除は止まらない
#[tokio::test(start_paused = true)]
async fn test_failure_does_not_stop_bulk() {
    let hv = FakeHypervisor::new()
        .with_vms(&["vm-1", "vm-2"])
        .fail_on("destroy_vm(vm-1)");
    let dir = tempfile::tempdir().unwrap();
    let paths = work_paths(dir.path());
    std::fs::write(paths.iso_path("vm-1"), "iso").unwrap();
    std::fs::write(paths.iso_path("vm-2"), "iso").unwrap();

    let report = DestroyWorkflow::new(&hv, paths.clone(), Duration::ZERO)
        .destroy(&authorize(&["vm-1", "vm-2"]))
        .await;

    assert_eq!(report.attempted(), 2);
    assert_eq!(report.destroyed(), 1);
    assert!(!report.all_destroyed());
    let failed: Vec<&str> = report.failures().map(|r| r.vm.as_str()).collect();
    assert_eq!(failed, vec!["vm-1"]);
    assert!(report.reports[0].error.as_deref().unwrap().contains("vm-1"));

    // 失敗したVMのローカルファイルは残す
    assert!(paths.iso_path("vm-1").exists());
    assert!(!paths.iso_path("vm-2").exists());
}

/// 名前の一部が一致するだけの成果物やイメージは削除しない
#[tokio::test(start_paused = true)]
async fn test_destroy_keeps_other_artifacts() {
    let hv = FakeHypervisor::new().with_vms(&["cloud"]);
    let dir = tempfile::tempdir().unwrap();
    let paths = work_paths(dir.path());
    let image = paths.work_dir.join("oracular-server-cloudimg-amd64.ova");
    let other_iso = paths.iso_path("ubuntu-pentest-20250309-140507");
    std::fs::write(&image, "image").unwrap();
    std::fs::write(&other_iso, "iso").unwrap();
    std::fs::write(paths.iso_path("cloud"), "iso").unwrap();

    let report = DestroyWorkflow::new(&hv, paths.clone(), Duration::ZERO)
        .destroy(&authorize(&["cloud"]))
        .await;

    assert!(report.all_destroyed());
    assert_eq!(report.reports[0].removed_files, vec![paths.iso_path("cloud")]);
    assert!(image.exists());
    assert!(other_iso.exists());
}

#[tokio::test]
async fn test_find_matching() {
    let hv = FakeHypervisor::new().with_vms(&[
        "ubuntu-pentest-20250309-140507",
        "ubuntu-pentest-20250310-090000",
        "web-01",
    ]);

    let by_substring = find_matching(&hv, "pentest").await.unwrap();
    assert_eq!(by_substring.len(), 2);

    let by_glob = find_matching(&hv, "web-*").await.unwrap();
    assert_eq!(by_glob, vec!["web-01"]);

    assert!(matches!(
        find_matching(&hv, "[").await,
        Err(DestroyError::InvalidPattern(_))
    ));
}

#[tokio::test]
async fn test_find_matching_listing_error() {
    let hv = FakeHypervisor::new().fail_on("list_vms");
    assert!(matches!(
        find_matching(&hv, "vm").await,
        Err(DestroyError::Listing(_))
    ));
}

#[test]
fn test_single_confirmation_requires_exact_phrase() {
    let prompt = ScriptedPrompt::new(&["delete vm-1"]);
    let gate = ConfirmationGate::new(&prompt);
    assert_eq!(gate.confirm_single("vm-1").unwrap(), Authorization::Denied);

    let prompt = ScriptedPrompt::new(&["DELETE vm-1"]);
    let auth = ConfirmationGate::new(&prompt)
        .confirm_single("vm-1")
        .unwrap()
        .granted()
        .unwrap();
    assert!(auth.covers("vm-1"));
    assert!(!auth.covers("vm-2"));
}

#[test]
fn test_destroy_all_needs_both_confirmations() {
    let vms = vec!["vm-1".to_string(), "vm-2".to_string()];

    let prompt = ScriptedPrompt::new(&["destroy all", "yes"]);
    let gate = ConfirmationGate::new(&prompt);
    assert_eq!(gate.confirm_all(&vms).unwrap(), Authorization::Denied);
    assert_eq!(prompt.asked(), 1);

    let prompt = ScriptedPrompt::new(&[DESTROY_ALL_PHRASE, "YES"]);
    let auth = ConfirmationGate::new(&prompt).confirm_all(&vms).unwrap();
    assert_eq!(auth.granted().unwrap().vms(), vms.as_slice());
}

#[test]
fn test_bulk_with_no_vms_does_not_prompt() {
    let prompt = ScriptedPrompt::new(&[]);
    let auth = ConfirmationGate::new(&prompt).confirm_bulk(&[]).unwrap();
    assert_eq!(auth, Authorization::Denied);
    assert_eq!(prompt.asked(), 0);
}
