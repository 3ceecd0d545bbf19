
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use serde_json::json;
use vhl_core::compute_sha256;
use vhl_run::{artifact, RunRequest, RunStatus, MANIFEST_FILE, UNKNOWN_VERSION};
use vhl_template::ParamValue;

use fixtures::{config, lab, seed_templates, StubSimulator, StubValidator, EIS_TABLE};

#[tokio::test]
async fn run_records_hashes_of_executed_bytes() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let simulator = Arc::new(StubSimulator::succeeding("Circuit: resistor\n"));
    let lab = lab(
        config(dir.path()),
        Arc::clone(&simulator),
        Arc::new(StubValidator::accepting()),
    );

    let manifest = lab
        .start_sim(RunRequest::new("resistor.j2", "op.j2").with_run_id("run-1"))
        .await
        .expect("run");

    let merged = "R1 1 2 1000\n\n* --- control ---\n.op\n.end";
    assert_eq!(manifest.sim_id, "run-1");
    assert_eq!(manifest.status, RunStatus::Completed);
    assert_eq!(manifest.exit_code, Some(0));
    assert_eq!(manifest.merged_netlist_sha256, compute_sha256(merged));
    assert_eq!(manifest.model.sha256, compute_sha256("R1 1 2 1000"));
    assert_eq!(manifest.control.sha256, compute_sha256(".op\n.end"));
    assert_eq!(manifest.model.params.get("r"), Some(&ParamValue::Int(1000)));
    assert!(manifest.control.params.contains_key("output_data_file"));
    assert_eq!(
        manifest.tool_versions.get("ngspice").map(String::as_str),
        Some("ngspice-42 : Circuit level simulation program")
    );
    assert_eq!(manifest.execution_log, "Circuit: resistor\n");

    let run_dir = dir.path().join("runs/run-1");
    let on_disk = fs::read_to_string(run_dir.join(artifact::MERGED)).expect("merged");
    assert_eq!(compute_sha256(&on_disk), manifest.merged_netlist_sha256);
    assert_eq!(simulator.last_input(), Some(run_dir.join(artifact::MERGED)));
    assert!(run_dir.join(MANIFEST_FILE).is_file());
    assert_eq!(
        fs::read_to_string(run_dir.join(artifact::LOG)).expect("log"),
        "Circuit: resistor\n"
    );

    let stored = lab.read_results("run-1").expect("read").expect("present");
    assert_eq!(stored, manifest);
}

#[tokio::test]
async fn injected_data_path_is_part_of_the_hashed_control() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let lab = lab(
        config(dir.path()),
        Arc::new(StubSimulator::succeeding("")),
        Arc::new(StubValidator::accepting()),
    );

    let manifest = lab
        .start_sim(
            RunRequest::new("resistor.j2", "eis.j2")
                .with_run_id("eis-1")
                .with_control_param("points", json!(20)),
        )
        .await
        .expect("run");

    let data_path = dir.path().join("runs/eis-1").join(artifact::DATA);
    let control = fs::read_to_string(dir.path().join("runs/eis-1").join(artifact::CONTROL))
        .expect("control");
    assert_eq!(
        control,
        format!(".ac dec 20 1 1k\nwrdata {} v(1)\n.end", data_path.display())
    );
    assert_eq!(manifest.control.sha256, compute_sha256(&control));
    assert_eq!(
        manifest.control.params.get("output_data_file"),
        Some(&ParamValue::Str(data_path.display().to_string()))
    );
}

#[tokio::test]
async fn derived_ids_differ_but_share_the_fingerprint() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let lab = lab(
        config(dir.path()),
        Arc::new(StubSimulator::succeeding("")),
        Arc::new(StubValidator::accepting()),
    );

    let request = RunRequest::new("resistor.j2", "op.j2").with_model_param("r", json!(220));
    let first = lab.start_sim(request.clone()).await.expect("first");
    let second = lab.start_sim(request).await.expect("second");

    assert_ne!(first.sim_id, second.sim_id);
    let suffix = |id: &str| id.rsplit('_').next().map(str::to_string);
    assert_eq!(suffix(&first.sim_id), suffix(&second.sim_id));
    assert_eq!(suffix(&first.sim_id).map(|s| s.len()), Some(8));
    assert_eq!(lab.list_runs().expect("list").len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_derived_runs_get_distinct_directories() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let lab = Arc::new(lab(
        config(dir.path()),
        Arc::new(StubSimulator::succeeding("")),
        Arc::new(StubValidator::accepting()),
    ));

    let handles: Vec<_> = (0..48)
        .map(|_| {
            let lab = Arc::clone(&lab);
            tokio::spawn(async move {
                lab.start_sim(RunRequest::new("resistor.j2", "op.j2"))
                    .await
                    .map(|manifest| manifest.sim_id)
            })
        })
        .collect();
    let mut ids = BTreeSet::new();
    for handle in handles {
        ids.insert(handle.await.expect("join").expect("run"));
    }

    assert_eq!(ids.len(), 48);
    assert_eq!(lab.list_runs().expect("list").len(), 48);
}

#[tokio::test]
async fn failed_derived_run_releases_its_directory() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let lab = lab(
        config(dir.path()),
        Arc::new(StubSimulator::succeeding("")),
        Arc::new(StubValidator::accepting()),
    );

    let err = lab
        .start_sim(RunRequest::new("resistor.j2", "shell.j2"))
        .await
        .expect_err("forbidden");
    assert_eq!(err.info().code, "run.forbidden_directive");
    let leftovers = fs::read_dir(dir.path().join("runs"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn unknown_template_creates_no_run() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let simulator = Arc::new(StubSimulator::succeeding(""));
    let lab = lab(
        config(dir.path()),
        Arc::clone(&simulator),
        Arc::new(StubValidator::accepting()),
    );

    let err = lab
        .start_sim(RunRequest::new("missing.j2", "op.j2").with_run_id("ghost"))
        .await
        .expect_err("unknown model");
    assert_eq!(err.info().code, "run.unknown_template");
    assert!(!dir.path().join("runs/ghost").exists());
    assert!(simulator.last_input().is_none());
}

#[tokio::test]
async fn out_of_range_parameter_is_rejected_before_rendering() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let lab = lab(
        config(dir.path()),
        Arc::new(StubSimulator::succeeding("")),
        Arc::new(StubValidator::accepting()),
    );

    let err = lab
        .start_sim(
            RunRequest::new("resistor.j2", "op.j2")
                .with_run_id("neg")
                .with_model_param("r", json!(0)),
        )
        .await
        .expect_err("below min");
    assert_eq!(err.info().code, "params.below_min");
    assert_eq!(
        err.info().context.get("template").map(String::as_str),
        Some("resistor.j2")
    );
}

#[tokio::test]
async fn traversal_run_ids_are_rejected() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let lab = lab(
        config(dir.path()),
        Arc::new(StubSimulator::succeeding("")),
        Arc::new(StubValidator::accepting()),
    );

    for run_id in ["../../etc/passwd", "..", "nested/run"] {
        let err = lab
            .start_sim(RunRequest::new("resistor.j2", "op.j2").with_run_id(run_id))
            .await
            .expect_err(run_id);
        assert_eq!(err.info().code, "store.path_traversal");
    }
    let err = lab.artifact("x", "../manifest.json").expect_err("artifact");
    assert_eq!(err.info().code, "store.path_traversal");
    assert!(lab.read_results("../runs").is_err());
}

#[tokio::test]
async fn forbidden_directive_blocks_execution() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let simulator = Arc::new(StubSimulator::succeeding(""));
    let lab = lab(
        config(dir.path()),
        Arc::clone(&simulator),
        Arc::new(StubValidator::accepting()),
    );

    let err = lab
        .start_sim(RunRequest::new("resistor.j2", "shell.j2").with_run_id("bad"))
        .await
        .expect_err("forbidden");
    assert_eq!(err.info().code, "run.forbidden_directive");
    assert!(simulator.last_input().is_none());
}

#[tokio::test]
async fn preflight_rejection_stops_the_run() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let mut config = config(dir.path());
    config.run.preflight_validation = true;
    let simulator = Arc::new(StubSimulator::succeeding(""));
    let validator = Arc::new(StubValidator::rejecting("SPICE code validation failed: bad"));
    let lab = lab(config, Arc::clone(&simulator), Arc::clone(&validator));

    let err = lab
        .start_sim(RunRequest::new("resistor.j2", "op.j2").with_run_id("pre"))
        .await
        .expect_err("rejected");
    assert!(matches!(err, vhl_core::LabError::Rejected(_)));
    assert_eq!(validator.calls(), 1);
    assert!(simulator.last_input().is_none());
    assert!(!dir.path().join("runs/pre").exists());
}

#[tokio::test]
async fn non_zero_exit_is_recorded_not_raised() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let simulator = Arc::new(
        StubSimulator::with_output(vhl_run::ProcessOutput {
            exit_code: Some(1),
            stdout: "out\n".into(),
            stderr: "Error: no such vector\n".into(),
            timed_out: false,
        })
        .without_version(),
    );
    let lab = lab(
        config(dir.path()),
        simulator,
        Arc::new(StubValidator::accepting()),
    );

    let manifest = lab
        .start_sim(RunRequest::new("resistor.j2", "op.j2").with_run_id("nz"))
        .await
        .expect("recorded");
    assert_eq!(manifest.status, RunStatus::Completed);
    assert_eq!(manifest.exit_code, Some(1));
    assert_eq!(manifest.execution_log, "out\nError: no such vector\n");
    assert_eq!(
        manifest.tool_versions.get("ngspice").map(String::as_str),
        Some(UNKNOWN_VERSION)
    );
    assert!(!manifest.artifacts.contains_key("nyquist_plot"));
}

#[tokio::test]
async fn timeout_writes_manifest_then_fails() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let simulator = Arc::new(StubSimulator::with_output(vhl_run::ProcessOutput {
        exit_code: None,
        stdout: "partial".into(),
        stderr: String::new(),
        timed_out: true,
    }));
    let lab = lab(
        config(dir.path()),
        Arc::clone(&simulator),
        Arc::new(StubValidator::accepting()),
    );

    let err = lab
        .start_sim(RunRequest::new("resistor.j2", "op.j2").with_run_id("slow"))
        .await
        .expect_err("timeout");
    assert!(matches!(err, vhl_core::LabError::Timeout(_)));
    assert_eq!(
        simulator.timeouts.lock().expect("timeouts").last().copied(),
        Some(Some(std::time::Duration::from_secs(60)))
    );

    let log = fs::read_to_string(dir.path().join("runs/slow").join(artifact::LOG)).expect("log");
    assert!(log.starts_with("TimeoutExpired:"));
    assert!(log.contains("partial"));
    let manifest = lab.read_results("slow").expect("read").expect("manifest");
    assert_eq!(manifest.status, RunStatus::TimedOut);
    assert_eq!(manifest.exit_code, None);
}

#[tokio::test]
async fn impedance_data_produces_a_plot() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let simulator = Arc::new(StubSimulator::succeeding("").writing_data(EIS_TABLE));
    let lab = lab(
        config(dir.path()),
        simulator,
        Arc::new(StubValidator::accepting()),
    );

    let manifest = lab
        .start_sim(RunRequest::new("resistor.j2", "eis.j2").with_run_id("plot"))
        .await
        .expect("run");
    assert_eq!(manifest.artifact("sim_data"), Some(artifact::DATA));
    assert_eq!(manifest.artifact("nyquist_plot"), Some(artifact::PLOT));

    let svg = lab
        .artifact("plot", artifact::PLOT)
        .expect("read")
        .expect("plot");
    let svg = String::from_utf8(svg).expect("utf8");
    assert_eq!(svg.matches("<circle").count(), 3);
}

#[tokio::test]
async fn reused_run_id_drops_stale_outputs() {
    let dir = tempfile::tempdir().expect("tmp");
    seed_templates(dir.path());
    let with_data = lab(
        config(dir.path()),
        Arc::new(StubSimulator::succeeding("").writing_data(EIS_TABLE)),
        Arc::new(StubValidator::accepting()),
    );
    with_data
        .start_sim(RunRequest::new("resistor.j2", "eis.j2").with_run_id("again"))
        .await
        .expect("first");

    let without_data = lab(
        config(dir.path()),
        Arc::new(StubSimulator::succeeding("")),
        Arc::new(StubValidator::accepting()),
    );
    let manifest = without_data
        .start_sim(RunRequest::new("resistor.j2", "eis.j2").with_run_id("again"))
        .await
        .expect("second");
    assert!(manifest.artifact("nyquist_plot").is_none());
    assert!(without_data
        .artifact("again", artifact::DATA)
        .expect("read")
        .is_none());
}
