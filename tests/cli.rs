use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "filename,label,scores,x,y,z,l,w,h,r\n";

const MODEL_A: &str = "s1,1,0.9,0,0,0,4,2,1.5,0\n\
                       s2,1,0.95,10,0,0,4,2,1.5,0\n";
const MODEL_B: &str = "s1,1,0.88,0.1,0.1,0,4,2,1.5,0.02\n\
                       s2,2,0.6,30,0,0,1,1,1,0\n";

fn write_table(dir: &TempDir, name: &str, rows: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("{}{}", HEADER, rows)).unwrap();
    path
}

/// A boxfuse command isolated from the user's config.
fn boxfuse(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("boxfuse").unwrap();
    cmd.env_remove("BOXFUSE_CONFIG")
        .env_remove("BOXFUSE_LOG")
        .env("XDG_CONFIG_HOME", dir.path())
        .env("NO_COLOR", "1");
    cmd
}

fn fuse(dir: &TempDir, inputs: &[&Path], out: &Path) -> Command {
    let mut cmd = boxfuse(dir);
    cmd.arg("fuse").args(inputs).arg("-o").arg(out);
    cmd
}

fn json_stdout(cmd: &mut Command) -> (i32, Value) {
    let output = cmd.output().expect("failed to run boxfuse");
    let value = serde_json::from_slice(&output.stdout).expect("invalid json");
    (output.status.code().unwrap_or(-1), value)
}

#[test]
fn fuses_two_models_with_default_thresholds() {
    let dir = TempDir::new().unwrap();
    let a = write_table(&dir, "a.csv", MODEL_A);
    let b = write_table(&dir, "b.csv", MODEL_B);
    let out = dir.path().join("fused.csv");

    fuse(&dir, &[&a, &b], &out)
        .assert()
        .success()
        .stdout(contains("Totals:"))
        .stdout(contains("fused boxes = 2"));

    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(
        written,
        "filename,label,scores,x,y,z,l,w,h,r\n\
         s1,1,0.9,0.0,0.0,0.0,4.0,2.0,1.5,0.0\n\
         s2,1,0.95,10.0,0.0,0.0,4.0,2.0,1.5,0.0\n"
    );
}

#[test]
fn json_report_counts_boxes() {
    let dir = TempDir::new().unwrap();
    let a = write_table(&dir, "a.csv", MODEL_A);
    let b = write_table(&dir, "b.csv", MODEL_B);
    let out = dir.path().join("fused.csv");

    let (code, report) = json_stdout(fuse(&dir, &[&a, &b], &out).arg("--json"));
    assert_eq!(code, 0);
    assert_eq!(report["totals"]["scenes"], 2);
    assert_eq!(report["totals"]["input_boxes"], 4);
    assert_eq!(report["totals"]["fused_boxes"], 2);
    assert_eq!(report["match_iou_threshold"], 0.7);
    assert_eq!(report["scenes"][0]["status"], "fused");
}

#[test]
fn thresholds_from_flags_override_defaults() {
    let dir = TempDir::new().unwrap();
    let a = write_table(&dir, "a.csv", MODEL_A);
    let b = write_table(&dir, "b.csv", MODEL_B);
    let out = dir.path().join("fused.csv");

    let (code, report) = json_stdout(
        fuse(&dir, &[&a, &b], &out).args(["--skip-box-thr", "0.5", "--iou-thr", "0.5", "--json"]),
    );
    assert_eq!(code, 0);
    // the class 2 box in s2 now passes the score threshold
    assert_eq!(report["totals"]["fused_boxes"], 3);
}

#[test]
fn invalid_rows_fail_only_their_scene() {
    let dir = TempDir::new().unwrap();
    let rows = format!("{}s3,1,oops,0,0,0,4,2,1.5,0\n", MODEL_A);
    let a = write_table(&dir, "a.csv", &rows);
    let out = dir.path().join("fused.csv");

    fuse(&dir, &[&a], &out)
        .assert()
        .code(1)
        .stdout(contains("s3 failed"));

    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("s1,1,0.9"));
    assert!(written.contains("s2,1,0.95"));
    assert!(!written.contains("s3"));
}

#[test]
fn weight_count_mismatch_is_a_warning() {
    let dir = TempDir::new().unwrap();
    let a = write_table(&dir, "a.csv", MODEL_A);
    let out = dir.path().join("fused.csv");

    let (code, report) = json_stdout(fuse(&dir, &[&a], &out).args(["--weights", "1,2", "--json"]));
    assert_eq!(code, 0);
    let warning = report["warnings"][0].as_str().unwrap();
    assert!(warning.contains("incorrect number of weights"));

    fuse(&dir, &[&a], &out)
        .args(["--weights", "1,2", "--strict", "--quiet"])
        .assert()
        .code(1);
}

#[test]
fn average_aggregation_falls_back_to_max() {
    let dir = TempDir::new().unwrap();
    let a = write_table(&dir, "a.csv", MODEL_A);
    let out = dir.path().join("fused.csv");

    let (code, report) =
        json_stdout(fuse(&dir, &[&a], &out).args(["--conf-type", "avg", "--json"]));
    assert_eq!(code, 0);
    assert!(report["warnings"][0].as_str().unwrap().contains("not implemented"));
    assert_eq!(report["totals"]["fused_boxes"], 2);
}

#[test]
fn scene_filter_limits_the_run() {
    let dir = TempDir::new().unwrap();
    let a = write_table(&dir, "a.csv", MODEL_A);
    let out = dir.path().join("fused.csv");

    let (_, report) = json_stdout(fuse(&dir, &[&a], &out).args(["--scenes", "^s2$", "--json"]));
    assert_eq!(report["totals"]["scenes"], 1);
    assert_eq!(report["scenes"][0]["scene_id"], "s2");

    fuse(&dir, &[&a], &out).args(["--scenes", "("]).assert().code(2);
}

#[test]
fn out_of_range_threshold_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let a = write_table(&dir, "a.csv", MODEL_A);
    let out = dir.path().join("fused.csv");

    fuse(&dir, &[&a], &out)
        .args(["--iou-thr", "1.5"])
        .assert()
        .code(2)
        .stderr(contains("match_iou_threshold"));
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.csv");
    let out = dir.path().join("fused.csv");

    fuse(&dir, &[&missing], &out)
        .assert()
        .code(3)
        .stderr(contains("nope.csv"));
}

#[test]
fn missing_column_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.csv");
    std::fs::write(&path, "filename,label,scores\ns1,1,0.9\n").unwrap();
    let out = dir.path().join("fused.csv");

    fuse(&dir, &[&path], &out)
        .assert()
        .code(3)
        .stderr(contains("missing required column 'x'"));
}

#[test]
fn scenes_lists_classes_per_scene() {
    let dir = TempDir::new().unwrap();
    let b = write_table(&dir, "b.csv", MODEL_B);

    let (code, listing) = json_stdout(boxfuse(&dir).arg("scenes").arg(&b).arg("--json"));
    assert_eq!(code, 0);
    assert_eq!(listing[0]["scene_id"], "s1");
    assert_eq!(listing[0]["classes"]["1"], 1);
    assert_eq!(listing[1]["classes"]["2"], 1);

    boxfuse(&dir)
        .arg("scenes")
        .arg(&b)
        .assert()
        .success()
        .stdout(contains("s2: 1 boxes [1x2]"));
}

#[test]
fn schema_describes_the_report() {
    let dir = TempDir::new().unwrap();
    boxfuse(&dir)
        .arg("schema")
        .assert()
        .success()
        .stdout(contains("FusionReport"))
        .stdout(contains("failed_scenes"));
}

#[test]
fn config_init_writes_defaults_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("boxfuse.toml");

    boxfuse(&dir)
        .arg("--config")
        .arg(&path)
        .args(["config", "--init"])
        .assert()
        .success();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("score_threshold = 0.85"));

    boxfuse(&dir)
        .arg("--config")
        .arg(&path)
        .args(["config", "--init"])
        .assert()
        .code(2)
        .stderr(contains("already exists"));
}

#[test]
fn config_file_thresholds_apply_to_fuse() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("boxfuse.toml");
    std::fs::write(&config, "[fusion]\nscore_threshold = 0.5\n").unwrap();
    let a = write_table(&dir, "a.csv", MODEL_A);
    let b = write_table(&dir, "b.csv", MODEL_B);
    let out = dir.path().join("fused.csv");

    let (_, report) = json_stdout(
        fuse(&dir, &[&a, &b], &out)
            .arg("--config")
            .arg(&config)
            .arg("--json"),
    );
    assert_eq!(report["score_threshold"], 0.5);
    assert_eq!(report["match_iou_threshold"], 0.7);
}

#[test]
fn no_arguments_prints_help() {
    let dir = TempDir::new().unwrap();
    boxfuse(&dir).assert().failure().stderr(contains("Usage"));
}

#[test]
fn convert_writes_kitti_points() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("scan.xyz");
    std::fs::write(&input, "1 2 3\n4 5 6\n").unwrap();
    let out = dir.path().join("scan.bin");

    boxfuse(&dir)
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let bytes = std::fs::read(&out).unwrap();
    let cloud = boxfuse::pointcloud::PointCloud::read_bin(bytes.as_slice()).unwrap();
    assert_eq!(
        cloud.points(),
        &[[-1.0, -2.0, 3.0, 0.0], [-4.0, -5.0, 6.0, 0.0]]
    );
}

#[test]
fn convert_rejects_ragged_points() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("scan.xyz");
    std::fs::write(&input, "1 2 3\n4 5\n").unwrap();

    boxfuse(&dir)
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("scan.bin"))
        .assert()
        .code(3)
        .stderr(contains("line 2"));
}
