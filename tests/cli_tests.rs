//! Command-Line Interface Tests
//!
//! Drives the `variant-accession` binary against snapshot stores in temporary
//! directories and checks outputs and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ASSEMBLY_REPORT: &str = "# Assembly name:  TestAssembly
# GenBank assembly accession: GCA_1
# Sequence-Name\tSequence-Role\tAssigned-Molecule\tAssigned-Molecule-Location/Type\tGenBank-Accn\tRelationship\tRefSeq-Accn\tAssembly-Unit\tSequence-Length\tUCSC-style-name
1\tassembled-molecule\t1\tChromosome\tCM000663.2\t=\tNC_000001.11\tPrimary Assembly\t248956422\tchr1
";

fn cli() -> Command {
    Command::cargo_bin("variant-accession").unwrap()
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn accession(store: &Path, input: &Path) -> Command {
    let mut cmd = cli();
    cmd.arg("accession")
        .arg(input)
        .arg("--store")
        .arg(store)
        .args(["--assembly", "GCA_1", "--project", "PRJ1", "--workers", "2"]);
    cmd
}

#[test]
fn test_accession_completes() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let input = write(&dir, "variants.tsv", "1\t100\tA\tT\n1\t100\tA\tT\tPRJ2\n1\t200\tC\tG\n");

    accession(&store, &input)
        .assert()
        .success()
        .stdout(predicate::str::contains("COMPLETED"))
        .stdout(predicate::str::contains("New accessions:   3"));
    assert!(store.exists());

    // Same input again: nothing new
    accession(&store, &input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Already known:    3"));
}

#[test]
fn test_accession_json_report() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let input = write(&dir, "variants.csv", "contig,start,ref,alt\n1,100,A,T\n1,101,A,T\n");

    let output = accession(&store, &input)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "COMPLETED");
    assert_eq!(report["accessioned"], 2);
    assert_eq!(report["clustering"]["created"], 2);
}

#[test]
fn test_invalid_record_exit_codes() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "variants.tsv", "1\t100\tA\tT\n1\t200\tA\tZ\n");

    let store = dir.path().join("strict.json");
    accession(&store, &input)
        .args(["--format", "json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"FAILED\""));

    let store = dir.path().join("forced.json");
    accession(&store, &input)
        .args(["--format", "json", "--force-import"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("COMPLETED_WITH_SKIPS"))
        .stdout(predicate::str::contains("invalid_allele"));
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    accession(&store, &dir.path().join("missing.tsv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_missing_assembly_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write(&dir, "variants.tsv", "1\t100\tA\tT\n");
    cli()
        .arg("accession")
        .arg(&input)
        .arg("--store")
        .arg(dir.path().join("store.json"))
        .args(["--project", "PRJ1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("assembly_accession is required"));
}

#[test]
fn test_show_and_deprecate() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let input = write(&dir, "variants.tsv", "1\t100\tA\tT\n");
    accession(&store, &input).assert().success();

    cli()
        .args(["show", "--category", "ss", "ss5000000000", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("ss5000000000"))
        .stdout(predicate::str::contains("CREATED"));

    cli()
        .args(["deprecate", "--assembly", "GCA_1", "--accession", "ss5000000000"])
        .args(["--reason", "withdrawn by submitter", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("Deprecated 1 submitted variant(s) and 1 clustered variant(s)"));

    let output = cli()
        .args(["--format", "json", "show", "--category", "rs", "3000000000", "--store"])
        .arg(&store)
        .output()
        .unwrap();
    assert!(output.status.success());
    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(view["record"]["status"], "DEPRECATED");
    assert_eq!(view["record"]["deprecation_reason"], "withdrawn by submitter");
    let events = view["events"].as_array().unwrap();
    assert!(events.iter().any(|e| e["event_type"] == "DEPRECATED"));
}

#[test]
fn test_show_unknown_accession_fails() {
    let dir = TempDir::new().unwrap();
    cli()
        .args(["show", "--category", "rs", "42", "--store"])
        .arg(dir.path().join("empty.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("rs42 not found"));
}

#[test]
fn test_merge_duplicates_with_assembly_report() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    // Same variant under two contig names: two clusters without synonyms
    let input = write(&dir, "variants.tsv", "1\t100\tA\tT\nchr1\t100\tA\tT\n");
    accession(&store, &input).assert().success();
    let report = write(&dir, "report.txt", ASSEMBLY_REPORT);

    cli()
        .args(["--format", "json", "merge-duplicates", "--assembly", "GCA_1", "--store"])
        .arg(&store)
        .arg("--assembly-report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"merged\""));

    let output = cli()
        .args(["--format", "json", "show", "--category", "rs", "3000000001", "--store"])
        .arg(&store)
        .output()
        .unwrap();
    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(view["record"]["status"], "MERGED");
    assert_eq!(view["resolves_to"], 3_000_000_000_u64);
}

#[test]
fn test_remap_into_new_assembly() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let input = write(&dir, "variants.tsv", "1\t100\tA\tT\n");
    accession(&store, &input).assert().success();
    let mapping = write(
        &dir,
        "mapping.tsv",
        "ss_accession\tcontig\tstart\nss5000000000\t1\t1100\n5000000099\t1\t1\n",
    );

    cli()
        .args(["remap", "--target-assembly", "GCA_2", "--store"])
        .arg(&store)
        .arg("--mapping")
        .arg(&mapping)
        .assert()
        .success()
        .stdout(predicate::str::contains("Remapped 1 submitted variant(s) into GCA_2"))
        .stdout(predicate::str::contains("ss5000000099: submitted variant not found"));
}

#[test]
fn test_recover_nothing_to_do() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let input = write(&dir, "variants.tsv", "1\t100\tA\tT\n");
    accession(&store, &input).assert().success();

    cli()
        .args(["recover", "--job-run-id", "fresh-run", "--category", "ss", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("ss: nothing to recover"));

    cli()
        .args(["recover", "--job-run-id", "fresh-run", "--all", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("ss: recovered 1 block(s)"));
}

#[test]
fn test_deprecate_cluster_retires_members() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let input = write(&dir, "variants.tsv", "1\t100\tA\tT\n1\t100\tA\tT\tPRJ2\n");
    accession(&store, &input).assert().success();

    cli()
        .args(["deprecate", "--cluster", "rs3000000000", "--reason", "retired", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("Deprecated 2 submitted variant(s) and 1 clustered variant(s)"));

    let output = cli()
        .args(["--format", "json", "show", "--category", "ss", "5000000001", "--store"])
        .arg(&store)
        .output()
        .unwrap();
    let view: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(view["record"]["status"], "DEPRECATED");
}
