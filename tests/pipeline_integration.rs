#![allow(missing_docs)]

//! Whole-cascade behavior on a host without any of the external tools:
//! the lower tiers carry the run, and the copy tier guarantees an output
//! for inputs nothing else can improve.

use std::fs;
use std::path::Path;

use pdf_unlock::core::config::PipelineConfig;
use pdf_unlock::pipeline::external::{
    GhostscriptEnhanced, GhostscriptStandard, PdftkAllowAll, QpdfDecrypt,
};
use pdf_unlock::pipeline::patch::{DictionaryPatch, MetadataPatch, RestrictionPatch};
use pdf_unlock::pipeline::strategy::{LastResortCopy, StrategyContext, UnlockStrategy};
use pdf_unlock::pipeline::UnlockPipeline;
use pdf_unlock::probe::ToolInventory;

const CLEAN_PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";

/// A config whose external binaries are guaranteed absent, making
/// tool-availability deterministic regardless of the host.
fn toolless_config() -> PipelineConfig {
    PipelineConfig {
        gs_binary: "pdu-test-no-gs-7301".to_string(),
        qpdf_binary: "pdu-test-no-qpdf-7301".to_string(),
        pdftk_binary: "pdu-test-no-pdftk-7301".to_string(),
        ..PipelineConfig::default()
    }
}

/// The full cascade minus the page re-import tier, whose outcome depends
/// on whether the host carries the rendering library.
fn deterministic_cascade() -> UnlockPipeline {
    UnlockPipeline::new(vec![
        Box::new(GhostscriptEnhanced),
        Box::new(GhostscriptStandard),
        Box::new(QpdfDecrypt),
        Box::new(PdftkAllowAll),
        Box::new(DictionaryPatch),
        Box::new(MetadataPatch),
        Box::new(RestrictionPatch),
        Box::new(LastResortCopy),
    ])
}

fn run_once(
    pipeline: &UnlockPipeline,
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
) -> pdf_unlock::pipeline::PipelineRun {
    let tools = ToolInventory::new();
    let cx = StrategyContext { tools: &tools, config };
    pipeline.run(input, output, &cx).unwrap()
}

#[test]
fn copy_tier_wins_on_a_toolless_host_with_a_clean_document() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    let output = dir.path().join("out.pdf");
    fs::write(&input, CLEAN_PDF).unwrap();

    let run = run_once(&deterministic_cascade(), &toolless_config(), &input, &output);

    assert_eq!(run.winning_strategy, Some("copy"));
    assert_eq!(
        fs::read(&output).unwrap(),
        CLEAN_PDF,
        "last resort output is byte-identical to the input"
    );
    // Every earlier tier was attempted and failed.
    assert_eq!(run.attempts(), 8);
    assert!(run.outcomes[..7].iter().all(|o| !o.success));
}

#[test]
fn patch_tier_wins_when_encryption_markers_are_present() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    let output = dir.path().join("out.pdf");
    fs::write(
        &input,
        b"%PDF-1.4\n7 0 obj\n<< /Filter /Standard /P -3904 >>\nendobj\n\
          trailer\n<< /Root 1 0 R /Encrypt 7 0 R >>\n%%EOF\n" as &[u8],
    )
    .unwrap();

    let run = run_once(&deterministic_cascade(), &toolless_config(), &input, &output);

    assert_eq!(run.winning_strategy, Some("dict-patch"));
    let text = fs::read_to_string(&output).unwrap();
    assert!(!text.contains("/Encrypt 7 0 R"));
    assert!(text.contains("/P -4"));
}

#[test]
fn tier_selection_is_idempotent_under_fixed_availability() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    fs::write(&input, CLEAN_PDF).unwrap();

    let pipeline = deterministic_cascade();
    let config = toolless_config();

    let mut winners = Vec::new();
    for i in 0..3 {
        let output = dir.path().join(format!("out-{i}.pdf"));
        let run = run_once(&pipeline, &config, &input, &output);
        winners.push((run.winning_strategy, run.attempts()));
    }
    assert!(winners.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn non_pdf_input_never_reaches_a_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    let output = dir.path().join("out.pdf");
    fs::write(&input, b"PK\x03\x04 this is a zip").unwrap();

    let tools = ToolInventory::new();
    let config = toolless_config();
    let cx = StrategyContext { tools: &tools, config: &config };
    let err = deterministic_cascade()
        .run(&input, &output, &cx)
        .unwrap_err();
    assert_eq!(err.code(), "PDU-2001");
    assert!(!output.exists());
}

#[test]
fn exhaustion_reports_every_tier_attempted() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    fs::write(&input, CLEAN_PDF).unwrap();
    // An unwritable output directory defeats even the copy tier.
    let output = dir.path().join("no-such-dir").join("out.pdf");

    let run = run_once(&deterministic_cascade(), &toolless_config(), &input, &output);
    assert!(run.winning_strategy.is_none());
    let err = run.exhausted_error();
    assert_eq!(err.code(), "PDU-4002");
    assert!(err.to_string().contains("copy:"));
}

#[test]
fn strategy_names_are_unique_across_the_cascade() {
    let strategies: Vec<Box<dyn UnlockStrategy>> = vec![
        Box::new(GhostscriptEnhanced),
        Box::new(GhostscriptStandard),
        Box::new(QpdfDecrypt),
        Box::new(PdftkAllowAll),
        Box::new(DictionaryPatch),
        Box::new(MetadataPatch),
        Box::new(RestrictionPatch),
        Box::new(LastResortCopy),
    ];
    let mut names: Vec<_> = strategies.iter().map(|s| s.name()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), strategies.len());
}
