use std::path::Path;
use std::time::Duration;

use code_digest_core::analysis::{AnalysisClient, RemoteErrorKind, RetryPolicy};
use code_digest_core::config::{FlowConfig, TargetExtensions};
use code_digest_core::contract::{FlowEvent, InvokeError, MockFlowInvoker};
use code_digest_core::digest::{digest, FileStatus, OutputLayout, RunError, COMPLETE_MESSAGE};
use code_digest_core::local_store::LocalStore;
use futures::StreamExt;
use tempfile::tempdir;

fn client(invoker: MockFlowInvoker) -> AnalysisClient<MockFlowInvoker> {
    let flow = FlowConfig {
        flow_id: "flow-123".to_string(),
        flow_alias_id: "alias-456".to_string(),
    };
    AnalysisClient::new(invoker, flow).with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    })
}

fn answering(text: &'static str) -> MockFlowInvoker {
    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().returning(move |_| {
        Ok(futures::stream::iter(vec![Ok(FlowEvent::Output(Some(text.to_string())))]).boxed())
    });
    invoker
}

fn layout(input: &Path, output: &Path) -> OutputLayout {
    OutputLayout::new(input.to_string_lossy(), output.to_string_lossy())
}

#[tokio::test]
async fn ignored_and_non_target_files_produce_an_empty_report() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    std::fs::write(input.path().join("a.py"), "print(1)").unwrap();
    std::fs::write(input.path().join("b.txt"), "notes").unwrap();
    std::fs::write(input.path().join(".gitignore"), "*.py\n").unwrap();

    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().never();

    let extensions = TargetExtensions::parse(".py").unwrap();
    let report = digest(
        &LocalStore::new(),
        &client(invoker),
        &extensions,
        &layout(input.path(), output.path()),
    )
    .await
    .unwrap();

    assert_eq!(report.message, COMPLETE_MESSAGE);
    assert_eq!(report.total_processed, 0);
    assert!(report.results.is_empty());
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn analyses_are_written_mirroring_the_input_tree() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    std::fs::create_dir_all(input.path().join("pkg")).unwrap();
    std::fs::write(input.path().join("pkg/mod.py"), "def f(): pass").unwrap();
    std::fs::write(input.path().join("app.js"), "console.log(1)").unwrap();

    let extensions = TargetExtensions::parse(".py,.js").unwrap();
    let report = digest(
        &LocalStore::new(),
        &client(answering("# Result")),
        &extensions,
        &layout(input.path(), output.path()),
    )
    .await
    .unwrap();

    assert_eq!(report.total_processed, 2);
    assert_eq!(report.succeeded(), 2);
    let files: Vec<String> = report.results.iter().map(|r| r.file.clone()).collect();
    let expected: Vec<String> = ["app.js", "pkg/mod.py"]
        .iter()
        .map(|f| input.path().join(f).to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, expected);
    assert_eq!(
        report.results[1].output.as_deref(),
        Some(output.path().join("pkg/mod.md").to_string_lossy().as_ref())
    );
    assert_eq!(
        std::fs::read_to_string(output.path().join("pkg/mod.md")).unwrap(),
        "# Result"
    );
    assert_eq!(
        std::fs::read_to_string(output.path().join("app.md")).unwrap(),
        "# Result"
    );
}

#[tokio::test]
async fn a_failing_file_is_recorded_and_the_run_continues() {
    let input = tempdir().unwrap();
    let output = tempdir().unwrap();
    std::fs::write(input.path().join("bad.py"), "BAD").unwrap();
    std::fs::write(input.path().join("good.py"), "fine").unwrap();

    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().times(2).returning(|request| {
        if request.document == "BAD" {
            Err(InvokeError::new(RemoteErrorKind::Validation, "input rejected"))
        } else {
            Ok(futures::stream::iter(vec![Ok(FlowEvent::Output(Some("# Good".to_string())))]).boxed())
        }
    });

    let extensions = TargetExtensions::parse(".py").unwrap();
    let report = digest(
        &LocalStore::new(),
        &client(invoker),
        &extensions,
        &layout(input.path(), output.path()),
    )
    .await
    .unwrap();

    assert_eq!(report.total_processed, 2);
    assert_eq!(report.failed(), 1);
    let bad = &report.results[0];
    assert_eq!(bad.status, FileStatus::Failed);
    assert!(bad.output.is_none());
    assert!(bad
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Analysis failed") && e.contains("ValidationException")));
    assert_eq!(report.results[1].status, FileStatus::Success);
    assert!(!output.path().join("bad.md").exists());
    assert!(output.path().join("good.md").exists());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["message"], "Processing complete");
    assert_eq!(json["results"][0]["status"], "failed");
    assert!(json["results"][0].get("output").is_none());
    assert_eq!(json["results"][1]["status"], "success");
}

#[tokio::test]
async fn output_inside_the_input_tree_is_never_selected() {
    let input = tempdir().unwrap();
    let output = input.path().join("output");
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(output.join("stale.py"), "old").unwrap();
    std::fs::write(input.path().join("main.py"), "new").unwrap();

    let extensions = TargetExtensions::parse(".py").unwrap();
    let report = digest(
        &LocalStore::new(),
        &client(answering("# Main")),
        &extensions,
        &layout(input.path(), &output),
    )
    .await
    .unwrap();

    assert_eq!(report.total_processed, 1);
    assert_eq!(
        std::fs::read_to_string(output.join("main.md")).unwrap(),
        "# Main"
    );
}

#[tokio::test]
async fn a_missing_input_root_aborts_the_run() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    let mut invoker = MockFlowInvoker::new();
    invoker.expect_invoke_flow().never();

    let extensions = TargetExtensions::parse(".py").unwrap();
    let err = digest(
        &LocalStore::new(),
        &client(invoker),
        &extensions,
        &layout(&missing, dir.path()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RunError::Enumeration { .. }));
}

#[test]
fn object_store_layout_mirrors_keys_under_the_output_prefix() {
    let bucket_root = OutputLayout::new("", "output/");
    assert_eq!(bucket_root.destination("src/app/main.py"), "output/src/app/main.md");
    assert_eq!(bucket_root.destination("main.py"), "output/main.md");

    let folder = OutputLayout::new("projects/app/", "digests");
    assert_eq!(
        folder.destination("projects/app/src/lib.test.ts"),
        "digests/src/lib.test.md"
    );
}
