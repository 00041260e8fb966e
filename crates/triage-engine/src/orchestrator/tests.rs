use super::*;
use crate::context::NO_CONTEXT_FOUND;
use crate::fakes::{FakeHost, FakeModel, FakeTracker};
use crate::normalize::FALLBACK_TITLE;
use crate::publish::MANUAL_FIX_COMMENT;
use crate::store::InMemoryWorkflowStore;
use triage_core::protocol::SimilarIssue;
use triage_core::report::{ReportPayload, Severity};

struct Harness {
    orchestrator: WorkflowOrchestrator,
    model: Arc<FakeModel>,
    tracker: Arc<FakeTracker>,
    host: Arc<FakeHost>,
}

fn harness(model: FakeModel, tracker: FakeTracker, host: FakeHost) -> Harness {
    let model = Arc::new(model);
    let tracker = Arc::new(tracker);
    let host = Arc::new(host);
    let orchestrator = WorkflowOrchestrator::new(
        Collaborators {
            model: model.clone(),
            tracker: tracker.clone(),
            host: host.clone(),
        },
        Arc::new(InMemoryWorkflowStore::new()),
    );
    Harness {
        orchestrator,
        model,
        tracker,
        host,
    }
}

fn alice() -> Vec<ConversationMessage> {
    vec![ConversationMessage::new(
        "alice",
        "Login button does nothing on click",
        "1700000000.0001",
    )]
}

fn login_report() -> FakeModel {
    FakeModel::default().with_report(Ok(ReportPayload::titled("Login button unresponsive")
        .with_severity("High")
        .with_components(vec!["LoginForm".to_string()])))
}

fn fix_with(changes: Vec<FileChange>) -> FixProposal {
    FixProposal {
        root_cause: "click handler never bound".to_string(),
        fix_description: "bind the submit handler".to_string(),
        code_changes: changes,
        testing_notes: "click the button".to_string(),
    }
}

fn statuses(record: &WorkflowRecord) -> Vec<WorkflowStatus> {
    record.steps.iter().map(|step| step.status).collect()
}

#[tokio::test]
async fn test_unclassified_conversation_without_fix_completes_without_pr() {
    let h = harness(
        FakeModel::default(),
        FakeTracker::default(),
        FakeHost::default(),
    );

    let result = h.orchestrator.run(&alice(), "C1", "1700000000.0001").await;

    assert!(result.success);
    assert_eq!(result.workflow_id, "C1_1700000000.0001");
    assert_eq!(result.issue_key.as_deref(), Some("CCS-42"));
    assert_eq!(
        result.issue_url.as_deref(),
        Some("https://jira.example.com/browse/CCS-42")
    );
    assert_eq!(result.pr_url, None);
    assert_eq!(result.title.as_deref(), Some(FALLBACK_TITLE));
    assert_eq!(result.severity, Some(Severity::Medium));
    assert_eq!(
        result.message,
        "Successfully created ticket CCS-42 (manual fix required)"
    );
    assert!(result.error.is_none());

    assert_eq!(
        h.tracker.comments(),
        vec![("CCS-42".to_string(), MANUAL_FIX_COMMENT.to_string())]
    );
    assert_eq!(h.model.contexts(), vec![NO_CONTEXT_FOUND.to_string()]);
    assert!(h.host.pull_requests().is_empty());

    let record = h.orchestrator.get_status("C1_1700000000.0001").unwrap();
    assert_eq!(record.status, WorkflowStatus::Completed);
    assert_eq!(
        statuses(&record),
        vec![
            WorkflowStatus::Started,
            WorkflowStatus::ParsingBugReport,
            WorkflowStatus::BugReportParsed,
            WorkflowStatus::AnalyzingCodebase,
            WorkflowStatus::GeneratingFix,
            WorkflowStatus::FixGenerated,
            WorkflowStatus::CreatingJiraTicket,
            WorkflowStatus::JiraTicketCreated,
            WorkflowStatus::Completed,
        ]
    );
    assert!(record
        .steps
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[tokio::test]
async fn test_ticket_failure_is_fatal() {
    let tracker = FakeTracker {
        create_error: Some(CollaboratorError::Auth("401 Unauthorized".to_string())),
        ..FakeTracker::default()
    };
    let h = harness(login_report(), tracker, FakeHost::default());

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(!result.success);
    let error = result.error.clone().unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("ticket creation failed"));
    assert!(result.message.starts_with("Failed to process bug report: "));
    assert!(result.issue_key.is_none());
    assert!(h.tracker.comments().is_empty());

    let record = h.orchestrator.get_status("C1_t1").unwrap();
    assert_eq!(record.status, WorkflowStatus::Failed);
    let last = record.last_step().unwrap();
    assert_eq!(last.data["error"], serde_json::json!(error));
}

#[tokio::test]
async fn test_full_content_fix_opens_pr_and_links_ticket() {
    let model = login_report().with_fix(Ok(fix_with(vec![FileChange::new(
        "src/Login.tsx",
        "export const Login = () => <button onClick={submit} />;\n",
    )])));
    let h = harness(model, FakeTracker::default(), FakeHost::default());

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    let pr_url = "https://github.com/acme/shop/pull/1";
    assert_eq!(result.pr_url.as_deref(), Some(pr_url));
    assert_eq!(
        result.message,
        format!("Successfully created ticket CCS-42 and PR {}", pr_url)
    );

    assert_eq!(
        h.host.branch_attempts(),
        vec!["fix/ccs-42-login-button-unresponsive".to_string()]
    );
    let writes = h.host.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "src/Login.tsx");
    assert_eq!(writes[0].2, "fix/ccs-42-login-button-unresponsive");

    let prs = h.host.pull_requests();
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].title, "[CCS-42] Fix: Login button unresponsive");
    assert_eq!(prs[0].base, "main");
    assert_eq!(prs[0].labels, vec!["severity:high", "bug", "auto-generated"]);
    assert!(prs[0].body.contains("## Root Cause\n\nclick handler never bound"));
    assert!(prs[0].body.contains("- `src/Login.tsx`"));

    assert_eq!(
        h.tracker.comments(),
        vec![(
            "CCS-42".to_string(),
            format!("Pull Request created: {}", pr_url)
        )]
    );

    let record = h.orchestrator.get_status("C1_t1").unwrap();
    let trail = statuses(&record);
    assert_eq!(
        &trail[trail.len() - 3..],
        &[
            WorkflowStatus::CreatingPr,
            WorkflowStatus::PrCreated,
            WorkflowStatus::Completed
        ]
    );
}

#[tokio::test]
async fn test_patch_change_is_merged_into_current_file() {
    let host = FakeHost::default().with_file(
        "src/Login.tsx",
        "export function Login() {\n  return <button />;\n}\n",
    );
    let patch = "--- a/src/Login.tsx\n+++ b/src/Login.tsx\n\
                 @@ -2,1 +2,1 @@\n\
                 -  return <button />;\n\
                 +  return <button onClick={submit} />;\n";
    let model = login_report().with_fix(Ok(fix_with(vec![FileChange::new(
        "src/Login.tsx",
        patch,
    )])));
    let h = harness(model, FakeTracker::default(), host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert!(result.pr_url.is_some());
    let writes = h.host.writes();
    assert_eq!(
        writes[0].1,
        "export function Login() {\n  return <button onClick={submit} />;\n}\n"
    );
}

#[tokio::test]
async fn test_conflicting_patch_leaves_branch_untouched() {
    let host = FakeHost::default()
        .with_file("src/a.ts", "const a = 1;\n")
        .with_file("src/b.ts", "const b = 1;\n");
    let model = login_report().with_fix(Ok(fix_with(vec![
        FileChange::new("src/a.ts", "const a = 2;\n"),
        FileChange::new("src/b.ts", "@@ -1,1 +1,1 @@\n-const c = 1;\n+const c = 2;\n"),
    ])));
    let h = harness(model, FakeTracker::default(), host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert_eq!(result.pr_url, None);
    assert!(h.host.writes().is_empty());
    assert!(h.host.pull_requests().is_empty());
    let comments = h.tracker.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains("could not be published"));
    assert!(comments[0].1.contains("src/b.ts"));
    assert_eq!(
        h.orchestrator.get_status("C1_t1").unwrap().status,
        WorkflowStatus::Completed
    );
}

#[tokio::test]
async fn test_noop_patch_opens_no_pr() {
    let host = FakeHost::default().with_file("src/a.ts", "same\n");
    let model = login_report().with_fix(Ok(fix_with(vec![FileChange::new(
        "src/a.ts",
        "@@ -1,1 +1,1 @@\n-same\n+same\n",
    )])));
    let h = harness(model, FakeTracker::default(), host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert_eq!(result.pr_url, None);
    assert!(h.host.writes().is_empty());
    assert_eq!(
        h.tracker.comments(),
        vec![("CCS-42".to_string(), MANUAL_FIX_COMMENT.to_string())]
    );
}

#[tokio::test]
async fn test_blank_changes_are_skipped() {
    let host = FakeHost::default().with_file("src/a.ts", "const a = 1;\n");
    let model = login_report().with_fix(Ok(fix_with(vec![
        FileChange::new("src/a.ts", ""),
        FileChange::new("  ", "const orphan = true;\n"),
    ])));
    let h = harness(model, FakeTracker::default(), host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert_eq!(result.pr_url, None);
    assert!(h.host.writes().is_empty());
    assert!(h.host.pull_requests().is_empty());
    assert_eq!(
        h.tracker.comments(),
        vec![("CCS-42".to_string(), MANUAL_FIX_COMMENT.to_string())]
    );
}

#[tokio::test]
async fn test_blank_change_does_not_block_real_ones() {
    let host = FakeHost::default().with_file("src/a.ts", "const a = 1;\n");
    let model = login_report().with_fix(Ok(fix_with(vec![
        FileChange::new("src/a.ts", "   \n"),
        FileChange::new("src/b.ts", "const b = 2;\n"),
    ])));
    let h = harness(model, FakeTracker::default(), host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.pr_url.is_some());
    let writes = h.host.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "src/b.ts");
    assert_eq!(writes[0].1, "const b = 2;\n");
}

#[tokio::test]
async fn test_patch_against_missing_file_is_not_committed() {
    let model = login_report().with_fix(Ok(fix_with(vec![FileChange::new(
        "src/gone.ts",
        "@@ -3,2 +3,2 @@\n-const old = 1;\n context();\n+const new = 2;\n",
    )])));
    let h = harness(model, FakeTracker::default(), FakeHost::default());

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert_eq!(result.pr_url, None);
    assert!(h.host.writes().is_empty());
    assert!(h.host.pull_requests().is_empty());
    let comments = h.tracker.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].1.contains("could not be published"));
    assert!(comments[0].1.contains("src/gone.ts"));
}

#[tokio::test]
async fn test_branch_collision_retried_once_with_suffix() {
    let host = FakeHost::default().with_existing_branch("fix/ccs-42-login-button-unresponsive");
    let model = login_report().with_fix(Ok(fix_with(vec![FileChange::new("a.ts", "x")])));
    let h = harness(model, FakeTracker::default(), host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    let attempts = h.host.branch_attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1].starts_with("fix/ccs-42-login-button-unresponsive-"));
    assert_eq!(h.host.pull_requests()[0].branch, attempts[1]);
}

#[tokio::test]
async fn test_persistent_branch_collision_is_not_looped() {
    let host = FakeHost {
        always_conflict: true,
        ..FakeHost::default()
    };
    let model = login_report().with_fix(Ok(fix_with(vec![FileChange::new("a.ts", "x")])));
    let h = harness(model, FakeTracker::default(), host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert_eq!(result.pr_url, None);
    assert_eq!(h.host.branch_attempts().len(), 2);
    assert!(h.tracker.comments()[0].1.contains("branch creation failed"));
}

#[tokio::test]
async fn test_pr_failure_keeps_ticket() {
    let host = FakeHost {
        pr_error: Some(CollaboratorError::Api {
            status: 422,
            message: "No commits between main and fix".to_string(),
        }),
        ..FakeHost::default()
    };
    let model = login_report().with_fix(Ok(fix_with(vec![FileChange::new("a.ts", "x")])));
    let h = harness(model, FakeTracker::default(), host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert_eq!(result.issue_key.as_deref(), Some("CCS-42"));
    assert_eq!(result.pr_url, None);
    assert!(h.tracker.comments()[0]
        .1
        .contains("pull request creation failed"));
}

#[tokio::test]
async fn test_degraded_steps_do_not_fail_workflow() {
    let similar_error = FakeTracker {
        similar: Err(CollaboratorError::Network("connection reset".to_string())),
        comment_error: Some(CollaboratorError::Api {
            status: 500,
            message: "oops".to_string(),
        }),
        ..FakeTracker::default()
    };
    let model =
        login_report().with_fix(Err(CollaboratorError::Malformed("no JSON".to_string())));
    let host = FakeHost {
        panic_on_search: true,
        ..FakeHost::default()
    };
    let h = harness(model, similar_error, host);

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert!(result.similar_issues.is_empty());
    assert_eq!(result.pr_url, None);
    // Panicking context assembly degrades to an empty context.
    assert_eq!(h.model.contexts(), vec![String::new()]);
    // The manual-fix advisory was attempted even though commenting failed.
    assert_eq!(h.tracker.comments()[0].1, MANUAL_FIX_COMMENT);
}

#[tokio::test]
async fn test_similar_issues_are_reported_not_acted_on() {
    let tracker = FakeTracker {
        similar: Ok(vec![SimilarIssue {
            key: "CCS-7".to_string(),
            summary: "Login button unresponsive".to_string(),
            status: "Open".to_string(),
            created: None,
        }]),
        ..FakeTracker::default()
    };
    let h = harness(login_report(), tracker, FakeHost::default());

    let result = h.orchestrator.run(&alice(), "C1", "t1").await;

    assert!(result.success);
    assert_eq!(result.similar_issues.len(), 1);
    assert_eq!(result.similar_issues[0].key, "CCS-7");
    assert_eq!(h.tracker.created().len(), 1);
}

#[tokio::test]
async fn test_get_status_unknown_id() {
    let h = harness(
        FakeModel::default(),
        FakeTracker::default(),
        FakeHost::default(),
    );
    assert!(h.orchestrator.get_status("C9_nope").is_none());
}

#[tokio::test]
async fn test_concurrent_workflows_on_distinct_threads() {
    let h = harness(login_report(), FakeTracker::default(), FakeHost::default());

    let conversation = alice();
    let (first, second) = tokio::join!(
        h.orchestrator.run(&conversation, "C1", "t1"),
        h.orchestrator.run(&conversation, "C1", "t2"),
    );

    assert!(first.success && second.success);
    for id in ["C1_t1", "C1_t2"] {
        let record = h.orchestrator.get_status(id).unwrap();
        assert_eq!(record.status, WorkflowStatus::Completed);
        assert_eq!(record.steps.len(), 9);
    }
}
