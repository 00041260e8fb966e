use super::*;

fn numbered(n: usize) -> String {
    (1..=n)
        .map(|i| format!("l{}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_patch_without_header_is_noop() {
    let original = "a\nb\nc";
    assert_eq!(apply(original, "-b\n+B\n"), original);
    assert_eq!(try_apply(original, "just prose"), Err(PatchError::NoHunks));
    assert!(!is_patch("-b\n+B"));
}

#[test]
fn test_single_line_replacement() {
    let result = apply("a\nold\nb", "@@ -2,1 +2,1 @@\n-old\n+new");
    assert_eq!(result, "a\nnew\nb");
}

#[test]
fn test_apply_diff_with_context_and_file_headers() {
    let original = r#"function hello() {
  console.log("old");
  return true;
}"#;
    let diff = r#"--- a/test.ts
+++ b/test.ts
@@ -1,4 +1,5 @@
 function hello() {
-  console.log("old");
+  console.log("new");
+  console.log("extra");
   return true;
 }
"#;
    let result = try_apply(original, diff).unwrap();
    assert_eq!(
        result,
        "function hello() {\n  console.log(\"new\");\n  console.log(\"extra\");\n  return true;\n}"
    );
}

#[test]
fn test_hunk_order_does_not_matter() {
    let original = numbered(10);
    let first = "@@ -2,1 +2,1 @@\n-l2\n+two\n";
    let second = "@@ -8,2 +8,3 @@\n-l8\n+eight\n+eight-b\n l9\n";

    let ascending = apply(&original, &format!("{}{}", first, second));
    let descending = apply(&original, &format!("{}{}", second, first));

    assert_eq!(ascending, descending);
    assert_eq!(
        ascending,
        "l1\ntwo\nl3\nl4\nl5\nl6\nl7\neight\neight-b\nl9\nl10"
    );
}

#[test]
fn test_drifted_hunk_is_relocated() {
    let original = "a\nb\nc\nd\ntarget\nf";
    let result = try_apply(original, "@@ -3,1 +3,1 @@\n-target\n+fixed").unwrap();
    assert_eq!(result, "a\nb\nc\nd\nfixed\nf");
}

#[test]
fn test_mismatched_context_is_a_conflict() {
    let original = "a\nb\nc";
    let patch = "@@ -2,1 +2,1 @@\n-missing\n+new";
    assert_eq!(
        try_apply(original, patch),
        Err(PatchError::Conflict {
            hunk: 0,
            old_start: 2
        })
    );
    assert_eq!(apply(original, patch), original);
}

#[test]
fn test_overlapping_hunks_are_rejected() {
    let original = "a\nold\nb";
    let patch = "@@ -2,1 +2,1 @@\n-old\n+new\n@@ -2,1 +2,1 @@\n-old\n+other\n";
    assert_eq!(
        try_apply(original, patch),
        Err(PatchError::Overlap {
            first: 0,
            second: 1
        })
    );
    assert_eq!(apply(original, patch), original);
}

#[test]
fn test_removal_past_end_is_clamped() {
    let result = try_apply("a\nb", "@@ -2,3 +2,1 @@\n-b\n-c\n-d\n+z").unwrap();
    assert_eq!(result, "a\nz");
}

#[test]
fn test_hunk_anchored_past_end_must_still_match() {
    assert_eq!(
        try_apply("a\nb", "@@ -10,1 +10,1 @@\n-zzz\n+new"),
        Err(PatchError::Conflict {
            hunk: 0,
            old_start: 10
        })
    );
    assert_eq!(apply("a\nb", "@@ -10,1 +10,1 @@\n-zzz\n+new"), "a\nb");
}

#[test]
fn test_hunk_past_end_relocates_to_matching_lines() {
    let result = try_apply("a\nb\nc", "@@ -40,1 +40,1 @@\n-b\n+B").unwrap();
    assert_eq!(result, "a\nB\nc");
}

#[test]
fn test_empty_document_rejects_hunk_with_old_lines() {
    let patch = "@@ -3,2 +3,2 @@\n-missing\n context\n+new";
    assert!(matches!(
        try_apply("", patch),
        Err(PatchError::Conflict { hunk: 0, .. })
    ));
    assert_eq!(apply("", patch), "");
}

#[test]
fn test_pure_addition_creates_content_in_empty_document() {
    let result = try_apply("", "@@ -0,0 +1,2 @@\n+first\n+second").unwrap();
    assert_eq!(result, "first\nsecond");
}

#[test]
fn test_zero_count_hunk_inserts_after_line() {
    let result = try_apply("a\nb", "@@ -1,0 +2,1 @@\n+inserted").unwrap();
    assert_eq!(result, "a\ninserted\nb");
}

#[test]
fn test_trailing_newline_and_crlf_preserved() {
    let patch = "@@ -2,1 +2,1 @@\n-old\n+new";
    assert_eq!(apply("a\nold\nb\n", patch), "a\nnew\nb\n");
    assert_eq!(apply("a\r\nold\r\nb\r\n", patch), "a\r\nnew\r\nb\r\n");
}

#[test]
fn test_identical_replacement_is_a_legal_noop() {
    let original = "a\nsame\nb";
    let result = try_apply(original, "@@ -2,1 +2,1 @@\n-same\n+same").unwrap();
    assert_eq!(result, original);
}

#[test]
fn test_parse_ignores_prose_and_trailing_blanks() {
    let patch = "Here is the fix:\n\
                 --- a/src/app.py\n\
                 +++ b/src/app.py\n\
                 @@ -1,3 +1,3 @@\n \
                 def main():\n\
                 \n\
                 -    return 1\n\
                 +    return 0\n\
                 \\ No newline at end of file\n\
                 \n";
    let hunks = parse_hunks(patch);
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0].old_start, 0);
    assert_eq!(
        hunks[0].lines,
        vec![
            DiffLine::Context("def main():".to_string()),
            DiffLine::Context(String::new()),
            DiffLine::Remove("    return 1".to_string()),
            DiffLine::Add("    return 0".to_string()),
        ]
    );
    assert_eq!(hunks[0].summary(), (1, 1));

    let result = apply("def main():\n\n    return 1\n", patch);
    assert_eq!(result, "def main():\n\n    return 0\n");
}

#[test]
fn test_header_without_counts() {
    let hunks = parse_hunks("@@ -3 +3 @@\n-x\n+y");
    assert_eq!(hunks.len(), 1);
    assert_eq!(hunks[0].old_start, 2);
    assert_eq!(hunks[0].old_count, 1);
    assert_eq!(hunks[0].new_count, 1);
}
