use camino::Utf8Path;

use crate::jsonc::{parse_str, parse_with_depth, strip_comments};

const ORIGIN: &str = "test.jsonc";

#[test]
fn line_comments_are_stripped() {
    let src = "{\n  // a comment\n  \"a\": 1\n}";
    let value = parse_str(src, Utf8Path::new(ORIGIN)).unwrap();
    assert_eq!(value["a"], 1);
}

#[test]
fn block_comments_are_stripped() {
    let src = "{ /* hello\n world */ \"a\": 1 }";
    let value = parse_str(src, Utf8Path::new(ORIGIN)).unwrap();
    assert_eq!(value["a"], 1);
}

#[test]
fn slashes_inside_strings_survive() {
    let src = r#"{ "url": "https://example.com/x", "note": "a // b" }"#;
    let value = parse_str(src, Utf8Path::new(ORIGIN)).unwrap();
    assert_eq!(value["url"], "https://example.com/x");
    assert_eq!(value["note"], "a // b");
}

#[test]
fn escaped_quotes_dont_end_strings() {
    let src = r#"{ "a": "say \"hi\" // not a comment" }"#;
    let value = parse_str(src, Utf8Path::new(ORIGIN)).unwrap();
    assert_eq!(value["a"], "say \"hi\" // not a comment");
}

#[test]
fn stripping_preserves_line_numbers() {
    // the error must point at line 4, where the broken token actually is
    let src = "{\n  // comment line\n  \"a\": 1,\n  !!!\n}";
    let err = parse_str(src, Utf8Path::new(ORIGIN)).unwrap_err();
    assert!(err.to_string().contains("line 4"), "got: {err}");
}

#[test]
fn stripped_output_same_length_per_line() {
    let src = "{ /* x */ \"a\": 1 } // tail";
    let stripped = strip_comments(src);
    assert_eq!(src.len(), stripped.len());
}

#[test]
fn depth_limit_rejects_deep_documents() {
    let src = format!("{}1{}", "[".repeat(12), "]".repeat(12));
    assert!(parse_with_depth(&src, Utf8Path::new(ORIGIN), 10).is_err());
    assert!(parse_with_depth(&src, Utf8Path::new(ORIGIN), 20).is_ok());
}

#[test]
fn insertion_order_is_preserved() {
    let src = r#"{ "zebra": 1, "alpha": 2, "mid": 3 }"#;
    let value = parse_str(src, Utf8Path::new(ORIGIN)).unwrap();
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["zebra", "alpha", "mid"]);
}
