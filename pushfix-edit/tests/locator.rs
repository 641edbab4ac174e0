//! Locator matching behavior: first-match-wins, capture interpolation,
//! span boundaries, and the no-match no-op contract.

use pretty_assertions::assert_eq;
use pushfix_edit::{replace_block, CompiledLocator, EditError, ReplaceOutcome};
use pushfix_types::plan::Locator;

fn compile(locator: Locator) -> CompiledLocator {
    CompiledLocator::compile(&locator).expect("locator compiles")
}

#[test]
fn literal_replaces_only_the_first_occurrence() {
    let locator = compile(Locator::Literal {
        find: "stopSelf()".to_string(),
    });

    let content = "fun a() { stopSelf() }\nfun b() { stopSelf() }\n";
    let out = replace_block(content, &locator, "stop()");

    assert_eq!(
        out,
        ReplaceOutcome::Replaced("fun a() { stop() }\nfun b() { stopSelf() }\n".to_string())
    );
}

#[test]
fn no_match_returns_content_untouched() {
    let locator = compile(Locator::Literal {
        find: "foo(...)".to_string(),
    });

    let content = "nothing to see here\n";
    let out = replace_block(content, &locator, "bar");

    assert_eq!(out, ReplaceOutcome::NoMatch);
    assert!(!out.is_replaced());
}

#[test]
fn regex_interpolates_capture_groups() {
    let locator = compile(Locator::Regex {
        pattern: r"(minSdk\s*=\s*)(\d+)".to_string(),
    });

    let content = "minSdk = 26\ntargetSdk = 34\n";
    let out = replace_block(content, &locator, "${1}29");

    assert_eq!(
        out,
        ReplaceOutcome::Replaced("minSdk = 29\ntargetSdk = 34\n".to_string())
    );
}

#[test]
fn span_runs_from_start_match_to_end_anchor_exclusive() {
    let locator = compile(Locator::Span {
        start: r"private fun analyze".to_string(),
        end: r"private fun showCard".to_string(),
    });

    let content = "\
class Svc {
    private fun analyze(data: String) {
        old()
    }

    private fun showCard() {}
}
";
    let out = replace_block(
        content,
        &locator,
        "private fun analyze(data: String) {\n        new()\n    }\n\n    ",
    );

    let ReplaceOutcome::Replaced(patched) = out else {
        panic!("expected a replacement");
    };
    assert!(patched.contains("new()"));
    assert!(!patched.contains("old()"));
    // End anchor survives: it is excluded from the replaced span.
    assert!(patched.contains("private fun showCard() {}"));
}

#[test]
fn span_end_anchor_may_match_a_nested_occurrence() {
    // The end marker appears inside a string literal before the "real" one.
    // Textual matching stops at the nested occurrence; accepted limitation.
    let locator = compile(Locator::Span {
        start: "START".to_string(),
        end: "END".to_string(),
    });

    let content = "START log(\"premature END\") real body END tail";
    let out = replace_block(content, &locator, "X");

    assert_eq!(
        out,
        ReplaceOutcome::Replaced("XEND\") real body END tail".to_string())
    );
}

#[test]
fn span_without_end_anchor_after_start_is_no_match() {
    let locator = compile(Locator::Span {
        start: "BEGIN".to_string(),
        end: "FINISH".to_string(),
    });

    // FINISH only occurs before BEGIN, never after.
    let out = replace_block("FINISH then BEGIN tail", &locator, "X");
    assert_eq!(out, ReplaceOutcome::NoMatch);
}

#[test]
fn malformed_regex_is_a_compile_error() {
    let err = CompiledLocator::compile(&Locator::Regex {
        pattern: "(unclosed".to_string(),
    })
    .unwrap_err();

    assert!(matches!(err, EditError::BadPattern { .. }));
    assert!(err.to_string().contains("(unclosed"));
}

#[test]
fn malformed_span_anchor_is_a_compile_error() {
    let err = CompiledLocator::compile(&Locator::Span {
        start: "fine".to_string(),
        end: "[broken".to_string(),
    })
    .unwrap_err();

    assert!(matches!(err, EditError::BadPattern { .. }));
}
