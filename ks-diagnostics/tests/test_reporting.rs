use ks_diagnostics::{fuzzy, CompileError, Diagnostic, DiagnosticEngine, ErrorLevel, PosInfo, Span};

#[test]
fn format_line_does_not_duplicate_position_for_display_variants() {
    let err = CompileError::UnresolvedSymbol {
        pos: PosInfo::new("rate_limiter.ks", 12, 4),
        name: "limt".to_string(),
        suggestions: vec!["limit".to_string()],
    };
    let line = err.format_line();
    assert_eq!(line.matches("rate_limiter.ks:12:4").count(), 1);
    assert!(line.starts_with("rate_limiter.ks:12:4: UnresolvedSymbol:"));
    assert!(line.contains("limt"));
}

#[test]
fn missing_main_has_no_position_but_still_formats() {
    let err = CompileError::MissingMain;
    assert_eq!(
        err.format_line(),
        "<unknown>:0:0: MissingMain: no `main` function is declared"
    );
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn every_variant_kind_appears_verbatim_in_its_format_line() {
    let cases = vec![
        (
            CompileError::DuplicateSymbol {
                pos: PosInfo::new("t.ks", 1, 1),
                name: "counters".to_string(),
            },
            "DuplicateSymbol",
        ),
        (
            CompileError::TypeMismatch {
                pos: PosInfo::new("t.ks", 2, 2),
                expected: "u32".to_string(),
                got: "bool".to_string(),
            },
            "TypeMismatch",
        ),
        (
            CompileError::InvalidMainSignature {
                pos: PosInfo::new("t.ks", 3, 3),
                reason: "must return i32".to_string(),
            },
            "InvalidMainSignature",
        ),
        (
            CompileError::VerifierWouldReject {
                pos: PosInfo::new("t.ks", 4, 4),
                reason: "unbounded loop".to_string(),
            },
            "VerifierWouldReject",
        ),
    ];
    for (err, kind) in cases {
        assert!(err.format_line().contains(kind));
    }
}

#[test]
fn diagnostic_engine_tracks_error_and_warning_counts_separately() {
    let mut engine = DiagnosticEngine::new();
    assert!(!engine.has_errors());

    engine.emit(Diagnostic::new(
        ErrorLevel::Error,
        "TypeMismatch",
        "mismatched types".to_string(),
        Span::new("t.ks".to_string(), 1, 1, 1),
    ));
    engine.emit(Diagnostic::new(
        ErrorLevel::Warning,
        "UnusedBinding",
        "unused binding".to_string(),
        Span::new("t.ks".to_string(), 2, 1, 1),
    ));

    assert!(engine.has_errors());
    assert_eq!(engine.error_count(), 1);
    assert_eq!(engine.diagnostics().len(), 2);
}

#[test]
fn diagnostic_snippet_renders_out_of_range_line_as_none() {
    let diag = Diagnostic::new(
        ErrorLevel::Error,
        "TypeMismatch",
        "mismatched types".to_string(),
        Span::new("t.ks".to_string(), 99, 1, 1),
    );
    let rendered = diag.format("var x: u32 = 1u32;");
    assert!(!rendered.contains("99 |"));
    assert!(rendered.contains("t.ks:99:1"));
}

#[test]
fn diagnostic_with_note_and_help_renders_both_sections() {
    let diag = Diagnostic::new(
        ErrorLevel::Error,
        "UnresolvedSymbol",
        "cannot find `limt`".to_string(),
        Span::new("t.ks".to_string(), 1, 1, 4),
    )
    .with_note("scope contains: limit, counters".to_string())
    .with_help("did you mean `limit`?".to_string());

    let rendered = diag.format("var x = limt;");
    assert!(rendered.contains("scope contains"));
    assert!(rendered.contains("did you mean"));
}

#[test]
fn fuzzy_suggestions_respect_the_max_suggestions_cap() {
    let candidates = vec![
        "limit".to_string(),
        "limiter".to_string(),
        "limits".to_string(),
        "something_else".to_string(),
    ];
    let found = fuzzy::find_similar_names("limi", &candidates, 0.5, 2);
    assert!(found.len() <= 2);
    assert!(found.iter().all(|name| name.starts_with("lim")));
}
