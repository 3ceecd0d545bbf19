use vhl_core::errors::{ErrorInfo, LabError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("template", "rc_filter.j2")
        .with_context("reason", "example")
}

#[test]
fn validation_error_surface() {
    let err = LabError::Validation(sample_info("V001", "unknown template"));
    assert_eq!(err.info().code, "V001");
    assert!(err.info().context.contains_key("template"));
}

#[test]
fn render_error_surface() {
    let err = LabError::Render(sample_info("R001", "missing variable"));
    assert_eq!(err.info().code, "R001");
    assert!(err.info().context.contains_key("reason"));
}

#[test]
fn timeout_error_surface() {
    let err = LabError::Timeout(sample_info("T001", "took too long"));
    assert_eq!(err.info().code, "T001");
}

#[test]
fn display_includes_context_and_hint() {
    let err = LabError::Rejected(
        ErrorInfo::new("validator.rejected", "bad netlist")
            .with_context("exit_code", "1")
            .with_hint("check the subcircuit names"),
    );
    let rendered = err.to_string();
    assert!(rendered.starts_with("simulator rejected content: bad netlist"));
    assert!(rendered.contains("exit_code=1"));
    assert!(rendered.contains("hint: check the subcircuit names"));
}

#[test]
fn errors_serialize_with_family_tag() {
    let err = LabError::Storage(ErrorInfo::new("S001", "disk full"));
    let json = serde_json::to_value(&err).expect("serialize");
    assert_eq!(json["family"], "Storage");
    assert_eq!(json["detail"]["code"], "S001");
    let decoded: LabError = serde_json::from_value(json).expect("deserialize");
    assert_eq!(decoded, err);
}
