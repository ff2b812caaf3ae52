//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors with `?` and typed error
//! enums. It MUST NOT call `unwrap()` or `expect()`.
//! **Exceptions**: test code (everything from `#[cfg(test)]` onward).

use architectural_enforcement::find_violations;

/// Test that production code does not unwrap or expect
#[test]
fn test_no_unwrap_in_production_code() {
    let violations = find_violations(|code| code.contains(".unwrap()") || code.contains(".expect("));

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: unwrap()/expect() found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ INSTEAD:");
        eprintln!("  - Return a Result and use `?`");
        eprintln!("  - unwrap_or / unwrap_or_default / unwrap_or_else for real defaults");

        panic!(
            "\nFound {} unwrap/expect violation(s) in production code.",
            violations.len()
        );
    }
}
