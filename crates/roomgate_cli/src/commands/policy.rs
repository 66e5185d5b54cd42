//! Policy command implementation.

use super::Format;
use roomgate_gateway::{evaluate, AuthorizationResult};
use roomgate_protocol::DocumentPermissions;

/// Runs the policy command.
pub fn run(
    permissions: &DocumentPermissions,
    collaborators: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::parse(format)?;
    let result = evaluate(permissions, collaborators);
    print!("{}", render(&result, collaborators, format)?);
    Ok(())
}

fn render(
    result: &AuthorizationResult,
    collaborators: usize,
    format: Format,
) -> Result<String, serde_json::Error> {
    match format {
        Format::Json => Ok(format!("{}\n", serde_json::to_string_pretty(result)?)),
        Format::Text => Ok(format!(
            "Collaborators: {collaborators}\nVerdict:       {}\n",
            verdict(result)
        )),
    }
}

fn verdict(result: &AuthorizationResult) -> String {
    if !result.can_read {
        "forbidden (connection closed)".to_string()
    } else if let Some(code) = result.read_only_reason {
        format!("read-only ({code})")
    } else {
        "editable".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissions(can_read: bool, is_multi_user: bool) -> DocumentPermissions {
        DocumentPermissions {
            can_read,
            can_update: true,
            is_multi_user,
            max_collaborators: 10,
        }
    }

    fn text(permissions: &DocumentPermissions, collaborators: usize) -> String {
        render(&evaluate(permissions, collaborators), collaborators, Format::Text).unwrap()
    }

    #[test]
    fn unreadable_document_is_forbidden() {
        let out = text(&permissions(false, true), 0);
        assert!(out.contains("Verdict:       forbidden (connection closed)"));
    }

    #[test]
    fn occupied_single_user_document_is_read_only() {
        let out = text(&permissions(true, false), 1);
        assert!(out.contains("Collaborators: 1"));
        assert!(out.contains("Verdict:       read-only (multi_user_not_allowed)"));
    }

    #[test]
    fn free_document_is_editable() {
        let out = text(&permissions(true, true), 3);
        assert!(out.contains("Verdict:       editable"));
    }

    #[test]
    fn json_carries_the_read_only_reason() {
        let result = evaluate(&permissions(true, false), 1);
        let out = render(&result, 1, Format::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["readOnlyReason"], "multi_user_not_allowed");
        assert_eq!(value["canRead"], true);
    }
}
