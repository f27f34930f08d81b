//! Plan display - cirrus-specific UI

use colored::{ColoredString, Colorize};
use declarative::{Action, FieldChange, Plan, PlannedValue, ResourceChange, Value};

/// Longest rendered value before it is elided
const MAX_VALUE_LEN: usize = 60;

fn colored_symbol(action: Action) -> ColoredString {
    let symbol = format!("{:>3}", action.symbol());
    match action {
        Action::Create => symbol.green(),
        Action::Update => symbol.yellow(),
        Action::Replace => symbol.magenta(),
        Action::Delete => symbol.red(),
        Action::NoOp => symbol.dimmed(),
    }
}

fn short_value(s: String) -> String {
    if s.chars().count() <= MAX_VALUE_LEN {
        return s;
    }
    let head: String = s.chars().take(MAX_VALUE_LEN - 3).collect();
    format!("{head}...")
}

/// `field: before → after`, plain text
pub fn describe_field(change: &FieldChange) -> String {
    let before = change
        .before
        .as_ref()
        .map_or_else(|| "(none)".to_string(), Value::to_string);
    let after = change
        .after
        .as_ref()
        .map_or_else(|| "(removed)".to_string(), PlannedValue::to_string);
    format!(
        "{}: {} → {}",
        change.field,
        short_value(before),
        short_value(after)
    )
}

/// Headline for one resource, plain text
pub fn describe_change(change: &ResourceChange) -> String {
    let mut line = format!("{} ({})", change.name, change.kind);
    if let Some(reason) = &change.reason {
        line.push_str(&format!("  # {reason}"));
    }
    line
}

/// Display a plan in a user-friendly format
pub fn display_plan(plan: &Plan, show_unchanged: bool) {
    let summary = plan.summary();

    if !summary.has_changes() {
        println!();
        println!(
            "  {} No changes needed ({} resources up to date)",
            "✓".green(),
            summary.no_op
        );
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Deployment Plan".bold()
    );
    println!("│");

    for change in &plan.changes {
        if !change.action.is_change() {
            if show_unchanged {
                println!("│ {} {}", colored_symbol(change.action), change.name.dimmed());
            }
            continue;
        }

        println!(
            "│ {} {}",
            colored_symbol(change.action),
            describe_change(change)
        );
        for field in &change.changes {
            let marker = if field.forces_replacement {
                " (forces replacement)".red().to_string()
            } else {
                String::new()
            };
            println!("│       {}{}", describe_field(field).dimmed(), marker);
        }
    }

    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Plan: {} to create, {} to update, {} to replace, {} to delete",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.replace.to_string().magenta(),
        summary.delete.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_field_update() {
        let fc = FieldChange {
            field: "addressPrefix".to_string(),
            before: Some(Value::from("10.0.1.0/24")),
            after: Some(PlannedValue::Known(Value::from("10.0.2.0/24"))),
            forces_replacement: false,
        };
        assert_eq!(describe_field(&fc), "addressPrefix: 10.0.1.0/24 → 10.0.2.0/24");
    }

    #[test]
    fn test_describe_field_unknown_and_new() {
        let fc = FieldChange {
            field: "serverFarmId".to_string(),
            before: None,
            after: Some(PlannedValue::Unknown),
            forces_replacement: false,
        };
        assert_eq!(
            describe_field(&fc),
            "serverFarmId: (none) → (known after apply)"
        );
    }

    #[test]
    fn test_long_values_are_elided() {
        let long = "x".repeat(200);
        let fc = FieldChange {
            field: "f".to_string(),
            before: None,
            after: Some(PlannedValue::Known(Value::String(long))),
            forces_replacement: true,
        };
        let line = describe_field(&fc);
        assert!(line.ends_with("..."));
        assert!(line.chars().count() < 100);
    }

    #[test]
    fn test_describe_change_with_reason() {
        let change = ResourceChange {
            name: "subnet".to_string(),
            kind: "azure-native:network:Subnet".to_string(),
            action: Action::Replace,
            changes: Vec::new(),
            reason: Some("virtualNetworkName cannot change in place".to_string()),
            dependencies: Vec::new(),
            declaration: None,
            prior: None,
        };
        assert_eq!(
            describe_change(&change),
            "subnet (azure-native:network:Subnet)  # virtualNetworkName cannot change in place"
        );
    }
}
