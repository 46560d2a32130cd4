use std::fmt::Write;

use etlflow::registry::ComponentRegistry;

/// Renders every registered component, grouped by category.
pub fn render(registry: &ComponentRegistry) -> String {
    let mut out = String::new();
    for (category, entries) in registry.list_all() {
        let heading = format!("{category}s");
        let _ = writeln!(out, "\n{}", heading.to_uppercase());
        let _ = writeln!(out, "{}", "-".repeat(heading.len()));
        if entries.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for (key, component) in entries {
            let _ = writeln!(out, "  {key:30} {}", component.type_name());
        }
    }
    out.push('\n');
    out
}

/// Execute the `run --list-modules` command.
pub fn execute(registry: &ComponentRegistry) {
    print!("{}", render(registry));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_builtins() {
        let registry = ComponentRegistry::with_builtins().unwrap();
        let text = render(&registry);

        assert!(text.contains("\nEXTRACTORS\n----------\n"));
        assert!(text.contains(&format!("  {:30} JsonFileExtractor", "json_file")));
        assert!(text.contains(&format!("  {:30} SqlDatabaseLoader", "sql_database")));
    }

    #[test]
    fn test_render_empty_category() {
        let text = render(&ComponentRegistry::new());
        assert_eq!(text.matches("(none)").count(), 3);
    }
}
