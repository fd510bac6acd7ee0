//! Web page templating
//!
//! One HTML page compiled into the binary, rendered by substituting
//! `{{ key }}` placeholders from the controller's template context. Unmatched
//! placeholders stay on the page as-is, which is what happens when no patch
//! is active yet.

/// The single status/control page.
const INDEX_TEMPLATE: &str = include_str!("../../assets/index.html");

/// Render the page with the given key/value context.
pub fn render_index(context: &[(String, String)]) -> String {
    render(INDEX_TEMPLATE, context)
}

fn render(template: &str, context: &[(String, String)]) -> String {
    let mut page = template.to_string();
    for (key, value) in context {
        let spaced = format!("{{{{ {key} }}}}");
        page = page.replace(&spaced, value);
        let tight = format!("{{{{{key}}}}}");
        page = page.replace(&tight, value);
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_both_spacings() {
        let out = render(
            "<b>{{ bank }}</b> {{patch}}",
            &[
                ("bank".to_string(), "Blues".to_string()),
                ("patch".to_string(), "Lead".to_string()),
            ],
        );
        assert_eq!(out, "<b>Blues</b> Lead");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let out = render("{{ bank }} / {{ missing }}", &[(
            "bank".to_string(),
            "Blues".to_string(),
        )]);
        assert_eq!(out, "Blues / {{ missing }}");
    }

    #[test]
    fn test_index_template_has_core_placeholders() {
        assert!(INDEX_TEMPLATE.contains("{{ bank }}"));
        assert!(INDEX_TEMPLATE.contains("{{ patch }}"));
        assert!(INDEX_TEMPLATE.contains("{{ midi_data }}"));
    }
}
