//! `{field}` template rendering for notification content.

use serde_json::{Map, Value};

use herald_core::error::AppError;
use herald_core::result::AppResult;
use herald_entity::{DispatchPolicy, NotificationIntent};

/// Title, body and action URL after rendering and overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    /// Title.
    pub title: String,
    /// Body.
    pub body: String,
    /// Action URL.
    pub action_url: Option<String>,
}

/// Replace every `{field}` in `template` with the matching value from
/// `data`. Strings are inserted verbatim, other values as JSON, `null` as
/// nothing. Unknown placeholders stay as they are.
pub fn render(template: &str, data: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        let is_field = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        match data.get(name) {
            Some(value) if is_field => out.push_str(&display(value)),
            _ => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Check the policy's data contract and render its templates for `intent`.
/// Intent overrides win over rendered values.
pub fn render_content(policy: &DispatchPolicy, intent: &NotificationIntent) -> AppResult<RenderedContent> {
    let missing = policy.template.missing_fields(&intent.data);
    if !missing.is_empty() {
        return Err(AppError::validation(format!(
            "Notification '{}' is missing template data: {}",
            policy.key,
            missing.join(", ")
        )));
    }

    let overrides = &intent.overrides;
    Ok(RenderedContent {
        title: overrides
            .title
            .clone()
            .unwrap_or_else(|| render(&policy.template.title, &intent.data)),
        body: overrides
            .body
            .clone()
            .unwrap_or_else(|| render(&policy.template.body, &intent.data)),
        action_url: overrides.action_url.clone().or_else(|| {
            policy
                .template
                .action_url
                .as_deref()
                .map(|url| render(url, &intent.data))
        }),
    })
}

#[cfg(test)]
mod tests {
    use herald_core::error::ErrorKind;
    use serde_json::json;

    use super::*;
    use crate::policy::PolicyResolver;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_render_values() {
        let data = data(json!({"item": "Gloves", "quantity": 3, "note": null}));
        assert_eq!(
            render("{item} is down to {quantity} units{note}", &data),
            "Gloves is down to 3 units"
        );
    }

    #[test]
    fn test_render_leaves_unknown_and_broken_placeholders() {
        let data = data(json!({"item": "Gloves"}));
        assert_eq!(render("{missing} {item}", &data), "{missing} Gloves");
        assert_eq!(render("{ not a field } {item", &data), "{ not a field } {item");
        assert_eq!(render("{}", &data), "{}");
    }

    #[test]
    fn test_render_content_with_override() {
        let resolver = PolicyResolver::seeded();
        let intent = NotificationIntent::new("item.out_of_stock".parse().unwrap())
            .with_data("item", "Gloves")
            .with_data("item_id", 42)
            .with_title("Gloves gone");
        let policy = resolver.resolve(&intent.key).unwrap();
        let content = render_content(policy, &intent).unwrap();
        assert_eq!(content.title, "Gloves gone");
        assert_eq!(content.body, "Gloves has no units left in stock.");
        assert_eq!(content.action_url.as_deref(), Some("/inventory/items/42"));
    }

    #[test]
    fn test_missing_required_field() {
        let resolver = PolicyResolver::seeded();
        let intent = NotificationIntent::new("item.low_stock".parse().unwrap())
            .with_data("item", "Gloves");
        let policy = resolver.resolve(&intent.key).unwrap();
        let err = render_content(policy, &intent).unwrap_err();
        assert!(err.is(ErrorKind::Validation));
        assert!(err.message.contains("item_id, quantity"));
    }
}
