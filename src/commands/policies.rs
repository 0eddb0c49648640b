//! `herald policies`: print the effective policy table.

use serde::Serialize;
use tabled::Tabled;

use herald_core::config::AppConfig;
use herald_entity::{Channel, DispatchPolicy};
use herald_service::PolicyResolver;

use crate::output::{self, OutputFormat};

/// Policy display row
#[derive(Debug, Serialize, Tabled)]
struct PolicyRow {
    key: String,
    importance: String,
    audience: String,
    mandatory: String,
    optional: String,
}

fn names<'a>(channels: impl IntoIterator<Item = &'a Channel>) -> String {
    channels
        .into_iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

impl From<&DispatchPolicy> for PolicyRow {
    fn from(policy: &DispatchPolicy) -> Self {
        Self {
            key: policy.key.to_string(),
            importance: policy.importance.to_string(),
            audience: policy.audience.to_string(),
            mandatory: names(&policy.mandatory_channels),
            optional: names(&policy.optional_channels),
        }
    }
}

/// Execute the policies command
pub fn execute(config: &AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    let resolver = PolicyResolver::from_config(&config.policies)?;
    if format == OutputFormat::Json {
        return output::print_json(&resolver.list().collect::<Vec<_>>());
    }
    let rows: Vec<PolicyRow> = resolver.list().map(PolicyRow::from).collect();
    output::print_list(&rows, format)
}

#[cfg(test)]
mod tests {
    use tabled::Table;

    use super::*;

    #[test]
    fn test_policy_rows_render_as_table() {
        let resolver = PolicyResolver::seeded();
        let rows: Vec<PolicyRow> = resolver.list().map(PolicyRow::from).collect();
        let row = rows
            .iter()
            .find(|r| r.key == "item.out_of_stock")
            .unwrap();
        assert_eq!(row.mandatory, "IN_APP,PUSH,WHATSAPP");
        assert_eq!(row.optional, "EMAIL");

        let table = Table::new(&rows).to_string();
        assert!(table.contains("mandatory"));
        assert!(table.contains("item.out_of_stock"));
    }
}
