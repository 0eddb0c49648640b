//! `herald check-config`.

use herald_core::config::AppConfig;
use herald_database::connection::mask_password;
use herald_service::PolicyResolver;

use crate::output;

/// Execute the check-config command
pub fn execute(config: &AppConfig, path: &str) -> anyhow::Result<()> {
    let mut problems = config.validate();
    match PolicyResolver::from_config(&config.policies) {
        Ok(resolver) => println!("  Policies: {}", resolver.len()),
        Err(e) => problems.push(e.message),
    }
    match &config.database.url {
        Some(url) => println!("  Database: {}", mask_password(url)),
        None => println!("  Database: in-memory"),
    }

    if problems.is_empty() {
        output::print_success(&format!("Configuration '{path}' is valid"));
        return Ok(());
    }
    for problem in &problems {
        output::print_error(problem);
    }
    anyhow::bail!("{} configuration problem(s) found", problems.len())
}
