use std::path::Path;

use {
    anyhow::Result,
    mirror_config::{RouteOptions, Severity, discover_config, validate},
    mirror_routing::RoutingTable,
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the configuration file and report errors/warnings.
///
/// Exits with status 1 when any error is found.
pub fn check(config_path: Option<&Path>) -> Result<()> {
    let (path, config) = discover_config(config_path)?;
    eprintln!("Checking {}\n", path.display());

    let result = validate(&config);
    for d in &result.diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        let table = RoutingTable::build(&config.redirects)?;
        eprintln!("No issues found, {} route(s).", table.len());
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Print the deduplicated route table.
pub fn routes(config_path: Option<&Path>) -> Result<()> {
    let (_, config) = discover_config(config_path)?;
    let table = RoutingTable::build(&config.redirects)?;

    for source in table.sources() {
        println!("{source}");
        for route in table.lookup(source) {
            println!("  -> {} [{}]", route.destination, describe(&route.options));
        }
    }
    eprintln!(
        "{} route(s) from {} source(s)",
        table.len(),
        table.sources().count()
    );
    Ok(())
}

fn describe(options: &RouteOptions) -> String {
    let mut flags = vec![if options.webhook {
        "webhook"
    } else {
        "bot"
    }];
    if options.embed.is_some() {
        flags.push("embed");
    }
    if options.allow_edit {
        flags.push("edit");
    }
    if options.allow_delete {
        flags.push("delete");
    }
    flags.join(", ")
}

#[cfg(test)]
mod tests {
    use {super::*, mirror_config::EmbedOptions};

    #[test]
    fn default_route_flags() {
        assert_eq!(describe(&RouteOptions::default()), "bot, edit");
    }

    #[test]
    fn all_route_flags() {
        let options = RouteOptions {
            webhook: true,
            embed: Some(EmbedOptions::default()),
            allow_delete: true,
            ..Default::default()
        };
        assert_eq!(describe(&options), "webhook, embed, edit, delete");
    }
}
