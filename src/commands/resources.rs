use anyhow::{Context as _, Result};
use colored::Colorize;
use provider::{Attribute, ListResourcesRequest, Manager};

use crate::Context;
use crate::resource;
use crate::ui;

pub fn run(ctx: &Context, resource_type: Option<&str>, json: bool) -> Result<()> {
    let manager = Manager::new(
        "switchyard",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );
    resource::register_all(&manager).context("Failed to register resource types")?;

    let request = ListResourcesRequest {
        resource_type: resource_type.map(str::to_string),
    };
    let response = manager.list_resources(&provider::Context::background(), &request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    ui::header(&format!("{} {}", response.provider, response.version));
    if !ctx.quiet {
        ui::dim(&response.description);
    }
    for resource in &response.resources {
        ui::section(&resource.name);
        for attribute in &resource.attributes {
            println!("  {}", attribute_line(attribute));
            if ctx.verbose > 0 && !attribute.description.is_empty() {
                ui::dim(&format!("  {}", attribute.description));
            }
        }
    }
    println!();
    Ok(())
}

fn attribute_line(attribute: &Attribute) -> String {
    let mut line = format!("{} {}", attribute.name.bold(), attribute.kind.to_string().dimmed());
    if attribute.required {
        line.push_str(&format!(" {}", "required".yellow()));
    }
    if let Some(default) = &attribute.default {
        line.push_str(&format!(" (default {default})"));
    }
    if attribute.sensitive {
        line.push_str(&format!(" {}", "sensitive".magenta()));
    }
    line
}
