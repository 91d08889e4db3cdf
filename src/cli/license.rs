use anyhow::{Context, Result};
use tracing::warn;

use super::args::LicenseArgs;
use super::write_output;
use crate::api::models::LicenseResponse;
use crate::context::AppContext;
use crate::report::Table;

pub async fn run(ctx: &mut AppContext, args: &LicenseArgs) -> Result<()> {
    println!("Querying license...");
    let license = ctx
        .conn
        .license()
        .await
        .context("Failed to get license information")?;

    print_license(&license);
    write_output(&license_table(&license)?, &args.output).await;
    Ok(())
}

fn print_license(l: &LicenseResponse) {
    println!();
    println!("License details for {}:", l.server_host_name);
    println!(" Node: {} ({})", l.server_node_name, l.server_node_address);
    println!(
        " Version: {} (built {} at {})",
        l.version, l.build_date, l.build_time
    );
    println!(
        " Evaluation license: {}",
        if l.is_eval { "Yes" } else { "No" }
    );
    println!(" License expires in: {} days", l.expires_in_days);
    println!();
    println!("Licensed categories:");

    for c in &l.categories {
        if c.violated {
            println!(" {}: {} of {} (VIOLATED)", c.name, c.consumed, c.licensed);
            warn!(category = %c.name, consumed = %c.consumed, licensed = %c.licensed, "License violated");
        } else {
            println!(" {}: {} of {}", c.name, c.consumed, c.licensed);
        }
    }
}

fn license_table(l: &LicenseResponse) -> Result<Table> {
    let mut table = Table::with_header([
        "Node",
        "Category",
        "Consumed",
        "Licensed",
        "License Violation",
    ]);
    for c in &l.categories {
        table.push_row([
            l.server_node_name.clone(),
            c.name.clone(),
            c.consumed.to_string(),
            c.licensed.to_string(),
            if c.violated { "YES" } else { "NO" }.to_string(),
        ])?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_license_table() {
        let license: LicenseResponse = serde_json::from_value(serde_json::json!({
            "server_node_name": "MASTER",
            "categories": [
                { "name": "BLOCK", "licenseViolated": false,
                  "licensed": { "value": 10, "unit": "TB" }, "consumed": { "value": 4, "unit": "TB" } },
                { "name": "NDMP", "licenseViolated": true,
                  "licensed": { "value": 2 }, "consumed": { "value": 3 } }
            ]
        }))
        .unwrap();

        let csv = license_table(&license).unwrap().to_csv();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "Node;Category;Consumed;Licensed;License Violation;");
        assert_eq!(lines[1], "MASTER;BLOCK;4 TB;10 TB;NO;");
        assert_eq!(lines[2], "MASTER;NDMP;3;2;YES;");
    }
}
