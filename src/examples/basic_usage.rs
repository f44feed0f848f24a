//! Basic ArcadeDB Client Example
//!
//! Connects with settings from the environment (or a `.env` file), creates a
//! document type, inserts a few records and queries them back.
//!
//! Run with: ARCADEDB_HOST=localhost ARCADEDB_NAME=demo ARCADEDB_USER=root ARCADEDB_PASS=... \
//!     cargo run --example basic_usage

use arcadedb_rs::{Client, Config, PropertyType, Row};
use serde_json::json;
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

fn person(name: &str, age: u32) -> Row {
    let mut row = Row::new();
    row.insert("name".to_string(), json!(name));
    row.insert("age".to_string(), json!(age));
    row
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arcadedb_rs=debug")),
        )
        .init();

    let config = Config::from_env()?;
    println!("Connecting to {}", config.base_url());

    let client = Client::open(config).await?;
    client.authenticate().await?;

    client.create_document_type("Person").await?;
    client
        .create_property("Person", "age", PropertyType::Integer)
        .await?;

    let doc = client.create_document("Person", person("Ada", 36)).await?;
    println!("Created {}", doc.rid);

    let report = client
        .bulk_insert_atomic("Person", &[person("Grace", 45), person("Linus", 28)])
        .await?;
    println!("Inserted {} more records", report.total_inserted());

    let adults = client
        .execute_query(
            "SELECT name, age FROM Person WHERE age > :min_age ORDER BY age",
            json!({"min_age": 30}).as_object().cloned(),
        )
        .await?;
    for row in &adults.rows {
        println!("  {} ({})", row["name"], row["age"]);
    }

    if let Some(found) = client.get_document(&doc.rid.to_string()).await? {
        println!("Fetched {}: {:?}", found.rid, found.get("name"));
    }

    println!("Person count: {}", client.count("Person", &BTreeMap::new()).await?);

    client.drop_type("Person").await?;
    client.close().await?;
    Ok(())
}
