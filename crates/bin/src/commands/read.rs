//! Read-only commands.

use dashfields::Field;

use crate::cli::{DocArgs, KeyArgs};
use crate::output::{OutputFormat, print_table};
use crate::session::Session;

/// Run the `list` command
pub fn list(session: &Session, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let rows: Vec<Vec<String>> = session
        .backend
        .ids()
        .into_iter()
        .map(|id| {
            let stored = session.backend.stored(&id).unwrap_or_default();
            let fields = &stored["fields"];
            let title = fields["title"].as_str().unwrap_or_default().to_string();
            let count = fields.as_object().map_or(0, |fields| fields.len());
            vec![id.to_string(), title, count.to_string()]
        })
        .collect();

    match format {
        OutputFormat::Human => {
            if rows.is_empty() {
                println!("No documents found.");
                return Ok(());
            }
            print_table(&["ID", "TITLE", "FIELDS"], &rows);
        }
        OutputFormat::Json => {
            let value: Vec<_> = rows
                .iter()
                .map(|row| serde_json::json!({ "id": row[0], "title": row[1] }))
                .collect();
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}

/// Run the `show` command
pub async fn show(
    session: &Session,
    args: &DocArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc = session.doc(&args.id).await?;

    match format {
        OutputFormat::Human => {
            println!("{doc}");
            let rows: Vec<Vec<String>> = doc
                .all_keys()
                .into_iter()
                .map(|key| {
                    let value = Field::to_key_value_string(&doc, &key);
                    vec![key, value]
                })
                .collect();
            print_table(&["KEY", "VALUE"], &rows);
        }
        OutputFormat::Json => {
            let value = session.instance.registry().serialize_doc(&doc)?;
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}

/// Run the `get` command
pub async fn get(
    session: &Session,
    args: &KeyArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc = session.doc(&args.id).await?;
    let Some(field) = doc.get(&args.key).resolve().await else {
        return Err(format!("'{}' is not set on {}", args.key, args.id).into());
    };

    match format {
        OutputFormat::Human => println!("{field}"),
        OutputFormat::Json => {
            let value = session.instance.registry().serialize(&field)?;
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}
