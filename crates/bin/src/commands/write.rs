//! Commands that change the store. Each saves the store when it succeeds.

use dashfields::{Doc, Field};
use serde_json::Value;

use crate::cli::{DelegateArgs, DocArgs, KeyArgs, SetArgs};
use crate::output::OutputFormat;
use crate::session::Session;

/// Reads a command-line value the way a user would type it.
fn parse_value(raw: &str) -> Field {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Number(n)) => n.as_f64().map_or_else(|| Field::from(raw), Field::from),
        Ok(Value::Bool(b)) => Field::from(b),
        Ok(Value::String(s)) => Field::from(s),
        _ => Field::from(raw),
    }
}

/// Run the `set` command
pub async fn set(session: &Session, args: &SetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let doc = session.doc(&args.id).await?;
    let value = if args.reference {
        Field::Ref(session.doc(&args.value).await?)
    } else {
        parse_value(&args.value)
    };
    doc.set(&args.key, value)?;
    session.save()
}

/// Run the `remove` command
pub async fn remove(session: &Session, args: &KeyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let doc = session.doc(&args.id).await?;
    doc.remove(&args.key)?;
    session.save()
}

/// Run the `delegate` command
pub async fn delegate(
    session: &Session,
    args: &DelegateArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc = session.doc(&args.id).await?;
    let delegate = doc.make_delegate(None, args.title.as_deref())?;
    session.save()?;
    print_created(&delegate, format)
}

/// Run the `alias` command
pub async fn alias(
    session: &Session,
    args: &DocArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc = session.doc(&args.id).await?;
    let alias = doc.make_alias(None)?;
    session.save()?;
    print_created(&alias, format)
}

fn print_created(doc: &Doc, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Human => println!("Created {}", doc.id()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&serde_json::json!({ "id": doc.id() }))?)
        }
    }
    Ok(())
}
