use serde_json::json;
use crate::cli::commands::HistoryArgs;
use crate::cli::live::load_config;
use crate::db::Database;
use crate::errors::MarketdeskError;
use crate::render::terminal::{render_history_detail, render_history_table};
use crate::render::render_success;

pub async fn handle_history(args: HistoryArgs, config_path: Option<&str>) -> Result<(), MarketdeskError> {
    let config = load_config(config_path).await?;
    let db = Database::new(config.db_path())?;

    if let Some(id) = &args.delete {
        if !db.delete_history(id)? {
            return Err(MarketdeskError::TaskNotFound(id.clone()));
        }
        println!("{}", render_success(&format!("Deleted analysis {}", id)));
        return Ok(());
    }

    if let Some(id) = &args.id {
        let entry = db
            .get_history(id)?
            .ok_or_else(|| MarketdeskError::TaskNotFound(id.clone()))?;
        let usage = db.get_model_usage(id)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&json!({ "analysis": entry, "usage": usage }))?);
        } else {
            println!("{}", render_history_detail(&entry, &usage));
        }
        return Ok(());
    }

    let entries = db.list_history(args.symbol.as_deref(), args.limit)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", render_history_table(&entries));
    }
    Ok(())
}
