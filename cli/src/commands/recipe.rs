use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use potluck_core::db::Database;

use super::helpers::{format_quantity, short_date, truncate};

pub(crate) fn cmd_recipe_show(db: &Database, recipe_id: i64, json: bool) -> Result<()> {
    let detail = db.get_recipe_detail(recipe_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let title = &detail.title;
    let owner = &detail.owner_username;
    let servings = detail.servings;
    let created = short_date(&detail.created_at);
    println!("=== {title} ===");
    println!("  By {owner}  |  Serves {servings}  |  Added {created}\n");

    println!("  INGREDIENTS:");
    for ing in &detail.ingredients {
        let name = ing.ingredient_name.as_deref().unwrap_or("?");
        let qty = format_quantity(ing.quantity, &ing.unit);
        println!("    {qty} {name}");
    }

    if !detail.instructions.is_empty() {
        println!("\n  INSTRUCTIONS:");
        for line in detail.instructions.lines() {
            println!("    {line}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_recipe_list(db: &Database, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Owner")]
        owner_id: i64,
        #[tabled(rename = "Serves")]
        servings: u32,
        #[tabled(rename = "Added")]
        created: String,
    }

    let recipes = db.list_recipes()?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            title: truncate(&r.title, 40),
            owner_id: r.owner_id,
            servings: r.servings,
            created: short_date(&r.created_at).to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
