use anyhow::Result;
use std::process;
use tabled::{Table, Tabled, settings::Style};

use potluck_core::db::Database;

use super::helpers::{short_date, truncate};

pub(crate) fn cmd_user_list(db: &Database, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct UserRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Username")]
        username: String,
        #[tabled(rename = "Email")]
        email: String,
        #[tabled(rename = "Joined")]
        joined: String,
    }

    let users = db.list_users()?;
    if users.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No users found");
        }
        process::exit(2);
    }

    // `User` never serializes its password hash.
    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    let rows: Vec<UserRow> = users
        .iter()
        .map(|u| UserRow {
            id: u.id,
            username: truncate(&u.username, 30),
            email: u.email.clone(),
            joined: short_date(&u.created_at).to_string(),
        })
        .collect();

    println!("{}", Table::new(&rows).with(Style::rounded()));

    Ok(())
}
