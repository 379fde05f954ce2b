use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MAX_USERNAME_LEN: usize = 64;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub instructions: String,
    pub servings: u32,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub instructions: String,
    pub servings: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Ingredient together with the number of recipes linking to it.
#[derive(Debug, Clone, Serialize)]
pub struct IngredientUsage {
    pub id: i64,
    pub name: String,
    pub recipe_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipeIngredient {
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeIngredient {
    pub recipe_id: i64,
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit: String,
    // Joined for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub id: i64,
    pub owner_id: i64,
    pub owner_username: String,
    pub title: String,
    pub instructions: String,
    pub servings: u32,
    pub created_at: String,
    pub ingredients: Vec<RecipeIngredient>,
}

/// One structured entry produced by the ingredient normalizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedIngredient {
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

/// Body of a "create a recipe with ingredients" request.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeRequest {
    pub title: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    pub servings: i64,
}

// --- Normalization ---

/// Canonical form of an ingredient name: trimmed, lowercased, single spaces.
#[must_use]
pub fn normalize_ingredient_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trim ingredient lines and drop the blank ones.
#[must_use]
pub fn clean_ingredient_lines(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

// --- Validation ---

pub fn validate_signup(username: &str, email: &str, password: &str) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::Validation("username must not be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(Error::Validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    validate_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
        && !email.contains(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid email address '{email}'")))
    }
}

pub fn validate_new_recipe(recipe: &NewRecipe) -> Result<()> {
    let title = recipe.title.trim();
    if title.is_empty() {
        return Err(Error::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::Validation(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    if recipe.servings == 0 {
        return Err(Error::Validation(
            "servings must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Check a raw servings value and narrow it to the stored type.
pub fn validate_servings(servings: i64) -> Result<u32> {
    u32::try_from(servings)
        .ok()
        .filter(|s| *s >= 1)
        .ok_or_else(|| Error::Validation("servings must be at least 1".to_string()))
}
