//! Wire types for the Spoonacular food API.

use serde::{Deserialize, Serialize};

use crate::models::ParsedIngredient;

/// One element of the `recipes/parseIngredients` response array.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIngredientData {
    pub original_name: Option<String>,
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub unit_short: Option<String>,
}

/// Body of `food/trivia/random` and `food/jokes/random`.
#[derive(Debug, Deserialize)]
pub struct TextResponse {
    pub text: String,
}

/// Form fields for `recipes/parseIngredients`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseIngredientsForm {
    pub ingredient_list: String,
    pub servings: u32,
}

impl ParseIngredientsForm {
    #[must_use]
    pub fn new(lines: &[String], servings: u32) -> Self {
        Self {
            ingredient_list: lines.join("\n"),
            servings,
        }
    }
}

/// Keep entries that carry a name and an amount; a missing unit becomes "".
#[must_use]
pub fn to_parsed_ingredient(data: ParsedIngredientData) -> Option<ParsedIngredient> {
    let name = data
        .original_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| data.name.filter(|n| !n.trim().is_empty()))?;
    let amount = data.amount.filter(|a| a.is_finite() && *a >= 0.0)?;

    Some(ParsedIngredient {
        name: name.trim().to_string(),
        amount,
        unit: data.unit_short.unwrap_or_default().trim().to_string(),
    })
}

#[must_use]
pub fn to_parsed_ingredients(items: Vec<ParsedIngredientData>) -> Vec<ParsedIngredient> {
    items.into_iter().filter_map(to_parsed_ingredient).collect()
}
