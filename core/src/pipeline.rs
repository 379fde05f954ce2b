//! The recipe-ingredient persistence pipeline.
//!
//! Creating a recipe runs `Parsing → RecipeCreated → IngredientsPersisted →
//! LinksPersisted → Done`, strictly in order. A failure at any stage aborts
//! the run; once the recipe row exists, aborting also deletes it again so no
//! orphaned recipe survives a partial failure.

use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::models::{
    NewRecipe, NewRecipeIngredient, ParsedIngredient, Recipe, RecipeIngredient, RecipeRequest,
    clean_ingredient_lines, normalize_ingredient_name, validate_new_recipe, validate_servings,
};
use crate::store::{IngredientStore, LinkStore, RecipeStore};
use crate::upstream::IngredientNormalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parsing,
    RecipeCreated,
    IngredientsPersisted,
    LinksPersisted,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsing => "parsing",
            Self::RecipeCreated => "recipe_created",
            Self::IngredientsPersisted => "ingredients_persisted",
            Self::LinksPersisted => "links_persisted",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a pipeline run: the stage that failed and why.
#[derive(Debug, Error)]
#[error("recipe pipeline aborted at {stage}: {error}")]
pub struct Aborted {
    pub stage: Stage,
    #[source]
    pub error: Error,
}

impl Aborted {
    fn at(stage: Stage, error: Error) -> Self {
        Self { stage, error }
    }
}

/// Successful pipeline run.
#[derive(Debug, Clone)]
pub struct CreatedRecipe {
    pub recipe: Recipe,
    pub ingredients: Vec<RecipeIngredient>,
}

pub struct RecipePipeline<'a, N: ?Sized, I, R, L> {
    normalizer: &'a N,
    ingredients: &'a I,
    recipes: &'a R,
    links: &'a L,
}

impl<'a, N, I, R, L> RecipePipeline<'a, N, I, R, L>
where
    N: IngredientNormalizer + ?Sized,
    I: IngredientStore,
    R: RecipeStore,
    L: LinkStore,
{
    pub fn new(normalizer: &'a N, ingredients: &'a I, recipes: &'a R, links: &'a L) -> Self {
        Self {
            normalizer,
            ingredients,
            recipes,
            links,
        }
    }

    pub async fn create(
        &self,
        owner_id: i64,
        request: &RecipeRequest,
    ) -> Result<CreatedRecipe, Aborted> {
        let (new_recipe, lines) =
            prepare(request).map_err(|e| Aborted::at(Stage::Parsing, e))?;

        let parsed = self
            .normalizer
            .normalize(&lines, new_recipe.servings)
            .await
            .map_err(|e| Aborted::at(Stage::Parsing, e))?;
        let parsed = merge_parsed(parsed);
        if parsed.is_empty() {
            return Err(Aborted::at(
                Stage::Parsing,
                Error::Upstream("no ingredients recognised in the ingredient list".to_string()),
            ));
        }
        debug!(owner_id, lines = lines.len(), parsed = parsed.len(), "ingredients normalized");

        let recipe = self
            .recipes
            .create(owner_id, &new_recipe)
            .map_err(|e| Aborted::at(Stage::RecipeCreated, e))?;

        let names: Vec<String> = parsed.iter().map(|p| p.name.clone()).collect();
        let ingredients = match self.ingredients.find_or_create_many(&names) {
            Ok(found) if found.len() == names.len() => found,
            Ok(found) => {
                let err = Error::Internal(format!(
                    "ingredient store returned {} rows for {} names",
                    found.len(),
                    names.len()
                ));
                return Err(self.roll_back(&recipe, Stage::IngredientsPersisted, err));
            }
            Err(e) => return Err(self.roll_back(&recipe, Stage::IngredientsPersisted, e)),
        };

        let links: Vec<NewRecipeIngredient> = ingredients
            .iter()
            .zip(&parsed)
            .map(|(ingredient, entry)| NewRecipeIngredient {
                ingredient_id: ingredient.id,
                quantity: entry.amount,
                unit: entry.unit.clone(),
            })
            .collect();
        let linked = match self.links.create_links(recipe.id, &links) {
            Ok(linked) => linked,
            Err(e) => return Err(self.roll_back(&recipe, Stage::LinksPersisted, e)),
        };

        info!(
            recipe_id = recipe.id,
            owner_id,
            ingredients = linked.len(),
            stage = %Stage::Done,
            "recipe created"
        );
        Ok(CreatedRecipe {
            recipe,
            ingredients: linked,
        })
    }

    /// Compensating delete for a recipe whose later stage failed.
    fn roll_back(&self, recipe: &Recipe, stage: Stage, err: Error) -> Aborted {
        warn!(
            recipe_id = recipe.id,
            stage = %stage,
            error = %err,
            "recipe pipeline failed, removing recipe"
        );
        if let Err(undo) = self.recipes.delete(recipe.id, recipe.owner_id) {
            error!(
                recipe_id = recipe.id,
                error = %undo,
                "compensating delete failed, recipe row left behind"
            );
        }
        Aborted::at(stage, err)
    }
}

/// Owner-scoped delete. Missing and foreign recipes are both `NotFound`.
pub fn delete_recipe<R: RecipeStore + ?Sized>(
    recipes: &R,
    recipe_id: i64,
    owner_id: i64,
) -> Result<(), Error> {
    recipes.delete(recipe_id, owner_id)?;
    info!(recipe_id, owner_id, "recipe deleted");
    Ok(())
}

/// Validate the request before any I/O happens.
fn prepare(request: &RecipeRequest) -> Result<(NewRecipe, Vec<String>), Error> {
    let servings = validate_servings(request.servings)?;
    let recipe = NewRecipe {
        title: request.title.trim().to_string(),
        instructions: request.instructions.trim().to_string(),
        servings,
    };
    validate_new_recipe(&recipe)?;

    let lines = clean_ingredient_lines(&request.ingredients);
    if lines.is_empty() {
        return Err(Error::Validation(
            "at least one ingredient is required".to_string(),
        ));
    }
    Ok((recipe, lines))
}

/// Normalize names and fold entries sharing a name into one, first position
/// winning. Amounts add up when the units agree; otherwise the first entry
/// is kept.
fn merge_parsed(parsed: Vec<ParsedIngredient>) -> Vec<ParsedIngredient> {
    let mut merged: Vec<ParsedIngredient> = Vec::with_capacity(parsed.len());
    for entry in parsed {
        let name = normalize_ingredient_name(&entry.name);
        if name.is_empty() {
            continue;
        }
        match merged.iter_mut().find(|m| m.name == name) {
            Some(existing) if existing.unit.eq_ignore_ascii_case(&entry.unit) => {
                existing.amount += entry.amount;
            }
            Some(existing) => {
                warn!(
                    ingredient = %name,
                    kept_unit = %existing.unit,
                    dropped_unit = %entry.unit,
                    "ingredient listed twice with different units, keeping the first"
                );
            }
            None => merged.push(ParsedIngredient {
                name,
                amount: entry.amount,
                unit: entry.unit,
            }),
        }
    }
    merged
}
