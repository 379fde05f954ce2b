//! Store interfaces consumed by the recipe pipeline, and their SQLite
//! implementation over a shared connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Ingredient, NewRecipe, NewRecipeIngredient, Recipe, RecipeIngredient};

/// Find-or-create persistence for shared ingredients, keyed by normalized name.
pub trait IngredientStore: Send + Sync {
    fn find_or_create(&self, name: &str) -> Result<Ingredient>;

    /// Results come back in the same order as `names`.
    fn find_or_create_many(&self, names: &[String]) -> Result<Vec<Ingredient>> {
        names.iter().map(|name| self.find_or_create(name)).collect()
    }
}

/// Create/delete persistence for recipes, scoped to their owner.
pub trait RecipeStore: Send + Sync {
    fn create(&self, owner_id: i64, recipe: &NewRecipe) -> Result<Recipe>;

    /// Fails with `NotFound` when the recipe is missing or owned by someone else.
    fn delete(&self, recipe_id: i64, owner_id: i64) -> Result<()>;
}

/// Associative records joining a recipe to its ingredients.
pub trait LinkStore: Send + Sync {
    fn create_links(
        &self,
        recipe_id: i64,
        links: &[NewRecipeIngredient],
    ) -> Result<Vec<RecipeIngredient>>;
}

/// A [`Database`] behind a mutex, cloneable across request handlers.
///
/// Every store call takes the lock for its own duration only, so the lock
/// is never held across an `.await`.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Database> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IngredientStore for SharedDatabase {
    fn find_or_create(&self, name: &str) -> Result<Ingredient> {
        self.lock().find_or_create_ingredient(name)
    }

    fn find_or_create_many(&self, names: &[String]) -> Result<Vec<Ingredient>> {
        self.lock().find_or_create_ingredients(names)
    }
}

impl RecipeStore for SharedDatabase {
    fn create(&self, owner_id: i64, recipe: &NewRecipe) -> Result<Recipe> {
        self.lock().insert_recipe(owner_id, recipe)
    }

    fn delete(&self, recipe_id: i64, owner_id: i64) -> Result<()> {
        if self.lock().delete_recipe(recipe_id, owner_id)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Recipe {recipe_id} not found")))
        }
    }
}

impl LinkStore for SharedDatabase {
    fn create_links(
        &self,
        recipe_id: i64,
        links: &[NewRecipeIngredient],
    ) -> Result<Vec<RecipeIngredient>> {
        self.lock().insert_recipe_ingredients(recipe_id, links)
    }
}
