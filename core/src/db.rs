use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::error::{Error, Result};
use crate::models::{
    Ingredient, IngredientUsage, NewRecipe, NewRecipeIngredient, NewUser, Recipe, RecipeDetail,
    RecipeIngredient, User, normalize_email, normalize_ingredient_name, validate_new_recipe,
};

pub struct Database {
    conn: Connection,
}

/// Fixed-width UTC timestamp, so stored values sort lexicographically.
pub fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    constraint_code(err).is_some_and(|code| {
        code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    })
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    constraint_code(err) == Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Cascades on recipe delete depend on this; it is per-connection in SQLite.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    instructions TEXT NOT NULL DEFAULT '',
                    servings INTEGER NOT NULL CHECK (servings > 0),
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    position INTEGER NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL DEFAULT '',
                    PRIMARY KEY (recipe_id, ingredient_id)
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                CREATE INDEX IF NOT EXISTS idx_recipes_owner ON recipes(owner_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_ingredient
                    ON recipe_ingredients(ingredient_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects columns: id, username, email, password_hash, created_at
    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // Expects columns: id, owner_id, title, instructions, servings, created_at
    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            instructions: row.get(3)?,
            servings: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    // --- Users ---

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let email = normalize_email(&user.email);
        let inserted = self.conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.username.trim(), email, user.password_hash, now()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::Conflict(format!(
                    "An account with email '{email}' already exists"
                )));
            }
            Err(e) => return Err(e.into()),
        }
        let id = self.conn.last_insert_rowid();
        self.get_user_by_id(id)
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("User {id} not found")))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE email = ?1",
                params![normalize_email(email)],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, email, password_hash, created_at FROM users ORDER BY id",
        )?;
        let users = stmt
            .query_map([], Self::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // --- Sessions ---

    pub fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, now(), timestamp(expires_at)],
        )?;
        Ok(())
    }

    /// User owning an unexpired session, if any.
    pub fn get_session_user(&self, token_hash: &str, at: DateTime<Utc>) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT u.id, u.username, u.email, u.password_hash, u.created_at
                 FROM sessions s
                 JOIN users u ON s.user_id = u.id
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2",
                params![token_hash, timestamp(at)],
                Self::user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(rows > 0)
    }

    pub fn purge_expired_sessions(&self, at: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![timestamp(at)],
        )?;
        Ok(rows)
    }

    // --- Ingredients ---

    /// Look up an ingredient by normalized name, inserting it when absent.
    ///
    /// The insert is `ON CONFLICT DO NOTHING` against the unique name, so two
    /// writers racing on the same name both end up reading the same row.
    pub fn find_or_create_ingredient(&self, name: &str) -> Result<Ingredient> {
        let normalized = normalize_ingredient_name(name);
        if normalized.is_empty() {
            return Err(Error::Validation(
                "ingredient name must not be empty".to_string(),
            ));
        }
        self.conn.execute(
            "INSERT INTO ingredients (name, created_at) VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING",
            params![normalized, now()],
        )?;
        self.get_ingredient_by_name(&normalized)?
            .ok_or_else(|| Error::Internal(format!("ingredient '{normalized}' vanished after insert")))
    }

    /// Batch find-or-create in one transaction. Output order matches `names`.
    pub fn find_or_create_ingredients(&self, names: &[String]) -> Result<Vec<Ingredient>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut ingredients = Vec::with_capacity(names.len());
        for name in names {
            ingredients.push(self.find_or_create_ingredient(name)?);
        }
        tx.commit()?;
        Ok(ingredients)
    }

    pub fn get_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM ingredients WHERE name = ?1",
                params![normalize_ingredient_name(name)],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    pub fn list_ingredients(&self) -> Result<Vec<IngredientUsage>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.name, COUNT(ri.recipe_id)
             FROM ingredients i
             LEFT JOIN recipe_ingredients ri ON ri.ingredient_id = i.id
             GROUP BY i.id
             ORDER BY i.name",
        )?;
        let ingredients = stmt
            .query_map([], |row| {
                Ok(IngredientUsage {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    recipe_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, owner_id: i64, recipe: &NewRecipe) -> Result<Recipe> {
        validate_new_recipe(recipe)?;
        // Verify owner exists
        self.get_user_by_id(owner_id)?;

        self.conn.execute(
            "INSERT INTO recipes (owner_id, title, instructions, servings, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                owner_id,
                recipe.title.trim(),
                recipe.instructions.trim(),
                recipe.servings,
                now(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.conn
            .query_row(
                "SELECT id, owner_id, title, instructions, servings, created_at
                 FROM recipes WHERE id = ?1",
                params![id],
                Self::recipe_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Recipe {id} not found")))
    }

    /// All recipes, newest first.
    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, owner_id, title, instructions, servings, created_at
             FROM recipes ORDER BY id DESC",
        )?;
        let recipes = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    /// Delete a recipe owned by `owner_id`. Links go with it (cascade);
    /// ingredients stay. Returns false when nothing matched.
    pub fn delete_recipe(&self, recipe_id: i64, owner_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM recipes WHERE id = ?1 AND owner_id = ?2",
            params![recipe_id, owner_id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_recipe_detail(&self, recipe_id: i64) -> Result<RecipeDetail> {
        let recipe = self.get_recipe(recipe_id)?;
        let owner = self.get_user_by_id(recipe.owner_id)?;
        let ingredients = self.get_recipe_ingredients(recipe_id)?;

        Ok(RecipeDetail {
            id: recipe.id,
            owner_id: recipe.owner_id,
            owner_username: owner.username,
            title: recipe.title,
            instructions: recipe.instructions,
            servings: recipe.servings,
            created_at: recipe.created_at,
            ingredients,
        })
    }

    // --- Recipe ingredient links ---

    /// Insert all links for a recipe in one transaction, keeping their order.
    pub fn insert_recipe_ingredients(
        &self,
        recipe_id: i64,
        links: &[NewRecipeIngredient],
    ) -> Result<Vec<RecipeIngredient>> {
        let tx = self.conn.unchecked_transaction()?;
        for (position, link) in links.iter().enumerate() {
            let inserted = self.conn.execute(
                "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, position, quantity, unit)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    recipe_id,
                    link.ingredient_id,
                    position as i64,
                    link.quantity,
                    link.unit
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_foreign_key_violation(&e) => {
                    return Err(Error::NotFound(format!(
                        "Recipe {recipe_id} or ingredient {} not found",
                        link.ingredient_id
                    )));
                }
                Err(e) if is_unique_violation(&e) => {
                    return Err(Error::Conflict(format!(
                        "Ingredient {} is already linked to recipe {recipe_id}",
                        link.ingredient_id
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        tx.commit()?;
        self.get_recipe_ingredients(recipe_id)
    }

    pub fn get_recipe_ingredients(&self, recipe_id: i64) -> Result<Vec<RecipeIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT ri.recipe_id, ri.ingredient_id, ri.quantity, ri.unit, i.name
             FROM recipe_ingredients ri
             JOIN ingredients i ON ri.ingredient_id = i.id
             WHERE ri.recipe_id = ?1
             ORDER BY ri.position",
        )?;
        let links = stmt
            .query_map(params![recipe_id], |row| {
                Ok(RecipeIngredient {
                    recipe_id: row.get(0)?,
                    ingredient_id: row.get(1)?,
                    quantity: row.get(2)?,
                    unit: row.get(3)?,
                    ingredient_name: Some(row.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    pub fn count_recipe_ingredients(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM recipe_ingredients", [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }
}
