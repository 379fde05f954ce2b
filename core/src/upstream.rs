use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ParsedIngredient;

/// Remote service turning free-text ingredient lines into structured entries.
///
/// Each input line maps to zero or one output entries, in no guaranteed
/// order. Implementations report every failure as `Error::Upstream`.
#[async_trait]
pub trait IngredientNormalizer: Send + Sync {
    async fn normalize(&self, lines: &[String], servings: u32) -> Result<Vec<ParsedIngredient>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriviaKind {
    Fact,
    Joke,
}

impl fmt::Display for TriviaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fact => f.write_str("fact"),
            Self::Joke => f.write_str("joke"),
        }
    }
}

/// Source of random food facts and jokes.
#[async_trait]
pub trait FoodTrivia: Send + Sync {
    async fn random_text(&self, kind: TriviaKind) -> Result<String>;
}
